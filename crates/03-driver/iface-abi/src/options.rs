use std::collections::BTreeMap;

/// Key/value options of one configured technology group.
///
/// Values are kept as text; adapters parse what they need.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TechOptions(BTreeMap<String, String>);

impl TechOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Only the literal `"true"` enables a flag.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key) == Some("true")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TechOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_require_literal_true() {
        let options = TechOptions::new()
            .with("reliable", "true")
            .with("maintenance", "yes");
        assert!(options.flag("reliable"));
        assert!(!options.flag("maintenance"));
        assert!(!options.flag("missing"));
        assert_eq!(options.get_or("local.port", "0"), "0");
    }
}
