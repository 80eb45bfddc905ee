//! Channel configuration.
//!
//! ```toml
//! [channel]
//! budget_bytes = 16777216
//! drain_batch = 64
//!
//! [technology.overlay]
//! bootstrap.addr = "10.0.0.1"
//! bootstrap.port = 5000
//! reliable = true
//!
//! [technology.void]
//! ```
//!
//! Technology option values are flattened to dotted keys and stringified, so
//! adapters always read text. Loading never fails: a missing or malformed
//! file is logged and the defaults are used. A zero budget or batch size is
//! replaced by its default with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use iface_abi::TechOptions;
use log::warn;
use serde::Deserialize;
use thiserror::Error;

/// Inbound byte budget of a channel (16 MiB).
pub const DEFAULT_BUDGET_BYTES: usize = 16 * 1024 * 1024;
/// Outbound byte budget shared by a channel's handles (16 MiB).
pub const DEFAULT_SEND_BUDGET_BYTES: usize = 16 * 1024 * 1024;
/// Messages processed per [`Channel::poll`](crate::Channel::poll).
pub const DEFAULT_DRAIN_BATCH: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ChannelSettings {
    pub budget_bytes: usize,
    pub send_budget_bytes: usize,
    pub drain_batch: usize,
}

impl ChannelSettings {
    /// Replaces zero settings with their defaults.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        for (name, value, default) in [
            ("budget_bytes", &mut self.budget_bytes, defaults.budget_bytes),
            ("send_budget_bytes", &mut self.send_budget_bytes, defaults.send_budget_bytes),
            ("drain_batch", &mut self.drain_batch, defaults.drain_batch),
        ] {
            if *value == 0 {
                warn!("channel.{name} must be at least 1, using {default}");
                *value = default;
            }
        }
        self
    }
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            budget_bytes: DEFAULT_BUDGET_BYTES,
            send_budget_bytes: DEFAULT_SEND_BUDGET_BYTES,
            drain_batch: DEFAULT_DRAIN_BATCH,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawConfig {
    channel: ChannelSettings,
    technology: BTreeMap<String, toml::Table>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelConfig {
    pub channel: ChannelSettings,
    technologies: BTreeMap<String, TechOptions>,
}

impl ChannelConfig {
    /// Reads `path`; falls back to defaults when the file is missing or malformed.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::try_load(path) {
            Ok(config) => config,
            Err(err) => {
                warn!("cannot parse {}, using defaults: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(text)?;
        let technologies = raw
            .technology
            .into_iter()
            .map(|(name, table)| {
                let mut options = TechOptions::new();
                flatten("", &table, &mut options);
                (name, options)
            })
            .collect();
        Ok(Self {
            channel: raw.channel.sanitized(),
            technologies,
        })
    }

    /// Adds or replaces a technology group.
    pub fn with_technology(mut self, name: impl Into<String>, options: TechOptions) -> Self {
        self.technologies.insert(name.into(), options);
        self
    }

    pub fn technology(&self, name: &str) -> Option<&TechOptions> {
        self.technologies.get(name)
    }

    pub fn has_technology(&self, name: &str) -> bool {
        self.technologies.contains_key(name)
    }

    /// Configured group names in lexical order.
    pub fn technology_names(&self) -> impl Iterator<Item = &str> {
        self.technologies.keys().map(String::as_str)
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut TechOptions) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(nested) => flatten(&key, nested, out),
            toml::Value::String(text) => out.insert(key, text.as_str()),
            other => out.insert(key, other.to_string()),
        }
    }
}
