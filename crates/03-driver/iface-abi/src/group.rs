//! Multicast group identifiers.
//!
//! Groups are URIs of the form `scheme:[//][user@]host[:port][/path]`
//! (e.g. `ip://239.1.2.3:1234`, `grp://alpha`, `jo:ker`). Validation is
//! intentionally shallow: a scheme, a colon and a non-empty remainder.

use std::fmt;

use crate::error::InvalidGroup;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupUri(String);

impl GroupUri {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidGroup> {
        let raw = raw.into();
        let valid = match raw.split_once(':') {
            Some((scheme, rest)) => is_scheme(scheme) && !rest.is_empty(),
            None => false,
        };
        if valid {
            Ok(Self(raw))
        } else {
            Err(InvalidGroup(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.split().0
    }

    /// `host[:port]` part, without user info.
    pub fn authority(&self) -> &str {
        let rest = self.split().1;
        let rest = rest.strip_prefix("//").unwrap_or(rest);
        let end = rest.find('/').unwrap_or(rest.len());
        let authority = &rest[..end];
        match authority.rsplit_once('@') {
            Some((_, host)) => host,
            None => authority,
        }
    }

    pub fn host(&self) -> &str {
        let authority = self.authority();
        match authority.rsplit_once(':') {
            Some((host, port)) if is_port(port) => host,
            _ => authority,
        }
    }

    pub fn port(&self) -> Option<u16> {
        let (_, port) = self.authority().rsplit_once(':')?;
        port.parse().ok()
    }

    fn split(&self) -> (&str, &str) {
        self.0.split_once(':').unwrap_or((self.0.as_str(), ""))
    }
}

impl fmt::Display for GroupUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<&str> for GroupUri {
    type Error = InvalidGroup;

    fn try_from(raw: &str) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

fn is_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

fn is_port(port: &str) -> bool {
    !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())
}
