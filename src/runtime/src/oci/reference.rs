//! Image reference parsing.
//!
//! Parses references like `registry.example.com:5000/org/app:1.0.0` into a
//! name and a tag. Names are kept exactly as written; no default registry or
//! `library/` prefix is added.

use std::fmt;
use std::str::FromStr;

use ocibake_core::error::{BakeError, Result};

/// Default tag when none is specified.
pub const DEFAULT_TAG: &str = "latest";

/// Parsed image reference: `name[:tag]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageReference {
    /// Full name including an optional registry host (e.g. "ghcr.io/org/app")
    pub name: String,
    /// Tag (e.g. "latest", "1.0.0")
    pub tag: String,
}

impl ImageReference {
    /// Build a reference from validated parts.
    pub fn new(name: impl Into<String>, tag: impl Into<String>) -> Result<Self> {
        let reference = Self {
            name: name.into(),
            tag: tag.into(),
        };
        validate_name(&reference.name)?;
        validate_tag(&reference.tag)?;
        Ok(reference)
    }

    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `app` → app:latest
    /// - `org/app:1.0` → org/app:1.0
    /// - `localhost:5000/app` → localhost:5000/app:latest
    /// - `localhost:5000` → localhost:5000 (name `localhost`, tag `5000`)
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BakeError::InvalidReference("Empty image reference".to_string()));
        }
        if reference.contains('@') {
            return Err(BakeError::InvalidReference(format!(
                "'{}': digest references can not be written, use a tag",
                reference
            )));
        }

        // Split tag (: separator, but only after the last /)
        let (name, tag) = if let Some(slash_pos) = reference.rfind('/') {
            let after_slash = &reference[slash_pos + 1..];
            match after_slash.rfind(':') {
                Some(colon_pos) => (
                    &reference[..slash_pos + 1 + colon_pos],
                    Some(&after_slash[colon_pos + 1..]),
                ),
                None => (reference, None),
            }
        } else if let Some(colon_pos) = reference.rfind(':') {
            // Without a path there is no host, so this is name:tag
            (&reference[..colon_pos], Some(&reference[colon_pos + 1..]))
        } else {
            (reference, None)
        };

        Self::new(name, tag.unwrap_or(DEFAULT_TAG))
    }

    /// Registry host, if the first path component looks like one
    /// (contains a dot or colon, or is "localhost").
    pub fn registry(&self) -> Option<&str> {
        let (first, _) = self.name.split_once('/')?;
        looks_like_host(first).then_some(first)
    }

    /// Repository path without the registry host.
    pub fn repository(&self) -> &str {
        match self.registry() {
            Some(registry) => &self.name[registry.len() + 1..],
            None => &self.name,
        }
    }

    /// Same name with a different tag.
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        Self::new(self.name.clone(), tag)
    }
}

fn looks_like_host(component: &str) -> bool {
    component.contains('.') || component.contains(':') || component == "localhost"
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BakeError::InvalidReference("Empty image name".to_string()));
    }
    let invalid = |what: &str| BakeError::InvalidReference(format!("'{}': {}", name, what));

    let path = match name.split_once('/') {
        Some((host, path)) if looks_like_host(host) => {
            if !valid_host(host) {
                return Err(invalid(&format!("invalid registry host '{}'", host)));
            }
            path
        }
        _ => name,
    };
    for component in path.split('/') {
        if component.is_empty() {
            return Err(invalid("empty path component"));
        }
        if !valid_path_component(component) {
            return Err(invalid(&format!("invalid path component '{}'", component)));
        }
    }
    Ok(())
}

/// `[a-z0-9]+` runs joined by single `.`, `_` or `-` separators.
fn valid_path_component(component: &str) -> bool {
    let mut previous_separator = true;
    for c in component.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            previous_separator = false;
        } else if "._-".contains(c) && !previous_separator {
            previous_separator = true;
        } else {
            return false;
        }
    }
    !previous_separator
}

/// DNS labels separated by dots, with an optional numeric port.
/// Hosts may carry uppercase letters.
fn valid_host(host: &str) -> bool {
    let (hostname, port) = match host.split_once(':') {
        Some((hostname, port)) => (hostname, Some(port)),
        None => (host, None),
    };
    let valid_label = |label: &str| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    };
    let valid_port = port
        .map(|port| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(true);
    hostname.split('.').all(valid_label) && valid_port
}

fn validate_tag(tag: &str) -> Result<()> {
    let valid_start = tag
        .chars()
        .next()
        .map(|c| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(false);
    let valid_rest = tag
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "_.-".contains(c));
    if !valid_start || !valid_rest || tag.len() > 128 {
        return Err(BakeError::InvalidReference(format!("Invalid tag '{}'", tag)));
    }
    Ok(())
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
