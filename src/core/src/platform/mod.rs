//! Platform descriptors and the algebra used to pick build targets.
//!
//! - [`Platform`]: an (os, architecture, variant, os version, os features) tuple
//! - [`PlatformSet`]: a finite or infinite set of platforms
//! - [`PlatformFilter`]: a user-facing match predicate over platform fields
//! - [`PlatformSelector`]: an AND/OR expression picking concrete platforms

pub mod filter;
pub mod selector;
pub mod set;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{BakeError, Result};

pub use filter::{FieldFilter, PlatformFilter};
pub use selector::PlatformSelector;
pub use set::PlatformSet;

/// Target execution environment of an image.
///
/// Ordering is the lexicographic order of
/// `(os, architecture, variant, os_version, os_features)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Platform {
    os: String,
    architecture: String,
    variant: String,
    os_version: String,
    os_features: BTreeSet<String>,
}

impl Platform {
    /// Create a platform with only os and architecture set.
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            variant: String::new(),
            os_version: String::new(),
            os_features: BTreeSet::new(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = variant.into();
        self
    }

    pub fn with_os_version(mut self, os_version: impl Into<String>) -> Self {
        self.os_version = os_version.into();
        self
    }

    pub fn with_os_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.os_features = features.into_iter().map(Into::into).collect();
        self
    }

    pub fn os(&self) -> &str {
        &self.os
    }

    pub fn architecture(&self) -> &str {
        &self.architecture
    }

    /// Architecture variant, empty if unset.
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// OS version, empty if unset.
    pub fn os_version(&self) -> &str {
        &self.os_version
    }

    pub fn os_features(&self) -> &BTreeSet<String> {
        &self.os_features
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.os, self.architecture)?;
        let has_features = !self.os_features.is_empty();
        let has_version = !self.os_version.is_empty() || has_features;
        if !self.variant.is_empty() || has_version {
            write!(f, ",{}", self.variant)?;
        }
        if has_version {
            write!(f, ",{}", self.os_version)?;
        }
        for feature in &self.os_features {
            write!(f, ",{}", feature)?;
        }
        Ok(())
    }
}

impl FromStr for Platform {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.trim().split(',').collect();
        if parts.len() < 2 {
            return Err(BakeError::InvalidPlatform(format!(
                "'{}': expected os,arch[,variant[,osVersion[,feature]*]]",
                s
            )));
        }
        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(BakeError::InvalidPlatform(format!(
                "'{}': os and architecture must not be empty",
                s
            )));
        }
        let mut platform = Platform::new(parts[0], parts[1]);
        if let Some(variant) = parts.get(2) {
            platform.variant = variant.to_string();
        }
        if let Some(os_version) = parts.get(3) {
            platform.os_version = os_version.to_string();
        }
        for feature in parts.iter().skip(4) {
            if feature.is_empty() {
                return Err(BakeError::InvalidPlatform(format!(
                    "'{}': os features must not be empty",
                    s
                )));
            }
            platform.os_features.insert(feature.to_string());
        }
        Ok(platform)
    }
}

impl Serialize for Platform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Platform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
