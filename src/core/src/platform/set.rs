//! Finite or infinite sets of platforms.

use std::collections::BTreeSet;
use std::fmt;

use super::Platform;

/// A set of platforms that is either finite or "all platforms".
///
/// Infinite is the identity for [`intersect`](Self::intersect) and absorbing
/// for [`union`](Self::union). When infinite, the explicit set is empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformSet {
    infinite: bool,
    platforms: BTreeSet<Platform>,
}

impl PlatformSet {
    /// The set of all platforms.
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            platforms: BTreeSet::new(),
        }
    }

    /// The empty finite set.
    pub fn empty() -> Self {
        Self {
            infinite: false,
            platforms: BTreeSet::new(),
        }
    }

    /// A finite set with exactly one platform.
    pub fn single(platform: Platform) -> Self {
        Self::finite([platform])
    }

    pub fn finite(platforms: impl IntoIterator<Item = Platform>) -> Self {
        Self {
            infinite: false,
            platforms: platforms.into_iter().collect(),
        }
    }

    pub fn is_infinite(&self) -> bool {
        self.infinite
    }

    /// True only for the empty finite set.
    pub fn is_empty(&self) -> bool {
        !self.infinite && self.platforms.is_empty()
    }

    pub fn contains(&self, platform: &Platform) -> bool {
        self.infinite || self.platforms.contains(platform)
    }

    /// Explicit members; empty when infinite.
    pub fn platforms(&self) -> &BTreeSet<Platform> {
        &self.platforms
    }

    pub fn iter(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter()
    }

    /// Restrict `self` to the platforms also in `other`.
    pub fn intersect(&mut self, other: &PlatformSet) {
        if other.infinite {
            return;
        }
        if self.infinite {
            self.infinite = false;
            self.platforms = other.platforms.clone();
        } else {
            self.platforms.retain(|p| other.platforms.contains(p));
        }
    }

    /// Extend `self` with the platforms in `other`.
    pub fn union(&mut self, other: &PlatformSet) {
        if self.infinite {
            return;
        }
        if other.infinite {
            self.infinite = true;
            self.platforms.clear();
        } else {
            self.platforms.extend(other.platforms.iter().cloned());
        }
    }
}

impl Default for PlatformSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for PlatformSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinite {
            return f.write_str("<all platforms>");
        }
        f.write_str("[")?;
        for (i, platform) in self.platforms.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", platform)?;
        }
        f.write_str("]")
    }
}
