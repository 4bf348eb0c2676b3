//! Platform filters.
//!
//! String form: `@os+os,arch+arch,variant+variant,version+version`, with
//! trailing dimensions optional and an empty dimension meaning "any". `@`
//! alone matches every platform; OR-ed filters are joined with `;`.
//!
//! # Normalization
//!
//! Every OR of field filters is rewritten into one canonical list so that
//! equality and the string form do not depend on construction order:
//!
//! 1. each field filter is expanded into `(os, arch, variant) -> os versions`
//!    groups, where a key component may be a wildcard;
//! 2. groups whose version set is covered by a broader (more wildcarded)
//!    group are dropped;
//! 3. groups are merged back up, one dimension at a time, in the fixed order
//!    variants, architectures, oses.
//!
//! The fixed order means the result is canonical but not necessarily the
//! smallest possible list of filters.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::Platform;
use crate::error::{BakeError, Result};

/// Match predicate over the four platform dimensions. An empty set accepts
/// any value of that dimension.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldFilter {
    oses: BTreeSet<String>,
    architectures: BTreeSet<String>,
    variants: BTreeSet<String>,
    os_versions: BTreeSet<String>,
}

impl FieldFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oses<I: IntoIterator<Item = S>, S: Into<String>>(mut self, oses: I) -> Self {
        self.oses = oses.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_architectures<I: IntoIterator<Item = S>, S: Into<String>>(mut self, architectures: I) -> Self {
        self.architectures = architectures.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variants<I: IntoIterator<Item = S>, S: Into<String>>(mut self, variants: I) -> Self {
        self.variants = variants.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_os_versions<I: IntoIterator<Item = S>, S: Into<String>>(mut self, os_versions: I) -> Self {
        self.os_versions = os_versions.into_iter().map(Into::into).collect();
        self
    }

    /// True if no dimension is restricted.
    pub fn is_all(&self) -> bool {
        self.oses.is_empty()
            && self.architectures.is_empty()
            && self.variants.is_empty()
            && self.os_versions.is_empty()
    }

    pub fn matches(&self, platform: &Platform) -> bool {
        dimension_matches(&self.oses, platform.os())
            && dimension_matches(&self.architectures, platform.architecture())
            && dimension_matches(&self.variants, platform.variant())
            && dimension_matches(&self.os_versions, platform.os_version())
    }
}

fn dimension_matches(values: &BTreeSet<String>, value: &str) -> bool {
    values.is_empty() || values.contains(value)
}

impl fmt::Display for FieldFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dimensions = [&self.oses, &self.architectures, &self.variants, &self.os_versions];
        let used = dimensions
            .iter()
            .rposition(|d| !d.is_empty())
            .map_or(0, |i| i + 1);
        f.write_str("@")?;
        for (i, dimension) in dimensions.iter().take(used).enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            let joined: Vec<&str> = dimension.iter().map(String::as_str).collect();
            f.write_str(&joined.join("+"))?;
        }
        Ok(())
    }
}

impl FromStr for FieldFilter {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        let body = s
            .trim()
            .strip_prefix('@')
            .ok_or_else(|| BakeError::InvalidFilter(format!("'{}': must start with '@'", s)))?;
        let mut filter = FieldFilter::new();
        if body.is_empty() {
            return Ok(filter);
        }
        let dimensions: Vec<&str> = body.split(',').collect();
        if dimensions.len() > 4 {
            return Err(BakeError::InvalidFilter(format!(
                "'{}': at most 4 dimensions (os, arch, variant, osVersion)",
                s
            )));
        }
        let mut parsed = Vec::with_capacity(4);
        for dimension in &dimensions {
            let mut values = BTreeSet::new();
            if !dimension.is_empty() {
                for value in dimension.split('+') {
                    if value.is_empty() {
                        return Err(BakeError::InvalidFilter(format!("'{}': empty value", s)));
                    }
                    values.insert(value.to_string());
                }
            }
            parsed.push(values);
        }
        parsed.resize_with(4, BTreeSet::new);
        let mut parsed = parsed.into_iter();
        filter.oses = parsed.next().unwrap_or_default();
        filter.architectures = parsed.next().unwrap_or_default();
        filter.variants = parsed.next().unwrap_or_default();
        filter.os_versions = parsed.next().unwrap_or_default();
        Ok(filter)
    }
}

/// User-facing platform predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlatformFilter {
    /// Matches every platform
    All,
    /// Matches by field sets
    Field(FieldFilter),
    /// Matches if any member matches; members are kept normalized
    Or(Vec<FieldFilter>),
}

impl PlatformFilter {
    pub fn matches(&self, platform: &Platform) -> bool {
        match self {
            Self::All => true,
            Self::Field(filter) => filter.matches(platform),
            Self::Or(filters) => filters.iter().any(|f| f.matches(platform)),
        }
    }

    /// Combine two filters; the result matches if either matches.
    pub fn or(self, other: PlatformFilter) -> PlatformFilter {
        match (self, other) {
            (Self::All, _) | (_, Self::All) => Self::All,
            (Self::Field(a), Self::Field(b)) => Self::from_members(vec![a, b]),
            (Self::Or(mut members), Self::Field(b)) => {
                members.push(b);
                Self::from_members(members)
            }
            (Self::Field(a), Self::Or(members)) => {
                let mut all = vec![a];
                all.extend(members);
                Self::from_members(all)
            }
            (Self::Or(mut members), Self::Or(others)) => {
                members.extend(others);
                Self::from_members(members)
            }
        }
    }

    /// Normalize a list of OR-ed field filters into its canonical filter.
    pub fn from_members(members: Vec<FieldFilter>) -> PlatformFilter {
        let mut normalized = normalize(&members);
        if normalized.iter().any(FieldFilter::is_all) {
            return Self::All;
        }
        match normalized.len() {
            0 => Self::All,
            1 => Self::Field(normalized.remove(0)),
            _ => Self::Or(normalized),
        }
    }
}

impl From<FieldFilter> for PlatformFilter {
    fn from(filter: FieldFilter) -> Self {
        if filter.is_all() {
            Self::All
        } else {
            Self::Field(filter)
        }
    }
}

impl fmt::Display for PlatformFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("@"),
            Self::Field(filter) => write!(f, "{}", filter),
            Self::Or(filters) => {
                for (i, filter) in filters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(";")?;
                    }
                    write!(f, "{}", filter)?;
                }
                Ok(())
            }
        }
    }
}

impl FromStr for PlatformFilter {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        let members = s
            .split(';')
            .map(str::parse::<FieldFilter>)
            .collect::<Result<Vec<_>>>()?;
        if members.len() == 1 {
            return Ok(members.into_iter().next().map(Self::from).unwrap_or(Self::All));
        }
        Ok(Self::from_members(members))
    }
}

// A key component: `None` is the wildcard, distinct from every concrete value.
type Component = Option<String>;
// An os-version set: `None` accepts any version.
type Versions = Option<BTreeSet<String>>;
// A merged dimension: `None` accepts any value.
type ValueSet = Option<BTreeSet<String>>;

fn normalize(members: &[FieldFilter]) -> Vec<FieldFilter> {
    let groups = expand(members);
    let groups = drop_dominated(groups);

    let by_variant = merge_dimension(
        groups
            .into_iter()
            .map(|((os, arch, variant), versions)| (variant, (os, arch, versions)))
            .collect(),
    );
    let by_architecture = merge_dimension(
        by_variant
            .into_iter()
            .map(|(variants, (os, arch, versions))| (arch, (os, variants, versions)))
            .collect(),
    );
    let by_os = merge_dimension(
        by_architecture
            .into_iter()
            .map(|(architectures, (os, variants, versions))| (os, (architectures, variants, versions)))
            .collect(),
    );

    let filters: BTreeSet<FieldFilter> = by_os
        .into_iter()
        .map(|(oses, (architectures, variants, versions))| FieldFilter {
            oses: oses.unwrap_or_default(),
            architectures: architectures.unwrap_or_default(),
            variants: variants.unwrap_or_default(),
            os_versions: versions.unwrap_or_default(),
        })
        .collect();
    filters.into_iter().collect()
}

fn components(values: &BTreeSet<String>) -> Vec<Component> {
    if values.is_empty() {
        vec![None]
    } else {
        values.iter().cloned().map(Some).collect()
    }
}

fn expand(members: &[FieldFilter]) -> BTreeMap<(Component, Component, Component), Versions> {
    let mut groups: BTreeMap<(Component, Component, Component), Versions> = BTreeMap::new();
    for member in members {
        let versions: Versions = if member.os_versions.is_empty() {
            None
        } else {
            Some(member.os_versions.clone())
        };
        for os in components(&member.oses) {
            for arch in components(&member.architectures) {
                for variant in components(&member.variants) {
                    let key = (os.clone(), arch.clone(), variant);
                    match groups.get_mut(&key) {
                        None => {
                            groups.insert(key, versions.clone());
                        }
                        Some(existing) => *existing = union_versions(existing, &versions),
                    }
                }
            }
        }
    }
    groups
}

fn union_versions(a: &Versions, b: &Versions) -> Versions {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.union(b).cloned().collect()),
        _ => None,
    }
}

fn versions_subset(a: &Versions, b: &Versions) -> bool {
    match (a, b) {
        (_, None) => true,
        (None, Some(_)) => false,
        (Some(a), Some(b)) => a.is_subset(b),
    }
}

fn covers(broad: &Component, narrow: &Component) -> bool {
    broad.is_none() || broad == narrow
}

fn drop_dominated(
    groups: BTreeMap<(Component, Component, Component), Versions>,
) -> BTreeMap<(Component, Component, Component), Versions> {
    groups
        .iter()
        .filter(|(key, versions)| {
            !groups.iter().any(|(other, other_versions)| {
                other != *key
                    && covers(&other.0, &key.0)
                    && covers(&other.1, &key.1)
                    && covers(&other.2, &key.2)
                    && versions_subset(versions, other_versions)
            })
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Merge entries that differ only in one concrete component into a value set.
/// Wildcard entries are kept as-is.
fn merge_dimension<K: Ord>(entries: Vec<(Component, K)>) -> Vec<(ValueSet, K)> {
    let mut concrete: BTreeMap<K, BTreeSet<String>> = BTreeMap::new();
    let mut merged = Vec::new();
    for (value, rest) in entries {
        match value {
            Some(value) => {
                concrete.entry(rest).or_default().insert(value);
            }
            None => merged.push((None, rest)),
        }
    }
    merged.extend(concrete.into_iter().map(|(rest, values)| (Some(values), rest)));
    merged
}
