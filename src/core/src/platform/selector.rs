//! Platform selectors: AND/OR expressions that pick concrete platforms out of
//! a supported [`PlatformSet`].
//!
//! String form: platforms joined with `&` (binds tighter) and `|`, with
//! parentheses for grouping, e.g. `linux,amd64 & linux,arm64 | linux,amd64`
//! or `linux,amd64 & (linux,arm64 | linux,arm,v7)`.

use std::fmt;
use std::str::FromStr;

use super::{Platform, PlatformSet};
use crate::error::{BakeError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlatformSelector {
    /// Selects one platform if it is supported
    Single(Platform),
    /// Selects both sides, or nothing if either side selects nothing
    And(Box<PlatformSelector>, Box<PlatformSelector>),
    /// Selects the left side, falling back to the right side
    Or(Box<PlatformSelector>, Box<PlatformSelector>),
}

impl PlatformSelector {
    pub fn and(self, other: PlatformSelector) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: PlatformSelector) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Pick concrete platforms from `supported`. The result is always finite.
    pub fn select(&self, supported: &PlatformSet) -> PlatformSet {
        match self {
            Self::Single(platform) => {
                if supported.contains(platform) {
                    PlatformSet::single(platform.clone())
                } else {
                    PlatformSet::empty()
                }
            }
            Self::And(left, right) => {
                let mut selected = left.select(supported);
                if selected.is_empty() {
                    return selected;
                }
                let other = right.select(supported);
                if other.is_empty() {
                    return other;
                }
                selected.union(&other);
                selected
            }
            Self::Or(left, right) => {
                let selected = left.select(supported);
                if selected.is_empty() {
                    right.select(supported)
                } else {
                    selected
                }
            }
        }
    }
}

impl From<Platform> for PlatformSelector {
    fn from(platform: Platform) -> Self {
        Self::Single(platform)
    }
}

impl fmt::Display for PlatformSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(platform) => write!(f, "{}", platform),
            Self::And(left, right) => {
                write_operand(f, left, !matches!(**left, Self::Single(_)))?;
                f.write_str(" & ")?;
                write_operand(f, right, matches!(**right, Self::Or(..)))
            }
            Self::Or(left, right) => {
                write_operand(f, left, matches!(**left, Self::Or(..)))?;
                f.write_str(" | ")?;
                write_operand(f, right, false)
            }
        }
    }
}

fn write_operand(f: &mut fmt::Formatter<'_>, operand: &PlatformSelector, group: bool) -> fmt::Result {
    if group {
        write!(f, "({})", operand)
    } else {
        write!(f, "{}", operand)
    }
}

impl FromStr for PlatformSelector {
    type Err = BakeError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parser = Parser { input: s, pos: 0 };
        let selector = parser.alternatives()?;
        match parser.peek() {
            None => Ok(selector),
            Some(c) => Err(parser.error(&format!("unexpected '{}'", c))),
        }
    }
}

/// Recursive descent over `alternatives := conjunction ('|' alternatives)?`,
/// `conjunction := operand ('&' conjunction)?` and
/// `operand := '(' alternatives ')' | platform`.
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn alternatives(&mut self) -> Result<PlatformSelector> {
        let left = self.conjunction()?;
        if self.eat('|') {
            Ok(left.or(self.alternatives()?))
        } else {
            Ok(left)
        }
    }

    fn conjunction(&mut self) -> Result<PlatformSelector> {
        let left = self.operand()?;
        if self.eat('&') {
            Ok(left.and(self.conjunction()?))
        } else {
            Ok(left)
        }
    }

    fn operand(&mut self) -> Result<PlatformSelector> {
        if self.eat('(') {
            let inner = self.alternatives()?;
            if !self.eat(')') {
                return Err(self.error("missing ')'"));
            }
            return Ok(inner);
        }

        let rest = &self.input[self.pos..];
        let len = rest.find(|c| "()&|".contains(c)).unwrap_or(rest.len());
        let text = rest[..len].trim();
        if text.is_empty() {
            return Err(if self.input.trim().is_empty() {
                self.error("empty selector")
            } else {
                self.error("missing platform around '&' or '|'")
            });
        }
        self.pos += len;
        text.parse::<Platform>()
            .map(PlatformSelector::Single)
            .map_err(|e| BakeError::InvalidSelector(e.to_string()))
    }

    /// Next non-whitespace character.
    fn peek(&mut self) -> Option<char> {
        let rest = &self.input[self.pos..];
        self.pos += rest.len() - rest.trim_start().len();
        self.input[self.pos..].chars().next()
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn error(&self, message: &str) -> BakeError {
        BakeError::InvalidSelector(format!("'{}': {}", self.input.trim(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Platform {
        s.parse().unwrap()
    }

    fn single(s: &str) -> PlatformSelector {
        PlatformSelector::Single(p(s))
    }

    fn set(items: &[&str]) -> PlatformSet {
        PlatformSet::finite(items.iter().map(|s| p(s)))
    }

    #[test]
    fn test_single_selects_supported_platform() {
        let supported = set(&["linux,amd64", "linux,arm64"]);
        assert_eq!(single("linux,amd64").select(&supported), set(&["linux,amd64"]));
        assert!(single("windows,amd64").select(&supported).is_empty());
    }

    #[test]
    fn test_single_on_infinite_set() {
        let selected = single("linux,riscv64").select(&PlatformSet::infinite());
        assert_eq!(selected, set(&["linux,riscv64"]));
        assert!(!selected.is_infinite());
    }

    #[test]
    fn test_and_requires_both_sides() {
        let supported = set(&["linux,amd64", "linux,arm64"]);
        let both = single("linux,amd64").and(single("linux,arm64"));
        assert_eq!(both.select(&supported), supported);

        let missing = single("linux,amd64").and(single("linux,arm,v7"));
        assert!(missing.select(&supported).is_empty());
        let missing = single("linux,arm,v7").and(single("linux,amd64"));
        assert!(missing.select(&supported).is_empty());
    }

    #[test]
    fn test_or_falls_back() {
        let supported = set(&["linux,amd64"]);
        let selector = single("linux,arm64").or(single("linux,amd64"));
        assert_eq!(selector.select(&supported), set(&["linux,amd64"]));

        let supported = set(&["linux,amd64", "linux,arm64"]);
        assert_eq!(selector.select(&supported), set(&["linux,arm64"]));
    }

    #[test]
    fn test_and_or_combination() {
        // Prefer a multi-arch build, fall back to amd64 alone.
        let selector: PlatformSelector = "linux,amd64 & linux,arm64 | linux,amd64".parse().unwrap();
        assert_eq!(
            selector.select(&set(&["linux,amd64", "linux,arm64"])),
            set(&["linux,amd64", "linux,arm64"])
        );
        assert_eq!(selector.select(&set(&["linux,amd64"])), set(&["linux,amd64"]));
        assert!(selector.select(&set(&["windows,amd64"])).is_empty());
    }

    #[test]
    fn test_parse_precedence() {
        let selector: PlatformSelector = "linux,amd64 & linux,arm64 | linux,amd64".parse().unwrap();
        let expected = single("linux,amd64")
            .and(single("linux,arm64"))
            .or(single("linux,amd64"));
        assert_eq!(selector, expected);
    }

    #[test]
    fn test_display_roundtrip() {
        for s in [
            "linux,amd64",
            "linux,amd64 & linux,arm64",
            "linux,amd64 & linux,arm64 | linux,amd64",
            "windows,amd64,,10.0.17763 | linux,arm,v7 & linux,arm64",
        ] {
            let selector: PlatformSelector = s.parse().unwrap();
            assert_eq!(selector.to_string(), s);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!("".parse::<PlatformSelector>().is_err());
        assert!("linux,amd64 &".parse::<PlatformSelector>().is_err());
        assert!("| linux,amd64".parse::<PlatformSelector>().is_err());
        assert!("linux".parse::<PlatformSelector>().is_err());
        assert!("(linux,amd64".parse::<PlatformSelector>().is_err());
        assert!("linux,amd64)".parse::<PlatformSelector>().is_err());
        assert!("()".parse::<PlatformSelector>().is_err());
        assert!("linux,amd64 (linux,arm64)".parse::<PlatformSelector>().is_err());
    }

    #[test]
    fn test_nested_or_keeps_grouping() {
        let selector = single("linux,amd64").and(single("linux,arm64").or(single("linux,arm,v7")));
        let printed = selector.to_string();
        assert_eq!(printed, "linux,amd64 & (linux,arm64 | linux,arm,v7)");

        let reparsed: PlatformSelector = printed.parse().unwrap();
        assert_eq!(reparsed, selector);
        let supported = set(&["linux,amd64", "linux,arm,v7"]);
        assert_eq!(reparsed.select(&supported), supported);
    }

    #[test]
    fn test_left_nested_roundtrip() {
        let selectors = [
            single("linux,amd64")
                .or(single("linux,arm64"))
                .and(single("linux,arm,v7")),
            single("linux,amd64")
                .and(single("linux,arm64"))
                .and(single("linux,arm,v7")),
            single("linux,amd64")
                .or(single("linux,arm64"))
                .or(single("linux,arm,v7")),
        ];
        for selector in selectors {
            let reparsed: PlatformSelector = selector.to_string().parse().unwrap();
            assert_eq!(reparsed, selector, "{}", selector);
        }
    }

    #[test]
    fn test_parse_redundant_parentheses() {
        let selector: PlatformSelector = "((linux,amd64)) | (linux,arm64 & linux,arm,v7)"
            .parse()
            .unwrap();
        assert_eq!(selector.to_string(), "linux,amd64 | linux,arm64 & linux,arm,v7");
    }
}
