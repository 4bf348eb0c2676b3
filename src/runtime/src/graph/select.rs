//! Platform selection for graph roots.

use std::collections::BTreeMap;

use ocibake_core::error::{BakeError, Result, SelectionFailure};
use ocibake_core::platform::{Platform, PlatformSelector};

use super::VariantGraph;

/// Roots (by index into [`VariantGraph::roots`]) built for one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformGroup {
    pub platform: Platform,
    pub roots: Vec<usize>,
}

/// Pick concrete platforms for every root and group roots by platform.
///
/// Without a selector a root's own finite supported set is used; a root
/// supporting all platforms then has nothing to pick from. Every root that
/// ends up with no platform is reported in a single `PlatformSelection` error.
pub fn select_platforms(
    graph: &VariantGraph,
    selector: Option<&PlatformSelector>,
) -> Result<Vec<PlatformGroup>> {
    let mut groups: BTreeMap<Platform, Vec<usize>> = BTreeMap::new();
    let mut failures = Vec::new();

    for (index, root) in graph.roots().iter().enumerate() {
        let node = graph.node(root.node);
        let supported = node.supported_platforms();
        let selected = match selector {
            Some(selector) => selector.select(supported),
            None if supported.is_infinite() => {
                failures.push(SelectionFailure {
                    root: node.key().to_string(),
                    supported: supported.to_string(),
                    selector: "<none> (supports all platforms; a platform selector is required)"
                        .to_string(),
                });
                continue;
            }
            None => supported.clone(),
        };

        if selected.is_empty() {
            failures.push(SelectionFailure {
                root: node.key().to_string(),
                supported: supported.to_string(),
                selector: selector
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "<none>".to_string()),
            });
            continue;
        }

        for platform in selected.iter() {
            groups.entry(platform.clone()).or_default().push(index);
        }
    }

    if !failures.is_empty() {
        return Err(BakeError::PlatformSelection(failures));
    }

    Ok(groups
        .into_iter()
        .map(|(platform, roots)| PlatformGroup { platform, roots })
        .collect())
}
