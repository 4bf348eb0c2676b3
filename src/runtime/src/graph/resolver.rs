//! Memoized construction of the variant graph.

use std::collections::{BTreeMap, HashMap};

use ocibake_core::cancel::CancelToken;
use ocibake_core::error::{BakeError, Result};
use ocibake_core::platform::PlatformSet;

use super::{
    Bucket, NodeId, RootRequest, Scope, VariantCatalog, VariantGraph, VariantGraphNode,
    VariantGraphRoot, VariantKey,
};

enum Slot {
    InProgress,
    Resolved(NodeId),
}

/// One resolution pass. The slot map lives only as long as the pass, so an
/// in-progress entry always means a cycle within this traversal.
struct Resolver<'a> {
    catalog: &'a VariantCatalog,
    cancel: &'a CancelToken,
    nodes: Vec<VariantGraphNode>,
    slots: HashMap<VariantKey, Slot>,
    path: Vec<VariantKey>,
}

/// Resolve `requests` against `catalog` into a graph.
///
/// Roots are deduplicated by resolved node; each keeps the distinct
/// reference selectors that requested it, in first-seen order.
pub fn resolve(
    catalog: &VariantCatalog,
    requests: &[RootRequest],
    cancel: &CancelToken,
) -> Result<VariantGraph> {
    let mut resolver = Resolver {
        catalog,
        cancel,
        nodes: Vec::new(),
        slots: HashMap::new(),
        path: Vec::new(),
    };

    let mut roots: Vec<VariantGraphRoot> = Vec::new();
    for request in requests {
        let node = resolver.visit(&request.key)?;
        match roots.iter_mut().find(|r| r.node == node) {
            Some(root) => {
                if !root.selectors.contains(&request.selector) {
                    root.selectors.push(request.selector.clone());
                }
            }
            None => roots.push(VariantGraphRoot {
                node,
                selectors: vec![request.selector.clone()],
            }),
        }
    }

    tracing::debug!(
        nodes = resolver.nodes.len(),
        roots = roots.len(),
        "Resolved variant graph"
    );

    Ok(VariantGraph {
        nodes: resolver.nodes,
        roots,
    })
}

impl Resolver<'_> {
    fn visit(&mut self, key: &VariantKey) -> Result<NodeId> {
        self.cancel.check()?;
        match self.slots.get(key) {
            Some(Slot::Resolved(id)) => return Ok(*id),
            Some(Slot::InProgress) => return Err(self.cycle(key)),
            None => {}
        }

        let catalog = self.catalog;
        let declaration = catalog
            .get(key)
            .ok_or_else(|| BakeError::UnknownVariant(key.to_string()))?;

        self.slots.insert(key.clone(), Slot::InProgress);
        self.path.push(key.clone());

        let mut buckets: BTreeMap<Bucket, Vec<NodeId>> = match &declaration.scope {
            Scope::Universal => BTreeMap::from([(Bucket::Universal, Vec::new())]),
            Scope::Platforms(platforms) => platforms
                .iter()
                .map(|p| (Bucket::Platform(p.clone()), Vec::new()))
                .collect(),
        };

        for dependency in &declaration.dependencies {
            if let Some(platform) = &dependency.platform {
                if !buckets.contains_key(&Bucket::Platform(platform.clone())) {
                    return Err(BakeError::ScopeMismatch {
                        component: key.to_string(),
                        dependency: dependency.key.to_string(),
                        platform: platform.to_string(),
                    });
                }
            }
            let child = self.visit(&dependency.key)?;
            match &dependency.platform {
                Some(platform) => {
                    if let Some(edges) = buckets.get_mut(&Bucket::Platform(platform.clone())) {
                        edges.push(child);
                    }
                }
                None => {
                    for edges in buckets.values_mut() {
                        edges.push(child);
                    }
                }
            }
        }

        let supported = self.supported_platforms(&buckets);
        tracing::trace!(variant = %key, supported = %supported, "Resolved variant");

        let id = NodeId(self.nodes.len());
        self.nodes.push(VariantGraphNode {
            key: key.clone(),
            buckets,
            supported,
        });
        self.path.pop();
        self.slots.insert(key.clone(), Slot::Resolved(id));
        Ok(id)
    }

    /// Union over buckets of `own ∩ every dependency's supported set`.
    fn supported_platforms(&self, buckets: &BTreeMap<Bucket, Vec<NodeId>>) -> PlatformSet {
        let mut supported = PlatformSet::empty();
        for (bucket, dependencies) in buckets {
            let mut own = match bucket {
                Bucket::Universal => PlatformSet::infinite(),
                Bucket::Platform(platform) => PlatformSet::single(platform.clone()),
            };
            for dependency in dependencies {
                own.intersect(&self.nodes[dependency.0].supported);
            }
            supported.union(&own);
        }
        supported
    }

    fn cycle(&self, key: &VariantKey) -> BakeError {
        let start = self.path.iter().position(|k| k == key).unwrap_or(0);
        let chain = self.path[start..]
            .iter()
            .chain(std::iter::once(key))
            .map(|k| k.to_string())
            .collect::<Vec<_>>()
            .join(" -> ");
        BakeError::Cycle { chain }
    }
}
