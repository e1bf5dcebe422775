//! In-memory hierarchy backed by a flat node list, loadable from JSON.

use super::expander::{HierarchyResolver, ResolverError};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// One node of an organisational hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: String,
    #[serde(default)]
    pub parent: Option<String>,
    pub level: u32,
}

#[derive(Debug, Deserialize)]
struct HierarchyFile {
    nodes: Vec<HierarchyNode>,
}

/// Static hierarchy resolver.
///
/// Descendants are returned in pre-order, children in insertion order. The
/// node itself is never part of its own descendant list, and a node reachable
/// twice (through a parent cycle or a repeated insert) is listed once.
#[derive(Debug, Default, Clone)]
pub struct StaticHierarchy {
    levels: HashMap<String, u32>,
    children: HashMap<String, Vec<String>>,
}

impl StaticHierarchy {
    pub fn new(nodes: impl IntoIterator<Item = HierarchyNode>) -> Self {
        let mut hierarchy = Self::default();
        for node in nodes {
            hierarchy.insert(node);
        }
        hierarchy
    }

    /// Load `{"nodes": [{"id": ..., "parent": ..., "level": ...}, ...]}`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: HierarchyFile = serde_json::from_str(json)?;
        Ok(Self::new(file.nodes))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&json)
    }

    pub fn insert(&mut self, node: HierarchyNode) {
        if let Some(parent) = &node.parent {
            self.children.entry(parent.clone()).or_default().push(node.id.clone());
        }
        self.levels.insert(node.id, node.level);
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    fn walk(&self, node: &str, levels: Option<&BTreeSet<u32>>) -> Vec<String> {
        let mut out = Vec::new();
        let mut visited: HashSet<&str> = HashSet::from([node]);
        let mut stack: Vec<&String> = self
            .children
            .get(node)
            .map(|c| c.iter().rev().collect())
            .unwrap_or_default();

        while let Some(id) = stack.pop() {
            if !visited.insert(id.as_str()) {
                continue;
            }
            let keep = match (levels, self.levels.get(id)) {
                (None, _) => true,
                (Some(filter), Some(level)) => filter.contains(level),
                (Some(_), None) => false,
            };
            if keep {
                out.push(id.clone());
            }
            if let Some(children) = self.children.get(id) {
                stack.extend(children.iter().rev());
            }
        }
        out
    }
}

#[async_trait]
impl HierarchyResolver for StaticHierarchy {
    async fn descendants(
        &self,
        node: &str,
        levels: Option<&BTreeSet<u32>>,
    ) -> std::result::Result<Vec<String>, ResolverError> {
        if !self.levels.contains_key(node) {
            return Err(ResolverError::UnknownNode(node.to_string()));
        }
        Ok(self.walk(node, levels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn node(id: &str, parent: Option<&str>, level: u32) -> HierarchyNode {
        HierarchyNode {
            id: id.to_string(),
            parent: parent.map(str::to_string),
            level,
        }
    }

    fn sample() -> StaticHierarchy {
        StaticHierarchy::new([
            node("country", None, 1),
            node("north", Some("country"), 2),
            node("south", Some("country"), 2),
            node("n-clinic-1", Some("north"), 3),
            node("n-clinic-2", Some("north"), 3),
            node("s-clinic-1", Some("south"), 3),
        ])
    }

    #[tokio::test]
    async fn test_descendants_pre_order() {
        let ids = sample().descendants("country", None).await.unwrap();
        assert_eq!(ids, vec!["north", "n-clinic-1", "n-clinic-2", "south", "s-clinic-1"]);
    }

    #[tokio::test]
    async fn test_level_filter() {
        let levels: BTreeSet<u32> = [3].into_iter().collect();
        let ids = sample().descendants("country", Some(&levels)).await.unwrap();
        assert_eq!(ids, vec!["n-clinic-1", "n-clinic-2", "s-clinic-1"]);
    }

    #[tokio::test]
    async fn test_unknown_and_leaf_nodes() {
        let hierarchy = sample();
        assert_eq!(
            hierarchy.descendants("atlantis", None).await,
            Err(ResolverError::UnknownNode("atlantis".into()))
        );
        assert!(hierarchy.descendants("s-clinic-1", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_parent_cycle_terminates() {
        let hierarchy = StaticHierarchy::new([node("a", Some("b"), 1), node("b", Some("a"), 2)]);
        assert_eq!(hierarchy.descendants("a", None).await.unwrap(), vec!["b"]);
        assert_eq!(hierarchy.descendants("b", None).await.unwrap(), vec!["a"]);

        let selfish = StaticHierarchy::new([node("x", Some("x"), 1)]);
        assert!(selfish.descendants("x", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_insert_is_listed_once() {
        let mut hierarchy = sample();
        hierarchy.insert(node("n-clinic-1", Some("north"), 3));
        let ids = hierarchy.descendants("north", None).await.unwrap();
        assert_eq!(ids, vec!["n-clinic-1", "n-clinic-2"]);
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"nodes": [{{"id": "root", "level": 1}}, {{"id": "child", "parent": "root", "level": 2}}]}}"#
        )
        .unwrap();

        let hierarchy = StaticHierarchy::load(file.path()).await.unwrap();
        assert_eq!(hierarchy.len(), 2);
        assert_eq!(hierarchy.descendants("root", None).await.unwrap(), vec!["child"]);
    }
}
