use crate::error::{Result, TaxonomyError};
use crate::geography::GeoRecord;
use crate::label::NodeLabel;
use crate::newick::{self, TreeNode};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;
use std::collections::HashMap;

/// One step of a classification chain
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Clade {
    /// Display name (e.g., "Germanic")
    pub name: String,

    /// Clade code (e.g., "germ1287")
    pub code: String,
}

impl Clade {
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
        }
    }

    /// Case-insensitive match against the display name or the code
    #[must_use]
    pub fn matches(&self, token: &str) -> bool {
        self.name.eq_ignore_ascii_case(token) || self.code.eq_ignore_ascii_case(token)
    }
}

impl From<&NodeLabel> for Clade {
    fn from(label: &NodeLabel) -> Self {
        Self::new(label.name.clone(), label.clade_code.clone())
    }
}

/// Lookup structure over a classification forest
///
/// Nodes live in a directed graph with parent -> child edges; every node is
/// indexed under its clade code and, when present, its ISO code.
#[derive(Debug, Clone, Default)]
pub struct TaxonomyIndex {
    pub(crate) graph: DiGraph<NodeLabel, ()>,
    pub(crate) node_index: HashMap<String, NodeIndex>,
    classifications: HashMap<String, Vec<Clade>>,
    clade_names: HashMap<String, String>,
    pub(crate) geography: HashMap<String, GeoRecord>,
}

impl TaxonomyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a forest in bracket notation and index it
    pub fn from_newick(text: &str) -> Result<Self> {
        let forest = newick::parse_forest(text)?;
        Self::build(&forest)
    }

    /// Index every node of every tree in `forest`
    pub fn build(forest: &[TreeNode]) -> Result<Self> {
        let mut index = Self::new();
        for tree in forest {
            let mut chain = Vec::new();
            index.insert_subtree(tree, None, &mut chain)?;
        }

        log::info!(
            "Built taxonomy index: {} nodes, {} identifiers, {} trees",
            index.graph.node_count(),
            index.classifications.len(),
            forest.len()
        );

        Ok(index)
    }

    fn insert_subtree(
        &mut self,
        node: &TreeNode,
        parent: Option<NodeIndex>,
        chain: &mut Vec<Clade>,
    ) -> Result<()> {
        let raw = node
            .label
            .as_deref()
            .ok_or_else(|| TaxonomyError::format("taxonomy node without a label"))?;
        let label = NodeLabel::parse(raw)?;

        self.clade_names
            .insert(label.clade_code.clone(), label.name.clone());
        for id in label.identifiers() {
            if self.classifications.contains_key(id) {
                log::warn!("Identifier '{id}' occurs more than once in the taxonomy; keeping the last");
            }
            self.classifications.insert(id.to_string(), chain.clone());
        }

        let clade = Clade::from(&label);
        let idx = self.add_node(label);
        if let Some(parent) = parent {
            self.graph.add_edge(parent, idx, ());
        }

        chain.push(clade);
        for child in &node.children {
            self.insert_subtree(child, Some(idx), chain)?;
        }
        chain.pop();

        Ok(())
    }

    fn add_node(&mut self, label: NodeLabel) -> NodeIndex {
        let ids: Vec<String> = label.identifiers().map(str::to_string).collect();
        let idx = self.graph.add_node(label);
        for id in ids {
            self.node_index.insert(id, idx);
        }
        idx
    }

    /// Ancestor chain of `id`, root first, excluding the node itself
    #[must_use]
    pub fn classification(&self, id: &str) -> Option<&[Clade]> {
        self.classifications.get(id).map(Vec::as_slice)
    }

    /// Like [`classification`](Self::classification), but unknown identifiers
    /// get an empty chain
    #[must_use]
    pub fn classification_or_empty(&self, id: &str) -> &[Clade] {
        self.classification(id).unwrap_or(&[])
    }

    /// Display name of a clade code
    #[must_use]
    pub fn clade_name(&self, code: &str) -> Option<&str> {
        self.clade_names.get(code).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.classifications.contains_key(id)
    }

    /// Decoded label of the node indexed under `id`
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeLabel> {
        self.node_index
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: &str) -> Result<Vec<&NodeLabel>> {
        let start = self
            .node_index
            .get(id)
            .copied()
            .ok_or_else(|| TaxonomyError::UnknownNode(id.to_string()))?;
        Ok(self
            .ancestor_indices(start)
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect())
    }

    pub(crate) fn ancestor_indices(&self, start: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        let mut current = start;
        std::iter::from_fn(move || {
            let parent = self
                .graph
                .neighbors_directed(current, Direction::Incoming)
                .next()?;
            current = parent;
            Some(parent)
        })
    }

    /// Clade codes of every leaf node, sorted
    #[must_use]
    pub fn leaves(&self) -> Vec<String> {
        let mut leaves: Vec<String> = self
            .graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(|label| label.clade_code.clone())
            .collect();
        leaves.sort();
        leaves.dedup();
        leaves
    }

    /// Length of the longest classification chain among `ids`
    #[must_use]
    pub fn max_depth<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        ids.into_iter()
            .map(|id| self.classification_or_empty(id).len())
            .max()
            .unwrap_or(0)
    }

    /// Number of indexed nodes
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }
}
