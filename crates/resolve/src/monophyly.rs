//! Monophyly constraint trees derived from the classification.
//!
//! The constraint tree is a plain value (leaf or list of subtrees), built by
//! recursively partitioning the language list by classification entry at
//! successive depths.

use crate::config::{MonophylyDirection, MonophylyOptions};
use crate::error::{ResolveError, Result};
use crate::notes::Notes;
use phylo_taxonomy::newick::{self, TreeNode};
use phylo_taxonomy::TaxonomyIndex;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

/// Nested clade structure over language identifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Monophyly {
    Leaf(String),
    Clade(Vec<Monophyly>),
}

impl Monophyly {
    fn flat(mut languages: Vec<String>) -> Self {
        languages.sort();
        Self::Clade(languages.into_iter().map(Self::Leaf).collect())
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Leaves left to right
    #[must_use]
    pub fn leaves(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Leaf(id) => out.push(id),
            Self::Clade(children) => children.iter().for_each(|c| c.collect_leaves(out)),
        }
    }

    #[must_use]
    pub fn leaf_set(&self) -> BTreeSet<&str> {
        self.leaves().into_iter().collect()
    }

    /// Nesting depth, seeing through single-element wrappers
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf(_) => 0,
            Self::Clade(children) if children.len() == 1 => children[0].depth(),
            Self::Clade(children) => 1 + children.iter().map(Self::depth).max().unwrap_or(0),
        }
    }

    fn first_leaf(&self) -> Option<&str> {
        match self {
            Self::Leaf(id) => Some(id),
            Self::Clade(children) => children.iter().find_map(Self::first_leaf),
        }
    }

    /// Deeper structures first, then by first leaf
    fn sort_key(&self) -> (Reverse<usize>, String) {
        (
            Reverse(self.depth()),
            self.first_leaf().unwrap_or_default().to_string(),
        )
    }

    /// Collapse single-element wrappers: `[[x]] -> x`
    #[must_use]
    pub fn flatten(self) -> Self {
        match self {
            Self::Leaf(_) => self,
            Self::Clade(mut children) if children.len() == 1 => children.remove(0).flatten(),
            Self::Clade(children) => {
                Self::Clade(children.into_iter().map(Self::flatten).collect())
            }
        }
    }

    /// True if the structure is more than a flat polytomy
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        match self.clone().flatten() {
            Self::Leaf(_) => false,
            Self::Clade(children) => children.iter().any(|c| !c.is_leaf()),
        }
    }

    /// Bracket notation: `((a,b),c)`
    #[must_use]
    pub fn to_newick(&self) -> String {
        match self {
            Self::Leaf(id) => id.clone(),
            Self::Clade(children) if children.len() == 1 => children[0].to_newick(),
            Self::Clade(children) => {
                let inner: Vec<String> = children.iter().map(Self::to_newick).collect();
                format!("({})", inner.join(","))
            }
        }
    }

    /// Every clade node, pre-order
    fn clades(&self) -> Vec<&[Monophyly]> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Clade(children) = node {
                out.push(children.as_slice());
                stack.extend(children.iter().rev());
            }
        }
        out
    }

    /// Whether constraining `clade` to be monophyletic is compatible with
    /// this tree.
    ///
    /// Holds iff some node's leaf set contains `clade` and at that node the
    /// sets are equal, or the node has only leaf children, or every child
    /// lies wholly inside or wholly outside `clade`.
    #[must_use]
    pub fn admits(&self, clade: &BTreeSet<String>) -> bool {
        let clade: BTreeSet<&str> = clade.iter().map(String::as_str).collect();
        self.clades().into_iter().any(|children| {
            let leaves: BTreeSet<&str> = children.iter().flat_map(Monophyly::leaves).collect();
            if !clade.is_subset(&leaves) {
                return false;
            }
            if clade == leaves || children.iter().all(Monophyly::is_leaf) {
                return true;
            }
            children.iter().all(|child| {
                let child_leaves = child.leaf_set();
                child_leaves.is_subset(&clade) || child_leaves.is_disjoint(&clade)
            })
        })
    }
}

/// Partition `languages` by classification entry from `depth` down to `max_depth`.
///
/// The result is independent of the input order.
#[must_use]
pub fn partition(
    languages: &[String],
    taxonomy: &TaxonomyIndex,
    depth: usize,
    max_depth: usize,
) -> Monophyly {
    if depth > max_depth {
        return Monophyly::flat(languages.to_vec());
    }

    let entry = |lang: &str| {
        taxonomy
            .classification_or_empty(lang)
            .get(depth)
            .map(|clade| clade.code.as_str())
    };

    let levels: BTreeSet<Option<&str>> = languages.iter().map(|l| entry(l)).collect();
    if levels.len() <= 1 {
        return match levels.into_iter().next().flatten() {
            None => Monophyly::flat(languages.to_vec()),
            Some(_) => partition(languages, taxonomy, depth + 1, max_depth),
        };
    }

    let mut groups: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    let mut isolates: Vec<Vec<String>> = Vec::new();
    for lang in languages {
        match entry(lang) {
            Some(code) => groups.entry(code).or_default().push(lang.clone()),
            None => isolates.push(vec![lang.clone()]),
        }
    }

    let mut parts: Vec<Monophyly> = groups
        .into_values()
        .chain(isolates)
        .map(|group| partition(&group, taxonomy, depth + 1, max_depth))
        .collect();
    parts.sort_by_cached_key(Monophyly::sort_key);
    Monophyly::Clade(parts)
}

/// Active constraint: the tree and its bracket rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonophylyConstraint {
    pub tree: Monophyly,
    pub newick: String,
}

impl MonophylyConstraint {
    fn new(tree: Monophyly) -> Self {
        let newick = tree.to_newick();
        Self { tree, newick }
    }
}

/// Minimum number of languages for a constraint to say anything
const MIN_CONSTRAINED_LANGUAGES: usize = 3;

pub struct MonophylyBuilder<'a> {
    options: &'a MonophylyOptions,
    taxonomy: &'a TaxonomyIndex,
}

impl<'a> MonophylyBuilder<'a> {
    pub fn new(options: &'a MonophylyOptions, taxonomy: &'a TaxonomyIndex) -> Self {
        Self { options, taxonomy }
    }

    /// Build the constraint for `languages`, or `None` when constraints are
    /// off or would not constrain anything.
    pub fn build(
        &self,
        languages: &[String],
        notes: &mut Notes,
    ) -> Result<Option<MonophylyConstraint>> {
        if !self.options.enabled {
            return Ok(None);
        }
        if languages.len() < MIN_CONSTRAINED_LANGUAGES {
            notes.info(format!(
                "Disabling monophyly constraints: only {} language(s) in the analysis",
                languages.len()
            ));
            return Ok(None);
        }

        let tree = match self.options.newick.as_deref() {
            Some(text) => user_tree(text, languages, notes)?,
            None => self.classification_tree(languages, notes),
        };

        let tree = tree.flatten();
        if !tree.is_meaningful() {
            notes.info(
                "Disabling monophyly constraints: the classification does not \
                 discriminate between any of the analysis languages",
            );
            return Ok(None);
        }

        let constraint = MonophylyConstraint::new(tree);
        log::debug!("Monophyly constraint: {}", constraint.newick);
        Ok(Some(constraint))
    }

    fn classification_tree(&self, languages: &[String], notes: &mut Notes) -> Monophyly {
        let unclassified: Vec<&str> = languages
            .iter()
            .map(String::as_str)
            .filter(|lang| !self.taxonomy.contains(lang))
            .collect();
        if !unclassified.is_empty() {
            notes.warn(format!(
                "Languages missing from the classification are forced into an outgroup: {}",
                unclassified.join(", ")
            ));
        }

        let (start, end) = self.depth_window(languages);
        log::debug!("Monophyly depth window: {start}..={end}");
        partition(languages, self.taxonomy, start, end)
    }

    /// Inclusive classification depth window
    fn depth_window(&self, languages: &[String]) -> (usize, usize) {
        let opts = self.options;
        let levels = opts.levels.unwrap_or(usize::MAX);
        if let Some(end) = opts.end_depth {
            return (opts.start_depth, end);
        }
        match opts.direction {
            MonophylyDirection::TopDown => {
                (opts.start_depth, opts.start_depth.saturating_add(levels))
            }
            MonophylyDirection::BottomUp => {
                let max_depth = self
                    .taxonomy
                    .max_depth(languages.iter().map(String::as_str));
                let end = max_depth.saturating_sub(opts.start_depth);
                (end.saturating_sub(levels), end)
            }
        }
    }
}

/// Constraint tree from user-supplied bracket text, restricted to `languages`
fn user_tree(text: &str, languages: &[String], notes: &mut Notes) -> Result<Monophyly> {
    let parsed = newick::parse_tree(text).map_err(|err| {
        ResolveError::config(format!("monophyly_newick is not a valid tree: {err}"))
    })?;

    let wanted: BTreeSet<&str> = languages.iter().map(String::as_str).collect();
    let mut seen = BTreeSet::new();
    for label in parsed.leaf_labels() {
        if !seen.insert(label) {
            return Err(ResolveError::config(format!(
                "monophyly_newick lists '{label}' more than once"
            )));
        }
    }

    let pruned = seen.iter().filter(|l| !wanted.contains(*l)).count();
    if pruned > 0 {
        log::debug!("Pruned {pruned} leaves not in the analysis from monophyly_newick");
    }

    let mut tree = match restrict(&parsed, &wanted) {
        Some(Monophyly::Clade(children)) => children,
        Some(leaf) => vec![leaf],
        None => Vec::new(),
    };

    let missing: Vec<&str> = wanted.difference(&seen).copied().collect();
    if !missing.is_empty() {
        notes.warn(format!(
            "Languages missing from monophyly_newick are placed at the root: {}",
            missing.join(", ")
        ));
        tree.extend(missing.into_iter().map(|l| Monophyly::Leaf(l.to_string())));
    }

    Ok(Monophyly::Clade(tree))
}

fn restrict(node: &TreeNode, wanted: &BTreeSet<&str>) -> Option<Monophyly> {
    if node.is_leaf() {
        let label = node.label.as_deref()?;
        return wanted
            .contains(label)
            .then(|| Monophyly::Leaf(label.to_string()));
    }
    let children: Vec<Monophyly> = node
        .children
        .iter()
        .filter_map(|child| restrict(child, wanted))
        .collect();
    (!children.is_empty()).then_some(Monophyly::Clade(children))
}
