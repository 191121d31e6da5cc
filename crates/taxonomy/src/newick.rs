//! Reader for bracket-notation (newick) trees.
//!
//! Only topology and labels are kept; branch lengths are skipped.

use crate::error::{Result, TaxonomyError};
use serde::Serialize;

/// Node of a parsed bracket tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    /// Raw label with quoting removed
    pub label: Option<String>,

    /// Children in source order (empty for leaves)
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            children: Vec::new(),
        }
    }

    pub fn internal(label: Option<String>, children: Vec<TreeNode>) -> Self {
        Self { label, children }
    }

    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Labels of every leaf below this node, left to right
    #[must_use]
    pub fn leaf_labels(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_leaf_labels(&mut out);
        out
    }

    fn collect_leaf_labels<'a>(&'a self, out: &mut Vec<&'a str>) {
        if self.is_leaf() {
            if let Some(label) = self.label.as_deref() {
                out.push(label);
            }
            return;
        }
        for child in &self.children {
            child.collect_leaf_labels(out);
        }
    }

    /// Pre-order walk over this node and all descendants
    pub fn walk(&self) -> impl Iterator<Item = &TreeNode> {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            let node = stack.pop()?;
            stack.extend(node.children.iter().rev());
            Some(node)
        })
    }
}

/// Parse every `;`-terminated tree in `text`.
pub fn parse_forest(text: &str) -> Result<Vec<TreeNode>> {
    let mut reader = Reader::new(text);
    let mut trees = Vec::new();
    loop {
        reader.skip_whitespace();
        if reader.at_end() {
            break;
        }
        trees.push(reader.tree()?);
    }
    Ok(trees)
}

/// Parse text that must contain exactly one tree.
///
/// A missing trailing `;` is tolerated for a single tree.
pub fn parse_tree(text: &str) -> Result<TreeNode> {
    let trimmed = text.trim();
    let owned;
    let text = if trimmed.ends_with(';') {
        trimmed
    } else {
        owned = format!("{trimmed};");
        owned.as_str()
    };
    let mut trees = parse_forest(text)?;
    match trees.len() {
        1 => Ok(trees.remove(0)),
        0 => Err(TaxonomyError::parse(0, "no tree found")),
        n => Err(TaxonomyError::parse(0, format!("expected one tree, found {n}"))),
    }
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
}

impl Reader {
    fn new(text: &str) -> Self {
        Self {
            chars: text.chars().collect(),
            pos: 0,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        self.skip_whitespace();
        match self.peek() {
            Some(found) if found == ch => {
                self.pos += 1;
                Ok(())
            }
            Some(found) => Err(TaxonomyError::parse(
                self.pos,
                format!("expected '{ch}', found '{found}'"),
            )),
            None => Err(TaxonomyError::parse(
                self.pos,
                format!("expected '{ch}', found end of input"),
            )),
        }
    }

    fn tree(&mut self) -> Result<TreeNode> {
        let node = self.subtree()?;
        self.expect(';')?;
        Ok(node)
    }

    fn subtree(&mut self) -> Result<TreeNode> {
        self.skip_whitespace();
        let node = if self.peek() == Some('(') {
            self.pos += 1;
            let mut children = vec![self.subtree()?];
            loop {
                self.skip_whitespace();
                match self.peek() {
                    Some(',') => {
                        self.pos += 1;
                        children.push(self.subtree()?);
                    }
                    Some(')') => {
                        self.pos += 1;
                        break;
                    }
                    Some(found) => {
                        return Err(TaxonomyError::parse(
                            self.pos,
                            format!("expected ',' or ')', found '{found}'"),
                        ))
                    }
                    None => return Err(TaxonomyError::parse(self.pos, "unclosed '('")),
                }
            }
            let label = self.label()?;
            TreeNode::internal(label, children)
        } else {
            let label = self
                .label()?
                .ok_or_else(|| TaxonomyError::parse(self.pos, "leaf without label"))?;
            TreeNode::leaf(label)
        };
        self.skip_length();
        Ok(node)
    }

    fn label(&mut self) -> Result<Option<String>> {
        self.skip_whitespace();
        if self.peek() == Some('\'') {
            return self.quoted_label().map(Some);
        }
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if matches!(ch, '(' | ')' | ',' | ':' | ';' | '\'') {
                break;
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Ok(None)
        } else {
            Ok(Some(trimmed.to_string()))
        }
    }

    fn quoted_label(&mut self) -> Result<String> {
        let start = self.pos;
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                Some('\'') => {
                    if self.chars.get(self.pos + 1) == Some(&'\'') {
                        out.push('\'');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        return Ok(out);
                    }
                }
                Some(ch) => {
                    out.push(ch);
                    self.pos += 1;
                }
                None => return Err(TaxonomyError::parse(start, "unterminated quoted label")),
            }
        }
    }

    fn skip_length(&mut self) {
        self.skip_whitespace();
        if self.peek() != Some(':') {
            return;
        }
        self.pos += 1;
        while let Some(ch) = self.peek() {
            if matches!(ch, ',' | ')' | ';') {
                break;
            }
            self.pos += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_nested_tree_with_lengths() {
        let tree = parse_tree("((a:1,b:2)X:0.5,c)root;").unwrap();
        assert_eq!(tree.label.as_deref(), Some("root"));
        assert_eq!(tree.leaf_labels(), vec!["a", "b", "c"]);
        assert_eq!(tree.children[0].label.as_deref(), Some("X"));
    }

    #[test]
    fn parses_quoted_labels_with_escapes() {
        let tree = parse_tree("('Old English [olde1238][ang]-l-','O''Brien [obri1234]')'Anglic [angl1265]';")
            .unwrap();
        assert_eq!(tree.label.as_deref(), Some("Anglic [angl1265]"));
        assert_eq!(
            tree.leaf_labels(),
            vec!["Old English [olde1238][ang]-l-", "O'Brien [obri1234]"]
        );
    }

    #[test]
    fn parses_forest_one_tree_per_line() {
        let forest = parse_forest("(a,b)x;\n(c,d)y;\n").unwrap();
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[1].leaf_labels(), vec!["c", "d"]);
    }

    #[test]
    fn tolerates_missing_semicolon_for_single_tree() {
        let tree = parse_tree("((a,b),c)").unwrap();
        assert_eq!(tree.leaf_labels(), vec!["a", "b", "c"]);
        assert_eq!(tree.label, None);
    }

    #[test]
    fn rejects_unbalanced_brackets() {
        let err = parse_tree("((a,b),c").unwrap_err();
        assert!(matches!(err, TaxonomyError::ParseError { .. }), "{err}");
    }

    #[test]
    fn rejects_unlabelled_leaf() {
        assert!(parse_tree("(a,,b);").is_err());
    }

    #[test]
    fn walk_is_preorder() {
        let tree = parse_tree("((a,b)x,c)r;").unwrap();
        let labels: Vec<_> = tree.walk().filter_map(|n| n.label.as_deref()).collect();
        assert_eq!(labels, vec!["r", "x", "a", "b", "c"]);
    }
}
