//! Path lookups into a decoded [`RawNode`] tree.
//!
//! Absence is a normal outcome here, never an error: a missing key or a
//! non-map intermediate node simply yields `None`.

use crate::xml_tree::RawNode;

/// Walk `path` key by key from `node`.
pub fn locate<'a>(node: &'a RawNode, path: &[&str]) -> Option<&'a RawNode> {
    path.iter().try_fold(node, |current, key| current.get(key))
}

/// Whether a located node carries a usable value. An empty text leaf
/// (`<Tag/>` or `<Tag></Tag>`) counts as no value so the next fallback is tried.
fn is_present(node: &RawNode) -> bool {
    !matches!(node, RawNode::Text(text) if text.is_empty())
}

/// Try each path in order and return the first present value.
pub fn locate_first<'a>(node: &'a RawNode, paths: &[&[&str]]) -> Option<&'a RawNode> {
    paths
        .iter()
        .filter_map(|path| locate(node, path))
        .find(|found| is_present(found))
}

/// One logical field together with its ordered fallback paths.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    /// Name used in logs and section errors.
    pub name: &'static str,
    /// Candidate paths, highest priority first.
    pub paths: &'static [&'static [&'static str]],
}

impl FieldSpec {
    pub fn resolve<'a>(&self, tree: &'a RawNode) -> Option<&'a RawNode> {
        locate_first(tree, self.paths)
    }
}

/// A possibly repeated element after decoding: missing, one occurrence, or
/// several occurrences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeated<'a> {
    Absent,
    Single(&'a RawNode),
    Many(&'a [RawNode]),
}

impl<'a> Repeated<'a> {
    pub fn of(node: Option<&'a RawNode>) -> Self {
        match node {
            None => Repeated::Absent,
            Some(node) if node.is_blank() => Repeated::Absent,
            Some(RawNode::List(items)) => Repeated::Many(items),
            Some(node) => Repeated::Single(node),
        }
    }

    /// Flatten to a uniform sequence; a single occurrence becomes one element.
    pub fn into_nodes(self) -> Vec<&'a RawNode> {
        match self {
            Repeated::Absent => Vec::new(),
            Repeated::Single(node) => vec![node],
            Repeated::Many(items) => items.iter().collect(),
        }
    }
}
