// Read-only view of the local rich-text tree.
//
// The replicated document itself is owned by the CRDT layer; presence only
// needs to walk its shape. `Node` mirrors the JSON shape the editing surface
// uses: elements carry `children`, leaves carry `text`, and any other keys are
// free-form attributes (block ids, identity markers, marks).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::DocumentPath;

pub const DEFAULT_BLOCK_ID_ATTRIBUTE: &str = "blockId";
pub const DEFAULT_MARKER_ATTRIBUTE: &str = "marker";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Leaf(Leaf),
    Element(Element),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaf {
    pub text: String,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub children: Vec<Node>,
    #[serde(flatten)]
    pub attrs: Map<String, Value>,
}

impl Leaf {
    /// Length in Unicode scalar values.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl Node {
    pub fn leaf(text: impl Into<String>) -> Self {
        Self::Leaf(Leaf { text: text.into(), attrs: Map::new() })
    }

    pub fn element(children: Vec<Node>) -> Self {
        Self::Element(Element { children, attrs: Map::new() })
    }

    /// Element tagged with a block identifier under the default schema.
    pub fn block(id: &str, children: Vec<Node>) -> Self {
        Self::element(children).with_attr(DEFAULT_BLOCK_ID_ATTRIBUTE, id)
    }

    /// Empty identity-marker element under the default schema.
    pub fn marker() -> Self {
        Self::element(Vec::new()).with_attr(DEFAULT_MARKER_ATTRIBUTE, true)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs_mut().insert(key.to_string(), value.into());
        self
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        match self {
            Self::Leaf(leaf) => &leaf.attrs,
            Self::Element(element) => &element.attrs,
        }
    }

    fn attrs_mut(&mut self) -> &mut Map<String, Value> {
        match self {
            Self::Leaf(leaf) => &mut leaf.attrs,
            Self::Element(element) => &mut element.attrs,
        }
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs().get(key)
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Leaf(_))
    }

    /// Children of an element; leaves have none.
    pub fn children(&self) -> &[Node] {
        match self {
            Self::Leaf(_) => &[],
            Self::Element(element) => &element.children,
        }
    }

    pub fn child(&self, index: usize) -> Option<&Node> {
        self.children().get(index)
    }

    /// Follow `segments` from this node; `None` if any index is out of range.
    pub fn descend(&self, segments: &[usize]) -> Option<&Node> {
        segments.iter().try_fold(self, |node, &index| node.child(index))
    }
}

/// Attribute names that give structural meaning to tree nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeSchema {
    /// Attribute holding a block's identifier.
    pub block_id_attribute: String,
    /// Attribute flagging a synthetic identity-marker child.
    pub marker_attribute: String,
}

impl Default for TreeSchema {
    fn default() -> Self {
        Self {
            block_id_attribute: DEFAULT_BLOCK_ID_ATTRIBUTE.to_string(),
            marker_attribute: DEFAULT_MARKER_ATTRIBUTE.to_string(),
        }
    }
}

impl TreeSchema {
    /// Block identifier of an element; leaves are never blocks.
    pub fn block_id<'a>(&self, node: &'a Node) -> Option<&'a str> {
        if node.is_leaf() {
            return None;
        }
        node.attr(&self.block_id_attribute).and_then(Value::as_str)
    }

    pub fn is_block(&self, node: &Node) -> bool {
        self.block_id(node).is_some()
    }

    /// A marker attribute counts when present and not `false`/`null`.
    pub fn is_marker(&self, node: &Node) -> bool {
        match node.attr(&self.marker_attribute) {
            None | Some(Value::Null) | Some(Value::Bool(false)) => false,
            Some(_) => true,
        }
    }

    /// Whether slot 0 of `node` is occupied by an identity marker.
    pub fn has_leading_marker(&self, node: &Node) -> bool {
        node.child(0).is_some_and(|first| self.is_marker(first))
    }

    /// Text length contributed by `node` to an enclosing block's flat offset
    /// space. Markers and nested blocks own no characters of the parent.
    pub fn counted_len(&self, node: &Node) -> usize {
        match node {
            Node::Leaf(leaf) => leaf.char_len(),
            Node::Element(_) if self.is_marker(node) || self.is_block(node) => 0,
            Node::Element(element) => self.content_len(&element.children),
        }
    }

    /// Total counted length of a list of siblings.
    pub fn content_len(&self, children: &[Node]) -> usize {
        children.iter().map(|child| self.counted_len(child)).sum()
    }
}

/// Read-only access to a document tree.
pub trait DocumentTree {
    fn root(&self) -> &Node;

    fn node_at(&self, path: &[usize]) -> Option<&Node> {
        self.root().descend(path)
    }

    /// Children of the block carrying `block_id`, searched depth-first.
    fn document_children(&self, schema: &TreeSchema, block_id: &str) -> Option<&[Node]> {
        find_block(self.root(), schema, block_id).map(Node::children)
    }

    /// Innermost block strictly enclosing the node at `path`, as
    /// `(block path, block id)`.
    fn block_ancestor(&self, schema: &TreeSchema, path: &DocumentPath) -> Option<(DocumentPath, String)> {
        let segments = path.segments();
        let mut node = self.root();
        let mut found = schema.block_id(node).map(|id| (DocumentPath::default(), id.to_string()));
        for depth in 0..segments.len().saturating_sub(1) {
            node = node.child(segments[depth])?;
            if let Some(id) = schema.block_id(node) {
                found = Some((DocumentPath::new(segments[..=depth].to_vec()), id.to_string()));
            }
        }
        found
    }
}

fn find_block<'a>(node: &'a Node, schema: &TreeSchema, block_id: &str) -> Option<&'a Node> {
    if schema.block_id(node) == Some(block_id) {
        return Some(node);
    }
    node.children().iter().find_map(|child| find_block(child, schema, block_id))
}

/// Owned snapshot of a document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    root: Node,
}

impl Document {
    /// Wrap top-level nodes in an untagged root element.
    pub fn new(children: Vec<Node>) -> Self {
        Self { root: Node::element(children) }
    }

    pub fn from_root(root: Node) -> Self {
        Self { root }
    }

    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let children: Vec<Node> = serde_json::from_value(value)?;
        Ok(Self::new(children))
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl DocumentTree for Document {
    fn root(&self) -> &Node {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document::from_json(json!([
            { "blockId": "b1", "children": [
                { "marker": true, "children": [] },
                { "leaf": true, "text": "Hello" }
            ]},
            { "blockId": "b2", "children": [
                { "text": "one " },
                { "type": "link", "children": [{ "text": "two" }] },
                { "blockId": "b3", "children": [{ "text": "nested" }] }
            ]}
        ]))
        .unwrap()
    }

    #[test]
    fn json_shapes_parse_into_leaves_and_elements() {
        let doc = sample();
        let b1 = doc.node_at(&[0]).unwrap();
        assert!(!b1.is_leaf());
        assert!(b1.child(0).unwrap().children().is_empty());
        match b1.child(1).unwrap() {
            Node::Leaf(leaf) => {
                assert_eq!(leaf.text, "Hello");
                assert_eq!(leaf.attrs.get("leaf"), Some(&json!(true)));
            }
            other => panic!("expected leaf, got {other:?}"),
        }
    }

    #[test]
    fn schema_detects_markers_and_blocks() {
        let schema = TreeSchema::default();
        let doc = sample();
        let b1 = doc.node_at(&[0]).unwrap();
        assert!(schema.is_block(b1));
        assert!(schema.has_leading_marker(b1));
        assert!(!schema.has_leading_marker(doc.node_at(&[1]).unwrap()));
        assert!(!schema.is_marker(&Node::element(vec![]).with_attr("marker", false)));
    }

    #[test]
    fn counted_len_skips_markers_and_nested_blocks() {
        let schema = TreeSchema::default();
        let doc = sample();
        assert_eq!(schema.content_len(doc.node_at(&[0]).unwrap().children()), 5);
        assert_eq!(schema.content_len(doc.node_at(&[1]).unwrap().children()), 7);
    }

    #[test]
    fn char_len_counts_scalar_values() {
        let leaf = Leaf { text: "héllo🙂".into(), attrs: Map::new() };
        assert_eq!(leaf.char_len(), 6);
    }

    #[test]
    fn block_ancestor_is_innermost_enclosing_block() {
        let schema = TreeSchema::default();
        let doc = sample();

        let (path, id) = doc.block_ancestor(&schema, &DocumentPath::new(vec![1, 1, 0, 0])).unwrap();
        assert_eq!(id, "b2");
        assert_eq!(path, DocumentPath::new(vec![1]));

        let (path, id) = doc.block_ancestor(&schema, &DocumentPath::new(vec![1, 2, 0, 0])).unwrap();
        assert_eq!(id, "b3");
        assert_eq!(path, DocumentPath::new(vec![1, 2]));
    }

    #[test]
    fn block_ancestor_missing_for_unknown_path() {
        let schema = TreeSchema::default();
        assert!(sample().block_ancestor(&schema, &DocumentPath::new(vec![9, 0, 0])).is_none());
    }

    #[test]
    fn document_children_by_block_id() {
        let schema = TreeSchema::default();
        let doc = sample();
        assert_eq!(doc.document_children(&schema, "b3").map(<[Node]>::len), Some(1));
        assert!(doc.document_children(&schema, "missing").is_none());
    }
}
