// Bidirectional mapping between awareness and document coordinates.
//
// Forward (document -> awareness) runs when the local replica publishes its
// selection and may fail; the dispatcher skips that publish cycle.
// Inverse (awareness -> document) runs when rendering remote cursors and never
// fails outright: an unresolvable path passes through unmodified and an
// offset past the end of a block clamps to the last leaf.

use thiserror::Error;

use crate::path::{
    AwarenessPath, AwarenessPoint, AwarenessSelection, DocumentPath, DocumentPoint, DocumentRange,
    LEAF_TEXT_SLOT,
};
use crate::tree::{DocumentTree, Node, TreeSchema};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TranslationError {
    #[error("path {path} has no node at depth {depth}")]
    Unresolved { path: String, depth: usize },

    #[error("document path {0} does not address a leaf text slot")]
    NotALeaf(String),

    #[error("awareness path {0} does not address an element")]
    NotAnElement(String),

    #[error("document path {0} has no enclosing block")]
    NoBlockAncestor(String),

    #[error("document path {0} addresses an identity marker")]
    MarkerAddressed(String),

    #[error("offset {offset} exceeds leaf length {len}")]
    OffsetOutOfRange { offset: usize, len: usize },

    #[error("block at {0} contains no text leaves")]
    EmptyBlock(String),
}

/// Result of an inverse translation, flagged when it is only a best effort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPoint {
    pub point: DocumentPoint,
    /// Why exact resolution failed; `None` when `point` is exact.
    pub miss: Option<TranslationError>,
}

impl TranslatedPoint {
    pub fn is_exact(&self) -> bool {
        self.miss.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedRange {
    pub anchor: TranslatedPoint,
    pub focus: TranslatedPoint,
}

impl TranslatedRange {
    pub fn is_exact(&self) -> bool {
        self.anchor.is_exact() && self.focus.is_exact()
    }

    pub fn range(&self) -> DocumentRange {
        DocumentRange { anchor: self.anchor.point.clone(), focus: self.focus.point.clone() }
    }

    pub fn misses(&self) -> impl Iterator<Item = &TranslationError> {
        self.anchor.miss.iter().chain(self.focus.miss.iter())
    }
}

/// Outcome of walking a block's children for a flat offset.
enum Walk {
    Found { rel: Vec<usize>, offset: usize },
    Exhausted { consumed: usize, last: Option<(Vec<usize>, usize)> },
}

/// Translates positions against one snapshot of the document tree.
pub struct Translator<'a, T: DocumentTree + ?Sized> {
    tree: &'a T,
    schema: &'a TreeSchema,
}

impl<'a, T: DocumentTree + ?Sized> Translator<'a, T> {
    pub fn new(tree: &'a T, schema: &'a TreeSchema) -> Self {
        Self { tree, schema }
    }

    // ── Forward: document -> awareness ─────────────────────────────

    pub fn to_awareness_selection(
        &self,
        range: &DocumentRange,
    ) -> Result<AwarenessSelection, TranslationError> {
        Ok(AwarenessSelection {
            start: self.to_awareness_point(&range.anchor)?,
            end: self.to_awareness_point(&range.focus)?,
        })
    }

    pub fn to_awareness_point(
        &self,
        point: &DocumentPoint,
    ) -> Result<AwarenessPoint, TranslationError> {
        let leaf_path = match point.path.last() {
            Some(LEAF_TEXT_SLOT) => point.path.parent().unwrap_or_default(),
            _ => return Err(TranslationError::NotALeaf(point.path.to_string())),
        };
        let leaf = match self.tree.node_at(leaf_path.segments()) {
            Some(Node::Leaf(leaf)) => leaf,
            Some(Node::Element(_)) => {
                return Err(TranslationError::NotALeaf(point.path.to_string()));
            }
            None => return Err(unresolved_document(self.tree.root(), &point.path)),
        };
        let len = leaf.char_len();
        if point.offset > len {
            return Err(TranslationError::OffsetOutOfRange { offset: point.offset, len });
        }

        let (block_path, _) = self
            .tree
            .block_ancestor(self.schema, &point.path)
            .ok_or_else(|| TranslationError::NoBlockAncestor(point.path.to_string()))?;

        let path = self.to_awareness_block_path(&block_path)?;
        let offset = self.to_awareness_offset(&block_path, &leaf_path)? + point.offset;
        Ok(AwarenessPoint { path, offset })
    }

    /// Map a block's document path to awareness space, removing the marker
    /// slot at every level whose first child is an identity marker.
    pub fn to_awareness_block_path(
        &self,
        block_path: &DocumentPath,
    ) -> Result<AwarenessPath, TranslationError> {
        let mut node = self.tree.root();
        let mut segments = Vec::with_capacity(block_path.len());
        for (depth, &index) in block_path.segments().iter().enumerate() {
            if self.schema.has_leading_marker(node) {
                if index == 0 {
                    return Err(TranslationError::MarkerAddressed(block_path.to_string()));
                }
                segments.push(index - 1);
            } else {
                segments.push(index);
            }
            node = node.child(index).ok_or_else(|| TranslationError::Unresolved {
                path: block_path.to_string(),
                depth,
            })?;
        }
        Ok(AwarenessPath::new(segments))
    }

    /// Characters of block text that precede the leaf at `leaf_path`.
    fn to_awareness_offset(
        &self,
        block_path: &DocumentPath,
        leaf_path: &DocumentPath,
    ) -> Result<usize, TranslationError> {
        let mut node = self
            .tree
            .node_at(block_path.segments())
            .ok_or_else(|| unresolved_document(self.tree.root(), block_path))?;
        let rel = &leaf_path.segments()[block_path.len()..];
        let mut preceding = 0;
        for &index in rel {
            preceding += self.schema.content_len(&node.children()[..index.min(node.children().len())]);
            node = node
                .child(index)
                .ok_or_else(|| unresolved_document(self.tree.root(), leaf_path))?;
        }
        Ok(preceding)
    }

    // ── Inverse: awareness -> document ─────────────────────────────

    /// Best-effort inverse translation of a remote selection.
    pub fn to_document_range(&self, selection: &AwarenessSelection) -> TranslatedRange {
        TranslatedRange {
            anchor: self.to_document_point(&selection.start),
            focus: self.to_document_point(&selection.end),
        }
    }

    /// Best-effort inverse translation; falls back to the unmodified input.
    pub fn to_document_point(&self, point: &AwarenessPoint) -> TranslatedPoint {
        match self.try_to_document_point(point) {
            Ok(resolved) => TranslatedPoint { point: resolved, miss: None },
            Err(miss) => TranslatedPoint {
                point: DocumentPoint {
                    path: DocumentPath::passthrough(&point.path),
                    offset: point.offset,
                },
                miss: Some(miss),
            },
        }
    }

    pub fn try_to_document_point(
        &self,
        point: &AwarenessPoint,
    ) -> Result<DocumentPoint, TranslationError> {
        let block_path = self.to_document_block_path(&point.path)?;
        self.to_document_offset(&block_path, point.offset)
    }

    /// Map an awareness block path into the document, re-inserting the
    /// marker slot wherever the current node leads with a marker.
    pub fn to_document_block_path(
        &self,
        path: &AwarenessPath,
    ) -> Result<DocumentPath, TranslationError> {
        let mut node = self.tree.root();
        let mut segments = Vec::with_capacity(path.len());
        for (depth, &index) in path.segments().iter().enumerate() {
            let unresolved = || TranslationError::Unresolved { path: path.to_string(), depth };
            let index = if self.schema.has_leading_marker(node) {
                index.checked_add(1).ok_or_else(unresolved)?
            } else {
                index
            };
            node = node.child(index).ok_or_else(unresolved)?;
            segments.push(index);
        }
        if node.is_leaf() {
            return Err(TranslationError::NotAnElement(path.to_string()));
        }
        Ok(DocumentPath::new(segments))
    }

    /// Resolve a flat block offset to a leaf text position, clamping to the
    /// end of the last leaf when the block is shorter than `offset`.
    pub fn to_document_offset(
        &self,
        block_path: &DocumentPath,
        offset: usize,
    ) -> Result<DocumentPoint, TranslationError> {
        let block = self
            .tree
            .node_at(block_path.segments())
            .ok_or_else(|| unresolved_document(self.tree.root(), block_path))?;

        let (rel, offset) = match self.walk(block, offset) {
            Walk::Found { rel, offset } => (rel, offset),
            Walk::Exhausted { last: Some((rel, len)), .. } => (rel, len),
            Walk::Exhausted { last: None, .. } => {
                return Err(TranslationError::EmptyBlock(block_path.to_string()));
            }
        };

        let mut segments = block_path.segments().to_vec();
        segments.extend(rel);
        segments.push(LEAF_TEXT_SLOT);
        Ok(DocumentPoint { path: DocumentPath::new(segments), offset })
    }

    fn walk(&self, element: &Node, target: usize) -> Walk {
        let mut total = 0;
        let mut last = None;
        for (index, child) in element.children().iter().enumerate() {
            match child {
                Node::Leaf(leaf) => {
                    let len = leaf.char_len();
                    if total + len >= target {
                        return Walk::Found { rel: vec![index], offset: target - total };
                    }
                    total += len;
                    last = Some((vec![index], len));
                }
                Node::Element(_) if self.schema.is_marker(child) || self.schema.is_block(child) => {}
                Node::Element(_) => match self.walk(child, target - total) {
                    Walk::Found { mut rel, offset } => {
                        rel.insert(0, index);
                        return Walk::Found { rel, offset };
                    }
                    Walk::Exhausted { consumed, last: inner } => {
                        total += consumed;
                        if let Some((mut rel, len)) = inner {
                            rel.insert(0, index);
                            last = Some((rel, len));
                        }
                    }
                },
            }
        }
        Walk::Exhausted { consumed: total, last }
    }
}

fn unresolved_document(root: &Node, path: &DocumentPath) -> TranslationError {
    let mut node = root;
    let mut depth = 0;
    for &index in path.segments() {
        match node.child(index) {
            Some(child) => {
                node = child;
                depth += 1;
            }
            None => break,
        }
    }
    TranslationError::Unresolved { path: path.to_string(), depth }
}
