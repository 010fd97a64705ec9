// Position types for the two coordinate spaces used by presence sync.
//
// Awareness coordinates are what peers broadcast: a block path plus a flat
// character offset inside that block. Document coordinates are what the local
// editing surface uses: a path that always ends in a leaf text slot plus an
// offset inside that leaf. The two path types are deliberately distinct so one
// can never be passed where the other is expected.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of the implicit text child held by every leaf node.
pub const LEAF_TEXT_SLOT: usize = 0;

/// Structural path in awareness space.
///
/// Never ends in a text-leaf index and never counts identity-marker children.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AwarenessPath(Vec<usize>);

impl AwarenessPath {
    pub fn new(segments: Vec<usize>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<usize>> for AwarenessPath {
    fn from(segments: Vec<usize>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for AwarenessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.0)
    }
}

/// Path into the live rich-text tree. Always ends in a leaf text slot.
///
/// Only valid while the document structure that produced it is unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(Vec<usize>);

impl DocumentPath {
    pub fn new(segments: Vec<usize>) -> Self {
        Self(segments)
    }

    /// Reinterpret awareness segments verbatim as a document path.
    ///
    /// Used only as the best-effort result when a remote path cannot be
    /// resolved against the local tree.
    pub fn passthrough(path: &AwarenessPath) -> Self {
        Self(path.segments().to_vec())
    }

    pub fn segments(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<usize> {
        self.0.last().copied()
    }

    /// Path with the final segment removed, or `None` for the root path.
    pub fn parent(&self) -> Option<DocumentPath> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn child(&self, index: usize) -> DocumentPath {
        let mut segments = self.0.clone();
        segments.push(index);
        Self(segments)
    }
}

impl From<Vec<usize>> for DocumentPath {
    fn from(segments: Vec<usize>) -> Self {
        Self(segments)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_segments(f, &self.0)
    }
}

fn write_segments(f: &mut fmt::Formatter<'_>, segments: &[usize]) -> fmt::Result {
    f.write_str("[")?;
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{segment}")?;
    }
    f.write_str("]")
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwarenessPoint {
    pub path: AwarenessPath,
    /// Flat character count from the start of the block.
    pub offset: usize,
}

impl AwarenessPoint {
    pub fn new(path: impl Into<AwarenessPath>, offset: usize) -> Self {
        Self { path: path.into(), offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentPoint {
    pub path: DocumentPath,
    /// Character offset inside the leaf addressed by `path`.
    pub offset: usize,
}

impl DocumentPoint {
    pub fn new(path: impl Into<DocumentPath>, offset: usize) -> Self {
        Self { path: path.into(), offset }
    }
}

/// Selection as broadcast to peers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwarenessSelection {
    pub start: AwarenessPoint,
    pub end: AwarenessPoint,
}

impl AwarenessSelection {
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

/// Selection in local document coordinates (anchor may follow focus).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRange {
    pub anchor: DocumentPoint,
    pub focus: DocumentPoint,
}

impl DocumentRange {
    pub fn collapsed(point: DocumentPoint) -> Self {
        Self { anchor: point.clone(), focus: point }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}
