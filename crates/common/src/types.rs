// Presence domain types shared across all Tandem crates.

use serde::{Deserialize, Serialize};

use crate::color::pick_colors;
use crate::path::{AwarenessSelection, DocumentRange};

/// Ephemeral, transport-assigned identifier of one connected replica.
pub type ReplicaId = u64;

/// Current awareness entry protocol version.
pub const AWARENESS_PROTOCOL_VERSION: u32 = 1;

/// Logical identity plus the connection that produced an entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AwarenessUser {
    pub user_id: String,
    pub device_id: String,
}

/// Display metadata carried inside an entry as an opaque JSON blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceMetadata {
    pub display_name: String,
    pub cursor_color: String,
    pub selection_color: String,
    pub avatar_url: String,
}

impl PresenceMetadata {
    /// Parse a metadata blob; absent or malformed blobs yield all-empty fields.
    pub fn parse(blob: &str) -> Self {
        serde_json::from_str(blob).unwrap_or_default()
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_empty()
            && self.cursor_color.is_empty()
            && self.selection_color.is_empty()
            && self.avatar_url.is_empty()
    }
}

/// One replica's published presence state. Replaced wholesale on every write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwarenessEntry {
    pub version: u32,
    /// Seconds since the Unix epoch at last write.
    pub timestamp: i64,
    pub user: AwarenessUser,
    #[serde(default)]
    pub metadata: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<AwarenessSelection>,
}

impl AwarenessEntry {
    pub fn metadata(&self) -> PresenceMetadata {
        PresenceMetadata::parse(&self.metadata)
    }

    /// Empty metadata and no selection: the replica has left.
    pub fn is_tombstone(&self) -> bool {
        self.selection.is_none() && self.metadata().is_empty()
    }
}

/// Identity the local editing surface publishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
}

impl LocalIdentity {
    /// Metadata with colours derived from the display name.
    pub fn metadata(&self) -> PresenceMetadata {
        let colors = pick_colors(&self.display_name);
        PresenceMetadata {
            display_name: self.display_name.clone(),
            cursor_color: colors.outline.to_string(),
            selection_color: colors.fill.to_string(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// One active user, deduplicated across that user's replicas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceView {
    pub user_id: String,
    pub display_name: String,
    pub timestamp: i64,
    pub device_id: String,
    pub avatar: String,
}

/// One remote user's cursor, translated into local document coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorView {
    pub user_id: String,
    pub device_id: String,
    pub display_name: String,
    pub cursor_color: String,
    pub selection_color: String,
    pub timestamp: i64,
    pub awareness_selection: AwarenessSelection,
    /// `None` only when no local document is attached.
    pub document_range: Option<DocumentRange>,
    /// False when `document_range` is the passthrough fallback.
    pub range_exact: bool,
}
