// Shared ephemeral presence channel.
//
// The transport owns the map of per-replica entries. Local code may only
// replace the entry keyed by its own replica id; `broadcast` takes no id so
// that restriction holds by construction.

pub mod awareness;

use anyhow::Result;
use tandem_common::types::{AwarenessEntry, ReplicaId};

pub use awareness::{AwarenessChannel, AwarenessDispatch};

pub trait PresenceChannel {
    /// Transport-assigned id of the local replica.
    fn replica_id(&self) -> ReplicaId;

    /// Stable per-connection id distinguishing this replica from others
    /// signed in as the same user.
    fn local_device_id(&self) -> &str;

    /// Replace the local replica's entry for all peers.
    fn broadcast(&mut self, entry: &AwarenessEntry) -> Result<()>;

    /// Every entry currently known, local one included, ordered by replica id.
    fn snapshot(&self) -> Vec<(ReplicaId, AwarenessEntry)>;
}
