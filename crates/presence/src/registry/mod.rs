// Presence registry: raw per-replica entries plus derived, observable views.

pub mod views;

use std::collections::{BTreeMap, HashMap};

use tandem_common::tree::{DocumentTree, TreeSchema};
use tandem_common::types::{AwarenessEntry, CursorView, PresenceView, ReplicaId};
use tokio::sync::watch;
use tracing::debug;

/// Owns the raw awareness map and republishes both derived views after every
/// mutation batch. Views are observed through `watch` receivers.
pub struct PresenceRegistry {
    local_device_id: String,
    schema: TreeSchema,
    entries: BTreeMap<ReplicaId, AwarenessEntry>,
    last_seen: HashMap<String, i64>,
    active_users: watch::Sender<Vec<PresenceView>>,
    remote_cursors: watch::Sender<Vec<CursorView>>,
    recomputations: u64,
}

impl PresenceRegistry {
    pub fn new(local_device_id: impl Into<String>, schema: TreeSchema) -> Self {
        let (active_users, _) = watch::channel(Vec::new());
        let (remote_cursors, _) = watch::channel(Vec::new());
        Self {
            local_device_id: local_device_id.into(),
            schema,
            entries: BTreeMap::new(),
            last_seen: HashMap::new(),
            active_users,
            remote_cursors,
            recomputations: 0,
        }
    }

    pub fn local_device_id(&self) -> &str {
        &self.local_device_id
    }

    /// Replace the whole map with `snapshot` and recompute once.
    pub fn sync_snapshot<T: DocumentTree + ?Sized>(
        &mut self,
        snapshot: impl IntoIterator<Item = (ReplicaId, AwarenessEntry)>,
        document: Option<&T>,
    ) {
        self.entries = snapshot.into_iter().collect();
        self.remember_last_seen();
        self.recompute(document);
    }

    /// Overwrite a batch of entries wholesale and recompute once.
    pub fn apply_changes<T: DocumentTree + ?Sized>(
        &mut self,
        changes: impl IntoIterator<Item = (ReplicaId, AwarenessEntry)>,
        document: Option<&T>,
    ) {
        for (replica, entry) in changes {
            self.entries.insert(replica, entry);
        }
        self.remember_last_seen();
        self.recompute(document);
    }

    /// Re-derive both views, e.g. after a structural document edit.
    pub fn recompute<T: DocumentTree + ?Sized>(&mut self, document: Option<&T>) {
        let users = views::active_users(&self.entries);
        let cursors = views::remote_cursors(
            &self.entries,
            &self.local_device_id,
            document,
            &self.schema,
        )
        .into_iter()
        .map(|(view, translated)| {
            if let Some(translated) = translated {
                for miss in translated.misses() {
                    debug!(user_id = %view.user_id, error = %miss, "remote cursor translation miss");
                }
            }
            view
        })
        .collect();

        self.recomputations += 1;
        self.active_users.send_replace(users);
        self.remote_cursors.send_replace(cursors);
    }

    pub fn subscribe_active_users(&self) -> watch::Receiver<Vec<PresenceView>> {
        self.active_users.subscribe()
    }

    pub fn subscribe_remote_cursors(&self) -> watch::Receiver<Vec<CursorView>> {
        self.remote_cursors.subscribe()
    }

    pub fn active_users(&self) -> Vec<PresenceView> {
        self.active_users.borrow().clone()
    }

    pub fn remote_cursors(&self) -> Vec<CursorView> {
        self.remote_cursors.borrow().clone()
    }

    pub fn entry(&self, replica: ReplicaId) -> Option<&AwarenessEntry> {
        self.entries.get(&replica)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&ReplicaId, &AwarenessEntry)> {
        self.entries.iter()
    }

    /// Latest timestamp ever observed for `user_id`, even if every replica
    /// for that user has since left the channel.
    pub fn last_seen(&self, user_id: &str) -> Option<i64> {
        self.last_seen.get(user_id).copied()
    }

    /// Number of recompute-and-notify cycles so far.
    pub fn recomputations(&self) -> u64 {
        self.recomputations
    }

    fn remember_last_seen(&mut self) {
        for entry in self.entries.values() {
            let seen = self.last_seen.entry(entry.user.user_id.clone()).or_insert(entry.timestamp);
            *seen = (*seen).max(entry.timestamp);
        }
    }
}
