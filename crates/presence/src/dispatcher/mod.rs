// Local presence dispatcher: publishes this replica's identity and cursor.
//
// inactive -> identity-published -> cursor-tracking, and back to inactive on
// clear. Cursor publishes are coalesced by a `CoalescingTimer`; the selection
// is translated to awareness coordinates only when the timer fires, and a
// failed translation skips that cycle without touching the published entry.

pub mod debounce;

use std::time::Instant;

use chrono::Utc;
use tandem_common::path::{AwarenessSelection, DocumentRange};
use tandem_common::translate::Translator;
use tandem_common::tree::{DocumentTree, TreeSchema};
use tandem_common::types::{
    AwarenessEntry, AwarenessUser, LocalIdentity, PresenceMetadata, AWARENESS_PROTOCOL_VERSION,
};
use tracing::{debug, warn};

use crate::channel::PresenceChannel;
use debounce::{CoalescingTimer, DebounceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Inactive,
    IdentityPublished,
    CursorTracking,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingCursor {
    identity: LocalIdentity,
    selection: DocumentRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub debounce: DebounceConfig,
    pub protocol_version: u32,
    pub schema: TreeSchema,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            debounce: DebounceConfig::default(),
            protocol_version: AWARENESS_PROTOCOL_VERSION,
            schema: TreeSchema::default(),
        }
    }
}

pub struct LocalPresenceDispatcher {
    state: DispatchState,
    timer: CoalescingTimer<PendingCursor>,
    protocol_version: u32,
    schema: TreeSchema,
    identity: Option<LocalIdentity>,
    last_published: Option<AwarenessEntry>,
}

impl LocalPresenceDispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self {
            state: DispatchState::Inactive,
            timer: CoalescingTimer::new(config.debounce),
            protocol_version: config.protocol_version,
            schema: config.schema,
            identity: None,
            last_published: None,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    /// Last entry successfully handed to the channel.
    pub fn last_published(&self) -> Option<&AwarenessEntry> {
        self.last_published.as_ref()
    }

    /// When a coalesced cursor publish becomes due.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timer.deadline()
    }

    /// Publish identity and metadata without a selection. Any pending cursor
    /// publish is dropped. Returns true if the channel accepted the entry.
    pub fn publish_identity<C: PresenceChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        identity: &LocalIdentity,
    ) -> bool {
        if self.state != DispatchState::Inactive {
            debug!(user_id = %identity.user_id, state = ?self.state, "re-publishing identity");
        }
        self.timer.cancel();
        self.identity = Some(identity.clone());

        let Some(entry) = self.build_entry(channel, identity, identity.metadata(), None) else {
            return false;
        };
        if self.send(channel, entry) {
            self.state = DispatchState::IdentityPublished;
            return true;
        }
        false
    }

    /// Schedule a cursor publish; bursts collapse to the latest selection.
    pub fn publish_cursor(&mut self, identity: &LocalIdentity, selection: &DocumentRange) {
        self.publish_cursor_at(identity, selection, Instant::now());
    }

    /// Like `publish_cursor` with an explicit clock reading.
    pub fn publish_cursor_at(
        &mut self,
        identity: &LocalIdentity,
        selection: &DocumentRange,
        now: Instant,
    ) {
        let pending = PendingCursor { identity: identity.clone(), selection: selection.clone() };
        self.timer.schedule_at(pending, now);
    }

    /// Fire the pending cursor publish if its window has elapsed.
    pub fn flush_due<C, T>(&mut self, channel: &mut C, document: Option<&T>) -> bool
    where
        C: PresenceChannel + ?Sized,
        T: DocumentTree + ?Sized,
    {
        self.flush_due_at(channel, document, Instant::now())
    }

    /// Like `flush_due` with an explicit clock reading. Returns true when an
    /// entry was broadcast.
    pub fn flush_due_at<C, T>(&mut self, channel: &mut C, document: Option<&T>, now: Instant) -> bool
    where
        C: PresenceChannel + ?Sized,
        T: DocumentTree + ?Sized,
    {
        let Some(pending) = self.timer.take_due_at(now) else {
            return false;
        };
        let Some(document) = document else {
            warn!(user_id = %pending.identity.user_id, "no document attached, skipping cursor publish");
            return false;
        };

        let selection = match Translator::new(document, &self.schema)
            .to_awareness_selection(&pending.selection)
        {
            Ok(selection) => selection,
            Err(error) => {
                warn!(user_id = %pending.identity.user_id, %error, "skipping cursor publish");
                return false;
            }
        };

        let identity = pending.identity;
        let Some(entry) = self.build_entry(channel, &identity, identity.metadata(), Some(selection))
        else {
            return false;
        };
        self.identity = Some(identity);
        if self.send(channel, entry) {
            self.state = DispatchState::CursorTracking;
            return true;
        }
        false
    }

    /// Publish a tombstone: empty metadata, no selection. Drops any pending
    /// cursor publish and returns to `Inactive` regardless of the outcome.
    pub fn clear<C: PresenceChannel + ?Sized>(&mut self, channel: &mut C) -> bool {
        self.timer.cancel();
        self.state = DispatchState::Inactive;

        let identity = self.identity.take().unwrap_or_default();
        let Some(entry) = self.build_entry(channel, &identity, PresenceMetadata::default(), None)
        else {
            return false;
        };
        self.send(channel, entry)
    }

    fn build_entry<C: PresenceChannel + ?Sized>(
        &self,
        channel: &C,
        identity: &LocalIdentity,
        metadata: PresenceMetadata,
        selection: Option<AwarenessSelection>,
    ) -> Option<AwarenessEntry> {
        let metadata = match metadata.encode() {
            Ok(blob) => blob,
            Err(error) => {
                warn!(user_id = %identity.user_id, %error, "failed to encode presence metadata");
                return None;
            }
        };
        Some(AwarenessEntry {
            version: self.protocol_version,
            timestamp: Utc::now().timestamp(),
            user: AwarenessUser {
                user_id: identity.user_id.clone(),
                device_id: channel.local_device_id().to_string(),
            },
            metadata,
            selection,
        })
    }

    fn send<C: PresenceChannel + ?Sized>(&mut self, channel: &mut C, entry: AwarenessEntry) -> bool {
        match channel.broadcast(&entry) {
            Ok(()) => {
                debug!(
                    replica = channel.replica_id(),
                    user_id = %entry.user.user_id,
                    has_selection = entry.selection.is_some(),
                    "published presence entry"
                );
                self.last_published = Some(entry);
                true
            }
            Err(error) => {
                warn!(error = %error, "presence broadcast failed");
                false
            }
        }
    }
}
