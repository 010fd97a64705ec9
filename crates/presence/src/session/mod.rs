// Presence session: one channel, one registry, one dispatcher, one document.
//
// The session is synchronous; `driver` wraps it in a tokio task.

pub mod driver;

use std::time::Instant;

use anyhow::Result;
use tandem_common::path::DocumentRange;
use tandem_common::tree::{Document, DocumentTree};
use tandem_common::types::{CursorView, LocalIdentity, PresenceView};
use tokio::sync::watch;
use tracing::debug;
use yrs::sync::Message;

use crate::channel::{AwarenessChannel, AwarenessDispatch, PresenceChannel};
use crate::dispatcher::{DispatchState, DispatcherConfig, LocalPresenceDispatcher};
use crate::registry::PresenceRegistry;

pub struct PresenceSession<T: DocumentTree = Document> {
    channel: AwarenessChannel,
    registry: PresenceRegistry,
    dispatcher: LocalPresenceDispatcher,
    document: Option<T>,
}

impl<T: DocumentTree> PresenceSession<T> {
    pub fn new(channel: AwarenessChannel, config: DispatcherConfig) -> Self {
        let registry = PresenceRegistry::new(channel.local_device_id(), config.schema.clone());
        Self { channel, registry, dispatcher: LocalPresenceDispatcher::new(config), document: None }
    }

    pub fn with_document(mut self, document: T) -> Self {
        self.document = Some(document);
        self.refresh();
        self
    }

    pub fn channel(&self) -> &AwarenessChannel {
        &self.channel
    }

    pub fn registry(&self) -> &PresenceRegistry {
        &self.registry
    }

    pub fn document(&self) -> Option<&T> {
        self.document.as_ref()
    }

    pub fn dispatch_state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.dispatcher.next_deadline()
    }

    pub fn dispatch_identity(&mut self, identity: &LocalIdentity) -> bool {
        let published = self.dispatcher.publish_identity(&mut self.channel, identity);
        if published {
            self.refresh();
        }
        published
    }

    pub fn dispatch_cursor(&mut self, identity: &LocalIdentity, selection: &DocumentRange) {
        self.dispatch_cursor_at(identity, selection, Instant::now());
    }

    pub fn dispatch_cursor_at(
        &mut self,
        identity: &LocalIdentity,
        selection: &DocumentRange,
        now: Instant,
    ) {
        self.dispatcher.publish_cursor_at(identity, selection, now);
    }

    /// Flush a due cursor publish. Returns true if an entry went out.
    pub fn tick(&mut self) -> bool {
        self.tick_at(Instant::now())
    }

    pub fn tick_at(&mut self, now: Instant) -> bool {
        let published =
            self.dispatcher.flush_due_at(&mut self.channel, self.document.as_ref(), now);
        if published {
            self.refresh();
        }
        published
    }

    pub fn clear_presence(&mut self) -> bool {
        let published = self.dispatcher.clear(&mut self.channel);
        if published {
            self.refresh();
        }
        published
    }

    /// Apply one inbound awareness protocol message.
    pub fn handle_message(&mut self, message: Message) -> Result<AwarenessDispatch> {
        let dispatch = self.channel.handle_message(message)?;
        if !dispatch.changed.is_empty() {
            debug!(replicas = ?dispatch.changed, "remote presence changed");
            self.refresh();
        }
        Ok(dispatch)
    }

    /// Swap the local document and re-translate every remote cursor.
    pub fn set_document(&mut self, document: T) {
        self.document = Some(document);
        self.registry.recompute(self.document.as_ref());
    }

    pub fn take_outbound(&mut self) -> Vec<Message> {
        self.channel.take_outbound()
    }

    pub fn subscribe_active_users(&self) -> watch::Receiver<Vec<PresenceView>> {
        self.registry.subscribe_active_users()
    }

    pub fn subscribe_remote_cursors(&self) -> watch::Receiver<Vec<CursorView>> {
        self.registry.subscribe_remote_cursors()
    }

    pub fn active_users(&self) -> Vec<PresenceView> {
        self.registry.active_users()
    }

    pub fn remote_cursors(&self) -> Vec<CursorView> {
        self.registry.remote_cursors()
    }

    fn refresh(&mut self) {
        self.registry.sync_snapshot(self.channel.snapshot(), self.document.as_ref());
    }
}
