// Presence channel backed by the y-protocols awareness CRDT.

use anyhow::{Context, Result};
use tandem_common::types::{AwarenessEntry, ReplicaId};
use tracing::{debug, trace};
use yrs::sync::{Awareness, AwarenessUpdate, DefaultProtocol, Message, Protocol};
use yrs::{Doc, Options};

use super::PresenceChannel;

/// Messages produced while handling one inbound awareness message.
#[derive(Debug, Default)]
pub struct AwarenessDispatch {
    /// Replies for the sender only.
    pub direct_messages: Vec<Message>,
    /// Messages to relay to every other peer.
    pub broadcast_messages: Vec<Message>,
    /// Replicas whose entries changed locally as a result.
    pub changed: Vec<ReplicaId>,
}

pub struct AwarenessChannel {
    awareness: Awareness,
    protocol: DefaultProtocol,
    device_id: String,
    outbound: Vec<Message>,
}

impl AwarenessChannel {
    pub fn new(doc: Doc, device_id: impl Into<String>) -> Self {
        Self {
            awareness: Awareness::new(doc),
            protocol: DefaultProtocol,
            device_id: device_id.into(),
            outbound: Vec::new(),
        }
    }

    /// Channel over a fresh doc with a fixed client id (for deterministic testing).
    pub fn with_client_id(client_id: u64, device_id: impl Into<String>) -> Self {
        let options = Options { client_id, ..Default::default() };
        Self::new(Doc::with_options(options), device_id)
    }

    pub fn awareness(&self) -> &Awareness {
        &self.awareness
    }

    /// Drain awareness updates queued by local broadcasts.
    pub fn take_outbound(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outbound)
    }

    pub fn handle_message(&mut self, message: Message) -> Result<AwarenessDispatch> {
        match message {
            Message::Awareness(update) => self.handle_awareness_update(update),
            Message::AwarenessQuery => {
                let direct = self
                    .protocol
                    .handle_awareness_query(&self.awareness)
                    .context("awareness query failed")?;
                Ok(AwarenessDispatch {
                    direct_messages: direct.into_iter().collect(),
                    ..Default::default()
                })
            }
            other => {
                let direct = self
                    .protocol
                    .handle_message(&self.awareness, other)
                    .context("awareness protocol message handling failed")?;
                Ok(AwarenessDispatch {
                    direct_messages: direct.into_iter().collect(),
                    ..Default::default()
                })
            }
        }
    }

    fn handle_awareness_update(&mut self, update: AwarenessUpdate) -> Result<AwarenessDispatch> {
        let Some(summary) = self
            .awareness
            .apply_update_summary(update)
            .context("failed to apply awareness update")?
        else {
            return Ok(AwarenessDispatch::default());
        };

        let changed_clients = summary.all_changes();
        if changed_clients.is_empty() {
            return Ok(AwarenessDispatch::default());
        }
        trace!(clients = ?changed_clients, "awareness entries changed");

        let rebroadcast = self
            .awareness
            .update_with_clients(changed_clients.clone())
            .context("failed to encode awareness rebroadcast payload")?;

        Ok(AwarenessDispatch {
            direct_messages: Vec::new(),
            broadcast_messages: vec![Message::Awareness(rebroadcast)],
            changed: changed_clients,
        })
    }
}

impl PresenceChannel for AwarenessChannel {
    fn replica_id(&self) -> ReplicaId {
        self.awareness.doc().client_id()
    }

    fn local_device_id(&self) -> &str {
        &self.device_id
    }

    fn broadcast(&mut self, entry: &AwarenessEntry) -> Result<()> {
        self.awareness.set_local_state(entry).context("failed to encode local presence entry")?;
        let update = self
            .awareness
            .update_with_clients(vec![self.replica_id()])
            .context("failed to encode local awareness update")?;
        self.outbound.push(Message::Awareness(update));
        Ok(())
    }

    fn snapshot(&self) -> Vec<(ReplicaId, AwarenessEntry)> {
        let mut entries: Vec<(ReplicaId, AwarenessEntry)> = self
            .awareness
            .iter()
            .filter_map(|(client_id, state)| {
                let raw = state.data?;
                match serde_json::from_str::<AwarenessEntry>(raw.as_ref()) {
                    Ok(entry) => Some((client_id, entry)),
                    Err(error) => {
                        debug!(replica = client_id, %error, "ignoring unparseable awareness entry");
                        None
                    }
                }
            })
            .collect();

        entries.sort_by_key(|(client_id, _)| *client_id);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_common::path::{AwarenessPoint, AwarenessSelection};
    use tandem_common::types::{AwarenessUser, AWARENESS_PROTOCOL_VERSION};

    fn sample_entry(user_id: &str, device_id: &str, timestamp: i64) -> AwarenessEntry {
        AwarenessEntry {
            version: AWARENESS_PROTOCOL_VERSION,
            timestamp,
            user: AwarenessUser { user_id: user_id.into(), device_id: device_id.into() },
            metadata: r#"{"display_name":"Alice"}"#.into(),
            selection: Some(AwarenessSelection {
                start: AwarenessPoint::new(vec![0], 1),
                end: AwarenessPoint::new(vec![0], 3),
            }),
        }
    }

    #[test]
    fn local_broadcast_appears_in_snapshot_and_outbound() {
        let mut channel = AwarenessChannel::with_client_id(7, "device-a");
        let entry = sample_entry("user-alice", "device-a", 100);

        channel.broadcast(&entry).expect("local entry should serialize");

        assert_eq!(channel.replica_id(), 7);
        assert_eq!(channel.snapshot(), vec![(7, entry)]);

        let outbound = channel.take_outbound();
        assert_eq!(outbound.len(), 1);
        match &outbound[0] {
            Message::Awareness(update) => assert!(update.clients.contains_key(&7)),
            _ => panic!("expected awareness message"),
        }
        assert!(channel.take_outbound().is_empty());
    }

    #[test]
    fn remote_update_is_applied_and_rebroadcast() {
        let mut local = AwarenessChannel::with_client_id(1, "device-a");
        let mut remote = AwarenessChannel::with_client_id(2, "device-b");

        let bob = sample_entry("user-bob", "device-b", 50);
        remote.broadcast(&bob).expect("remote entry should serialize");
        let message = remote.take_outbound().pop().expect("remote queued an update");

        let dispatch = local.handle_message(message).expect("awareness update should apply");

        assert_eq!(dispatch.changed, vec![2]);
        assert_eq!(dispatch.broadcast_messages.len(), 1);
        assert!(dispatch.direct_messages.is_empty());
        assert_eq!(local.snapshot(), vec![(2, bob)]);
    }

    #[test]
    fn stale_update_changes_nothing() {
        let mut local = AwarenessChannel::with_client_id(1, "device-a");
        let mut remote = AwarenessChannel::with_client_id(2, "device-b");

        remote.broadcast(&sample_entry("user-bob", "device-b", 50)).unwrap();
        let mut snapshot = || {
            remote.handle_message(Message::AwarenessQuery).unwrap().direct_messages.remove(0)
        };
        let (update, repeat) = (snapshot(), snapshot());

        let first = local.handle_message(update).unwrap();
        assert_eq!(first.changed, vec![2]);

        let second = local.handle_message(repeat).unwrap();
        assert!(second.changed.is_empty());
        assert!(second.broadcast_messages.is_empty());
    }

    #[test]
    fn awareness_query_returns_snapshot_message() {
        let mut channel = AwarenessChannel::with_client_id(9, "device-c");
        channel.broadcast(&sample_entry("user-carla", "device-c", 1)).unwrap();

        let dispatch = channel.handle_message(Message::AwarenessQuery).unwrap();

        assert_eq!(dispatch.direct_messages.len(), 1);
        match &dispatch.direct_messages[0] {
            Message::Awareness(update) => assert!(update.clients.contains_key(&9)),
            _ => panic!("expected awareness message as query response"),
        }
    }

    #[test]
    fn unparseable_states_are_skipped() {
        let channel = AwarenessChannel::with_client_id(3, "device-d");
        channel
            .awareness()
            .set_local_state(serde_json::json!({ "name": "legacy client" }))
            .unwrap();
        assert!(channel.snapshot().is_empty());
    }
}
