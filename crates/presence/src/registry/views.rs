// Derived presence views: one row per logical user, newest entry wins.

use std::collections::HashMap;

use tandem_common::translate::{TranslatedRange, Translator};
use tandem_common::tree::{DocumentTree, TreeSchema};
use tandem_common::types::{AwarenessEntry, CursorView, PresenceMetadata, PresenceView, ReplicaId};

/// Keep the largest-timestamp entry per `user_id`. Equal timestamps keep the
/// entry seen first (lowest replica id when fed from an ordered map).
fn latest_per_user<'a>(
    entries: impl IntoIterator<Item = (&'a AwarenessEntry, PresenceMetadata)>,
) -> Vec<(&'a AwarenessEntry, PresenceMetadata)> {
    let mut latest: HashMap<&'a str, (&'a AwarenessEntry, PresenceMetadata)> = HashMap::new();
    for (entry, meta) in entries {
        let user_id = entry.user.user_id.as_str();
        let newer = latest.get(user_id).is_none_or(|(kept, _)| entry.timestamp > kept.timestamp);
        if newer {
            latest.insert(user_id, (entry, meta));
        }
    }

    let mut rows: Vec<_> = latest.into_values().collect();
    rows.sort_by(|(a, _), (b, _)| {
        b.timestamp.cmp(&a.timestamp).then_with(|| a.user.user_id.cmp(&b.user.user_id))
    });
    rows
}

/// Users with a non-empty display name, newest first.
pub fn active_users<'a>(
    entries: impl IntoIterator<Item = (&'a ReplicaId, &'a AwarenessEntry)>,
) -> Vec<PresenceView> {
    let named = entries
        .into_iter()
        .map(|(_, entry)| (entry, entry.metadata()))
        .filter(|(_, meta)| !meta.display_name.is_empty());
    latest_per_user(named)
        .into_iter()
        .map(|(entry, meta)| PresenceView {
            user_id: entry.user.user_id.clone(),
            display_name: meta.display_name,
            timestamp: entry.timestamp,
            device_id: entry.user.device_id.clone(),
            avatar: meta.avatar_url,
        })
        .collect()
}

/// Remote users with a live selection, translated against `document`.
///
/// Translation misses never drop a row; the miss list is returned alongside
/// so the caller can log it.
pub fn remote_cursors<'a, T: DocumentTree + ?Sized>(
    entries: impl IntoIterator<Item = (&'a ReplicaId, &'a AwarenessEntry)>,
    local_device_id: &str,
    document: Option<&T>,
    schema: &TreeSchema,
) -> Vec<(CursorView, Option<TranslatedRange>)> {
    let remote = entries
        .into_iter()
        .filter(|(_, entry)| entry.selection.is_some() && entry.user.device_id != local_device_id)
        .map(|(_, entry)| (entry, entry.metadata()));

    latest_per_user(remote)
        .into_iter()
        .filter_map(|(entry, meta)| {
            let selection = entry.selection.clone()?;
            let translated = document
                .map(|document| Translator::new(document, schema).to_document_range(&selection));
            let view = CursorView {
                user_id: entry.user.user_id.clone(),
                device_id: entry.user.device_id.clone(),
                display_name: meta.display_name,
                cursor_color: meta.cursor_color,
                selection_color: meta.selection_color,
                timestamp: entry.timestamp,
                awareness_selection: selection,
                document_range: translated.as_ref().map(TranslatedRange::range),
                range_exact: translated.as_ref().is_some_and(TranslatedRange::is_exact),
            };
            Some((view, translated))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tandem_common::path::{AwarenessPoint, AwarenessSelection, DocumentPoint, DocumentRange};
    use tandem_common::tree::{Document, Node};
    use tandem_common::types::{AwarenessUser, AWARENESS_PROTOCOL_VERSION};

    fn entry(user: &str, device: &str, name: &str, timestamp: i64, offset: Option<usize>) -> AwarenessEntry {
        let meta = PresenceMetadata {
            display_name: name.into(),
            cursor_color: "#e06c75".into(),
            selection_color: "#f6d5d8".into(),
            avatar_url: format!("https://avatars.example/{user}.png"),
        };
        AwarenessEntry {
            version: AWARENESS_PROTOCOL_VERSION,
            timestamp,
            user: AwarenessUser { user_id: user.into(), device_id: device.into() },
            metadata: meta.encode().unwrap(),
            selection: offset.map(|offset| AwarenessSelection {
                start: AwarenessPoint::new(vec![0], offset),
                end: AwarenessPoint::new(vec![0], offset),
            }),
        }
    }

    fn doc() -> Document {
        Document::new(vec![Node::block("b1", vec![Node::marker(), Node::leaf("Hello")])])
    }

    #[test]
    fn newest_entry_per_user_wins() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "d1", "Alice (laptop)", 10, None));
        map.insert(2, entry("u1", "d2", "Alice (phone)", 20, None));

        let users = active_users(&map);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name, "Alice (phone)");
        assert_eq!(users[0].device_id, "d2");
        assert_eq!(users[0].timestamp, 20);
        assert_eq!(users[0].avatar, "https://avatars.example/u1.png");
    }

    #[test]
    fn empty_names_are_not_active() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "d1", "", 30, None));
        map.insert(2, entry("u2", "d2", "Bob", 5, None));

        let users = active_users(&map);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "u2");
    }

    #[test]
    fn tombstone_does_not_hide_older_named_device() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "d1", "", 30, None));
        map.insert(2, entry("u1", "d2", "Alice", 10, None));

        let users = active_users(&map);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].device_id, "d2");
    }

    #[test]
    fn users_sorted_newest_first() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "d1", "Alice", 10, None));
        map.insert(2, entry("u2", "d2", "Bob", 30, None));
        map.insert(3, entry("u3", "d3", "Carla", 20, None));

        let order: Vec<_> = active_users(&map).into_iter().map(|u| u.user_id).collect();
        assert_eq!(order, vec!["u2", "u3", "u1"]);
    }

    #[test]
    fn equal_timestamps_keep_lowest_replica() {
        let mut map = BTreeMap::new();
        map.insert(4, entry("u1", "d4", "Alice four", 10, None));
        map.insert(9, entry("u1", "d9", "Alice nine", 10, None));

        assert_eq!(active_users(&map)[0].device_id, "d4");
    }

    #[test]
    fn cursors_exclude_local_device_and_missing_selection() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("me", "local", "Me", 50, Some(1)));
        map.insert(2, entry("u2", "d2", "Bob", 40, None));
        map.insert(3, entry("u3", "d3", "Carla", 30, Some(3)));

        let document = doc();
        let cursors = remote_cursors(&map, "local", Some(&document), &TreeSchema::default());
        assert_eq!(cursors.len(), 1);
        let (view, _) = &cursors[0];
        assert_eq!(view.user_id, "u3");
        assert!(view.range_exact);
        assert_eq!(
            view.document_range,
            Some(DocumentRange::collapsed(DocumentPoint::new(vec![0, 1, 0], 3)))
        );
    }

    #[test]
    fn same_user_on_local_device_still_shows_other_device() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "local", "Alice", 50, Some(1)));
        map.insert(2, entry("u1", "tablet", "Alice", 40, Some(2)));

        let detached: Option<&Document> = None;
        let cursors = remote_cursors(&map, "local", detached, &TreeSchema::default());
        assert_eq!(cursors.len(), 1);
        assert_eq!(cursors[0].0.device_id, "tablet");
        assert_eq!(cursors[0].0.document_range, None);
        assert!(!cursors[0].0.range_exact);
    }

    #[test]
    fn translation_miss_keeps_cursor_with_passthrough_range() {
        let mut map = BTreeMap::new();
        let mut stale = entry("u2", "d2", "Bob", 40, None);
        stale.selection = Some(AwarenessSelection {
            start: AwarenessPoint::new(vec![5], 2),
            end: AwarenessPoint::new(vec![5], 4),
        });
        map.insert(2, stale);

        let document = doc();
        let cursors = remote_cursors(&map, "local", Some(&document), &TreeSchema::default());
        assert_eq!(cursors.len(), 1);
        let (view, translated) = &cursors[0];
        assert!(!view.range_exact);
        assert_eq!(
            view.document_range,
            Some(DocumentRange {
                anchor: DocumentPoint::new(vec![5], 2),
                focus: DocumentPoint::new(vec![5], 4),
            })
        );
        assert_eq!(translated.as_ref().unwrap().misses().count(), 2);
    }

    #[test]
    fn garbled_metadata_still_wins_dedup_by_timestamp() {
        let mut map = BTreeMap::new();
        map.insert(1, entry("u1", "d1", "Alice", 10, Some(1)));
        let mut garbled = entry("u1", "d2", "ignored", 20, Some(2));
        garbled.metadata = "{not json".into();
        map.insert(2, garbled);

        let document = doc();
        let cursors = remote_cursors(&map, "local", Some(&document), &TreeSchema::default());
        assert_eq!(cursors.len(), 1);
        let (view, _) = &cursors[0];
        assert_eq!(view.device_id, "d2");
        assert_eq!(view.timestamp, 20);
        assert!(view.display_name.is_empty());
        assert!(view.cursor_color.is_empty());
        assert!(view.selection_color.is_empty());
    }

    #[test]
    fn garbled_metadata_is_not_an_active_user() {
        let mut map = BTreeMap::new();
        let mut garbled = entry("u1", "d1", "ignored", 20, None);
        garbled.metadata = "{not json".into();
        map.insert(1, garbled);
        map.insert(2, entry("u2", "d2", "Bob", 5, None));

        let users = active_users(&map);
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "u2");
    }
}
