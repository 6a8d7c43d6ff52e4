//! Incremental merge dispatch
//!
//! Partitions a delta batch into message and contact events, drops
//! messages already delivered, and forwards the rest to the consumer
//! queue in arrival order.

use std::collections::HashSet;

use anyhow::Result;
use crossbeam_channel::Sender;
use log::debug;

use crate::contacts::ContactDirectory;
use crate::events::DeliveryEvent;
use crate::models::{ChatMessage, Contact, MsgId, UserIdentity, partition_contacts};

/// Append-only set of delivered message ids, for idempotent delivery
#[derive(Debug, Default)]
pub struct SeenMessages(HashSet<String>);

impl SeenMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id; returns false if it was already present
    pub fn remember(&mut self, id: &MsgId) -> bool {
        self.0.insert(id.as_str().to_string())
    }

    pub fn contains(&self, id: &MsgId) -> bool {
        self.0.contains(id.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }
}

/// Forward one delta batch to the consumer queue.
///
/// Unseen messages are recorded and forwarded as individual events in
/// their original order; an id already in `seen` silently drops that
/// message. Contact entries are partitioned by the group-chat naming
/// convention and handed to the directory collaborator through distinct
/// paths; a derived chatroom notice is queued tagged with `owner`.
pub fn dispatch(
    messages: Vec<ChatMessage>,
    contacts: Vec<Contact>,
    seen: &mut SeenMessages,
    directory: &dyn ContactDirectory,
    owner: Option<&UserIdentity>,
    events: &Sender<DeliveryEvent>,
) -> Result<()> {
    for message in messages {
        if !seen.remember(&message.id) {
            debug!("dropping already-delivered message {}", message.id.as_str());
            continue;
        }
        // unbounded queue: send never blocks, and a dropped receiver
        // just means nobody is consuming anymore
        let _ = events.send(DeliveryEvent::Message(message));
    }

    if contacts.is_empty() {
        return Ok(());
    }

    let (chatrooms, friends) = partition_contacts(contacts);
    if let Some(updated) = directory.update_chatrooms(chatrooms)?
        && let Some(owner) = owner
    {
        let _ = events.send(DeliveryEvent::ChatroomNotice {
            owner: owner.clone(),
            updated,
        });
    }
    directory.update_friends(friends)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::InMemoryContactDirectory;
    use crate::events::delivery_queue;
    use chrono::Utc;

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: MsgId::new(id),
            from: "@a".to_string(),
            to: "@b".to_string(),
            kind: 1,
            content: format!("body {id}"),
            created_at: Utc::now(),
        }
    }

    fn contact(username: &str) -> Contact {
        Contact {
            username: username.to_string(),
            nickname: "n".to_string(),
        }
    }

    fn owner() -> UserIdentity {
        UserIdentity {
            username: "@me".to_string(),
            nickname: "me".to_string(),
        }
    }

    fn drain(rx: &crossbeam_channel::Receiver<DeliveryEvent>) -> Vec<DeliveryEvent> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_forwards_in_order() {
        let (tx, rx) = delivery_queue();
        let dir = InMemoryContactDirectory::new();
        let mut seen = SeenMessages::new();

        dispatch(
            vec![message("1"), message("2"), message("3")],
            vec![],
            &mut seen,
            &dir,
            Some(&owner()),
            &tx,
        )
        .unwrap();

        let ids: Vec<String> = drain(&rx)
            .into_iter()
            .map(|e| match e {
                DeliveryEvent::Message(m) => m.id.as_str().to_string(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_redelivery_drops_only_seen_entries() {
        let (tx, rx) = delivery_queue();
        let dir = InMemoryContactDirectory::new();
        let mut seen = SeenMessages::new();

        dispatch(
            vec![message("1"), message("2")],
            vec![],
            &mut seen,
            &dir,
            Some(&owner()),
            &tx,
        )
        .unwrap();
        drain(&rx);

        // redeliver a batch overlapping the first one
        dispatch(
            vec![message("2"), message("3"), message("1"), message("4")],
            vec![],
            &mut seen,
            &dir,
            Some(&owner()),
            &tx,
        )
        .unwrap();

        let ids: Vec<String> = drain(&rx)
            .into_iter()
            .map(|e| match e {
                DeliveryEvent::Message(m) => m.id.as_str().to_string(),
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["3", "4"]);
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_chatroom_notice_tagged_with_owner() {
        let (tx, rx) = delivery_queue();
        let dir = InMemoryContactDirectory::new();
        let mut seen = SeenMessages::new();

        dispatch(
            vec![],
            vec![contact("@@room"), contact("@friend")],
            &mut seen,
            &dir,
            Some(&owner()),
            &tx,
        )
        .unwrap();

        let events = drain(&rx);
        assert_eq!(events.len(), 1);
        match &events[0] {
            DeliveryEvent::ChatroomNotice { owner, updated } => {
                assert_eq!(owner.username, "@me");
                assert_eq!(updated, &vec!["@@room".to_string()]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(dir.friend_count(), 1);
    }

    #[test]
    fn test_contacts_without_chatrooms_raise_no_notice() {
        let (tx, rx) = delivery_queue();
        let dir = InMemoryContactDirectory::new();
        let mut seen = SeenMessages::new();

        dispatch(
            vec![],
            vec![contact("@friend")],
            &mut seen,
            &dir,
            Some(&owner()),
            &tx,
        )
        .unwrap();

        assert!(drain(&rx).is_empty());
        assert_eq!(dir.friend_count(), 1);
    }
}
