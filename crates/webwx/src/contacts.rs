//! Contact directory boundary
//!
//! Contact normalization and storage live outside this crate; the sync
//! loop only needs somewhere to forward partitioned contact batches and a
//! way to empty caches at teardown. The in-memory implementation backs
//! tests and small consumers.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::Contact;

/// Collaborator that owns contact state
///
/// Chatroom and individual updates arrive through distinct paths. A
/// chatroom update may derive a notification (e.g. membership changed)
/// whose updated usernames are surfaced back so the sync loop can queue a
/// notice event for the consumer.
pub trait ContactDirectory: Send + Sync {
    /// Apply a batch of chatroom updates; returns the usernames for which
    /// a consumer-visible notice should be raised, if any
    fn update_chatrooms(&self, rooms: Vec<Contact>) -> Result<Option<Vec<String>>>;

    /// Apply a batch of individual-contact updates
    fn update_friends(&self, friends: Vec<Contact>) -> Result<()>;

    /// Empty all cached contact/member state
    fn clear(&self);
}

/// In-memory implementation of [`ContactDirectory`]
///
/// Keeps last-write-wins maps keyed by username.
#[derive(Default)]
pub struct InMemoryContactDirectory {
    chatrooms: RwLock<HashMap<String, Contact>>,
    friends: RwLock<HashMap<String, Contact>>,
}

impl InMemoryContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chatroom_count(&self) -> usize {
        self.chatrooms.read().unwrap().len()
    }

    pub fn friend_count(&self) -> usize {
        self.friends.read().unwrap().len()
    }

    pub fn get_chatroom(&self, username: &str) -> Option<Contact> {
        self.chatrooms.read().unwrap().get(username).cloned()
    }
}

impl ContactDirectory for InMemoryContactDirectory {
    fn update_chatrooms(&self, rooms: Vec<Contact>) -> Result<Option<Vec<String>>> {
        if rooms.is_empty() {
            return Ok(None);
        }
        let updated: Vec<String> = rooms.iter().map(|c| c.username.clone()).collect();
        let mut map = self.chatrooms.write().unwrap();
        for room in rooms {
            map.insert(room.username.clone(), room);
        }
        Ok(Some(updated))
    }

    fn update_friends(&self, friends: Vec<Contact>) -> Result<()> {
        let mut map = self.friends.write().unwrap();
        for friend in friends {
            map.insert(friend.username.clone(), friend);
        }
        Ok(())
    }

    fn clear(&self) {
        self.chatrooms.write().unwrap().clear();
        self.friends.write().unwrap().clear();
    }
}
