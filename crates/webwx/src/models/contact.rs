//! Contact model and the chatroom/individual partition test

use serde::{Deserialize, Serialize};

use crate::wire::api::WireContact;

/// A contact entry as delivered by the sync loop
///
/// Normalization (remark names, display-name cleanup, member rosters)
/// belongs to the [`ContactDirectory`](crate::ContactDirectory)
/// collaborator, not to this model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Opaque username; chatrooms embed `@@` in theirs
    pub username: String,
    /// Display name as sent by the server
    pub nickname: String,
}

impl Contact {
    pub fn from_wire(wire: WireContact) -> Self {
        Self {
            username: wire.user_name,
            nickname: wire.nick_name,
        }
    }

    /// Whether this contact is a group chat
    pub fn is_chatroom(&self) -> bool {
        is_chatroom(&self.username)
    }
}

/// The identity of the logged-in user, used to tag system-generated
/// chatroom-update notices on the consumer queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    pub nickname: String,
}

/// Naming-convention test for group-chat identifiers
pub fn is_chatroom(username: &str) -> bool {
    username.contains("@@")
}

/// Partition a contact batch into (chatrooms, individuals), preserving order
pub fn partition_contacts(contacts: Vec<Contact>) -> (Vec<Contact>, Vec<Contact>) {
    contacts.into_iter().partition(Contact::is_chatroom)
}
