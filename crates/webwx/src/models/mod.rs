//! Domain models for the webwx client

mod contact;
mod message;

pub use contact::{Contact, UserIdentity, is_chatroom, partition_contacts};
pub use message::{ChatMessage, MsgId};
