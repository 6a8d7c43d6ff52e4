//! Delivery events and the consumer queue
//!
//! One-directional, unbounded FIFO from the sync worker to the consumer.
//! Producers never block; consumers pull at their own pace.

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::models::{ChatMessage, UserIdentity};

/// An event placed on the consumer queue by the sync loop
#[derive(Debug, Clone)]
pub enum DeliveryEvent {
    /// A newly seen incoming message, forwarded in arrival order
    Message(ChatMessage),
    /// A system-generated chatroom-update notice, tagged with the
    /// session's own identity so consumers can tell it apart from
    /// ordinary messages
    ChatroomNotice {
        owner: UserIdentity,
        updated: Vec<String>,
    },
}

/// Create the delivery-event queue
pub fn delivery_queue() -> (Sender<DeliveryEvent>, Receiver<DeliveryEvent>) {
    unbounded()
}
