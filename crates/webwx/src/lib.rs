//! webwx - Persistent-session client for the web messaging endpoint
//!
//! This crate provides the full session lifecycle against the
//! browser-oriented HTTP surface:
//! - QR-code login handshake (ticket issue, scan polling, token capture)
//! - Host-affinity derivation for the API, file, and push hosts
//! - Long-poll sync loop with a monotonic cursor and bounded retries
//! - Message deduplication and ordered delivery to a consumer queue
//! - Contact directory maintenance (friends and chatrooms)
//! - Idempotent teardown with best-effort server logout
//!
//! The crate has no UI dependencies; consumers drain [`DeliveryEvent`]s
//! from the queue handed out by [`Session::events`].

pub mod config;
pub mod contacts;
pub mod events;
pub mod models;
pub mod session;
pub mod sync;
pub mod wire;

pub use config::{APP_ID, ClientConfig};
pub use contacts::{ContactDirectory, InMemoryContactDirectory};
pub use events::{DeliveryEvent, delivery_queue};
pub use models::{ChatMessage, Contact, MsgId, UserIdentity, is_chatroom, partition_contacts};
pub use session::{
    LoginHooks, ServerAffinity, Session, SessionContext, SessionTokens, fresh_device_id,
};
pub use sync::{
    EngineState, ExitHook, ExitReason, MAX_INDETERMINATE_PROBES, SyncCursor, SyncEngine,
    SyncTransport, teardown,
};
pub use wire::{
    LoginError, LoginPollState, LoginTicket, SessionClient, TransportFault,
    acquire_ticket, establish, poll_ticket, try_push_login,
};
