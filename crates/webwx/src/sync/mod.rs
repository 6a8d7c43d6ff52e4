//! Long-poll sync loop and its supporting state
//!
//! The loop alternates cheap probes against the push host with delta
//! fetches against the API host, advancing the [`cursor::SyncCursor`]
//! only after a fully successful fetch and deduplicating deliveries
//! through [`dispatch`].

pub mod cursor;
pub mod dispatch;
mod engine;

pub use cursor::SyncCursor;
pub use engine::{
    EngineState, ExitHook, ExitReason, MAX_INDETERMINATE_PROBES, SyncEngine, SyncTransport,
    teardown,
};
