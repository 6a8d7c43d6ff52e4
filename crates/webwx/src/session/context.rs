//! Shared session state
//!
//! One owned context object is passed by handle into the handshake, the
//! sync worker, and teardown, instead of ambient globals. Single-writer
//! by construction: once the loop is running only the worker mutates the
//! cursor, seen-set, and device id; only the caller flips the lifecycle
//! flags to request shutdown.

use std::sync::Mutex;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::Utc;

use crate::models::UserIdentity;
use crate::session::tokens::{ServerAffinity, SessionTokens, fresh_device_id};
use crate::sync::cursor::SyncCursor;
use crate::sync::dispatch::SeenMessages;
use crate::wire::api::SyncKeyList;

/// All mutable state belonging to one logical session
#[derive(Default)]
pub struct SessionContext {
    tokens: RwLock<Option<SessionTokens>>,
    affinity: RwLock<Option<ServerAffinity>>,
    user: RwLock<Option<UserIdentity>>,
    cursor: Mutex<SyncCursor>,
    seen: Mutex<SeenMessages>,
    device_id: Mutex<String>,
    /// Logical request sequence embedded in every probe, seeded from the
    /// login wall clock and incremented each cycle regardless of outcome
    seq: AtomicI64,
    alive: AtomicBool,
    logging_in: AtomicBool,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    // --- lifecycle flags ---

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }

    /// Clear the alive flag, returning whether it was set
    pub fn take_alive(&self) -> bool {
        self.alive.swap(false, Ordering::SeqCst)
    }

    pub fn is_logging_in(&self) -> bool {
        self.logging_in.load(Ordering::SeqCst)
    }

    pub fn set_logging_in(&self, logging_in: bool) {
        self.logging_in.store(logging_in, Ordering::SeqCst);
    }

    // --- handshake products ---

    /// Install the establishment products and seed the per-session
    /// counters. Called exactly once per successful handshake.
    pub fn install_session(&self, tokens: SessionTokens, affinity: ServerAffinity) {
        *self.tokens.write().unwrap() = Some(tokens);
        *self.affinity.write().unwrap() = Some(affinity);
        *self.device_id.lock().unwrap() = fresh_device_id();
        self.seq.store(Utc::now().timestamp_millis(), Ordering::SeqCst);
    }

    pub fn tokens(&self) -> Option<SessionTokens> {
        self.tokens.read().unwrap().clone()
    }

    pub fn affinity(&self) -> Option<ServerAffinity> {
        self.affinity.read().unwrap().clone()
    }

    pub fn set_user(&self, user: UserIdentity) {
        *self.user.write().unwrap() = Some(user);
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.user.read().unwrap().clone()
    }

    // --- sync-loop state (worker-owned once the loop runs) ---

    pub fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    pub fn device_id(&self) -> String {
        self.device_id.lock().unwrap().clone()
    }

    /// Regenerate the pseudo device id, returning the fresh value
    pub fn regen_device_id(&self) -> String {
        let id = fresh_device_id();
        *self.device_id.lock().unwrap() = id.clone();
        id
    }

    pub fn cursor_flat(&self) -> String {
        self.cursor.lock().unwrap().flat().to_string()
    }

    pub fn cursor_structured(&self) -> SyncKeyList {
        self.cursor.lock().unwrap().structured().clone()
    }

    /// Advance the cursor after a successful fetch
    pub fn advance_cursor(&self, structured: SyncKeyList, check_key: Option<&SyncKeyList>) {
        self.cursor.lock().unwrap().advance(structured, check_key);
    }

    pub fn lock_seen(&self) -> std::sync::MutexGuard<'_, SeenMessages> {
        self.seen.lock().unwrap()
    }

    // --- teardown ---

    /// Reset everything to initial. Idempotent.
    pub fn reset(&self) {
        *self.tokens.write().unwrap() = None;
        *self.affinity.write().unwrap() = None;
        *self.user.write().unwrap() = None;
        *self.cursor.lock().unwrap() = SyncCursor::default();
        self.seen.lock().unwrap().clear();
        self.device_id.lock().unwrap().clear();
        self.seq.store(0, Ordering::SeqCst);
        self.alive.store(false, Ordering::SeqCst);
        self.logging_in.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::api::SyncKeyPair;

    fn tokens() -> SessionTokens {
        SessionTokens {
            skey: "s".to_string(),
            sid: "i".to_string(),
            uin: "u".to_string(),
            pass_ticket: "p".to_string(),
        }
    }

    #[test]
    fn test_seq_advances_every_probe() {
        let ctx = SessionContext::new();
        ctx.install_session(tokens(), ServerAffinity::from_redirect("https://x.example"));
        let a = ctx.next_seq();
        let b = ctx.next_seq();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let ctx = SessionContext::new();
        ctx.install_session(tokens(), ServerAffinity::from_redirect("https://x.example"));
        ctx.set_alive(true);
        ctx.advance_cursor(
            SyncKeyList {
                count: 1,
                list: vec![SyncKeyPair { key: 1, val: 2 }],
            },
            None,
        );

        ctx.reset();
        assert!(!ctx.is_alive());
        assert!(ctx.tokens().is_none());
        assert!(ctx.affinity().is_none());
        assert_eq!(ctx.cursor_flat(), "");
        assert_eq!(ctx.device_id(), "");

        // a second reset is a no-op, not an error
        ctx.reset();
        assert!(ctx.tokens().is_none());
    }

    #[test]
    fn test_take_alive_once() {
        let ctx = SessionContext::new();
        ctx.set_alive(true);
        assert!(ctx.take_alive());
        assert!(!ctx.take_alive());
    }
}
