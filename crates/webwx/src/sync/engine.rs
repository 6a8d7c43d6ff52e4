//! Long-poll sync engine
//!
//! The background loop that keeps a logical session alive: probe for
//! change notifications, fetch deltas, classify transport faults, and
//! enforce the retry budget. Modeled as an explicit state machine
//! (Running → Draining → Terminated) driven by [`SyncEngine::step`] so
//! tests can walk cycles without real network timing; [`SyncEngine::run`]
//! just loops `step` on the worker thread.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use log::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::contacts::ContactDirectory;
use crate::events::DeliveryEvent;
use crate::models::{ChatMessage, Contact};
use crate::session::SessionContext;
use crate::sync::dispatch::dispatch;
use crate::wire::api::SyncResponse;
use crate::wire::{TransportFault, parse};

/// Consecutive indeterminate probes tolerated before the session is
/// treated as no longer recognized by the server
pub const MAX_INDETERMINATE_PROBES: u32 = 5;

/// The selector value the malformed-status-line shim substitutes:
/// the lowest non-zero change selector ("ambiguous activity")
const AMBIGUOUS_ACTIVITY_SELECTOR: u32 = 2;

/// Transport seam for the sync loop.
///
/// [`SessionClient`](crate::wire::SessionClient) is the production
/// implementation; tests drive the engine with a scripted one.
pub trait SyncTransport: Send + Sync {
    /// Issue one long-poll probe, returning the raw response text
    fn probe(&self, ctx: &SessionContext) -> Result<String, TransportFault>;

    /// Issue one delta fetch
    fn fetch(&self, ctx: &SessionContext) -> Result<SyncResponse, TransportFault>;

    /// Best-effort server-side logout plus transport-state reset;
    /// network errors are suppressed
    fn shutdown(&self, ctx: &SessionContext);
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The caller cleared the alive flag
    Cancelled,
    /// The configured ceiling of consecutive hard failures was reached
    RetryBudgetExhausted,
    /// Repeated indeterminate probes: the server no longer recognizes
    /// the session
    SessionExpired,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled => write!(f, "cancelled by caller"),
            Self::RetryBudgetExhausted => write!(f, "retry budget exhausted"),
            Self::SessionExpired => write!(f, "session no longer recognized"),
        }
    }
}

/// Engine lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Probing and fetching normally
    Running,
    /// Exit decided; teardown and the exit hook run on the next step
    Draining(ExitReason),
    /// Loop finished; further steps are no-ops
    Terminated(ExitReason),
}

/// Hook invoked exactly once when the loop terminates for any reason
pub type ExitHook = Box<dyn FnOnce(ExitReason) + Send>;

/// The background sync loop
pub struct SyncEngine<T: SyncTransport> {
    ctx: Arc<SessionContext>,
    transport: T,
    directory: Arc<dyn ContactDirectory>,
    events: Sender<DeliveryEvent>,
    retry_limit: u32,
    retry_delay: Duration,
    retries: u32,
    indeterminate: u32,
    state: EngineState,
    on_exit: Option<ExitHook>,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(
        ctx: Arc<SessionContext>,
        transport: T,
        directory: Arc<dyn ContactDirectory>,
        events: Sender<DeliveryEvent>,
        config: &ClientConfig,
        on_exit: Option<ExitHook>,
    ) -> Self {
        Self {
            ctx,
            transport,
            directory,
            events,
            retry_limit: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            retries: 0,
            indeterminate: 0,
            state: EngineState::Running,
            on_exit,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Consecutive hard failures so far
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Drive the loop until it terminates
    pub fn run(mut self) -> ExitReason {
        loop {
            if let EngineState::Terminated(reason) = self.step() {
                return reason;
            }
        }
    }

    /// Advance the state machine by one cycle
    pub fn step(&mut self) -> EngineState {
        match self.state {
            EngineState::Terminated(_) => {}
            EngineState::Draining(reason) => self.finish(reason),
            EngineState::Running => self.cycle(),
        }
        self.state
    }

    fn cycle(&mut self) {
        // cooperative cancellation, observed at the top of each cycle
        if !self.ctx.is_alive() {
            self.state = EngineState::Draining(ExitReason::Cancelled);
            return;
        }

        match self.transport.probe(&self.ctx) {
            // the server-side hold elapsed with nothing to report
            Err(TransportFault::Timeout) => {}
            Err(TransportFault::MalformedStatusLine) => {
                // compatibility shim for the sync host's half-open
                // keepalive artifact: ambiguous activity, re-probe soon
                debug!("malformed status line on probe; treating as activity");
                self.handle_selector(AMBIGUOUS_ACTIVITY_SELECTOR);
            }
            Err(fault) => self.hard_failure(&fault),
            Ok(body) => match parse::sync_check(&body) {
                Some(signal) if signal.accepted() => {
                    self.indeterminate = 0;
                    self.handle_selector(signal.selector);
                }
                _ => self.indeterminate_probe(&body),
            },
        }
    }

    fn handle_selector(&mut self, selector: u32) {
        if selector == 0 {
            // no new data; the probe's own hold paces the loop
            self.retries = 0;
            return;
        }
        debug!("probe selector {selector}; fetching deltas");
        self.fetch_deltas();
    }

    fn fetch_deltas(&mut self) {
        self.ctx.regen_device_id();

        match self.transport.fetch(&self.ctx) {
            // a timed-out fetch is quiet: cursor intact, re-request next cycle
            Err(TransportFault::Timeout) => {}
            Err(fault) => self.hard_failure(&fault),
            Ok(response) => {
                if response.base_response.ret != 0 {
                    // fetch produced nothing; cursor must not advance
                    debug!(
                        "delta fetch reported status {}; keeping cursor",
                        response.base_response.ret
                    );
                    self.retries = 0;
                    return;
                }

                let check_key = response.sync_check_key;
                self.ctx.advance_cursor(response.sync_key, check_key.as_ref());

                let messages: Vec<ChatMessage> = response
                    .add_msg_list
                    .into_iter()
                    .map(ChatMessage::from_wire)
                    .collect();
                let contacts: Vec<Contact> = response
                    .mod_contact_list
                    .into_iter()
                    .map(Contact::from_wire)
                    .collect();

                let owner = self.ctx.user();
                let outcome = {
                    let mut seen = self.ctx.lock_seen();
                    dispatch(
                        messages,
                        contacts,
                        &mut seen,
                        self.directory.as_ref(),
                        owner.as_ref(),
                        &self.events,
                    )
                };
                match outcome {
                    Ok(()) => self.retries = 0,
                    Err(e) => self.hard_failure(&format!("dispatch failed: {e:#}")),
                }
            }
        }
    }

    fn indeterminate_probe(&mut self, body: &str) {
        self.indeterminate += 1;
        warn!(
            "indeterminate probe response ({}/{MAX_INDETERMINATE_PROBES}): {}",
            self.indeterminate,
            body.chars().take(120).collect::<String>(),
        );
        if self.indeterminate >= MAX_INDETERMINATE_PROBES {
            self.state = EngineState::Draining(ExitReason::SessionExpired);
        }
    }

    fn hard_failure(&mut self, fault: &dyn fmt::Display) {
        // a stop landing mid-cycle also fails the in-flight call; that
        // is cancellation, not a retryable fault
        if !self.ctx.is_alive() {
            self.state = EngineState::Draining(ExitReason::Cancelled);
            return;
        }
        self.retries += 1;
        error!("sync cycle failed ({}/{}): {fault}", self.retries, self.retry_limit);
        if self.retries >= self.retry_limit {
            self.state = EngineState::Draining(ExitReason::RetryBudgetExhausted);
        } else if !self.retry_delay.is_zero() {
            std::thread::sleep(self.retry_delay);
        }
    }

    fn finish(&mut self, reason: ExitReason) {
        info!("sync loop exiting: {reason}");
        teardown(&self.ctx, &self.transport, self.directory.as_ref());
        if let Some(hook) = self.on_exit.take() {
            hook(reason);
        }
        self.state = EngineState::Terminated(reason);
    }
}

/// Terminate the session and reset all session state to initial.
///
/// The server-side logout is attempted only if the session was alive;
/// everything local is cleared regardless. Idempotent: on an
/// already-torn-down session this is a no-op and no network call fires.
pub fn teardown<T: SyncTransport + ?Sized>(
    ctx: &SessionContext,
    transport: &T,
    directory: &dyn ContactDirectory,
) {
    if ctx.take_alive() {
        transport.shutdown(ctx);
    }
    ctx.reset();
    directory.clear();
}
