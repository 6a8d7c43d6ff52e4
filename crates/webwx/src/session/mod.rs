//! Session lifecycle
//!
//! [`Session`] is the entry point: it owns the HTTP client, the shared
//! [`SessionContext`], the consumer queue, and the background sync
//! worker. The handshake (QR acquisition through session init) runs
//! synchronously on the caller's thread, since it is sequential and
//! paced by human action; the long-poll loop runs on a dedicated
//! worker thread.
//!
//! Not a pool: one session, one owner, one worker.

mod context;
mod tokens;

pub use context::SessionContext;
pub use tokens::{ServerAffinity, SessionTokens, fresh_device_id};

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use log::{info, warn};

use crate::config::ClientConfig;
use crate::contacts::{ContactDirectory, InMemoryContactDirectory};
use crate::events::{DeliveryEvent, delivery_queue};
use crate::models::{Contact, UserIdentity};
use crate::sync::dispatch::dispatch;
use crate::sync::{ExitHook, ExitReason, SyncEngine, teardown};
use crate::wire::{self, LoginError, LoginPollState, LoginTicket, SessionClient};

/// Externally registrable callbacks for the login flow
///
/// `on_qr` fires each time a ticket is issued (with the login URL a
/// human should scan); `on_login` once the handshake and bootstrap
/// finish; `on_exit` exactly once when the long-poll loop terminates,
/// for any reason.
#[derive(Default)]
pub struct LoginHooks {
    pub on_qr: Option<Box<dyn Fn(&str) + Send>>,
    pub on_login: Option<Box<dyn FnOnce() + Send>>,
    pub on_exit: Option<ExitHook>,
}

/// One logical session against the messaging endpoint
pub struct Session {
    client: SessionClient,
    ctx: Arc<SessionContext>,
    directory: Arc<dyn ContactDirectory>,
    events_tx: Sender<DeliveryEvent>,
    events_rx: Receiver<DeliveryEvent>,
    worker: Option<JoinHandle<ExitReason>>,
}

impl Session {
    /// Create a session with an in-memory contact directory
    pub fn new(config: ClientConfig) -> Self {
        Self::with_directory(config, Arc::new(InMemoryContactDirectory::new()))
    }

    /// Create a session backed by a caller-supplied contact directory
    pub fn with_directory(config: ClientConfig, directory: Arc<dyn ContactDirectory>) -> Self {
        let (events_tx, events_rx) = delivery_queue();
        Self {
            client: SessionClient::new(config),
            ctx: Arc::new(SessionContext::new()),
            directory,
            events_tx,
            events_rx,
            worker: None,
        }
    }

    /// The consumer end of the delivery-event queue
    pub fn events(&self) -> Receiver<DeliveryEvent> {
        self.events_rx.clone()
    }

    pub fn is_alive(&self) -> bool {
        self.ctx.is_alive()
    }

    pub fn is_logging_in(&self) -> bool {
        self.ctx.is_logging_in()
    }

    /// The logged-in user, once the handshake has completed
    pub fn user(&self) -> Option<UserIdentity> {
        self.ctx.user()
    }

    /// Run the QR login handshake to completion, then start the
    /// background sync loop.
    ///
    /// Blocks the calling thread while a human scans and confirms; a
    /// ticket that expires or is rejected is replaced with a fresh one
    /// until the login succeeds or [`Session::cancel_login`] is called
    /// from another thread. Handshake faults are surfaced to the caller
    /// and are not retried internally.
    pub fn login(&mut self, hooks: LoginHooks) -> Result<(), LoginError> {
        if self.ctx.is_alive() || self.ctx.is_logging_in() {
            warn!("session is already logged in or logging in");
            return Ok(());
        }
        self.ctx.set_logging_in(true);
        let result = self.login_inner(hooks);
        self.ctx.set_logging_in(false);
        result
    }

    fn login_inner(&mut self, mut hooks: LoginHooks) -> Result<(), LoginError> {
        let confirm_delay =
            Duration::from_millis(self.client.config().confirm_poll_delay_ms);

        let (session_tokens, affinity) = loop {
            if !self.ctx.is_logging_in() {
                return Ok(()); // cancelled before a ticket was confirmed
            }

            let ticket = match wire::try_push_login(&self.client) {
                Some(ticket) => ticket,
                None => wire::acquire_ticket(&self.client)?,
            };
            let qr_url = self.client.config().qr_login_url(&ticket.uuid);
            match hooks.on_qr.as_ref() {
                Some(on_qr) => on_qr(&qr_url),
                None => info!("scan the QR code to log in: {qr_url}"),
            }

            let keep_polling = || self.ctx.is_logging_in();
            match confirm_ticket(&self.client, &ticket, &keep_polling, confirm_delay)? {
                Some(handshake) => break handshake,
                None if self.ctx.is_logging_in() => {
                    info!("login ticket expired; issuing a fresh QR code");
                }
                None => return Ok(()), // cancelled mid-poll
            }
        };

        self.ctx.install_session(session_tokens, affinity);

        let init = self.client.init(&self.ctx)?;
        if init.base_response.ret != 0 {
            return Err(anyhow::anyhow!(
                "session init refused with status {}",
                init.base_response.ret
            )
            .into());
        }

        let user = UserIdentity {
            username: init.user.user_name,
            nickname: init.user.nick_name,
        };
        self.ctx.set_user(user.clone());
        self.ctx.advance_cursor(init.sync_key, None);

        // route the initial contact list through the same partition paths
        // the sync loop uses
        let contacts: Vec<Contact> =
            init.contact_list.into_iter().map(Contact::from_wire).collect();
        {
            let mut seen = self.ctx.lock_seen();
            dispatch(
                Vec::new(),
                contacts,
                &mut seen,
                self.directory.as_ref(),
                Some(&user),
                &self.events_tx,
            )?;
        }

        if let Err(e) = self.client.notify_mobile_login(&self.ctx, &user) {
            warn!("mobile-login notice failed: {e:#}");
        }

        self.ctx.set_alive(true);
        self.spawn_worker(hooks.on_exit.take());
        info!("logged in as {}", user.nickname);
        if let Some(on_login) = hooks.on_login.take() {
            on_login();
        }
        Ok(())
    }

    fn spawn_worker(&mut self, on_exit: Option<ExitHook>) {
        let engine = SyncEngine::new(
            self.ctx.clone(),
            self.client.clone(),
            self.directory.clone(),
            self.events_tx.clone(),
            self.client.config(),
            on_exit,
        );
        self.worker = Some(thread::spawn(move || engine.run()));
    }

    /// Tear the session down without waiting for the worker.
    ///
    /// Runs the server-side logout and state reset here, on the caller's
    /// thread; the worker observes the cleared alive flag at the top of
    /// its next cycle and drains without a second network call. An
    /// in-flight poll is not interrupted and ends via its own timeout.
    pub fn stop(&self) {
        teardown(&self.ctx, &self.client, self.directory.as_ref());
    }

    /// Cancel a login handshake running on another thread
    pub fn cancel_login(&self) {
        self.ctx.set_logging_in(false);
    }

    /// Terminate the session and wait for the worker to finish.
    /// Idempotent.
    pub fn logout(&mut self) {
        self.ctx.set_logging_in(false);
        teardown(&self.ctx, &self.client, self.directory.as_ref());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Login-phase transport seam, mirroring the sync loop's transport
/// trait so the handshake driver can run against a scripted channel
trait LoginChannel {
    fn poll(&self, ticket: &LoginTicket) -> Result<LoginPollState, LoginError>;

    fn establish(
        &self,
        redirect_url: &str,
    ) -> Result<(SessionTokens, ServerAffinity), LoginError>;
}

impl LoginChannel for SessionClient {
    fn poll(&self, ticket: &LoginTicket) -> Result<LoginPollState, LoginError> {
        wire::poll_ticket(self, ticket)
    }

    fn establish(
        &self,
        redirect_url: &str,
    ) -> Result<(SessionTokens, ServerAffinity), LoginError> {
        wire::establish(self, redirect_url)
    }
}

/// Poll one ticket to a terminal state and, on confirmation, resolve
/// the redirect into session tokens.
///
/// Exactly one establish call follows a confirmation; a spent ticket or
/// a cancelled login returns None without resolving anything.
fn confirm_ticket<C: LoginChannel>(
    channel: &C,
    ticket: &LoginTicket,
    keep_polling: &dyn Fn() -> bool,
    confirm_delay: Duration,
) -> Result<Option<(SessionTokens, ServerAffinity)>, LoginError> {
    let mut announced_scan = false;
    loop {
        if !keep_polling() {
            return Ok(None);
        }
        match channel.poll(ticket)? {
            LoginPollState::Confirmed { redirect_url } => {
                return channel.establish(&redirect_url).map(Some);
            }
            LoginPollState::ScannedPendingConfirm => {
                if !announced_scan {
                    info!("code scanned; waiting for confirmation on the phone");
                    announced_scan = true;
                }
                thread::sleep(confirm_delay);
            }
            // the server holds the poll itself, no client-side pacing
            LoginPollState::AwaitingScan => {}
            LoginPollState::Expired | LoginPollState::Rejected => return Ok(None),
        }
    }
}
