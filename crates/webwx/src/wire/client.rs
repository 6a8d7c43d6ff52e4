//! Session HTTP client
//!
//! One cookie-bearing agent backs the whole session: the handshake
//! deposits the identity cookies, and every post-login call rides on
//! them. Uses synchronous HTTP (ureq) to be executor-agnostic.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use log::debug;
use ureq::Agent;

use crate::config::ClientConfig;
use crate::models::UserIdentity;
use crate::session::SessionContext;
use crate::sync::SyncTransport;
use crate::wire::api;

/// Client version header expected by the redirect-resolve endpoint
const CLIENT_VERSION: &str = "2.0.0";

/// Opaque token the redirect-resolve endpoint requires alongside the
/// client version; the resolve is rejected without it
const EXTSPAM: &str = "Go8FCIkFEokFCggwMDAwMDAwMRAGGvAESySibk50w5Wb3uTl2c2h64jVVrV7gNs06GFlWplHQbY/5FfiO++1yH4ykCyNPWKXmco+wfQzK5R98D3so7rJ5LmGFvBLjGceleySrc3SOf2Pc1gVehzJgODeS0lDL3/I/0S2SSE98YgKleq6Uqx6ndTy9yaL9qFxJL7eiA/R3SEfTaW1SBoSITIu+EEkXff+Pv8NHOk7N57rcGk1w0ZzRrQDkXTOXFN2iHYIzAAZPIOY45Lsh+A4slpgnDiaOvRtlQYCt97nmPLuTipOJ8Qc5pM7ZsOsAPPrCQL7nK0I7aPrFDF0q4ziUUKettzW8MrAaiVfmbD1/VkmLNVqqZVvBCtRblXb5FHmtS8FxnqCzYP4WFvz3T0TcrOqwLX1M/DQvcHaGGw0B0y4bZMs7lVScGBFxMj3vbFi2SRKbKhaitxHfYHAOAa0X7/MSS0RNAjdwoyGHeOepXOKY+h3iHeqCvgOH6LOifdHf/1aaZNwSkGotYnYScW8Yx63LnSwba7+hESrtPa/huRmB9KWvMCKbDThL/nne14hnL277EDCSocPu3rOSYjuB9gKSOdVmWsj9Dxb/iZIe+S6AiG29Esm+/eUacSba0k8wn5HhHg9d4tIcixrxveflc8vi2/wNQGVFNsGO6tB5WF0xf/plngOvQ1/ivGV/C1Qpdhzznh0ExAVJ6dwzNg7qIEBaw+BzTJTUuRcPk92Sn6QDn2Pu3mpONaEumacjW4w6ipPnPw+g2TfywJjeEcpSZaP4Q3YV5HG8D6UjWA4GSkBKculWpdCMadx0usMomsSS/74QgpYqcPkmamB4nVv1JxczYITIqItIKjD35IGKAUwAA==";

/// Transport-level fault, classified for the sync loop's failure policy
#[derive(Debug, thiserror::Error)]
pub enum TransportFault {
    /// The bounded per-call timeout elapsed (read path included)
    #[error("request timed out")]
    Timeout,
    /// The sync host's half-open keepalive artifact: garbage where the
    /// status line should be
    #[error("malformed status line on probe connection")]
    MalformedStatusLine,
    /// Any other connection-level fault
    #[error("connection fault: {0}")]
    Connection(String),
    /// The server answered with a non-success HTTP status
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
}

/// Map a ureq error onto the fault taxonomy.
///
/// The malformed-status-line match is a compatibility shim for a known
/// server quirk; it is deliberately narrow and must not be broadened to
/// other protocol errors.
fn classify(err: ureq::Error) -> TransportFault {
    match err {
        ureq::Error::StatusCode(code) => TransportFault::HttpStatus(code),
        ureq::Error::Timeout(_) => TransportFault::Timeout,
        other => {
            let detail = other.to_string();
            if detail.contains("status line") {
                TransportFault::MalformedStatusLine
            } else {
                TransportFault::Connection(detail)
            }
        }
    }
}

struct ClientInner {
    config: ClientConfig,
    agent: RwLock<Agent>,
    /// Auth uin remembered from the last establishment, for the
    /// push-login shortcut while the session cookies are still warm
    push_uin: RwLock<Option<String>>,
}

/// HTTP client for one logical session. Cheap to clone; clones share the
/// agent and its cookie jar.
#[derive(Clone)]
pub struct SessionClient {
    inner: Arc<ClientInner>,
}

impl SessionClient {
    pub fn new(config: ClientConfig) -> Self {
        let agent = build_agent(&config);
        Self {
            inner: Arc::new(ClientInner {
                config,
                agent: RwLock::new(agent),
                push_uin: RwLock::new(None),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    fn agent(&self) -> Agent {
        self.inner.agent.read().unwrap().clone()
    }

    /// Drop all cookies and transport state by replacing the agent
    pub(crate) fn reset(&self) {
        *self.inner.agent.write().unwrap() = build_agent(&self.inner.config);
        *self.inner.push_uin.write().unwrap() = None;
    }

    pub(crate) fn remember_uin(&self, uin: &str) {
        *self.inner.push_uin.write().unwrap() = Some(uin.to_string());
    }

    pub(crate) fn remembered_uin(&self) -> Option<String> {
        self.inner.push_uin.read().unwrap().clone()
    }

    /// GET a login-phase URL, returning the response text
    pub(crate) fn get_text(&self, url: &str) -> Result<String, ureq::Error> {
        let mut response = self.agent().get(url).call()?;
        response.body_mut().read_to_string()
    }

    /// GET the login redirect without following further redirects,
    /// returning the raw response so cookies and body can be read
    /// simultaneously
    pub(crate) fn resolve_redirect(
        &self,
        url: &str,
    ) -> Result<ureq::http::Response<ureq::Body>, ureq::Error> {
        self.agent()
            .get(url)
            .header("client-version", CLIENT_VERSION)
            .header("extspam", EXTSPAM)
            .header("referer", "https://wx.qq.com/?&lang=zh_CN&target=t")
            .call()
    }

    // === Post-login calls ===

    /// Bind the confirmed login into a server-side session, returning the
    /// user identity, initial cursor, and initial contact list
    pub fn init(&self, ctx: &SessionContext) -> Result<api::InitResponse> {
        let (tokens, affinity) = session_handles(ctx)?;
        let now = Utc::now().timestamp();
        let url = format!(
            "{}/webwxinit?r={}&pass_ticket={}",
            affinity.base_url,
            -(now / 1579),
            urlencoding::encode(&tokens.pass_ticket),
        );
        let body = serde_json::json!({ "BaseRequest": tokens.base_request() });

        let mut response = self
            .agent()
            .post(&url)
            .send_json(&body)
            .context("session init request failed")?;
        response
            .body_mut()
            .read_json()
            .context("failed to parse session init response")
    }

    /// Tell the server the web session is attached to the mobile login
    /// (acknowledgement ignored beyond status)
    pub fn notify_mobile_login(&self, ctx: &SessionContext, user: &UserIdentity) -> Result<()> {
        let (tokens, affinity) = session_handles(ctx)?;
        let url = format!(
            "{}/webwxstatusnotify?lang=zh_CN&pass_ticket={}",
            affinity.base_url,
            urlencoding::encode(&tokens.pass_ticket),
        );
        let body = serde_json::json!({
            "BaseRequest": tokens.base_request(),
            "Code": 3,
            "FromUserName": user.username,
            "ToUserName": user.username,
            "ClientMsgId": Utc::now().timestamp(),
        });

        self.agent()
            .post(&url)
            .send_json(&body)
            .context("mobile-login notice failed")?;
        Ok(())
    }
}

impl SyncTransport for SessionClient {
    fn probe(&self, ctx: &SessionContext) -> Result<String, TransportFault> {
        let (tokens, affinity) =
            session_handles(ctx).map_err(|e| TransportFault::Connection(e.to_string()))?;
        let url = format!(
            "{}/synccheck?r={}&skey={}&sid={}&uin={}&deviceid={}&synckey={}&_={}",
            affinity.sync_url,
            Utc::now().timestamp_millis(),
            urlencoding::encode(&tokens.skey),
            urlencoding::encode(&tokens.sid),
            urlencoding::encode(&tokens.uin),
            ctx.device_id(),
            urlencoding::encode(&ctx.cursor_flat()),
            ctx.next_seq(),
        );

        let mut response = self.agent().get(&url).call().map_err(classify)?;
        response.body_mut().read_to_string().map_err(classify)
    }

    fn fetch(&self, ctx: &SessionContext) -> Result<api::SyncResponse, TransportFault> {
        let (tokens, affinity) =
            session_handles(ctx).map_err(|e| TransportFault::Connection(e.to_string()))?;
        let url = format!(
            "{}/webwxsync?sid={}&skey={}&pass_ticket={}",
            affinity.base_url,
            urlencoding::encode(&tokens.sid),
            urlencoding::encode(&tokens.skey),
            urlencoding::encode(&tokens.pass_ticket),
        );
        let body = serde_json::json!({
            "BaseRequest": tokens.base_request(),
            "SyncKey": ctx.cursor_structured(),
            "rr": !Utc::now().timestamp(),
        });

        let mut response = self.agent().post(&url).send_json(&body).map_err(classify)?;
        response.body_mut().read_json().map_err(classify)
    }

    fn shutdown(&self, ctx: &SessionContext) {
        if let (Some(tokens), Some(affinity)) = (ctx.tokens(), ctx.affinity()) {
            let url = format!(
                "{}/webwxlogout?redirect=1&type=1&skey={}",
                affinity.base_url,
                urlencoding::encode(&tokens.skey),
            );
            // best-effort; the session dies locally either way
            if let Err(e) = self.agent().get(&url).call() {
                debug!("logout call failed: {e}");
            }
        }
        self.reset();
    }
}

/// Snapshot the establishment products, failing if the session is unbound
fn session_handles(
    ctx: &SessionContext,
) -> Result<(crate::session::SessionTokens, crate::session::ServerAffinity)> {
    let tokens = ctx.tokens().context("session tokens not established")?;
    let affinity = ctx.affinity().context("server affinity not established")?;
    Ok((tokens, affinity))
}

fn build_agent(config: &ClientConfig) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(Duration::from_secs(config.request_timeout_secs)))
        .max_redirects(0)
        .max_redirects_will_error(false)
        .user_agent(config.user_agent.as_str())
        .build()
        .new_agent()
}
