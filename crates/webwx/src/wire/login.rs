//! QR login handshake
//!
//! Implements ticket acquisition, the human-paced confirmation poll, and
//! conversion of a confirmed ticket into a bound session. All server
//! state arrives as ad-hoc text; extraction is delegated to [`parse`] so
//! every outcome here is a typed value.

use chrono::{DateTime, Utc};
use log::{debug, error};
use ureq::http::HeaderMap;

use crate::config::APP_ID;
use crate::session::{ServerAffinity, SessionTokens};
use crate::wire::client::SessionClient;
use crate::wire::{api, parse};

/// Faults fatal to the current handshake attempt. The handshake may be
/// restarted from scratch by the caller; nothing here retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Ticket issue response carried no usable ticket
    #[error("server issued no login ticket")]
    NoTicketIssued,
    /// The redirect resolve produced fewer than all four session tokens
    #[error("login response missing one or more session tokens")]
    IncompleteTokens,
    #[error("login request failed: {0}")]
    Http(#[source] Box<ureq::Error>),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ureq::Error> for LoginError {
    fn from(err: ureq::Error) -> Self {
        Self::Http(Box::new(err))
    }
}

/// One-time identifier for a pending QR login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    /// Server-issued uuid, embedded in the QR code URL
    pub uuid: String,
    pub issued_at: DateTime<Utc>,
}

/// Outcome of one confirmation poll. `Confirmed`, `Expired`, and
/// `Rejected` are terminal for the ticket; the rest mean keep polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginPollState {
    /// Code not yet scanned
    AwaitingScan,
    /// Scanned on the phone, waiting for the human to press confirm
    ScannedPendingConfirm,
    /// Confirmed; carries the redirect target for establishment
    Confirmed { redirect_url: String },
    /// The QR code outlived its server-side window
    Expired,
    /// Any other or unrecognized status; do not keep polling this ticket
    Rejected,
}

/// Request a fresh login ticket
pub fn acquire_ticket(client: &SessionClient) -> Result<LoginTicket, LoginError> {
    let config = client.config();
    let url = format!(
        "{}/jslogin?appid={}&fun=new&redirect_uri={}&lang=zh_CN",
        config.login_base_url,
        APP_ID,
        urlencoding::encode(&config.redirect_uri),
    );
    let body = client.get_text(&url)?;

    match parse::ticket_issue(&body) {
        Some(issue) if issue.code == 200 => Ok(LoginTicket {
            uuid: issue.uuid,
            issued_at: Utc::now(),
        }),
        _ => Err(LoginError::NoTicketIssued),
    }
}

/// Try the push-login shortcut: if identity cookies from a previous
/// session are still warm, the server can push a confirmation to the
/// phone without a fresh QR scan. Returns None when unavailable.
pub fn try_push_login(client: &SessionClient) -> Option<LoginTicket> {
    let uin = client.remembered_uin()?;
    // push login lives on the API origin, not the login host
    let origin = url::Url::parse(&client.config().redirect_uri)
        .ok()
        .and_then(|u| Some(format!("{}://{}", u.scheme(), u.host_str()?)))?;
    let url = format!(
        "{}/cgi-bin/mmwebwx-bin/webwxpushloginurl?uin={}",
        origin,
        urlencoding::encode(&uin),
    );

    let body = match client.get_text(&url) {
        Ok(body) => body,
        Err(e) => {
            debug!("push login unavailable: {e}");
            return None;
        }
    };
    let response: api::PushLoginResponse = serde_json::from_str(&body).ok()?;
    let uuid = push_login_uuid(response)?;

    Some(LoginTicket {
        uuid,
        issued_at: Utc::now(),
    })
}

/// Extract the pushed ticket uuid, requiring an ok status
fn push_login_uuid(response: api::PushLoginResponse) -> Option<String> {
    if !response.ok() {
        return None;
    }
    response.uuid
}

/// Poll the confirmation status of a pending ticket once
pub fn poll_ticket(
    client: &SessionClient,
    ticket: &LoginTicket,
) -> Result<LoginPollState, LoginError> {
    let now = Utc::now().timestamp();
    let url = format!(
        "{}/cgi-bin/mmwebwx-bin/login?loginicon=true&uuid={}&tip=1&r={}&_={}",
        client.config().login_base_url,
        urlencoding::encode(&ticket.uuid),
        -(now / 1579),
        now,
    );
    let body = client.get_text(&url)?;
    Ok(interpret_poll_body(&body))
}

/// Map the poll response text onto a poll state.
///
/// 200 is the only path to Confirmed; an unrecognized code is terminal
/// (Rejected), distinct from 408 which just means keep waiting.
fn interpret_poll_body(body: &str) -> LoginPollState {
    match parse::poll_code(body) {
        Some(200) => match parse::redirect_url(body) {
            Some(redirect_url) => LoginPollState::Confirmed { redirect_url },
            // confirmed with no redirect target is unusable
            None => LoginPollState::Rejected,
        },
        Some(201) => LoginPollState::ScannedPendingConfirm,
        Some(408) => LoginPollState::AwaitingScan,
        Some(400) => LoginPollState::Expired,
        _ => LoginPollState::Rejected,
    }
}

/// Convert a confirmed login into a bound session: resolve the redirect
/// without following it, reading cookies and body simultaneously.
///
/// Extraction is strict: all four tokens or [`LoginError::IncompleteTokens`],
/// in which case the login is failed and not retried at this layer.
pub fn establish(
    client: &SessionClient,
    redirect_url: &str,
) -> Result<(SessionTokens, ServerAffinity), LoginError> {
    let response = client.resolve_redirect(redirect_url)?;
    let (parts, body) = response.into_parts();
    let mut body = body;
    let text = body.read_to_string()?;

    let skey = parse::body_tag(&text, "skey");
    let pass_ticket = parse::body_tag(&text, "pass_ticket");
    let sid = cookie_value(&parts.headers, "wxsid");
    let uin = cookie_value(&parts.headers, "wxuin");

    let (Some(skey), Some(pass_ticket), Some(sid), Some(uin)) = (skey, pass_ticket, sid, uin)
    else {
        error!("redirect resolve returned incomplete tokens; the account may be restricted from the web endpoint");
        return Err(LoginError::IncompleteTokens);
    };

    client.remember_uin(&uin);

    let base_url = match redirect_url.rfind('/') {
        Some(idx) => &redirect_url[..idx],
        None => redirect_url,
    };
    let affinity = ServerAffinity::from_redirect(base_url);
    let tokens = SessionTokens {
        skey,
        sid,
        uin,
        pass_ticket,
    };

    Ok((tokens, affinity))
}

/// Pull a named cookie out of the Set-Cookie headers
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get_all("set-cookie").iter().find_map(|value| {
        let raw = value.to_str().ok()?;
        let (key, rest) = raw.split_once('=')?;
        if key.trim() == name {
            Some(rest.split(';').next().unwrap_or("").to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ureq::http::HeaderValue;

    fn poll_body(code: u32) -> String {
        format!("window.code={code};")
    }

    #[test]
    fn test_poll_state_mapping() {
        assert_eq!(interpret_poll_body(&poll_body(408)), LoginPollState::AwaitingScan);
        assert_eq!(
            interpret_poll_body(&poll_body(201)),
            LoginPollState::ScannedPendingConfirm
        );
        assert_eq!(interpret_poll_body(&poll_body(400)), LoginPollState::Expired);
        assert_eq!(interpret_poll_body(&poll_body(500)), LoginPollState::Rejected);
        assert_eq!(interpret_poll_body("no markers at all"), LoginPollState::Rejected);
    }

    #[test]
    fn test_confirmed_only_on_200_with_redirect() {
        let body = concat!(
            "window.code=200;\n",
            r#"window.redirect_uri="https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=T";"#,
        );
        assert_eq!(
            interpret_poll_body(body),
            LoginPollState::Confirmed {
                redirect_url:
                    "https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=T".to_string()
            }
        );

        // 200 with no redirect target is unusable
        assert_eq!(interpret_poll_body(&poll_body(200)), LoginPollState::Rejected);
    }

    #[test]
    fn test_scan_to_confirm_sequence() {
        // 201 three times then 200: the state sequence the caller observes
        let bodies = [
            poll_body(408),
            poll_body(201),
            poll_body(201),
            poll_body(201),
            format!(
                "window.code=200;\nwindow.redirect_uri=\"https://wx.qq.com/r?ticket=T\";"
            ),
        ];
        let states: Vec<LoginPollState> =
            bodies.iter().map(|b| interpret_poll_body(b)).collect();
        assert_eq!(states[0], LoginPollState::AwaitingScan);
        assert!(states[1..4]
            .iter()
            .all(|s| *s == LoginPollState::ScannedPendingConfirm));
        assert!(matches!(states[4], LoginPollState::Confirmed { .. }));
    }

    #[test]
    fn test_push_login_uuid_requires_ok_status() {
        let granted: api::PushLoginResponse =
            serde_json::from_str(r#"{"ret": "0", "uuid": "QabcDef=="}"#).unwrap();
        assert_eq!(push_login_uuid(granted).as_deref(), Some("QabcDef=="));

        let refused: api::PushLoginResponse =
            serde_json::from_str(r#"{"ret": 1, "uuid": "QabcDef=="}"#).unwrap();
        assert!(push_login_uuid(refused).is_none());

        let incomplete: api::PushLoginResponse = serde_json::from_str(r#"{"ret": 0}"#).unwrap();
        assert!(push_login_uuid(incomplete).is_none());
    }

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.append(
            "set-cookie",
            HeaderValue::from_static("wxsid=abc123; Domain=.qq.com; Path=/"),
        );
        headers.append(
            "set-cookie",
            HeaderValue::from_static("wxuin=987654; Domain=.qq.com; Path=/; HttpOnly"),
        );

        assert_eq!(cookie_value(&headers, "wxsid").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "wxuin").as_deref(), Some("987654"));
        assert!(cookie_value(&headers, "pass_ticket").is_none());
    }
}
