//! Free-text marker extraction
//!
//! The endpoint embeds machine state in javascript-flavored text payloads
//! instead of structured bodies. Every pattern lives here so callers only
//! ever see typed results; nothing outside this module touches raw
//! response text.

use std::sync::LazyLock;

use regex::Regex;

static TICKET_ISSUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.QRLogin\.code = (\d+); window\.QRLogin\.uuid = "(\S+?)";"#).unwrap()
});

static POLL_CODE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"window\.code=(\d+)").unwrap());

static REDIRECT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"window\.redirect_uri="(\S+)";"#).unwrap());

static SYNC_CHECK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"window\.synccheck=\{retcode:"(\d+)",selector:"(\d+)"\}"#).unwrap()
});

/// The ticket-issue payload: a numeric status plus the ticket identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketIssue {
    pub code: u32,
    pub uuid: String,
}

/// The probe payload: return code plus change selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCheckSignal {
    pub retcode: u32,
    pub selector: u32,
}

impl SyncCheckSignal {
    /// Whether the server accepted the probe at all
    pub fn accepted(&self) -> bool {
        self.retcode == 0
    }
}

/// Extract the ticket-issue markers from a `jslogin` response body
pub fn ticket_issue(body: &str) -> Option<TicketIssue> {
    let caps = TICKET_ISSUE.captures(body)?;
    Some(TicketIssue {
        code: caps[1].parse().ok()?,
        uuid: caps[2].to_string(),
    })
}

/// Extract the numeric poll status from a login-poll response body
pub fn poll_code(body: &str) -> Option<u32> {
    POLL_CODE.captures(body).and_then(|c| c[1].parse().ok())
}

/// Extract the confirmed-login redirect target from a poll response body
pub fn redirect_url(body: &str) -> Option<String> {
    REDIRECT_URL.captures(body).map(|c| c[1].to_string())
}

/// Extract an XML-like tag value (`<tag>value</tag>`) from a body
pub fn body_tag(body: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    Some(body[start..end].to_string())
}

/// Extract the probe signal from a `synccheck` response body
pub fn sync_check(body: &str) -> Option<SyncCheckSignal> {
    let caps = SYNC_CHECK.captures(body)?;
    Some(SyncCheckSignal {
        retcode: caps[1].parse().ok()?,
        selector: caps[2].parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticket_issue_match() {
        let body = r#"window.QRLogin.code = 200; window.QRLogin.uuid = "Ya_f1nQ-Lw==";"#;
        let issue = ticket_issue(body).unwrap();
        assert_eq!(issue.code, 200);
        assert_eq!(issue.uuid, "Ya_f1nQ-Lw==");
    }

    #[test]
    fn test_ticket_issue_no_match() {
        assert!(ticket_issue("<html>nothing here</html>").is_none());
        assert!(ticket_issue("window.QRLogin.code = 400;").is_none());
    }

    #[test]
    fn test_poll_code() {
        assert_eq!(poll_code("window.code=201;"), Some(201));
        assert_eq!(poll_code("window.code=408;"), Some(408));
        assert_eq!(poll_code("garbage"), None);
    }

    #[test]
    fn test_redirect_url() {
        let body = concat!(
            "window.code=200;\n",
            r#"window.redirect_uri="https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=A";"#,
        );
        assert_eq!(
            redirect_url(body).as_deref(),
            Some("https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?ticket=A")
        );
    }

    #[test]
    fn test_body_tag() {
        let body = "<error><ret>0</ret><skey>@crypt_abc</skey><pass_ticket>T%2F1</pass_ticket></error>";
        assert_eq!(body_tag(body, "skey").as_deref(), Some("@crypt_abc"));
        assert_eq!(body_tag(body, "pass_ticket").as_deref(), Some("T%2F1"));
        assert!(body_tag(body, "wxsid").is_none());
    }

    #[test]
    fn test_sync_check() {
        let signal = sync_check(r#"window.synccheck={retcode:"0",selector:"2"}"#).unwrap();
        assert!(signal.accepted());
        assert_eq!(signal.selector, 2);

        let signal = sync_check(r#"window.synccheck={retcode:"1101",selector:"0"}"#).unwrap();
        assert!(!signal.accepted());
    }

    #[test]
    fn test_sync_check_garbage() {
        assert!(sync_check("").is_none());
        assert!(sync_check("window.synccheck={retcode:0,selector:2}").is_none());
    }
}
