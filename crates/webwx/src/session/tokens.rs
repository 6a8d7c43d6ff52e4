//! Session tokens, server affinity, and the pseudo device identifier

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::wire::api::BaseRequest;

/// Ordered table of known login domains and their (file, sync) host pairs.
/// First match wins; the table order is part of the protocol contract.
const AFFINITY_TABLE: [(&str, &str, &str); 5] = [
    ("wx2.qq.com", "file.wx2.qq.com", "webpush.wx2.qq.com"),
    ("wx8.qq.com", "file.wx8.qq.com", "webpush.wx8.qq.com"),
    ("qq.com", "file.wx.qq.com", "webpush.wx.qq.com"),
    ("web2.wechat.com", "file.web2.wechat.com", "webpush.web2.wechat.com"),
    ("wechat.com", "file.web.wechat.com", "webpush.web.wechat.com"),
];

/// The four credential values required to authorize any post-login call
///
/// All four must be present simultaneously; partial extraction is rejected
/// during [`establish`](crate::wire::establish). Immutable once populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Session key from the `<skey>` body tag
    pub skey: String,
    /// Session id from the `wxsid` cookie
    pub sid: String,
    /// Auth uin from the `wxuin` cookie
    pub uin: String,
    /// Pass ticket from the `<pass_ticket>` body tag
    pub pass_ticket: String,
}

impl SessionTokens {
    /// Build the base request envelope carried by every post-login call
    pub fn base_request(&self) -> BaseRequest {
        BaseRequest {
            skey: self.skey.clone(),
            sid: self.sid.clone(),
            uin: self.uin.clone(),
        }
    }
}

/// Host roles chosen from the redirect domain at login time
///
/// Immutable after establishment. Every URL is a full
/// `https://<host>/cgi-bin/mmwebwx-bin` base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerAffinity {
    /// Primary API base, derived from the redirect URL
    pub base_url: String,
    /// File upload/download base
    pub file_url: String,
    /// Long-poll probe base
    pub sync_url: String,
}

impl ServerAffinity {
    /// Choose host affinity from the resolved redirect URL.
    ///
    /// `base_url` is the redirect URL truncated at its last `/`. The host
    /// is tested against the ordered login-domain table; no match falls
    /// back to the base for all three roles.
    pub fn from_redirect(base_url: &str) -> Self {
        let host = Url::parse(base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default();

        for (domain, file_host, sync_host) in AFFINITY_TABLE {
            if host.ends_with(domain) {
                return Self {
                    base_url: base_url.to_string(),
                    file_url: format!("https://{file_host}/cgi-bin/mmwebwx-bin"),
                    sync_url: format!("https://{sync_host}/cgi-bin/mmwebwx-bin"),
                };
            }
        }

        Self {
            base_url: base_url.to_string(),
            file_url: base_url.to_string(),
            sync_url: base_url.to_string(),
        }
    }
}

/// Generate a fresh pseudo device identifier: `e` plus 15 random digits.
///
/// The server appears not to correlate this across calls; it is
/// regenerated for every delta fetch and never persisted, matching the
/// endpoint's observed client behavior.
pub fn fresh_device_id() -> String {
    let mut rng = rand::thread_rng();
    let digits: String = (0..15)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("e{digits}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_known_domain() {
        let affinity = ServerAffinity::from_redirect("https://wx2.qq.com/cgi-bin/mmwebwx-bin");
        assert_eq!(affinity.file_url, "https://file.wx2.qq.com/cgi-bin/mmwebwx-bin");
        assert_eq!(affinity.sync_url, "https://webpush.wx2.qq.com/cgi-bin/mmwebwx-bin");
    }

    #[test]
    fn test_affinity_first_match_wins() {
        // wx2.qq.com also ends with qq.com; the wx2 row must win
        let affinity = ServerAffinity::from_redirect("https://wx2.qq.com/cgi-bin/mmwebwx-bin");
        assert_ne!(affinity.file_url, "https://file.wx.qq.com/cgi-bin/mmwebwx-bin");
    }

    #[test]
    fn test_affinity_generic_qq_domain() {
        let affinity = ServerAffinity::from_redirect("https://wx.qq.com/cgi-bin/mmwebwx-bin");
        assert_eq!(affinity.file_url, "https://file.wx.qq.com/cgi-bin/mmwebwx-bin");
        assert_eq!(affinity.sync_url, "https://webpush.wx.qq.com/cgi-bin/mmwebwx-bin");
    }

    #[test]
    fn test_affinity_fallback() {
        let base = "https://example.org/cgi-bin/mmwebwx-bin";
        let affinity = ServerAffinity::from_redirect(base);
        assert_eq!(affinity.base_url, base);
        assert_eq!(affinity.file_url, base);
        assert_eq!(affinity.sync_url, base);
    }

    #[test]
    fn test_fresh_device_id_shape() {
        let id = fresh_device_id();
        assert_eq!(id.len(), 16);
        assert!(id.starts_with('e'));
        assert!(id[1..].chars().all(|c| c.is_ascii_digit()));

        // regenerated, not cached
        assert_ne!(fresh_device_id(), fresh_device_id());
    }

    #[test]
    fn test_base_request() {
        let tokens = SessionTokens {
            skey: "@crypt".to_string(),
            sid: "SID".to_string(),
            uin: "12345".to_string(),
            pass_ticket: "PT".to_string(),
        };
        let req = tokens.base_request();
        assert_eq!(req.skey, "@crypt");
        assert_eq!(req.sid, "SID");
        assert_eq!(req.uin, "12345");
    }
}
