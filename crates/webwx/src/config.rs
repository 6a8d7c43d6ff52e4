//! Client configuration
//!
//! Tunables for the handshake and the long-poll loop. Values load from
//! (in order of priority):
//! 1. JSON file (~/.config/webwx/client.json)
//! 2. Built-in defaults

use serde::Deserialize;

/// Config filename in the webwx config directory
const CONFIG_FILE: &str = "client.json";

/// Fixed client identity registered with the login endpoint
pub const APP_ID: &str = "wx782c26e4c19acffb";

/// Tunable knobs for a [`Session`](crate::Session)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL for the login handshake endpoints
    pub login_base_url: String,
    /// Redirect target registered for the QR handshake
    pub redirect_uri: String,
    /// User-Agent presented on every call
    pub user_agent: String,
    /// Bounded per-call timeout, in seconds. The probe is held open
    /// server-side for most of this window.
    pub request_timeout_secs: u64,
    /// Delay between ticket polls once the code has been scanned, in ms
    pub confirm_poll_delay_ms: u64,
    /// Fixed sleep after a hard cycle failure, in ms
    pub retry_delay_ms: u64,
    /// Consecutive hard cycle failures tolerated before the loop gives up
    pub max_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            login_base_url: "https://login.weixin.qq.com".to_string(),
            redirect_uri:
                "https://wx.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage?mod=desktop".to_string(),
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/110.0.0.0 Safari/537.36"
                .to_string(),
            request_timeout_secs: 60,
            confirm_poll_delay_ms: 500,
            retry_delay_ms: 1000,
            max_retries: 5,
        }
    }
}

impl ClientConfig {
    /// Load the config file if present, falling back to defaults
    pub fn load() -> Self {
        if config::config_exists(CONFIG_FILE) {
            match config::load_json(CONFIG_FILE) {
                Ok(cfg) => return cfg,
                Err(e) => log::warn!("ignoring unreadable {CONFIG_FILE}: {e:#}"),
            }
        }
        Self::default()
    }

    /// The QR login URL a human should scan for the given ticket
    pub fn qr_login_url(&self, uuid: &str) -> String {
        format!("{}/l/{}", self.login_base_url, uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ClientConfig::default();
        assert_eq!(cfg.max_retries, 5);
        assert_eq!(cfg.request_timeout_secs, 60);
        assert!(cfg.login_base_url.starts_with("https://"));
    }

    #[test]
    fn test_partial_file_overlays_defaults() {
        let cfg: ClientConfig = serde_json::from_str(r#"{"max_retries": 9}"#).unwrap();
        assert_eq!(cfg.max_retries, 9);
        assert_eq!(cfg.confirm_poll_delay_ms, 500);
    }

    #[test]
    fn test_qr_login_url() {
        let cfg = ClientConfig::default();
        assert_eq!(
            cfg.qr_login_url("abc=="),
            "https://login.weixin.qq.com/l/abc=="
        );
    }
}
