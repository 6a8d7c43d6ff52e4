//! The undocumented HTTP surface
//!
//! This module provides:
//! - The QR login handshake (ticket issue, status polling, redirect resolve)
//! - The session HTTP client (init, status notify, long-poll probe, delta
//!   fetch, logout)
//! - Free-text marker extraction behind typed results
//!
//! The endpoint communicates state through ad-hoc text patterns instead of
//! structured status codes; everything pattern-shaped is isolated in
//! [`parse`] so the rest of the crate only sees typed values.

mod client;
mod login;
pub mod parse;

pub use client::{SessionClient, TransportFault};
pub use login::{
    LoginError, LoginPollState, LoginTicket, acquire_ticket, establish, poll_ticket,
    try_push_login,
};

/// Wire response types
///
/// Field names follow the endpoint's PascalCase JSON exactly; anything the
/// server is known to omit is optional with a default.
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Top-level status envelope present on every JSON response
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct BaseResponse {
        pub ret: i64,
        pub err_msg: Option<String>,
    }

    /// The base request envelope sent with every post-login call
    #[derive(Debug, Clone, Serialize)]
    pub struct BaseRequest {
        #[serde(rename = "Skey")]
        pub skey: String,
        #[serde(rename = "Sid")]
        pub sid: String,
        #[serde(rename = "Uin")]
        pub uin: String,
    }

    /// One key/value version pair of the synchronization cursor
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase")]
    pub struct SyncKeyPair {
        pub key: i64,
        pub val: i64,
    }

    /// The structured synchronization cursor as the server ships it
    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct SyncKeyList {
        pub count: i64,
        pub list: Vec<SyncKeyPair>,
    }

    /// The logged-in user as reported by session init
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct WireUser {
        pub user_name: String,
        pub nick_name: String,
    }

    /// A contact entry in init or delta responses
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct WireContact {
        pub user_name: String,
        pub nick_name: String,
    }

    /// A message entry in delta responses
    #[derive(Debug, Clone, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct WireMessage {
        pub msg_id: String,
        pub from_user_name: String,
        pub to_user_name: String,
        pub msg_type: i64,
        pub content: String,
        pub create_time: i64,
    }

    /// Response from session init
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct InitResponse {
        pub base_response: BaseResponse,
        pub user: WireUser,
        pub sync_key: SyncKeyList,
        pub contact_list: Vec<WireContact>,
    }

    /// Response from the delta fetch
    ///
    /// The structured cursor for the next fetch comes back as `SyncKey`;
    /// the flattened probe token is derived from `SyncCheckKey` when the
    /// server sends one.
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct SyncResponse {
        pub base_response: BaseResponse,
        pub sync_key: SyncKeyList,
        pub sync_check_key: Option<SyncKeyList>,
        pub add_msg_list: Vec<WireMessage>,
        pub mod_contact_list: Vec<WireContact>,
    }

    /// Response from the push-login shortcut
    ///
    /// `ret` arrives as either a number or a string depending on server
    /// mood, so it is kept loose and tested with [`PushLoginResponse::ok`].
    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct PushLoginResponse {
        pub ret: Option<serde_json::Value>,
        pub uuid: Option<String>,
    }

    impl PushLoginResponse {
        pub fn ok(&self) -> bool {
            match &self.ret {
                Some(serde_json::Value::Number(n)) => n.as_i64() == Some(0),
                Some(serde_json::Value::String(s)) => s == "0",
                _ => false,
            }
        }
    }

    /// Response from logout (best-effort, consumed for logging only)
    #[derive(Debug, Default, Deserialize)]
    #[serde(rename_all = "PascalCase", default)]
    pub struct LogoutResponse {
        pub base_response: BaseResponse,
    }

}
