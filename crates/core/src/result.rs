//! Success document returned by the push endpoint.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Result of an accepted push.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushResult {
    #[serde(rename = "sendno")]
    pub send_no: String,
    pub msg_id: String,
}

impl fmt::Display for PushResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}
