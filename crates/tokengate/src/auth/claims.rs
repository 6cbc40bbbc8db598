//! JWT claims carried by gateway tokens.

use serde::{Deserialize, Serialize};

/// JWT claims structure.
///
/// `sub` defaults to empty when absent so that a validly signed token without
/// a subject decodes and is then rejected as malformed rather than failing
/// inside the JSON layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username).
    #[serde(default)]
    pub sub: String,

    /// Expiration time (as Unix timestamp).
    pub exp: i64,

    /// Issued at (as Unix timestamp).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl Claims {
    /// Returns the subject if it is present and non-empty.
    pub fn subject(&self) -> Option<&str> {
        let sub = self.sub.trim();
        if sub.is_empty() { None } else { Some(&self.sub) }
    }

    /// Whether the claims are still live at `now` (seconds since epoch).
    pub fn is_live_at(&self, now: i64, leeway_secs: u64) -> bool {
        self.exp.saturating_add(leeway_secs as i64) > now
    }
}
