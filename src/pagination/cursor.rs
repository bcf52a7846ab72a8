//! Opaque cursor tokens.
//!
//! A cursor is the URL-safe base64 form of a sort key's decimal string.
//! Callers only echo tokens back; the raw key never leaves this module.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::types::SortKey;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(String);

impl Cursor {
    pub fn encode(key: SortKey) -> Self {
        Cursor(URL_SAFE_NO_PAD.encode(key.to_string()))
    }

    /// Wrap a token received from a caller. Nothing is validated here.
    pub fn from_token(token: impl Into<String>) -> Self {
        Cursor(token.into())
    }

    /// The sort key behind this token, or `None` if the token is malformed.
    /// `None` means "no bound on this side".
    pub fn decode(&self) -> Option<SortKey> {
        let decoded = decode_token(&self.0);
        if decoded.is_none() {
            debug!(token = %self.0, "ignoring malformed cursor");
        }
        decoded
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn decode_token(token: &str) -> Option<SortKey> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    // Accept padded tokens from clients that re-pad on their side.
    let bytes = URL_SAFE_NO_PAD.decode(token.trim_end_matches('=')).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    text.parse::<SortKey>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_key_shape() {
        for key in [0, 1, 6, 25, -1, 1_700_000_000_123, i64::MAX, i64::MIN] {
            let cursor = Cursor::encode(SortKey(key));
            assert_eq!(cursor.decode(), Some(SortKey(key)), "key {}", key);
        }
    }

    #[test]
    fn tokens_are_url_safe() {
        let cursor = Cursor::encode(SortKey(i64::MIN));
        assert!(cursor
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn malformed_tokens_decode_to_none() {
        for token in ["", "   ", "!!!", "YWJj", "/w"] {
            assert_eq!(Cursor::from_token(token).decode(), None, "token {:?}", token);
        }
    }

    #[test]
    fn padded_tokens_are_accepted() {
        let cursor = Cursor::encode(SortKey(6));
        let padded = format!("{}==", cursor.as_str());
        assert_eq!(Cursor::from_token(padded).decode(), Some(SortKey(6)));
    }
}
