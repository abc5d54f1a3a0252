//! One-time QR redemption tokens.
//!
//! A token is 16 bytes from the operating system's CSPRNG, rendered as a
//! 32-character lowercase hex string. Uniqueness is guaranteed by the
//! `qr_token` column constraint, not by the generator; at this entropy a
//! collision is a retry-worthy fluke, not an expected event.

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

use crate::error::CouponError;

/// Rendered token length in characters.
pub const TOKEN_LEN: usize = 32;

/// A validated QR redemption token.
///
/// Construction goes through [`QrToken::generate`] or [`QrToken::parse`], so
/// holding one of these means the format check already happened: handlers
/// reject malformed input before any storage access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QrToken(String);

impl QrToken {
    /// Mint a fresh token from the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_LEN / 2];
        OsRng.fill_bytes(&mut bytes);

        let mut hex = String::with_capacity(TOKEN_LEN);
        for byte in bytes {
            // Writing to a String cannot fail.
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex)
    }

    /// Validate and normalize a token received from a client.
    ///
    /// Accepts exactly [`TOKEN_LEN`] ASCII hex digits (either case) and
    /// normalizes to lowercase, matching the stored form.
    ///
    /// # Errors
    ///
    /// Returns [`CouponError::MalformedToken`] for any other input.
    pub fn parse(raw: &str) -> Result<Self, CouponError> {
        if raw.len() != TOKEN_LEN || !raw.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CouponError::MalformedToken);
        }
        Ok(Self(raw.to_ascii_lowercase()))
    }

    /// The token as stored in the database.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for QrToken {
    type Error = CouponError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QrToken> for String {
    fn from(token: QrToken) -> Self {
        token.0
    }
}

impl fmt::Display for QrToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_well_formed() {
        let token = QrToken::generate();
        assert_eq!(token.as_str().len(), TOKEN_LEN);
        assert!(
            token
                .as_str()
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        );
    }

    #[test]
    fn generated_tokens_differ() {
        assert_ne!(QrToken::generate(), QrToken::generate());
    }

    #[test]
    fn parse_accepts_uppercase_and_normalizes() {
        let token = QrToken::parse("00FFAA11223344556677889900AABBCC").unwrap();
        assert_eq!(token.as_str(), "00ffaa11223344556677889900aabbcc");
    }

    #[test]
    fn parse_rejects_wrong_length() {
        assert!(matches!(
            QrToken::parse("abc123"),
            Err(CouponError::MalformedToken)
        ));
        assert!(QrToken::parse(&"a".repeat(TOKEN_LEN + 2)).is_err());
        assert!(QrToken::parse("").is_err());
    }

    #[test]
    fn parse_rejects_non_hex() {
        assert!(QrToken::parse(&"g".repeat(TOKEN_LEN)).is_err());
        // Multi-byte characters must not sneak past the length check.
        assert!(QrToken::parse(&"é".repeat(TOKEN_LEN / 2)).is_err());
    }

    #[test]
    fn serde_roundtrip_enforces_format() {
        let token = QrToken::generate();
        let json = serde_json::to_string(&token).unwrap();
        let back: QrToken = serde_json::from_str(&json).unwrap();
        assert_eq!(token, back);

        let bad: Result<QrToken, _> = serde_json::from_str("\"not-a-token\"");
        assert!(bad.is_err());
    }
}
