//! Lock owner tokens.

use std::fmt;

use rand::{rngs::OsRng, RngCore};

/// Bytes of OS randomness per token (128 bits)
const TOKEN_BYTES: usize = 16;

/// Opaque proof of lock ownership, returned by a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Draws a fresh token from the OS CSPRNG, hex-encoded.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wraps a token received from elsewhere, e.g. another process.
    pub fn from_string(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short random suffix keeping same-millisecond rate-limit members distinct.
pub(crate) fn random_suffix() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
