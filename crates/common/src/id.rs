//! ID and token generation utilities.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use ulid::Ulid;

/// Number of random bytes behind every invitation token.
pub const TOKEN_BYTES: usize = 32;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs sort by creation time, which keeps invitation and question
    /// listings in insertion order without an extra column.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }
}

/// Issues the bearer tokens that grant quiz access.
///
/// Tokens carry no structure: 32 bytes from the OS CSPRNG, URL-safe base64
/// without padding (43 characters). Uniqueness is probabilistic; collisions
/// are treated as impossible.
#[derive(Debug, Clone, Default)]
pub struct TokenIssuer {
    _private: (),
}

impl TokenIssuer {
    /// Create a new token issuer.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Issue a fresh token.
    #[must_use]
    pub fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
