//! Branded ID newtypes.
//!
//! `SessionId` identifies one connected client for the lifetime of its
//! connection and is never shown to humans. `LobbyCode` is the short code a
//! host reads out to the second player, so it uses an unambiguous alphabet
//! and is normalized on input.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Process-unique identifier for a connected client (UUID v7, time-ordered).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Six-character join code identifying an active lobby.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LobbyCode(String);

impl LobbyCode {
    /// Number of characters in a generated code.
    pub const LEN: usize = 6;

    /// Characters a generated code is drawn from (no `0/O`, `1/I`).
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

    /// Build a code from client input: surrounding whitespace is trimmed and
    /// letters are upper-cased. No length check, so an unknown code simply
    /// fails lookup.
    #[must_use]
    pub fn from_input(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    /// Build a code from alphabet indices. Indices wrap modulo the alphabet size.
    #[must_use]
    pub fn from_indices(indices: [usize; Self::LEN]) -> Self {
        let code = indices
            .iter()
            .map(|&i| char::from(Self::ALPHABET[i % Self::ALPHABET.len()]))
            .collect();
        Self(code)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LobbyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for LobbyCode {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}
