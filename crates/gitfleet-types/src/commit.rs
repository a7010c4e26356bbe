//! Commit types.

use serde::{Deserialize, Serialize};

use crate::TypeError;

/// A fully resolved commit id: 40 lowercase hex characters.
///
/// Abbreviated prefixes and symbolic refs are *revision specs*, plain
/// strings resolved server-side; only resolved ids become a [`CommitId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    /// Parses a commit id, requiring exactly 40 hex characters.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::InvalidCommitId`] for anything else.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        if s.len() == 40 && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(TypeError::InvalidCommitId(s.to_string()))
        }
    }

    /// Returns the id as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CommitId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An author or committer signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Person name.
    pub name: String,
    /// Email address.
    pub email: String,
    /// Unix timestamp (seconds) of the signature.
    pub date: i64,
}

/// A git commit as returned by the fleet.
///
/// Absence of a commit (unresolvable revision, permission-filtered) is
/// modeled as `Option<Commit>` in batch responses, never as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    /// The resolved commit id.
    pub id: CommitId,
    /// Author signature.
    pub author: Signature,
    /// Committer signature.
    pub committer: Signature,
    /// Full commit message.
    pub message: String,
    /// Parent commit ids, in order.
    pub parents: Vec<CommitId>,
}
