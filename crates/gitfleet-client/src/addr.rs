//! Repository-to-replica address resolution.
//!
//! Every repository is owned by exactly one replica of the fleet. The
//! resolver maps a repository name onto its owner deterministically:
//! pinned overrides first, then the configured hash scheme. Resolution is
//! a pure function of the name and the fleet list, so every process with
//! the same configuration routes identically.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use gitfleet_types::RepoName;

use crate::{ClientError, Result};

/// The network address (host:port) of one gitserver replica.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GitserverAddress(String);

impl GitserverAddress {
    /// Creates an address.
    pub fn new(addr: impl Into<String>) -> Self {
        Self(addr.into())
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GitserverAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GitserverAddress {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// The hash scheme used to assign repositories to replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashScheme {
    /// Hash the name, reduce modulo the fleet size. Changing the fleet
    /// size reshuffles almost every repository; kept for fleets sharded
    /// by the legacy scheme.
    Modulo,
    /// Rendezvous (highest random weight) hashing: adding or removing one
    /// replica remaps only ~1/N of repositories.
    #[default]
    Rendezvous,
}

/// Maps repository names onto the fleet.
#[derive(Debug, Clone)]
pub struct AddressResolver {
    addrs: Vec<GitserverAddress>,
    pinned: HashMap<RepoName, GitserverAddress>,
    scheme: HashScheme,
}

impl AddressResolver {
    /// Creates a resolver over a fixed fleet.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::EmptyFleet`] if `addrs` is empty; an empty
    /// fleet is a configuration error caught at construction so that
    /// [`AddressResolver::resolve`] never fails.
    pub fn new(
        addrs: Vec<GitserverAddress>,
        pinned: HashMap<RepoName, GitserverAddress>,
        scheme: HashScheme,
    ) -> Result<Self> {
        if addrs.is_empty() {
            return Err(ClientError::EmptyFleet);
        }
        Ok(Self {
            addrs,
            pinned,
            scheme,
        })
    }

    /// Returns the full fleet list, in configuration order.
    #[must_use]
    pub fn addrs(&self) -> &[GitserverAddress] {
        &self.addrs
    }

    /// Resolves the replica owning `repo`.
    ///
    /// Pure and deterministic: the same name resolves to the same address
    /// for as long as the fleet list is unchanged.
    #[must_use]
    pub fn resolve(&self, repo: &RepoName) -> &GitserverAddress {
        if let Some(addr) = self.pinned.get(repo) {
            return addr;
        }
        match self.scheme {
            HashScheme::Modulo => self.resolve_modulo(repo),
            HashScheme::Rendezvous => self.resolve_rendezvous(repo),
        }
    }

    fn resolve_modulo(&self, repo: &RepoName) -> &GitserverAddress {
        let index = hash64(repo.as_str().as_bytes()) % self.addrs.len() as u64;
        &self.addrs[index as usize]
    }

    fn resolve_rendezvous(&self, repo: &RepoName) -> &GitserverAddress {
        // Highest weight wins; ties break on the address itself so the
        // outcome never depends on configuration order.
        self.addrs
            .iter()
            .max_by_key(|addr| (weight(addr, repo), std::cmp::Reverse(addr.as_str())))
            .expect("fleet is non-empty by construction")
    }
}

/// Rendezvous weight of (address, repository).
fn weight(addr: &GitserverAddress, repo: &RepoName) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(addr.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(repo.as_str().as_bytes());
    let digest = hasher.finalize();
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 yields 32 bytes"))
}

/// A stable, well-mixed 64-bit hash of the input.
fn hash64(data: &[u8]) -> u64 {
    let digest = Sha256::digest(data);
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 yields 32 bytes"))
}
