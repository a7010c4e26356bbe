//! Client configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use gitfleet_types::RepoName;

use crate::addr::{GitserverAddress, HashScheme};
use crate::retry::RetryPolicy;

/// Which wire dialect the client speaks to the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireProtocol {
    /// JSON over HTTP.
    #[default]
    Json,
    /// Length-prefixed protobuf over TCP.
    Proto,
}

/// Configuration for a [`Client`](crate::Client).
///
/// The fleet list is fixed for the lifetime of the client; membership
/// changes require constructing a new client from fresh configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The fleet: every known replica address, in configuration order.
    pub addrs: Vec<GitserverAddress>,
    /// Repositories routed to a fixed replica, bypassing hashing.
    pub pinned: HashMap<RepoName, GitserverAddress>,
    /// The repo-to-replica hash scheme.
    pub scheme: HashScheme,
    /// The wire dialect.
    pub protocol: WireProtocol,
    /// Deadline applied to every call; must be non-zero.
    pub default_timeout: Duration,
    /// Dial timeout for new connections.
    pub connect_timeout: Duration,
    /// Retry policy for transient transport failures.
    pub retry: RetryPolicy,
}

impl ClientConfig {
    /// Creates a configuration for the given fleet with default policies.
    pub fn new(addrs: Vec<GitserverAddress>) -> Self {
        Self {
            addrs,
            pinned: HashMap::new(),
            scheme: HashScheme::default(),
            protocol: WireProtocol::default(),
            default_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}
