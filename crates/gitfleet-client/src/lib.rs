//! Client layer for a fleet of gitserver replicas.
//!
//! The crate is organized as a pipeline:
//!
//! - [`AddressResolver`]: deterministic repo-to-replica routing over a
//!   fixed fleet, with per-repo pins and a choice of hash scheme.
//! - [`transport`]: the wire dialects (JSON over HTTP, length-prefixed
//!   protobuf over TCP) behind one [`GitserverTransport`] trait.
//! - [`RetryPolicy`]: bounded exponential backoff applied to transient
//!   transport failures only.
//! - [`Client`]: the facade composing routing, transport, git output
//!   parsing, and sub-repo permission filtering into repository
//!   operations.
//!
//! Construction is infallible at the network level: [`Client::new`]
//! validates configuration but opens no connections, so a client can be
//! built before any replica is reachable.

mod addr;
mod client;
mod config;
mod error;
mod parse;
mod retry;
pub mod transport;

pub use addr::{AddressResolver, GitserverAddress, HashScheme};
pub use client::{Client, RepoUpdateInfo};
pub use config::{ClientConfig, WireProtocol};
pub use error::{ClientError, Result};
pub use retry::RetryPolicy;
pub use transport::{ExecStream, GitserverTransport};

pub use gitfleet_authz as authz;
pub use gitfleet_proto as proto;
pub use gitfleet_types as types;
