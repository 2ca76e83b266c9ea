//! Embeddable leader-election SDK.
//!
//! A host application constructs a [`Cluster`] from a [`ClusterConfig`]
//! naming its own identity, listen address, and fixed peer set. The cluster
//! runs a simplified Raft state machine in the background, coordinating
//! with peers over the HTTP/JSON RPCs described in the `transport` module,
//! and exposes the current role and known leader through a small read-only
//! API. Log replication, persistent state, and dynamic membership changes
//! are outside this crate's scope.

pub mod config;
pub mod engine;
pub mod error;
pub mod registry;
pub mod transport;

mod cluster;

pub use cluster::Cluster;
pub use config::ClusterConfig;
pub use engine::Role;
pub use error::{ClusterError, ConfigError, TransportError};
pub use registry::{Peer, PeerDescriptor, Registry};
pub use transport::{Callback, CallbackResult};
