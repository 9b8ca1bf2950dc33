#![forbid(unsafe_code)]

mod cluster_store;
mod config;
pub mod coordinator;
mod dispatch;
mod peer;
mod service;
mod syncer;
mod task;
mod topology;

pub use cluster_store::ClusterStore;
pub use config::ClusterConfig;
pub use coordinator::{Coordinator, MemoryCoordinator, RemoteCoordinator};
pub use peer::{DialSettings, PeerClient};
pub use service::{RpcService, error_response, into_result, malformed_request, status_of};
pub use syncer::{Syncer, SyncerStatus};
pub use topology::{Role, Topology};
