//! Ring control plane: membership, change pipeline and distribution.
//!
//! This crate provides:
//!
//! - [`AdmissionFilters`]: network-range and tier allow-lists.
//! - [`NodeRegistry`]: the authoritative membership table.
//! - [`change`]: the single-worker pipeline every mutation goes through.
//! - [`DistributionClient`]: fan-out of ring versions to slaves with
//!   quorum classification.
//! - [`RingMgr`]: the master's service surface.
//! - [`RingDist`]: the slave's service surface.
//! - [`RingService`]: request dispatch for either role.

pub mod change;
mod dist;
mod distribution;
mod error;
mod filters;
mod mgr;
mod registry;
mod service;
mod state;


pub use change::{Applied, Change, ChangeHandle, Rejected};
pub use dist::RingDist;
pub use distribution::{DistributionClient, DistributionConfig, DistributionReport};
pub use error::ClusterError;
pub use filters::{AdmissionFilters, NetRange};
pub use mgr::RingMgr;
pub use registry::{NodeRegistry, search_nodes};
pub use service::RingService;
pub use state::{RingSnapshot, RingState};
