//! Network protocol over TCP.
//!
//! This crate implements the ringleader wire layer:
//!
//! - [`RingMessage`]: every request and response of the RingMgr and
//!   RingDist surfaces (postcard-serialized, length-prefixed).
//! - [`TcpTransport`]: one request/response exchange per connection.
//! - [`serve`]: accept loop dispatching each connection to a
//!   [`MessageHandler`].
//! - [`RingMgrClient`]: typed client for the master's surface.

mod client;
mod error;
mod message;
mod server;
mod transport;

pub use client::RingMgrClient;
pub use error::NetError;
pub use message::RingMessage;
pub use server::{MessageHandler, serve};
pub use transport::{MAX_MESSAGE_SIZE, TcpTransport};

use ringleader_types::{RingMsg, RingVersion, StatusMsg, StatusRequest, StoreResult};

/// Client side of the RingDist surface, as used by the master.
///
/// `slave` is the endpoint string from the master's configuration. Keeping
/// this a trait lets tests route calls to in-process slaves and inject
/// failures without opening sockets.
#[async_trait::async_trait]
pub trait RingDistClient: Send + Sync {
    /// Push a new version to a slave that already holds state.
    async fn store(&self, slave: &str, msg: RingMsg) -> Result<StoreResult, NetError>;

    /// Ask a slave to make a retained version current again.
    async fn revert(&self, slave: &str, version: RingVersion) -> Result<StoreResult, NetError>;

    /// First-contact (or forced) write of a full pair.
    async fn setup(&self, slave: &str, msg: RingMsg) -> Result<StoreResult, NetError>;

    /// Report the slave's active version and health text.
    async fn status(&self, slave: &str, req: StatusRequest) -> Result<StatusMsg, NetError>;
}
