//! Network transport built on tokio TCP.
//!
//! [`TcpTransport`] opens one connection per request, writes a single
//! length-prefixed postcard frame, reads a single frame back and closes.
//! The control plane exchanges a handful of messages per ring change, so
//! connection reuse buys nothing here.

use std::time::Duration;

use ringleader_types::{RingMsg, RingVersion, StatusMsg, StatusRequest, StoreResult};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::RingDistClient;
use crate::error::NetError;
use crate::message::RingMessage;

/// Maximum frame size: 64 MB. Rings for large clusters stay well below.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Request/response transport over plain TCP.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    connect_timeout: Duration,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpTransport {
    pub fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override how long establishing a connection may take.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Send `msg` to `addr` and wait for the single response frame.
    pub async fn request(&self, addr: &str, msg: &RingMessage) -> Result<RingMessage, NetError> {
        let mut stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| NetError::Timeout(self.connect_timeout))?
            .map_err(|e| NetError::Connect(format!("{addr}: {e}")))?;
        stream.set_nodelay(true)?;

        Self::send_message(&mut stream, msg).await?;
        let response = Self::recv_message(&mut stream).await?;
        debug!(
            addr,
            request = msg.kind(),
            response = response.kind(),
            "request completed"
        );
        Ok(response)
    }

    // -------------------------------------------------------------------
    // Framing
    // -------------------------------------------------------------------

    /// Write one message: 4-byte big-endian length, then the postcard payload.
    pub async fn send_message<W>(writer: &mut W, message: &RingMessage) -> Result<(), NetError>
    where
        W: AsyncWrite + Unpin,
    {
        let payload =
            postcard::to_allocvec(message).map_err(|e| NetError::Serialization(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_SIZE {
            return Err(NetError::MessageTooLarge(payload.len()));
        }

        writer
            .write_all(&(payload.len() as u32).to_be_bytes())
            .await?;
        writer.write_all(&payload).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read one message written by [`TcpTransport::send_message`].
    pub async fn recv_message<R>(reader: &mut R) -> Result<RingMessage, NetError>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        reader.read_exact(&mut len_buf).await.map_err(eof_to_closed)?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(NetError::MessageTooLarge(len));
        }

        let mut payload = vec![0u8; len];
        reader.read_exact(&mut payload).await.map_err(eof_to_closed)?;
        postcard::from_bytes(&payload).map_err(|e| NetError::Serialization(e.to_string()))
    }
}

fn eof_to_closed(e: std::io::Error) -> NetError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        NetError::StreamClosed
    } else {
        NetError::Io(e)
    }
}

/// Turn a response of the wrong kind into an error, surfacing remote
/// failures as [`NetError::Remote`].
pub(crate) fn unexpected(response: RingMessage) -> NetError {
    match response {
        RingMessage::Error(e) => NetError::Remote(e),
        other => NetError::UnexpectedResponse(other.kind().to_string()),
    }
}

#[async_trait::async_trait]
impl RingDistClient for TcpTransport {
    async fn store(&self, slave: &str, msg: RingMsg) -> Result<StoreResult, NetError> {
        match self.request(slave, &RingMessage::Store(msg)).await? {
            RingMessage::StoreResult(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    async fn revert(&self, slave: &str, version: RingVersion) -> Result<StoreResult, NetError> {
        let msg = RingMsg {
            version,
            ..Default::default()
        };
        match self.request(slave, &RingMessage::Revert(msg)).await? {
            RingMessage::StoreResult(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    async fn setup(&self, slave: &str, msg: RingMsg) -> Result<StoreResult, NetError> {
        match self.request(slave, &RingMessage::Setup(msg)).await? {
            RingMessage::StoreResult(result) => Ok(result),
            other => Err(unexpected(other)),
        }
    }

    async fn status(&self, slave: &str, req: StatusRequest) -> Result<StatusMsg, NetError> {
        match self.request(slave, &RingMessage::Status(req)).await? {
            RingMessage::StatusReport(status) => Ok(status),
            other => Err(unexpected(other)),
        }
    }
}
