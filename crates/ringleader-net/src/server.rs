//! Accept loop for inbound connections.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use ringleader_types::{ErrorKind, RpcError};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::error::NetError;
use crate::message::RingMessage;
use crate::transport::TcpTransport;

/// Maps one request to one response.
///
/// Implementations report failures as [`RingMessage::Error`] instead of
/// returning `Err`, so every well-formed request gets an answer.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, peer: SocketAddr, request: RingMessage) -> RingMessage;
}

/// Serve connections from `listener` until the task is dropped.
///
/// Each connection is handled on its own task, so a slow peer never blocks
/// the others.
pub async fn serve(listener: TcpListener, handler: Arc<dyn MessageHandler>) -> Result<(), NetError> {
    info!(addr = %listener.local_addr()?, "listening");
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("failed to accept connection: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        let handler = handler.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, peer, handler.as_ref()).await {
                debug!(%peer, "connection ended with error: {e}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: &dyn MessageHandler,
) -> Result<(), NetError> {
    stream.set_nodelay(true)?;
    let response = match TcpTransport::recv_message(&mut stream).await {
        Ok(request) => {
            debug!(%peer, kind = request.kind(), "request received");
            handler.handle(peer, request).await
        }
        Err(NetError::Serialization(e)) => {
            warn!(%peer, "malformed request: {e}");
            RingMessage::Error(RpcError::new(
                ErrorKind::Internal,
                format!("malformed request: {e}"),
            ))
        }
        Err(e) => return Err(e),
    };
    TcpTransport::send_message(&mut stream, &response).await?;
    stream.shutdown().await?;
    Ok(())
}
