use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::protocol::error::{NetError, Result};
use crate::protocol::{Request, Response};
use crate::transport::codec::BinCodec;
use crate::transport::FrameLimits;

/// Framed RPC server with a decoupled reply channel.
///
/// The server accepts connections in a loop and spawns two tasks per
/// connection: a reader loop that decodes `Request` frames and hands each to
/// the handler, and a writer task that drains a response channel onto the
/// wire. Because the handler answers through a [`ResponseSender`] instead of
/// a return value, a response may be produced long after the request arrived
/// and out of order with other responses on the same connection.
///
/// # Example
///
/// ```no_run
/// use mbus_common::transport::{FrameLimits, RpcServer};
/// use mbus_common::protocol::Response;
/// use std::sync::Arc;
///
/// # async fn example() -> mbus_common::Result<()> {
/// let server = Arc::new(RpcServer::bind("127.0.0.1:0", FrameLimits::default()).await?);
/// let addr = server.local_addr()?;
///
/// server
///     .run_with_handler(|request, sender| {
///         // Answer immediately; a handler may also stash the sender and
///         // answer from another task later.
///         sender.send(Response::success(request.id, Vec::new()));
///     })
///     .await
/// # }
/// ```
pub struct RpcServer {
    listener: TcpListener,
    limits: FrameLimits,
}

/// Handle for answering requests received on one connection.
///
/// Cloneable and cheap; a handler may keep it past its own return and answer
/// from any task. Sending after the connection died is a silent no-op (the
/// peer is gone, there is nobody left to tell).
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: mpsc::UnboundedSender<Response>,
    peer: SocketAddr,
}

impl ResponseSender {
    /// Queues a response for the connection's writer task.
    pub fn send(&self, response: Response) {
        if self.tx.send(response).is_err() {
            tracing::debug!("response dropped, connection to {} is gone", self.peer);
        }
    }

    /// The remote address of the connection this sender answers.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

impl RpcServer {
    /// Creates a server bound to the specified address.
    ///
    /// # Arguments
    ///
    /// * `bind_addr` - The address to bind to (e.g. "0.0.0.0:4080"; port 0
    ///   picks a free one)
    /// * `limits` - Frame size ceilings applied to every connection
    pub async fn bind(bind_addr: &str, limits: FrameLimits) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| NetError::Connection(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        Ok(Self { listener, limits })
    }

    /// Gets the actual bound address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| NetError::Connection(format!("Failed to get local addr: {}", e)))
    }

    /// Runs the accept loop with the given request handler.
    ///
    /// Each connection processes requests until the peer closes it. The
    /// handler runs on the connection's reader task and must not block; work
    /// that takes time belongs on a task of its own, answering through the
    /// cloned [`ResponseSender`].
    ///
    /// # Arguments
    ///
    /// * `handler` - Called once per decoded request
    pub async fn run_with_handler<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Request, ResponseSender) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);

        loop {
            let (stream, peer_addr) = self.listener.accept().await.map_err(|e| {
                NetError::Connection(format!("Failed to accept connection: {}", e))
            })?;

            tracing::debug!("connection established from {}", peer_addr);

            let handler = handler.clone();
            let limits = self.limits;
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, handler, limits).await {
                    tracing::debug!("connection from {} ended: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Serves a single connection until it closes.
///
/// The write half is owned by a spawned writer task fed through an unbounded
/// channel, so slow replies never stall the reader and replies need not come
/// back in request order.
async fn handle_connection<F>(
    stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<F>,
    limits: FrameLimits,
) -> Result<()>
where
    F: Fn(Request, ResponseSender) + Send + Sync + 'static,
{
    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::unbounded_channel();

    let writer_task = tokio::spawn(write_loop(writer, rx, limits));
    let sender = ResponseSender { tx, peer };

    let result = loop {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Connection closed by peer
                break Ok(());
            }
            Err(e) => {
                break Err(NetError::Connection(format!("Failed to read length: {}", e)));
            }
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > limits.max_input {
            break Err(NetError::InvalidRequest(format!(
                "Message too large: {} bytes (max {} bytes)",
                len, limits.max_input
            )));
        }

        let mut buf = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut buf).await {
            break Err(NetError::Connection(format!("Failed to read data: {}", e)));
        }

        match BinCodec::decode_request(&buf) {
            Ok(request) => handler(request, sender.clone()),
            Err(e) => {
                tracing::warn!("undecodable request from {}: {}", peer, e);
                sender.send(Response::error(0, e.to_string()));
            }
        }
    };

    // Closing the last sender lets the writer drain queued responses and exit.
    drop(sender);
    let _ = writer_task.await;
    result
}

/// Writes queued responses as framed postcard until all senders are gone.
async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Response>,
    limits: FrameLimits,
) {
    while let Some(response) = rx.recv().await {
        let encoded = match BinCodec::encode_response(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("failed to encode response {}: {}", response.id, e);
                continue;
            }
        };
        if encoded.len() > limits.max_output {
            tracing::warn!(
                "dropping response {}: {} bytes exceeds output limit",
                response.id,
                encoded.len()
            );
            continue;
        }

        let result = async {
            writer.write_all(&(encoded.len() as u32).to_be_bytes()).await?;
            writer.write_all(&encoded).await?;
            writer.flush().await
        }
        .await;

        if result.is_err() {
            // The read side will notice the dead connection on its own.
            break;
        }
    }
}
