use std::collections::HashMap;
use std::net::ToSocketAddrs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::protocol::error::{NetError, Result};
use crate::protocol::{Request, RequestId, Response};
use crate::transport::codec::BinCodec;
use crate::transport::FrameLimits;

/// Framed RPC client with request/response correlation.
///
/// One client owns one TCP connection. A background reader task decodes
/// response frames and routes each to the caller waiting on its request id,
/// so any number of calls can be in flight concurrently and responses may
/// arrive in any order.
///
/// # Wire Protocol
///
/// Frames are `[4-byte length as u32 big-endian] + [postcard data]`; the
/// client writes `Request` frames and reads `Response` frames.
///
/// # Validity
///
/// The first transport failure (reset, EOF, oversized frame) permanently
/// invalidates the client: every pending call fails with a connection error
/// and later invokes are refused. Callers that pool clients use
/// [`RpcClient::is_valid`] to decide when to throw the pooled entry away.
pub struct RpcClient {
    addr: String,
    writer: Arc<tokio::sync::Mutex<OwnedWriteHalf>>,
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>>,
    valid: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    limits: FrameLimits,
}

impl RpcClient {
    /// Connects to a remote endpoint and starts the reader task.
    ///
    /// The address may resolve to multiple socket addresses; each is tried
    /// in order until one accepts the connection.
    ///
    /// # Arguments
    ///
    /// * `addr` - The address to connect to (e.g. "127.0.0.1:4080")
    /// * `limits` - Frame size ceilings for this connection
    ///
    /// # Errors
    ///
    /// Returns a connection error if the address cannot be resolved or no
    /// resolved address accepts the connection.
    pub async fn connect(addr: &str, limits: FrameLimits) -> Result<Self> {
        let socket_addrs = addr
            .to_socket_addrs()
            .map_err(|e| NetError::Connection(format!("Invalid address '{}': {}", addr, e)))?;

        let mut last_err = None;
        let mut stream = None;
        for socket_addr in socket_addrs {
            match TcpStream::connect(&socket_addr).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => last_err = Some(e),
            }
        }
        let stream = stream.ok_or_else(|| {
            NetError::Connection(format!(
                "Failed to connect to {}: {}",
                addr,
                last_err
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string())
            ))
        })?;

        let (read_half, write_half) = stream.into_split();
        let pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>> =
            Arc::new(Mutex::new(HashMap::new()));
        let valid = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            valid.clone(),
            limits,
        ));

        Ok(Self {
            addr: addr.to_string(),
            writer: Arc::new(tokio::sync::Mutex::new(write_half)),
            pending,
            valid,
            reader,
            limits,
        })
    }

    /// Whether the underlying connection is still usable.
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// The address this client connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Sends a request and waits for its response.
    ///
    /// Concurrent invokes interleave whole frames on the shared connection;
    /// the reader task matches responses back by request id.
    ///
    /// # Arguments
    ///
    /// * `request` - The request to send
    /// * `timeout` - How long to wait for the response
    ///
    /// # Errors
    ///
    /// - `Connection` if the client is invalid, the write fails, or the
    ///   connection drops while waiting
    /// - `Timeout` if no response arrives within `timeout`
    pub async fn invoke(&self, request: Request, timeout: Duration) -> Result<Response> {
        if !self.is_valid() {
            return Err(NetError::Connection(format!(
                "connection to {} is closed",
                self.addr
            )));
        }

        let id = request.id;
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().unwrap();
            pending.insert(id, tx);
        }

        if let Err(e) = self.write_request(&request).await {
            self.remove_pending(id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(NetError::Connection(format!(
                "connection to {} closed while waiting for response",
                self.addr
            ))),
            Err(_) => {
                self.remove_pending(id);
                Err(NetError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    /// Closes the connection and fails any calls still in flight.
    pub fn close(&self) {
        self.valid.store(false, Ordering::Release);
        self.reader.abort();
        let mut pending = self.pending.lock().unwrap();
        pending.clear();
    }

    async fn write_request(&self, request: &Request) -> Result<()> {
        let encoded = BinCodec::encode_request(request)?;
        if encoded.len() > self.limits.max_output {
            return Err(NetError::InvalidRequest(format!(
                "Message too large: {} bytes (max {} bytes)",
                encoded.len(),
                self.limits.max_output
            )));
        }

        let mut writer = self.writer.lock().await;
        let result = async {
            writer.write_all(&(encoded.len() as u32).to_be_bytes()).await?;
            writer.write_all(&encoded).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            self.valid.store(false, Ordering::Release);
            return Err(map_io_error(e, "writing request"));
        }
        Ok(())
    }

    fn remove_pending(&self, id: RequestId) {
        let mut pending = self.pending.lock().unwrap();
        pending.remove(&id);
    }
}

impl Drop for RpcClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Reads response frames until the connection dies, routing each to the
/// caller registered under its request id.
async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: Arc<Mutex<HashMap<RequestId, oneshot::Sender<Response>>>>,
    valid: Arc<AtomicBool>,
    limits: FrameLimits,
) {
    loop {
        let mut len_buf = [0u8; 4];
        if reader.read_exact(&mut len_buf).await.is_err() {
            break;
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        if len > limits.max_input {
            tracing::warn!("dropping connection: frame of {} bytes exceeds input limit", len);
            break;
        }

        let mut buf = vec![0u8; len];
        if reader.read_exact(&mut buf).await.is_err() {
            break;
        }

        let response = match BinCodec::decode_response(&buf) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!("dropping connection: undecodable response frame: {}", e);
                break;
            }
        };

        let waiter = {
            let mut pending = pending.lock().unwrap();
            pending.remove(&response.id)
        };
        match waiter {
            // The caller may have timed out and left; that is not an error.
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => tracing::debug!("response for unknown request id {}", response.id),
        }
    }

    // Fail everything still waiting; dropping the senders wakes the callers.
    valid.store(false, Ordering::Release);
    let mut pending = pending.lock().unwrap();
    pending.clear();
}

/// Map IO errors to appropriate NetError variants
///
/// Converts standard IO errors into domain-specific errors:
/// - Timeouts/would block -> `Timeout`
/// - Connection errors -> `Connection`
/// - Other IO errors -> `Io`
pub(crate) fn map_io_error(err: std::io::Error, context: &str) -> NetError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => NetError::Timeout(0),
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::ConnectionAborted
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected => {
            NetError::Connection(format!("{}: Connection lost", context))
        }
        _ => NetError::Io(err),
    }
}
