//! A pooled live connection with asynchronous version negotiation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use mbus_common::protocol::error::Result;
use mbus_common::protocol::{Request, Response, Version};
use mbus_common::transport::{BinCodec, FrameLimits, RpcClient};

/// Wire method every node answers with its protocol version.
pub const GET_VERSION_METHOD: &str = "mbus.getVersion";

/// Budget for the version handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback fired once the peer's version is known, or known unknowable.
pub type VersionHandler = Box<dyn FnOnce(Option<Version>) + Send>;

enum VersionState {
    /// No handshake attempted yet, or the last one failed.
    Unknown,
    /// A handshake is in flight; callers queue here.
    Pending(Vec<VersionHandler>),
    Known(Version),
}

/// One live connection to a peer.
///
/// The pool entry holds the creation reference and every outstanding borrow
/// is an `Arc` clone, so `Arc::strong_count` is the reference count the
/// flush pass consults. The underlying connection closes when the last
/// reference drops.
pub struct Target {
    client: RpcClient,
    spec: String,
    state: Mutex<VersionState>,
}

impl Target {
    pub async fn connect(spec: &str, limits: FrameLimits) -> Result<Arc<Self>> {
        let client = RpcClient::connect(spec, limits).await?;
        Ok(Arc::new(Target {
            client,
            spec: spec.to_string(),
            state: Mutex::new(VersionState::Unknown),
        }))
    }

    pub fn spec(&self) -> &str {
        &self.spec
    }

    /// Whether the underlying connection is still usable.
    pub fn is_valid(&self) -> bool {
        self.client.is_valid()
    }

    /// The cached peer version, if the handshake has completed.
    pub fn version(&self) -> Option<Version> {
        match *self.state.lock().unwrap() {
            VersionState::Known(version) => Some(version),
            _ => None,
        }
    }

    /// Resolves the peer's protocol version, issuing at most one handshake.
    ///
    /// The handler fires exactly once: synchronously when the version is
    /// already cached, otherwise from the handshake task when the single
    /// in-flight query completes. A failed handshake fires every queued
    /// handler with `None` and resets the state so a later call retries.
    pub fn resolve_version(self: &Arc<Self>, handler: VersionHandler) {
        let mut start_handshake = false;
        let fire_now = {
            let mut state = self.state.lock().unwrap();
            match &mut *state {
                VersionState::Known(version) => Some((handler, *version)),
                VersionState::Pending(waiters) => {
                    waiters.push(handler);
                    None
                }
                VersionState::Unknown => {
                    *state = VersionState::Pending(vec![handler]);
                    start_handshake = true;
                    None
                }
            }
        };

        if let Some((handler, version)) = fire_now {
            handler(Some(version));
            return;
        }

        if start_handshake {
            let target = Arc::clone(self);
            tokio::spawn(async move {
                let version = target.fetch_version().await;
                target.finish_handshake(version);
            });
        }
    }

    /// Runs the wire handshake; any failure yields `None`.
    async fn fetch_version(&self) -> Option<Version> {
        let request = Request::new(GET_VERSION_METHOD, Vec::new());
        let response = match self.client.invoke(request, HANDSHAKE_TIMEOUT).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Version handshake with {} failed: {}", self.spec, e);
                return None;
            }
        };
        if !response.success {
            warn!(
                "Version handshake with {} rejected: {}",
                self.spec,
                response.error.as_deref().unwrap_or("unknown error")
            );
            return None;
        }
        let text: String = match BinCodec::decode(&response.payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("Version handshake with {} undecodable: {}", self.spec, e);
                return None;
            }
        };
        match text.parse::<Version>() {
            Ok(version) => {
                debug!("Peer {} speaks {}", self.spec, version);
                Some(version)
            }
            Err(e) => {
                warn!("Peer {} sent malformed version '{}': {}", self.spec, text, e);
                None
            }
        }
    }

    /// Publishes the handshake result and drains the waiter queue.
    ///
    /// Waiters fire outside the lock; one of them may immediately call
    /// `resolve_version` again.
    fn finish_handshake(&self, version: Option<Version>) {
        let waiters = {
            let mut state = self.state.lock().unwrap();
            let waiters = match std::mem::replace(&mut *state, VersionState::Unknown) {
                VersionState::Pending(waiters) => waiters,
                other => {
                    *state = other;
                    Vec::new()
                }
            };
            if let Some(version) = version {
                *state = VersionState::Known(version);
            }
            waiters
        };
        for handler in waiters {
            handler(version);
        }
    }

    /// Invokes a request on this connection.
    pub async fn invoke(&self, request: Request, timeout: Duration) -> Result<Response> {
        self.client.invoke(request, timeout).await
    }

    /// Closes the underlying connection, invalidating the target.
    pub fn close(&self) {
        self.client.close();
    }
}
