//! Version-keyed send encodings.
//!
//! Every peer answers `mbus.getVersion`; the encoding used for the actual
//! send is then chosen per version. [`AdapterRegistry`] maps a negotiated
//! version to the newest [`SendAdapter`] whose floor it clears, so a node
//! that only speaks 1.x still gets the 1.x frame layout while 2.x peers get
//! the compressed one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mbus_common::protocol::error::Result;
use mbus_common::protocol::Version;

use crate::message::{Message, Protocol, Reply};
use crate::routing::RoutingNode;
use crate::send_v1::SendV1;
use crate::send_v2::SendV2;

/// Metadata and payload recovered from one inbound send frame.
#[derive(Debug)]
pub struct InboundEnvelope {
    pub version: Version,
    pub route: String,
    pub session: String,
    pub protocol: String,
    pub retry_enabled: bool,
    pub retry: u32,
    pub time_remaining: Duration,
    pub trace_level: u32,
    pub payload: Vec<u8>,
}

/// One wire encoding for the send operation.
pub trait SendAdapter: Send + Sync {
    /// Lowest peer version this encoding may be used with.
    fn min_version(&self) -> Version;

    /// RPC method name carrying this encoding.
    fn method(&self) -> &'static str;

    /// Builds the request params for one recipient.
    fn encode_request(
        &self,
        version: Version,
        message: &Message,
        session: &str,
        wire_payload: &[u8],
    ) -> Result<Vec<u8>>;

    /// Recovers a [`Reply`] from a successful response payload.
    fn decode_reply(&self, payload: &[u8], protocol: &dyn Protocol) -> Result<Reply>;

    /// Unpacks the params of an inbound send.
    fn decode_request(&self, params: &[u8]) -> Result<InboundEnvelope>;

    /// Builds the response payload for an inbound send.
    fn encode_reply(&self, version: Version, reply: &Reply, wire_payload: &[u8]) -> Result<Vec<u8>>;
}

/// All known send encodings, keyed by their version floor.
pub struct AdapterRegistry {
    by_version: BTreeMap<Version, Arc<dyn SendAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        let mut registry = AdapterRegistry {
            by_version: BTreeMap::new(),
        };
        registry.register(Arc::new(SendV1));
        registry.register(Arc::new(SendV2));
        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn SendAdapter>) {
        self.by_version.insert(adapter.min_version(), adapter);
    }

    /// Newest adapter whose floor is at or below `version`.
    pub fn lookup(&self, version: Version) -> Option<Arc<dyn SendAdapter>> {
        self.by_version
            .range(..=version)
            .next_back()
            .map(|(_, adapter)| Arc::clone(adapter))
    }

    /// Adapter serving the given RPC method, if any.
    pub fn by_method(&self, method: &str) -> Option<Arc<dyn SendAdapter>> {
        self.by_version
            .values()
            .find(|adapter| adapter.method() == method)
            .map(Arc::clone)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        AdapterRegistry::new()
    }
}

/// Shared state of one multi-recipient send while versions resolve.
///
/// Each recipient's target resolves its version independently; the last one
/// to report triggers transmission. The negotiated version is the minimum
/// across recipients, so one frame encoding serves the whole batch.
pub struct SendContext {
    message: Message,
    recipients: Mutex<Vec<RoutingNode>>,
    version: Mutex<Version>,
    pending: AtomicUsize,
    failed: AtomicBool,
    started: Instant,
}

impl SendContext {
    pub fn new(message: Message, recipients: Vec<RoutingNode>) -> Arc<Self> {
        let pending = recipients.len();
        Arc::new(SendContext {
            message,
            recipients: Mutex::new(recipients),
            version: Mutex::new(Version::CURRENT),
            pending: AtomicUsize::new(pending),
            failed: AtomicBool::new(false),
            started: Instant::now(),
        })
    }

    /// Records one recipient's version; returns true for the last one.
    pub fn version_resolved(&self, version: Option<Version>) -> bool {
        match version {
            Some(version) => {
                let mut negotiated = self.version.lock().unwrap();
                if version < *negotiated {
                    *negotiated = version;
                }
            }
            None => self.failed.store(true, Ordering::SeqCst),
        }
        self.pending.fetch_sub(1, Ordering::SeqCst) == 1
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> Version {
        *self.version.lock().unwrap()
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Time spent since the send was submitted.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn take_recipients(&self) -> Vec<RoutingNode> {
        std::mem::take(&mut *self.recipients.lock().unwrap())
    }
}
