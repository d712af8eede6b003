use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

pub type RequestId = u64;
pub type MethodName = String;

static REQUEST_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A framed RPC request.
///
/// `params` holds the postcard encoding of the method's parameter struct;
/// every wire method defines its own. An empty `params` means the method
/// takes no arguments (e.g. `mbus.getVersion`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub id: RequestId,
    pub method: MethodName,
    pub params: Vec<u8>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Vec<u8>) -> Self {
        Request {
            id: generate_request_id(),
            method: method.into(),
            params,
        }
    }
}

fn generate_request_id() -> RequestId {
    // Try to use system time as the base
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0);

    // Always increment the counter to ensure uniqueness
    let counter = REQUEST_ID_COUNTER.fetch_add(1, Ordering::SeqCst);

    // Combine timestamp and counter: upper 32 bits of time, lower 32 of counter
    (timestamp & 0xFFFFFFFF00000000) | (counter & 0xFFFFFFFF)
}
