//! mbus Response Types
//!
//! This module defines the framed RPC response structure.

use serde::{Deserialize, Serialize};
use super::RequestId;

/// A framed RPC response, correlated to its request by id.
///
/// # Response Flow
///
/// 1. A peer receives and dispatches a `Request`
/// 2. The handler produces a `Response` (success or error), possibly long
///    after the request arrived and out of order with other responses on the
///    same connection
/// 3. The response is postcard-encoded and framed onto the wire
/// 4. The client's reader task matches it to the waiting caller by `id`
///
/// # Fields
///
/// - `id`: the request id this response answers
/// - `payload`: postcard encoding of the method's return struct (success only)
/// - `error`: RPC-level failure text (present on failure)
/// - `success`: whether the call succeeded at the RPC layer
///
/// Message-bus level errors are not RPC failures: they ride inside a
/// successful response's payload as part of the reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    /// Request identifier this response corresponds to
    pub id: RequestId,
    /// Return payload (present on success)
    pub payload: Vec<u8>,
    /// Error message (present on failure)
    pub error: Option<String>,
    /// Whether the request succeeded
    pub success: bool,
}

impl Response {
    /// Creates a successful response carrying the method's return payload.
    pub fn success(id: RequestId, payload: Vec<u8>) -> Self {
        Response {
            id,
            payload,
            error: None,
            success: true,
        }
    }

    /// Creates an RPC-level error response.
    pub fn error(id: RequestId, error: impl Into<String>) -> Self {
        Response {
            id,
            payload: Vec::new(),
            error: Some(error.into()),
            success: false,
        }
    }
}
