//! mbus Transport Layer
//!
//! This module provides the framed TCP transport used by the mbus network
//! layer, plus the codec and compressor shared by the wire encodings.
//!
//! # Architecture
//!
//! The transport layer handles all network communication using:
//! - **Transport**: TCP with keep-alive connections
//! - **Codec**: postcard serialization for protocol messages
//! - **Wire Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//!
//! # Components
//!
//! - **[`BinCodec`]**: Encode/decode protocol messages to postcard bytes
//! - **[`RpcClient`]**: Async framed client with request/response correlation
//! - **[`RpcServer`]**: Async framed server with a decoupled reply channel
//! - **[`compress`]/[`decompress`]**: Opportunistic byte-array compression
//!
//! # Message Size Limits
//!
//! Both sides enforce configurable frame ceilings (see [`FrameLimits`],
//! 100 MB by default) to prevent memory exhaustion; oversized frames are
//! refused before any allocation.
//!
//! # Example
//!
//! ```no_run
//! use mbus_common::transport::{FrameLimits, RpcClient};
//! use mbus_common::protocol::Request;
//! use std::time::Duration;
//!
//! # async fn example() -> mbus_common::Result<()> {
//! // Connect to a peer and ask for its wire version
//! let client = RpcClient::connect("127.0.0.1:4080", FrameLimits::default()).await?;
//!
//! let request = Request::new("mbus.getVersion", Vec::new());
//! let response = client.invoke(request, Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod compress;
pub mod server;

pub use client::RpcClient;
pub use codec::BinCodec;
pub use compress::{compress, decompress, CompressionKind};
pub use server::{ResponseSender, RpcServer};


/// Default frame ceiling (100 MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Frame size ceilings for one connection.
///
/// `max_input` bounds frames read off the wire, `max_output` bounds frames
/// written to it. A frame whose length prefix exceeds the input ceiling
/// kills the connection; an oversized outbound frame fails the call before
/// any bytes are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
    /// Maximum size of a frame accepted from the peer, in bytes
    pub max_input: usize,
    /// Maximum size of a frame written to the peer, in bytes
    pub max_output: usize,
}

impl Default for FrameLimits {
    fn default() -> Self {
        Self {
            max_input: MAX_MESSAGE_SIZE,
            max_output: MAX_MESSAGE_SIZE,
        }
    }
}
