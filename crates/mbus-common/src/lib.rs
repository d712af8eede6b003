//! mbus Common Types and Transport
//!
//! This crate provides the protocol definitions and framed TCP transport used
//! by the mbus network layer.
//!
//! # Overview
//!
//! mbus is a message bus whose network layer multiplexes asynchronous
//! request/reply traffic over pooled RPC connections. This crate contains the
//! pieces shared by every component that touches the wire:
//!
//! - **Protocol Layer**: Request/Response types, protocol versions, error
//!   handling, and the message-bus error code table
//! - **Transport Layer**: framed TCP client/server with request correlation,
//!   plus the byte-array compressor used by the enveloped wire encoding
//!
//! # Architecture
//!
//! The wire protocol is deliberately small:
//! - **Transport**: TCP with keep-alive connections
//! - **Serialization**: postcard (each RPC method defines its own parameter
//!   and return structs)
//! - **Message Format**: `[4-byte length prefix as u32 big-endian] + [payload]`
//! - **Max Message Size**: 100 MB by default (prevents memory exhaustion)
//!
//! # Components
//!
//! - [`protocol`] - Request, Response, Version, error types
//! - [`transport`] - RPC client/server, codec, and compression
//!
//! # Example
//!
//! ```no_run
//! use mbus_common::{Request, Response};
//! use mbus_common::transport::BinCodec;
//!
//! // Build a request whose params are a postcard-encoded struct
//! let params = BinCodec::encode(&("3.2.1".to_string())).unwrap();
//! let request = Request::new("mbus.getVersion", params);
//!
//! // Process and answer it
//! let response = Response::success(request.id, Vec::new());
//! ```

pub mod protocol;
pub mod transport;

pub use protocol::*;
