//! Minimal tagged-byte protocol.
//!
//! One tag byte in front of the raw payload, nothing else. Useful for tools
//! and tests that move opaque bytes without a schema.

use mbus_common::protocol::error::{NetError, Result};
use mbus_common::protocol::Version;

use crate::message::{Message, Protocol, Reply, Routable};

pub const SIMPLE_PROTOCOL: &str = "Simple";

const TAG_MESSAGE: u8 = 1;
const TAG_REPLY: u8 = 2;

pub struct SimpleProtocol;

impl Protocol for SimpleProtocol {
    fn name(&self) -> &str {
        SIMPLE_PROTOCOL
    }

    fn encode_message(&self, _version: Version, message: &Message) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(message.payload.len() + 1);
        bytes.push(TAG_MESSAGE);
        bytes.extend_from_slice(&message.payload);
        Ok(bytes)
    }

    fn encode_reply(&self, _version: Version, reply: &Reply) -> Result<Vec<u8>> {
        let mut bytes = Vec::with_capacity(reply.payload.len() + 1);
        bytes.push(TAG_REPLY);
        bytes.extend_from_slice(&reply.payload);
        Ok(bytes)
    }

    fn decode(&self, _version: Version, bytes: &[u8]) -> Result<Routable> {
        match bytes.first() {
            Some(&TAG_MESSAGE) => Ok(Routable::Message(Message::new(
                SIMPLE_PROTOCOL,
                "",
                bytes[1..].to_vec(),
            ))),
            Some(&TAG_REPLY) => {
                let mut reply = Reply::new();
                reply.payload = bytes[1..].to_vec();
                Ok(Routable::Reply(reply))
            }
            Some(&tag) => Err(NetError::InvalidResponse(format!(
                "unknown frame tag {}",
                tag
            ))),
            None => Err(NetError::InvalidResponse("empty frame".to_string())),
        }
    }
}
