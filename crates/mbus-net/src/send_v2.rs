//! Enveloped send encoding, the 2.x wire format (`mbus.send2`).
//!
//! The envelope is a JSON document compressed into a small binary frame:
//! `{ compression, uncompressed_size, body }`. JSON keeps the envelope
//! extensible without version bumps, and compression pays for the verbosity
//! on anything beyond trivial payloads.

use serde::{Deserialize, Serialize};

use mbus_common::protocol::error::{NetError, Result};
use mbus_common::protocol::{BusError, Version};
use mbus_common::transport::{compress, decompress, BinCodec, CompressionKind};

use crate::adapter::{InboundEnvelope, SendAdapter};
use crate::message::{Message, Protocol, Reply};

pub const SEND_V2_METHOD: &str = "mbus.send2";

/// Outer binary frame around the compressed JSON document.
#[derive(Debug, Serialize, Deserialize)]
struct CompressedFrame {
    compression: u8,
    uncompressed_size: u32,
    body: Vec<u8>,
}

fn pack(doc: &[u8]) -> Result<Vec<u8>> {
    let (kind, body) = compress(doc);
    BinCodec::encode(&CompressedFrame {
        compression: kind.tag(),
        uncompressed_size: doc.len() as u32,
        body,
    })
}

fn unpack(bytes: &[u8]) -> Result<Vec<u8>> {
    let frame: CompressedFrame = BinCodec::decode(bytes)?;
    let kind = CompressionKind::from_tag(frame.compression)?;
    decompress(kind, &frame.body, frame.uncompressed_size as usize)
}

#[derive(Debug, Serialize, Deserialize)]
struct EnvelopeDoc {
    version: String,
    route: String,
    session: String,
    protocol: String,
    retry_enabled: bool,
    retry: u32,
    time_remaining_ms: u64,
    trace_level: u32,
    payload: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReplyDoc {
    version: String,
    errors: Vec<BusError>,
    trace: String,
    payload: Vec<u8>,
}

pub struct SendV2;

impl SendAdapter for SendV2 {
    fn min_version(&self) -> Version {
        Version::new(2, 0, 0)
    }

    fn method(&self) -> &'static str {
        SEND_V2_METHOD
    }

    fn encode_request(
        &self,
        version: Version,
        message: &Message,
        session: &str,
        wire_payload: &[u8],
    ) -> Result<Vec<u8>> {
        let doc = EnvelopeDoc {
            version: version.to_string(),
            route: message.route.clone(),
            session: session.to_string(),
            protocol: message.protocol.clone(),
            retry_enabled: message.retry_enabled,
            retry: message.retry,
            time_remaining_ms: message.time_remaining.as_millis() as u64,
            trace_level: message.trace.level,
            payload: wire_payload.to_vec(),
        };
        pack(&serde_json::to_vec(&doc)?)
    }

    fn decode_reply(&self, payload: &[u8], protocol: &dyn Protocol) -> Result<Reply> {
        let doc: ReplyDoc = serde_json::from_slice(&unpack(payload)?)?;
        let version: Version = doc.version.parse()?;

        let mut reply = if doc.payload.is_empty() {
            Reply::new()
        } else {
            protocol
                .decode(version, &doc.payload)?
                .into_reply()
                .ok_or_else(|| {
                    NetError::InvalidResponse("reply payload decoded to a message".to_string())
                })?
        };
        reply.errors.extend(doc.errors);
        reply.trace.append_remote(&doc.trace);
        Ok(reply)
    }

    fn decode_request(&self, params: &[u8]) -> Result<InboundEnvelope> {
        let doc: EnvelopeDoc = serde_json::from_slice(&unpack(params)?)?;
        Ok(InboundEnvelope {
            version: doc.version.parse()?,
            route: doc.route,
            session: doc.session,
            protocol: doc.protocol,
            retry_enabled: doc.retry_enabled,
            retry: doc.retry,
            time_remaining: std::time::Duration::from_millis(doc.time_remaining_ms),
            trace_level: doc.trace_level,
            payload: doc.payload,
        })
    }

    fn encode_reply(&self, version: Version, reply: &Reply, wire_payload: &[u8]) -> Result<Vec<u8>> {
        let doc = ReplyDoc {
            version: version.to_string(),
            errors: reply.errors.clone(),
            trace: reply.trace.render(),
            payload: wire_payload.to_vec(),
        };
        pack(&serde_json::to_vec(&doc)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simple::{SimpleProtocol, SIMPLE_PROTOCOL};
    use mbus_common::protocol::codes;
    use std::time::Duration;

    const V2: Version = Version::new(2, 0, 0);

    #[test]
    fn test_request_round_trip_preserves_every_field() {
        let mut message = Message::new(SIMPLE_PROTOCOL, "shard-7", b"query".to_vec());
        message.retry_enabled = true;
        message.retry = 2;
        message.time_remaining = Duration::from_millis(2500);
        message.trace.level = 1;

        let params = SendV2
            .encode_request(V2, &message, "search/main", b"wire-bytes")
            .unwrap();
        let envelope = SendV2.decode_request(&params).unwrap();
        assert_eq!(envelope.version, V2);
        assert_eq!(envelope.route, "shard-7");
        assert_eq!(envelope.session, "search/main");
        assert_eq!(envelope.protocol, SIMPLE_PROTOCOL);
        assert!(envelope.retry_enabled);
        assert_eq!(envelope.retry, 2);
        assert_eq!(envelope.time_remaining, Duration::from_millis(2500));
        assert_eq!(envelope.trace_level, 1);
        assert_eq!(envelope.payload, b"wire-bytes");
    }

    #[test]
    fn test_large_repetitive_payload_is_compressed() {
        let message = Message::new(SIMPLE_PROTOCOL, "", vec![b'a'; 64 * 1024]);
        let wire_payload = vec![b'a'; 64 * 1024];

        let params = SendV2
            .encode_request(V2, &message, "s", &wire_payload)
            .unwrap();
        assert!(params.len() < wire_payload.len() / 4);
        let envelope = SendV2.decode_request(&params).unwrap();
        assert_eq!(envelope.payload, wire_payload);
    }

    #[test]
    fn test_reply_errors_survive_the_wire() {
        let mut reply = Reply::with_error(codes::UNKNOWN_PROTOCOL, "no such protocol");
        reply.errors[0].service = "index/b".to_string();

        let bytes = SendV2.encode_reply(V2, &reply, &[]).unwrap();
        let decoded = SendV2.decode_reply(&bytes, &SimpleProtocol).unwrap();
        assert_eq!(decoded.errors.len(), 1);
        assert_eq!(decoded.errors[0].code, codes::UNKNOWN_PROTOCOL);
        assert_eq!(decoded.errors[0].service, "index/b");
        assert!(!decoded.is_ok());
    }

    #[test]
    fn test_reply_payload_decodes_through_protocol() {
        let protocol = SimpleProtocol;
        let mut reply = Reply::new();
        reply.payload = b"answer".to_vec();
        let wire_payload = protocol.encode_reply(V2, &reply).unwrap();

        let bytes = SendV2.encode_reply(V2, &reply, &wire_payload).unwrap();
        let decoded = SendV2.decode_reply(&bytes, &protocol).unwrap();
        assert_eq!(decoded.payload, b"answer");
        assert!(decoded.is_ok());
    }

    #[test]
    fn test_garbage_frame_rejected() {
        assert!(SendV2.decode_request(b"\xff\xff\xff").is_err());
    }
}
