//! Typed send encoding, the 1.x wire format (`mbus.send1`).
//!
//! Every envelope field is a struct member of the params; errors come back
//! as three parallel arrays. Kept for peers that predate the enveloped
//! format in [`crate::send_v2`].

use serde::{Deserialize, Serialize};

use mbus_common::protocol::error::{NetError, Result};
use mbus_common::protocol::{BusError, Version};
use mbus_common::transport::BinCodec;

use crate::adapter::{InboundEnvelope, SendAdapter};
use crate::message::{Message, Protocol, Reply};

pub const SEND_V1_METHOD: &str = "mbus.send1";

#[derive(Debug, Serialize, Deserialize)]
struct SendV1Params {
    version: String,
    route: String,
    session: String,
    retry_enabled: bool,
    retry: u32,
    time_remaining_ms: u64,
    protocol: String,
    payload: Vec<u8>,
    trace_level: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SendV1Return {
    version: String,
    error_codes: Vec<u32>,
    error_messages: Vec<String>,
    error_services: Vec<String>,
    payload: Vec<u8>,
    trace: String,
}

pub struct SendV1;

impl SendAdapter for SendV1 {
    fn min_version(&self) -> Version {
        Version::new(1, 0, 0)
    }

    fn method(&self) -> &'static str {
        SEND_V1_METHOD
    }

    fn encode_request(
        &self,
        version: Version,
        message: &Message,
        session: &str,
        wire_payload: &[u8],
    ) -> Result<Vec<u8>> {
        let params = SendV1Params {
            version: version.to_string(),
            route: message.route.clone(),
            session: session.to_string(),
            retry_enabled: message.retry_enabled,
            retry: message.retry,
            time_remaining_ms: message.time_remaining.as_millis() as u64,
            protocol: message.protocol.clone(),
            payload: wire_payload.to_vec(),
            trace_level: message.trace.level,
        };
        BinCodec::encode(&params)
    }

    fn decode_reply(&self, payload: &[u8], protocol: &dyn Protocol) -> Result<Reply> {
        let ret: SendV1Return = BinCodec::decode(payload)?;
        if ret.error_messages.len() != ret.error_codes.len()
            || ret.error_services.len() != ret.error_codes.len()
        {
            return Err(NetError::InvalidResponse(
                "error arrays disagree in length".to_string(),
            ));
        }
        let version: Version = ret.version.parse()?;

        let mut reply = if ret.payload.is_empty() {
            Reply::new()
        } else {
            protocol
                .decode(version, &ret.payload)?
                .into_reply()
                .ok_or_else(|| {
                    NetError::InvalidResponse("reply payload decoded to a message".to_string())
                })?
        };
        for ((code, message), service) in ret
            .error_codes
            .into_iter()
            .zip(ret.error_messages)
            .zip(ret.error_services)
        {
            let mut error = BusError::new(code, message);
            error.service = service;
            reply.errors.push(error);
        }
        reply.trace.append_remote(&ret.trace);
        Ok(reply)
    }

    fn decode_request(&self, params: &[u8]) -> Result<InboundEnvelope> {
        let params: SendV1Params = BinCodec::decode(params)?;
        Ok(InboundEnvelope {
            version: params.version.parse()?,
            route: params.route,
            session: params.session,
            protocol: params.protocol,
            retry_enabled: params.retry_enabled,
            retry: params.retry,
            time_remaining: std::time::Duration::from_millis(params.time_remaining_ms),
            trace_level: params.trace_level,
            payload: params.payload,
        })
    }

    fn encode_reply(&self, version: Version, reply: &Reply, wire_payload: &[u8]) -> Result<Vec<u8>> {
        let mut ret = SendV1Return {
            version: version.to_string(),
            payload: wire_payload.to_vec(),
            trace: reply.trace.render(),
            ..SendV1Return::default()
        };
        for error in &reply.errors {
            ret.error_codes.push(error.code);
            ret.error_messages.push(error.message.clone());
            ret.error_services.push(error.service.clone());
        }
        BinCodec::encode(&ret)
    }
}
