//! Messages, replies, and the protocol plug-in seam.
//!
//! The network never looks inside a payload. Applications register
//! [`Protocol`] implementations with the owning layer; the network calls
//! them at the wire boundary and moves [`Message`]/[`Reply`] values around
//! by their metadata alone.

use std::time::Duration;

use mbus_common::protocol::error::Result;
use mbus_common::protocol::{BusError, RequestId, Version};
use mbus_common::transport::ResponseSender;

/// Time budget for a message whose sender did not set one.
pub const DEFAULT_TIME_REMAINING: Duration = Duration::from_secs(60);

/// Trace log carried along with a message.
///
/// Notes are only recorded when the level is above zero, so the hot path
/// pays nothing when tracing is off. The rendered text travels back with
/// the reply and remote text is appended to the sender's own trace.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    pub level: u32,
    entries: Vec<String>,
}

impl Trace {
    pub fn new(level: u32) -> Self {
        Trace {
            level,
            entries: Vec::new(),
        }
    }

    /// Records a line when tracing is enabled; no-op otherwise.
    pub fn note(&mut self, line: impl Into<String>) {
        if self.level > 0 {
            self.entries.push(line.into());
        }
    }

    /// Appends trace text produced by a remote peer, verbatim.
    pub fn append_remote(&mut self, text: &str) {
        if !text.is_empty() {
            self.entries.push(text.to_string());
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn render(&self) -> String {
        self.entries.join("\n")
    }
}

/// Captured state of one inbound request, consumed exactly once by the
/// reply path: the live reply channel, the version the request arrived at,
/// and the protocol it declared.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    pub sender: ResponseSender,
    pub request_id: RequestId,
    pub version: Version,
    pub protocol: String,
}

/// An application message in flight.
///
/// Outbound, the application builds one and hands it to the network with a
/// recipient list. Inbound, the network builds one from the wire, stashes
/// the reply context on it, and delivers it to the session it addresses.
#[derive(Debug)]
pub struct Message {
    /// Name of the protocol that encodes and decodes the payload.
    pub protocol: String,
    /// Pre-parsed route, passed through untouched.
    pub route: String,
    pub retry_enabled: bool,
    pub retry: u32,
    /// Remaining time budget; the network fails the send once it is gone.
    pub time_remaining: Duration,
    pub trace: Trace,
    pub payload: Vec<u8>,
    reply_ctx: Option<ReplyContext>,
}

impl Message {
    pub fn new(protocol: impl Into<String>, route: impl Into<String>, payload: Vec<u8>) -> Self {
        Message {
            protocol: protocol.into(),
            route: route.into(),
            retry_enabled: false,
            retry: 0,
            time_remaining: DEFAULT_TIME_REMAINING,
            trace: Trace::default(),
            payload,
            reply_ctx: None,
        }
    }

    pub fn has_reply_context(&self) -> bool {
        self.reply_ctx.is_some()
    }

    pub(crate) fn set_reply_context(&mut self, ctx: ReplyContext) {
        self.reply_ctx = Some(ctx);
    }

    /// Turns an inbound message into its reply.
    ///
    /// Moves the captured request context and the trace level over, so the
    /// reply finds its way back to the caller that sent the message.
    pub fn create_reply(mut self) -> Reply {
        let mut reply = Reply::new();
        reply.trace = Trace::new(self.trace.level);
        reply.ctx = self.reply_ctx.take();
        reply
    }
}

/// The answer to one message, for one recipient.
#[derive(Debug, Default)]
pub struct Reply {
    /// Structured errors; empty means success.
    pub errors: Vec<BusError>,
    pub payload: Vec<u8>,
    pub trace: Trace,
    ctx: Option<ReplyContext>,
}

impl Reply {
    pub fn new() -> Self {
        Reply::default()
    }

    /// A reply carrying a single error and nothing else.
    pub fn with_error(code: u32, message: impl Into<String>) -> Self {
        let mut reply = Reply::new();
        reply.errors.push(BusError::new(code, message));
        reply
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub(crate) fn set_context(&mut self, ctx: ReplyContext) {
        self.ctx = Some(ctx);
    }

    pub(crate) fn take_context(&mut self) -> Option<ReplyContext> {
        self.ctx.take()
    }
}

/// What a protocol decode can yield.
#[derive(Debug)]
pub enum Routable {
    Message(Message),
    Reply(Reply),
}

impl Routable {
    pub fn into_message(self) -> Option<Message> {
        match self {
            Routable::Message(message) => Some(message),
            Routable::Reply(_) => None,
        }
    }

    pub fn into_reply(self) -> Option<Reply> {
        match self {
            Routable::Reply(reply) => Some(reply),
            Routable::Message(_) => None,
        }
    }
}

/// A pluggable application protocol.
///
/// Looked up by name from the owning layer. Encode runs once per outbound
/// message at the negotiated version; decode runs on the receiving side and
/// may yield either a message or a reply, which the wire layer routes
/// accordingly.
pub trait Protocol: Send + Sync {
    fn name(&self) -> &str;

    /// Encodes an outbound message payload for a peer speaking `version`.
    fn encode_message(&self, version: Version, message: &Message) -> Result<Vec<u8>>;

    /// Encodes a reply payload for the peer that sent the original message.
    fn encode_reply(&self, version: Version, reply: &Reply) -> Result<Vec<u8>>;

    /// Decodes bytes a peer produced with one of the encode calls at
    /// `version`.
    fn decode(&self, version: Version, bytes: &[u8]) -> Result<Routable>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbus_common::protocol::codes;

    #[test]
    fn test_trace_notes_gated_by_level() {
        let mut trace = Trace::new(0);
        trace.note("dropped");
        assert!(trace.is_empty());

        let mut trace = Trace::new(1);
        trace.note("kept");
        trace.note("also kept");
        assert_eq!(trace.entries().len(), 2);
        assert_eq!(trace.render(), "kept\nalso kept");
    }

    #[test]
    fn test_trace_append_remote_ignores_empty() {
        let mut trace = Trace::new(0);
        trace.append_remote("");
        assert!(trace.is_empty());
        trace.append_remote("peer line");
        assert_eq!(trace.render(), "peer line");
    }

    #[test]
    fn test_message_defaults() {
        let message = Message::new("Simple", "a/b", vec![1, 2]);
        assert_eq!(message.protocol, "Simple");
        assert_eq!(message.route, "a/b");
        assert!(!message.retry_enabled);
        assert_eq!(message.time_remaining, DEFAULT_TIME_REMAINING);
        assert!(!message.has_reply_context());
    }

    #[test]
    fn test_create_reply_moves_trace_level() {
        let mut message = Message::new("Simple", "", Vec::new());
        message.trace = Trace::new(3);
        message.trace.note("on the message");

        let reply = message.create_reply();
        assert_eq!(reply.trace.level, 3);
        // Entries stay with the message; the reply starts a fresh log.
        assert!(reply.trace.is_empty());
        assert!(reply.ctx.is_none());
    }

    #[test]
    fn test_reply_with_error() {
        let reply = Reply::with_error(codes::TIMEOUT, "too slow");
        assert!(!reply.is_ok());
        assert_eq!(reply.errors[0].code, codes::TIMEOUT);
        assert_eq!(reply.errors[0].message, "too slow");
        assert!(reply.errors[0].service.is_empty());
    }

    #[test]
    fn test_routable_conversions() {
        let routable = Routable::Message(Message::new("p", "", Vec::new()));
        assert!(routable.into_reply().is_none());

        let routable = Routable::Reply(Reply::new());
        assert!(routable.into_reply().is_some());
    }
}
