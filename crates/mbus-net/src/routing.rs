//! Per-recipient send state.

use tokio::sync::oneshot;
use tracing::warn;

use crate::address::ServiceAddress;
use crate::message::Reply;

/// Consumes the reply for one recipient of a send.
pub trait ReplyHandler: Send {
    fn handle_reply(self: Box<Self>, reply: Reply);
}

impl ReplyHandler for oneshot::Sender<Reply> {
    fn handle_reply(self: Box<Self>, reply: Reply) {
        // The caller may have stopped waiting.
        let _ = self.send(reply);
    }
}

/// One recipient of an outgoing message.
///
/// Carries the requested service name, the concrete address once allocated,
/// and the handler that receives the reply. The handler fires exactly once;
/// whichever of success, transport error, or shutdown happens first wins.
pub struct RoutingNode {
    service_name: String,
    address: Option<ServiceAddress>,
    handler: Option<Box<dyn ReplyHandler>>,
}

impl RoutingNode {
    pub fn new(service_name: impl Into<String>, handler: Box<dyn ReplyHandler>) -> Self {
        RoutingNode {
            service_name: service_name.into(),
            address: None,
            handler: Some(handler),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn address(&self) -> Option<&ServiceAddress> {
        self.address.as_ref()
    }

    pub(crate) fn set_address(&mut self, address: ServiceAddress) {
        self.address = Some(address);
    }

    pub(crate) fn take_address(&mut self) -> Option<ServiceAddress> {
        self.address.take()
    }

    /// Delivers `reply` to this node's handler.
    ///
    /// Errors without an origin are stamped with this node's service name so
    /// the caller can tell which recipient produced them.
    pub fn reply(&mut self, mut reply: Reply) {
        for error in &mut reply.errors {
            if error.service.is_empty() {
                error.service = self.service_name.clone();
            }
        }
        match self.handler.take() {
            Some(handler) => handler.handle_reply(reply),
            None => warn!(service = %self.service_name, "duplicate reply dropped"),
        }
    }
}

impl std::fmt::Debug for RoutingNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingNode")
            .field("service_name", &self.service_name)
            .field("address", &self.address)
            .field("pending", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mbus_common::protocol::codes;

    #[test]
    fn test_reply_reaches_handler() {
        let (tx, mut rx) = oneshot::channel();
        let mut node = RoutingNode::new("search/a", Box::new(tx));

        node.reply(Reply::new());
        let reply = rx.try_recv().unwrap();
        assert!(reply.is_ok());
    }

    #[test]
    fn test_errors_are_stamped_with_service_name() {
        let (tx, mut rx) = oneshot::channel();
        let mut node = RoutingNode::new("search/a", Box::new(tx));

        node.reply(Reply::with_error(codes::TIMEOUT, "call timed out"));
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.errors[0].service, "search/a");
    }

    #[test]
    fn test_existing_origin_is_preserved() {
        let (tx, mut rx) = oneshot::channel();
        let mut node = RoutingNode::new("search/a", Box::new(tx));

        let mut reply = Reply::new();
        let mut error = mbus_common::protocol::BusError::new(codes::TIMEOUT, "remote timeout");
        error.service = "index/b".to_string();
        reply.errors.push(error);
        node.reply(reply);
        assert_eq!(rx.try_recv().unwrap().errors[0].service, "index/b");
    }

    #[test]
    fn test_second_reply_is_dropped() {
        let (tx, mut rx) = oneshot::channel();
        let mut node = RoutingNode::new("search/a", Box::new(tx));

        node.reply(Reply::new());
        node.reply(Reply::with_error(codes::TIMEOUT, "late"));
        let reply = rx.try_recv().unwrap();
        assert!(reply.is_ok());
        assert!(rx.try_recv().is_err());
    }
}
