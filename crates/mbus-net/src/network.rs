//! Network orchestrator.
//!
//! One [`Network`] per process side: it owns the listener, the connection
//! and resolver pools, version negotiation, and out-of-service tracking.
//! The layer above implements [`NetworkOwner`] to supply protocols and
//! receive inbound messages; everything else flows through [`send`] and
//! [`reply`].
//!
//! [`send`]: Network::send
//! [`reply`]: Network::reply

use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mbus_common::protocol::error::Result;
use mbus_common::protocol::{codes, BusError, NetError, Request, Response, Version};
use mbus_common::transport::{BinCodec, FrameLimits, ResponseSender, RpcServer};

use crate::adapter::{AdapterRegistry, SendAdapter, SendContext};
use crate::identity::Identity;
use crate::message::{Message, Protocol, Reply, ReplyContext, Trace};
use crate::mirror::{NameServiceMirror, NameServiceRegister};
use crate::oos::{OosConfig, OosTracker};
use crate::routing::RoutingNode;
use crate::service_pool::{ServicePool, DEFAULT_CAPACITY};
use crate::target::GET_VERSION_METHOD;
use crate::target_pool::{TargetPool, TargetPoolConfig};

/// The layer above the network.
///
/// Attached weakly; once the owner drops, inbound traffic is answered with
/// a shutdown error instead of being delivered.
pub trait NetworkOwner: Send + Sync {
    /// Looks up an application protocol by its wire name.
    fn protocol(&self, name: &str) -> Option<Arc<dyn Protocol>>;

    /// Hands an inbound message to the session it addresses.
    fn deliver_message(&self, session: &str, message: Message);
}

/// Bounds the number of concurrently running handler futures.
struct Dispatcher {
    semaphore: Arc<Semaphore>,
}

impl Dispatcher {
    fn new(workers: usize) -> Self {
        let workers = if workers > 0 {
            workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
                / 2
        };
        Dispatcher {
            semaphore: Arc::new(Semaphore::new(workers.max(2))),
        }
    }

    /// Runs `fut` once a worker slot frees up; dropped silently after close.
    fn execute<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            if let Ok(_permit) = semaphore.acquire_owned().await {
                fut.await;
            }
        });
    }

    fn close(&self) {
        self.semaphore.close();
    }
}

/// Construction parameters for [`Network`].
#[derive(Debug, Clone)]
pub struct NetworkParams {
    pub identity: Identity,
    /// TCP port to listen on; 0 picks a free port.
    pub listen_port: u16,
    pub limits: FrameLimits,
    /// Idle time before pooled outbound connections expire.
    pub connection_expire: Duration,
    /// Parallel connections opened per peer.
    pub targets_per_spec: usize,
    /// Concurrent dispatch workers; 0 sizes from the host parallelism.
    pub dispatch_workers: usize,
    /// Per-thread resolver cache size.
    pub service_pool_capacity: usize,
    /// OOS provider pattern; empty disables tracking.
    pub oos_pattern: String,
}

impl NetworkParams {
    pub fn new(identity: Identity) -> Self {
        NetworkParams {
            identity,
            listen_port: 0,
            limits: FrameLimits::default(),
            connection_expire: Duration::from_secs(60),
            targets_per_spec: 2,
            dispatch_workers: 0,
            service_pool_capacity: DEFAULT_CAPACITY,
            oos_pattern: String::new(),
        }
    }
}

/// The message-bus network layer of one node.
pub struct Network {
    identity: Identity,
    params: NetworkParams,
    mirror: Arc<dyn NameServiceMirror>,
    register: Arc<dyn NameServiceRegister>,
    service_pool: ServicePool,
    target_pool: Arc<TargetPool>,
    adapters: AdapterRegistry,
    oos: Arc<OosTracker>,
    dispatch: Dispatcher,
    owner: OnceLock<Weak<dyn NetworkOwner>>,
    listen_spec: OnceLock<String>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    sessions: Mutex<HashSet<String>>,
    destroyed: AtomicBool,
}

impl Network {
    pub fn new(
        params: NetworkParams,
        mirror: Arc<dyn NameServiceMirror>,
        register: Arc<dyn NameServiceRegister>,
    ) -> Arc<Self> {
        let identity = params.identity.clone();
        let service_pool = ServicePool::new(params.service_pool_capacity, Arc::clone(&mirror));
        let target_pool = Arc::new(TargetPool::new(TargetPoolConfig {
            targets_per_spec: params.targets_per_spec,
            expire_after: params.connection_expire,
            limits: params.limits,
            ..TargetPoolConfig::default()
        }));
        let oos = OosTracker::new(
            OosConfig {
                pattern: params.oos_pattern.clone(),
                limits: params.limits,
                ..OosConfig::default()
            },
            Arc::clone(&mirror),
        );
        let dispatch = Dispatcher::new(params.dispatch_workers);
        Arc::new(Network {
            identity,
            params,
            mirror,
            register,
            service_pool,
            target_pool,
            adapters: AdapterRegistry::new(),
            oos,
            dispatch,
            owner: OnceLock::new(),
            listen_spec: OnceLock::new(),
            tasks: Mutex::new(Vec::new()),
            sessions: Mutex::new(HashSet::new()),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Attaches the owning layer. Call once, before [`start`](Self::start).
    pub fn attach(&self, owner: &Arc<dyn NetworkOwner>) {
        if self.owner.set(Arc::downgrade(owner)).is_err() {
            warn!("network owner already attached");
        }
    }

    fn owner(&self) -> Option<Arc<dyn NetworkOwner>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    /// Binds the listener, starts background upkeep, and begins serving.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        let bind_addr = format!("0.0.0.0:{}", self.params.listen_port);
        let server = Arc::new(RpcServer::bind(&bind_addr, self.params.limits).await?);
        let port = server.local_addr()?.port();
        let spec = format!("{}:{}", self.identity.hostname(), port);
        if self.listen_spec.set(spec.clone()).is_err() {
            return Err(NetError::InvalidRequest(
                "network already started".to_string(),
            ));
        }
        info!(node = %self.identity, %spec, "network listening");

        // The handler holds the network weakly so an abandoned network can
        // drop; its serve task is aborted in shutdown.
        let weak = Arc::downgrade(self);
        let serve_task = tokio::spawn(async move {
            let outcome = server
                .run_with_handler(move |request, sender| match weak.upgrade() {
                    Some(net) => net.handle_request(request, sender),
                    None => sender.send(Response::error(request.id, "network is shut down")),
                })
                .await;
            if let Err(error) = outcome {
                warn!(%error, "rpc server stopped");
            }
        });
        let flush_task = self.target_pool.spawn_flush();
        self.oos.start();

        let mut tasks = self.tasks.lock().unwrap();
        tasks.push(serve_task);
        tasks.push(flush_task);
        Ok(())
    }

    fn handle_request(self: Arc<Self>, request: Request, sender: ResponseSender) {
        if self.destroyed.load(Ordering::SeqCst) {
            sender.send(Response::error(request.id, "network is shut down"));
            return;
        }
        if request.method == GET_VERSION_METHOD {
            match BinCodec::encode(&Version::CURRENT.to_string()) {
                Ok(payload) => sender.send(Response::success(request.id, payload)),
                Err(error) => sender.send(Response::error(request.id, error.to_string())),
            }
            return;
        }
        match self.adapters.by_method(&request.method) {
            Some(adapter) => {
                let net = Arc::clone(&self);
                self.dispatch.execute(async move {
                    net.handle_inbound(adapter, request, sender);
                });
            }
            None => {
                debug!(method = %request.method, peer = %sender.peer(), "unknown method");
                sender.send(Response::error(
                    request.id,
                    format!("unknown method '{}'", request.method),
                ));
            }
        }
    }

    /// Decodes one inbound send and delivers it to the owner.
    fn handle_inbound(
        self: Arc<Self>,
        adapter: Arc<dyn SendAdapter>,
        request: Request,
        sender: ResponseSender,
    ) {
        let envelope = match adapter.decode_request(&request.params) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, peer = %sender.peer(), "inbound decode failed");
                sender.send(Response::error(request.id, error.to_string()));
                return;
            }
        };
        let ctx = ReplyContext {
            sender,
            request_id: request.id,
            version: envelope.version,
            protocol: envelope.protocol.clone(),
        };
        let Some(owner) = self.owner() else {
            self.reply_inbound_error(ctx, codes::NETWORK_SHUTDOWN, "no owner attached");
            return;
        };
        let Some(protocol) = owner.protocol(&envelope.protocol) else {
            self.reply_inbound_error(
                ctx,
                codes::UNKNOWN_PROTOCOL,
                format!("unknown protocol '{}'", envelope.protocol),
            );
            return;
        };
        let routable = match protocol.decode(envelope.version, &envelope.payload) {
            Ok(routable) => routable,
            Err(error) => {
                self.reply_inbound_error(
                    ctx,
                    codes::DECODE_ERROR,
                    format!("payload decode failed: {}", error),
                );
                return;
            }
        };
        let Some(mut message) = routable.into_message() else {
            self.reply_inbound_error(
                ctx,
                codes::DECODE_ERROR,
                "decoded a reply where a message was expected",
            );
            return;
        };
        message.protocol = envelope.protocol;
        message.route = envelope.route;
        message.retry_enabled = envelope.retry_enabled;
        message.retry = envelope.retry;
        message.time_remaining = envelope.time_remaining;
        message.trace = Trace::new(envelope.trace_level);
        message.set_reply_context(ctx);
        debug!(session = %envelope.session, "inbound message");
        owner.deliver_message(&envelope.session, message);
    }

    fn reply_inbound_error(&self, ctx: ReplyContext, code: u32, text: impl Into<String>) {
        let mut reply = Reply::with_error(code, text);
        reply.set_context(ctx);
        self.reply(reply);
    }

    /// Sends `reply` back to the peer whose message created it.
    ///
    /// Consumes the reply's captured request context; a reply without one
    /// is dropped with a warning. Payload encode failures degrade to an
    /// error entry on an otherwise empty reply, so the peer always hears
    /// back.
    pub fn reply(&self, mut reply: Reply) {
        let Some(ctx) = reply.take_context() else {
            warn!("reply without request context dropped");
            return;
        };
        let Some(adapter) = self.adapters.lookup(ctx.version) else {
            ctx.sender.send(Response::error(
                ctx.request_id,
                format!("no send encoding for version {}", ctx.version),
            ));
            return;
        };
        let wire_payload = if reply.payload.is_empty() {
            Vec::new()
        } else {
            match self.owner().and_then(|owner| owner.protocol(&ctx.protocol)) {
                Some(protocol) => match protocol.encode_reply(ctx.version, &reply) {
                    Ok(bytes) => bytes,
                    Err(error) => {
                        reply.errors.push(BusError::new(
                            codes::ENCODE_ERROR,
                            format!("reply encode failed: {}", error),
                        ));
                        Vec::new()
                    }
                },
                None => {
                    reply.errors.push(BusError::new(
                        codes::UNKNOWN_PROTOCOL,
                        format!("unknown protocol '{}'", ctx.protocol),
                    ));
                    Vec::new()
                }
            }
        };
        match adapter.encode_reply(ctx.version, &reply, &wire_payload) {
            Ok(payload) => ctx.sender.send(Response::success(ctx.request_id, payload)),
            Err(error) => {
                warn!(%error, "reply frame encode failed");
                ctx.sender
                    .send(Response::error(ctx.request_id, error.to_string()));
            }
        }
    }

    /// Sends `message` to every recipient in `recipients`.
    ///
    /// Each recipient needs an address from
    /// [`alloc_service_address`](Self::alloc_service_address) first. The send
    /// waits for every target's version handshake, then transmits one frame
    /// per recipient at the minimum negotiated version. Every node's handler
    /// fires exactly once, with the reply or with the error that stopped it.
    pub fn send(self: &Arc<Self>, message: Message, recipients: Vec<RoutingNode>) {
        if self.destroyed.load(Ordering::SeqCst) {
            fail_nodes(recipients, codes::NETWORK_SHUTDOWN, "network is shut down");
            return;
        }
        if message.time_remaining.is_zero() {
            fail_nodes(
                recipients,
                codes::TIMEOUT,
                "time budget exhausted before send",
            );
            return;
        }
        let mut bound = Vec::with_capacity(recipients.len());
        let mut targets = Vec::with_capacity(recipients.len());
        for mut node in recipients {
            match node.address().and_then(|address| address.target()).cloned() {
                Some(target) => {
                    targets.push(target);
                    bound.push(node);
                }
                None => node.reply(Reply::with_error(
                    codes::NETWORK_ERROR,
                    "recipient has no allocated service address",
                )),
            }
        }
        if bound.is_empty() {
            return;
        }

        let ctx = SendContext::new(message, bound);
        for target in targets {
            let net = Arc::clone(self);
            let ctx = Arc::clone(&ctx);
            target.resolve_version(Box::new(move |version| {
                if ctx.version_resolved(version) {
                    net.finish_send(ctx);
                }
            }));
        }
    }

    fn finish_send(self: &Arc<Self>, ctx: Arc<SendContext>) {
        if ctx.has_failed() {
            fail_nodes(
                ctx.take_recipients(),
                codes::HANDSHAKE_FAILED,
                "version handshake failed",
            );
            return;
        }
        let net = Arc::clone(self);
        self.dispatch.execute(async move {
            net.transmit(ctx);
        });
    }

    /// Encodes the message once and fires one RPC per recipient.
    fn transmit(self: &Arc<Self>, ctx: Arc<SendContext>) {
        if self.destroyed.load(Ordering::SeqCst) {
            fail_nodes(
                ctx.take_recipients(),
                codes::NETWORK_SHUTDOWN,
                "network is shut down",
            );
            return;
        }
        let version = ctx.version();
        let Some(adapter) = self.adapters.lookup(version) else {
            fail_nodes(
                ctx.take_recipients(),
                codes::HANDSHAKE_FAILED,
                &format!("no send encoding for version {}", version),
            );
            return;
        };
        let message = ctx.message();
        let Some(protocol) = self.owner().and_then(|owner| owner.protocol(&message.protocol))
        else {
            fail_nodes(
                ctx.take_recipients(),
                codes::UNKNOWN_PROTOCOL,
                &format!("unknown protocol '{}'", message.protocol),
            );
            return;
        };
        let wire_payload = match protocol.encode_message(version, message) {
            Ok(bytes) => bytes,
            Err(error) => {
                fail_nodes(
                    ctx.take_recipients(),
                    codes::ENCODE_ERROR,
                    &format!("message encode failed: {}", error),
                );
                return;
            }
        };

        let trace_level = message.trace.level;
        let remaining = message.time_remaining.saturating_sub(ctx.elapsed());
        for mut node in ctx.take_recipients() {
            let Some((target, session)) = node.take_address().and_then(|address| {
                address
                    .target()
                    .cloned()
                    .map(|target| (target, address.session_name().to_string()))
            }) else {
                node.reply(Reply::with_error(
                    codes::NETWORK_ERROR,
                    "recipient lost its service address",
                ));
                continue;
            };
            if remaining.is_zero() {
                node.reply(Reply::with_error(
                    codes::TIMEOUT,
                    "time budget exhausted during version negotiation",
                ));
                continue;
            }
            let params = match adapter.encode_request(version, message, &session, &wire_payload) {
                Ok(params) => params,
                Err(error) => {
                    node.reply(Reply::with_error(
                        codes::ENCODE_ERROR,
                        format!("request encode failed: {}", error),
                    ));
                    continue;
                }
            };
            let request = Request::new(adapter.method(), params);
            let net = Arc::clone(self);
            let adapter = Arc::clone(&adapter);
            let protocol = Arc::clone(&protocol);
            tokio::spawn(async move {
                let result = target.invoke(request, remaining).await;
                net.dispatch.execute(async move {
                    complete_call(node, result, adapter.as_ref(), protocol.as_ref(), trace_level);
                });
            });
        }
    }

    /// Resolves the node's service name and binds a pooled connection to it.
    ///
    /// On failure the node's handler receives the error reply and `false`
    /// comes back; such a node must not be passed to [`send`](Self::send).
    pub async fn alloc_service_address(&self, node: &mut RoutingNode) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            node.reply(Reply::with_error(
                codes::NETWORK_SHUTDOWN,
                "network is shut down",
            ));
            return false;
        }
        let Some(mut address) = self.service_pool.resolve(node.service_name()) else {
            node.reply(Reply::with_error(
                codes::NO_ADDRESS_FOR_SERVICE,
                format!("no address for '{}'", node.service_name()),
            ));
            return false;
        };
        match self.target_pool.get_target(address.conn_spec()).await {
            Ok(target) => {
                address.bind_target(target);
                node.set_address(address);
                true
            }
            Err(error) => {
                node.reply(Reply::with_error(
                    codes::CONNECTION_ERROR,
                    format!("connect to {} failed: {}", address.conn_spec(), error),
                ));
                false
            }
        }
    }

    /// Releases an allocated address that will not be sent to.
    ///
    /// Sends release their recipients themselves; this is for nodes that
    /// were allocated and then abandoned. The pooled connection stays open
    /// for other users and expires on idle.
    pub fn free_service_address(&self, node: &mut RoutingNode) {
        node.take_address();
    }

    /// Publishes `session` in the name service under this node's prefix.
    pub fn register_session(&self, session: &str) {
        let name = self.identity.service_name(session);
        let Some(spec) = self.listen_spec.get() else {
            warn!(%name, "cannot register a session before the network starts");
            return;
        };
        info!(%name, %spec, "registering session");
        self.register.register(&name, spec);
        self.sessions.lock().unwrap().insert(name);
    }

    pub fn unregister_session(&self, session: &str) {
        let name = self.identity.service_name(session);
        if self.sessions.lock().unwrap().remove(&name) {
            info!(%name, "unregistering session");
            self.register.unregister(&name);
        }
    }

    /// Waits until the name service mirror and OOS tracking have answers.
    pub async fn wait_until_ready(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.mirror.ready() && self.oos.ready() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Whether `service` is currently marked out of service.
    pub fn is_oos(&self, service: &str) -> bool {
        self.oos.is_oos(service)
    }

    /// `hostname:port` peers dial to reach this node; set by
    /// [`start`](Self::start).
    pub fn listen_spec(&self) -> Option<&str> {
        self.listen_spec.get().map(String::as_str)
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Stops serving, withdraws sessions, and drops pooled connections.
    ///
    /// Idempotent. In-flight and later sends fail fast with a shutdown
    /// error.
    pub async fn shutdown(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(node = %self.identity, "network shutting down");
        let names: Vec<String> = self.sessions.lock().unwrap().drain().collect();
        for name in names {
            self.register.unregister(&name);
        }
        self.oos.stop();
        self.target_pool.flush(true).await;
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.tasks.lock().unwrap());
        for task in tasks {
            task.abort();
        }
        self.dispatch.close();
    }
}

fn fail_nodes(nodes: Vec<RoutingNode>, code: u32, text: &str) {
    for mut node in nodes {
        node.reply(Reply::with_error(code, text));
    }
}

fn complete_call(
    mut node: RoutingNode,
    result: Result<Response>,
    adapter: &dyn SendAdapter,
    protocol: &dyn Protocol,
    trace_level: u32,
) {
    let reply = match result {
        Ok(response) if response.success => {
            match adapter.decode_reply(&response.payload, protocol) {
                Ok(mut reply) => {
                    reply.trace.level = trace_level;
                    reply
                }
                Err(error) => Reply::with_error(
                    codes::DECODE_ERROR,
                    format!("reply decode failed: {}", error),
                ),
            }
        }
        Ok(response) => Reply::with_error(
            codes::NETWORK_ERROR,
            response.error.unwrap_or_else(|| "call failed".to_string()),
        ),
        Err(NetError::Timeout(ms)) => {
            Reply::with_error(codes::TIMEOUT, format!("call timed out after {}ms", ms))
        }
        Err(NetError::Connection(detail)) => Reply::with_error(codes::CONNECTION_ERROR, detail),
        Err(error) => Reply::with_error(codes::NETWORK_ERROR, error.to_string()),
    };
    node.reply(reply);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::LocalMirror;
    use tokio::sync::oneshot;

    fn test_network(mirror: &Arc<LocalMirror>) -> Arc<Network> {
        let params = NetworkParams::new(Identity::new("127.0.0.1", "test"));
        Network::new(params, mirror.clone(), mirror.clone())
    }

    fn node(name: &str) -> (RoutingNode, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (RoutingNode::new(name, Box::new(tx)), rx)
    }

    #[test]
    fn test_params_defaults() {
        let params = NetworkParams::new(Identity::new("host", "svc"));
        assert_eq!(params.listen_port, 0);
        assert_eq!(params.targets_per_spec, 2);
        assert!(params.oos_pattern.is_empty());
    }

    #[tokio::test]
    async fn test_alloc_fails_without_address() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);

        let (mut unresolved, mut rx) = node("search/*");
        assert!(!net.alloc_service_address(&mut unresolved).await);
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.errors[0].code, codes::NO_ADDRESS_FOR_SERVICE);
        assert_eq!(reply.errors[0].service, "search/*");
    }

    #[tokio::test]
    async fn test_alloc_fails_on_dead_endpoint() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);

        // Static address; nothing listens on port 1.
        let (mut unreachable, mut rx) = node("tcp/127.0.0.1:1/main");
        assert!(!net.alloc_service_address(&mut unreachable).await);
        let reply = rx.try_recv().unwrap();
        assert_eq!(reply.errors[0].code, codes::CONNECTION_ERROR);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_before_any_io() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);

        let mut message = Message::new("Simple", "", Vec::new());
        message.time_remaining = Duration::ZERO;
        let (spent, mut rx) = node("search/a");
        net.send(message, vec![spent]);
        assert_eq!(rx.try_recv().unwrap().errors[0].code, codes::TIMEOUT);
    }

    #[tokio::test]
    async fn test_unallocated_recipient_is_rejected() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);

        let (bare, mut rx) = node("search/a");
        net.send(Message::new("Simple", "", Vec::new()), vec![bare]);
        assert_eq!(rx.try_recv().unwrap().errors[0].code, codes::NETWORK_ERROR);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails_fast() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);
        net.shutdown().await;

        let (orphan, mut rx) = node("search/a");
        net.send(Message::new("Simple", "", Vec::new()), vec![orphan]);
        assert_eq!(
            rx.try_recv().unwrap().errors[0].code,
            codes::NETWORK_SHUTDOWN
        );

        let (mut late, mut late_rx) = node("search/a");
        assert!(!net.alloc_service_address(&mut late).await);
        assert_eq!(
            late_rx.try_recv().unwrap().errors[0].code,
            codes::NETWORK_SHUTDOWN
        );
    }

    #[tokio::test]
    async fn test_session_registration_needs_running_network() {
        let mirror = Arc::new(LocalMirror::new());
        let net = test_network(&mirror);

        net.register_session("main");
        assert!(mirror.lookup("test/main").is_empty());
        assert!(net.listen_spec().is_none());
    }
}
