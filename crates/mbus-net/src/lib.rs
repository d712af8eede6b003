pub mod identity;
pub mod mirror;
pub mod message;
pub mod address;
pub mod resolver;
pub mod service_pool;
pub mod target;
pub mod target_pool;
pub mod routing;
pub mod adapter;
pub mod send_v1;
pub mod send_v2;
pub mod oos;
pub mod network;
pub mod simple;

pub use identity::Identity;
pub use mirror::{LocalMirror, MirrorEntry, NameServiceMirror, NameServiceRegister};
pub use message::{Message, Protocol, Reply, ReplyContext, Routable, Trace};
pub use address::ServiceAddress;
pub use resolver::ServiceResolver;
pub use service_pool::ServicePool;
pub use target::{Target, VersionHandler};
pub use target_pool::{TargetPool, TargetPoolConfig};
pub use routing::{ReplyHandler, RoutingNode};
pub use adapter::{AdapterRegistry, InboundEnvelope, SendAdapter, SendContext};
pub use send_v1::SendV1;
pub use send_v2::SendV2;
pub use oos::{OosConfig, OosTracker};
pub use network::{Network, NetworkOwner, NetworkParams};
pub use simple::SimpleProtocol;
