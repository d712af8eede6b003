pub mod error;
pub mod requests;
pub mod responses;
pub mod version;

#[cfg(test)]
mod tests;

pub use error::{codes, BusError, NetError, Result};
pub use requests::{Request, RequestId, MethodName};
pub use responses::Response;
pub use version::Version;
