//! Resolved service addresses.

use std::fmt;
use std::sync::Arc;

use crate::target::Target;

/// One concrete recipient address.
///
/// Names the full service, the session derived from it (the part after the
/// last `/`), and the `host:port` connection spec. After allocation it also
/// holds a borrowed reference to the pooled connection; dropping the address
/// releases the borrow, which is what lets the pool eventually close the
/// connection.
#[derive(Clone)]
pub struct ServiceAddress {
    service_name: String,
    session_name: String,
    conn_spec: String,
    target: Option<Arc<Target>>,
}

impl ServiceAddress {
    /// Builds an address from a full service name and a `host:port` spec.
    ///
    /// Returns `None` when the address would be malformed: empty name, empty
    /// session (trailing `/`), or a spec without a port separator.
    pub fn new(service_name: impl Into<String>, conn_spec: impl Into<String>) -> Option<Self> {
        let service_name = service_name.into();
        let conn_spec = conn_spec.into();
        if service_name.is_empty() || conn_spec.is_empty() || !conn_spec.contains(':') {
            return None;
        }
        let session_name = match service_name.rsplit_once('/') {
            Some((_, session)) => session.to_string(),
            None => service_name.clone(),
        };
        if session_name.is_empty() {
            return None;
        }
        Some(ServiceAddress {
            service_name,
            session_name,
            conn_spec,
            target: None,
        })
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn session_name(&self) -> &str {
        &self.session_name
    }

    pub fn conn_spec(&self) -> &str {
        &self.conn_spec
    }

    pub fn target(&self) -> Option<&Arc<Target>> {
        self.target.as_ref()
    }

    pub(crate) fn bind_target(&mut self, target: Arc<Target>) {
        self.target = Some(target);
    }
}

impl fmt::Debug for ServiceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAddress")
            .field("service_name", &self.service_name)
            .field("session_name", &self.session_name)
            .field("conn_spec", &self.conn_spec)
            .field("bound", &self.target.is_some())
            .finish()
    }
}
