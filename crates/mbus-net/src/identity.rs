use std::fmt;

/// Immutable identity of this node on the bus.
///
/// The service prefix is the namespace the node's sessions register under;
/// an empty prefix marks a pure client that publishes nothing and only
/// sends. The hostname is what peers dial, so it must be reachable from
/// them, not merely `localhost`.
///
/// # Example
///
/// ```
/// use mbus_net::Identity;
///
/// let identity = Identity::new("host-7.example", "search");
/// assert_eq!(identity.service_name("shard-2"), "search/shard-2");
/// assert_eq!(identity.log_name(), "search");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    hostname: String,
    service_prefix: String,
}

impl Identity {
    pub fn new(hostname: impl Into<String>, service_prefix: impl Into<String>) -> Self {
        Identity {
            hostname: hostname.into(),
            service_prefix: service_prefix.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn service_prefix(&self) -> &str {
        &self.service_prefix
    }

    /// Full service name for one of this node's sessions.
    pub fn service_name(&self, session: &str) -> String {
        if self.service_prefix.is_empty() {
            session.to_string()
        } else {
            format!("{}/{}", self.service_prefix, session)
        }
    }

    /// Short tag used in log lines.
    pub fn log_name(&self) -> &str {
        if self.service_prefix.is_empty() {
            "client"
        } else {
            &self.service_prefix
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.log_name(), self.hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_name_with_prefix() {
        let identity = Identity::new("host-1", "search");
        assert_eq!(identity.service_name("shard-0"), "search/shard-0");
    }

    #[test]
    fn test_service_name_without_prefix() {
        let identity = Identity::new("host-1", "");
        assert_eq!(identity.service_name("shard-0"), "shard-0");
    }

    #[test]
    fn test_log_name() {
        assert_eq!(Identity::new("h", "search").log_name(), "search");
        assert_eq!(Identity::new("h", "").log_name(), "client");
    }

    #[test]
    fn test_display() {
        let identity = Identity::new("host-1", "search");
        assert_eq!(identity.to_string(), "search@host-1");
    }
}
