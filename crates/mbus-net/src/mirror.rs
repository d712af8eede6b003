//! Name service mirror interface.
//!
//! The real name service lives elsewhere; the network layer only sees a
//! push-updated local mirror of its table through [`NameServiceMirror`],
//! plus a write-side [`NameServiceRegister`] for publishing this node's own
//! sessions. [`LocalMirror`] is an in-process implementation of both used
//! by tests and the demo binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tracing::debug;

/// One name service entry: a concrete service name and where it listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorEntry {
    pub name: String,
    /// Connection spec, `host:port`.
    pub spec: String,
}

/// Read side of the name service table.
pub trait NameServiceMirror: Send + Sync {
    /// All entries whose name matches `pattern`.
    ///
    /// Patterns match component-wise on `/`: a `*` component matches exactly
    /// one name component, a trailing `**` matches any remainder, anything
    /// else matches literally.
    fn lookup(&self, pattern: &str) -> Vec<MirrorEntry>;

    /// Generation counter, bumped on every table change. Resolvers compare
    /// it against their cached value to decide whether to re-query.
    fn updates(&self) -> u64;

    /// Whether the mirror has received its initial table.
    fn ready(&self) -> bool;
}

/// Write side: publishing and withdrawing this node's own service names.
pub trait NameServiceRegister: Send + Sync {
    fn register(&self, name: &str, spec: &str);
    fn unregister(&self, name: &str);
}

fn pattern_matches(pattern: &str, name: &str) -> bool {
    let mut pattern_parts = pattern.split('/');
    let mut name_parts = name.split('/');
    loop {
        match (pattern_parts.next(), name_parts.next()) {
            (None, None) => return true,
            (Some("**"), _) => return true,
            (Some(p), Some(n)) => {
                if p != "*" && p != n {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// In-process name service for tests and demos.
///
/// Implements both sides of the interface over one table so a handful of
/// networks in the same process can find each other without a real name
/// service daemon.
pub struct LocalMirror {
    entries: RwLock<HashMap<String, String>>,
    generation: AtomicU64,
}

impl LocalMirror {
    pub fn new() -> Self {
        LocalMirror {
            entries: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }
}

impl Default for LocalMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl NameServiceMirror for LocalMirror {
    fn lookup(&self, pattern: &str) -> Vec<MirrorEntry> {
        let entries = self.entries.read().unwrap();
        let mut found: Vec<MirrorEntry> = entries
            .iter()
            .filter(|(name, _)| pattern_matches(pattern, name))
            .map(|(name, spec)| MirrorEntry {
                name: name.clone(),
                spec: spec.clone(),
            })
            .collect();
        // Deterministic order; HashMap iteration is not.
        found.sort_by(|a, b| a.name.cmp(&b.name));
        found
    }

    fn updates(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn ready(&self) -> bool {
        true
    }
}

impl NameServiceRegister for LocalMirror {
    fn register(&self, name: &str, spec: &str) {
        let mut entries = self.entries.write().unwrap();
        debug!("Mirror: {} -> {}", name, spec);
        entries.insert(name.to_string(), spec.to_string());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn unregister(&self, name: &str) {
        let mut entries = self.entries.write().unwrap();
        if entries.remove(name).is_some() {
            debug!("Mirror: {} withdrawn", name);
            self.generation.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_lookup() {
        let mirror = LocalMirror::new();
        mirror.register("search/shard-0", "host-1:4080");
        mirror.register("search/shard-1", "host-2:4080");

        let found = mirror.lookup("search/shard-0");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "search/shard-0");
        assert_eq!(found[0].spec, "host-1:4080");
    }

    #[test]
    fn test_star_matches_one_component() {
        let mirror = LocalMirror::new();
        mirror.register("search/shard-0", "a:1");
        mirror.register("search/shard-1", "b:1");
        mirror.register("search/deep/shard-2", "c:1");

        let found = mirror.lookup("search/*");
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "search/shard-0");
        assert_eq!(found[1].name, "search/shard-1");
    }

    #[test]
    fn test_double_star_matches_remainder() {
        let mirror = LocalMirror::new();
        mirror.register("search/shard-0", "a:1");
        mirror.register("search/deep/shard-2", "c:1");
        mirror.register("index/shard-0", "d:1");

        let found = mirror.lookup("search/**");
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_generation_bumps_on_change() {
        let mirror = LocalMirror::new();
        let before = mirror.updates();
        mirror.register("a/b", "h:1");
        assert!(mirror.updates() > before);

        let registered = mirror.updates();
        mirror.unregister("a/b");
        assert!(mirror.updates() > registered);

        // Unregistering an unknown name changes nothing
        let settled = mirror.updates();
        mirror.unregister("a/b");
        assert_eq!(mirror.updates(), settled);
    }

    #[test]
    fn test_no_match() {
        let mirror = LocalMirror::new();
        mirror.register("search/shard-0", "a:1");
        assert!(mirror.lookup("index/*").is_empty());
        assert!(mirror.lookup("search").is_empty());
    }
}
