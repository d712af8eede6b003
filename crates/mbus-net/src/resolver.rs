//! Pattern-to-address resolution.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::address::ServiceAddress;
use crate::mirror::{MirrorEntry, NameServiceMirror};

/// Patterns with this prefix are literal addresses and bypass the mirror.
const STATIC_PREFIX: &str = "tcp/";

/// Turns a service pattern into one concrete address per call.
///
/// Name-service patterns round-robin over the mirror's matches; literal
/// `tcp/host:port/session` patterns resolve to themselves without touching
/// the mirror. The variant is picked once at construction.
pub enum ServiceResolver {
    Mirror(MirrorResolver),
    Static(StaticResolver),
}

impl ServiceResolver {
    pub fn new(pattern: &str, mirror: Arc<dyn NameServiceMirror>) -> Self {
        if pattern.starts_with(STATIC_PREFIX) {
            ServiceResolver::Static(StaticResolver::new(pattern))
        } else {
            ServiceResolver::Mirror(MirrorResolver::new(pattern, mirror))
        }
    }

    /// The next address for the pattern, or `None` when nothing matches.
    pub fn resolve(&mut self) -> Option<ServiceAddress> {
        match self {
            ServiceResolver::Mirror(resolver) => resolver.resolve(),
            ServiceResolver::Static(resolver) => resolver.resolve(),
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            ServiceResolver::Mirror(resolver) => &resolver.pattern,
            ServiceResolver::Static(resolver) => &resolver.pattern,
        }
    }
}

/// Round-robins over the mirror's matches, re-querying on table changes.
pub struct MirrorResolver {
    pattern: String,
    mirror: Arc<dyn NameServiceMirror>,
    generation: Option<u64>,
    entries: Vec<MirrorEntry>,
    offset: usize,
}

impl MirrorResolver {
    fn new(pattern: &str, mirror: Arc<dyn NameServiceMirror>) -> Self {
        MirrorResolver {
            pattern: pattern.to_string(),
            mirror,
            generation: None,
            entries: Vec::new(),
            // Random start keeps concurrent processes from all hammering the
            // same first entry.
            offset: rand::random::<u32>() as usize,
        }
    }

    fn resolve(&mut self) -> Option<ServiceAddress> {
        let current = self.mirror.updates();
        if self.generation != Some(current) {
            self.entries = self.mirror.lookup(&self.pattern);
            self.generation = Some(current);
            debug!(
                "Pattern '{}' matches {} entries at generation {}",
                self.pattern,
                self.entries.len(),
                current
            );
        }
        if self.entries.is_empty() {
            return None;
        }
        let entry = &self.entries[self.offset % self.entries.len()];
        self.offset = self.offset.wrapping_add(1);
        ServiceAddress::new(entry.name.clone(), entry.spec.clone())
    }
}

/// A literal `tcp/host:port/session` address, parsed once.
pub struct StaticResolver {
    pattern: String,
    blueprint: Option<ServiceAddress>,
}

impl StaticResolver {
    fn new(pattern: &str) -> Self {
        let blueprint = Self::parse(pattern);
        if blueprint.is_none() {
            warn!("Static address '{}' is malformed", pattern);
        }
        StaticResolver {
            pattern: pattern.to_string(),
            blueprint,
        }
    }

    /// The whole pattern becomes the service name; the middle component is
    /// the connection spec.
    fn parse(pattern: &str) -> Option<ServiceAddress> {
        let rest = pattern.strip_prefix(STATIC_PREFIX)?;
        let (spec, _session) = rest.split_once('/')?;
        ServiceAddress::new(pattern, spec)
    }

    fn resolve(&mut self) -> Option<ServiceAddress> {
        self.blueprint.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::LocalMirror;
    use crate::mirror::NameServiceRegister;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mirror wrapper that counts lookups.
    struct CountingMirror {
        inner: LocalMirror,
        lookups: AtomicUsize,
    }

    impl CountingMirror {
        fn new() -> Self {
            CountingMirror {
                inner: LocalMirror::new(),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    impl NameServiceMirror for CountingMirror {
        fn lookup(&self, pattern: &str) -> Vec<MirrorEntry> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            self.inner.lookup(pattern)
        }

        fn updates(&self) -> u64 {
            self.inner.updates()
        }

        fn ready(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_static_pattern_resolves_without_lookup() {
        let mirror = Arc::new(CountingMirror::new());
        let mut resolver = ServiceResolver::new("tcp/host1:1234/sessionA", mirror.clone());

        let address = resolver.resolve().unwrap();
        assert_eq!(address.service_name(), "tcp/host1:1234/sessionA");
        assert_eq!(address.session_name(), "sessionA");
        assert_eq!(address.conn_spec(), "host1:1234");
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_malformed_static_pattern_is_absent() {
        let mirror = Arc::new(LocalMirror::new());
        let mut resolver = ServiceResolver::new("tcp/host1:1234", mirror);
        assert!(resolver.resolve().is_none());
    }

    #[test]
    fn test_round_robin_is_cyclic() {
        let mirror = Arc::new(LocalMirror::new());
        mirror.register("search/a", "host-a:1");
        mirror.register("search/b", "host-b:1");
        mirror.register("search/c", "host-c:1");

        let mut resolver = ServiceResolver::new("search/*", mirror);
        let names: Vec<String> = (0..9)
            .map(|_| resolver.resolve().unwrap().service_name().to_string())
            .collect();

        // Every window of three visits all three entries exactly once,
        // regardless of the random starting offset.
        for window in names.chunks(3) {
            let distinct: HashSet<&String> = window.iter().collect();
            assert_eq!(distinct.len(), 3);
        }
        assert_eq!(names[0], names[3]);
        assert_eq!(names[1], names[4]);
    }

    #[test]
    fn test_requery_on_generation_change() {
        let mirror = Arc::new(CountingMirror::new());
        mirror.inner.register("search/a", "host-a:1");

        let mut resolver = ServiceResolver::new("search/*", mirror.clone());
        resolver.resolve().unwrap();
        resolver.resolve().unwrap();
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 1);

        mirror.inner.register("search/b", "host-b:1");
        let mut seen = HashSet::new();
        seen.insert(resolver.resolve().unwrap().service_name().to_string());
        seen.insert(resolver.resolve().unwrap().service_name().to_string());
        assert_eq!(mirror.lookups.load(Ordering::SeqCst), 2);
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_no_matches_is_absent() {
        let mirror = Arc::new(LocalMirror::new());
        let mut resolver = ServiceResolver::new("missing/*", mirror);
        assert!(resolver.resolve().is_none());
    }
}
