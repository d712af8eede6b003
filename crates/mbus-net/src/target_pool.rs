//! Shared pool of outbound connections.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use mbus_common::protocol::error::Result;
use mbus_common::transport::FrameLimits;

use crate::target::Target;

/// Tuning for [`TargetPool`].
#[derive(Debug, Clone, Copy)]
pub struct TargetPoolConfig {
    /// Parallel connections opened per connection spec.
    pub targets_per_spec: usize,
    /// Idle time after which an unreferenced entry is dropped.
    pub expire_after: Duration,
    /// How often the background sweep runs.
    pub flush_interval: Duration,
    /// Frame limits applied to every pooled connection.
    pub limits: FrameLimits,
}

impl Default for TargetPoolConfig {
    fn default() -> Self {
        TargetPoolConfig {
            targets_per_spec: 2,
            expire_after: Duration::from_secs(60),
            flush_interval: Duration::from_secs(1),
            limits: FrameLimits::default(),
        }
    }
}

struct PoolEntry {
    targets: Vec<Arc<Target>>,
    index: usize,
    last_use: Instant,
}

impl PoolEntry {
    fn is_valid(&self) -> bool {
        self.targets.iter().all(|target| target.is_valid())
    }

    /// True while any caller still holds one of this entry's targets.
    fn in_use(&self) -> bool {
        self.targets
            .iter()
            .any(|target| Arc::strong_count(target) > 1)
    }
}

/// Keyed store of live [`Target`]s, shared by every sender in the process.
///
/// Each spec maps to a small set of connections handed out round-robin.
/// Entries expire once nothing references them and they have sat idle past
/// [`TargetPoolConfig::expire_after`]; a dropped entry closes on the last
/// outstanding reference, never under a caller still using it.
pub struct TargetPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
    config: TargetPoolConfig,
}

impl TargetPool {
    pub fn new(config: TargetPoolConfig) -> Self {
        TargetPool {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Returns a live target for `spec`, connecting if none is pooled.
    ///
    /// The pool lock is held across the connect so concurrent callers for the
    /// same spec share one set of connections instead of racing to open more.
    pub async fn get_target(&self, spec: &str) -> Result<Arc<Target>> {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(spec) {
            if entry.is_valid() {
                entry.last_use = Instant::now();
                let target = Arc::clone(&entry.targets[entry.index % entry.targets.len()]);
                entry.index = entry.index.wrapping_add(1);
                return Ok(target);
            }
            debug!(%spec, "dropping pooled entry with dead connection");
            entries.remove(spec);
        }

        let count = self.config.targets_per_spec.max(1);
        let mut targets = Vec::with_capacity(count);
        for _ in 0..count {
            targets.push(Target::connect(spec, self.config.limits).await?);
        }
        let target = Arc::clone(&targets[0]);
        entries.insert(
            spec.to_string(),
            PoolEntry {
                targets,
                index: 1,
                last_use: Instant::now(),
            },
        );
        Ok(target)
    }

    /// Sweeps the pool; with `force` every entry goes regardless of use.
    pub async fn flush(&self, force: bool) {
        let mut entries = self.entries.lock().await;
        entries.retain(|spec, entry| {
            if !force {
                if entry.is_valid() && entry.in_use() {
                    entry.last_use = Instant::now();
                    return true;
                }
                if entry.last_use.elapsed() < self.config.expire_after {
                    return true;
                }
            }
            debug!(%spec, "expiring pooled targets");
            false
        });
    }

    pub async fn size(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Starts the periodic sweep and returns its task handle.
    pub fn spawn_flush(self: &Arc<Self>) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(pool.config.flush_interval);
            loop {
                interval.tick().await;
                pool.flush(false).await;
            }
        })
    }
}
