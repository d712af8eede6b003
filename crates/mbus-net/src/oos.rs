//! Out-of-service tracking.
//!
//! Operators mark services out of service on dedicated OOS providers; the
//! network must stop routing to those services without any push channel from
//! the providers. The tracker discovers providers through the name service
//! mirror, long-polls each one for its list, and publishes the union as a
//! copy-on-write set that [`is_oos`](OosTracker::is_oos) reads lock-light on
//! the hot path.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use mbus_common::protocol::error::{NetError, Result};
use mbus_common::protocol::Request;
use mbus_common::transport::{BinCodec, FrameLimits, RpcClient};

use crate::mirror::NameServiceMirror;

pub const OOS_LIST_METHOD: &str = "oos.getList";

/// Params of `oos.getList`.
///
/// `generation` is the last list generation the poller saw; the provider
/// holds the call up to `timeout_ms` waiting for the list to move past it.
#[derive(Debug, Serialize, Deserialize)]
pub struct OosListParams {
    pub generation: u32,
    pub timeout_ms: u32,
}

/// Return of `oos.getList`: the current list and its generation.
#[derive(Debug, Serialize, Deserialize)]
pub struct OosListReturn {
    pub generation: u32,
    pub services: Vec<String>,
}

/// Tuning for [`OosTracker`]. An empty `pattern` disables tracking.
#[derive(Debug, Clone)]
pub struct OosConfig {
    /// Name service pattern matching the OOS providers.
    pub pattern: String,
    /// How often the mirror is checked for provider changes.
    pub scan_interval: Duration,
    /// Pause between successful polls of one provider.
    pub poll_delay: Duration,
    /// Pause before re-dialing a provider after a failure.
    pub reconnect_delay: Duration,
    /// Long-poll hold time granted to the provider.
    pub request_timeout: Duration,
    pub limits: FrameLimits,
}

impl Default for OosConfig {
    fn default() -> Self {
        OosConfig {
            pattern: String::new(),
            scan_interval: Duration::from_secs(1),
            poll_delay: Duration::from_secs(1),
            reconnect_delay: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            limits: FrameLimits::default(),
        }
    }
}

struct ProviderState {
    name: String,
    services: Mutex<Vec<String>>,
    ready: AtomicBool,
    changes: AtomicU64,
}

impl ProviderState {
    fn new(name: String) -> Self {
        ProviderState {
            name,
            services: Mutex::new(Vec::new()),
            ready: AtomicBool::new(false),
            changes: AtomicU64::new(0),
        }
    }

    fn replace(&self, services: Vec<String>) {
        *self.services.lock().unwrap() = services;
        self.changes.fetch_add(1, Ordering::SeqCst);
    }

    /// Forgets this provider's list, e.g. when it stops answering.
    fn clear(&self) {
        let mut services = self.services.lock().unwrap();
        if !services.is_empty() {
            services.clear();
            self.changes.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ProviderHandle {
    state: Arc<ProviderState>,
    task: JoinHandle<()>,
}

/// Polls OOS providers and publishes the union of their lists.
pub struct OosTracker {
    mirror: Arc<dyn NameServiceMirror>,
    config: OosConfig,
    published: RwLock<Arc<HashSet<String>>>,
    providers: Mutex<HashMap<String, ProviderHandle>>,
    /// Per-provider change counter captured at the last publish.
    dumped: Mutex<HashMap<String, u64>>,
    scanned: AtomicBool,
    scan_task: Mutex<Option<JoinHandle<()>>>,
}

impl OosTracker {
    pub fn new(config: OosConfig, mirror: Arc<dyn NameServiceMirror>) -> Arc<Self> {
        Arc::new(OosTracker {
            mirror,
            config,
            published: RwLock::new(Arc::new(HashSet::new())),
            providers: Mutex::new(HashMap::new()),
            dumped: Mutex::new(HashMap::new()),
            scanned: AtomicBool::new(false),
            scan_task: Mutex::new(None),
        })
    }

    pub fn enabled(&self) -> bool {
        !self.config.pattern.is_empty()
    }

    /// Starts provider discovery and polling. No-op when disabled.
    pub fn start(self: &Arc<Self>) {
        if !self.enabled() {
            debug!("oos tracking disabled, no provider pattern");
            return;
        }
        let tracker = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tracker.config.scan_interval);
            let mut last_generation = None;
            loop {
                interval.tick().await;
                let generation = tracker.mirror.updates();
                if last_generation != Some(generation) {
                    last_generation = Some(generation);
                    tracker.rescan_providers();
                }
                tracker.republish_if_changed();
            }
        });
        *self.scan_task.lock().unwrap() = Some(task);
    }

    /// Whether `service` is currently marked out of service.
    pub fn is_oos(&self, service: &str) -> bool {
        if !self.enabled() {
            return false;
        }
        self.published.read().unwrap().contains(service)
    }

    /// True once every discovered provider has answered (or failed) at least
    /// once. Always true when disabled.
    pub fn ready(&self) -> bool {
        if !self.enabled() {
            return true;
        }
        self.scanned.load(Ordering::SeqCst)
            && self
                .providers
                .lock()
                .unwrap()
                .values()
                .all(|handle| handle.state.ready.load(Ordering::SeqCst))
    }

    /// Stops all polling and empties the published set.
    pub fn stop(&self) {
        if let Some(task) = self.scan_task.lock().unwrap().take() {
            task.abort();
        }
        for (_, handle) in self.providers.lock().unwrap().drain() {
            handle.task.abort();
        }
        self.dumped.lock().unwrap().clear();
        *self.published.write().unwrap() = Arc::new(HashSet::new());
    }

    fn rescan_providers(self: &Arc<Self>) {
        let entries = self.mirror.lookup(&self.config.pattern);
        let mut providers = self.providers.lock().unwrap();

        let current: HashSet<&str> = entries.iter().map(|entry| entry.spec.as_str()).collect();
        let stale: Vec<String> = providers
            .keys()
            .filter(|spec| !current.contains(spec.as_str()))
            .cloned()
            .collect();
        for spec in stale {
            if let Some(handle) = providers.remove(&spec) {
                info!(provider = %handle.state.name, %spec, "oos provider gone");
                handle.task.abort();
                self.dumped.lock().unwrap().remove(&spec);
            }
        }

        for entry in entries {
            if providers.contains_key(&entry.spec) {
                continue;
            }
            info!(provider = %entry.name, spec = %entry.spec, "oos provider discovered");
            let state = Arc::new(ProviderState::new(entry.name));
            let task = tokio::spawn(poll_provider(
                entry.spec.clone(),
                Arc::clone(&state),
                self.config.clone(),
            ));
            providers.insert(entry.spec, ProviderHandle { state, task });
        }
        drop(providers);
        self.scanned.store(true, Ordering::SeqCst);
    }

    fn republish_if_changed(&self) {
        let providers = self.providers.lock().unwrap();
        let mut dumped = self.dumped.lock().unwrap();

        let changed = dumped.len() != providers.len()
            || providers.iter().any(|(spec, handle)| {
                dumped.get(spec) != Some(&handle.state.changes.load(Ordering::SeqCst))
            });
        if !changed {
            return;
        }

        let mut union = HashSet::new();
        let mut seen = HashMap::new();
        for (spec, handle) in providers.iter() {
            // Counter first: a replace racing in between makes the publish
            // look stale and rerun next sweep, never go missing.
            let changes = handle.state.changes.load(Ordering::SeqCst);
            union.extend(handle.state.services.lock().unwrap().iter().cloned());
            seen.insert(spec.clone(), changes);
        }
        debug!(services = union.len(), "publishing out-of-service set");
        *self.published.write().unwrap() = Arc::new(union);
        *dumped = seen;
    }
}

async fn poll_provider(spec: String, state: Arc<ProviderState>, config: OosConfig) {
    let mut client: Option<RpcClient> = None;
    let mut generation = 0u32;
    loop {
        let live = match client.take() {
            Some(existing) if existing.is_valid() => existing,
            _ => match RpcClient::connect(&spec, config.limits).await {
                Ok(fresh) => fresh,
                Err(error) => {
                    debug!(%spec, %error, "oos provider unreachable");
                    state.clear();
                    // An unreachable provider must not hold up readiness.
                    state.ready.store(true, Ordering::SeqCst);
                    generation = 0;
                    tokio::time::sleep(config.reconnect_delay).await;
                    continue;
                }
            },
        };
        match fetch_list(&live, generation, &config).await {
            Ok(ret) => {
                if ret.generation != generation {
                    generation = ret.generation;
                    state.replace(ret.services);
                }
                state.ready.store(true, Ordering::SeqCst);
                client = Some(live);
                tokio::time::sleep(config.poll_delay).await;
            }
            Err(error) => {
                warn!(%spec, %error, "oos poll failed");
                state.clear();
                state.ready.store(true, Ordering::SeqCst);
                generation = 0;
                tokio::time::sleep(config.reconnect_delay).await;
            }
        }
    }
}

async fn fetch_list(client: &RpcClient, generation: u32, config: &OosConfig) -> Result<OosListReturn> {
    let params = OosListParams {
        generation,
        timeout_ms: config.request_timeout.as_millis() as u32,
    };
    let request = Request::new(OOS_LIST_METHOD, BinCodec::encode(&params)?);
    // The provider may hold the call for the full timeout before answering.
    let response = client
        .invoke(request, config.request_timeout.saturating_mul(2))
        .await?;
    if !response.success {
        return Err(NetError::InvalidResponse(
            response.error.unwrap_or_else(|| "oos.getList failed".to_string()),
        ));
    }
    Ok(BinCodec::decode(&response.payload)?)
}
