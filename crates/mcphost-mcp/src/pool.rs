//! Shared hub pool
//!
//! Hubs are pooled by a fingerprint of their settings, so callers that ask for the same
//! set of servers share one set of live connections.
//!
//! The fingerprint concatenates, for every enabled server in name order,
//! `"|<name>:HTTP:<url>"` for network transports or `"|<name>:STDIO:<command>:<args>"`
//! for stdio, with args shell-quoted and joined by a space so that `["a b"]` and
//! `["a", "b"]` differ. Settings that contribute no server
//! map to [`EMPTY_CONFIG_KEY`].
//!
//! Every entry carries a reference count and a last-access time. A background sweep
//! closes entries nobody holds once they have been idle past the configured timeout.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

use mcphost_core::McpSettings;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{HubError, Result};
use crate::hub::McpHub;

/// Default idle timeout (5 minutes)
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Default sweep interval (1 minute)
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Fingerprint of settings without any contributing server.
pub const EMPTY_CONFIG_KEY: &str = "empty_config";

/// Pool tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// How long an unreferenced hub survives
    pub idle_timeout: Duration,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// Canonical fingerprint of `settings`.
pub fn generate_config_key(settings: Option<&McpSettings>) -> String {
    let Some(settings) = settings else {
        return EMPTY_CONFIG_KEY.to_string();
    };

    let mut key = String::new();
    for (name, config) in settings.enabled_servers() {
        if config.effective_transport().is_network() {
            let _ = write!(key, "|{}:HTTP:{}", name, config.url);
        } else {
            let _ = write!(
                key,
                "|{}:STDIO:{}:{}",
                name,
                config.command,
                shell_words::join(&config.args)
            );
        }
    }

    if key.is_empty() {
        EMPTY_CONFIG_KEY.to_string()
    } else {
        key
    }
}

struct PoolEntry {
    hub: Arc<McpHub>,
    ref_count: usize,
    last_access: Instant,
}

impl PoolEntry {
    fn is_evictable(&self, idle_timeout: Duration, now: Instant) -> bool {
        self.ref_count == 0 && now.saturating_duration_since(self.last_access) >= idle_timeout
    }
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<String, PoolEntry>,
    /// Server name to the fingerprint of the most recent hub serving it
    server_keys: HashMap<String, String>,
}

impl PoolState {
    fn remove(&mut self, key: &str) -> Option<PoolEntry> {
        let entry = self.entries.remove(key)?;
        self.server_keys.retain(|_, k| k != key);
        Some(entry)
    }

    /// Remove every evictable entry.
    fn take_idle(&mut self, idle_timeout: Duration) -> Vec<(String, Arc<McpHub>)> {
        let now = Instant::now();
        let idle: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_evictable(idle_timeout, now))
            .map(|(key, _)| key.clone())
            .collect();

        idle.into_iter()
            .filter_map(|key| self.remove(&key).map(|entry| (key, entry.hub)))
            .collect()
    }
}

struct Sweeper {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Reference-counted, idle-evicting pool of hubs.
pub struct ConnectionPool {
    state: Arc<Mutex<PoolState>>,
    config: PoolConfig,
    sweeper: Mutex<Option<Sweeper>>,
}

impl ConnectionPool {
    /// Create an empty pool. The sweep starts with the first [`ConnectionPool::get_hub`].
    pub fn new(config: PoolConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState::default())),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Shared hub for `settings`, connecting a new one on first use.
    pub async fn get_hub(&self, settings: &McpSettings) -> Result<Arc<McpHub>> {
        self.get_hub_with(settings, McpHub::from_settings).await
    }

    /// Like [`ConnectionPool::get_hub`], with the caller supplying how a missing hub is built.
    ///
    /// A failed build leaves no entry behind.
    pub async fn get_hub_with<F, Fut>(&self, settings: &McpSettings, build: F) -> Result<Arc<McpHub>>
    where
        F: FnOnce(McpSettings) -> Fut,
        Fut: Future<Output = Result<McpHub>>,
    {
        self.ensure_sweeper();
        let key = generate_config_key(Some(settings));

        if let Some(hub) = self.acquire(&key) {
            return Ok(hub);
        }

        info!(pool_key = %key, "Creating new pooled hub");
        let hub = Arc::new(build(settings.clone()).await?);

        // Another caller may have stored the same fingerprint while we were connecting.
        let (shared, redundant) = {
            let mut state = self.state.lock();
            match state.entries.get_mut(&key) {
                Some(entry) => {
                    entry.ref_count += 1;
                    entry.last_access = Instant::now();
                    (Arc::clone(&entry.hub), Some(hub))
                }
                None => {
                    state.entries.insert(
                        key.clone(),
                        PoolEntry {
                            hub: Arc::clone(&hub),
                            ref_count: 1,
                            last_access: Instant::now(),
                        },
                    );
                    for (name, _) in settings.enabled_servers() {
                        state.server_keys.insert(name.clone(), key.clone());
                    }
                    (hub, None)
                }
            }
        };

        if let Some(redundant) = redundant {
            debug!(pool_key = %key, "Discarding hub built concurrently");
            if let Err(e) = redundant.close_servers().await {
                warn!(pool_key = %key, error = %e, "Failed to close redundant hub");
            }
        }
        Ok(shared)
    }

    fn acquire(&self, key: &str) -> Option<Arc<McpHub>> {
        let mut state = self.state.lock();
        let entry = state.entries.get_mut(key)?;
        entry.ref_count += 1;
        entry.last_access = Instant::now();
        debug!(pool_key = %key, ref_count = entry.ref_count, "Reusing pooled hub");
        Some(Arc::clone(&entry.hub))
    }

    /// Drop one reference to the hub for `settings`. Unknown settings are ignored.
    pub fn release_hub(&self, settings: &McpSettings) {
        self.release_key(&generate_config_key(Some(settings)));
    }

    /// Drop one reference by fingerprint.
    pub fn release_key(&self, key: &str) {
        let mut state = self.state.lock();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
            entry.last_access = Instant::now();
            debug!(pool_key = %key, ref_count = entry.ref_count, "Released hub reference");
        }
    }

    /// Close every unreferenced hub idle past the timeout. Returns how many were closed.
    pub async fn sweep_idle(&self) -> usize {
        let evicted = self.state.lock().take_idle(self.config.idle_timeout);
        close_evicted(evicted).await
    }

    /// Stop the sweep, close every hub and empty the pool.
    pub async fn close_all_hubs(&self) -> Result<()> {
        self.stop_sweeper().await;

        let hubs: Vec<(String, Arc<McpHub>)> = {
            let mut state = self.state.lock();
            state.server_keys.clear();
            state
                .entries
                .drain()
                .map(|(key, entry)| (key, entry.hub))
                .collect()
        };

        let mut errors = Vec::new();
        for (key, hub) in hubs {
            if let Err(e) = hub.close_servers().await {
                warn!(pool_key = %key, error = %e, "Failed to close pooled hub");
                errors.push(e.to_string());
            }
        }
        info!("Connection pool closed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(HubError::Close(errors))
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.lock().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Reference count of the hub under `key`, if pooled.
    pub fn ref_count(&self, key: &str) -> Option<usize> {
        self.state.lock().entries.get(key).map(|e| e.ref_count)
    }

    /// Fingerprint of the pooled hub most recently created for `server`.
    pub fn key_for_server(&self, server: &str) -> Option<String> {
        self.state.lock().server_keys.get(server).cloned()
    }

    /// Pooled hub most recently created for `server`, without taking a reference.
    pub fn hub_for_server(&self, server: &str) -> Option<Arc<McpHub>> {
        let state = self.state.lock();
        let key = state.server_keys.get(server)?;
        state.entries.get(key).map(|e| Arc::clone(&e.hub))
    }

    fn ensure_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        // A sweep dies with the runtime that spawned it; the next caller restarts it.
        if let Some(existing) = sweeper.as_ref() {
            if !existing.handle.is_finished() {
                return;
            }
            debug!("Idle sweep stopped; restarting");
            existing.cancel.cancel();
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_sweeper(
            Arc::downgrade(&self.state),
            self.config,
            cancel.clone(),
        ));
        debug!(interval = ?self.config.sweep_interval, "Started idle sweep");
        *sweeper = Some(Sweeper { cancel, handle });
    }

    async fn stop_sweeper(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(Sweeper { cancel, handle }) = sweeper {
            cancel.cancel();
            match handle.await {
                Err(e) if !e.is_cancelled() => {
                    warn!(error = %e, "Idle sweep task ended abnormally")
                }
                _ => {}
            }
        }
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

impl Drop for ConnectionPool {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.get_mut().take() {
            sweeper.cancel.cancel();
        }
    }
}

async fn run_sweeper(state: Weak<Mutex<PoolState>>, config: PoolConfig, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(config.sweep_interval);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(state) = state.upgrade() else {
            break;
        };
        let evicted = state.lock().take_idle(config.idle_timeout);
        drop(state);

        let closed = close_evicted(evicted).await;
        if closed > 0 {
            debug!(closed, "Idle sweep closed hubs");
        }
    }
}

async fn close_evicted(evicted: Vec<(String, Arc<McpHub>)>) -> usize {
    let count = evicted.len();
    for (key, hub) in evicted {
        info!(pool_key = %key, "Closing idle hub");
        if let Err(e) = hub.close_servers().await {
            warn!(pool_key = %key, error = %e, "Failed to close idle hub");
        }
    }
    count
}

static DEFAULT_POOL: OnceLock<ConnectionPool> = OnceLock::new();

/// Process-wide pool with default tuning, created on first use.
pub fn connection_pool() -> &'static ConnectionPool {
    DEFAULT_POOL.get_or_init(ConnectionPool::default)
}
