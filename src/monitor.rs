//! Custody account monitor
//!
//! Owns one account-change subscription per tracked asset, dedupes updates
//! by slot, runs decode + rate derivation, and fans the resulting snapshot
//! out to registered callbacks. Also answers one-shot rate queries that
//! bypass subscription state entirely.

use crate::assets::AssetKey;
use crate::custody;
use crate::error::MonitorError;
use crate::ledger::{AccountChangeHandler, LedgerClient, SubscriptionHandle};
use crate::rates::{self, RateCallback, RateSnapshot};
use solana_sdk::pubkey::Pubkey;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Token for one registered rate callback; removal is keyed by this id, not
/// by closure identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

#[derive(Default)]
struct Lifecycle {
    running: bool,
    subscriptions: HashMap<AssetKey, SubscriptionHandle>,
}

struct MonitorInner {
    ledger: Arc<dyn LedgerClient>,
    assets: BTreeMap<AssetKey, Pubkey>,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
    last_slots: std::sync::Mutex<HashMap<AssetKey, u64>>,
    callbacks: std::sync::RwLock<HashMap<u64, RateCallback>>,
    next_callback_id: AtomicU64,
}

/// Monitors the custody accounts of a fixed asset table.
///
/// Fully instantiable with no hidden state; if an application wants a
/// process-wide instance, its composition root owns that decision.
pub struct CustodyMonitor {
    inner: Arc<MonitorInner>,
}

impl CustodyMonitor {
    pub fn new(ledger: Arc<dyn LedgerClient>, assets: BTreeMap<AssetKey, Pubkey>) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                ledger,
                assets,
                lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
                last_slots: std::sync::Mutex::new(HashMap::new()),
                callbacks: std::sync::RwLock::new(HashMap::new()),
                next_callback_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start monitoring every tracked asset: open its account-change
    /// subscription, then fetch current state once so callbacks get an
    /// initial snapshot without waiting for the next on-chain change.
    ///
    /// Idempotent; a second call while running is a no-op. A failure on one
    /// asset is logged and does not abort setup of the others.
    pub async fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.running {
            debug!("custody monitor already running");
            return;
        }

        for (&asset, address) in &self.inner.assets {
            let inner = Arc::clone(&self.inner);
            let handler: AccountChangeHandler =
                Box::new(move |data, slot| inner.handle_update(asset, &data, slot));

            match self.inner.ledger.subscribe(address, handler).await {
                Ok(handle) => {
                    lifecycle.subscriptions.insert(asset, handle);
                }
                Err(e) => {
                    error!(asset = %asset, %address, error = %e, "custody subscription failed");
                    continue;
                }
            }

            match self.inner.ledger.read_account(address).await {
                Ok(Some(update)) => self.inner.handle_update(asset, &update.data, update.slot),
                Ok(None) => warn!(asset = %asset, %address, "no custody account at address"),
                Err(e) => error!(asset = %asset, error = %e, "initial custody fetch failed"),
            }
        }

        lifecycle.running = true;
        info!(
            subscriptions = lifecycle.subscriptions.len(),
            "custody monitor started"
        );
    }

    /// Release every subscription and clear slot tracking and the callback
    /// registry. Idempotent; already-dead handles are tolerated.
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if !lifecycle.running {
            debug!("custody monitor already stopped");
            return;
        }
        lifecycle.running = false;

        let subscriptions: Vec<_> = lifecycle.subscriptions.drain().collect();
        for (asset, handle) in subscriptions {
            if let Err(e) = self.inner.ledger.unsubscribe(handle).await {
                warn!(asset = %asset, error = %e, "failed to release custody subscription");
            }
        }

        lock_mutex(&self.inner.last_slots).clear();
        write_lock(&self.inner.callbacks).clear();
        info!("custody monitor stopped");
    }

    /// Register a callback for every rate update. The returned id removes
    /// exactly this registration via [`CustodyMonitor::remove_rate_callback`].
    ///
    /// Callbacks run synchronously on the notification path and must not
    /// block; a panicking callback is isolated and logged.
    pub fn on_rate_update<F>(&self, callback: F) -> CallbackId
    where
        F: Fn(AssetKey, &RateSnapshot) + Send + Sync + 'static,
    {
        let id = self.inner.next_callback_id.fetch_add(1, Ordering::SeqCst);
        write_lock(&self.inner.callbacks).insert(id, Box::new(callback));
        CallbackId(id)
    }

    /// Remove one registered callback. Unknown ids are ignored.
    pub fn remove_rate_callback(&self, id: CallbackId) {
        write_lock(&self.inner.callbacks).remove(&id.0);
    }

    /// One-shot read + decode + compute, without touching subscription
    /// state. An untracked asset or a missing account is `AssetNotFound`;
    /// ledger failures surface as `Transport`.
    pub async fn get_current_rates(&self, asset: AssetKey) -> Result<RateSnapshot, MonitorError> {
        let address = self
            .inner
            .assets
            .get(&asset)
            .ok_or_else(|| MonitorError::AssetNotFound(asset.to_string()))?;
        let update = self
            .inner
            .ledger
            .read_account(address)
            .await?
            .ok_or_else(|| MonitorError::AssetNotFound(asset.to_string()))?;
        let account = custody::decode(&update.data)?;
        Ok(rates::compute_rates(
            &account.assets,
            &account.jump_rate_state,
        ))
    }
}

impl MonitorInner {
    /// Shared update path for the eager initial fetch and live
    /// notifications. The slot guard is held through fan-out so callbacks
    /// observe a non-decreasing slot sequence per asset.
    fn handle_update(&self, asset: AssetKey, data: &[u8], slot: u64) {
        let mut slots = lock_mutex(&self.last_slots);
        if let Some(&last) = slots.get(&asset) {
            if slot <= last {
                debug!(asset = %asset, slot, last, "discarding stale custody update");
                return;
            }
        }

        let account = match custody::decode(data) {
            Ok(account) => account,
            Err(e) => {
                warn!(asset = %asset, slot, error = %e, "dropping undecodable custody update");
                return;
            }
        };
        let snapshot = rates::compute_rates(&account.assets, &account.jump_rate_state);
        slots.insert(asset, slot);

        self.dispatch(asset, &snapshot);
    }

    fn dispatch(&self, asset: AssetKey, snapshot: &RateSnapshot) {
        let callbacks = read_lock(&self.callbacks);
        for (id, callback) in callbacks.iter() {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(asset, snapshot))).is_err() {
                error!(callback_id = *id, asset = %asset, "rate callback panicked");
            }
        }
    }
}

fn lock_mutex<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write_lock<T>(lock: &std::sync::RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
