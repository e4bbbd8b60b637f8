//! Monitor lifecycle tests against an in-process mock ledger

use async_trait::async_trait;
use custody_monitor::custody::{self, CustodyAccount, CustodyAssets, FundingRateState, JumpRateState};
use custody_monitor::{
    AccountChangeHandler, AccountUpdate, AssetKey, CustodyMonitor, LedgerClient, LedgerError,
    MonitorError, SubscriptionHandle,
};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MockLedger {
    accounts: Mutex<HashMap<Pubkey, AccountUpdate>>,
    read_failures: Mutex<HashSet<Pubkey>>,
    subscribe_failures: Mutex<HashSet<Pubkey>>,
    handlers: Mutex<HashMap<u64, (Pubkey, AccountChangeHandler)>>,
    released: Mutex<Vec<u64>>,
    subscribe_calls: AtomicUsize,
    next_id: AtomicU64,
}

impl MockLedger {
    fn set_account(&self, address: Pubkey, data: Vec<u8>, slot: u64) {
        self.accounts
            .lock()
            .unwrap()
            .insert(address, AccountUpdate { data, slot });
    }

    fn fail_reads(&self, address: Pubkey) {
        self.read_failures.lock().unwrap().insert(address);
    }

    fn fail_subscribes(&self, address: Pubkey) {
        self.subscribe_failures.lock().unwrap().insert(address);
    }

    /// Fire a change notification at every live subscription for `address`.
    fn notify(&self, address: &Pubkey, data: Vec<u8>, slot: u64) {
        let handlers = self.handlers.lock().unwrap();
        for (subscribed, handler) in handlers.values() {
            if subscribed == address {
                handler(data.clone(), slot);
            }
        }
    }

    fn active_subscriptions(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn read_account(&self, address: &Pubkey) -> Result<Option<AccountUpdate>, LedgerError> {
        if self.read_failures.lock().unwrap().contains(address) {
            return Err(LedgerError::Rpc("connection refused".to_string()));
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn subscribe(
        &self,
        address: &Pubkey,
        handler: AccountChangeHandler,
    ) -> Result<SubscriptionHandle, LedgerError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if self.subscribe_failures.lock().unwrap().contains(address) {
            return Err(LedgerError::Subscription("websocket refused".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().insert(id, (*address, handler));
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), LedgerError> {
        self.handlers.lock().unwrap().remove(&handle.0);
        self.released.lock().unwrap().push(handle.0);
        Ok(())
    }
}

fn custody_bytes(owned: u64, locked: u64) -> Vec<u8> {
    custody::encode(&CustodyAccount {
        pool: [1u8; 32],
        mint: [2u8; 32],
        token_account: [3u8; 32],
        decimals: 9,
        is_stable: false,
        assets: CustodyAssets {
            fees_reserves: 0,
            owned,
            locked,
            guaranteed_usd: 0,
            global_short_sizes: 0,
            global_short_average_prices: 0,
        },
        funding_rate_state: FundingRateState::default(),
        jump_rate_state: JumpRateState {
            min_rate_bps: 1_000_000_000_000_000_000,
            max_rate_bps: 5_000_000_000_000_000_000,
            target_rate_bps: 2_000_000_000_000_000_000,
            target_utilization_rate: 800_000_000_000_000_000,
        },
    })
}

fn single_asset_setup() -> (Arc<MockLedger>, CustodyMonitor, Pubkey) {
    let ledger = Arc::new(MockLedger::default());
    let address = Pubkey::new_unique();
    let mut assets = BTreeMap::new();
    assets.insert(AssetKey::Sol, address);
    let monitor = CustodyMonitor::new(ledger.clone(), assets);
    (ledger, monitor, address)
}

#[tokio::test]
async fn stale_and_duplicate_slots_are_discarded() {
    let (ledger, monitor, address) = single_asset_setup();
    ledger.set_account(address, custody_bytes(200, 50), 1);

    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = deliveries.clone();
    monitor.on_rate_update(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start().await;
    // Initial eager fetch at slot 1.
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);

    ledger.notify(&address, custody_bytes(200, 100), 5);
    assert_eq!(deliveries.load(Ordering::SeqCst), 2);

    // Out-of-order and duplicate redeliveries must be suppressed.
    ledger.notify(&address, custody_bytes(200, 60), 3);
    ledger.notify(&address, custody_bytes(200, 100), 5);
    assert_eq!(deliveries.load(Ordering::SeqCst), 2);

    ledger.notify(&address, custody_bytes(200, 150), 6);
    assert_eq!(deliveries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn undecodable_notification_is_dropped_without_advancing_slot() {
    let (ledger, monitor, address) = single_asset_setup();

    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = deliveries.clone();
    monitor.on_rate_update(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start().await;
    ledger.notify(&address, vec![0u8; 10], 5);
    assert_eq!(deliveries.load(Ordering::SeqCst), 0);

    // The bad update at slot 5 must not have consumed the slot.
    ledger.notify(&address, custody_bytes(200, 50), 5);
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn start_is_idempotent() {
    let ledger = Arc::new(MockLedger::default());
    let mut assets = BTreeMap::new();
    for asset in [AssetKey::Sol, AssetKey::Eth, AssetKey::Usdc] {
        assets.insert(asset, Pubkey::new_unique());
    }
    let monitor = CustodyMonitor::new(ledger.clone(), assets);

    monitor.start().await;
    monitor.start().await;

    assert_eq!(ledger.subscribe_calls.load(Ordering::SeqCst), 3);
    assert_eq!(ledger.active_subscriptions(), 3);
}

#[tokio::test]
async fn stop_is_idempotent_and_releases_every_handle() {
    let ledger = Arc::new(MockLedger::default());
    let mut assets = BTreeMap::new();
    for asset in [AssetKey::Sol, AssetKey::Eth, AssetKey::Usdc] {
        assets.insert(asset, Pubkey::new_unique());
    }
    let monitor = CustodyMonitor::new(ledger.clone(), assets);

    monitor.stop().await; // stopping a stopped monitor is a no-op

    monitor.start().await;
    monitor.stop().await;
    monitor.stop().await;

    assert_eq!(ledger.released.lock().unwrap().len(), 3);
    assert_eq!(ledger.active_subscriptions(), 0);
}

#[tokio::test]
async fn restart_after_stop_resubscribes() {
    let (ledger, monitor, address) = single_asset_setup();
    ledger.set_account(address, custody_bytes(200, 50), 1);

    monitor.start().await;
    monitor.stop().await;
    monitor.start().await;

    assert_eq!(ledger.subscribe_calls.load(Ordering::SeqCst), 2);
    assert_eq!(ledger.active_subscriptions(), 1);
}

#[tokio::test]
async fn one_asset_failing_does_not_abort_the_others() {
    let ledger = Arc::new(MockLedger::default());
    let (sol, eth, wbtc) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
    let mut assets = BTreeMap::new();
    assets.insert(AssetKey::Sol, sol);
    assets.insert(AssetKey::Eth, eth);
    assets.insert(AssetKey::Wbtc, wbtc);

    ledger.set_account(sol, custody_bytes(200, 50), 1);
    ledger.set_account(wbtc, custody_bytes(400, 100), 1);
    ledger.fail_reads(eth); // initial fetch for ETH fails

    let monitor = CustodyMonitor::new(ledger.clone(), assets);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.on_rate_update(move |asset, _| {
        sink.lock().unwrap().push(asset);
    });

    monitor.start().await;

    let initial = seen.lock().unwrap().clone();
    assert!(initial.contains(&AssetKey::Sol));
    assert!(initial.contains(&AssetKey::Wbtc));
    assert!(!initial.contains(&AssetKey::Eth));

    // ETH's subscription itself survived its failed fetch.
    ledger.notify(&eth, custody_bytes(100, 10), 7);
    assert!(seen.lock().unwrap().contains(&AssetKey::Eth));
}

#[tokio::test]
async fn failed_subscription_does_not_abort_the_others() {
    let ledger = Arc::new(MockLedger::default());
    let (sol, eth) = (Pubkey::new_unique(), Pubkey::new_unique());
    let mut assets = BTreeMap::new();
    assets.insert(AssetKey::Sol, sol);
    assets.insert(AssetKey::Eth, eth);

    ledger.set_account(sol, custody_bytes(200, 50), 1);
    ledger.set_account(eth, custody_bytes(100, 10), 1);
    ledger.fail_subscribes(sol);

    let monitor = CustodyMonitor::new(ledger.clone(), assets);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    monitor.on_rate_update(move |asset, _| {
        sink.lock().unwrap().push(asset);
    });

    monitor.start().await;

    assert_eq!(ledger.active_subscriptions(), 1);
    assert!(seen.lock().unwrap().contains(&AssetKey::Eth));
}

#[tokio::test]
async fn pull_path_separates_not_found_from_transport() {
    let ledger = Arc::new(MockLedger::default());
    let sol = Pubkey::new_unique();
    let mut assets = BTreeMap::new();
    assets.insert(AssetKey::Sol, sol);
    let monitor = CustodyMonitor::new(ledger.clone(), assets);

    // Untracked asset key.
    assert!(matches!(
        monitor.get_current_rates(AssetKey::Usdc).await,
        Err(MonitorError::AssetNotFound(_))
    ));

    // Tracked key, no account on the ledger.
    assert!(matches!(
        monitor.get_current_rates(AssetKey::Sol).await,
        Err(MonitorError::AssetNotFound(_))
    ));

    // Simulated network failure is a transport error, not "not found".
    ledger.fail_reads(sol);
    assert!(matches!(
        monitor.get_current_rates(AssetKey::Sol).await,
        Err(MonitorError::Transport(_))
    ));
}

#[tokio::test]
async fn pull_path_returns_computed_rates() {
    let (ledger, monitor, address) = single_asset_setup();
    ledger.set_account(address, custody_bytes(200, 50), 9);

    let snapshot = monitor.get_current_rates(AssetKey::Sol).await.unwrap();
    assert_eq!(snapshot.utilization, Decimal::from(25));
    assert_eq!(
        snapshot.hourly_rate,
        snapshot.annual_rate / Decimal::from(8_760)
    );
}

#[tokio::test]
async fn panicking_callback_does_not_starve_the_others() {
    let (ledger, monitor, address) = single_asset_setup();

    monitor.on_rate_update(|_, _| panic!("subscriber bug"));
    let deliveries = Arc::new(AtomicUsize::new(0));
    let counter = deliveries.clone();
    monitor.on_rate_update(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start().await;
    ledger.notify(&address, custody_bytes(200, 50), 2);
    assert_eq!(deliveries.load(Ordering::SeqCst), 1);

    // Processing keeps going on later notifications too.
    ledger.notify(&address, custody_bytes(200, 60), 3);
    assert_eq!(deliveries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn removing_a_callback_only_removes_that_one() {
    let (ledger, monitor, address) = single_asset_setup();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));
    let first_counter = first.clone();
    let second_counter = second.clone();
    let first_id = monitor.on_rate_update(move |_, _| {
        first_counter.fetch_add(1, Ordering::SeqCst);
    });
    monitor.on_rate_update(move |_, _| {
        second_counter.fetch_add(1, Ordering::SeqCst);
    });

    monitor.start().await;
    monitor.remove_rate_callback(first_id);

    ledger.notify(&address, custody_bytes(200, 50), 2);
    assert_eq!(first.load(Ordering::SeqCst), 0);
    assert_eq!(second.load(Ordering::SeqCst), 1);
}
