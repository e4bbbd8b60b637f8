//! Ledger client seam
//!
//! The monitor only needs three ledger operations: a one-shot account read,
//! an account-change subscription, and its release. `LedgerClient` keeps
//! that surface mockable; `SolanaLedgerClient` is the production binding.

use crate::error::LedgerError;
use async_trait::async_trait;
use futures::StreamExt;
use solana_account_decoder::UiAccountEncoding;
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcAccountInfoConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Raw account bytes plus the slot of the read or notification that
/// produced them, so every update participates in slot-based dedup.
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub data: Vec<u8>,
    pub slot: u64,
}

/// Invoked with `(raw account data, slot)` for every change notification.
pub type AccountChangeHandler = Box<dyn Fn(Vec<u8>, u64) + Send + Sync>;

/// Opaque handle for one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Read the account at `address`, if it exists. Transport failures are
    /// errors; a missing account is `Ok(None)`.
    async fn read_account(&self, address: &Pubkey) -> Result<Option<AccountUpdate>, LedgerError>;

    /// Open a live subscription to changes of the account at `address`.
    async fn subscribe(
        &self,
        address: &Pubkey,
        handler: AccountChangeHandler,
    ) -> Result<SubscriptionHandle, LedgerError>;

    /// Release a subscription. Unknown or already-released handles are
    /// tolerated, not errors.
    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), LedgerError>;
}

struct ActiveSubscription {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// Solana-backed ledger client: nonblocking RPC for reads, one websocket
/// pubsub task per subscription.
pub struct SolanaLedgerClient {
    rpc: Arc<RpcClient>,
    ws_url: String,
    commitment: CommitmentConfig,
    subscriptions: Mutex<HashMap<u64, ActiveSubscription>>,
    next_id: AtomicU64,
}

impl SolanaLedgerClient {
    pub fn new(rpc_url: String, ws_url: String, commitment: CommitmentConfig) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new_with_commitment(rpc_url, commitment)),
            ws_url,
            commitment,
            subscriptions: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    async fn read_account(&self, address: &Pubkey) -> Result<Option<AccountUpdate>, LedgerError> {
        let response = self
            .rpc
            .get_account_with_commitment(address, self.commitment)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;
        Ok(response.value.map(|account| AccountUpdate {
            data: account.data,
            slot: response.context.slot,
        }))
    }

    async fn subscribe(
        &self,
        address: &Pubkey,
        handler: AccountChangeHandler,
    ) -> Result<SubscriptionHandle, LedgerError> {
        let pubsub = PubsubClient::new(&self.ws_url)
            .await
            .map_err(|e| LedgerError::Subscription(e.to_string()))?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_subscription(
            pubsub,
            *address,
            self.commitment,
            handler,
            shutdown_rx,
        ));

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscriptions
            .lock()
            .await
            .insert(id, ActiveSubscription { shutdown: shutdown_tx, task });
        debug!(%address, subscription = id, "account subscription opened");
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), LedgerError> {
        let Some(active) = self.subscriptions.lock().await.remove(&handle.0) else {
            debug!(subscription = handle.0, "ignoring unknown subscription handle");
            return Ok(());
        };
        // The task may already have exited on its own; both are fine.
        let _ = active.shutdown.send(());
        if let Err(e) = active.task.await {
            warn!(subscription = handle.0, error = %e, "subscription task ended abnormally");
        }
        Ok(())
    }
}

async fn run_subscription(
    pubsub: PubsubClient,
    address: Pubkey,
    commitment: CommitmentConfig,
    handler: AccountChangeHandler,
    mut shutdown: oneshot::Receiver<()>,
) {
    let config = RpcAccountInfoConfig {
        encoding: Some(UiAccountEncoding::Base64),
        data_slice: None,
        commitment: Some(commitment),
        min_context_slot: None,
    };
    let (mut updates, unsubscribe) = match pubsub.account_subscribe(&address, Some(config)).await {
        Ok(subscription) => subscription,
        Err(e) => {
            error!(%address, error = %e, "account subscription failed");
            return;
        }
    };

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            update = updates.next() => {
                let Some(update) = update else {
                    warn!(%address, "account subscription stream ended");
                    break;
                };
                let slot = update.context.slot;
                match update.value.data.decode() {
                    Some(data) => handler(data, slot),
                    None => warn!(%address, slot, "undecodable account update payload"),
                }
            }
        }
    }

    unsubscribe().await;
    debug!(%address, "account subscription released");
}
