//! Error taxonomy for the custody monitor

use thiserror::Error;

/// Failures talking to the ledger itself.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("rpc request failed: {0}")]
    Rpc(String),

    #[error("subscription setup failed: {0}")]
    Subscription(String),
}

/// Errors surfaced by the monitor's decode and pull paths.
///
/// Callback panics are deliberately not represented here: they are isolated
/// at the dispatch site and logged, nothing propagates past them.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Buffer too short or structurally invalid. Local to one decode
    /// attempt; the update carrying it is dropped.
    #[error("malformed custody account data: {0}")]
    MalformedAccountData(String),

    /// Asset key outside the tracked table, or no account at the expected
    /// address. A typed result, never a panic.
    #[error("asset not found: {0}")]
    AssetNotFound(String),

    /// Network/connection failure talking to the ledger.
    #[error("ledger transport failure: {0}")]
    Transport(#[from] LedgerError),
}
