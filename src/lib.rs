//! Custody account monitor
//!
//! Watches the custody accounts of a perpetuals deployment, decodes their
//! fixed binary layout, and derives borrow rates from the jump-rate model.
//! Offers live per-asset rate updates (push) and one-shot queries (pull).

pub mod assets;
pub mod config;
pub mod custody;
pub mod error;
pub mod ledger;
pub mod monitor;
pub mod rates;

// Re-export commonly used types
pub use assets::AssetKey;
pub use config::{Config, ConfigError};
pub use custody::{CustodyAccount, CUSTODY_ACCOUNT_LEN};
pub use error::{LedgerError, MonitorError};
pub use ledger::{
    AccountChangeHandler, AccountUpdate, LedgerClient, SolanaLedgerClient, SubscriptionHandle,
};
pub use monitor::{CallbackId, CustodyMonitor};
pub use rates::{compute_rates, JumpRateCurve, RateSnapshot};
