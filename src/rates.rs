//! Jump-rate borrow model
//!
//! Utilization is `locked / owned` as a percentage; the annual rate follows a
//! piecewise-linear curve with a kink at the target utilization. Everything
//! is computed in `Decimal` so u64-sized counters never lose precision.

use crate::assets::AssetKey;
use crate::custody::{CustodyAssets, JumpRateState};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// On-chain jump-rate fields are pre-scaled by 10^18.
static RATE_SCALE: Lazy<Decimal> = Lazy::new(|| Decimal::from(1_000_000_000_000_000_000u64));

/// 365 * 24.
static HOURS_PER_YEAR: Lazy<Decimal> = Lazy::new(|| Decimal::from(8_760u32));

/// The above-target slope is deliberately damped to half of the naive
/// linear continuation.
static EXCESS_DAMPING: Lazy<Decimal> = Lazy::new(|| Decimal::new(5, 1));

/// Derived rate figures for one custody snapshot. Created fresh on every
/// successful decode, never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    /// Pool utilization as a percentage in [0, 100] (locked <= owned).
    pub utilization: Decimal,
    /// Annualized borrow rate, as a percentage.
    pub annual_rate: Decimal,
    /// Hourly borrow rate: annual / 8760.
    pub hourly_rate: Decimal,
    /// Wall-clock capture time.
    pub timestamp: DateTime<Utc>,
}

/// A jump-rate curve in unscaled percentage terms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JumpRateCurve {
    pub min_rate: Decimal,
    pub max_rate: Decimal,
    pub target_rate: Decimal,
    pub target_utilization: Decimal,
}

impl JumpRateCurve {
    /// Unscale the raw on-chain fields by 10^18. The target utilization is
    /// additionally expressed as a percentage. Despite the `_bps` field
    /// names this is never a basis-points conversion.
    pub fn from_raw(raw: &JumpRateState) -> Self {
        Self {
            min_rate: Decimal::from(raw.min_rate_bps) / *RATE_SCALE,
            max_rate: Decimal::from(raw.max_rate_bps) / *RATE_SCALE,
            target_rate: Decimal::from(raw.target_rate_bps) / *RATE_SCALE,
            target_utilization: Decimal::from(raw.target_utilization_rate) / *RATE_SCALE
                * Decimal::ONE_HUNDRED,
        }
    }

    /// Annual rate for a utilization percentage.
    pub fn annual_rate(&self, utilization: Decimal) -> Decimal {
        // An uninitialized curve pins the rate to the floor.
        if self.max_rate.is_zero() || self.target_rate.is_zero() {
            return self.min_rate;
        }

        // A zero target puts any utilization on the above-target branch.
        if !self.target_utilization.is_zero() && utilization <= self.target_utilization {
            return self.min_rate
                + (self.target_rate - self.min_rate) * utilization / self.target_utilization;
        }

        let headroom = Decimal::ONE_HUNDRED - self.target_utilization;
        let excess = if headroom <= Decimal::ZERO {
            Decimal::ONE
        } else {
            ((utilization - self.target_utilization) / headroom).min(Decimal::ONE)
        };
        self.target_rate + (self.max_rate - self.target_rate) * excess * *EXCESS_DAMPING
    }
}

/// `locked * 100 / owned` at full precision; zero by convention when the
/// pool owns nothing.
pub fn utilization(assets: &CustodyAssets) -> Decimal {
    if assets.owned == 0 {
        return Decimal::ZERO;
    }
    Decimal::from(assets.locked) * Decimal::ONE_HUNDRED / Decimal::from(assets.owned)
}

/// Derive the full rate snapshot from decoded custody state.
pub fn compute_rates(assets: &CustodyAssets, jump_rate_state: &JumpRateState) -> RateSnapshot {
    let utilization = utilization(assets);
    let annual_rate = JumpRateCurve::from_raw(jump_rate_state).annual_rate(utilization);
    RateSnapshot {
        utilization,
        annual_rate,
        hourly_rate: annual_rate / *HOURS_PER_YEAR,
        timestamp: Utc::now(),
    }
}

/// Callback signature for rate fan-out.
pub type RateCallback = Box<dyn Fn(AssetKey, &RateSnapshot) + Send + Sync>;
