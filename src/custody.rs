//! Fixed-layout codec for on-chain custody accounts
//!
//! A custody account is a 202-byte little-endian blob with no padding:
//! three 32-byte identifiers, two single bytes, then thirteen u64 fields.
//! The layout is a stable wire contract with the live ledger; any change to
//! field order or width must be versioned explicitly.

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};

/// Total size of the fixed custody layout: 96 + 1 + 1 + 48 + 24 + 32.
pub const CUSTODY_ACCOUNT_LEN: usize = 202;

/// Aggregate pool counters, in the ledger's native base units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyAssets {
    pub fees_reserves: u64,
    pub owned: u64,
    pub locked: u64,
    pub guaranteed_usd: u64,
    pub global_short_sizes: u64,
    pub global_short_average_prices: u64,
}

/// Funding-rate bookkeeping. Not consumed by the rate model here, but part
/// of the wire contract and preserved on every decode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingRateState {
    pub cumulative_interest_rate: u64,
    pub last_updated: u64,
    pub hourly_funding_dbps: u64,
}

/// Jump-rate curve parameters, pre-scaled by 10^18.
///
/// The `_bps` suffix comes from the on-chain naming and is a misnomer: the
/// fields are whole percentages after the 10^18 unscale, not basis points.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JumpRateState {
    pub min_rate_bps: u64,
    pub max_rate_bps: u64,
    pub target_rate_bps: u64,
    pub target_utilization_rate: u64,
}

/// One decoded custody account snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyAccount {
    pub pool: [u8; 32],
    pub mint: [u8; 32],
    pub token_account: [u8; 32],
    pub decimals: u8,
    pub is_stable: bool,
    pub assets: CustodyAssets,
    pub funding_rate_state: FundingRateState,
    pub jump_rate_state: JumpRateState,
}

struct LayoutReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LayoutReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn id32(&mut self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(&self.buf[self.pos..self.pos + 32]);
        self.pos += 32;
        out
    }

    fn u8(&mut self) -> u8 {
        let value = self.buf[self.pos];
        self.pos += 1;
        value
    }

    fn bool(&mut self) -> bool {
        // Any nonzero byte is true.
        self.u8() != 0
    }

    fn u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(raw)
    }
}

/// Decode a custody account from its raw on-chain bytes.
///
/// Trailing bytes past the fixed layout are ignored; a buffer shorter than
/// [`CUSTODY_ACCOUNT_LEN`] is rejected.
pub fn decode(data: &[u8]) -> Result<CustodyAccount, MonitorError> {
    if data.len() < CUSTODY_ACCOUNT_LEN {
        return Err(MonitorError::MalformedAccountData(format!(
            "custody account needs {} bytes, got {}",
            CUSTODY_ACCOUNT_LEN,
            data.len()
        )));
    }

    let mut reader = LayoutReader::new(data);
    Ok(CustodyAccount {
        pool: reader.id32(),
        mint: reader.id32(),
        token_account: reader.id32(),
        decimals: reader.u8(),
        is_stable: reader.bool(),
        assets: CustodyAssets {
            fees_reserves: reader.u64(),
            owned: reader.u64(),
            locked: reader.u64(),
            guaranteed_usd: reader.u64(),
            global_short_sizes: reader.u64(),
            global_short_average_prices: reader.u64(),
        },
        funding_rate_state: FundingRateState {
            cumulative_interest_rate: reader.u64(),
            last_updated: reader.u64(),
            hourly_funding_dbps: reader.u64(),
        },
        jump_rate_state: JumpRateState {
            min_rate_bps: reader.u64(),
            max_rate_bps: reader.u64(),
            target_rate_bps: reader.u64(),
            target_utilization_rate: reader.u64(),
        },
    })
}

/// Encode a custody account into the fixed 202-byte layout.
///
/// Production read paths never need this; it exists for test fixtures and
/// for exercising the wire contract. `true` is always written as the byte
/// `1`, so encode-then-decode is idempotent.
pub fn encode(account: &CustodyAccount) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CUSTODY_ACCOUNT_LEN);
    buf.extend_from_slice(&account.pool);
    buf.extend_from_slice(&account.mint);
    buf.extend_from_slice(&account.token_account);
    buf.push(account.decimals);
    buf.push(u8::from(account.is_stable));
    for value in [
        account.assets.fees_reserves,
        account.assets.owned,
        account.assets.locked,
        account.assets.guaranteed_usd,
        account.assets.global_short_sizes,
        account.assets.global_short_average_prices,
        account.funding_rate_state.cumulative_interest_rate,
        account.funding_rate_state.last_updated,
        account.funding_rate_state.hourly_funding_dbps,
        account.jump_rate_state.min_rate_bps,
        account.jump_rate_state.max_rate_bps,
        account.jump_rate_state.target_rate_bps,
        account.jump_rate_state.target_utilization_rate,
    ] {
        buf.extend_from_slice(&value.to_le_bytes());
    }
    buf
}
