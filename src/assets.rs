//! Fixed table of tradable assets with custody accounts

use crate::error::MonitorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Keys for the custody accounts tracked by the monitor: four crypto assets
/// and one stable, matching the reference deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetKey {
    Sol,
    Eth,
    Wbtc,
    Jup,
    Usdc,
}

impl AssetKey {
    pub const ALL: [AssetKey; 5] = [
        AssetKey::Sol,
        AssetKey::Eth,
        AssetKey::Wbtc,
        AssetKey::Jup,
        AssetKey::Usdc,
    ];

    pub fn ticker(&self) -> &'static str {
        match self {
            AssetKey::Sol => "SOL",
            AssetKey::Eth => "ETH",
            AssetKey::Wbtc => "WBTC",
            AssetKey::Jup => "JUP",
            AssetKey::Usdc => "USDC",
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ticker())
    }
}

impl FromStr for AssetKey {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SOL" => Ok(AssetKey::Sol),
            "ETH" => Ok(AssetKey::Eth),
            "WBTC" => Ok(AssetKey::Wbtc),
            "JUP" => Ok(AssetKey::Jup),
            "USDC" => Ok(AssetKey::Usdc),
            other => Err(MonitorError::AssetNotFound(other.to_string())),
        }
    }
}
