//! Token symbols and the registered CDP coin-pair set.

use serde::{Deserialize, Serialize};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════════════
// COIN SYMBOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Token symbols recognized by the engine.
///
/// WICC is the volatile base collateral (B-coin), WUSD the stable asset
/// minted against it (S-coin), WGRT the governance/absorption asset burned by
/// system buy orders (F-coin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CoinSymbol {
    /// Base collateral coin
    Wicc,
    /// Stable coin
    Wusd,
    /// Governance coin
    Wgrt,
}

impl CoinSymbol {
    /// Canonical ticker string
    pub fn as_str(&self) -> &'static str {
        match self {
            CoinSymbol::Wicc => "WICC",
            CoinSymbol::Wusd => "WUSD",
            CoinSymbol::Wgrt => "WGRT",
        }
    }
}

impl fmt::Display for CoinSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REGISTERED PAIRS
// ═══════════════════════════════════════════════════════════════════════════════

/// The static set of (bcoin, scoin) pairs permitted for CDPs
pub const CDP_COIN_PAIRS: &[(CoinSymbol, CoinSymbol)] = &[(CoinSymbol::Wicc, CoinSymbol::Wusd)];

/// Symbols accepted for paying transaction fees
pub const FEE_SYMBOLS: &[CoinSymbol] = &[CoinSymbol::Wicc, CoinSymbol::Wusd];

/// Whether the (bcoin, scoin) pair is registered for CDPs
pub fn is_cdp_coin_pair(bcoin: CoinSymbol, scoin: CoinSymbol) -> bool {
    CDP_COIN_PAIRS.contains(&(bcoin, scoin))
}

/// Whether the symbol may pay transaction fees
pub fn is_fee_symbol(symbol: CoinSymbol) -> bool {
    FEE_SYMBOLS.contains(&symbol)
}
