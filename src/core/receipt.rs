//! Per-transaction receipts.
//!
//! Each executed transaction appends an ordered list of asset movements to
//! the receipt journal, keyed by txid. A `None` endpoint denotes the
//! protocol itself (mint, burn, or system fund flow).

use serde::{Deserialize, Serialize};

use crate::core::account::AccountId;
use crate::core::coin::CoinSymbol;

/// A single audited asset movement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Source account, `None` for protocol issuance
    pub from: Option<AccountId>,
    /// Destination account, `None` for burn / system sink
    pub to: Option<AccountId>,
    /// Moved symbol
    pub coin_symbol: CoinSymbol,
    /// Moved amount, atomic units
    pub amount: u64,
}

impl Receipt {
    /// Create a receipt entry
    pub fn new(
        from: Option<AccountId>,
        to: Option<AccountId>,
        coin_symbol: CoinSymbol,
        amount: u64,
    ) -> Self {
        Self {
            from,
            to,
            coin_symbol,
            amount,
        }
    }
}
