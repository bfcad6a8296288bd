//! DEX adapter for system market orders.
//!
//! The engine never matches orders itself; it submits protocol-placed market
//! orders (identified by the triggering txid) into the active-order book and
//! the external matcher settles them. Buy orders spend a fixed coin amount,
//! sell orders offer a fixed asset amount.

use serde::{Deserialize, Serialize};

use crate::core::coin::CoinSymbol;
use crate::utils::crypto::TxId;

/// Block coordinate of the transaction that placed an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxCord {
    /// Block height
    pub height: u32,
    /// Index within the block
    pub index: u32,
}

impl TxCord {
    /// Create a coordinate
    pub fn new(height: u32, index: u32) -> Self {
        Self { height, index }
    }
}

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    /// Spend `coin_symbol` to acquire `asset_symbol`
    Buy,
    /// Offer `asset_symbol` in exchange for `coin_symbol`
    Sell,
}

/// Identifier of an active order: the placing txid plus a sequence number,
/// since one transaction may place several system orders.
pub type OrderId = (TxId, u32);

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM ORDER
// ═══════════════════════════════════════════════════════════════════════════════

/// A protocol-placed market order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysOrder {
    /// Direction
    pub side: OrderSide,
    /// Quote symbol (spent on buys, received on sells)
    pub coin_symbol: CoinSymbol,
    /// Asset symbol (received on buys, sold on sells)
    pub asset_symbol: CoinSymbol,
    /// Spent coin amount for buys, offered asset amount for sells
    pub amount: u64,
    /// Coordinate of the placing transaction
    pub tx_cord: TxCord,
}

impl SysOrder {
    /// Market buy: spend `coin_amount` of `coin_symbol` for `asset_symbol`
    pub fn buy_market(
        tx_cord: TxCord,
        coin_symbol: CoinSymbol,
        asset_symbol: CoinSymbol,
        coin_amount: u64,
    ) -> Self {
        Self {
            side: OrderSide::Buy,
            coin_symbol,
            asset_symbol,
            amount: coin_amount,
            tx_cord,
        }
    }

    /// Market sell: offer `asset_amount` of `asset_symbol` for `coin_symbol`
    pub fn sell_market(
        tx_cord: TxCord,
        coin_symbol: CoinSymbol,
        asset_symbol: CoinSymbol,
        asset_amount: u64,
    ) -> Self {
        Self {
            side: OrderSide::Sell,
            coin_symbol,
            asset_symbol,
            amount: asset_amount,
            tx_cord,
        }
    }
}
