//! # WUSD CDP Engine
//!
//! The deterministic transaction engine of a collateralized-debt-position
//! chain: WUSD stable coins are minted against staked WICC collateral,
//! accrue time-based interest, can be redeemed partially or fully, and are
//! liquidated at tiered discount rates when under-collateralized. A
//! per-block settlement pass force-closes positions below the force ratio
//! against the protocol risk reserve, with WGRT absorbing interest and
//! penalty flow through system DEX orders.
//!
//! ## Architecture
//!
//! - **core**: accounts, coin symbols, CDP records, receipts
//! - **params**: governance-settable system parameters
//! - **oracle**: sliding-window median price view
//! - **dex**: system market-order adapter
//! - **storage**: committed chain state, per-transaction cache overlay with
//!   undo records, persistence backends
//! - **tx**: the transaction processors (stake, redeem, liquidate, block
//!   median settlement)
//!
//! ## Design Principles
//!
//! - Consensus state is integer-only; every rounding point is frozen
//! - Transactions are atomic: execute fully or leave no trace
//! - All iteration orders are deterministic across nodes
//!
//! ## Example
//!
//! ```rust,ignore
//! use wusd_engine::prelude::*;
//!
//! let mut state = ChainState::new();
//! let undo = process_tx(&mut state, &tx, height, index)?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_lifetimes, unused_qualifications)]

pub mod core;
pub mod dex;
pub mod error;
pub mod oracle;
pub mod params;
pub mod storage;
pub mod tx;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::account::{fcoin_genesis_uid, Account, AccountId, BalanceOpType};
    pub use crate::core::cdp::{collateral_ratio, Cdp};
    pub use crate::core::coin::CoinSymbol;
    pub use crate::core::receipt::Receipt;
    pub use crate::dex::{OrderSide, SysOrder, TxCord};
    pub use crate::error::{Error, Result};
    pub use crate::params::{SysParam, SysParamStore};
    pub use crate::storage::cache::TxCache;
    pub use crate::storage::state::{ChainState, StateManager, UndoRecord};
    pub use crate::tx::{
        process_tx, undo_tx, BlockMedianTx, LiquidateTx, RedeemTx, StakeTx, Transaction,
        TxPayload, TxType,
    };
    pub use crate::utils::constants::{COIN, PERCENT_BOOST};
    pub use crate::utils::crypto::{Hash, KeyPair, PublicKey, Signature, TxId};
}

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const ENGINE_NAME: &str = "wusd-engine";
