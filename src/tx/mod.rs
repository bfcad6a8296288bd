//! Transaction envelope, dispatch, and block-level processing.
//!
//! Every transaction variant is a payload in a tagged sum with a uniform
//! surface: CheckTx validates against a read-only cache view, ExecuteTx
//! mutates a per-transaction cache, and the block processor commits the
//! resulting delta atomically, collecting undo records for reorgs.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::core::account::{Account, AccountId};
use crate::core::cdp::Cdp;
use crate::core::coin::{is_fee_symbol, CoinSymbol};
use crate::dex::{SysOrder, TxCord};
use crate::error::{Error, Result};
use crate::params::SysParam;
use crate::storage::cache::TxCache;
use crate::storage::state::{ChainState, UndoRecord};
use crate::utils::constants::{BLOCKS_PER_DAY, MIN_TX_FEE, TX_VALID_HEIGHT_WINDOW};
use crate::utils::crypto::{Hash, KeyPair, Signature, TxId};
use crate::utils::math::cdp_interest;

pub mod liquidate;
pub mod price_median;
pub mod redeem;
pub mod stake;

pub use liquidate::LiquidateTx;
pub use price_median::BlockMedianTx;
pub use redeem::RedeemTx;
pub use stake::StakeTx;

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Wire discriminants of the supported transaction types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    /// Stake collateral / mint stable coins
    CdpStake,
    /// Repay stable coins / redeem collateral
    CdpRedeem,
    /// Third-party liquidation
    CdpLiquidate,
    /// Per-block median-price force settlement
    BlockPriceMedian,
}

impl TxType {
    /// Wire discriminant
    pub fn code(&self) -> u8 {
        match self {
            TxType::CdpStake => 21,
            TxType::CdpRedeem => 22,
            TxType::CdpLiquidate => 23,
            TxType::BlockPriceMedian => 24,
        }
    }

    /// Human-readable name
    pub fn as_str(&self) -> &'static str {
        match self {
            TxType::CdpStake => "CDP_STAKE_TX",
            TxType::CdpRedeem => "CDP_REDEEM_TX",
            TxType::CdpLiquidate => "CDP_LIQUIDATE_TX",
            TxType::BlockPriceMedian => "BLOCK_PRICE_MEDIAN_TX",
        }
    }
}

/// Payloads of the supported transaction types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxPayload {
    /// Stake / mint
    Stake(StakeTx),
    /// Repay / redeem
    Redeem(RedeemTx),
    /// Third-party liquidation
    Liquidate(LiquidateTx),
    /// Block median settlement
    BlockMedian(BlockMedianTx),
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION ENVELOPE
// ═══════════════════════════════════════════════════════════════════════════════

/// A signed transaction.
///
/// Wire form: `tx_type | version | valid_height | txuid | fee_symbol | fees |
/// payload`, with the signature covering all preceding fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Wire format version
    pub version: u32,
    /// Height the transaction was built against
    pub valid_height: u32,
    /// Signing account
    pub txuid: AccountId,
    /// Fee symbol
    pub fee_symbol: CoinSymbol,
    /// Fee amount, atomic units of the fee symbol
    pub fees: u64,
    /// Type-specific payload
    pub payload: TxPayload,
    /// Signature over the sighash
    pub signature: Signature,
}

impl Transaction {
    /// Current wire version
    pub const VERSION: u32 = 1;

    /// Build an unsigned transaction
    pub fn new(
        valid_height: u32,
        txuid: AccountId,
        fee_symbol: CoinSymbol,
        fees: u64,
        payload: TxPayload,
    ) -> Self {
        Self {
            version: Self::VERSION,
            valid_height,
            txuid,
            fee_symbol,
            fees,
            payload,
            signature: Signature::default(),
        }
    }

    /// The payload's transaction type
    pub fn tx_type(&self) -> TxType {
        match &self.payload {
            TxPayload::Stake(_) => TxType::CdpStake,
            TxPayload::Redeem(_) => TxType::CdpRedeem,
            TxPayload::Liquidate(_) => TxType::CdpLiquidate,
            TxPayload::BlockMedian(_) => TxType::BlockPriceMedian,
        }
    }

    /// Digest covered by the signature: every wire field except the
    /// signature itself.
    pub fn sighash(&self) -> Hash {
        let fields = (
            self.tx_type().code(),
            self.version,
            self.valid_height,
            &self.txuid,
            self.fee_symbol,
            self.fees,
            &self.payload,
        );
        let bytes = bincode::serialize(&fields).expect("sighash serialization cannot fail");
        Hash::sha256(&bytes)
    }

    /// Transaction id: digest of the full signed encoding
    pub fn txid(&self) -> TxId {
        let bytes = bincode::serialize(self).expect("txid serialization cannot fail");
        TxId::from(Hash::sha256(&bytes))
    }

    /// Sign in place
    pub fn sign(&mut self, keypair: &KeyPair) {
        self.signature = keypair.sign(&self.sighash());
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CHECK / EXECUTE
    // ═══════════════════════════════════════════════════════════════════════════

    /// CheckTx: stateless-ish validation plus the global guards.
    ///
    /// Rejections carry the reason string and DoS score surfaced to block
    /// validation.
    pub fn check(&self, height: u32, cache: &TxCache<'_>) -> Result<()> {
        self.check_valid_height(height)?;

        // the block-median tx is protocol-driven and pays no fee
        if !matches!(self.payload, TxPayload::BlockMedian(_)) {
            if !is_fee_symbol(self.fee_symbol) {
                return Err(Error::InvalidFeeSymbol(self.fee_symbol));
            }
            if self.fees < MIN_TX_FEE {
                return Err(Error::FeeTooSmall {
                    got: self.fees,
                    min: MIN_TX_FEE,
                });
            }
        }

        match &self.payload {
            TxPayload::Stake(tx) => tx.check(self, height, cache)?,
            TxPayload::Redeem(tx) => tx.check(self, height, cache)?,
            TxPayload::Liquidate(tx) => tx.check(self, height, cache)?,
            TxPayload::BlockMedian(tx) => tx.check(self, height, cache)?,
        }

        let account = cache.account(&self.txuid)?;
        if !account.owner.verify(&self.sighash(), &self.signature) {
            return Err(Error::InvalidSignature);
        }
        Ok(())
    }

    /// ExecuteTx: apply the transaction against the cache overlay. Any error
    /// aborts the transaction; the caller discards the cache.
    pub fn execute(&self, height: u32, index: u32, cache: &mut TxCache<'_>) -> Result<()> {
        let ctx = TxContext {
            txid: self.txid(),
            txuid: self.txuid,
            fee_symbol: self.fee_symbol,
            fees: self.fees,
            height,
            index,
        };
        match &self.payload {
            TxPayload::Stake(tx) => tx.execute(&ctx, cache),
            TxPayload::Redeem(tx) => tx.execute(&ctx, cache),
            TxPayload::Liquidate(tx) => tx.execute(&ctx, cache),
            TxPayload::BlockMedian(tx) => tx.execute(&ctx, cache),
        }
    }

    fn check_valid_height(&self, height: u32) -> Result<()> {
        let lo = self.valid_height.saturating_sub(TX_VALID_HEIGHT_WINDOW);
        let hi = self.valid_height.saturating_add(TX_VALID_HEIGHT_WINDOW);
        if height < lo || height > hi {
            return Err(Error::InvalidValidHeight {
                valid_height: self.valid_height,
                height,
            });
        }
        Ok(())
    }

    /// JSON rendering for RPC and debugging
    pub fn to_json(&self) -> serde_json::Value {
        let mut value = serde_json::json!({
            "hash": self.txid().to_hex(),
            "tx_type": self.tx_type().as_str(),
            "ver": self.version,
            "valid_height": self.valid_height,
            "tx_uid": self.txuid.to_hex(),
            "fee_symbol": self.fee_symbol.as_str(),
            "fees": self.fees,
        });
        let obj = value.as_object_mut().expect("json object");
        match &self.payload {
            TxPayload::Stake(tx) => {
                obj.insert(
                    "cdp_txid".into(),
                    serde_json::json!(tx.cdp_txid.map(|id| id.to_hex()).unwrap_or_default()),
                );
                obj.insert("bcoin_symbol".into(), serde_json::json!(tx.bcoin_symbol.as_str()));
                obj.insert("scoin_symbol".into(), serde_json::json!(tx.scoin_symbol.as_str()));
                obj.insert("bcoins_to_stake".into(), serde_json::json!(tx.bcoins_to_stake));
                obj.insert("scoins_to_mint".into(), serde_json::json!(tx.scoins_to_mint));
            }
            TxPayload::Redeem(tx) => {
                obj.insert("cdp_txid".into(), serde_json::json!(tx.cdp_txid.to_hex()));
                obj.insert("scoins_to_repay".into(), serde_json::json!(tx.scoins_to_repay));
                obj.insert("bcoins_to_redeem".into(), serde_json::json!(tx.bcoins_to_redeem));
            }
            TxPayload::Liquidate(tx) => {
                obj.insert("cdp_txid".into(), serde_json::json!(tx.cdp_txid.to_hex()));
                obj.insert(
                    "scoins_to_liquidate".into(),
                    serde_json::json!(tx.scoins_to_liquidate),
                );
            }
            TxPayload::BlockMedian(tx) => {
                let points: Vec<serde_json::Value> = tx
                    .median_price_points
                    .iter()
                    .map(|(symbol, price)| {
                        serde_json::json!({ "coin_type": symbol.as_str(), "price": price })
                    })
                    .collect();
                obj.insert("median_price_points".into(), serde_json::json!(points));
            }
        }
        value
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "txType={}, hash={}, ver={}, txUid={}, fee_symbol={}, llFees={}",
            self.tx_type().as_str(),
            self.txid().short(),
            self.version,
            self.txuid.to_hex(),
            self.fee_symbol,
            self.fees
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXECUTION CONTEXT & SHARED HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Envelope fields handed to payload executors
pub struct TxContext {
    /// Id of the executing transaction
    pub txid: TxId,
    /// Signing account
    pub txuid: AccountId,
    /// Fee symbol
    pub fee_symbol: CoinSymbol,
    /// Fee amount
    pub fees: u64,
    /// Execution height
    pub height: u32,
    /// Index within the block
    pub index: u32,
}

impl TxContext {
    /// Block coordinate for DEX orders
    pub fn cord(&self) -> TxCord {
        TxCord::new(self.height, self.index)
    }
}

/// Interest accrued on a CDP's owed total since its anchor height.
///
/// Days are charged in ceiling units of whole days, so a CDP touched twice in
/// one block accrues nothing the second time.
pub fn compute_cdp_interest(height: u32, cdp: &Cdp, cache: &TxCache<'_>) -> Result<u64> {
    if cdp.total_owed_scoins == 0 {
        return Ok(0);
    }
    if height < cdp.block_height {
        return Err(Error::HeightError {
            height,
            cdp_height: cdp.block_height,
        });
    }
    let loaned_days = (height - cdp.block_height).div_ceil(BLOCKS_PER_DAY);
    let param_a = cache.param(SysParam::CdpInterestParamA)?;
    let param_b = cache.param(SysParam::CdpInterestParamB)?;
    let interest = cdp_interest(cdp.total_owed_scoins, loaned_days, param_a, param_b)?;

    debug!(
        cdpid = %cdp.cdpid.short(),
        height,
        anchor = cdp.block_height,
        loaned_days,
        owed = cdp.total_owed_scoins,
        interest,
        "computed CDP interest"
    );
    Ok(interest)
}

/// Settle accrued interest: the owner pays S-coins from the free balance and
/// a system buy order converts them to F-coins, which the sink burns.
pub(crate) fn settle_interest(
    ctx: &TxContext,
    cache: &mut TxCache<'_>,
    account: &mut Account,
    cdp: &Cdp,
    interest_scoins: u64,
) -> Result<()> {
    if interest_scoins == 0 {
        return Ok(());
    }
    let free = account.free_amount(cdp.scoin_symbol);
    if free < interest_scoins {
        return Err(Error::InterestInsufficient {
            required: interest_scoins,
            available: free,
        });
    }
    cache.create_sys_order(
        ctx.txid,
        SysOrder::buy_market(
            ctx.cord(),
            cdp.scoin_symbol,
            CoinSymbol::Wgrt,
            interest_scoins,
        ),
    )?;
    account.operate_balance(cdp.scoin_symbol, crate::core::account::BalanceOpType::SubFree, interest_scoins)
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK-LEVEL PROCESSING
// ═══════════════════════════════════════════════════════════════════════════════

/// Check, execute and atomically commit one transaction, returning the undo
/// record for reorg handling. On any error the buffered mutations are
/// discarded and the committed state is untouched.
pub fn process_tx(
    state: &mut ChainState,
    tx: &Transaction,
    height: u32,
    index: u32,
) -> Result<UndoRecord> {
    tx.check(height, &TxCache::new(state))?;

    let mut cache = TxCache::new(state);
    tx.execute(height, index, &mut cache)?;
    let delta = cache.into_delta();
    Ok(state.apply_delta(delta))
}

/// Undo a previously committed transaction (reorg path). Records must be
/// replayed in the reverse of their commit order.
pub fn undo_tx(state: &mut ChainState, undo: UndoRecord) {
    state.apply_undo(undo);
}
