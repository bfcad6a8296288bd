//! Liquidation transaction: a third party pays S-coins to take over the
//! collateral of an under-collateralized CDP.
//!
//! Three regimes on the collateral ratio, with `L` the liquidation start,
//! `NR` the non-return threshold and `F` the force threshold:
//!
//! - `NR < ratio <= L`: the liquidator takes collateral worth `NR` of the
//!   debt at the discount rate; the remainder returns to the owner.
//! - `F < ratio <= NR`: the liquidator takes all collateral at the discount
//!   rate; the owner gets nothing back.
//! - `ratio <= F`: the liquidator pays exactly the owed total for all
//!   collateral; no discount and no penalty (protocol backstop).
//!
//! The penalty above the owed total flows half to the risk reserve and half
//! into a system buy order whose received F-coins are burned.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::account::{fcoin_genesis_uid, BalanceOpType};
use crate::core::cdp::Cdp;
use crate::core::coin::CoinSymbol;
use crate::core::receipt::Receipt;
use crate::error::{Error, Result};
use crate::params::SysParam;
use crate::storage::cache::TxCache;
use crate::tx::{Transaction, TxContext};
use crate::utils::constants::PERCENT_BOOST;
use crate::utils::crypto::TxId;
use crate::utils::math::{mul_div, safe_add, safe_sub};

/// Liquidate payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidateTx {
    /// Id of the CDP to liquidate
    pub cdp_txid: TxId,
    /// S-coins the liquidator is willing to spend, atomic units
    pub scoins_to_liquidate: u64,
}

/// Full-liquidation quote for one CDP at one price
struct LiquidationQuote {
    /// Collateral leg to the liquidator on full liquidation
    bcoins_to_liquidator: u64,
    /// Collateral leg back to the owner on full liquidation
    bcoins_to_owner: u64,
    /// S-coins the liquidator must spend for full liquidation
    scoins_needed: u64,
    /// Penalty above the owed total on full liquidation
    scoins_to_risk_reserve: u64,
}

impl LiquidateTx {
    pub(crate) fn check(
        &self,
        tx: &Transaction,
        height: u32,
        cache: &TxCache<'_>,
    ) -> Result<()> {
        let price = cache.median_price(CoinSymbol::Wicc, height)?;
        let floor = cache.param(SysParam::GlobalCollateralRatioMin)?;
        if cache.global_floor_reached(price, floor) {
            return Err(Error::GlobalCollateralFloorReached);
        }

        if self.cdp_txid.is_zero() {
            return Err(Error::EmptyCdpTxid);
        }
        let cdp = cache.cdp(&self.cdp_txid)?;

        let account = cache.account(&tx.txuid)?;
        let free_scoins = account.free_amount(cdp.scoin_symbol);
        if free_scoins < self.scoins_to_liquidate {
            return Err(Error::InsufficientBalance {
                symbol: cdp.scoin_symbol,
                required: self.scoins_to_liquidate,
                available: free_scoins,
            });
        }
        Ok(())
    }

    pub(crate) fn execute(&self, ctx: &TxContext, cache: &mut TxCache<'_>) -> Result<()> {
        let mut liquidator = cache.account(&ctx.txuid)?;
        liquidator.operate_balance(ctx.fee_symbol, BalanceOpType::SubFree, ctx.fees)?;

        let mut cdp = cache.cdp(&self.cdp_txid)?;
        let price = cache.median_price(cdp.bcoin_symbol, ctx.height)?;
        let quote = quote_full_liquidation(&cdp, price, cache)?;

        let (bcoin_symbol, scoin_symbol) = (cdp.bcoin_symbol, cdp.scoin_symbol);
        let owner_uid = cdp.owner;

        let scoins_paid;
        let bcoins_to_liquidator;
        let bcoins_to_owner;
        let penalty_share;

        if self.scoins_to_liquidate >= quote.scoins_needed {
            // full liquidation closes the CDP
            scoins_paid = quote.scoins_needed;
            bcoins_to_liquidator = quote.bcoins_to_liquidator;
            bcoins_to_owner = quote.bcoins_to_owner;
            penalty_share = quote.scoins_to_risk_reserve;

            cache.erase_cdp(&self.cdp_txid)?;
            debug!(cdpid = %self.cdp_txid.short(), "CDP fully liquidated");
        } else {
            // partial liquidation at rate l / scoins_needed, every leg scaled
            // by integer mul-then-div
            let offered = self.scoins_to_liquidate;
            scoins_paid = offered;
            bcoins_to_liquidator = mul_div(quote.bcoins_to_liquidator, offered, quote.scoins_needed)?;
            bcoins_to_owner = mul_div(quote.bcoins_to_owner, offered, quote.scoins_needed)?;
            penalty_share = mul_div(quote.scoins_to_risk_reserve, offered, quote.scoins_needed)?;

            let owed_cut = mul_div(cdp.total_owed_scoins, offered, quote.scoins_needed)?;
            let staked_cut = safe_add(bcoins_to_liquidator, bcoins_to_owner)?;
            cdp.liquidate_partial(ctx.height, staked_cut, owed_cut)?;
            cache.update_cdp(cdp)?;
        }

        liquidator.operate_balance(scoin_symbol, BalanceOpType::SubFree, scoins_paid)?;
        liquidator.operate_balance(bcoin_symbol, BalanceOpType::AddFree, bcoins_to_liquidator)?;

        // self-liquidation must not fork the account copy
        if owner_uid == ctx.txuid {
            liquidator.operate_balance(bcoin_symbol, BalanceOpType::AddFree, bcoins_to_owner)?;
            cache.save_account(liquidator);
        } else {
            let mut owner = cache.account(&owner_uid)?;
            owner.operate_balance(bcoin_symbol, BalanceOpType::AddFree, bcoins_to_owner)?;
            cache.save_account(liquidator);
            cache.save_account(owner);
        }

        process_penalty_fees(ctx, cache, scoin_symbol, penalty_share)?;

        cache.set_receipts(
            ctx.txid,
            vec![
                Receipt::new(
                    Some(ctx.txuid),
                    None,
                    scoin_symbol,
                    safe_add(scoins_paid, penalty_share)?,
                ),
                Receipt::new(None, Some(ctx.txuid), bcoin_symbol, bcoins_to_liquidator),
                Receipt::new(None, Some(owner_uid), bcoin_symbol, bcoins_to_owner),
            ],
        );
        Ok(())
    }
}

/// Compute the full-liquidation legs for a CDP under the tiered regimes
fn quote_full_liquidation(
    cdp: &Cdp,
    price: u64,
    cache: &TxCache<'_>,
) -> Result<LiquidationQuote> {
    let ratio = cdp.collateral_ratio(price);
    let staked = cdp.total_staked_bcoins;
    let owed = cdp.total_owed_scoins;

    let start_ratio = cache.param(SysParam::CdpStartLiquidateRatio)?;
    let non_return_ratio = cache.param(SysParam::CdpNonReturnLiquidateRatio)?;
    let force_ratio = cache.param(SysParam::CdpForceLiquidateRatio)?;
    let discount_ratio = cache.param(SysParam::CdpLiquidateDiscountRatio)?;

    if ratio > start_ratio {
        return Err(Error::CdpNotLiquidateReady {
            ratio,
            ceiling: start_ratio,
        });
    }

    if ratio > non_return_ratio {
        // healthy-discount regime: liquidator takes NR worth of the debt in
        // collateral, owner keeps the rest
        let bcoins_to_liquidator = mul_div(owed, non_return_ratio, price)?;
        let bcoins_to_owner = safe_sub(staked, bcoins_to_liquidator)?;
        // two truncating divisions, in exactly this order
        let scoins_needed = mul_div(
            mul_div(owed, non_return_ratio, PERCENT_BOOST)?,
            discount_ratio,
            PERCENT_BOOST,
        )?;
        let scoins_to_risk_reserve = safe_sub(scoins_needed, owed)?;
        Ok(LiquidationQuote {
            bcoins_to_liquidator,
            bcoins_to_owner,
            scoins_needed,
            scoins_to_risk_reserve,
        })
    } else if ratio > force_ratio {
        // no-return regime: all collateral at a discount
        let scoins_needed = mul_div(
            mul_div(staked, price, PERCENT_BOOST)?,
            discount_ratio,
            PERCENT_BOOST,
        )?;
        let scoins_to_risk_reserve = safe_sub(scoins_needed, owed)?;
        Ok(LiquidationQuote {
            bcoins_to_liquidator: staked,
            bcoins_to_owner: 0,
            scoins_needed,
            scoins_to_risk_reserve,
        })
    } else {
        // insolvent: protocol backstop, no discount, no penalty
        Ok(LiquidationQuote {
            bcoins_to_liquidator: staked,
            bcoins_to_owner: 0,
            scoins_needed: owed,
            scoins_to_risk_reserve: 0,
        })
    }
}

/// Route the penalty: above the system-order threshold, half to the risk
/// reserve and half sold for F-coins (burned); otherwise all to the reserve.
fn process_penalty_fees(
    ctx: &TxContext,
    cache: &mut TxCache<'_>,
    scoin_symbol: CoinSymbol,
    penalty_scoins: u64,
) -> Result<()> {
    if penalty_scoins == 0 {
        return Ok(());
    }

    let mut reserve_account = cache.account(&fcoin_genesis_uid())?;
    let min_order_fee = cache.param(SysParam::CdpSysOrderPenaltyFeeMin)?;

    if penalty_scoins > min_order_fee {
        let half = penalty_scoins / 2;
        reserve_account.operate_balance(scoin_symbol, BalanceOpType::AddFree, half)?;
        cache.create_sys_order(
            ctx.txid,
            crate::dex::SysOrder::buy_market(ctx.cord(), scoin_symbol, CoinSymbol::Wgrt, half),
        )?;
    } else {
        reserve_account.operate_balance(scoin_symbol, BalanceOpType::AddFree, penalty_scoins)?;
    }

    cache.save_account(reserve_account);
    Ok(())
}
