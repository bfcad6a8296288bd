//! Block median settlement: the protocol-driven force-settlement pass.
//!
//! Carried once per block with the block's median price points, this
//! transaction settles every CDP below the force-liquidation ratio against
//! the risk reserve, in ascending `(ratio, cdpid)` order. Settlement is
//! best-effort by design: when the reserve cannot cover the next CDP the
//! loop stops and reports success, leaving the remainder for later blocks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::core::account::{fcoin_genesis_uid, BalanceOpType};
use crate::core::coin::CoinSymbol;
use crate::dex::SysOrder;
use crate::error::Result;
use crate::params::SysParam;
use crate::storage::cache::TxCache;
use crate::tx::{Transaction, TxContext};
use crate::utils::constants::PERCENT_BOOST;
use crate::utils::math::mul_div;

/// Block median settlement payload: the block's median price points
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMedianTx {
    /// Median prices per coin, as computed for this block
    pub median_price_points: BTreeMap<CoinSymbol, u64>,
}

impl BlockMedianTx {
    pub(crate) fn check(
        &self,
        _tx: &Transaction,
        _height: u32,
        _cache: &TxCache<'_>,
    ) -> Result<()> {
        // protocol-driven: only the envelope (signature, account) is checked
        Ok(())
    }

    pub(crate) fn execute(&self, ctx: &TxContext, cache: &mut TxCache<'_>) -> Result<()> {
        let bcoin = CoinSymbol::Wicc;
        let scoin = CoinSymbol::Wusd;
        let fcoin = CoinSymbol::Wgrt;

        let price = cache.median_price_raw(bcoin, ctx.height)?;
        if price == 0 {
            warn!(height = ctx.height, "no bcoin median price; skipping force settlement");
            return Ok(());
        }

        // when the global guards are tripped, risk-taking txs are already
        // blocked in CheckTx; settlement records a no-op
        let floor = cache.param(SysParam::GlobalCollateralRatioMin)?;
        if cache.global_floor_reached(price, floor) {
            debug!(height = ctx.height, "global collateral floor reached; settlement no-op");
            return Ok(());
        }
        let ceiling = cache.param(SysParam::GlobalCollateralCeilingAmount)?;
        if cache.global_ceiling_reached(0, ceiling) {
            debug!(height = ctx.height, "global collateral ceiling reached; settlement no-op");
            return Ok(());
        }

        let force_ratio = cache.param(SysParam::CdpForceLiquidateRatio)?;
        let fcoin_price = cache.median_price_raw(fcoin, ctx.height)?;

        let mut reserve_account = cache.account(&fcoin_genesis_uid())?;
        let reserve_start = reserve_account.free_amount(scoin);
        let mut reserve = reserve_start;

        for cdp in cache.cdps_below_ratio(force_ratio, price) {
            if reserve < cdp.total_owed_scoins {
                debug!(
                    cdpid = %cdp.cdpid.short(),
                    reserve,
                    owed = cdp.total_owed_scoins,
                    "risk reserve exhausted; leaving remainder for next block"
                );
                break;
            }

            // a) the reserve absorbs the CDP's debt
            reserve -= cdp.total_owed_scoins;

            // b) sell the staked collateral for S-coins to replenish the
            // reserve once the order fills
            if cdp.total_staked_bcoins > 0 {
                cache.create_sys_order(
                    ctx.txid,
                    SysOrder::sell_market(ctx.cord(), scoin, bcoin, cdp.total_staked_bcoins),
                )?;
            }

            // c) inflate F-coins to cover the shortfall of a truly
            // underwater position
            let collateral_value = mul_div(cdp.total_staked_bcoins, price, PERCENT_BOOST)?;
            if cdp.total_owed_scoins > collateral_value {
                if fcoin_price == 0 {
                    warn!(
                        cdpid = %cdp.cdpid.short(),
                        "no fcoin median price; skipping inflation order"
                    );
                } else {
                    let shortfall = cdp.total_owed_scoins - collateral_value;
                    let fcoins_to_inflate = mul_div(shortfall, PERCENT_BOOST, fcoin_price)?;
                    if fcoins_to_inflate > 0 {
                        cache.create_sys_order(
                            ctx.txid,
                            SysOrder::sell_market(ctx.cord(), scoin, fcoin, fcoins_to_inflate),
                        )?;
                    }
                }
            }

            // d) close the CDP
            cache.erase_cdp(&cdp.cdpid)?;
            debug!(
                cdpid = %cdp.cdpid.short(),
                owed = cdp.total_owed_scoins,
                staked = cdp.total_staked_bcoins,
                reserve,
                "force settled CDP"
            );
        }

        let spent = reserve_start - reserve;
        if spent > 0 {
            reserve_account.operate_balance(scoin, BalanceOpType::SubFree, spent)?;
            cache.save_account(reserve_account);
        }
        Ok(())
    }
}
