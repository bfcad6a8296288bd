//! Redeem transaction: repay owed S-coins and take back staked collateral.
//!
//! A full repayment together with a full redemption finishes the CDP, which
//! is erased. Partial redemptions must leave the position at or above the
//! start collateral ratio.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::account::BalanceOpType;
use crate::core::coin::CoinSymbol;
use crate::core::receipt::Receipt;
use crate::error::{Error, Result};
use crate::params::SysParam;
use crate::storage::cache::TxCache;
use crate::tx::{compute_cdp_interest, settle_interest, Transaction, TxContext};
use crate::utils::crypto::TxId;

/// Redeem payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeemTx {
    /// Id of the CDP to redeem from
    pub cdp_txid: TxId,
    /// S-coins offered for repayment, atomic units
    pub scoins_to_repay: u64,
    /// Collateral to take back, atomic units
    pub bcoins_to_redeem: u64,
}

impl RedeemTx {
    pub(crate) fn check(
        &self,
        _tx: &Transaction,
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
        Ok(())
    }

    pub(crate) fn execute(&self, ctx: &TxContext, cache: &mut TxCache<'_>) -> Result<()> {
        let mut account = cache.account(&ctx.txuid)?;
        account.operate_balance(ctx.fee_symbol, BalanceOpType::SubFree, ctx.fees)?;

        let mut cdp = cache.cdp(&self.cdp_txid)?;
        if cdp.owner != ctx.txuid {
            return Err(Error::NotCdpOwner);
        }
        if ctx.height < cdp.block_height {
            return Err(Error::HeightError {
                height: ctx.height,
                cdp_height: cdp.block_height,
            });
        }

        let interest = compute_cdp_interest(ctx.height, &cdp, cache)?;
        settle_interest(ctx, cache, &mut account, &cdp, interest)?;

        if self.bcoins_to_redeem > cdp.total_staked_bcoins {
            return Err(Error::RedeemExceedsStaked {
                redeem: self.bcoins_to_redeem,
                staked: cdp.total_staked_bcoins,
            });
        }
        let real_repay = self.scoins_to_repay.min(cdp.total_owed_scoins);

        let (bcoin_symbol, scoin_symbol) = (cdp.bcoin_symbol, cdp.scoin_symbol);
        cdp.redeem(ctx.height, self.bcoins_to_redeem, real_repay)?;

        if cdp.is_finished() {
            cache.erase_cdp(&self.cdp_txid)?;
            debug!(cdpid = %self.cdp_txid.short(), "CDP fully redeemed and erased");
        } else {
            if self.bcoins_to_redeem > 0 {
                let start_ratio = cache.param(SysParam::CdpStartCollateralRatio)?;
                let price = cache.median_price(bcoin_symbol, ctx.height)?;
                let ratio = cdp.collateral_ratio(price);
                if ratio < start_ratio {
                    return Err(Error::CollateralRatioTooSmall {
                        ratio,
                        minimum: start_ratio,
                    });
                }
            }
            cache.update_cdp(cdp)?;
        }

        account.operate_balance(scoin_symbol, BalanceOpType::SubFree, real_repay)?;
        account.operate_balance(bcoin_symbol, BalanceOpType::AddFree, self.bcoins_to_redeem)?;
        cache.save_account(account);

        cache.set_receipts(
            ctx.txid,
            vec![
                Receipt::new(Some(ctx.txuid), None, scoin_symbol, real_repay),
                Receipt::new(None, Some(ctx.txuid), bcoin_symbol, self.bcoins_to_redeem),
            ],
        );
        Ok(())
    }
}
