//! Stake transaction: create a CDP or grow an existing one.
//!
//! Staking deposits B-coin collateral and mints S-coins against it. The
//! first stake of an owner on a coin pair creates the CDP, keyed by the
//! staking transaction's id; later stakes reference that id and settle the
//! accrued interest before growing the position.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::account::BalanceOpType;
use crate::core::cdp::{collateral_ratio, Cdp};
use crate::core::coin::{is_cdp_coin_pair, CoinSymbol};
use crate::core::receipt::Receipt;
use crate::error::{Error, Result};
use crate::params::SysParam;
use crate::storage::cache::TxCache;
use crate::tx::{compute_cdp_interest, settle_interest, Transaction, TxContext};
use crate::utils::crypto::TxId;
use crate::utils::math::safe_add;

/// Stake payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakeTx {
    /// Id of the CDP to grow; `None` creates a new one
    pub cdp_txid: Option<TxId>,
    /// Collateral symbol
    pub bcoin_symbol: CoinSymbol,
    /// Stable symbol
    pub scoin_symbol: CoinSymbol,
    /// Collateral to stake, atomic units
    pub bcoins_to_stake: u64,
    /// Stable coins to mint, atomic units
    pub scoins_to_mint: u64,
}

impl StakeTx {
    pub(crate) fn check(
        &self,
        tx: &Transaction,
        height: u32,
        cache: &TxCache<'_>,
    ) -> Result<()> {
        if !is_cdp_coin_pair(self.bcoin_symbol, self.scoin_symbol) {
            return Err(Error::InvalidCoinPair {
                bcoin: self.bcoin_symbol,
                scoin: self.scoin_symbol,
            });
        }

        let price = cache.median_price(self.bcoin_symbol, height)?;
        let floor = cache.param(SysParam::GlobalCollateralRatioMin)?;
        if cache.global_floor_reached(price, floor) {
            return Err(Error::GlobalCollateralFloorReached);
        }

        let ceiling = cache.param(SysParam::GlobalCollateralCeilingAmount)?;
        if cache.global_ceiling_reached(self.bcoins_to_stake, ceiling) {
            return Err(Error::GlobalCollateralCeilingReached);
        }

        if self.cdp_txid.is_none()
            && cache.has_open_cdp(&tx.txuid, self.bcoin_symbol, self.scoin_symbol)
        {
            return Err(Error::HasOpenCdp);
        }

        Ok(())
    }

    pub(crate) fn execute(&self, ctx: &TxContext, cache: &mut TxCache<'_>) -> Result<()> {
        let mut account = cache.account(&ctx.txuid)?;
        account.operate_balance(ctx.fee_symbol, BalanceOpType::SubFree, ctx.fees)?;

        let start_ratio = cache.param(SysParam::CdpStartCollateralRatio)?;
        let price = cache.median_price(self.bcoin_symbol, ctx.height)?;

        let partial_ratio = if self.scoins_to_mint == 0 {
            u64::MAX
        } else {
            collateral_ratio(self.bcoins_to_stake, price, self.scoins_to_mint)
        };

        match self.cdp_txid {
            // 1st-time CDP creation
            None => {
                if partial_ratio < start_ratio {
                    return Err(Error::CollateralRatioTooSmall {
                        ratio: partial_ratio,
                        minimum: start_ratio,
                    });
                }
                let min_stake = cache.param(SysParam::CdpBcoinsToStakeAmountMin)?;
                if self.bcoins_to_stake < min_stake {
                    return Err(Error::BcoinsTooSmallToStake {
                        got: self.bcoins_to_stake,
                        min: min_stake,
                    });
                }

                let cdp = Cdp::new(
                    ctx.txuid,
                    ctx.txid,
                    ctx.height,
                    self.bcoin_symbol,
                    self.scoin_symbol,
                    self.bcoins_to_stake,
                    self.scoins_to_mint,
                );
                cache.new_cdp(cdp)?;
                debug!(
                    cdpid = %ctx.txid.short(),
                    staked = self.bcoins_to_stake,
                    minted = self.scoins_to_mint,
                    "created CDP"
                );
            }

            // further staking on the existing CDP
            Some(cdpid) => {
                let mut cdp = cache.cdp(&cdpid)?;
                if cdp.owner != ctx.txuid {
                    return Err(Error::NotCdpOwner);
                }
                if ctx.height < cdp.block_height {
                    return Err(Error::HeightError {
                        height: ctx.height,
                        cdp_height: cdp.block_height,
                    });
                }

                let total_staked = safe_add(cdp.total_staked_bcoins, self.bcoins_to_stake)?;
                let total_owed = safe_add(cdp.total_owed_scoins, self.scoins_to_mint)?;
                let total_ratio = collateral_ratio(total_staked, price, total_owed);

                // either branch proves the marginal stake is not predatory
                if partial_ratio < start_ratio && total_ratio < start_ratio {
                    return Err(Error::CollateralRatioTooSmall {
                        ratio: total_ratio,
                        minimum: start_ratio,
                    });
                }

                let interest = compute_cdp_interest(ctx.height, &cdp, cache)?;
                settle_interest(ctx, cache, &mut account, &cdp, interest)?;

                cdp.add_stake(ctx.height, self.bcoins_to_stake, self.scoins_to_mint)?;
                cache.update_cdp(cdp)?;
            }
        }

        account.operate_balance(self.bcoin_symbol, BalanceOpType::SubFree, self.bcoins_to_stake)?;
        account.operate_balance(self.scoin_symbol, BalanceOpType::AddFree, self.scoins_to_mint)?;
        cache.save_account(account);

        cache.set_receipts(
            ctx.txid,
            vec![Receipt::new(
                None,
                Some(ctx.txuid),
                self.scoin_symbol,
                self.scoins_to_mint,
            )],
        );
        Ok(())
    }
}
