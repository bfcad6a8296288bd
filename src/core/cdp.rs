//! CDP (Collateralized Debt Position) records.
//!
//! A CDP pairs staked B-coin collateral with owed S-coin debt under a single
//! owner. Records are keyed by the id of the transaction that created them
//! and carry the height of their last mutation as the interest anchor.

use serde::{Deserialize, Serialize};

use crate::core::account::AccountId;
use crate::core::coin::CoinSymbol;
use crate::error::{Error, Result};
use crate::utils::constants::COIN;
use crate::utils::crypto::TxId;

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO MATH
// ═══════════════════════════════════════════════════════════════════════════════

/// Boosted collateral ratio `staked * price / owed`.
///
/// `price` is the boosted median price (S-coin units per B-coin, scaled by
/// `PERCENT_BOOST / COIN`), so the quotient is directly a boosted percentage.
/// Zero debt means an infinite ratio, reported as `u64::MAX`.
pub fn collateral_ratio(staked_bcoins: u64, price: u64, owed_scoins: u64) -> u64 {
    if owed_scoins == 0 {
        return u64::MAX;
    }
    let ratio = (staked_bcoins as u128) * (price as u128) / (owed_scoins as u128);
    ratio.min(u64::MAX as u128) as u64
}

// ═══════════════════════════════════════════════════════════════════════════════
// CDP
// ═══════════════════════════════════════════════════════════════════════════════

/// A collateralized debt position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cdp {
    /// Id of the creating transaction
    pub cdpid: TxId,
    /// Owner account
    pub owner: AccountId,
    /// Collateral symbol
    pub bcoin_symbol: CoinSymbol,
    /// Stable symbol
    pub scoin_symbol: CoinSymbol,
    /// Total staked collateral, atomic units
    pub total_staked_bcoins: u64,
    /// Total owed stable coins, atomic units
    pub total_owed_scoins: u64,
    /// Height of the last mutation (interest anchor)
    pub block_height: u32,
}

impl Cdp {
    /// Create a new CDP record
    pub fn new(
        owner: AccountId,
        cdpid: TxId,
        height: u32,
        bcoin_symbol: CoinSymbol,
        scoin_symbol: CoinSymbol,
        staked_bcoins: u64,
        owed_scoins: u64,
    ) -> Self {
        Self {
            cdpid,
            owner,
            bcoin_symbol,
            scoin_symbol,
            total_staked_bcoins: staked_bcoins,
            total_owed_scoins: owed_scoins,
            block_height: height,
        }
    }

    /// Boosted collateral ratio at the given price
    pub fn collateral_ratio(&self, price: u64) -> u64 {
        collateral_ratio(self.total_staked_bcoins, price, self.total_owed_scoins)
    }

    /// Price-independent ratio quotient `staked * COIN / owed`, used as the
    /// ordered key of the liquidation scan index. Zero debt sorts last.
    pub fn ratio_quotient(&self) -> u128 {
        if self.total_owed_scoins == 0 {
            return u128::MAX;
        }
        (self.total_staked_bcoins as u128) * (COIN as u128) / (self.total_owed_scoins as u128)
    }

    /// A CDP with no collateral and no debt is finished and must be erased
    pub fn is_finished(&self) -> bool {
        self.total_staked_bcoins == 0 && self.total_owed_scoins == 0
    }

    fn bump_height(&mut self, height: u32) -> Result<()> {
        if height < self.block_height {
            return Err(Error::HeightError {
                height,
                cdp_height: self.block_height,
            });
        }
        self.block_height = height;
        Ok(())
    }

    /// Stake additional collateral and mint additional debt
    pub fn add_stake(&mut self, height: u32, bcoins: u64, scoins: u64) -> Result<()> {
        self.bump_height(height)?;
        self.total_staked_bcoins =
            self.total_staked_bcoins
                .checked_add(bcoins)
                .ok_or(Error::Overflow {
                    operation: "cdp stake".into(),
                })?;
        self.total_owed_scoins =
            self.total_owed_scoins
                .checked_add(scoins)
                .ok_or(Error::Overflow {
                    operation: "cdp mint".into(),
                })?;
        Ok(())
    }

    /// Repay debt and release collateral
    pub fn redeem(&mut self, height: u32, bcoins_to_redeem: u64, scoins_to_repay: u64) -> Result<()> {
        self.bump_height(height)?;
        self.total_staked_bcoins = self
            .total_staked_bcoins
            .checked_sub(bcoins_to_redeem)
            .ok_or(Error::Underflow {
                operation: "cdp redeem collateral".into(),
            })?;
        self.total_owed_scoins = self
            .total_owed_scoins
            .checked_sub(scoins_to_repay)
            .ok_or(Error::Underflow {
                operation: "cdp repay debt".into(),
            })?;
        Ok(())
    }

    /// Reduce the position by a partial liquidation
    pub fn liquidate_partial(&mut self, height: u32, bcoins: u64, scoins: u64) -> Result<()> {
        self.bump_height(height)?;
        self.total_staked_bcoins =
            self.total_staked_bcoins
                .checked_sub(bcoins)
                .ok_or(Error::Underflow {
                    operation: "cdp partial liquidation collateral".into(),
                })?;
        self.total_owed_scoins =
            self.total_owed_scoins
                .checked_sub(scoins)
                .ok_or(Error::Underflow {
                    operation: "cdp partial liquidation debt".into(),
                })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::{Hash, KeyPair};

    fn test_cdp(staked: u64, owed: u64) -> Cdp {
        Cdp::new(
            *KeyPair::generate().public_key(),
            TxId::from(Hash::sha256(b"create")),
            100,
            CoinSymbol::Wicc,
            CoinSymbol::Wusd,
            staked,
            owed,
        )
    }

    #[test]
    fn test_ratio_basic() {
        // 10 COIN staked at price 25000 against 1 COIN owed => 250000
        let cdp = test_cdp(10 * COIN, COIN);
        assert_eq!(cdp.collateral_ratio(25_000), 250_000);
    }

    #[test]
    fn test_ratio_zero_debt_is_infinite() {
        let cdp = test_cdp(10 * COIN, 0);
        assert_eq!(cdp.collateral_ratio(25_000), u64::MAX);
        assert_eq!(cdp.ratio_quotient(), u128::MAX);
    }

    #[test]
    fn test_ratio_equal_stake_and_debt() {
        let cdp = test_cdp(10 * COIN, 10 * COIN);
        assert_eq!(cdp.collateral_ratio(13_000), 13_000);
    }

    #[test]
    fn test_add_stake() {
        let mut cdp = test_cdp(10 * COIN, COIN);
        cdp.add_stake(101, 0, 2 * COIN).unwrap();
        assert_eq!(cdp.total_owed_scoins, 3 * COIN);
        assert_eq!(cdp.block_height, 101);
    }

    #[test]
    fn test_height_is_monotone() {
        let mut cdp = test_cdp(10 * COIN, COIN);
        let err = cdp.add_stake(99, COIN, 0).unwrap_err();
        assert!(matches!(err, Error::HeightError { .. }));
        assert_eq!(cdp.block_height, 100);
    }

    #[test]
    fn test_redeem_to_finished() {
        let mut cdp = test_cdp(10 * COIN, COIN);
        cdp.redeem(105, 10 * COIN, COIN).unwrap();
        assert!(cdp.is_finished());
    }

    #[test]
    fn test_redeem_underflow() {
        let mut cdp = test_cdp(COIN, COIN);
        assert!(cdp.redeem(105, 2 * COIN, 0).is_err());
    }

    #[test]
    fn test_quotient_orders_by_risk() {
        let risky = test_cdp(COIN, COIN);
        let safe = test_cdp(3 * COIN, COIN);
        assert!(risky.ratio_quotient() < safe.ratio_quotient());
    }
}
