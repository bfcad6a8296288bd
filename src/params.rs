//! Governance-settable system parameters.
//!
//! The enumerated parameter set consumed by the transaction processors, with
//! chain defaults, validation bounds, and a read-only store view. Parameter
//! names are the stable identifiers used by governance proposals and RPC.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::constants::COIN;

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETER SET
// ═══════════════════════════════════════════════════════════════════════════════

/// The enumerated system parameter set
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SysParam {
    /// Global aggregate collateral ratio floor (boosted)
    GlobalCollateralRatioMin,
    /// Cap on total staked B-coins, atomic units
    GlobalCollateralCeilingAmount,
    /// Minimum collateral ratio to open or grow a CDP (boosted)
    CdpStartCollateralRatio,
    /// Minimum B-coins staked at CDP creation, atomic units
    CdpBcoinsToStakeAmountMin,
    /// Ratio at or below which user liquidation opens (boosted)
    CdpStartLiquidateRatio,
    /// Ratio at or below which the owner gets no collateral back (boosted)
    CdpNonReturnLiquidateRatio,
    /// Ratio at or below which block force-settlement applies (boosted)
    CdpForceLiquidateRatio,
    /// Liquidation discount applied to seized collateral (boosted)
    CdpLiquidateDiscountRatio,
    /// Penalty threshold below which no system order is placed, atomic units
    CdpSysOrderPenaltyFeeMin,
    /// Interest coefficient A
    CdpInterestParamA,
    /// Interest coefficient B
    CdpInterestParamB,
    /// Sliding window, in blocks, for the median price
    MedianPriceSlideWindowBlockCount,
}

impl SysParam {
    /// Stable identifier used by governance and RPC
    pub fn name(&self) -> &'static str {
        match self {
            Self::GlobalCollateralRatioMin => "GLOBAL_COLLATERAL_RATIO_MIN",
            Self::GlobalCollateralCeilingAmount => "GLOBAL_COLLATERAL_CEILING_AMOUNT",
            Self::CdpStartCollateralRatio => "CDP_START_COLLATERAL_RATIO",
            Self::CdpBcoinsToStakeAmountMin => "CDP_BCOINSTOSTAKE_AMOUNT_MIN",
            Self::CdpStartLiquidateRatio => "CDP_START_LIQUIDATE_RATIO",
            Self::CdpNonReturnLiquidateRatio => "CDP_NONRETURN_LIQUIDATE_RATIO",
            Self::CdpForceLiquidateRatio => "CDP_FORCE_LIQUIDATE_RATIO",
            Self::CdpLiquidateDiscountRatio => "CDP_LIQUIDATE_DISCOUNT_RATIO",
            Self::CdpSysOrderPenaltyFeeMin => "CDP_SYSORDER_PENALTY_FEE_MIN",
            Self::CdpInterestParamA => "CDP_INTEREST_PARAM_A",
            Self::CdpInterestParamB => "CDP_INTEREST_PARAM_B",
            Self::MedianPriceSlideWindowBlockCount => "MEDIAN_PRICE_SLIDE_WINDOW_BLOCKCOUNT",
        }
    }

    /// Chain default value
    pub fn default_value(&self) -> u64 {
        match self {
            Self::GlobalCollateralRatioMin => 8_000,                  // 80%
            Self::GlobalCollateralCeilingAmount => 52_500_000 * COIN,
            Self::CdpStartCollateralRatio => 20_000,                  // 200%
            Self::CdpBcoinsToStakeAmountMin => COIN,                  // 1 B-coin
            Self::CdpStartLiquidateRatio => 15_000,                   // 150%
            Self::CdpNonReturnLiquidateRatio => 11_300,               // 113%
            Self::CdpForceLiquidateRatio => 10_400,                   // 104%
            Self::CdpLiquidateDiscountRatio => 9_700,                 // 97%
            Self::CdpSysOrderPenaltyFeeMin => 10 * COIN,
            Self::CdpInterestParamA => 2,
            Self::CdpInterestParamB => 1,
            Self::MedianPriceSlideWindowBlockCount => 11,
        }
    }

    /// Validation bounds (min, max) for governance updates
    pub fn bounds(&self) -> (u64, u64) {
        match self {
            Self::GlobalCollateralRatioMin => (5_000, 20_000),
            Self::GlobalCollateralCeilingAmount => (COIN, u64::MAX),
            Self::CdpStartCollateralRatio => (11_000, 50_000),
            Self::CdpBcoinsToStakeAmountMin => (1, 1_000_000 * COIN),
            Self::CdpStartLiquidateRatio => (11_000, 20_000),
            Self::CdpNonReturnLiquidateRatio => (10_000, 15_000),
            Self::CdpForceLiquidateRatio => (10_000, 12_000),
            Self::CdpLiquidateDiscountRatio => (9_000, 10_000),
            Self::CdpSysOrderPenaltyFeeMin => (0, 1_000 * COIN),
            Self::CdpInterestParamA => (1, 1_000),
            Self::CdpInterestParamB => (1, 1_000),
            Self::MedianPriceSlideWindowBlockCount => (1, 100_000),
        }
    }

    /// Validate a candidate value against the bounds
    pub fn validate(&self, value: u64) -> Result<()> {
        let (min, max) = self.bounds();
        if value < min || value > max {
            return Err(Error::Internal(format!(
                "{} value {} outside bounds [{}, {}]",
                self.name(),
                value,
                min,
                max
            )));
        }
        Ok(())
    }

    /// All parameters, in declaration order
    pub fn all() -> &'static [SysParam] {
        &[
            Self::GlobalCollateralRatioMin,
            Self::GlobalCollateralCeilingAmount,
            Self::CdpStartCollateralRatio,
            Self::CdpBcoinsToStakeAmountMin,
            Self::CdpStartLiquidateRatio,
            Self::CdpNonReturnLiquidateRatio,
            Self::CdpForceLiquidateRatio,
            Self::CdpLiquidateDiscountRatio,
            Self::CdpSysOrderPenaltyFeeMin,
            Self::CdpInterestParamA,
            Self::CdpInterestParamB,
            Self::MedianPriceSlideWindowBlockCount,
        ]
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PARAMETER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only parameter view with governance overrides on top of defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysParamStore {
    overrides: BTreeMap<SysParam, u64>,
}

impl SysParamStore {
    /// Store with chain defaults only
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of a parameter
    pub fn get(&self, param: SysParam) -> Result<u64> {
        match self.overrides.get(&param) {
            Some(value) => Ok(*value),
            None => Ok(param.default_value()),
        }
    }

    /// Apply a governance override after bounds validation
    pub fn set(&mut self, param: SysParam, value: u64) -> Result<()> {
        param.validate(value)?;
        self.overrides.insert(param, value);
        Ok(())
    }
}
