//! Error types for the CDP transaction engine.
//!
//! Every rejection carries a stable reason string that is surfaced to block
//! validation, mirroring the reject reasons consumed by consensus peers.

use thiserror::Error;

use crate::core::coin::CoinSymbol;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the CDP transaction engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════════════

    /// The (bcoin, scoin) pair is not registered for CDPs
    #[error("invalid CDP coin pair {bcoin}/{scoin}")]
    InvalidCoinPair {
        /// Offered collateral symbol
        bcoin: CoinSymbol,
        /// Offered stable symbol
        scoin: CoinSymbol,
    },

    /// Fee symbol not accepted for paying fees
    #[error("symbol {0} cannot pay transaction fees")]
    InvalidFeeSymbol(CoinSymbol),

    /// Transaction fee below the protocol minimum
    #[error("fee {got} below minimum {min}")]
    FeeTooSmall {
        /// Fee carried by the transaction
        got: u64,
        /// Required minimum
        min: u64,
    },

    /// The transaction's valid height window does not cover the current height
    #[error("tx valid height {valid_height} out of range at height {height}")]
    InvalidValidHeight {
        /// Height declared by the transaction
        valid_height: u32,
        /// Height at which it was evaluated
        height: u32,
    },

    /// Aggregate collateral ratio is below the global floor
    #[error("global collateral ratio floor reached")]
    GlobalCollateralFloorReached,

    /// Total staked collateral would exceed the global ceiling
    #[error("global collateral ceiling reached")]
    GlobalCollateralCeilingReached,

    /// Owner already has an open CDP on this coin pair
    #[error("owner already has an open CDP on this coin pair")]
    HasOpenCdp,

    /// Collateral ratio below the required start ratio
    #[error("collateral ratio {ratio} below start ratio {minimum}")]
    CollateralRatioTooSmall {
        /// Offending ratio (boosted)
        ratio: u64,
        /// Required start ratio (boosted)
        minimum: u64,
    },

    /// Staked amount below the protocol minimum for CDP creation
    #[error("bcoins to stake {got} below minimum {min}")]
    BcoinsTooSmallToStake {
        /// Offered stake
        got: u64,
        /// Required minimum
        min: u64,
    },

    /// A cdp_txid was required but the zero sentinel was supplied
    #[error("cdp_txid is empty")]
    EmptyCdpTxid,

    /// CDP is above the liquidation start ratio and cannot be liquidated
    #[error("CDP ratio {ratio} above liquidation start ratio {ceiling}")]
    CdpNotLiquidateReady {
        /// Current collateral ratio (boosted)
        ratio: u64,
        /// Liquidation start ratio (boosted)
        ceiling: u64,
    },

    /// Transaction signer does not own the targeted CDP
    #[error("transaction signer is not the CDP owner")]
    NotCdpOwner,

    /// Redemption asks for more collateral than the CDP holds
    #[error("bcoins to redeem {redeem} exceed staked total {staked}")]
    RedeemExceedsStaked {
        /// Requested redemption
        redeem: u64,
        /// Staked total
        staked: u64,
    },

    /// Signature does not verify against the account owner's public key
    #[error("bad transaction signature")]
    InvalidSignature,

    // ═══════════════════════════════════════════════════════════════════
    // State reads
    // ═══════════════════════════════════════════════════════════════════

    /// Account missing from the ledger
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// CDP missing from the store
    #[error("CDP not found: {0}")]
    CdpNotFound(String),

    /// A governance parameter could not be read
    #[error("system parameter {0} unavailable")]
    SysParamMissing(&'static str),

    // ═══════════════════════════════════════════════════════════════════
    // Balances & arithmetic
    // ═══════════════════════════════════════════════════════════════════

    /// Free balance too small for the requested operation
    #[error("insufficient {symbol} balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Token symbol
        symbol: CoinSymbol,
        /// Amount required
        required: u64,
        /// Amount available
        available: u64,
    },

    /// Owner cannot cover the accrued interest
    #[error("insufficient scoins for interest: required {required}, available {available}")]
    InterestInsufficient {
        /// Interest owed
        required: u64,
        /// Free scoin balance
        available: u64,
    },

    /// The oracle returned no usable median price
    #[error("median price for {0} is zero")]
    ZeroMedianPrice(CoinSymbol),

    /// Mutation height precedes the CDP's anchor height
    #[error("height {height} below CDP anchor height {cdp_height}")]
    HeightError {
        /// Mutation height
        height: u32,
        /// CDP anchor height
        cdp_height: u32,
    },

    /// Arithmetic overflow
    #[error("arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Arithmetic underflow
    #[error("arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Division by zero
    #[error("division by zero in {operation}")]
    DivisionByZero {
        /// Operation with the zero divisor
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Order submission & persistence
    // ═══════════════════════════════════════════════════════════════════

    /// The DEX refused a system order
    #[error("failed to create system DEX order")]
    CreateSysOrderFailed,

    /// Persisting a CDP failed
    #[error("failed to save CDP: {0}")]
    BadSaveCdp(String),

    /// Persisting an account failed
    #[error("failed to save account: {0}")]
    BadSaveAccount(String),

    // ═══════════════════════════════════════════════════════════════════
    // Serialization
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal
    // ═══════════════════════════════════════════════════════════════════

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal error (should not happen in production)
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable reason string surfaced to block validation
    pub fn reject_reason(&self) -> &'static str {
        match self {
            Error::InvalidCoinPair { .. } => "invalid-CDPCoinPair-symbol",
            Error::InvalidFeeSymbol(_) => "bad-tx-fee-symbol",
            Error::FeeTooSmall { .. } => "bad-tx-fee-toosmall",
            Error::InvalidValidHeight { .. } => "bad-tx-valid-height",
            Error::GlobalCollateralFloorReached => "global-collateral-floor-reached",
            Error::GlobalCollateralCeilingReached => "global-collateral-ceiling-reached",
            Error::HasOpenCdp => "has-open-cdp",
            Error::CollateralRatioTooSmall { .. } => "CDP-collateral-ratio-toosmall",
            Error::BcoinsTooSmallToStake { .. } => "bcoins-too-small-to-stake",
            Error::EmptyCdpTxid => "empty-cdp-txid",
            Error::CdpNotLiquidateReady { .. } => "cdp-not-liquidate-ready",
            Error::NotCdpOwner => "not-cdp-owner",
            Error::RedeemExceedsStaked { .. } => "redeem-bcoins-exceed-staked",
            Error::InvalidSignature => "bad-tx-signature",
            Error::AccountNotFound(_) => "bad-read-accountdb",
            Error::CdpNotFound(_) => "cdp-not-exist",
            Error::SysParamMissing(_) => "read-sysparamdb-err",
            Error::InsufficientBalance { .. } => "bad-operate-account",
            Error::InterestInsufficient { .. } => "interest-insufficient-error",
            Error::ZeroMedianPrice(_) => "get-bcoin-median-price-error",
            Error::HeightError { .. } => "height-error",
            Error::Overflow { .. } | Error::Underflow { .. } | Error::DivisionByZero { .. } => {
                "arithmetic-error"
            }
            Error::CreateSysOrderFailed => "create-sys-order-failed",
            Error::BadSaveCdp(_) => "bad-save-cdp",
            Error::BadSaveAccount(_) => "bad-save-account",
            Error::Serialization(_) | Error::Deserialization(_) => "bad-serialization",
            Error::Storage(_) | Error::Internal(_) => "internal-error",
        }
    }

    /// Consensus DoS score attached to the rejection.
    ///
    /// Local faults (storage, internal) carry no score since they say nothing
    /// about the peer that relayed the transaction.
    pub fn dos_score(&self) -> u32 {
        match self {
            Error::Storage(_) | Error::Internal(_) => 0,
            _ => 100,
        }
    }

    /// Numeric code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // validation: 1xxx
            Error::InvalidCoinPair { .. } => 1001,
            Error::InvalidFeeSymbol(_) => 1014,
            Error::FeeTooSmall { .. } => 1002,
            Error::InvalidValidHeight { .. } => 1003,
            Error::GlobalCollateralFloorReached => 1004,
            Error::GlobalCollateralCeilingReached => 1005,
            Error::HasOpenCdp => 1006,
            Error::CollateralRatioTooSmall { .. } => 1007,
            Error::BcoinsTooSmallToStake { .. } => 1008,
            Error::EmptyCdpTxid => 1009,
            Error::CdpNotLiquidateReady { .. } => 1010,
            Error::NotCdpOwner => 1011,
            Error::RedeemExceedsStaked { .. } => 1012,
            Error::InvalidSignature => 1013,

            // state reads: 2xxx
            Error::AccountNotFound(_) => 2001,
            Error::CdpNotFound(_) => 2002,
            Error::SysParamMissing(_) => 2003,

            // balances & arithmetic: 3xxx
            Error::InsufficientBalance { .. } => 3001,
            Error::InterestInsufficient { .. } => 3002,
            Error::ZeroMedianPrice(_) => 3003,
            Error::HeightError { .. } => 3004,
            Error::Overflow { .. } => 3005,
            Error::Underflow { .. } => 3006,
            Error::DivisionByZero { .. } => 3007,

            // orders & persistence: 4xxx
            Error::CreateSysOrderFailed => 4001,
            Error::BadSaveCdp(_) => 4002,
            Error::BadSaveAccount(_) => 4003,

            // serialization: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // internal: 9xxx
            Error::Storage(_) => 9001,
            Error::Internal(_) => 9002,
        }
    }
}
