//! Chain-wide constants and magic numbers.
//!
//! All consensus-critical constants are defined here for easy auditing.

// ═══════════════════════════════════════════════════════════════════════════════
// MONETARY SCALE
// ═══════════════════════════════════════════════════════════════════════════════

/// Atomic units per coin (1 COIN = 10^8)
pub const COIN: u64 = 100_000_000;

/// Boosted percent scale: 10000 represents 100%
pub const PERCENT_BOOST: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK TIMING
// ═══════════════════════════════════════════════════════════════════════════════

/// Blocks produced per day (10-second block interval)
pub const BLOCKS_PER_DAY: u32 = 8_640;

/// Days used for annualized interest
pub const DAYS_PER_YEAR: u64 = 365;

/// Window, in blocks, within which a transaction's valid height must fall
pub const TX_VALID_HEIGHT_WINDOW: u32 = BLOCKS_PER_DAY;

// ═══════════════════════════════════════════════════════════════════════════════
// FEES
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum fee for a user transaction, in atomic units of the fee symbol
pub const MIN_TX_FEE: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// CRYPTOGRAPHIC LENGTHS
// ═══════════════════════════════════════════════════════════════════════════════

/// Length of a compressed secp256k1 public key in bytes
pub const PUBKEY_LENGTH: usize = 33;

/// Length of a compact ECDSA signature in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of a SHA-256 hash in bytes
pub const HASH_LENGTH: usize = 32;

/// Length of a transaction id in bytes
pub const TXID_LENGTH: usize = 32;
