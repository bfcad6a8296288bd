//! Account ledger entries.
//!
//! Each account holds per-symbol token slots; only the free portion is
//! touched by CDP operations. Accounts are keyed by their owner public key,
//! which doubles as the account id everywhere in the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::coin::CoinSymbol;
use crate::error::{Error, Result};
use crate::utils::constants::PUBKEY_LENGTH;
use crate::utils::crypto::PublicKey;

/// Account identifier: the owner's public key
pub type AccountId = PublicKey;

/// The well-known F-coin genesis account. Its free S-coin balance is the
/// protocol risk reserve that absorbs force-settled debt.
pub fn fcoin_genesis_uid() -> AccountId {
    PublicKey::new([0u8; PUBKEY_LENGTH])
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN SLOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-symbol balance breakdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSlot {
    /// Spendable balance
    pub free_amount: u64,
    /// Balance locked by open orders
    pub frozen_amount: u64,
    /// Balance staked for consensus
    pub staked_amount: u64,
}

/// Balance operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceOpType {
    /// Add to the free balance
    AddFree,
    /// Subtract from the free balance
    SubFree,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// A ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Owner public key (also the account id)
    pub owner: AccountId,
    tokens: BTreeMap<CoinSymbol, TokenSlot>,
}

impl Account {
    /// Create an empty account for the given owner
    pub fn new(owner: AccountId) -> Self {
        Self {
            owner,
            tokens: BTreeMap::new(),
        }
    }

    /// The token slot for a symbol (all-zero if never touched)
    pub fn token(&self, symbol: CoinSymbol) -> TokenSlot {
        self.tokens.get(&symbol).copied().unwrap_or_default()
    }

    /// Spendable balance for a symbol
    pub fn free_amount(&self, symbol: CoinSymbol) -> u64 {
        self.token(symbol).free_amount
    }

    /// Apply a typed balance operation.
    ///
    /// `SubFree` fails when the free balance is insufficient; `AddFree` fails
    /// on overflow. The account is unchanged on failure.
    pub fn operate_balance(
        &mut self,
        symbol: CoinSymbol,
        op: BalanceOpType,
        amount: u64,
    ) -> Result<()> {
        let slot = self.tokens.entry(symbol).or_default();
        match op {
            BalanceOpType::AddFree => {
                slot.free_amount =
                    slot.free_amount.checked_add(amount).ok_or(Error::Overflow {
                        operation: format!("{} free + {}", symbol, amount),
                    })?;
            }
            BalanceOpType::SubFree => {
                if slot.free_amount < amount {
                    return Err(Error::InsufficientBalance {
                        symbol,
                        required: amount,
                        available: slot.free_amount,
                    });
                }
                slot.free_amount -= amount;
            }
        }
        Ok(())
    }
}
