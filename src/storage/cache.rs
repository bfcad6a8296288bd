//! Per-transaction cache overlay.
//!
//! Every transaction executes against a `TxCache` layered over the committed
//! `ChainState`. Reads fall through to the base; writes are buffered in the
//! overlay. A successful execution converts the cache into a `StateDelta`
//! that the block processor applies atomically; a failed execution simply
//! drops the cache, leaving the base untouched.

use std::collections::BTreeMap;

use crate::core::account::{Account, AccountId};
use crate::core::cdp::Cdp;
use crate::core::coin::CoinSymbol;
use crate::core::receipt::Receipt;
use crate::dex::{OrderId, SysOrder};
use crate::error::{Error, Result};
use crate::params::SysParam;
use crate::storage::state::{
    global_ceiling_reached, global_floor_reached, ChainState, StateDelta,
};
use crate::utils::crypto::TxId;

/// Transactional overlay over the committed chain state
pub struct TxCache<'a> {
    base: &'a ChainState,
    accounts: BTreeMap<AccountId, Account>,
    /// `Some` = inserted/updated, `None` = erased
    cdps: BTreeMap<TxId, Option<Cdp>>,
    orders: Vec<(OrderId, SysOrder)>,
    order_seq: u32,
    receipts: Vec<(TxId, Vec<Receipt>)>,
    staked_delta: i128,
    owed_delta: i128,
}

impl<'a> TxCache<'a> {
    /// Open a fresh overlay over the committed state
    pub fn new(base: &'a ChainState) -> Self {
        Self {
            base,
            accounts: BTreeMap::new(),
            cdps: BTreeMap::new(),
            orders: Vec::new(),
            order_seq: 0,
            receipts: Vec::new(),
            staked_delta: 0,
            owed_delta: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCOUNTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load an account by id (overlay first, then base)
    pub fn account(&self, uid: &AccountId) -> Result<Account> {
        if let Some(account) = self.accounts.get(uid) {
            return Ok(account.clone());
        }
        self.base
            .account(uid)
            .cloned()
            .ok_or_else(|| Error::AccountNotFound(uid.to_hex()))
    }

    /// Whether the account exists at all
    pub fn account_exists(&self, uid: &AccountId) -> bool {
        self.accounts.contains_key(uid) || self.base.account(uid).is_some()
    }

    /// Buffer an account write
    pub fn save_account(&mut self, account: Account) {
        self.accounts.insert(account.owner, account);
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CDPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Load a CDP by id (overlay first, then base)
    pub fn cdp(&self, cdpid: &TxId) -> Result<Cdp> {
        match self.cdps.get(cdpid) {
            Some(Some(cdp)) => Ok(cdp.clone()),
            Some(None) => Err(Error::CdpNotFound(cdpid.to_hex())),
            None => self
                .base
                .cdp(cdpid)
                .cloned()
                .ok_or_else(|| Error::CdpNotFound(cdpid.to_hex())),
        }
    }

    /// Whether an owner already has an open CDP on a pair, overlay-aware
    pub fn has_open_cdp(&self, owner: &AccountId, bcoin: CoinSymbol, scoin: CoinSymbol) -> bool {
        if let Some(cdpid) = self.base.open_cdp_id(owner, bcoin, scoin) {
            if !matches!(self.cdps.get(&cdpid), Some(None)) {
                return true;
            }
        }
        self.cdps.values().any(|entry| {
            entry.as_ref().is_some_and(|cdp| {
                cdp.owner == *owner && cdp.bcoin_symbol == bcoin && cdp.scoin_symbol == scoin
            })
        })
    }

    /// Register a newly created CDP, enforcing the one-open-CDP constraint
    pub fn new_cdp(&mut self, cdp: Cdp) -> Result<()> {
        if self.has_open_cdp(&cdp.owner, cdp.bcoin_symbol, cdp.scoin_symbol) {
            return Err(Error::HasOpenCdp);
        }
        if self.cdp(&cdp.cdpid).is_ok() {
            return Err(Error::BadSaveCdp(format!(
                "cdp {} already exists",
                cdp.cdpid.short()
            )));
        }
        self.staked_delta += cdp.total_staked_bcoins as i128;
        self.owed_delta += cdp.total_owed_scoins as i128;
        self.cdps.insert(cdp.cdpid, Some(cdp));
        Ok(())
    }

    /// Buffer an update of an existing CDP
    pub fn update_cdp(&mut self, cdp: Cdp) -> Result<()> {
        let prev = self.cdp(&cdp.cdpid)?;
        self.staked_delta += cdp.total_staked_bcoins as i128 - prev.total_staked_bcoins as i128;
        self.owed_delta += cdp.total_owed_scoins as i128 - prev.total_owed_scoins as i128;
        self.cdps.insert(cdp.cdpid, Some(cdp));
        Ok(())
    }

    /// Buffer erasure of a CDP
    pub fn erase_cdp(&mut self, cdpid: &TxId) -> Result<()> {
        let prev = self.cdp(cdpid)?;
        self.staked_delta -= prev.total_staked_bcoins as i128;
        self.owed_delta -= prev.total_owed_scoins as i128;
        self.cdps.insert(*cdpid, None);
        Ok(())
    }

    /// Exactly the CDPs whose `ratio(price) < threshold`, overlay-merged and
    /// sorted ascending by `(ratio, cdpid)`.
    pub fn cdps_below_ratio(&self, threshold: u64, price: u64) -> Vec<Cdp> {
        let mut matches: Vec<Cdp> = self
            .base
            .cdps_below_ratio(threshold, price)
            .into_iter()
            .filter(|cdp| !self.cdps.contains_key(&cdp.cdpid))
            .collect();

        for entry in self.cdps.values() {
            if let Some(cdp) = entry {
                if cdp.collateral_ratio(price) < threshold {
                    matches.push(cdp.clone());
                }
            }
        }

        matches.sort_by_key(|cdp| (cdp.collateral_ratio(price), cdp.cdpid));
        matches
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GLOBAL GUARDS
    // ═══════════════════════════════════════════════════════════════════════════

    fn overlay_totals(&self) -> (u64, u64) {
        let staked = (self.base.total_staked_bcoins() as i128 + self.staked_delta).max(0) as u64;
        let owed = (self.base.total_owed_scoins() as i128 + self.owed_delta).max(0) as u64;
        (staked, owed)
    }

    /// Whether the aggregate collateral ratio is below the floor
    pub fn global_floor_reached(&self, price: u64, floor: u64) -> bool {
        let (staked, owed) = self.overlay_totals();
        global_floor_reached(staked, owed, price, floor)
    }

    /// Whether adding `bcoins_to_stake` would exceed the ceiling
    pub fn global_ceiling_reached(&self, bcoins_to_stake: u64, ceiling: u64) -> bool {
        let (staked, _) = self.overlay_totals();
        global_ceiling_reached(staked, bcoins_to_stake, ceiling)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PARAMETERS & PRICES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Read a governance parameter
    pub fn param(&self, param: SysParam) -> Result<u64> {
        self.base
            .params
            .get(param)
            .map_err(|_| Error::SysParamMissing(param.name()))
    }

    /// Sliding-window median price for a symbol at the given height.
    ///
    /// A zero median is a hard error for every ratio-dependent caller.
    pub fn median_price(&self, symbol: CoinSymbol, height: u32) -> Result<u64> {
        let price = self.median_price_raw(symbol, height)?;
        if price == 0 {
            return Err(Error::ZeroMedianPrice(symbol));
        }
        Ok(price)
    }

    /// Sliding-window median price without the zero guard
    pub fn median_price_raw(&self, symbol: CoinSymbol, height: u32) -> Result<u64> {
        let window = self.param(SysParam::MedianPriceSlideWindowBlockCount)?;
        Ok(self
            .base
            .price_feeds
            .median_price(symbol, height, window.min(u32::MAX as u64) as u32))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ORDERS & RECEIPTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Submit a system market order under the placing txid
    pub fn create_sys_order(&mut self, txid: TxId, order: SysOrder) -> Result<()> {
        if order.amount == 0 {
            return Err(Error::CreateSysOrderFailed);
        }
        let id = (txid, self.order_seq);
        self.order_seq += 1;
        self.orders.push((id, order));
        Ok(())
    }

    /// Record the receipts of the executing transaction
    pub fn set_receipts(&mut self, txid: TxId, receipts: Vec<Receipt>) {
        self.receipts.push((txid, receipts));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COMMIT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Convert the overlay into a delta for atomic application
    pub fn into_delta(self) -> StateDelta {
        StateDelta {
            accounts: self.accounts,
            cdps: self.cdps,
            orders: self.orders,
            receipts: self.receipts,
        }
    }
}
