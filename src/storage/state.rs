//! Committed chain state: accounts, CDPs with their scan indexes, active
//! DEX orders, receipts, parameters and price feeds.
//!
//! `ChainState` is the single owner of every persistent record. Transactions
//! never touch it directly; they buffer mutations in a `TxCache` and the
//! block processor applies the resulting delta here, collecting an
//! `UndoRecord` that can replay the mutation in reverse on chain reorg.
//!
//! All maps are ordered so iteration, serialization and the state hash are
//! deterministic across nodes.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::core::account::{fcoin_genesis_uid, Account, AccountId, BalanceOpType};
use crate::core::cdp::Cdp;
use crate::core::coin::CoinSymbol;
use crate::core::receipt::Receipt;
use crate::dex::{OrderId, SysOrder};
use crate::error::{Error, Result};
use crate::oracle::PriceFeedStore;
use crate::params::SysParamStore;
use crate::storage::backend::{make_key, prefixes, StorageBackend, TypedStore};
use crate::utils::constants::COIN;
use crate::utils::crypto::{Hash, TxId};

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// The committed state of the CDP engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    accounts: BTreeMap<AccountId, Account>,
    cdps: BTreeMap<TxId, Cdp>,
    /// Ordered by price-independent ratio quotient, then cdpid
    ratio_index: BTreeSet<(u128, TxId)>,
    /// One open CDP per (owner, bcoin, scoin)
    owner_index: BTreeMap<(AccountId, CoinSymbol, CoinSymbol), TxId>,
    total_staked_bcoins: u64,
    total_owed_scoins: u64,
    active_orders: BTreeMap<OrderId, SysOrder>,
    receipts: BTreeMap<TxId, Vec<Receipt>>,
    /// Governance parameters
    pub params: SysParamStore,
    /// Per-block price feeds
    pub price_feeds: PriceFeedStore,
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}

impl ChainState {
    /// Fresh state with chain-default parameters and the risk-reserve
    /// account bootstrapped.
    pub fn new() -> Self {
        let mut accounts = BTreeMap::new();
        let reserve = fcoin_genesis_uid();
        accounts.insert(reserve, Account::new(reserve));

        Self {
            accounts,
            cdps: BTreeMap::new(),
            ratio_index: BTreeSet::new(),
            owner_index: BTreeMap::new(),
            total_staked_bcoins: 0,
            total_owed_scoins: 0,
            active_orders: BTreeMap::new(),
            receipts: BTreeMap::new(),
            params: SysParamStore::new(),
            price_feeds: PriceFeedStore::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCOUNTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Look up an account
    pub fn account(&self, uid: &AccountId) -> Option<&Account> {
        self.accounts.get(uid)
    }

    /// Register or replace an account
    pub fn set_account(&mut self, account: Account) {
        self.accounts.insert(account.owner, account);
    }

    /// Register an account and credit its free balance. Genesis/faucet
    /// helper; inside transactions balances only move through the cache.
    pub fn credit(&mut self, uid: AccountId, symbol: CoinSymbol, amount: u64) -> Result<()> {
        let account = self
            .accounts
            .entry(uid)
            .or_insert_with(|| Account::new(uid));
        account.operate_balance(symbol, BalanceOpType::AddFree, amount)
    }

    /// Free S-coin balance of the risk-reserve account
    pub fn risk_reserve_scoins(&self) -> u64 {
        self.account(&fcoin_genesis_uid())
            .map(|a| a.free_amount(CoinSymbol::Wusd))
            .unwrap_or(0)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CDPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Look up a CDP
    pub fn cdp(&self, cdpid: &TxId) -> Option<&Cdp> {
        self.cdps.get(cdpid)
    }

    /// Number of open CDPs
    pub fn cdp_count(&self) -> usize {
        self.cdps.len()
    }

    /// Total staked B-coins across all CDPs
    pub fn total_staked_bcoins(&self) -> u64 {
        self.total_staked_bcoins
    }

    /// Total owed S-coins across all CDPs
    pub fn total_owed_scoins(&self) -> u64 {
        self.total_owed_scoins
    }

    /// The open CDP of an owner on a coin pair, if any
    pub fn open_cdp_id(
        &self,
        owner: &AccountId,
        bcoin: CoinSymbol,
        scoin: CoinSymbol,
    ) -> Option<TxId> {
        self.owner_index.get(&(*owner, bcoin, scoin)).copied()
    }

    /// Insert or replace a CDP, maintaining both indexes and the aggregate
    /// totals.
    pub fn put_cdp(&mut self, cdp: Cdp) {
        if let Some(old) = self.cdps.remove(&cdp.cdpid) {
            self.strip_cdp_aggregates(&old);
        }
        self.ratio_index.insert((cdp.ratio_quotient(), cdp.cdpid));
        self.owner_index.insert(
            (cdp.owner, cdp.bcoin_symbol, cdp.scoin_symbol),
            cdp.cdpid,
        );
        self.total_staked_bcoins = self
            .total_staked_bcoins
            .saturating_add(cdp.total_staked_bcoins);
        self.total_owed_scoins = self.total_owed_scoins.saturating_add(cdp.total_owed_scoins);
        self.cdps.insert(cdp.cdpid, cdp);
    }

    /// Remove a CDP, maintaining indexes and totals
    pub fn remove_cdp(&mut self, cdpid: &TxId) -> Option<Cdp> {
        let cdp = self.cdps.remove(cdpid)?;
        self.strip_cdp_aggregates(&cdp);
        Some(cdp)
    }

    fn strip_cdp_aggregates(&mut self, cdp: &Cdp) {
        self.ratio_index.remove(&(cdp.ratio_quotient(), cdp.cdpid));
        self.owner_index
            .remove(&(cdp.owner, cdp.bcoin_symbol, cdp.scoin_symbol));
        self.total_staked_bcoins = self
            .total_staked_bcoins
            .saturating_sub(cdp.total_staked_bcoins);
        self.total_owed_scoins = self.total_owed_scoins.saturating_sub(cdp.total_owed_scoins);
    }

    /// Exactly the CDPs whose `ratio(price) < threshold`, sorted ascending by
    /// `(ratio, cdpid)`.
    ///
    /// The index key is the price-independent quotient `staked * COIN /
    /// owed`; scanning ascending we can stop as soon as the quotient alone
    /// proves the ratio is at or above the threshold, and filter the scanned
    /// prefix exactly.
    pub fn cdps_below_ratio(&self, threshold: u64, price: u64) -> Vec<Cdp> {
        let mut matches: Vec<Cdp> = Vec::new();
        for (quotient, cdpid) in &self.ratio_index {
            // floor(q * price / COIN) is a lower bound on the exact ratio
            let bound = quotient
                .checked_mul(price as u128)
                .map(|v| v / COIN as u128)
                .unwrap_or(u128::MAX);
            if bound >= threshold as u128 {
                break;
            }
            let cdp = match self.cdps.get(cdpid) {
                Some(cdp) => cdp,
                None => continue,
            };
            if cdp.collateral_ratio(price) < threshold {
                matches.push(cdp.clone());
            }
        }
        matches.sort_by_key(|cdp| (cdp.collateral_ratio(price), cdp.cdpid));
        matches
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // GLOBAL GUARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether the aggregate collateral ratio is below the floor
    pub fn global_floor_reached(&self, price: u64, floor: u64) -> bool {
        global_floor_reached(
            self.total_staked_bcoins,
            self.total_owed_scoins,
            price,
            floor,
        )
    }

    /// Whether adding `bcoins_to_stake` would exceed the ceiling
    pub fn global_ceiling_reached(&self, bcoins_to_stake: u64, ceiling: u64) -> bool {
        global_ceiling_reached(self.total_staked_bcoins, bcoins_to_stake, ceiling)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ORDERS & RECEIPTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Active system orders
    pub fn active_orders(&self) -> &BTreeMap<OrderId, SysOrder> {
        &self.active_orders
    }

    /// Receipts recorded for a transaction
    pub fn tx_receipts(&self, txid: &TxId) -> Option<&[Receipt]> {
        self.receipts.get(txid).map(|r| r.as_slice())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DELTA APPLICATION & UNDO
    // ═══════════════════════════════════════════════════════════════════════════

    /// Atomically apply a transaction's buffered mutations, returning the
    /// record that undoes them.
    pub fn apply_delta(&mut self, delta: StateDelta) -> UndoRecord {
        let mut ops = Vec::new();

        for (uid, account) in delta.accounts {
            let prev = self.accounts.insert(uid, account);
            ops.push(UndoOp::Account { uid, prev });
        }

        for (cdpid, entry) in delta.cdps {
            match entry {
                Some(cdp) => {
                    let prev = self.cdp(&cdpid).cloned();
                    self.put_cdp(cdp);
                    ops.push(UndoOp::CdpPut { cdpid, prev });
                }
                None => {
                    if let Some(prev) = self.remove_cdp(&cdpid) {
                        ops.push(UndoOp::CdpErase { prev });
                    }
                }
            }
        }

        for (id, order) in delta.orders {
            self.active_orders.insert(id, order);
            ops.push(UndoOp::Order { id });
        }

        for (txid, receipts) in delta.receipts {
            let prev = self.receipts.insert(txid, receipts);
            ops.push(UndoOp::Receipts { txid, prev });
        }

        UndoRecord { ops }
    }

    /// Replay an undo record, restoring the state that preceded the
    /// corresponding `apply_delta` byte-identically.
    pub fn apply_undo(&mut self, undo: UndoRecord) {
        for op in undo.ops.into_iter().rev() {
            match op {
                UndoOp::Account { uid, prev } => match prev {
                    Some(account) => {
                        self.accounts.insert(uid, account);
                    }
                    None => {
                        self.accounts.remove(&uid);
                    }
                },
                UndoOp::CdpPut { cdpid, prev } => {
                    self.remove_cdp(&cdpid);
                    if let Some(cdp) = prev {
                        self.put_cdp(cdp);
                    }
                }
                UndoOp::CdpErase { prev } => {
                    self.put_cdp(prev);
                }
                UndoOp::Order { id } => {
                    self.active_orders.remove(&id);
                }
                UndoOp::Receipts { txid, prev } => match prev {
                    Some(receipts) => {
                        self.receipts.insert(txid, receipts);
                    }
                    None => {
                        self.receipts.remove(&txid);
                    }
                },
            }
        }
    }

    /// Deterministic digest of the full state
    pub fn state_hash(&self) -> Hash {
        let bytes = bincode::serialize(self).unwrap_or_default();
        Hash::sha256(&bytes)
    }
}

/// Aggregate floor check shared by the committed state and the cache overlay
pub(crate) fn global_floor_reached(
    total_staked: u64,
    total_owed: u64,
    price: u64,
    floor: u64,
) -> bool {
    if total_owed == 0 {
        return false;
    }
    let ratio = (total_staked as u128) * (price as u128) / (total_owed as u128);
    ratio < floor as u128
}

/// Aggregate ceiling check shared by the committed state and the cache overlay
pub(crate) fn global_ceiling_reached(total_staked: u64, added: u64, ceiling: u64) -> bool {
    (total_staked as u128) + (added as u128) > ceiling as u128
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELTA & UNDO TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Buffered mutations of a single transaction, produced by `TxCache`
#[derive(Debug, Clone, Default)]
pub struct StateDelta {
    pub(crate) accounts: BTreeMap<AccountId, Account>,
    /// `Some` = insert/replace, `None` = erase
    pub(crate) cdps: BTreeMap<TxId, Option<Cdp>>,
    pub(crate) orders: Vec<(OrderId, SysOrder)>,
    pub(crate) receipts: Vec<(TxId, Vec<Receipt>)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
enum UndoOp {
    Account {
        uid: AccountId,
        prev: Option<Account>,
    },
    CdpPut {
        cdpid: TxId,
        prev: Option<Cdp>,
    },
    CdpErase {
        prev: Cdp,
    },
    Order {
        id: OrderId,
    },
    Receipts {
        txid: TxId,
        prev: Option<Vec<Receipt>>,
    },
}

/// Reversible record of one transaction's committed mutations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    ops: Vec<UndoOp>,
}

impl UndoRecord {
    /// Whether the transaction mutated anything
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Everything persisted outside the per-entity CDP/account families
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChainMeta {
    params: SysParamStore,
    price_feeds: PriceFeedStore,
    active_orders: BTreeMap<OrderId, SysOrder>,
    receipts: BTreeMap<TxId, Vec<Receipt>>,
}

/// Persists committed state snapshots through a storage backend
pub struct StateManager<B: StorageBackend> {
    store: TypedStore<B>,
}

impl<B: StorageBackend> StateManager<B> {
    /// Wrap a backend
    pub fn new(backend: B) -> Self {
        Self {
            store: TypedStore::new(backend),
        }
    }

    /// Persist a full snapshot of the chain state
    pub fn save(&self, state: &ChainState) -> Result<()> {
        // stale per-entity keys from a prior snapshot must not survive
        for key in self.store.list_prefix(prefixes::ACCOUNT)? {
            self.store.delete(&key)?;
        }
        for key in self.store.list_prefix(prefixes::CDP)? {
            self.store.delete(&key)?;
        }

        for (uid, account) in &state.accounts {
            self.store
                .set(&make_key(prefixes::ACCOUNT, uid.as_bytes()), account)?;
        }
        for (cdpid, cdp) in &state.cdps {
            self.store
                .set(&make_key(prefixes::CDP, cdpid.as_bytes()), cdp)?;
        }

        let meta = ChainMeta {
            params: state.params.clone(),
            price_feeds: state.price_feeds.clone(),
            active_orders: state.active_orders.clone(),
            receipts: state.receipts.clone(),
        };
        self.store.set(&make_key(prefixes::META, b"chain"), &meta)?;
        self.store.flush()
    }

    /// Load the last persisted snapshot, or a fresh state when none exists
    pub fn load(&self) -> Result<ChainState> {
        let mut state = ChainState::new();

        for key in self.store.list_prefix(prefixes::ACCOUNT)? {
            let account: Account = self
                .store
                .get(&key)?
                .ok_or_else(|| Error::Storage("account key vanished during load".into()))?;
            state.set_account(account);
        }

        for key in self.store.list_prefix(prefixes::CDP)? {
            let cdp: Cdp = self
                .store
                .get(&key)?
                .ok_or_else(|| Error::Storage("cdp key vanished during load".into()))?;
            state.put_cdp(cdp);
        }

        if let Some(meta) = self.store.get::<ChainMeta>(&make_key(prefixes::META, b"chain"))? {
            state.params = meta.params;
            state.price_feeds = meta.price_feeds;
            state.active_orders = meta.active_orders;
            state.receipts = meta.receipts;
        }

        Ok(state)
    }
}
