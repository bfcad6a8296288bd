//! End-to-end tests for the CDP transaction engine.
//!
//! These drive full transactions through check, execute and atomic commit,
//! covering the CDP lifecycle, the liquidation regimes, block-median force
//! settlement, and the undo/conservation invariants.

use std::collections::BTreeMap;

use wusd_engine::core::coin::CoinSymbol;
use wusd_engine::prelude::*;
use wusd_engine::utils::constants::{BLOCKS_PER_DAY, MIN_TX_FEE};

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const FEE: u64 = MIN_TX_FEE;

/// Feed `price` for `symbol` at every height in `from..=to`
fn feed_prices(state: &mut ChainState, symbol: CoinSymbol, from: u32, to: u32, price: u64) {
    for height in from..=to {
        state.price_feeds.push_price(symbol, height, price);
    }
}

fn signed(
    keypair: &KeyPair,
    valid_height: u32,
    fee_symbol: CoinSymbol,
    fees: u64,
    payload: TxPayload,
) -> Transaction {
    let mut tx = Transaction::new(valid_height, *keypair.public_key(), fee_symbol, fees, payload);
    tx.sign(keypair);
    tx
}

fn stake_tx(
    keypair: &KeyPair,
    height: u32,
    cdp_txid: Option<TxId>,
    bcoins_to_stake: u64,
    scoins_to_mint: u64,
) -> Transaction {
    signed(
        keypair,
        height,
        CoinSymbol::Wicc,
        FEE,
        TxPayload::Stake(StakeTx {
            cdp_txid,
            bcoin_symbol: CoinSymbol::Wicc,
            scoin_symbol: CoinSymbol::Wusd,
            bcoins_to_stake,
            scoins_to_mint,
        }),
    )
}

fn redeem_tx(
    keypair: &KeyPair,
    height: u32,
    cdp_txid: TxId,
    scoins_to_repay: u64,
    bcoins_to_redeem: u64,
) -> Transaction {
    signed(
        keypair,
        height,
        CoinSymbol::Wicc,
        FEE,
        TxPayload::Redeem(RedeemTx {
            cdp_txid,
            scoins_to_repay,
            bcoins_to_redeem,
        }),
    )
}

fn liquidate_tx(
    keypair: &KeyPair,
    height: u32,
    cdp_txid: TxId,
    scoins_to_liquidate: u64,
) -> Transaction {
    signed(
        keypair,
        height,
        CoinSymbol::Wusd,
        FEE,
        TxPayload::Liquidate(LiquidateTx {
            cdp_txid,
            scoins_to_liquidate,
        }),
    )
}

fn median_tx(keypair: &KeyPair, height: u32, points: &[(CoinSymbol, u64)]) -> Transaction {
    signed(
        keypair,
        height,
        CoinSymbol::Wicc,
        0,
        TxPayload::BlockMedian(BlockMedianTx {
            median_price_points: points.iter().copied().collect::<BTreeMap<_, _>>(),
        }),
    )
}

fn free(state: &ChainState, uid: &AccountId, symbol: CoinSymbol) -> u64 {
    state.account(uid).map(|a| a.free_amount(symbol)).unwrap_or(0)
}

/// State at height 100 with a 25000 bcoin price in the whole window
fn fresh_chain() -> ChainState {
    let mut state = ChainState::new();
    feed_prices(&mut state, CoinSymbol::Wicc, 90, 100, 25_000);
    state
}

// ═══════════════════════════════════════════════════════════════════════════════
// CDP LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_create_cdp() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let tx = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = tx.txid();
    process_tx(&mut state, &tx, 100, 0).unwrap();

    let cdp = state.cdp(&cdpid).unwrap();
    assert_eq!(cdp.owner, uid);
    assert_eq!(cdp.total_staked_bcoins, 10 * COIN);
    assert_eq!(cdp.total_owed_scoins, COIN);
    assert_eq!(cdp.block_height, 100);

    assert_eq!(free(&state, &uid, CoinSymbol::Wicc), 0);
    assert_eq!(free(&state, &uid, CoinSymbol::Wusd), COIN);
    assert_eq!(state.total_staked_bcoins(), 10 * COIN);
    assert_eq!(state.total_owed_scoins(), COIN);

    let receipts = state.tx_receipts(&cdpid).unwrap();
    assert_eq!(receipts.len(), 1);
    assert_eq!(receipts[0].from, None);
    assert_eq!(receipts[0].to, Some(uid));
    assert_eq!(receipts[0].coin_symbol, CoinSymbol::Wusd);
    assert_eq!(receipts[0].amount, COIN);
}

#[test]
fn test_full_cdp_lifecycle() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 4 * FEE)
        .unwrap();

    // create: 10 bcoins staked, 1 scoin minted (ratio 250000)
    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    // additional mint in the same block: partial ratio is 0 but the total
    // ratio 83333 carries the acceptance
    let mint = stake_tx(&owner, 100, Some(cdpid), 0, 2 * COIN);
    process_tx(&mut state, &mint, 100, 1).unwrap();
    {
        let cdp = state.cdp(&cdpid).unwrap();
        assert_eq!(cdp.total_owed_scoins, 3 * COIN);
        assert_eq!(free(&state, &uid, CoinSymbol::Wusd), 3 * COIN);
    }

    // partial redeem: repay 1, take back 3 (post ratio 87500)
    let partial = redeem_tx(&owner, 100, cdpid, COIN, 3 * COIN);
    process_tx(&mut state, &partial, 100, 2).unwrap();
    {
        let cdp = state.cdp(&cdpid).unwrap();
        assert_eq!(cdp.total_staked_bcoins, 7 * COIN);
        assert_eq!(cdp.total_owed_scoins, 2 * COIN);
        assert_eq!(free(&state, &uid, CoinSymbol::Wusd), 2 * COIN);
        assert_eq!(free(&state, &uid, CoinSymbol::Wicc), 3 * COIN + FEE);
    }

    // full redeem erases the CDP and returns everything
    let full = redeem_tx(&owner, 100, cdpid, 2 * COIN, 7 * COIN);
    process_tx(&mut state, &full, 100, 3).unwrap();

    assert!(state.cdp(&cdpid).is_none());
    assert_eq!(free(&state, &uid, CoinSymbol::Wicc), 10 * COIN);
    assert_eq!(free(&state, &uid, CoinSymbol::Wusd), 0);
    assert_eq!(state.total_staked_bcoins(), 0);
    assert_eq!(state.total_owed_scoins(), 0);
}

#[test]
fn test_second_cdp_on_pair_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 20 * COIN + 2 * FEE)
        .unwrap();

    let first = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    process_tx(&mut state, &first, 100, 0).unwrap();

    let second = stake_tx(&owner, 100, None, 5 * COIN, COIN);
    let err = process_tx(&mut state, &second, 100, 1).unwrap_err();
    assert_eq!(err.reject_reason(), "has-open-cdp");
}

#[test]
fn test_create_below_start_ratio_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    // 1 bcoin against 2 scoins at price 25000: ratio 12500 < 20000
    let tx = stake_tx(&owner, 100, None, COIN, 2 * COIN);
    let err = process_tx(&mut state, &tx, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "CDP-collateral-ratio-toosmall");
}

#[test]
fn test_create_below_min_stake_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, COIN).unwrap();

    let tx = stake_tx(&owner, 100, None, COIN / 2, 0);
    let err = process_tx(&mut state, &tx, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "bcoins-too-small-to-stake");
}

#[test]
fn test_partial_redeem_below_start_ratio_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 2 * FEE)
        .unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    // taking back 9.5 leaves ratio 0.5 * 25000 / 1 = 12500 < 20000
    let tx = redeem_tx(&owner, 100, cdpid, 0, 9 * COIN + COIN / 2);
    let err = process_tx(&mut state, &tx, 100, 1).unwrap_err();
    assert_eq!(err.reject_reason(), "CDP-collateral-ratio-toosmall");
    // aborted whole: nothing changed
    assert_eq!(state.cdp(&cdpid).unwrap().total_staked_bcoins, 10 * COIN);
    assert_eq!(free(&state, &uid, CoinSymbol::Wicc), FEE);
}

#[test]
fn test_redeem_more_than_staked_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 2 * FEE)
        .unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    let tx = redeem_tx(&owner, 100, cdpid, 0, 11 * COIN);
    let err = process_tx(&mut state, &tx, 100, 1).unwrap_err();
    assert_eq!(err.reject_reason(), "redeem-bcoins-exceed-staked");
}

#[test]
fn test_stranger_cannot_redeem() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    let stranger = KeyPair::generate();
    state
        .credit(*stranger.public_key(), CoinSymbol::Wicc, FEE)
        .unwrap();
    let tx = redeem_tx(&stranger, 100, cdpid, 0, COIN);
    let err = process_tx(&mut state, &tx, 100, 1).unwrap_err();
    assert_eq!(err.reject_reason(), "not-cdp-owner");
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTEREST
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_interest_settled_through_dex_burn() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 2 * FEE)
        .unwrap();
    state.credit(uid, CoinSymbol::Wusd, COIN).unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();
    assert_eq!(free(&state, &uid, CoinSymbol::Wusd), 2 * COIN);

    // one day later: 1 loaned day of interest on 1 COIN owed
    let later = 100 + BLOCKS_PER_DAY;
    feed_prices(&mut state, CoinSymbol::Wicc, later - 10, later, 25_000);

    let touch = stake_tx(&owner, later, Some(cdpid), 0, 0);
    process_tx(&mut state, &touch, later, 0).unwrap();

    let balance = free(&state, &uid, CoinSymbol::Wusd);
    let interest = 2 * COIN - balance;
    // rate 0.2 / log10(2), one day: ~182k atomic units
    assert!(interest > 180_000 && interest < 184_000, "interest = {}", interest);

    // exactly one system buy order carries the interest into the F-coin burn
    let orders: Vec<_> = state.active_orders().values().collect();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].side, OrderSide::Buy);
    assert_eq!(orders[0].coin_symbol, CoinSymbol::Wusd);
    assert_eq!(orders[0].asset_symbol, CoinSymbol::Wgrt);
    assert_eq!(orders[0].amount, interest);

    // anchor height moved, so touching again in the same block is free
    assert_eq!(state.cdp(&cdpid).unwrap().block_height, later);
}

#[test]
fn test_interest_insufficient_rejects() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 3 * FEE)
        .unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    // drain the scoin balance down to one atomic unit
    let drain = redeem_tx(&owner, 100, cdpid, COIN - 1, 0);
    process_tx(&mut state, &drain, 100, 1).unwrap();
    assert_eq!(free(&state, &uid, CoinSymbol::Wusd), 1);

    let later = 100 + BLOCKS_PER_DAY;
    feed_prices(&mut state, CoinSymbol::Wicc, later - 10, later, 25_000);

    let touch = stake_tx(&owner, later, Some(cdpid), 0, 0);
    let err = process_tx(&mut state, &touch, later, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "interest-insufficient-error");
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// CDP with M = N = 10 COIN at a crashed price of 13000 (ratio 13000)
fn liquidation_setup() -> (ChainState, KeyPair, KeyPair, TxId) {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, 10 * COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    feed_prices(&mut state, CoinSymbol::Wicc, 101, 111, 13_000);

    let liquidator = KeyPair::generate();
    state
        .credit(*liquidator.public_key(), CoinSymbol::Wusd, 12 * COIN + FEE)
        .unwrap();

    (state, owner, liquidator, cdpid)
}

#[test]
fn test_full_liquidation_healthy_regime() {
    let (mut state, owner, liquidator, cdpid) = liquidation_setup();
    let owner_uid = *owner.public_key();
    let liq_uid = *liquidator.public_key();

    let tx = liquidate_tx(&liquidator, 111, cdpid, 11 * COIN);
    let txid = tx.txid();
    process_tx(&mut state, &tx, 111, 0).unwrap();

    // scoins_needed = 10 COIN * 1.13 * 0.97 = 1_096_100_000
    // liquidator leg = 10 COIN * 11300 / 13000 = 869_230_769
    // owner leg     = 130_769_231; penalty = 96_100_000
    assert!(state.cdp(&cdpid).is_none());
    assert_eq!(
        free(&state, &liq_uid, CoinSymbol::Wusd),
        12 * COIN - 1_096_100_000
    );
    assert_eq!(free(&state, &liq_uid, CoinSymbol::Wicc), 869_230_769);
    assert_eq!(free(&state, &owner_uid, CoinSymbol::Wicc), 130_769_231);

    // penalty below the system-order minimum: all of it to the reserve
    assert_eq!(state.risk_reserve_scoins(), 96_100_000);
    assert!(state.active_orders().is_empty());

    let receipts = state.tx_receipts(&txid).unwrap();
    assert_eq!(receipts.len(), 3);
    assert_eq!(receipts[0].amount, 1_096_100_000 + 96_100_000);
    assert_eq!(receipts[1].amount, 869_230_769);
    assert_eq!(receipts[2].amount, 130_769_231);

    // every bcoin that left the CDP arrived at liquidator or owner
    assert_eq!(
        free(&state, &liq_uid, CoinSymbol::Wicc) + free(&state, &owner_uid, CoinSymbol::Wicc),
        10 * COIN
    );
}

#[test]
fn test_partial_liquidation_scales_all_legs() {
    let (mut state, owner, liquidator, cdpid) = liquidation_setup();
    let owner_uid = *owner.public_key();
    let liq_uid = *liquidator.public_key();

    // exactly half of scoins_needed
    let tx = liquidate_tx(&liquidator, 111, cdpid, 548_050_000);
    process_tx(&mut state, &tx, 111, 0).unwrap();

    let liq_out = free(&state, &liq_uid, CoinSymbol::Wicc);
    let owner_out = free(&state, &owner_uid, CoinSymbol::Wicc);
    assert_eq!(liq_out, 434_615_384); // floor(869_230_769 / 2)
    assert_eq!(owner_out, 65_384_615); // floor(130_769_231 / 2)

    let cdp = state.cdp(&cdpid).unwrap();
    assert_eq!(cdp.total_owed_scoins, 5 * COIN);
    assert_eq!(cdp.total_staked_bcoins, 10 * COIN - liq_out - owner_out);
    assert_eq!(cdp.block_height, 111);

    // half the penalty
    assert_eq!(state.risk_reserve_scoins(), 48_050_000);
}

#[test]
fn test_healthy_cdp_not_liquidatable() {
    let (mut state, _owner, liquidator, cdpid) = liquidation_setup();

    // price recovers: ratio 25000 > start liquidate ratio 15000
    feed_prices(&mut state, CoinSymbol::Wicc, 112, 122, 25_000);
    let tx = liquidate_tx(&liquidator, 122, cdpid, 11 * COIN);
    let err = process_tx(&mut state, &tx, 122, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "cdp-not-liquidate-ready");
}

#[test]
fn test_liquidator_needs_the_scoins() {
    let (mut state, _owner, _liquidator, cdpid) = liquidation_setup();

    let poor = KeyPair::generate();
    state
        .credit(*poor.public_key(), CoinSymbol::Wusd, COIN)
        .unwrap();
    let tx = liquidate_tx(&poor, 111, cdpid, 2 * COIN);
    let err = process_tx(&mut state, &tx, 111, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "bad-operate-account");
}

#[test]
fn test_insolvent_regime_backstop() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, 10 * COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    // ratio 10000 <= force ratio 10400: backstop regime, but keep the global
    // ratio above the 80% floor
    feed_prices(&mut state, CoinSymbol::Wicc, 101, 111, 10_000);

    let liquidator = KeyPair::generate();
    let liq_uid = *liquidator.public_key();
    state
        .credit(liq_uid, CoinSymbol::Wusd, 11 * COIN + FEE)
        .unwrap();

    let tx = liquidate_tx(&liquidator, 111, cdpid, 10 * COIN);
    process_tx(&mut state, &tx, 111, 0).unwrap();

    // liquidator pays exactly N, takes all collateral; no penalty
    assert!(state.cdp(&cdpid).is_none());
    assert_eq!(free(&state, &liq_uid, CoinSymbol::Wusd), COIN);
    assert_eq!(free(&state, &liq_uid, CoinSymbol::Wicc), 10 * COIN);
    assert_eq!(free(&state, &uid, CoinSymbol::Wicc), 0);
    assert_eq!(state.risk_reserve_scoins(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK MEDIAN FORCE SETTLEMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Two underwater CDPs (owed 10, collateral worth 9) at height 111
fn settlement_setup() -> (ChainState, KeyPair, TxId, TxId) {
    let mut state = fresh_chain();

    let mut cdpids = Vec::new();
    for _ in 0..2 {
        let owner = KeyPair::generate();
        let uid = *owner.public_key();
        state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();
        let create = stake_tx(&owner, 100, None, 10 * COIN, 10 * COIN);
        cdpids.push(create.txid());
        process_tx(&mut state, &create, 100, cdpids.len() as u32 - 1).unwrap();
    }

    // ratio 9000 < force ratio 10400, global ratio 9000 above the 8000 floor
    feed_prices(&mut state, CoinSymbol::Wicc, 101, 111, 9_000);
    feed_prices(&mut state, CoinSymbol::Wgrt, 101, 111, 5_000);

    let miner = KeyPair::generate();
    state.credit(*miner.public_key(), CoinSymbol::Wicc, 0).unwrap();

    (state, miner, cdpids[0], cdpids[1])
}

#[test]
fn test_force_settlement_settles_all_covered_cdps() {
    let (mut state, miner, cdp_a, cdp_b) = settlement_setup();

    // reserve covers both owed totals, with one unit to spare
    state
        .credit(fcoin_genesis_uid(), CoinSymbol::Wusd, 20 * COIN + 1)
        .unwrap();

    let tx = median_tx(&miner, 111, &[(CoinSymbol::Wicc, 9_000)]);
    process_tx(&mut state, &tx, 111, 0).unwrap();

    assert!(state.cdp(&cdp_a).is_none());
    assert!(state.cdp(&cdp_b).is_none());
    assert_eq!(state.risk_reserve_scoins(), 1);

    // per CDP: one collateral sell order and one F-coin inflation order
    // (shortfall 1 COIN at f-price 5000 => 2 COIN of WGRT)
    let orders: Vec<_> = state.active_orders().values().collect();
    assert_eq!(orders.len(), 4);
    let bcoin_sells: Vec<_> = orders
        .iter()
        .filter(|o| o.side == OrderSide::Sell && o.asset_symbol == CoinSymbol::Wicc)
        .collect();
    let fcoin_sells: Vec<_> = orders
        .iter()
        .filter(|o| o.side == OrderSide::Sell && o.asset_symbol == CoinSymbol::Wgrt)
        .collect();
    assert_eq!(bcoin_sells.len(), 2);
    assert_eq!(fcoin_sells.len(), 2);
    assert!(bcoin_sells.iter().all(|o| o.amount == 10 * COIN));
    assert!(fcoin_sells.iter().all(|o| o.amount == 2 * COIN));
}

#[test]
fn test_force_settlement_stops_on_reserve_exhaustion() {
    let (mut state, miner, cdp_a, cdp_b) = settlement_setup();

    // covers exactly one CDP's owed total plus 5 units
    state
        .credit(fcoin_genesis_uid(), CoinSymbol::Wusd, 10 * COIN + 5)
        .unwrap();

    let tx = median_tx(&miner, 111, &[(CoinSymbol::Wicc, 9_000)]);
    // the loop stopping early is still a successful transaction
    process_tx(&mut state, &tx, 111, 0).unwrap();

    // equal ratios: ascending cdpid breaks the tie
    let (settled, remaining) = if cdp_a < cdp_b {
        (cdp_a, cdp_b)
    } else {
        (cdp_b, cdp_a)
    };
    assert!(state.cdp(&settled).is_none());
    assert!(state.cdp(&remaining).is_some());
    assert_eq!(state.risk_reserve_scoins(), 5);
    assert_eq!(state.active_orders().len(), 2);
}

#[test]
fn test_force_settlement_noop_when_floor_reached() {
    let (mut state, miner, cdp_a, cdp_b) = settlement_setup();
    state
        .credit(fcoin_genesis_uid(), CoinSymbol::Wusd, 20 * COIN + 1)
        .unwrap();

    // crash below the 80% global floor
    feed_prices(&mut state, CoinSymbol::Wicc, 112, 122, 5_000);
    let tx = median_tx(&miner, 122, &[(CoinSymbol::Wicc, 5_000)]);
    process_tx(&mut state, &tx, 122, 0).unwrap();

    // recorded as a no-op: nothing settled, reserve untouched
    assert!(state.cdp(&cdp_a).is_some());
    assert!(state.cdp(&cdp_b).is_some());
    assert_eq!(state.risk_reserve_scoins(), 20 * COIN + 1);
    assert!(state.active_orders().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// GLOBAL GUARDS & REJECTIONS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stake_rejected_when_floor_reached() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 20 * COIN + 2 * FEE)
        .unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, 10 * COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    // global ratio 5000 < floor 8000: all risk-taking txs blocked
    feed_prices(&mut state, CoinSymbol::Wicc, 101, 111, 5_000);
    let grow = stake_tx(&owner, 111, Some(cdpid), COIN, 0);
    let err = process_tx(&mut state, &grow, 111, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "global-collateral-floor-reached");
}

#[test]
fn test_stake_rejected_when_ceiling_reached() {
    let mut state = fresh_chain();
    state
        .params
        .set(SysParam::GlobalCollateralCeilingAmount, 5 * COIN)
        .unwrap();

    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let tx = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let err = process_tx(&mut state, &tx, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "global-collateral-ceiling-reached");
}

#[test]
fn test_zero_price_rejects_ratio_dependent_txs() {
    let mut state = ChainState::new(); // no feed data at all
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let tx = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let err = process_tx(&mut state, &tx, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "get-bcoin-median-price-error");
}

#[test]
fn test_tampered_signature_rejected() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let mut tx = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    if let TxPayload::Stake(stake) = &mut tx.payload {
        stake.scoins_to_mint = 5 * COIN; // re-leveraged after signing
    }
    let err = process_tx(&mut state, &tx, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "bad-tx-signature");
}

// ═══════════════════════════════════════════════════════════════════════════════
// INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_undo_restores_state_byte_identically() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state.credit(uid, CoinSymbol::Wicc, 10 * COIN + FEE).unwrap();

    let before = state.clone();
    let before_hash = state.state_hash();

    let tx = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let undo = process_tx(&mut state, &tx, 100, 0).unwrap();
    assert_ne!(state.state_hash(), before_hash);

    undo_tx(&mut state, undo);
    assert_eq!(state, before);
    assert_eq!(state.state_hash(), before_hash);
}

#[test]
fn test_undo_of_liquidation_restores_indexes() {
    let (mut state, _owner, liquidator, cdpid) = liquidation_setup();
    let before = state.clone();

    let tx = liquidate_tx(&liquidator, 111, cdpid, 11 * COIN);
    let undo = process_tx(&mut state, &tx, 111, 0).unwrap();
    assert!(state.cdp(&cdpid).is_none());

    undo_tx(&mut state, undo);
    assert_eq!(state, before);
    // the restored CDP is liquidatable again through the ratio index
    assert_eq!(state.cdps_below_ratio(15_000, 13_000).len(), 1);
}

#[test]
fn test_bcoin_conservation_across_lifecycle() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    let funded = 10 * COIN + 4 * FEE;
    state.credit(uid, CoinSymbol::Wicc, funded).unwrap();

    let mut fees_paid = 0u64;
    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();
    fees_paid += FEE;

    let redeem = redeem_tx(&owner, 100, cdpid, 0, 2 * COIN);
    process_tx(&mut state, &redeem, 100, 1).unwrap();
    fees_paid += FEE;

    // free + staked only ever decreases by the fees paid
    let total = free(&state, &uid, CoinSymbol::Wicc) + state.total_staked_bcoins();
    assert_eq!(total, funded - fees_paid);
}

#[test]
fn test_monotone_cdp_height() {
    let mut state = fresh_chain();
    let owner = KeyPair::generate();
    let uid = *owner.public_key();
    state
        .credit(uid, CoinSymbol::Wicc, 10 * COIN + 3 * FEE)
        .unwrap();

    let create = stake_tx(&owner, 100, None, 10 * COIN, COIN);
    let cdpid = create.txid();
    process_tx(&mut state, &create, 100, 0).unwrap();

    let later = 100 + BLOCKS_PER_DAY;
    feed_prices(&mut state, CoinSymbol::Wicc, later - 10, later, 25_000);
    state.credit(uid, CoinSymbol::Wusd, COIN).unwrap();
    let touch = stake_tx(&owner, later, Some(cdpid), 0, 0);
    process_tx(&mut state, &touch, later, 0).unwrap();
    assert_eq!(state.cdp(&cdpid).unwrap().block_height, later);

    // executing below the anchor height is a height error
    let back = stake_tx(&owner, 100, Some(cdpid), 0, 0);
    let err = process_tx(&mut state, &back, 100, 0).unwrap_err();
    assert_eq!(err.reject_reason(), "height-error");
}

#[test]
fn test_persistence_roundtrip_preserves_state_hash() {
    use wusd_engine::storage::backend::BinaryStore;

    let (state, _miner, _a, _b) = settlement_setup();
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = StateManager::new(BinaryStore::new(dir.path()).unwrap());
        manager.save(&state).unwrap();
    }
    let manager = StateManager::new(BinaryStore::new(dir.path()).unwrap());
    let loaded = manager.load().unwrap();
    assert_eq!(loaded.state_hash(), state.state_hash());
}
