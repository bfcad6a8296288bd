//! Price oracle view.
//!
//! Per-block feed prices are ingested by the price-feed collaborator; the
//! engine only ever reads the sliding-window median at a given height. The
//! view is pure with respect to `(symbol, height, window)` so every node
//! evaluating the same feed history sees the same median.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::coin::CoinSymbol;
use crate::utils::math::median;

/// Per-symbol, per-height feed prices.
///
/// Prices are S-coin atomic units per B-coin unit, pre-multiplied by
/// `PERCENT_BOOST / COIN`, so `staked * price / owed` yields a boosted
/// collateral ratio directly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceFeedStore {
    feeds: BTreeMap<CoinSymbol, BTreeMap<u32, u64>>,
}

impl PriceFeedStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the feed price for a symbol at a block height.
    ///
    /// A later feed for the same height replaces the earlier one; the
    /// collaborator delivers at most one consolidated point per block.
    pub fn push_price(&mut self, symbol: CoinSymbol, height: u32, price: u64) {
        self.feeds.entry(symbol).or_default().insert(height, price);
    }

    /// Median feed price over the most recent `window_blocks` ending at
    /// `height`. Returns 0 when there is no feed data in the window; callers
    /// performing ratio math must treat 0 as a hard error.
    pub fn median_price(&self, symbol: CoinSymbol, height: u32, window_blocks: u32) -> u64 {
        if window_blocks == 0 {
            return 0;
        }
        let feed = match self.feeds.get(&symbol) {
            Some(feed) => feed,
            None => return 0,
        };
        let from = height.saturating_sub(window_blocks.saturating_sub(1));
        let mut prices: Vec<u64> = feed.range(from..=height).map(|(_, p)| *p).collect();
        median(&mut prices).unwrap_or(0)
    }
}
