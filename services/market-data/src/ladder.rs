//! Delta price ladders
//!
//! A ladder is a price → size map with a fixed orientation. Back-oriented
//! ladders read best-first in descending price order, lay-oriented ones in
//! ascending order. Uses `BTreeMap` so iteration is deterministic.
//!
//! Update rules:
//! - An image clears the ladder before its entries are applied
//! - A size of exactly zero removes the price
//! - Sizes never go negative; over-subtraction clamps to zero
//!
//! Malformed entries are logged and applied as a zero price/zero size entry,
//! which leaves the ladder unchanged. A bad entry never aborts the stream.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use types::numeric::{CurrencyRate, SIZE_EPSILON};
use types::price_size::{LevelPriceSize, PriceEntry, PriceSize};

/// Depth ladders carry at most this many levels.
pub const MAX_DEPTH_LEVELS: u32 = 10;

/// Fraction of the calculated limit that counts as significant liquidity.
pub const LIQUIDITY_FRACTION: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

/// Upper bound of the significant-liquidity threshold.
pub const LIQUIDITY_CAP: Decimal = Decimal::from_parts(10, 0, 0, false, 0);

/// Fixed ordering of a ladder.
///
/// Deserializing any other value fails, so a snapshot can never restore a
/// ladder with an unknown comparator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LadderOrientation {
    /// Descending: highest price is best
    Back,
    /// Ascending: lowest price is best
    Lay,
}

/// Smallest size an entry must have to count as actionable liquidity.
pub fn significant_liquidity(calculated_limit: Decimal) -> Decimal {
    (calculated_limit * LIQUIDITY_FRACTION).min(LIQUIDITY_CAP)
}

/// Price-keyed ladder with image/delta semantics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaLadder {
    orientation: LadderOrientation,
    levels: BTreeMap<Decimal, Decimal>,
}

impl DeltaLadder {
    pub fn new(orientation: LadderOrientation) -> Self {
        Self {
            orientation,
            levels: BTreeMap::new(),
        }
    }

    pub fn new_back() -> Self {
        Self::new(LadderOrientation::Back)
    }

    pub fn new_lay() -> Self {
        Self::new(LadderOrientation::Lay)
    }

    pub fn orientation(&self) -> LadderOrientation {
        self.orientation
    }

    /// Apply a wire price change.
    ///
    /// `entries` of `None` means the field was absent from the change: an
    /// image still clears the ladder, a delta leaves it alone.
    pub fn on_price_change(&mut self, is_image: bool, entries: Option<&[PriceEntry]>) {
        if is_image {
            self.levels.clear();
        }
        for entry in entries.unwrap_or_default() {
            let price_size = PriceSize::from_wire(entry).unwrap_or_else(|err| {
                warn!(error = %err, ?entry, "Malformed ladder entry, applying zero entry");
                PriceSize::zero()
            });
            self.apply(price_size);
        }
    }

    /// Apply a price change and return the signed size change per price.
    ///
    /// Changes smaller than `SIZE_EPSILON` in magnitude are omitted.
    pub fn on_price_change_get_modifications(
        &mut self,
        is_image: bool,
        entries: Option<&[PriceEntry]>,
    ) -> BTreeMap<Decimal, Decimal> {
        let before = self.levels.clone();
        self.on_price_change(is_image, entries);

        let mut modifications = BTreeMap::new();
        for (&price, &old_size) in &before {
            let new_size = self.levels.get(&price).copied().unwrap_or(Decimal::ZERO);
            let change = new_size - old_size;
            if change.abs() >= SIZE_EPSILON {
                modifications.insert(price, change);
            }
        }
        for (&price, &new_size) in &self.levels {
            if !before.contains_key(&price) && new_size >= SIZE_EPSILON {
                modifications.insert(price, new_size);
            }
        }
        modifications
    }

    /// Upsert or remove a single entry per the zero-size rule.
    pub fn apply(&mut self, price_size: PriceSize) {
        if price_size.is_removal() {
            self.levels.remove(&price_size.price());
        } else {
            self.levels.insert(price_size.price(), price_size.size());
        }
    }

    /// First price, best-first, whose size converted to account currency
    /// reaches the significant-liquidity threshold. Zero if none does.
    pub fn best_price(&self, calculated_limit: Decimal, rate: CurrencyRate) -> Decimal {
        let threshold = significant_liquidity(calculated_limit);
        self.iter_best_first()
            .find(|(_, &size)| rate.to_account(size) >= threshold)
            .map(|(&price, _)| price)
            .unwrap_or(Decimal::ZERO)
    }

    /// Subtract an account-currency amount from the size at `price`.
    pub fn remove_amount_account(&mut self, price: Decimal, amount: Decimal, rate: CurrencyRate) {
        self.remove_amount(price, rate.to_stream(amount));
    }

    /// Subtract a stream-currency amount from the size at `price`.
    ///
    /// An absent price is expected (the live market moved first) and only
    /// logged.
    pub fn remove_amount(&mut self, price: Decimal, amount: Decimal) {
        match self.levels.get_mut(&price) {
            Some(size) => {
                let remaining = (*size - amount).max(Decimal::ZERO);
                if remaining.is_zero() {
                    self.levels.remove(&price);
                } else {
                    *size = remaining;
                }
            }
            None => {
                info!(%price, %amount, "Price not on ladder, nothing to remove");
            }
        }
    }

    /// Size at exactly `price`, zero if absent.
    pub fn matched_size(&self, price: Decimal) -> Decimal {
        self.levels.get(&price).copied().unwrap_or(Decimal::ZERO)
    }

    /// Best entry, if any.
    pub fn best(&self) -> Option<PriceSize> {
        self.iter_best_first()
            .next()
            .map(|(&price, &size)| PriceSize::new(price, size))
    }

    /// Entries best-first, in stream currency.
    pub fn entries(&self) -> Vec<PriceSize> {
        self.iter_best_first()
            .map(|(&price, &size)| PriceSize::new(price, size))
            .collect()
    }

    /// Entries best-first, sizes converted to account currency.
    pub fn converted_entries(&self, rate: CurrencyRate) -> Vec<PriceSize> {
        self.iter_best_first()
            .map(|(&price, &size)| PriceSize::new(price, rate.to_account(size)))
            .collect()
    }

    /// Copy of the underlying price → size map.
    pub fn to_map(&self) -> BTreeMap<Decimal, Decimal> {
        self.levels.clone()
    }

    /// Sum of all sizes, in stream currency.
    pub fn total_size(&self) -> Decimal {
        self.levels.values().copied().sum()
    }

    /// Iterate `(price, size)` pairs best-first.
    pub fn iter_best_first(&self) -> Box<dyn Iterator<Item = (&Decimal, &Decimal)> + '_> {
        match self.orientation {
            LadderOrientation::Back => Box::new(self.levels.iter().rev()),
            LadderOrientation::Lay => Box::new(self.levels.iter()),
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Level-keyed depth ladder (`[level, price, size]` entries)
///
/// Level 0 is the best level; ordering is by level, independent of price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelLadder {
    levels: BTreeMap<u32, PriceSize>,
}

impl LevelLadder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_level_change(&mut self, is_image: bool, entries: Option<&[PriceEntry]>) {
        if is_image {
            self.levels.clear();
        }
        for entry in entries.unwrap_or_default() {
            let level_price_size = LevelPriceSize::from_wire(entry).unwrap_or_else(|err| {
                warn!(error = %err, ?entry, "Malformed depth entry, applying zero entry");
                LevelPriceSize::zero()
            });
            self.apply(level_price_size);
        }
        if self.levels.len() > MAX_DEPTH_LEVELS as usize {
            error!(
                levels = self.levels.len(),
                max = MAX_DEPTH_LEVELS,
                "Depth ladder larger than expected"
            );
        }
    }

    fn apply(&mut self, entry: LevelPriceSize) {
        if entry.price_size.is_removal() {
            self.levels.remove(&entry.level);
        } else {
            self.levels.insert(entry.level, entry.price_size);
        }
    }

    pub fn level(&self, level: u32) -> Option<PriceSize> {
        self.levels.get(&level).copied()
    }

    pub fn best(&self) -> Option<PriceSize> {
        self.levels.values().next().copied()
    }

    /// Entries in level order.
    pub fn entries(&self) -> Vec<LevelPriceSize> {
        self.levels
            .iter()
            .map(|(&level, &price_size)| LevelPriceSize { level, price_size })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
