//! Two-sided order book of price levels.
//!
//! Levels are stored per side in a `BTreeMap` keyed by exact price. Bids
//! are iterated from the highest price down, asks from the lowest up.
//!
//! Levels are held behind `Arc` so that a shallow [`OrderBook::copy`]
//! shares level objects with its source. Any mutation of a shared level
//! goes through `Arc::make_mut`, so the book being mutated gets its own
//! copy and the other holder never observes the change.
//!
//! The same type serves as a full book and as a delta book: in a delta,
//! every level and entry carries the action that [`OrderBook::apply`]
//! dispatches on.

use std::collections::BTreeMap;
use std::fmt;
use std::iter::Peekable;
use std::sync::Arc;

use super::price_level::PriceLevel;
use crate::error::{BookError, Result};
use crate::types::{LevelAction, Price, Side};

type BookSide = BTreeMap<Price, Arc<PriceLevel>>;

/// An order book (full or delta).
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: String,
    /// Nanoseconds since the Unix epoch.
    book_time: Option<i64>,
    is_consistent: bool,
    strict_checking: bool,
    /// Bid levels; iterate in reverse for best-first order
    bids: BookSide,
    /// Ask levels; natural order is best-first
    asks: BookSide,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBook {
    /// Create an empty, consistent book.
    pub fn new() -> Self {
        Self {
            symbol: String::new(),
            book_time: None,
            is_consistent: true,
            strict_checking: false,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    /// Create an empty book for a symbol.
    pub fn with_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::new()
        }
    }

    /// Remove every level. Symbol, time and flags are kept.
    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn set_symbol(&mut self, symbol: impl Into<String>) {
        self.symbol = symbol.into();
    }

    #[inline]
    pub fn book_time(&self) -> Option<i64> {
        self.book_time
    }

    pub fn set_book_time(&mut self, time: Option<i64>) {
        self.book_time = time;
    }

    #[inline]
    pub fn is_consistent(&self) -> bool {
        self.is_consistent
    }

    pub fn set_is_consistent(&mut self, consistent: bool) {
        self.is_consistent = consistent;
    }

    #[inline]
    pub fn strict_checking(&self) -> bool {
        self.strict_checking
    }

    /// Make duplicate adds and updates/deletes of unknown entries errors
    /// for every level operation on this book.
    pub fn set_strict_checking(&mut self, strict: bool) {
        self.strict_checking = strict;
    }

    fn side_mut(&mut self, side: Side) -> Option<&mut BookSide> {
        match side {
            Side::Bid => Some(&mut self.bids),
            Side::Ask => Some(&mut self.asks),
            Side::Unknown => None,
        }
    }

    /// Insert a level, replacing any level at the same price.
    /// Levels with an unknown side are ignored.
    pub fn add_level(&mut self, level: impl Into<Arc<PriceLevel>>) {
        let level = level.into();
        match self.side_mut(level.side()) {
            Some(book_side) => {
                book_side.insert(level.price(), level);
            }
            None => log::debug!("Ignored level at {} with unknown side", level.price()),
        }
    }

    /// Merge a delta level onto the existing level at its price: entries
    /// are applied by their own actions, then size, entry count and time
    /// are taken from the delta. A level with no existing counterpart is
    /// inserted as a new level, marked `Add`.
    pub fn update_level(&mut self, level: impl Into<Arc<PriceLevel>>) -> Result<()> {
        let level = level.into();
        let strict = self.strict_checking;
        let Some(book_side) = self.side_mut(level.side()) else {
            log::debug!("Ignored level at {} with unknown side", level.price());
            return Ok(());
        };
        match book_side.get_mut(&level.price()) {
            Some(existing) => {
                let existing = Arc::make_mut(existing);
                existing.apply_entries(&level, strict)?;
                existing.set_details(&level);
            }
            None => {
                let level = if level.action() == LevelAction::Add {
                    level
                } else {
                    let mut added = PriceLevel::clone(&level);
                    added.set_action(LevelAction::Add);
                    Arc::new(added)
                };
                book_side.insert(level.price(), level);
            }
        }
        Ok(())
    }

    /// Remove the level at this level's price. Absent levels are not an
    /// error.
    pub fn delete_level(&mut self, level: &PriceLevel) {
        if let Some(book_side) = self.side_mut(level.side()) {
            book_side.remove(&level.price());
        }
    }

    fn dispatch(&mut self, level: &Arc<PriceLevel>) -> Result<()> {
        match level.action() {
            LevelAction::Add => self.add_level(Arc::clone(level)),
            LevelAction::Update => self.update_level(Arc::clone(level))?,
            LevelAction::Delete => self.delete_level(level),
            LevelAction::Unknown => {
                log::debug!("Skipped level at {} with unknown action", level.price());
            }
        }
        Ok(())
    }

    /// Apply a delta book. Each level is dispatched on its own action.
    ///
    /// # Errors
    ///
    /// Strict-mode entry violations. Levels before the failing one remain
    /// applied.
    pub fn apply(&mut self, delta: &OrderBook) -> Result<()> {
        for level in delta.bids.values().rev().chain(delta.asks.values()) {
            self.dispatch(level)?;
        }
        Ok(())
    }

    /// Replace the levels with those of `book`, sharing level objects.
    /// Levels marked `Delete` or `Unknown` in `book` are not copied.
    pub fn copy(&mut self, book: &OrderBook) {
        self.copy_levels(book, Arc::clone);
    }

    /// Replace the levels with independent clones of those of `book`.
    pub fn deep_copy(&mut self, book: &OrderBook) {
        self.copy_levels(book, |level| Arc::new(PriceLevel::clone(level)));
    }

    fn copy_levels(&mut self, book: &OrderBook, make: impl Fn(&Arc<PriceLevel>) -> Arc<PriceLevel>) {
        self.clear();
        for (dest, src) in [(&mut self.bids, &book.bids), (&mut self.asks, &book.asks)] {
            for (price, level) in src {
                if matches!(level.action(), LevelAction::Add | LevelAction::Update) {
                    dest.insert(*price, make(level));
                }
            }
        }
    }

    /// Become the delta that empties `book` when applied.
    pub fn set_as_delta_deleted(&mut self, book: &OrderBook) {
        self.copy(book);
        for level in self.bids.values_mut().chain(self.asks.values_mut()) {
            Arc::make_mut(level).mark_all_deleted();
        }
    }

    /// Become the delta that turns `lhs` into `rhs` when applied to `lhs`.
    pub fn set_as_delta_difference(&mut self, lhs: &OrderBook, rhs: &OrderBook) {
        self.clear();
        diff_side(
            &mut self.bids,
            lhs.bids.values().rev().peekable(),
            rhs.bids.values().rev().peekable(),
            false,
        );
        diff_side(
            &mut self.asks,
            lhs.asks.values().peekable(),
            rhs.asks.values().peekable(),
            true,
        );
    }

    /// Compare with another book: symbol, level counts per side, then each
    /// pair of levels in price order.
    pub fn assert_equal(&self, rhs: &OrderBook) -> Result<()> {
        if self.symbol != rhs.symbol {
            return Err(BookError::mismatch(format!(
                "different symbols ({} != {})",
                self.symbol, rhs.symbol
            )));
        }
        assert_side_equal(self.bid_levels(), rhs.bid_levels(), self.bids.len(), rhs.bids.len())?;
        assert_side_equal(self.ask_levels(), rhs.ask_levels(), self.asks.len(), rhs.asks.len())
    }

    /// Total number of levels on both sides.
    #[inline]
    pub fn total_num_levels(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    #[inline]
    pub fn num_bid_levels(&self) -> usize {
        self.bids.len()
    }

    #[inline]
    pub fn num_ask_levels(&self) -> usize {
        self.asks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Bid levels, highest price first.
    pub fn bid_levels(&self) -> impl DoubleEndedIterator<Item = &PriceLevel> + '_ {
        self.bids.values().rev().map(|level| level.as_ref())
    }

    /// Ask levels, lowest price first.
    pub fn ask_levels(&self) -> impl DoubleEndedIterator<Item = &PriceLevel> + '_ {
        self.asks.values().map(|level| level.as_ref())
    }

    /// Look up a level by side and exact price.
    pub fn level(&self, side: Side, price: Price) -> Option<&PriceLevel> {
        match side {
            Side::Bid => self.bids.get(&price).map(|l| l.as_ref()),
            Side::Ask => self.asks.get(&price).map(|l| l.as_ref()),
            Side::Unknown => None,
        }
    }

    #[inline]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bid_levels().next()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.ask_levels().next()
    }

    /// Side-by-side rendering of both sides, used for diagnostics.
    pub fn dump(&self) -> String {
        self.to_string()
    }

    /// Whether both books hold the very same level object at this price.
    #[cfg(test)]
    pub(crate) fn shares_level_with(&self, other: &OrderBook, side: Side, price: Price) -> bool {
        let (lhs, rhs) = match side {
            Side::Bid => (self.bids.get(&price), other.bids.get(&price)),
            Side::Ask => (self.asks.get(&price), other.asks.get(&price)),
            Side::Unknown => (None, None),
        };
        matches!((lhs, rhs), (Some(l), Some(r)) if Arc::ptr_eq(l, r))
    }
}

fn assert_side_equal<'a>(
    lhs: impl Iterator<Item = &'a PriceLevel>,
    rhs: impl Iterator<Item = &'a PriceLevel>,
    lhs_count: usize,
    rhs_count: usize,
) -> Result<()> {
    if lhs_count != rhs_count {
        return Err(BookError::mismatch(format!(
            "number of price levels do not add up ({lhs_count}/{rhs_count})"
        )));
    }
    for (l, r) in lhs.zip(rhs) {
        l.assert_equal(r)?;
    }
    Ok(())
}

/// Merge-walk two sides in book order. `ascending` is true for asks.
fn diff_side<'a, I>(
    result: &mut BookSide,
    mut lhs: Peekable<I>,
    mut rhs: Peekable<I>,
    ascending: bool,
) where
    I: Iterator<Item = &'a Arc<PriceLevel>>,
{
    loop {
        match (lhs.peek().copied(), rhs.peek().copied()) {
            (Some(l), Some(r)) if l.price() == r.price() => {
                if !l.is_unchanged_from(r) {
                    let mut diff = PriceLevel::default();
                    diff.set_as_difference(l, r);
                    result.insert(l.price(), Arc::new(diff));
                }
                lhs.next();
                rhs.next();
            }
            (Some(l), Some(r)) => {
                let lhs_first = if ascending {
                    l.price() < r.price()
                } else {
                    l.price() > r.price()
                };
                if lhs_first {
                    result.insert(l.price(), removed_level(l));
                    lhs.next();
                } else {
                    result.insert(r.price(), added_level(r));
                    rhs.next();
                }
            }
            (Some(l), None) => {
                result.insert(l.price(), removed_level(l));
                lhs.next();
            }
            (None, Some(r)) => {
                result.insert(r.price(), added_level(r));
                rhs.next();
            }
            (None, None) => break,
        }
    }
}

/// Level present only on the left: a tombstone.
fn removed_level(level: &PriceLevel) -> Arc<PriceLevel> {
    let mut removed = level.clone();
    removed.mark_all_deleted();
    Arc::new(removed)
}

/// Level present only on the right: carried over, forced to an applicable
/// action.
fn added_level(level: &Arc<PriceLevel>) -> Arc<PriceLevel> {
    match level.action() {
        LevelAction::Add | LevelAction::Update => Arc::clone(level),
        LevelAction::Delete | LevelAction::Unknown => {
            let mut added = PriceLevel::clone(level);
            added.set_action(LevelAction::Add);
            Arc::new(added)
        }
    }
}

impl fmt::Display for OrderBook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Dump book: {}", self.symbol)?;
        let mut bids = self.bid_levels();
        let mut asks = self.ask_levels();
        let mut index = 0;
        loop {
            let bid = bids.next();
            let ask = asks.next();
            if bid.is_none() && ask.is_none() {
                break;
            }
            if let Some(level) = bid {
                dump_level(f, "Bid", index, level)?;
            }
            if let Some(level) = ask {
                dump_level(f, "Ask", index, level)?;
            }
            index += 1;
        }
        Ok(())
    }
}

fn dump_level(f: &mut fmt::Formatter<'_>, title: &str, index: usize, level: &PriceLevel) -> fmt::Result {
    writeln!(f, "{title} {index} | {level}")?;
    for entry in level.entries() {
        writeln!(f, "      |    {entry}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::Entry;
    use crate::types::EntryAction;

    fn px(p: f64) -> Price {
        Price::from_f64(p)
    }

    fn bid(p: f64, size: u64) -> PriceLevel {
        PriceLevel::new(px(p), Side::Bid)
            .with_size(size)
            .with_num_entries(1)
    }

    fn ask(p: f64, size: u64) -> PriceLevel {
        PriceLevel::new(px(p), Side::Ask)
            .with_size(size)
            .with_num_entries(1)
    }

    fn sample_book() -> OrderBook {
        let mut book = OrderBook::with_symbol("IBM");
        book.add_level(bid(99.0, 100).with_entry(Entry::new("b1", 100, EntryAction::Add)));
        book.add_level(bid(100.0, 200));
        book.add_level(bid(98.5, 50));
        book.add_level(ask(101.0, 300));
        book.add_level(ask(100.5, 10).with_entry(Entry::new("a1", 10, EntryAction::Add)));
        book
    }

    #[test]
    fn test_level_ordering() {
        let book = sample_book();

        let bids: Vec<Price> = book.bid_levels().map(|l| l.price()).collect();
        assert_eq!(bids, vec![px(100.0), px(99.0), px(98.5)]);

        let asks: Vec<Price> = book.ask_levels().map(|l| l.price()).collect();
        assert_eq!(asks, vec![px(100.5), px(101.0)]);

        assert_eq!(book.total_num_levels(), 5);
        assert_eq!(book.best_bid().map(|l| l.price()), Some(px(100.0)));
        assert_eq!(book.best_ask().map(|l| l.price()), Some(px(100.5)));
    }

    #[test]
    fn test_add_level_replaces() {
        let mut book = sample_book();
        book.add_level(bid(99.0, 1));

        assert_eq!(book.num_bid_levels(), 3);
        assert_eq!(book.level(Side::Bid, px(99.0)).map(|l| l.size()), Some(1));
    }

    #[test]
    fn test_unknown_side_ignored() {
        let mut book = OrderBook::new();
        book.add_level(PriceLevel::new(px(1.0), Side::Unknown));
        assert!(book.is_empty());
    }

    #[test]
    fn test_delete_absent_level_is_noop() {
        let mut book = sample_book();
        book.delete_level(&bid(42.0, 0));
        assert_eq!(book.total_num_levels(), 5);

        book.delete_level(&bid(99.0, 0));
        assert_eq!(book.num_bid_levels(), 2);
    }

    #[test]
    fn test_update_level_merges_entries() {
        let mut book = sample_book();
        let delta = bid(99.0, 160)
            .with_num_entries(2)
            .with_action(LevelAction::Update)
            .with_entry(Entry::new("b1", 110, EntryAction::Update))
            .with_entry(Entry::new("b2", 50, EntryAction::Add));

        book.update_level(delta).unwrap();

        let level = book.level(Side::Bid, px(99.0)).unwrap();
        assert_eq!(level.size(), 160);
        assert_eq!(level.size_change(), 60);
        assert_eq!(level.num_entries(), 2);
        assert_eq!(level.entry_count(), 2);
        assert_eq!(level.find_entry("b1").map(|e| e.size()), Some(110));
        // Level action is not taken from the delta
        assert_eq!(level.action(), LevelAction::Add);
    }

    #[test]
    fn test_update_missing_level_inserts() {
        let mut book = OrderBook::new();
        book.update_level(bid(10.0, 5).with_action(LevelAction::Update))
            .unwrap();
        assert_eq!(book.num_bid_levels(), 1);
    }

    #[test]
    fn test_level_inserted_by_update_matches_snapshot() {
        let mut book = OrderBook::with_symbol("IBM");
        book.update_level(bid(10.0, 5).with_action(LevelAction::Update))
            .unwrap();
        assert_eq!(book.best_bid().unwrap().action(), LevelAction::Add);

        let mut snapshot = OrderBook::with_symbol("IBM");
        snapshot.add_level(bid(10.0, 5));
        book.assert_equal(&snapshot).unwrap();

        let mut delta = OrderBook::new();
        delta.set_as_delta_difference(&book, &snapshot);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_strict_checking_propagates() {
        let mut book = sample_book();
        book.set_strict_checking(true);
        let delta = bid(99.0, 100)
            .with_action(LevelAction::Update)
            .with_entry(Entry::new("ghost", 1, EntryAction::Delete));

        let err = book.update_level(delta).unwrap_err();
        assert!(matches!(err, BookError::EntryNotFound { .. }));
    }

    #[test]
    fn test_apply_dispatches_on_action() {
        let mut book = sample_book();
        let mut delta = OrderBook::new();
        delta.add_level(bid(97.0, 5));
        delta.add_level(bid(98.5, 0).with_action(LevelAction::Delete));
        delta.add_level(ask(101.0, 250).with_action(LevelAction::Update));

        book.apply(&delta).unwrap();

        assert!(book.level(Side::Bid, px(97.0)).is_some());
        assert!(book.level(Side::Bid, px(98.5)).is_none());
        assert_eq!(book.level(Side::Ask, px(101.0)).map(|l| l.size()), Some(250));
    }

    #[test]
    fn test_shallow_copy_is_copy_on_write() {
        let source = sample_book();
        let mut copy = OrderBook::new();
        copy.copy(&source);

        assert!(copy.shares_level_with(&source, Side::Bid, px(99.0)));

        copy.update_level(bid(99.0, 1).with_action(LevelAction::Update))
            .unwrap();

        assert!(!copy.shares_level_with(&source, Side::Bid, px(99.0)));
        assert_eq!(source.level(Side::Bid, px(99.0)).map(|l| l.size()), Some(100));
        assert_eq!(copy.level(Side::Bid, px(99.0)).map(|l| l.size()), Some(1));
    }

    #[test]
    fn test_deep_copy_does_not_share() {
        let source = sample_book();
        let mut copy = OrderBook::with_symbol("IBM");
        copy.deep_copy(&source);

        assert!(!copy.shares_level_with(&source, Side::Bid, px(99.0)));
        assert!(copy.assert_equal(&source).is_ok());
    }

    #[test]
    fn test_delta_deleted_empties_book() {
        let mut book = sample_book();
        let mut delta = OrderBook::new();
        delta.set_as_delta_deleted(&book);

        assert_eq!(delta.total_num_levels(), 5);
        for level in delta.bid_levels().chain(delta.ask_levels()) {
            assert_eq!(level.action(), LevelAction::Delete);
            assert_eq!(level.size(), 0);
        }
        // Source levels untouched
        assert_eq!(book.level(Side::Bid, px(100.0)).map(|l| l.size()), Some(200));

        book.apply(&delta).unwrap();
        assert!(book.is_empty());
    }

    #[test]
    fn test_delta_difference_round_trip() {
        let lhs = sample_book();

        let mut rhs = OrderBook::with_symbol("IBM");
        rhs.add_level(bid(100.0, 200));
        rhs.add_level(
            bid(99.0, 150)
                .with_num_entries(2)
                .with_entry(Entry::new("b1", 100, EntryAction::Add))
                .with_entry(Entry::new("b2", 50, EntryAction::Add)),
        );
        rhs.add_level(bid(97.0, 20));
        rhs.add_level(ask(100.5, 5).with_entry(Entry::new("a1", 5, EntryAction::Add)));
        rhs.add_level(ask(102.0, 1));

        let mut diff = OrderBook::new();
        diff.set_as_delta_difference(&lhs, &rhs);

        // 100.0 unchanged, 99.0 updated, 98.5 removed, 97.0 added,
        // 100.5 updated, 101.0 removed, 102.0 added
        assert_eq!(diff.num_bid_levels(), 3);
        assert_eq!(diff.num_ask_levels(), 3);
        assert_eq!(
            diff.level(Side::Bid, px(98.5)).map(|l| l.action()),
            Some(LevelAction::Delete)
        );
        assert_eq!(
            diff.level(Side::Ask, px(102.0)).map(|l| l.action()),
            Some(LevelAction::Add)
        );

        let mut applied = OrderBook::with_symbol("IBM");
        applied.copy(&lhs);
        applied.apply(&diff).unwrap();
        applied.assert_equal(&rhs).unwrap();
    }

    #[test]
    fn test_assert_equal_level_count() {
        let lhs = sample_book();
        let mut rhs = sample_book();
        rhs.delete_level(&ask(101.0, 0));

        let err = lhs.assert_equal(&rhs).unwrap_err();
        assert_eq!(err.to_string(), "book mismatch: number of price levels do not add up (2/1)");
    }

    #[test]
    fn test_assert_equal_symbol() {
        let lhs = OrderBook::with_symbol("A");
        let rhs = OrderBook::with_symbol("B");
        assert!(lhs.assert_equal(&rhs).is_err());
    }

    #[test]
    fn test_dump() {
        let book = sample_book();
        let text = book.dump();
        assert!(text.starts_with("Dump book: IBM"));
        assert!(text.contains("Bid 0 | price=100 size=200"));
        assert!(text.contains("Ask 0 | price=100.5 size=10"));
        assert!(text.contains("id=a1 size=10 action=A"));
    }
}
