//! Price level holding entries in feed order.
//!
//! A `PriceLevel` is keyed by exact [`Price`] within one side of a book.
//! Its `size` and `num_entries` are whatever the feed reported and are
//! authoritative on their own: the materialised entry list may be shorter
//! (entries omitted by the feed) or absent entirely.
//!
//! # Strict checking
//!
//! Entry mutations take a `strict` flag, supplied by the owning
//! [`OrderBook`](super::OrderBook). With it set, adding a duplicate id or
//! updating/removing an unknown id is an error. Without it the violation
//! is absorbed and logged at debug level.
//!
//! # Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | `add_entry` | O(n) (id uniqueness scan) |
//! | `update_entry` | O(n) |
//! | `remove_entry` | O(n) |
//! | `set_as_difference` | O(n·m) worst case |
//!
//! Levels rarely hold more than a few dozen entries, so linear scans in
//! feed order beat any keyed structure here.

use std::fmt;

use super::entry::Entry;
use crate::error::{BookError, Result};
use crate::types::{EntryAction, LevelAction, Price, Side};

/// A price level in an order book.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PriceLevel {
    price: Price,
    side: Side,
    /// Aggregate size as reported by the feed
    size: u64,
    /// Change in size carried by a delta level
    size_change: i64,
    /// Reported entry count (advisory)
    num_entries: u32,
    action: LevelAction,
    time: Option<i64>,
    /// Entries in feed order
    entries: Vec<Entry>,
}

impl PriceLevel {
    /// Create an empty level marked `Add`.
    pub fn new(price: Price, side: Side) -> Self {
        Self {
            price,
            side,
            action: LevelAction::Add,
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    pub fn with_num_entries(mut self, num_entries: u32) -> Self {
        self.num_entries = num_entries;
        self
    }

    pub fn with_action(mut self, action: LevelAction) -> Self {
        self.action = action;
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    /// Append an entry without any id checks.
    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.entries.push(entry);
        self
    }

    #[inline]
    pub fn price(&self) -> Price {
        self.price
    }

    #[inline]
    pub fn side(&self) -> Side {
        self.side
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn size_change(&self) -> i64 {
        self.size_change
    }

    #[inline]
    pub fn num_entries(&self) -> u32 {
        self.num_entries
    }

    #[inline]
    pub fn action(&self) -> LevelAction {
        self.action
    }

    #[inline]
    pub fn time(&self) -> Option<i64> {
        self.time
    }

    /// Entries in feed order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of materialised entries (may differ from `num_entries`).
    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn set_price(&mut self, price: Price) {
        self.price = price;
    }

    pub fn set_side(&mut self, side: Side) {
        self.side = side;
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn set_size_change(&mut self, size_change: i64) {
        self.size_change = size_change;
    }

    pub fn set_num_entries(&mut self, num_entries: u32) {
        self.num_entries = num_entries;
    }

    pub fn set_action(&mut self, action: LevelAction) {
        self.action = action;
    }

    pub fn set_time(&mut self, time: Option<i64>) {
        self.time = time;
    }

    /// Find an entry by id.
    pub fn find_entry(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.equal_id(id))
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.equal_id(id))
    }

    /// Append an entry as parsed from a payload, unchecked.
    pub(crate) fn push_entry(&mut self, entry: Entry) {
        self.entries.push(entry);
    }

    /// Merge level details from an update: size, entry count and time.
    /// `size_change` becomes the difference from the previous size.
    pub fn set_details(&mut self, other: &PriceLevel) {
        self.size_change = other.size as i64 - self.size as i64;
        self.size = other.size;
        self.num_entries = other.num_entries;
        self.time = other.time;
    }

    /// Add an entry at the end of the level.
    ///
    /// # Errors
    ///
    /// `DuplicateEntry` under strict checking if the id is already present.
    /// Without strict checking a duplicate merges onto the existing entry.
    pub fn add_entry(&mut self, entry: Entry, strict: bool) -> Result<()> {
        match self.position(entry.id()) {
            Some(_) if strict => Err(BookError::DuplicateEntry {
                id: entry.id().to_string(),
            }),
            Some(pos) => {
                log::debug!(
                    "Absorbed duplicate add for entry {} at {} {:?}",
                    entry.id(),
                    self.price,
                    self.side
                );
                self.entries[pos].set_details(&entry);
                Ok(())
            }
            None => {
                self.entries.push(entry);
                Ok(())
            }
        }
    }

    /// Merge size and time onto the entry with the same id.
    pub fn update_entry(&mut self, entry: &Entry, strict: bool) -> Result<()> {
        match self.position(entry.id()) {
            Some(pos) => {
                self.entries[pos].set_details(entry);
                Ok(())
            }
            None => self.missing_entry(entry.id(), "update", strict),
        }
    }

    /// Remove the entry with the given id.
    pub fn remove_entry(&mut self, id: &str, strict: bool) -> Result<()> {
        match self.position(id) {
            Some(pos) => {
                self.entries.remove(pos);
                Ok(())
            }
            None => self.missing_entry(id, "delete", strict),
        }
    }

    fn missing_entry(&self, id: &str, op: &'static str, strict: bool) -> Result<()> {
        if strict {
            return Err(BookError::EntryNotFound {
                id: id.to_string(),
                op,
            });
        }
        log::debug!(
            "Ignored {} of unknown entry {} at {} {:?}",
            op,
            id,
            self.price,
            self.side
        );
        Ok(())
    }

    /// Apply every entry of a delta level according to its action.
    /// Entries with an unknown action are skipped.
    pub(crate) fn apply_entries(&mut self, delta: &PriceLevel, strict: bool) -> Result<()> {
        for entry in &delta.entries {
            match entry.action() {
                EntryAction::Add => self.add_entry(entry.clone(), strict)?,
                EntryAction::Update => self.update_entry(entry, strict)?,
                EntryAction::Delete => self.remove_entry(entry.id(), strict)?,
                EntryAction::Unknown => {}
            }
        }
        Ok(())
    }

    /// Turn this level into a tombstone: every entry is zeroed and marked
    /// `Delete`, the level size drops to zero and the level is marked
    /// `Delete`.
    pub fn mark_all_deleted(&mut self) {
        self.size_change = -(self.size as i64);
        self.size = 0;
        self.num_entries = 0;
        self.action = LevelAction::Delete;
        for entry in &mut self.entries {
            entry.set_size(0);
            entry.set_action(EntryAction::Delete);
        }
    }

    /// Whether `other` carries the same reported details and the same
    /// entries (by id, size and time, in order).
    pub(crate) fn is_unchanged_from(&self, other: &PriceLevel) -> bool {
        self.size == other.size
            && self.num_entries == other.num_entries
            && self.time == other.time
            && self.entries.len() == other.entries.len()
            && self.entries.iter().zip(&other.entries).all(|(l, r)| {
                l.id() == r.id() && l.size() == r.size() && l.time() == r.time()
            })
    }

    /// Make this level the delta that turns `lhs` into `rhs`.
    ///
    /// Entries are matched positionally in feed order. When the current
    /// ids differ, the lhs id is searched for further along rhs: if found,
    /// the rhs entries before it were inserted and become `Add` entries;
    /// otherwise the lhs entry was removed and becomes a `Delete` entry.
    /// Matching ids with a different size or time become `Update` entries.
    ///
    /// Reordering entries between the two levels therefore shows up as
    /// deletes and re-adds rather than as no change.
    pub fn set_as_difference(&mut self, lhs: &PriceLevel, rhs: &PriceLevel) {
        self.entries.clear();

        let (mut l, mut r) = (0, 0);
        while l < lhs.entries.len() && r < rhs.entries.len() {
            let lhs_entry = &lhs.entries[l];
            let rhs_entry = &rhs.entries[r];

            if lhs_entry.id() == rhs_entry.id() {
                if lhs_entry.size() != rhs_entry.size() || lhs_entry.time() != rhs_entry.time() {
                    let mut update = rhs_entry.clone();
                    update.set_action(EntryAction::Update);
                    self.entries.push(update);
                }
                l += 1;
                r += 1;
                continue;
            }

            match find_entry_after(&rhs.entries, r, lhs_entry.id()) {
                Some(found) => {
                    while r < found {
                        self.push_added(&rhs.entries[r]);
                        r += 1;
                    }
                }
                None => {
                    self.push_deleted(lhs_entry);
                    l += 1;
                }
            }
        }
        for entry in &lhs.entries[l..] {
            self.push_deleted(entry);
        }
        for entry in &rhs.entries[r..] {
            self.push_added(entry);
        }

        self.price = rhs.price;
        self.side = rhs.side;
        self.time = rhs.time;
        self.size_change = rhs.size as i64 - lhs.size as i64;
        self.size = rhs.size;
        self.num_entries = rhs.num_entries;
        self.action = LevelAction::Update;
    }

    fn push_added(&mut self, entry: &Entry) {
        let mut added = entry.clone();
        added.set_action(EntryAction::Add);
        self.entries.push(added);
    }

    fn push_deleted(&mut self, entry: &Entry) {
        let mut deleted = entry.clone();
        deleted.set_size(0);
        deleted.set_action(EntryAction::Delete);
        self.entries.push(deleted);
    }

    /// Deep field-by-field comparison, entries in order.
    pub fn assert_equal(&self, rhs: &PriceLevel) -> Result<()> {
        if self.price != rhs.price {
            return Err(self.mismatch(format!("price not equal ({} != {})", self.price, rhs.price)));
        }
        if self.size != rhs.size {
            return Err(self.mismatch(format!("size not equal ({} != {})", self.size, rhs.size)));
        }
        if self.num_entries != rhs.num_entries {
            return Err(self.mismatch(format!(
                "number of entries not equal ({} != {})",
                self.num_entries, rhs.num_entries
            )));
        }
        if self.side != rhs.side {
            return Err(self.mismatch("side not equal".to_string()));
        }
        if self.action != rhs.action {
            return Err(self.mismatch(format!(
                "action not equal ({} != {})",
                self.action.to_char(),
                rhs.action.to_char()
            )));
        }
        if self.time != rhs.time {
            return Err(self.mismatch(format!("time not equal ({:?} != {:?})", self.time, rhs.time)));
        }
        if self.entries.len() != rhs.entries.len() {
            return Err(self.mismatch(format!(
                "entries size mismatch ({} != {})",
                self.entries.len(),
                rhs.entries.len()
            )));
        }
        for (lhs_entry, rhs_entry) in self.entries.iter().zip(&rhs.entries) {
            lhs_entry.assert_equal(rhs_entry).map_err(|e| match e {
                BookError::Mismatch(context) => self.mismatch(context),
                other => other,
            })?;
        }
        Ok(())
    }

    fn mismatch(&self, context: String) -> BookError {
        BookError::mismatch(format!(
            "{context} (price={}, side={})",
            self.price,
            self.side.to_char()
        ))
    }
}

fn find_entry_after(entries: &[Entry], start: usize, id: &str) -> Option<usize> {
    entries[start..]
        .iter()
        .position(|e| e.equal_id(id))
        .map(|offset| start + offset)
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "price={} size={} action={} entries={} time=",
            self.price,
            self.size,
            self.action.to_char(),
            self.num_entries
        )?;
        match self.time {
            Some(t) => write!(f, "{t}"),
            None => f.write_str("null"),
        }
    }
}
