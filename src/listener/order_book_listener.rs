//! Full order book listener.
//!
//! Maintains a cached full book per subscription from clear, recap and
//! update messages, produces a delta book for every message, and
//! suppresses deltas while the cached book is known to have missed
//! updates.
//!
//! # State machine
//!
//! ```text
//! Uninitialised --clear/recap--> Consistent
//! Consistent    --gap, same sender--> Inconsistent
//! Inconsistent  --recap--> Consistent
//! ```
//!
//! An update in `Uninitialised` is a sequencing error. While inconsistent,
//! updates are neither applied nor delivered unless
//! [`ListenerConfig::update_inconsistent_book`] is set.
//!
//! # Threading
//!
//! Messages are delivered on one thread. The cached full book sits behind
//! a `parking_lot::Mutex` held for the whole of each mutating message, so
//! other threads may take snapshots with [`OrderBookListener::book_snapshot`]
//! or [`OrderBookListener::deep_book_snapshot`] at any time.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::handler::{ListenerView, OrderBookHandler};
use super::payload::parse_payload;
use super::state::ListenerState;
use crate::book::OrderBook;
use crate::error::{BookError, Result};
use crate::fields::BookFields;
use crate::message::Message;
use crate::subscription::BookSubscription;
use crate::types::MsgType;

/// Full book shared between the listener and snapshot readers.
pub type SharedBook = Arc<Mutex<OrderBook>>;

/// Configuration for [`OrderBookListener`].
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Field descriptors used to read messages
    pub fields: BookFields,

    /// Keep a cached full book; otherwise only deltas are produced
    pub track_full_book: bool,

    /// Apply and deliver updates even while the book is inconsistent
    pub update_inconsistent_book: bool,

    /// Fail on duplicate adds and on updates/deletes of unknown entries
    pub strict_checking: bool,

    /// Whether to log warnings for gaps and consistency changes
    pub log_warnings: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            fields: BookFields::default(),
            track_full_book: true,
            update_inconsistent_book: false,
            strict_checking: false,
            log_warnings: true,
        }
    }
}

impl ListenerConfig {
    /// Create a config reading messages with `fields`.
    pub fn new(fields: BookFields) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Enable/disable the cached full book.
    pub fn with_full_book(mut self, track: bool) -> Self {
        self.track_full_book = track;
        self
    }

    /// Enable/disable applying updates to an inconsistent book.
    pub fn with_update_inconsistent_book(mut self, update: bool) -> Self {
        self.update_inconsistent_book = update;
        self
    }

    /// Enable/disable strict entry checking.
    pub fn with_strict_checking(mut self, strict: bool) -> Self {
        self.strict_checking = strict;
        self
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self
    }
}

/// What a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// Book cleared, clear handlers invoked
    Clear,
    /// Full image applied, recap handlers invoked
    Recap,
    /// Update delivered to delta handlers
    Delta,
    /// Update parsed but withheld because the book is inconsistent
    Suppressed,
    /// Fragment of a multi-message book; nothing delivered yet
    Incomplete,
    /// Message type not handled by book listeners
    Ignored,
}

/// Statistics for monitoring a listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerStats {
    /// Total messages processed
    pub messages_processed: u64,

    /// Complete recaps (initial, recap, snapshot)
    pub recaps: u64,

    /// Deltas delivered
    pub deltas: u64,

    pub clears: u64,

    /// Sequence gaps detected
    pub gaps: u64,

    /// Deltas withheld from an inconsistent book
    pub suppressed: u64,

    /// Fragments of books still being assembled
    pub incomplete: u64,

    /// Messages that failed
    pub errors: u64,
}

impl ListenerStats {
    pub(crate) fn record(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Clear => self.clears += 1,
            ListenerEvent::Recap => self.recaps += 1,
            ListenerEvent::Delta => self.deltas += 1,
            ListenerEvent::Suppressed => self.suppressed += 1,
            ListenerEvent::Incomplete => self.incomplete += 1,
            ListenerEvent::Ignored => {}
        }
    }
}

/// Order book listener for one subscription.
pub struct OrderBookListener {
    config: ListenerConfig,
    state: ListenerState,

    /// Cached full book, absent in delta-only mode
    full_book: Option<SharedBook>,

    /// Delta produced by the latest message
    delta_book: OrderBook,

    /// Recap assembly area
    temp_book: OrderBook,

    got_initial: bool,
    handlers: Vec<Box<dyn OrderBookHandler + Send>>,
    stats: ListenerStats,
}

impl Default for OrderBookListener {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderBookListener {
    /// Create a listener with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ListenerConfig::default())
    }

    /// Create a listener with a custom configuration.
    pub fn with_config(config: ListenerConfig) -> Self {
        let full_book = config.track_full_book.then(|| {
            let mut book = OrderBook::new();
            book.set_strict_checking(config.strict_checking);
            Arc::new(Mutex::new(book))
        });
        Self::build(config, full_book)
    }

    /// Create a listener that maintains a caller-owned full book.
    ///
    /// The book's strict checking flag is set from the config.
    pub fn with_shared_book(config: ListenerConfig, book: SharedBook) -> Self {
        book.lock().set_strict_checking(config.strict_checking);
        Self::build(config, Some(book))
    }

    fn build(config: ListenerConfig, full_book: Option<SharedBook>) -> Self {
        Self {
            config,
            state: ListenerState::default(),
            full_book,
            delta_book: OrderBook::new(),
            temp_book: OrderBook::new(),
            got_initial: false,
            handlers: Vec::new(),
            stats: ListenerStats::default(),
        }
    }

    /// Register a handler. Handlers run in registration order.
    pub fn add_handler(&mut self, handler: impl OrderBookHandler + Send + 'static) {
        self.handlers.push(Box::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Process a message whose type is carried in its message type field.
    ///
    /// # Errors
    ///
    /// `DataFormat` if the message has no message type, plus anything
    /// [`on_msg`](Self::on_msg) returns.
    pub fn process_message(&mut self, sub: &BookSubscription, msg: &Message) -> Result<ListenerEvent> {
        let msg_type = msg
            .get_i64(self.config.fields.msg_type)
            .map(MsgType::from_code)
            .ok_or_else(|| BookError::data_format("message has no message type"))?;
        self.on_msg(sub, msg, msg_type)
    }

    /// Process one message of the given type.
    ///
    /// # Errors
    ///
    /// - `UpdateBeforeRecap` for an update before any clear or recap; no
    ///   state is touched.
    /// - `DataFormat` when the payload lacks required fields.
    /// - Strict-mode violations when applying an update with strict
    ///   checking on.
    pub fn on_msg(
        &mut self,
        sub: &BookSubscription,
        msg: &Message,
        msg_type: MsgType,
    ) -> Result<ListenerEvent> {
        self.stats.messages_processed += 1;

        let result = match msg_type {
            MsgType::Clear => self.handle_clear(sub, msg),
            MsgType::Initial | MsgType::Recap | MsgType::Snapshot => self.handle_recap(sub, msg),
            MsgType::Update => self.handle_update(sub, msg),
            MsgType::Other(code) => {
                log::trace!("{sub}: ignored message type {code}");
                Ok(ListenerEvent::Ignored)
            }
        };

        match &result {
            Ok(event) => self.stats.record(*event),
            Err(err) => {
                self.stats.errors += 1;
                if self.config.log_warnings {
                    log::warn!("{sub}: failed to process {msg_type:?} message: {err}");
                }
            }
        }
        result
    }

    fn handle_clear(&mut self, sub: &BookSubscription, msg: &Message) -> Result<ListenerEvent> {
        let full = self.full_book.clone();
        let mut guard = full.as_ref().map(|book| book.lock());

        self.state
            .apply_standard_fields(&self.config.fields, sub, msg, false);

        match guard.as_deref_mut() {
            Some(book) => {
                self.delta_book.set_as_delta_deleted(book);
                book.clear();
                book.set_symbol(sub.symbol());
                book.set_is_consistent(true);
            }
            None => self.delta_book.clear(),
        }
        self.delta_book.set_symbol(sub.symbol());

        let view = ListenerView {
            state: &self.state,
            full_book: guard.as_deref(),
            delta_book: &self.delta_book,
        };
        for handler in self.handlers.iter_mut() {
            handler.on_book_clear(sub, &view, msg, &self.delta_book);
        }

        self.got_initial = true;
        Ok(ListenerEvent::Clear)
    }

    fn handle_recap(&mut self, sub: &BookSubscription, msg: &Message) -> Result<ListenerEvent> {
        let full = self.full_book.clone();
        let mut guard = full.as_ref().map(|book| book.lock());
        let fields = &self.config.fields;

        self.state.apply_standard_fields(fields, sub, msg, false);
        let book_time = self.state.book_time_of(fields, msg);
        let payload = parse_payload(fields, msg, book_time)?;

        // Without a full book the image itself is the delta.
        let target = if guard.is_some() {
            &mut self.temp_book
        } else {
            &mut self.delta_book
        };
        if payload.is_first_fragment() {
            target.clear();
        }
        let complete = payload.is_complete();
        for level in payload.levels {
            target.add_level(level);
        }

        self.got_initial = true;
        if !complete {
            return Ok(ListenerEvent::Incomplete);
        }

        self.delta_book.set_symbol(sub.symbol());
        self.delta_book.set_book_time(book_time);

        if let Some(book) = guard.as_deref_mut() {
            self.delta_book.set_as_delta_difference(book, &self.temp_book);
            book.copy(&self.temp_book);
            book.set_symbol(sub.symbol());
            book.set_book_time(book_time);
            if !book.is_consistent() {
                if self.config.log_warnings {
                    log::info!("{sub}: book consistent again after recap (seq {})", self.state.seq_num());
                }
                book.set_is_consistent(true);
            }
            self.temp_book.clear();
        }

        let view = ListenerView {
            state: &self.state,
            full_book: guard.as_deref(),
            delta_book: &self.delta_book,
        };
        let recap_book = view.full_book.unwrap_or(&self.delta_book);
        for handler in self.handlers.iter_mut() {
            handler.on_book_recap(sub, &view, msg, recap_book);
        }
        Ok(ListenerEvent::Recap)
    }

    fn handle_update(&mut self, sub: &BookSubscription, msg: &Message) -> Result<ListenerEvent> {
        if !self.got_initial {
            return Err(BookError::UpdateBeforeRecap);
        }

        let full = self.full_book.clone();
        let mut guard = full.as_ref().map(|book| book.lock());
        let fields = &self.config.fields;
        let log_warnings = self.config.log_warnings;

        if let Some(seq_gap) = self.state.apply_standard_fields(fields, sub, msg, true) {
            let gap = seq_gap.gap;
            self.stats.gaps += 1;
            if log_warnings {
                log::warn!("{sub}: sequence number gap [{}-{}]", gap.begin, gap.end);
            }

            let view = ListenerView {
                state: &self.state,
                full_book: guard.as_deref(),
                delta_book: &self.delta_book,
            };
            for handler in self.handlers.iter_mut() {
                handler.on_book_gap(sub, &view, msg, &gap);
            }

            if seq_gap.same_sender {
                if let Some(book) = guard.as_deref_mut() {
                    if log_warnings && book.is_consistent() {
                        log::warn!("{sub}: book marked inconsistent after gap [{}-{}]", gap.begin, gap.end);
                    }
                    book.set_is_consistent(false);
                }
            }
        }

        let book_time = self.state.book_time_of(fields, msg);
        let payload = parse_payload(fields, msg, book_time)?;
        if payload.is_first_fragment() {
            self.delta_book.clear();
        }
        let complete = payload.is_complete();
        for level in payload.levels {
            self.delta_book.add_level(level);
        }
        if !complete {
            return Ok(ListenerEvent::Incomplete);
        }

        self.delta_book.set_symbol(sub.symbol());
        self.delta_book.set_book_time(book_time);

        let override_inconsistent = self.config.update_inconsistent_book;
        let deliver = match guard.as_deref_mut() {
            Some(book) => {
                let apply = override_inconsistent || book.is_consistent();
                if apply && book.strict_checking() {
                    // All or nothing: a rejected update leaves the levels
                    // untouched but the book can no longer be trusted.
                    let mut updated = book.clone();
                    if let Err(err) = updated.apply(&self.delta_book) {
                        if log_warnings {
                            log::warn!("{sub}: book marked inconsistent after rejected update: {err}");
                        }
                        book.set_is_consistent(false);
                        return Err(err);
                    }
                    *book = updated;
                } else if apply {
                    book.apply(&self.delta_book)?;
                }
                book.set_book_time(book_time);
                apply
            }
            None => true,
        };

        if !deliver {
            log::debug!(
                "{sub}: suppressed delta for inconsistent book (seq {})",
                self.state.seq_num()
            );
            return Ok(ListenerEvent::Suppressed);
        }

        let view = ListenerView {
            state: &self.state,
            full_book: guard.as_deref(),
            delta_book: &self.delta_book,
        };
        for handler in self.handlers.iter_mut() {
            handler.on_book_delta(sub, &view, msg, &self.delta_book);
        }
        Ok(ListenerEvent::Delta)
    }

    /// Header state as of the latest message.
    #[inline]
    pub fn state(&self) -> &ListenerState {
        &self.state
    }

    #[inline]
    pub fn seq_num(&self) -> i64 {
        self.state.seq_num()
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        self.state.symbol()
    }

    /// Whether a clear or complete recap has been seen.
    #[inline]
    pub fn got_initial(&self) -> bool {
        self.got_initial
    }

    /// Whether the full book is consistent. Always true without one.
    pub fn is_consistent(&self) -> bool {
        self.full_book
            .as_ref()
            .map_or(true, |book| book.lock().is_consistent())
    }

    /// Delta produced by the latest message.
    #[inline]
    pub fn delta_book(&self) -> &OrderBook {
        &self.delta_book
    }

    /// Handle to the full book for callers that manage locking themselves.
    pub fn shared_full_book(&self) -> Option<SharedBook> {
        self.full_book.clone()
    }

    /// Copy of the full book that shares level storage with it. Later
    /// updates copy a level before changing it, so the snapshot never
    /// changes underneath the caller.
    pub fn book_snapshot(&self) -> Option<OrderBook> {
        self.full_book.as_ref().map(|book| book.lock().clone())
    }

    /// Fully independent copy of the full book.
    pub fn deep_book_snapshot(&self) -> Option<OrderBook> {
        self.full_book.as_ref().map(|book| {
            let book = book.lock();
            let mut snapshot = OrderBook::with_symbol(book.symbol());
            snapshot.deep_copy(&book);
            snapshot.set_book_time(book.book_time());
            snapshot.set_is_consistent(book.is_consistent());
            snapshot.set_strict_checking(book.strict_checking());
            snapshot
        })
    }

    /// Forget everything received so far. Handlers and configuration are
    /// kept.
    pub fn reset(&mut self) {
        if let Some(book) = &self.full_book {
            let mut book = book.lock();
            book.clear();
            book.set_book_time(None);
            book.set_is_consistent(true);
        }
        self.state = ListenerState::default();
        self.delta_book = OrderBook::new();
        self.temp_book = OrderBook::new();
        self.got_initial = false;
        self.stats = ListenerStats::default();
    }

    /// Get current statistics.
    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    pub fn config(&self) -> &ListenerConfig {
        &self.config
    }
}

impl fmt::Debug for OrderBookListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderBookListener")
            .field("symbol", &self.state.symbol())
            .field("seq_num", &self.state.seq_num())
            .field("got_initial", &self.got_initial)
            .field("tracks_full_book", &self.full_book.is_some())
            .field("handlers", &self.handlers.len())
            .field("stats", &self.stats)
            .finish()
    }
}
