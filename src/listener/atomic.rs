//! Streaming book listener.
//!
//! [`BookAtomicListener`] keeps no book at all. Each message is decoded
//! and handed out level by level and entry by entry, bracketed by
//! begin/end callbacks, so a consumer can maintain its own reduced book
//! representation. Consistency handling is left to the consumer: gaps are
//! reported but nothing is ever suppressed.
//!
//! A consumer that wants to stop listening from inside a callback must
//! wait for `on_book_atomic_end_book` before dropping the listener.

use super::order_book_listener::{ListenerEvent, ListenerStats};
use super::payload::parse_payload;
use super::state::{BookGap, ListenerState};
use crate::book::{Entry, PriceLevel};
use crate::error::{BookError, Result};
use crate::fields::BookFields;
use crate::message::Message;
use crate::subscription::BookSubscription;
use crate::types::MsgType;

/// A level as delivered to atomic handlers, with its position in the
/// message.
#[derive(Debug, Clone, Copy)]
pub struct AtomicLevel<'a> {
    pub level: &'a PriceLevel,
    /// 1-based position within the message
    pub level_num: usize,
    /// Number of levels in the message
    pub num_levels: usize,
}

impl AtomicLevel<'_> {
    /// Whether this is the last level of the message.
    #[inline]
    pub fn is_last(&self) -> bool {
        self.level_num == self.num_levels
    }
}

/// Book-wide callbacks.
pub trait BookAtomicBookHandler {
    /// Before the first level of a message.
    fn on_book_atomic_begin_book(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        is_recap: bool,
    );

    /// After the last level of a message.
    fn on_book_atomic_end_book(&mut self, sub: &BookSubscription, state: &ListenerState);

    fn on_book_atomic_clear(&mut self, sub: &BookSubscription, state: &ListenerState, msg: &Message);

    fn on_book_atomic_gap(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        msg: &Message,
        gap: &BookGap,
    );
}

/// Per-level callbacks.
pub trait BookAtomicLevelHandler {
    fn on_book_atomic_level_recap(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        msg: &Message,
        level: &AtomicLevel<'_>,
    );

    fn on_book_atomic_level_delta(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        msg: &Message,
        level: &AtomicLevel<'_>,
    );
}

/// Per-entry callbacks. `level` is the level the entry belongs to.
pub trait BookAtomicLevelEntryHandler {
    fn on_book_atomic_level_entry_recap(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        msg: &Message,
        level: &AtomicLevel<'_>,
        entry: &Entry,
    );

    fn on_book_atomic_level_entry_delta(
        &mut self,
        sub: &BookSubscription,
        state: &ListenerState,
        msg: &Message,
        level: &AtomicLevel<'_>,
        entry: &Entry,
    );
}

/// Listener that streams levels and entries without caching a book.
pub struct BookAtomicListener {
    fields: BookFields,
    log_warnings: bool,
    state: ListenerState,
    got_initial: bool,
    book_handler: Option<Box<dyn BookAtomicBookHandler + Send>>,
    level_handler: Option<Box<dyn BookAtomicLevelHandler + Send>>,
    entry_handler: Option<Box<dyn BookAtomicLevelEntryHandler + Send>>,
    stats: ListenerStats,
}

impl BookAtomicListener {
    pub fn new(fields: BookFields) -> Self {
        Self {
            fields,
            log_warnings: true,
            state: ListenerState::default(),
            got_initial: false,
            book_handler: None,
            level_handler: None,
            entry_handler: None,
            stats: ListenerStats::default(),
        }
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self
    }

    /// Set the book handler, replacing any previous one.
    pub fn set_book_handler(&mut self, handler: impl BookAtomicBookHandler + Send + 'static) {
        self.book_handler = Some(Box::new(handler));
    }

    /// Set the level handler, replacing any previous one.
    pub fn set_level_handler(&mut self, handler: impl BookAtomicLevelHandler + Send + 'static) {
        self.level_handler = Some(Box::new(handler));
    }

    /// Set the entry handler, replacing any previous one.
    pub fn set_level_entry_handler(
        &mut self,
        handler: impl BookAtomicLevelEntryHandler + Send + 'static,
    ) {
        self.entry_handler = Some(Box::new(handler));
    }

    /// Process one message of the given type.
    ///
    /// # Errors
    ///
    /// `UpdateBeforeRecap` for an update before any clear or recap, and
    /// `DataFormat` for a malformed payload. In both cases no callback is
    /// made for the message.
    pub fn on_msg(
        &mut self,
        sub: &BookSubscription,
        msg: &Message,
        msg_type: MsgType,
    ) -> Result<ListenerEvent> {
        self.stats.messages_processed += 1;

        let result = match msg_type {
            MsgType::Clear => {
                self.state.apply_standard_fields(&self.fields, sub, msg, false);
                self.got_initial = true;
                if let Some(handler) = self.book_handler.as_mut() {
                    handler.on_book_atomic_clear(sub, &self.state, msg);
                }
                Ok(ListenerEvent::Clear)
            }
            MsgType::Initial | MsgType::Recap | MsgType::Snapshot => {
                self.state.apply_standard_fields(&self.fields, sub, msg, false);
                self.got_initial = true;
                self.stream(sub, msg, true).map(|()| ListenerEvent::Recap)
            }
            MsgType::Update if !self.got_initial => Err(BookError::UpdateBeforeRecap),
            MsgType::Update => {
                if let Some(seq_gap) = self.state.apply_standard_fields(&self.fields, sub, msg, true) {
                    self.stats.gaps += 1;
                    if self.log_warnings {
                        log::warn!(
                            "{sub}: sequence number gap [{}-{}]",
                            seq_gap.gap.begin,
                            seq_gap.gap.end
                        );
                    }
                    if let Some(handler) = self.book_handler.as_mut() {
                        handler.on_book_atomic_gap(sub, &self.state, msg, &seq_gap.gap);
                    }
                }
                self.stream(sub, msg, false).map(|()| ListenerEvent::Delta)
            }
            MsgType::Other(code) => {
                log::trace!("{sub}: ignored message type {code}");
                Ok(ListenerEvent::Ignored)
            }
        };

        match &result {
            Ok(event) => self.stats.record(*event),
            Err(err) => {
                self.stats.errors += 1;
                if self.log_warnings {
                    log::warn!("{sub}: failed to process {msg_type:?} message: {err}");
                }
            }
        }
        result
    }

    fn stream(&mut self, sub: &BookSubscription, msg: &Message, is_recap: bool) -> Result<()> {
        let book_time = self.state.book_time_of(&self.fields, msg);
        let payload = parse_payload(&self.fields, msg, book_time)?;
        let state = &self.state;

        if let Some(handler) = self.book_handler.as_mut() {
            handler.on_book_atomic_begin_book(sub, state, is_recap);
        }

        let num_levels = payload.levels.len();
        for (i, level) in payload.levels.iter().enumerate() {
            let atomic = AtomicLevel {
                level,
                level_num: i + 1,
                num_levels,
            };
            if let Some(handler) = self.level_handler.as_mut() {
                if is_recap {
                    handler.on_book_atomic_level_recap(sub, state, msg, &atomic);
                } else {
                    handler.on_book_atomic_level_delta(sub, state, msg, &atomic);
                }
            }
            if let Some(handler) = self.entry_handler.as_mut() {
                for entry in level.entries() {
                    if is_recap {
                        handler.on_book_atomic_level_entry_recap(sub, state, msg, &atomic, entry);
                    } else {
                        handler.on_book_atomic_level_entry_delta(sub, state, msg, &atomic, entry);
                    }
                }
            }
        }

        if let Some(handler) = self.book_handler.as_mut() {
            handler.on_book_atomic_end_book(sub, state);
        }
        Ok(())
    }

    /// Header state as of the latest message.
    pub fn state(&self) -> &ListenerState {
        &self.state
    }

    pub fn seq_num(&self) -> i64 {
        self.state.seq_num()
    }

    pub fn got_initial(&self) -> bool {
        self.got_initial
    }

    pub fn stats(&self) -> &ListenerStats {
        &self.stats
    }

    pub fn fields(&self) -> &BookFields {
        &self.fields
    }
}

impl std::fmt::Debug for BookAtomicListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BookAtomicListener")
            .field("symbol", &self.state.symbol())
            .field("seq_num", &self.state.seq_num())
            .field("got_initial", &self.got_initial)
            .field("stats", &self.stats)
            .finish()
    }
}
