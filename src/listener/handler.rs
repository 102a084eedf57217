//! Callbacks invoked by [`OrderBookListener`](super::OrderBookListener).

use super::state::{BookGap, ListenerState};
use crate::book::OrderBook;
use crate::message::Message;
use crate::subscription::BookSubscription;

/// Read-only view of a listener handed to handlers during a callback.
///
/// The full book is borrowed while the listener holds its lock, so a
/// handler sees it exactly as it stands after the current message.
#[derive(Debug, Clone, Copy)]
pub struct ListenerView<'a> {
    pub(crate) state: &'a ListenerState,
    pub(crate) full_book: Option<&'a OrderBook>,
    pub(crate) delta_book: &'a OrderBook,
}

impl<'a> ListenerView<'a> {
    /// Header state as of the current message.
    pub fn state(&self) -> &'a ListenerState {
        self.state
    }

    /// The cached full book, if the listener tracks one.
    pub fn full_book(&self) -> Option<&'a OrderBook> {
        self.full_book
    }

    /// Delta produced by the current message.
    pub fn delta_book(&self) -> &'a OrderBook {
        self.delta_book
    }

    pub fn symbol(&self) -> &'a str {
        self.state.symbol()
    }

    pub fn seq_num(&self) -> i64 {
        self.state.seq_num()
    }

    pub fn gap_begin(&self) -> i64 {
        self.state.gap_begin()
    }

    pub fn gap_end(&self) -> i64 {
        self.state.gap_end()
    }

    /// Whether the full book is consistent. Without a full book the
    /// listener never suppresses anything, so this is always true.
    pub fn is_consistent(&self) -> bool {
        self.full_book.map_or(true, OrderBook::is_consistent)
    }
}

/// Receives order book events from a listener.
///
/// Every method has an empty default so a handler implements only what it
/// needs. Handlers run on the delivery thread, in registration order.
pub trait OrderBookHandler {
    /// A complete full image arrived (initial, recap or snapshot).
    /// `book` is the full book, or the parsed image without one.
    fn on_book_recap(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        _book: &OrderBook,
    ) {
    }

    /// An update was delivered.
    fn on_book_delta(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        _delta: &OrderBook,
    ) {
    }

    /// The book was cleared; `delta` deletes every level it had.
    fn on_book_clear(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        _delta: &OrderBook,
    ) {
    }

    /// Sequence numbers were skipped.
    fn on_book_gap(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        _gap: &BookGap,
    ) {
    }
}
