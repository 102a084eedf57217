//! Shared helpers for building books and feed messages in tests.

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;

use mamda_orderbook::{
    BookFields, BookGap, BookSubscription, BookWriter, Entry, EntryAction, FieldValue,
    LevelAction, ListenerView, Message, OrderBook, OrderBookHandler, Price, PriceLevel, Side,
};

pub const SENDER: u64 = 1;

pub fn sub() -> BookSubscription {
    BookSubscription::new("NYSE", "IBM")
}

/// A level whose size and entry count add up from its entries.
pub fn level(price: f64, side: Side, entries: &[(&str, u64)]) -> PriceLevel {
    let mut level = PriceLevel::new(Price::from_f64(price), side)
        .with_size(entries.iter().map(|(_, size)| size).sum())
        .with_num_entries(entries.len() as u32);
    for (id, size) in entries {
        level = level.with_entry(Entry::new(*id, *size, EntryAction::Add));
    }
    level
}

/// Two bid levels and two ask levels.
pub fn image() -> OrderBook {
    let mut book = OrderBook::with_symbol("IBM");
    book.add_level(level(100.0, Side::Bid, &[("a", 10), ("b", 20)]));
    book.add_level(level(99.5, Side::Bid, &[("c", 5)]));
    book.add_level(level(100.5, Side::Ask, &[("d", 7)]));
    book.add_level(level(101.0, Side::Ask, &[("e", 3), ("f", 4)]));
    book
}

/// Delta adding one entry to an existing level.
pub fn add_entry(price: f64, side: Side, id: &str, size: u64, level_size: u64) -> OrderBook {
    let mut delta = OrderBook::with_symbol("IBM");
    delta.add_level(
        PriceLevel::new(Price::from_f64(price), side)
            .with_action(LevelAction::Update)
            .with_size(level_size)
            .with_entry(Entry::new(id, size, EntryAction::Add)),
    );
    delta
}

/// Delta adding a new level.
pub fn add_level(price: f64, side: Side, id: &str, size: u64) -> OrderBook {
    let mut delta = OrderBook::with_symbol("IBM");
    delta.add_level(level(price, side, &[(id, size)]));
    delta
}

/// Encode `book` with `fields` and stamp the header.
pub fn encode(fields: &BookFields, book: &OrderBook, seq: i64) -> Message {
    let mut msg = BookWriter::new(fields.clone())
        .write(book)
        .expect("book encodes");
    stamp(fields, &mut msg, seq);
    msg
}

/// Encode with the default (vector) fields.
pub fn message(book: &OrderBook, seq: i64) -> Message {
    encode(&BookFields::default(), book, seq)
}

/// A message carrying only header fields, as used for clears.
pub fn header_only(seq: i64) -> Message {
    let mut msg = Message::new();
    stamp(&BookFields::default(), &mut msg, seq);
    msg
}

pub fn stamp(fields: &BookFields, msg: &mut Message, seq: i64) {
    msg.set(fields.seq_num, FieldValue::I64(seq));
    msg.set(fields.sender_id, FieldValue::U64(SENDER));
}

/// Records handler callbacks as short strings.
#[derive(Default, Clone)]
pub struct Recorder {
    pub events: Arc<Mutex<Vec<String>>>,
    pub last_delta: Arc<Mutex<Option<OrderBook>>>,
}

impl Recorder {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl OrderBookHandler for Recorder {
    fn on_book_recap(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        book: &OrderBook,
    ) {
        self.events
            .lock()
            .push(format!("recap {}", book.total_num_levels()));
    }

    fn on_book_delta(
        &mut self,
        _sub: &BookSubscription,
        view: &ListenerView<'_>,
        _msg: &Message,
        delta: &OrderBook,
    ) {
        self.events.lock().push(format!("delta seq={}", view.seq_num()));
        *self.last_delta.lock() = Some(delta.clone());
    }

    fn on_book_clear(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        delta: &OrderBook,
    ) {
        self.events
            .lock()
            .push(format!("clear {}", delta.total_num_levels()));
        *self.last_delta.lock() = Some(delta.clone());
    }

    fn on_book_gap(
        &mut self,
        _sub: &BookSubscription,
        _view: &ListenerView<'_>,
        _msg: &Message,
        gap: &BookGap,
    ) {
        self.events
            .lock()
            .push(format!("gap {}-{}", gap.begin, gap.end));
    }
}
