//! Order book data structures.
//!
//! - [`Entry`]: one order or participant at a price
//! - [`PriceLevel`]: entries at one price on one side
//! - [`OrderBook`]: both sides, usable as a full book or a delta
//! - [`BookWriter`]: encodes books into messages

mod entry;
mod order_book;
mod price_level;
mod writer;

pub use entry::Entry;
pub use order_book::OrderBook;
pub use price_level::PriceLevel;
pub use writer::BookWriter;
