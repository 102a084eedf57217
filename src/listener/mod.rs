//! Book listeners.
//!
//! - [`OrderBookListener`]: keeps a full book and emits deltas
//! - [`BookAtomicListener`]: streams levels and entries, keeps nothing
//!
//! Both read the same header fields into a [`ListenerState`] and decode
//! payloads in either field layout.

mod atomic;
mod handler;
mod order_book_listener;
mod payload;
mod state;

pub use atomic::{
    AtomicLevel, BookAtomicBookHandler, BookAtomicLevelEntryHandler, BookAtomicLevelHandler,
    BookAtomicListener,
};
pub use handler::{ListenerView, OrderBookHandler};
pub use order_book_listener::{
    ListenerConfig, ListenerEvent, ListenerStats, OrderBookListener, SharedBook,
};
pub use state::{BookGap, ListenerState};
