//! # mamda-orderbook
//!
//! Order book reconstruction for MAMDA-style market data feeds.
//!
//! A feed publishes, per instrument, full book images (initial, recap,
//! snapshot), incremental updates and clears. This crate turns those
//! messages into a cached full [`OrderBook`] plus a delta book per message,
//! tracks whether the cached book can be trusted, and validates it against
//! independent snapshots.
//!
//! ## Features
//!
//! - **Price level books**: bid/ask levels keyed by exact fixed-point
//!   price, each holding its entries in feed order
//! - **Deltas**: apply, diff and tombstone operations between books
//! - **Consistency tracking**: sequence gaps from the same sender mark the
//!   book inconsistent and suppress deltas until the next recap
//! - **Two listeners**: [`OrderBookListener`] caches a full book,
//!   [`BookAtomicListener`] streams levels and entries without one
//! - **Checking**: snapshot and apply-delta checks with shared counters
//! - **Both wire layouts**: vector fields or numbered `PriceLevelN` /
//!   `PlEntryN` fields, including books split over several messages
//!
//! ## Quick Start
//!
//! ```rust
//! use mamda_orderbook::{
//!     BookFields, BookSubscription, BookWriter, Entry, EntryAction, ListenerEvent, MsgType,
//!     OrderBook, OrderBookListener, Price, PriceLevel, Side,
//! };
//!
//! // Build a book and encode it as a recap message
//! let mut image = OrderBook::with_symbol("IBM");
//! image.add_level(
//!     PriceLevel::new(Price::from_f64(100.25), Side::Bid)
//!         .with_size(100)
//!         .with_num_entries(1)
//!         .with_entry(Entry::new("order-1", 100, EntryAction::Add)),
//! );
//! let msg = BookWriter::new(BookFields::default()).write(&image).unwrap();
//!
//! // Feed it to a listener
//! let sub = BookSubscription::new("NYSE", "IBM");
//! let mut listener = OrderBookListener::new();
//! let event = listener.on_msg(&sub, &msg, MsgType::Initial).unwrap();
//! assert_eq!(event, ListenerEvent::Recap);
//!
//! let book = listener.book_snapshot().unwrap();
//! assert_eq!(book.best_bid().unwrap().price(), Price::from_f64(100.25));
//! ```
//!
//! ## Modules
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`book`] | `Entry`, `PriceLevel`, `OrderBook`, `BookWriter` |
//! | [`listener`] | `OrderBookListener`, `BookAtomicListener`, handlers |
//! | [`checker`] | snapshot and apply-delta checks |
//! | [`fields`] | field dictionary and resolved field descriptors |
//! | [`message`] | the field message handed over by a transport |
//! | [`source`] | replayable message sources |

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod book;
pub mod checker;
pub mod error;
pub mod fields;
pub mod listener;
pub mod message;
pub mod source;
pub mod subscription;
pub mod types;

// Re-exports - Core types
pub use error::{BookError, ErrorKind, Result};
pub use types::{EntryAction, FieldState, LevelAction, MsgType, Price, Side, PRICE_SCALE};

// Re-exports - Books
pub use book::{BookWriter, Entry, OrderBook, PriceLevel};

// Re-exports - Messages and fields
pub use fields::{BookFields, FieldDictionary};
pub use message::{Fid, FieldValue, Message};
pub use subscription::{BookSubscription, ServiceLevel};

// Re-exports - Listeners
pub use listener::{
    AtomicLevel, BookAtomicBookHandler, BookAtomicLevelEntryHandler, BookAtomicLevelHandler,
    BookAtomicListener, BookGap, ListenerConfig, ListenerEvent, ListenerState, ListenerStats,
    ListenerView, OrderBookHandler, OrderBookListener, SharedBook,
};

// Re-exports - Checking
pub use checker::{
    CheckCounters, CheckOutcome, CheckSchedule, CheckType, CheckerHandler, DeltaChecker,
    OrderBookChecker, SnapshotRequester,
};

// Re-exports - Source abstraction
pub use source::{JsonLinesSource, MessageSource, ReplayRecord, SourceMetadata, VecSource};
