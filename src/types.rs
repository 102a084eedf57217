//! Core value types shared by books, levels, entries and listeners.
//!
//! These types are designed to be:
//! - Small and `Copy` where possible
//! - Exactly comparable (prices are fixed-point, never bare floats)
//! - Mapped one-to-one onto the single-character codes used on the wire

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of fixed-point units per price unit.
pub const PRICE_SCALE: i64 = 1_000_000_000;

/// Fixed-point price with nine decimal places.
///
/// Stored as an `i64` count of 1e-9 units so that price keys compare and
/// hash exactly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(i64);

impl Price {
    /// Zero price.
    pub const ZERO: Price = Price(0);

    /// Create a price from raw fixed-point units.
    #[inline]
    pub const fn from_raw(raw: i64) -> Self {
        Price(raw)
    }

    /// Create a price from a floating point value, rounding to the nearest
    /// fixed-point unit.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Price((value * PRICE_SCALE as f64).round() as i64)
    }

    /// Raw fixed-point units.
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Price as floating point.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0 as f64 / PRICE_SCALE as f64
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / PRICE_SCALE as u64;
        let frac = abs % PRICE_SCALE as u64;
        if frac == 0 {
            return write!(f, "{sign}{whole}");
        }
        let digits = format!("{frac:09}");
        write!(f, "{sign}{whole}.{}", digits.trim_end_matches('0'))
    }
}

/// Book side of a price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side
    Bid = b'B',
    /// Sell side
    Ask = b'A',
    /// Side not supplied or not recognised
    #[default]
    Unknown = b'U',
}

impl Side {
    /// Parse a side from its wire code. Unrecognised codes map to `Unknown`.
    pub fn from_char(code: char) -> Self {
        match code {
            'B' | 'b' => Side::Bid,
            'A' | 'a' => Side::Ask,
            _ => Side::Unknown,
        }
    }

    /// Wire code for this side.
    pub fn to_char(self) -> char {
        self as u8 as char
    }
}

/// Action carried by a price level.
///
/// Level actions differ from entry actions: a level marked `Add` may carry
/// entries marked `Add`, `Update` or `Delete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum LevelAction {
    /// New price level
    Add = b'A',
    /// Updated price level
    Update = b'U',
    /// Deleted price level
    Delete = b'D',
    /// Unknown action (error)
    #[default]
    Unknown = b'Z',
}

impl LevelAction {
    /// Parse an action from its wire code.
    pub fn from_char(code: char) -> Self {
        match code {
            'A' => LevelAction::Add,
            'U' => LevelAction::Update,
            'D' => LevelAction::Delete,
            _ => LevelAction::Unknown,
        }
    }

    /// Wire code for this action.
    pub fn to_char(self) -> char {
        self as u8 as char
    }
}

/// Action carried by a price level entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryAction {
    /// New entry
    Add = b'A',
    /// Updated entry
    Update = b'U',
    /// Deleted entry
    Delete = b'D',
    /// Unknown action (error)
    #[default]
    Unknown = b'Z',
}

impl EntryAction {
    /// Parse an action from its wire code.
    pub fn from_char(code: char) -> Self {
        match code {
            'A' => EntryAction::Add,
            'U' => EntryAction::Update,
            'D' => EntryAction::Delete,
            _ => EntryAction::Unknown,
        }
    }

    /// Wire code for this action.
    pub fn to_char(self) -> char {
        self as u8 as char
    }
}

/// Classification of an inbound book message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MsgType {
    /// Wipe the book
    Clear,
    /// First full image after subscribing
    Initial,
    /// Full image sent to repair the book
    Recap,
    /// Full image for a snapshot subscription
    Snapshot,
    /// Incremental change
    Update,
    /// Any other message type code
    Other(i64),
}

impl MsgType {
    /// Map a MAMA message type code.
    pub fn from_code(code: i64) -> Self {
        match code {
            16 => MsgType::Initial,
            17 => MsgType::Update,
            18 => MsgType::Clear,
            19 => MsgType::Recap,
            20 => MsgType::Snapshot,
            other => MsgType::Other(other),
        }
    }

    /// MAMA message type code.
    pub fn code(self) -> i64 {
        match self {
            MsgType::Initial => 16,
            MsgType::Update => 17,
            MsgType::Clear => 18,
            MsgType::Recap => 19,
            MsgType::Snapshot => 20,
            MsgType::Other(code) => code,
        }
    }

    /// Whether this message type carries a full book image.
    #[inline]
    pub fn is_full_image(self) -> bool {
        matches!(self, MsgType::Initial | MsgType::Recap | MsgType::Snapshot)
    }
}

/// Whether a cached field was touched by the most recent message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FieldState {
    /// Never received
    #[default]
    NotInitialised,
    /// Received in the most recent message
    Modified,
    /// Received earlier but not in the most recent message
    NotModified,
}

impl FieldState {
    /// Roll the state forward for a new message: a previously modified
    /// field becomes `NotModified` unless the message sets it again.
    #[inline]
    pub(crate) fn age(&mut self) {
        if *self == FieldState::Modified {
            *self = FieldState::NotModified;
        }
    }
}
