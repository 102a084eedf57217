//! Field descriptors for book messages.
//!
//! A [`BookFields`] value says which fid carries which book attribute. It
//! is resolved once, either from the built-in layout or from a
//! [`FieldDictionary`], and then handed to each listener through its
//! config. Nothing here is process-wide, so listeners bound to different
//! dictionaries can coexist.
//!
//! # Layouts
//!
//! Two payload layouts are supported:
//!
//! | Layout | Levels | Entries |
//! |--------|--------|---------|
//! | Vector | `wPriceLevels` vector of sub-messages | `wPlEntries` vector inside each level |
//! | Numbered | `wPriceLevel1..N` sub-messages (or flattened when N = 1) | `wPlEntry1..M` sub-messages (or flattened) |
//!
//! The vector layout is used whenever [`BookFields::has_vector_fields`]
//! reports it is resolvable.

use ahash::AHashMap;

use crate::error::{BookError, Result};
use crate::message::Fid;

/// Number of `wPriceLevelN` fields in the built-in layout.
pub const DEFAULT_NUM_LEVEL_FIELDS: u16 = 50;

/// Number of `wPlEntryN` fields in the built-in layout.
pub const DEFAULT_NUM_ENTRY_FIELDS: u16 = 100;

const PRICE_LEVEL_BASE_FID: Fid = 700;
const PL_ENTRY_BASE_FID: Fid = 800;

/// Name → fid dictionary, the minimal view of a data dictionary needed to
/// resolve [`BookFields`].
#[derive(Debug, Clone, Default)]
pub struct FieldDictionary {
    by_name: AHashMap<String, Fid>,
}

impl FieldDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Dictionary holding every name of the built-in layout.
    pub fn standard() -> Self {
        let mut dict = Self::new();
        for (name, fid) in STANDARD_FIELDS {
            dict.insert(name, *fid);
        }
        for i in 1..=DEFAULT_NUM_LEVEL_FIELDS {
            dict.insert(&format!("wPriceLevel{i}"), PRICE_LEVEL_BASE_FID + i);
        }
        for i in 1..=DEFAULT_NUM_ENTRY_FIELDS {
            dict.insert(&format!("wPlEntry{i}"), PL_ENTRY_BASE_FID + i);
        }
        dict
    }

    /// Register a field.
    pub fn insert(&mut self, name: &str, fid: Fid) {
        self.by_name.insert(name.to_string(), fid);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, name: &str, fid: Fid) -> Self {
        self.insert(name, fid);
        self
    }

    /// Remove a field by name.
    pub fn remove(&mut self, name: &str) -> Option<Fid> {
        self.by_name.remove(name)
    }

    /// Look up a fid by field name.
    #[inline]
    pub fn lookup(&self, name: &str) -> Option<Fid> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

const STANDARD_FIELDS: &[(&str, Fid)] = &[
    ("MdMsgType", 1),
    ("MdMsgNum", 7),
    ("MdMsgTotal", 8),
    ("MdSeqNum", 10),
    ("MdSendTime", 16),
    ("MdSenderId", 20),
    ("wActivityTime", 102),
    ("wSrcTime", 465),
    ("wIssueSymbol", 470),
    ("wPartId", 471),
    ("wLineTime", 1174),
    ("wEventSeqNum", 3036),
    ("wNumLevels", 651),
    ("wPlAction", 652),
    ("wPlPrice", 653),
    ("wPlSide", 654),
    ("wPlSize", 655),
    ("wPlSizeChange", 656),
    ("wPlNumEntries", 657),
    ("wPlTime", 658),
    ("wPlNumAttach", 659),
    ("wEntryId", 681),
    ("wEntrySize", 682),
    ("wEntryAction", 683),
    ("wEntryTime", 685),
    ("wBookTime", 692),
    ("wPriceLevels", 699),
    ("wPlEntries", 700),
];

/// Resolved field descriptors for order book messages.
///
/// Header fields reserved by the middleware are always present; every
/// book field is optional because a dictionary may not define it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookFields {
    // Reserved header fields
    pub msg_type: Fid,
    pub msg_num: Fid,
    pub msg_total: Fid,
    pub seq_num: Fid,
    pub send_time: Fid,
    pub sender_id: Fid,

    // Book header
    pub symbol: Option<Fid>,
    pub part_id: Option<Fid>,
    pub src_time: Option<Fid>,
    pub activity_time: Option<Fid>,
    pub line_time: Option<Fid>,
    pub book_time: Option<Fid>,
    pub event_seq_num: Option<Fid>,
    pub num_levels: Option<Fid>,

    // Vector layout
    pub price_levels: Option<Fid>,
    pub pl_entries: Option<Fid>,

    // Price level
    pub pl_action: Option<Fid>,
    pub pl_price: Option<Fid>,
    pub pl_side: Option<Fid>,
    pub pl_size: Option<Fid>,
    pub pl_size_change: Option<Fid>,
    pub pl_num_entries: Option<Fid>,
    pub pl_time: Option<Fid>,
    pub pl_num_attach: Option<Fid>,

    // Entry
    pub entry_id: Option<Fid>,
    pub entry_size: Option<Fid>,
    pub entry_action: Option<Fid>,
    pub entry_time: Option<Fid>,

    /// `wPriceLevel1..N`, index 0 is level 1.
    pub price_level_fids: Vec<Fid>,
    /// `wPlEntry1..M`, index 0 is entry 1.
    pub pl_entry_fids: Vec<Fid>,
}

impl Default for BookFields {
    fn default() -> Self {
        // The standard dictionary always resolves a price field.
        Self::resolve(&FieldDictionary::standard())
    }
}

impl BookFields {
    /// Resolve descriptors from a dictionary.
    ///
    /// Reserved header fields fall back to their standard fids when the
    /// dictionary does not name them. Numbered level and entry fields are
    /// collected from 1 upwards until the first missing name.
    ///
    /// # Errors
    ///
    /// Returns `DataFormat` when the dictionary has no price level price
    /// field, since no level could ever be parsed.
    pub fn from_dictionary(dict: &FieldDictionary) -> Result<Self> {
        let fields = Self::resolve(dict);
        if fields.pl_price.is_none() {
            return Err(BookError::data_format(
                "cannot find price level fields in dictionary",
            ));
        }
        log::debug!(
            "Resolved book fields: vector={}, {} level fields, {} entry fields",
            fields.has_vector_fields(),
            fields.price_level_fids.len(),
            fields.pl_entry_fids.len()
        );
        Ok(fields)
    }

    fn resolve(dict: &FieldDictionary) -> Self {
        let reserved = |name: &str, fallback: Fid| dict.lookup(name).unwrap_or(fallback);
        let numbered = |prefix: &str| -> Vec<Fid> {
            (1u32..)
                .map_while(|i| dict.lookup(&format!("{prefix}{i}")))
                .collect()
        };

        Self {
            msg_type: reserved("MdMsgType", 1),
            msg_num: reserved("MdMsgNum", 7),
            msg_total: reserved("MdMsgTotal", 8),
            seq_num: reserved("MdSeqNum", 10),
            send_time: reserved("MdSendTime", 16),
            sender_id: reserved("MdSenderId", 20),

            symbol: dict.lookup("wIssueSymbol").or_else(|| dict.lookup("wSymbol")),
            part_id: dict.lookup("wPartId"),
            src_time: dict.lookup("wSrcTime"),
            activity_time: dict.lookup("wActivityTime"),
            line_time: dict.lookup("wLineTime"),
            book_time: dict.lookup("wBookTime"),
            event_seq_num: dict.lookup("wEventSeqNum"),
            num_levels: dict.lookup("wNumLevels"),

            price_levels: dict.lookup("wPriceLevels"),
            pl_entries: dict.lookup("wPlEntries"),

            pl_action: dict.lookup("wPlAction"),
            pl_price: dict.lookup("wPlPrice"),
            pl_side: dict.lookup("wPlSide"),
            pl_size: dict.lookup("wPlSize"),
            pl_size_change: dict.lookup("wPlSizeChange"),
            pl_num_entries: dict.lookup("wPlNumEntries"),
            pl_time: dict.lookup("wPlTime"),
            pl_num_attach: dict.lookup("wPlNumAttach"),

            entry_id: dict.lookup("wEntryId"),
            entry_size: dict.lookup("wEntrySize"),
            entry_action: dict.lookup("wEntryAction"),
            entry_time: dict.lookup("wEntryTime"),

            price_level_fids: numbered("wPriceLevel"),
            pl_entry_fids: numbered("wPlEntry"),
        }
    }

    /// Whether the vector layout can be used.
    #[inline]
    pub fn has_vector_fields(&self) -> bool {
        self.price_levels.is_some()
    }

    /// Drop the vector fields, forcing the numbered layout.
    pub fn without_vector_fields(mut self) -> Self {
        self.price_levels = None;
        self.pl_entries = None;
        self
    }

    /// Number of `wPriceLevelN` fields resolved.
    #[inline]
    pub fn num_level_fields(&self) -> usize {
        self.price_level_fids.len()
    }

    /// Number of `wPlEntryN` fields resolved.
    #[inline]
    pub fn num_entry_fields(&self) -> usize {
        self.pl_entry_fids.len()
    }
}
