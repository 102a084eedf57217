//! A single order or participant contribution at a price level.

use std::fmt;

use crate::error::{BookError, Result};
use crate::types::EntryAction;

/// One entry within a [`PriceLevel`](super::PriceLevel).
///
/// Entries are plain values: identity is the `id` string, and a level
/// keeps its live entries unique by id.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Entry {
    id: String,
    size: u64,
    action: EntryAction,
    /// Nanoseconds since the Unix epoch.
    time: Option<i64>,
}

impl Entry {
    /// Create an entry.
    pub fn new(id: impl Into<String>, size: u64, action: EntryAction) -> Self {
        Self {
            id: id.into(),
            size,
            action,
            time: None,
        }
    }

    /// Builder-style time setter.
    pub fn with_time(mut self, time: i64) -> Self {
        self.time = Some(time);
        self
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    pub fn action(&self) -> EntryAction {
        self.action
    }

    #[inline]
    pub fn time(&self) -> Option<i64> {
        self.time
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn set_size(&mut self, size: u64) {
        self.size = size;
    }

    pub fn set_action(&mut self, action: EntryAction) {
        self.action = action;
    }

    pub fn set_time(&mut self, time: Option<i64>) {
        self.time = time;
    }

    /// Merge an update onto this entry: size and time only.
    pub fn set_details(&mut self, other: &Entry) {
        self.size = other.size;
        self.time = other.time;
    }

    #[inline]
    pub fn equal_id(&self, id: &str) -> bool {
        self.id == id
    }

    /// Compare field by field, reporting the first difference.
    pub fn assert_equal(&self, rhs: &Entry) -> Result<()> {
        if self.id != rhs.id {
            return Err(BookError::mismatch(format!(
                "entry id not equal ({} != {})",
                self.id, rhs.id
            )));
        }
        if self.size != rhs.size {
            return Err(BookError::mismatch(format!(
                "entry size not equal ({} != {}) for entry {}",
                self.size, rhs.size, self.id
            )));
        }
        if self.action != rhs.action {
            return Err(BookError::mismatch(format!(
                "entry action not equal ({} != {}) for entry {}",
                self.action.to_char(),
                rhs.action.to_char(),
                self.id
            )));
        }
        if self.time != rhs.time {
            return Err(BookError::mismatch(format!(
                "entry time not equal ({:?} != {:?}) for entry {}",
                self.time, rhs.time, self.id
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id={} size={} action={} time=",
            self.id,
            self.size,
            self.action.to_char()
        )?;
        match self.time {
            Some(t) => write!(f, "{t}"),
            None => f.write_str("null"),
        }
    }
}
