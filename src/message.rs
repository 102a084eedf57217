//! Self-describing field message.
//!
//! This is the boundary with the transport layer. A transport (or a replay
//! file) hands the listeners a [`Message`]: a flat map of field id to typed
//! value, where a value may itself be a nested message or a vector of
//! nested messages. Which fids mean what is decided by
//! [`BookFields`](crate::fields::BookFields), never by this module.
//!
//! Getters are lenient in the same way a market data API is: numeric
//! values convert between integer and floating representations, and a
//! character field may arrive as its integer code.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::types::Price;

/// Field identifier.
pub type Fid = u16;

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    I64(i64),
    U64(u64),
    F64(f64),
    Char(char),
    Str(String),
    Price(Price),
    /// Nanoseconds since the Unix epoch.
    Time(i64),
    Msg(Box<Message>),
    VecMsg(Vec<Message>),
}

/// A message: fid → value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    fields: AHashMap<Fid, FieldValue>,
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.fields.len() == other.fields.len()
            && self
                .fields
                .iter()
                .all(|(fid, value)| other.fields.get(fid) == Some(value))
    }
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter.
    pub fn with(mut self, fid: Fid, value: FieldValue) -> Self {
        self.fields.insert(fid, value);
        self
    }

    /// Set a field, replacing any previous value.
    pub fn set(&mut self, fid: Fid, value: FieldValue) {
        self.fields.insert(fid, value);
    }

    /// Remove a field.
    pub fn remove(&mut self, fid: Fid) -> Option<FieldValue> {
        self.fields.remove(&fid)
    }

    /// Whether the field is present.
    #[inline]
    pub fn contains(&self, fid: Fid) -> bool {
        self.fields.contains_key(&fid)
    }

    /// Number of top-level fields.
    #[inline]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the message has no fields.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Raw field access.
    #[inline]
    pub fn get(&self, fid: Fid) -> Option<&FieldValue> {
        self.fields.get(&fid)
    }

    /// Iterate over all fields (unordered).
    pub fn iter(&self) -> impl Iterator<Item = (&Fid, &FieldValue)> {
        self.fields.iter()
    }

    pub fn get_i64(&self, fid: Fid) -> Option<i64> {
        match self.get(fid)? {
            FieldValue::I64(v) => Some(*v),
            FieldValue::U64(v) => i64::try_from(*v).ok(),
            FieldValue::F64(v) => Some(*v as i64),
            FieldValue::Char(c) => Some(*c as i64),
            FieldValue::Time(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_u64(&self, fid: Fid) -> Option<u64> {
        match self.get(fid)? {
            FieldValue::U64(v) => Some(*v),
            FieldValue::I64(v) => u64::try_from(*v).ok(),
            FieldValue::F64(v) if *v >= 0.0 => Some(*v as u64),
            _ => None,
        }
    }

    pub fn get_f64(&self, fid: Fid) -> Option<f64> {
        match self.get(fid)? {
            FieldValue::F64(v) => Some(*v),
            FieldValue::I64(v) => Some(*v as f64),
            FieldValue::U64(v) => Some(*v as f64),
            FieldValue::Price(p) => Some(p.as_f64()),
            _ => None,
        }
    }

    pub fn get_char(&self, fid: Fid) -> Option<char> {
        match self.get(fid)? {
            FieldValue::Char(c) => Some(*c),
            FieldValue::I64(v) => u32::try_from(*v).ok().and_then(char::from_u32),
            FieldValue::U64(v) => u32::try_from(*v).ok().and_then(char::from_u32),
            FieldValue::Str(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Some(c),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    pub fn get_str(&self, fid: Fid) -> Option<&str> {
        match self.get(fid)? {
            FieldValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn get_price(&self, fid: Fid) -> Option<Price> {
        match self.get(fid)? {
            FieldValue::Price(p) => Some(*p),
            FieldValue::F64(v) => Some(Price::from_f64(*v)),
            FieldValue::I64(v) => Some(Price::from_f64(*v as f64)),
            _ => None,
        }
    }

    pub fn get_time(&self, fid: Fid) -> Option<i64> {
        match self.get(fid)? {
            FieldValue::Time(t) => Some(*t),
            FieldValue::I64(t) => Some(*t),
            _ => None,
        }
    }

    pub fn get_msg(&self, fid: Fid) -> Option<&Message> {
        match self.get(fid)? {
            FieldValue::Msg(m) => Some(m),
            _ => None,
        }
    }

    pub fn get_vec_msg(&self, fid: Fid) -> Option<&[Message]> {
        match self.get(fid)? {
            FieldValue::VecMsg(v) => Some(v.as_slice()),
            _ => None,
        }
    }
}
