//! Encode books into messages.
//!
//! `BookWriter` is the inverse of the listener's payload parsing: it turns
//! a full or delta [`OrderBook`] into a [`Message`] in either layout
//! described in [`crate::fields`]. Publishers use it to send books and the
//! tests use it to build payloads.

use super::entry::Entry;
use super::order_book::OrderBook;
use super::price_level::PriceLevel;
use crate::error::{BookError, Result};
use crate::fields::BookFields;
use crate::message::{Fid, FieldValue, Message};

/// Writes books as messages using a set of field descriptors.
#[derive(Debug, Clone)]
pub struct BookWriter {
    fields: BookFields,
}

fn put(msg: &mut Message, fid: Option<Fid>, value: FieldValue) {
    if let Some(fid) = fid {
        msg.set(fid, value);
    }
}

impl BookWriter {
    pub fn new(fields: BookFields) -> Self {
        Self { fields }
    }

    #[inline]
    pub fn fields(&self) -> &BookFields {
        &self.fields
    }

    /// Write a book in the vector layout if the fields support it,
    /// otherwise in the numbered layout.
    pub fn write(&self, book: &OrderBook) -> Result<Message> {
        if self.fields.has_vector_fields() {
            self.write_vector(book)
        } else {
            self.write_numbered(book)
        }
    }

    /// Vector layout: one sub-message per level, entries in a nested
    /// vector.
    pub fn write_vector(&self, book: &OrderBook) -> Result<Message> {
        let levels_fid = self.fields.price_levels.ok_or_else(|| {
            BookError::data_format("no price level vector field available")
        })?;

        let levels = levels_in_order(book)
            .map(|level| self.vector_level(level))
            .collect::<Result<Vec<_>>>()?;

        let mut msg = self.header(book, levels.len());
        msg.set(levels_fid, FieldValue::VecMsg(levels));
        Ok(msg)
    }

    fn vector_level(&self, level: &PriceLevel) -> Result<Message> {
        let mut msg = self.level_fields(level)?;
        if !level.entries().is_empty() {
            let entries_fid = self.fields.pl_entries.ok_or_else(|| {
                BookError::data_format("no entry vector field available")
            })?;
            let entries = level.entries().iter().map(|e| self.entry_message(e)).collect();
            msg.set(entries_fid, FieldValue::VecMsg(entries));
        }
        Ok(msg)
    }

    /// Numbered layout in a single message.
    pub fn write_numbered(&self, book: &OrderBook) -> Result<Message> {
        let levels: Vec<&PriceLevel> = levels_in_order(book).collect();
        self.numbered_message(book, &levels)
    }

    /// Numbered layout split across several messages of at most
    /// `levels_per_msg` levels each, tagged with message number and total.
    pub fn write_fragments(&self, book: &OrderBook, levels_per_msg: usize) -> Result<Vec<Message>> {
        let levels: Vec<&PriceLevel> = levels_in_order(book).collect();
        let chunks: Vec<&[&PriceLevel]> = if levels.is_empty() {
            vec![&levels[..]]
        } else {
            levels.chunks(levels_per_msg.max(1)).collect()
        };

        let total = chunks.len() as i64;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let mut msg = self.numbered_message(book, chunk)?;
                msg.set(self.fields.msg_num, FieldValue::I64(i as i64 + 1));
                msg.set(self.fields.msg_total, FieldValue::I64(total));
                Ok(msg)
            })
            .collect()
    }

    fn numbered_message(&self, book: &OrderBook, levels: &[&PriceLevel]) -> Result<Message> {
        let mut msg = self.header(book, levels.len());

        if let [level] = levels {
            // A single level is flattened into the message itself.
            self.write_numbered_level(&mut msg, level)?;
            return Ok(msg);
        }

        let level_fids = &self.fields.price_level_fids;
        if levels.len() > level_fids.len() {
            return Err(BookError::data_format(format!(
                "book has {} levels but only {} price level fields",
                levels.len(),
                level_fids.len()
            )));
        }
        for (level, fid) in levels.iter().zip(level_fids) {
            let mut level_msg = Message::new();
            self.write_numbered_level(&mut level_msg, level)?;
            msg.set(*fid, FieldValue::Msg(Box::new(level_msg)));
        }
        Ok(msg)
    }

    fn write_numbered_level(&self, msg: &mut Message, level: &PriceLevel) -> Result<()> {
        for (fid, value) in self.level_fields(level)?.iter() {
            msg.set(*fid, value.clone());
        }

        match level.entries() {
            [] => put(msg, self.fields.pl_num_attach, FieldValue::I64(0)),
            [entry] => {
                put(msg, self.fields.pl_num_attach, FieldValue::I64(0));
                for (fid, value) in self.entry_message(entry).iter() {
                    msg.set(*fid, value.clone());
                }
            }
            entries => {
                let entry_fids = &self.fields.pl_entry_fids;
                if entries.len() > entry_fids.len() {
                    return Err(BookError::data_format(format!(
                        "level {} has {} entries but only {} entry fields",
                        level.price(),
                        entries.len(),
                        entry_fids.len()
                    )));
                }
                put(
                    msg,
                    self.fields.pl_num_attach,
                    FieldValue::I64(entries.len() as i64),
                );
                for (entry, fid) in entries.iter().zip(entry_fids) {
                    msg.set(*fid, FieldValue::Msg(Box::new(self.entry_message(entry))));
                }
            }
        }
        Ok(())
    }

    fn header(&self, book: &OrderBook, num_levels: usize) -> Message {
        let mut msg = Message::new();
        if !book.symbol().is_empty() {
            put(&mut msg, self.fields.symbol, FieldValue::Str(book.symbol().to_string()));
        }
        if let Some(time) = book.book_time() {
            put(&mut msg, self.fields.book_time, FieldValue::Time(time));
        }
        put(&mut msg, self.fields.num_levels, FieldValue::I64(num_levels as i64));
        msg
    }

    fn level_fields(&self, level: &PriceLevel) -> Result<Message> {
        let price_fid = self
            .fields
            .pl_price
            .ok_or_else(|| BookError::data_format("no price level price field available"))?;

        let mut msg = Message::new().with(price_fid, FieldValue::Price(level.price()));
        let f = &self.fields;
        put(&mut msg, f.pl_side, FieldValue::Char(level.side().to_char()));
        put(&mut msg, f.pl_action, FieldValue::Char(level.action().to_char()));
        put(&mut msg, f.pl_size, FieldValue::U64(level.size()));
        put(&mut msg, f.pl_size_change, FieldValue::I64(level.size_change()));
        put(&mut msg, f.pl_num_entries, FieldValue::U64(level.num_entries() as u64));
        if let Some(time) = level.time() {
            put(&mut msg, f.pl_time, FieldValue::Time(time));
        }
        Ok(msg)
    }

    fn entry_message(&self, entry: &Entry) -> Message {
        let f = &self.fields;
        let mut msg = Message::new();
        put(&mut msg, f.entry_id, FieldValue::Str(entry.id().to_string()));
        put(&mut msg, f.entry_size, FieldValue::U64(entry.size()));
        put(&mut msg, f.entry_action, FieldValue::Char(entry.action().to_char()));
        if let Some(time) = entry.time() {
            put(&mut msg, f.entry_time, FieldValue::Time(time));
        }
        msg
    }
}

fn levels_in_order(book: &OrderBook) -> impl Iterator<Item = &PriceLevel> + '_ {
    book.bid_levels().chain(book.ask_levels())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EntryAction, Price, Side};

    fn book() -> OrderBook {
        let mut book = OrderBook::with_symbol("IBM");
        book.add_level(
            PriceLevel::new(Price::from_f64(100.0), Side::Bid)
                .with_size(30)
                .with_num_entries(2)
                .with_entry(Entry::new("1", 10, EntryAction::Add))
                .with_entry(Entry::new("2", 20, EntryAction::Add)),
        );
        book.add_level(PriceLevel::new(Price::from_f64(101.0), Side::Ask).with_size(5));
        book
    }

    #[test]
    fn test_vector_layout() {
        let fields = BookFields::default();
        let msg = BookWriter::new(fields.clone()).write(&book()).unwrap();

        let levels = msg.get_vec_msg(fields.price_levels.unwrap()).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0].get_char(fields.pl_side.unwrap()), Some('B'));
        let entries = levels[0].get_vec_msg(fields.pl_entries.unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(levels[1].get_vec_msg(fields.pl_entries.unwrap()).is_none());
        assert_eq!(msg.get_i64(fields.num_levels.unwrap()), Some(2));
    }

    #[test]
    fn test_numbered_layout() {
        let fields = BookFields::default().without_vector_fields();
        let msg = BookWriter::new(fields.clone()).write(&book()).unwrap();

        let first = msg.get_msg(fields.price_level_fids[0]).unwrap();
        assert_eq!(first.get_i64(fields.pl_num_attach.unwrap()), Some(2));
        assert!(first.get_msg(fields.pl_entry_fids[1]).is_some());
        assert!(msg.get_msg(fields.price_level_fids[1]).is_some());
    }

    #[test]
    fn test_single_level_is_flattened() {
        let fields = BookFields::default().without_vector_fields();
        let mut book = OrderBook::new();
        book.add_level(
            PriceLevel::new(Price::from_f64(5.0), Side::Ask)
                .with_entry(Entry::new("x", 1, EntryAction::Add)),
        );

        let msg = BookWriter::new(fields.clone()).write(&book).unwrap();
        assert!(msg.get_msg(fields.price_level_fids[0]).is_none());
        assert_eq!(msg.get_price(fields.pl_price.unwrap()), Some(Price::from_f64(5.0)));
        assert_eq!(msg.get_str(fields.entry_id.unwrap()), Some("x"));
    }

    #[test]
    fn test_fragments() {
        let fields = BookFields::default().without_vector_fields();
        let msgs = BookWriter::new(fields.clone())
            .write_fragments(&book(), 1)
            .unwrap();

        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].get_i64(fields.msg_num), Some(1));
        assert_eq!(msgs[1].get_i64(fields.msg_num), Some(2));
        assert_eq!(msgs[1].get_i64(fields.msg_total), Some(2));
    }

    #[test]
    fn test_too_many_levels() {
        let mut fields = BookFields::default().without_vector_fields();
        fields.price_level_fids.truncate(1);
        let err = BookWriter::new(fields).write(&book()).unwrap_err();
        assert!(matches!(err, BookError::DataFormat(_)));
    }
}
