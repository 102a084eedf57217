//! Decode price levels and entries from a book message.
//!
//! Two layouts are understood, chosen by what the field descriptors can
//! resolve:
//!
//! - **Vector**: `wPriceLevels` holds one sub-message per level, each with
//!   an optional `wPlEntries` vector of entry sub-messages.
//! - **Numbered**: `wPriceLevel1..N` sub-messages (or the message itself
//!   when there is a single level), each with `wPlEntry1..M` sub-messages
//!   (or the level message itself when there is a single entry). A book
//!   may be spread over several messages tagged with message number and
//!   total.
//!
//! Defaults for absent fields: level size 0, entry count 1, action `Add`,
//! side `Bid`, size change 0, time from the book; entry size 0, action
//! `Delete`, time from the level.

use crate::book::{Entry, PriceLevel};
use crate::error::{BookError, Result};
use crate::fields::BookFields;
use crate::message::{Fid, FieldValue, Message};
use crate::types::{EntryAction, LevelAction, Side};

/// Levels decoded from one message plus its fragment position.
#[derive(Debug, Clone, Default)]
pub(crate) struct ParsedPayload {
    /// Levels in message order
    pub levels: Vec<PriceLevel>,
    pub msg_num: i64,
    pub msg_total: i64,
}

impl ParsedPayload {
    fn whole(levels: Vec<PriceLevel>) -> Self {
        Self {
            levels,
            msg_num: 1,
            msg_total: 1,
        }
    }

    /// First message of a (possibly fragmented) book; the working delta
    /// starts afresh.
    #[inline]
    pub fn is_first_fragment(&self) -> bool {
        self.msg_num == 1
    }

    /// Last message of the book.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.msg_num == self.msg_total
    }
}

/// Decode the levels carried by `msg`.
pub(crate) fn parse_payload(
    fields: &BookFields,
    msg: &Message,
    book_time: Option<i64>,
) -> Result<ParsedPayload> {
    if let Some(levels) = fields.price_levels.and_then(|fid| msg.get_vec_msg(fid)) {
        let levels = levels
            .iter()
            .map(|level_msg| parse_level(fields, level_msg, book_time))
            .collect::<Result<Vec<_>>>()?;
        return Ok(ParsedPayload::whole(levels));
    }
    parse_numbered(fields, msg, book_time)
}

fn parse_numbered(fields: &BookFields, msg: &Message, book_time: Option<i64>) -> Result<ParsedPayload> {
    let msg_num = msg.get_i64(fields.msg_num).unwrap_or(1);
    let msg_total = msg.get_i64(fields.msg_total).unwrap_or(1);

    if fields.price_level_fids.is_empty() {
        return Err(BookError::data_format(
            "data dictionary error: cannot find price level fields",
        ));
    }

    let num_levels = fields
        .num_levels
        .and_then(|fid| msg.get_i64(fid))
        .unwrap_or(1)
        .max(0) as usize;
    let count = num_levels.min(fields.price_level_fids.len());

    let mut levels = Vec::with_capacity(count);
    for fid in &fields.price_level_fids[..count] {
        let level_msg = match msg.get_msg(*fid) {
            Some(level_msg) => level_msg,
            None if num_levels == 1 => msg,
            None => {
                return Err(BookError::data_format(
                    "cannot find price level fields in message",
                ))
            }
        };
        levels.push(parse_level(fields, level_msg, book_time)?);
    }

    Ok(ParsedPayload {
        levels,
        msg_num,
        msg_total,
    })
}

fn parse_level(fields: &BookFields, msg: &Message, book_time: Option<i64>) -> Result<PriceLevel> {
    let price = fields
        .pl_price
        .and_then(|fid| msg.get_price(fid))
        .ok_or_else(|| BookError::data_format("price level has no price"))?;
    let side = char_field(msg, fields.pl_side).map_or(Side::Bid, Side::from_char);

    let mut level = PriceLevel::new(price, side);
    level.set_size(size_field(msg, fields.pl_size));
    level.set_num_entries(
        fields
            .pl_num_entries
            .and_then(|fid| msg.get_u64(fid))
            .map_or(1, |n| n.min(u32::MAX as u64) as u32),
    );
    level.set_action(char_field(msg, fields.pl_action).map_or(LevelAction::Add, LevelAction::from_char));
    level.set_size_change(fields.pl_size_change.and_then(|fid| msg.get_i64(fid)).unwrap_or(0));
    level.set_time(fields.pl_time.and_then(|fid| msg.get_time(fid)).or(book_time));

    let level_time = level.time();
    if let Some(entries) = fields.pl_entries.and_then(|fid| msg.get_vec_msg(fid)) {
        for entry_msg in entries {
            level.push_entry(parse_entry(fields, entry_msg, level_time)?);
        }
        return Ok(level);
    }

    let num_attach = fields
        .pl_num_attach
        .and_then(|fid| msg.get_i64(fid))
        .unwrap_or(0)
        .max(0) as usize;
    if num_attach == 0 {
        // A single entry may be flattened into the level message.
        if fields.entry_id.is_some_and(|fid| msg.contains(fid)) {
            level.push_entry(parse_entry(fields, msg, level_time)?);
        }
        return Ok(level);
    }

    let count = num_attach.min(fields.pl_entry_fids.len());
    for fid in &fields.pl_entry_fids[..count] {
        if let Some(entry_msg) = msg.get_msg(*fid) {
            level.push_entry(parse_entry(fields, entry_msg, level_time)?);
        }
    }
    Ok(level)
}

fn parse_entry(fields: &BookFields, msg: &Message, level_time: Option<i64>) -> Result<Entry> {
    let id = fields
        .entry_id
        .and_then(|fid| msg.get_str(fid))
        .ok_or_else(|| BookError::data_format("entry has no id"))?;
    let size = size_field(msg, fields.entry_size);
    let action = char_field(msg, fields.entry_action).map_or(EntryAction::Delete, EntryAction::from_char);

    let mut entry = Entry::new(id, size, action);
    entry.set_time(fields.entry_time.and_then(|fid| msg.get_time(fid)).or(level_time));
    Ok(entry)
}

/// Sizes are integers on the wire; a floating value is truncated and
/// anything negative or missing reads as zero.
fn size_field(msg: &Message, fid: Option<Fid>) -> u64 {
    let Some(fid) = fid else {
        return 0;
    };
    match msg.get(fid) {
        Some(FieldValue::F64(size)) => size.max(0.0) as u64,
        _ => msg.get_u64(fid).unwrap_or(0),
    }
}

fn char_field(msg: &Message, fid: Option<Fid>) -> Option<char> {
    fid.and_then(|fid| msg.get_char(fid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{BookWriter, OrderBook};
    use crate::message::FieldValue;
    use crate::types::Price;

    fn two_level_book() -> OrderBook {
        let mut book = OrderBook::with_symbol("IBM");
        book.add_level(
            PriceLevel::new(Price::from_f64(99.5), Side::Bid)
                .with_size(300)
                .with_num_entries(2)
                .with_time(10)
                .with_entry(Entry::new("a", 100, EntryAction::Add).with_time(10))
                .with_entry(Entry::new("b", 200, EntryAction::Add).with_time(10)),
        );
        book.add_level(
            PriceLevel::new(Price::from_f64(100.5), Side::Ask)
                .with_size(50)
                .with_num_entries(1)
                .with_time(10)
                .with_entry(Entry::new("c", 50, EntryAction::Add).with_time(10)),
        );
        book
    }

    #[test]
    fn test_vector_layout() {
        let fields = BookFields::default();
        let msg = BookWriter::new(fields.clone()).write(&two_level_book()).unwrap();

        let parsed = parse_payload(&fields, &msg, None).unwrap();
        assert!(parsed.is_first_fragment());
        assert!(parsed.is_complete());
        assert_eq!(parsed.levels.len(), 2);
        assert_eq!(parsed.levels[0].side(), Side::Bid);
        assert_eq!(parsed.levels[0].entries().len(), 2);
        assert_eq!(parsed.levels[1].entries()[0].id(), "c");
    }

    #[test]
    fn test_numbered_layout_matches_vector_layout() {
        let book = two_level_book();
        let vector_fields = BookFields::default();
        let numbered_fields = BookFields::default().without_vector_fields();

        let from_vector = parse_payload(
            &vector_fields,
            &BookWriter::new(vector_fields.clone()).write(&book).unwrap(),
            None,
        )
        .unwrap();
        let from_numbered = parse_payload(
            &numbered_fields,
            &BookWriter::new(numbered_fields.clone()).write(&book).unwrap(),
            None,
        )
        .unwrap();

        assert_eq!(from_vector.levels.len(), from_numbered.levels.len());
        for (v, n) in from_vector.levels.iter().zip(&from_numbered.levels) {
            v.assert_equal(n).unwrap();
        }
    }

    #[test]
    fn test_flattened_single_level_and_entry() {
        let fields = BookFields::default().without_vector_fields();
        let msg = Message::new()
            .with(fields.pl_price.unwrap(), FieldValue::F64(10.25))
            .with(fields.pl_side.unwrap(), FieldValue::Char('A'))
            .with(fields.pl_size.unwrap(), FieldValue::F64(75.0))
            .with(fields.entry_id.unwrap(), FieldValue::Str("x".into()))
            .with(fields.entry_size.unwrap(), FieldValue::U64(75))
            .with(fields.entry_action.unwrap(), FieldValue::Char('A'));

        let parsed = parse_payload(&fields, &msg, Some(5)).unwrap();
        assert_eq!(parsed.levels.len(), 1);
        let level = &parsed.levels[0];
        assert_eq!(level.price(), Price::from_f64(10.25));
        assert_eq!(level.side(), Side::Ask);
        assert_eq!(level.size(), 75);
        assert_eq!(level.time(), Some(5));
        assert_eq!(level.entries().len(), 1);
        assert_eq!(level.entries()[0].time(), Some(5));
    }

    #[test]
    fn test_defaults() {
        let fields = BookFields::default();
        let level_msg = Message::new()
            .with(fields.pl_price.unwrap(), FieldValue::F64(1.0))
            .with(
                fields.pl_entries.unwrap(),
                FieldValue::VecMsg(vec![
                    Message::new().with(fields.entry_id.unwrap(), FieldValue::Str("e".into()))
                ]),
            );
        let msg = Message::new().with(fields.price_levels.unwrap(), FieldValue::VecMsg(vec![level_msg]));

        let parsed = parse_payload(&fields, &msg, None).unwrap();
        let level = &parsed.levels[0];
        assert_eq!(level.side(), Side::Bid);
        assert_eq!(level.action(), LevelAction::Add);
        assert_eq!(level.size(), 0);
        assert_eq!(level.num_entries(), 1);
        assert_eq!(level.entries()[0].action(), EntryAction::Delete);
        assert_eq!(level.entries()[0].size(), 0);
    }

    #[test]
    fn test_large_sizes_keep_precision() {
        let fields = BookFields::default();
        let big = (1u64 << 53) + 1;
        let level_msg = Message::new()
            .with(fields.pl_price.unwrap(), FieldValue::F64(1.0))
            .with(fields.pl_size.unwrap(), FieldValue::U64(big))
            .with(
                fields.pl_entries.unwrap(),
                FieldValue::VecMsg(vec![Message::new()
                    .with(fields.entry_id.unwrap(), FieldValue::Str("e".into()))
                    .with(fields.entry_size.unwrap(), FieldValue::I64(big as i64))]),
            );
        let msg = Message::new().with(fields.price_levels.unwrap(), FieldValue::VecMsg(vec![level_msg]));

        let parsed = parse_payload(&fields, &msg, None).unwrap();
        let level = &parsed.levels[0];
        assert_eq!(level.size(), big);
        assert_eq!(level.entries()[0].size(), big);
    }

    #[test]
    fn test_float_and_negative_sizes() {
        let fields = BookFields::default();
        let size_fid = fields.pl_size.unwrap();
        let level = |size: FieldValue| {
            Message::new()
                .with(fields.pl_price.unwrap(), FieldValue::F64(1.0))
                .with(size_fid, size)
        };
        let msg = Message::new().with(
            fields.price_levels.unwrap(),
            FieldValue::VecMsg(vec![level(FieldValue::F64(12.9)), level(FieldValue::I64(-4))]),
        );

        let parsed = parse_payload(&fields, &msg, None).unwrap();
        assert_eq!(parsed.levels[0].size(), 12);
        assert_eq!(parsed.levels[1].size(), 0);
    }

    #[test]
    fn test_fragments() {
        let fields = BookFields::default().without_vector_fields();
        let msgs = BookWriter::new(fields.clone())
            .write_fragments(&two_level_book(), 1)
            .unwrap();

        let first = parse_payload(&fields, &msgs[0], None).unwrap();
        assert!(first.is_first_fragment());
        assert!(!first.is_complete());

        let last = parse_payload(&fields, &msgs[1], None).unwrap();
        assert!(!last.is_first_fragment());
        assert!(last.is_complete());
    }

    #[test]
    fn test_missing_price_is_data_format_error() {
        let fields = BookFields::default();
        let msg = Message::new().with(
            fields.price_levels.unwrap(),
            FieldValue::VecMsg(vec![Message::new()]),
        );
        let err = parse_payload(&fields, &msg, None).unwrap_err();
        assert!(matches!(err, BookError::DataFormat(_)));
    }

    #[test]
    fn test_missing_level_sub_message() {
        let fields = BookFields::default().without_vector_fields();
        let msg = Message::new().with(fields.num_levels.unwrap(), FieldValue::I64(2));
        let err = parse_payload(&fields, &msg, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            BookError::data_format("cannot find price level fields in message").to_string()
        );
    }

    #[test]
    fn test_no_numbered_fields() {
        let mut fields = BookFields::default().without_vector_fields();
        fields.price_level_fids.clear();
        let err = parse_payload(&fields, &Message::new(), None).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_entry_without_id() {
        let fields = BookFields::default().without_vector_fields();
        let level = Message::new()
            .with(fields.pl_price.unwrap(), FieldValue::F64(1.0))
            .with(fields.pl_num_attach.unwrap(), FieldValue::I64(1))
            .with(fields.pl_entry_fids[0], FieldValue::Msg(Box::default()));
        let err = parse_payload(&fields, &level, None).unwrap_err();
        assert!(matches!(err, BookError::DataFormat(_)));
    }
}
