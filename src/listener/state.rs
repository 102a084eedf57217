//! Header state shared by both listener variants.
//!
//! Every book message carries standard header fields: sequence number,
//! sender id, a handful of timestamps and the instrument identity.
//! [`ListenerState`] caches the latest values together with a
//! [`FieldState`] per field, and detects sequence number gaps.

use crate::fields::BookFields;
use crate::message::{Fid, Message};
use crate::subscription::BookSubscription;
use crate::types::FieldState;

/// A missing range of sequence numbers, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BookGap {
    pub begin: i64,
    pub end: i64,
}

impl BookGap {
    /// Number of sequence numbers missed.
    pub fn len(&self) -> i64 {
        self.end
            .saturating_sub(self.begin)
            .saturating_add(1)
            .max(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A gap found while reading standard fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SequenceGap {
    pub gap: BookGap,
    /// Whether the same sender produced the previous message.
    pub same_sender: bool,
}

/// Cached value plus modification state of one header field.
#[derive(Debug, Clone, Default)]
struct Tracked<T> {
    value: T,
    state: FieldState,
}

impl<T> Tracked<T> {
    fn set(&mut self, value: T) {
        self.value = value;
        self.state = FieldState::Modified;
    }

    fn set_from(&mut self, value: Option<T>) {
        if let Some(value) = value {
            self.set(value);
        }
    }
}

/// Latest header values seen by a listener.
#[derive(Debug, Clone, Default)]
pub struct ListenerState {
    seq_num: i64,
    sender_id: u64,
    gap_begin: i64,
    gap_end: i64,

    symbol: Tracked<String>,
    part_id: Tracked<String>,
    src_time: Tracked<Option<i64>>,
    activity_time: Tracked<Option<i64>>,
    line_time: Tracked<Option<i64>>,
    send_time: Tracked<Option<i64>>,
    event_time: Tracked<Option<i64>>,
    event_seq_num: Tracked<i64>,
}

fn time_of(msg: &Message, fid: Option<Fid>) -> Option<Option<i64>> {
    fid.and_then(|fid| msg.get_time(fid)).map(Some)
}

impl ListenerState {
    /// Read the standard fields of `msg`.
    ///
    /// With `check_seq` set, a non-zero sequence number that does not
    /// follow the previous one records a gap `[last + 1, seq - 1]` and is
    /// returned along with whether the sender id matched the previous
    /// message's.
    pub(crate) fn apply_standard_fields(
        &mut self,
        fields: &BookFields,
        sub: &BookSubscription,
        msg: &Message,
        check_seq: bool,
    ) -> Option<SequenceGap> {
        self.age();

        let seq_num = msg.get_i64(fields.seq_num).unwrap_or(0);
        let sender_id = msg.get_u64(fields.sender_id).unwrap_or(0);

        let mut gap = None;
        if check_seq && seq_num != 0 && seq_num.checked_sub(1) != Some(self.seq_num) {
            self.gap_begin = self.seq_num.saturating_add(1);
            self.gap_end = seq_num.saturating_sub(1);
            gap = Some(SequenceGap {
                gap: BookGap {
                    begin: self.gap_begin,
                    end: self.gap_end,
                },
                same_sender: sender_id == self.sender_id,
            });
        }
        self.seq_num = seq_num;
        self.sender_id = sender_id;

        match fields.symbol.and_then(|fid| msg.get_str(fid)) {
            Some(symbol) => self.symbol.set(symbol.to_string()),
            None if self.symbol.value.is_empty() => self.symbol.set(sub.symbol().to_string()),
            None => {}
        }
        match fields.part_id.and_then(|fid| msg.get_str(fid)) {
            Some(part_id) => self.part_id.set(part_id.to_string()),
            None if self.part_id.value.is_empty() => {
                if let Some(part_id) = part_id_from_symbol(&self.symbol.value) {
                    self.part_id.set(part_id.to_string());
                }
            }
            None => {}
        }

        self.src_time.set_from(time_of(msg, fields.src_time));
        self.activity_time.set_from(time_of(msg, fields.activity_time));
        self.line_time.set_from(time_of(msg, fields.line_time));
        self.send_time.set_from(time_of(msg, Some(fields.send_time)));
        self.event_time
            .set_from(time_of(msg, fields.book_time).or_else(|| time_of(msg, fields.src_time)));
        self.event_seq_num
            .set_from(fields.event_seq_num.and_then(|fid| msg.get_i64(fid)));

        gap
    }

    fn age(&mut self) {
        self.symbol.state.age();
        self.part_id.state.age();
        self.src_time.state.age();
        self.activity_time.state.age();
        self.line_time.state.age();
        self.send_time.state.age();
        self.event_time.state.age();
        self.event_seq_num.state.age();
    }

    /// Book time of a message: its book time field, falling back to the
    /// latest source time.
    pub(crate) fn book_time_of(&self, fields: &BookFields, msg: &Message) -> Option<i64> {
        fields
            .book_time
            .and_then(|fid| msg.get_time(fid))
            .or(self.src_time.value)
    }

    /// Sequence number of the latest message (0 if not in use).
    #[inline]
    pub fn seq_num(&self) -> i64 {
        self.seq_num
    }

    /// Sender id of the latest message.
    #[inline]
    pub fn sender_id(&self) -> u64 {
        self.sender_id
    }

    /// First sequence number of the most recent gap.
    #[inline]
    pub fn gap_begin(&self) -> i64 {
        self.gap_begin
    }

    /// Last sequence number of the most recent gap.
    #[inline]
    pub fn gap_end(&self) -> i64 {
        self.gap_end
    }

    pub fn symbol(&self) -> &str {
        &self.symbol.value
    }

    pub fn part_id(&self) -> &str {
        &self.part_id.value
    }

    pub fn src_time(&self) -> Option<i64> {
        self.src_time.value
    }

    pub fn activity_time(&self) -> Option<i64> {
        self.activity_time.value
    }

    pub fn line_time(&self) -> Option<i64> {
        self.line_time.value
    }

    pub fn send_time(&self) -> Option<i64> {
        self.send_time.value
    }

    pub fn event_time(&self) -> Option<i64> {
        self.event_time.value
    }

    pub fn event_seq_num(&self) -> i64 {
        self.event_seq_num.value
    }

    pub fn symbol_field_state(&self) -> FieldState {
        self.symbol.state
    }

    pub fn part_id_field_state(&self) -> FieldState {
        self.part_id.state
    }

    pub fn src_time_field_state(&self) -> FieldState {
        self.src_time.state
    }

    pub fn activity_time_field_state(&self) -> FieldState {
        self.activity_time.state
    }

    pub fn line_time_field_state(&self) -> FieldState {
        self.line_time.state
    }

    pub fn send_time_field_state(&self) -> FieldState {
        self.send_time.state
    }

    pub fn event_time_field_state(&self) -> FieldState {
        self.event_time.state
    }

    pub fn event_seq_num_field_state(&self) -> FieldState {
        self.event_seq_num.state
    }
}

/// Participant id embedded in a symbol such as `IBM.N`.
fn part_id_from_symbol(symbol: &str) -> Option<&str> {
    symbol
        .split_once('.')
        .map(|(_, suffix)| suffix)
        .filter(|suffix| !suffix.is_empty())
}
