// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Timestamp patterns
//!
//! A pattern is a format plus the number of spaces in the message before the
//! timestamp starts. Supported specifiers:
//!
//! - `%Y` 4-digit year, `%m` 2-digit month, `%d` 2-digit day
//! - `%H` `%M` `%S` 2-digit hour, minute and second
//! - `%3` 3-digit milliseconds
//! - `%b` abbreviated English month name
//! - `%%` a literal `%`
//!
//! Timestamps are epoch milliseconds in UTC.

use crate::{
    coding::{Decode, DecodeError, Encode, EncodeError},
    Error,
};
use chrono::{DateTime, Datelike, NaiveDate, Timelike};
use std::io::{Read, Write};

/// Epoch milliseconds
pub type Timestamp = i64;

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Timestamp format and position inside a message
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TimestampPattern {
    num_spaces_before_ts: u8,
    format: String,
}

#[derive(Default)]
struct Fields {
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
    second: u32,
    millis: u32,
}

fn take_digits(text: &str, n: usize) -> Option<(u32, &str)> {
    let digits = text.get(..n)?;

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((digits.parse().ok()?, text.get(n..)?))
}

/// Byte offset after the `n`-th space, or 0 if `n` is 0.
fn offset_after_spaces(text: &str, n: u8) -> Option<usize> {
    if n == 0 {
        return Some(0);
    }

    text.match_indices(' ')
        .nth(usize::from(n) - 1)
        .map(|(ix, _)| ix + 1)
}

impl TimestampPattern {
    /// Creates a pattern.
    #[must_use]
    pub fn new<S: Into<String>>(num_spaces_before_ts: u8, format: S) -> Self {
        Self {
            num_spaces_before_ts,
            format: format.into(),
        }
    }

    /// Format string
    #[must_use]
    pub fn format(&self) -> &str {
        &self.format
    }

    /// Number of spaces in the message before the timestamp
    #[must_use]
    pub fn num_spaces_before_ts(&self) -> u8 {
        self.num_spaces_before_ts
    }

    /// Built-in patterns, longest first.
    #[must_use]
    pub fn known_patterns() -> &'static [(u8, &'static str)] {
        &[
            (0, "%Y-%m-%d %H:%M:%S,%3"),
            (0, "%Y-%m-%d %H:%M:%S.%3"),
            (0, "%Y-%m-%dT%H:%M:%S.%3"),
            (0, "[%Y-%m-%d %H:%M:%S,%3]"),
            (0, "[%Y-%m-%d %H:%M:%S]"),
            (0, "%Y-%m-%d %H:%M:%S"),
            (0, "%Y-%m-%dT%H:%M:%S"),
            (0, "%Y/%m/%d %H:%M:%S"),
            (0, "%d %b %Y %H:%M:%S,%3"),
            (0, "%d %b %Y %H:%M:%S"),
            (1, "%Y-%m-%d %H:%M:%S,%3"),
            (1, "%Y-%m-%d %H:%M:%S"),
            (0, "%Y-%m-%d"),
        ]
    }

    /// Finds the first built-in pattern that matches the start of `line`.
    ///
    /// Returns the pattern, the timestamp, and the byte range of the timestamp text.
    #[must_use]
    pub fn search_known(line: &str) -> Option<(Self, Timestamp, std::ops::Range<usize>)> {
        Self::known_patterns().iter().find_map(|(spaces, format)| {
            let pattern = Self::new(*spaces, *format);
            pattern
                .parse(line)
                .map(|(ts, range)| (pattern, ts, range))
        })
    }

    fn parse_fields(&self, mut text: &str) -> Option<(Fields, usize)> {
        let start_len = text.len();
        let mut fields = Fields::default();
        let mut format = self.format.chars();

        while let Some(c) = format.next() {
            if c != '%' {
                text = text.strip_prefix(c)?;
                continue;
            }

            match format.next()? {
                'Y' => {
                    let (v, rest) = take_digits(text, 4)?;
                    fields.year = i32::try_from(v).ok()?;
                    text = rest;
                }
                'm' => (fields.month, text) = take_digits(text, 2)?,
                'd' => (fields.day, text) = take_digits(text, 2)?,
                'H' => (fields.hour, text) = take_digits(text, 2)?,
                'M' => (fields.minute, text) = take_digits(text, 2)?,
                'S' => (fields.second, text) = take_digits(text, 2)?,
                '3' => (fields.millis, text) = take_digits(text, 3)?,
                'b' => {
                    let name = text.get(..3)?;
                    let month = MONTHS.iter().position(|m| *m == name)?;
                    fields.month = u32::try_from(month).ok()? + 1;
                    text = text.get(3..)?;
                }
                '%' => text = text.strip_prefix('%')?,
                _ => return None,
            }
        }

        Some((fields, start_len - text.len()))
    }

    /// Parses a timestamp at the pattern's position in `line`.
    ///
    /// Returns the timestamp and the byte range of the timestamp text. Only
    /// succeeds if formatting the timestamp reproduces the text exactly.
    #[must_use]
    pub fn parse(&self, line: &str) -> Option<(Timestamp, std::ops::Range<usize>)> {
        let begin = offset_after_spaces(line, self.num_spaces_before_ts)?;
        let (fields, len) = self.parse_fields(line.get(begin..)?)?;

        let month = if fields.month == 0 { 1 } else { fields.month };
        let day = if fields.day == 0 { 1 } else { fields.day };

        let ts = NaiveDate::from_ymd_opt(fields.year, month, day)?
            .and_hms_milli_opt(fields.hour, fields.minute, fields.second, fields.millis)?
            .and_utc()
            .timestamp_millis();

        let range = begin..begin + len;

        // NOTE: Rejects text that doesn't survive formatting (e.g. day 00)
        let mut formatted = String::with_capacity(len);
        self.format_into(ts, &mut formatted).ok()?;

        if Some(formatted.as_str()) == line.get(range.clone()) {
            Some((ts, range))
        } else {
            None
        }
    }

    /// Appends the formatted timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the timestamp is out of range or the format is invalid.
    pub fn format_into(&self, ts: Timestamp, out: &mut String) -> crate::Result<()> {
        use std::fmt::Write;

        let dt = DateTime::from_timestamp_millis(ts)
            .ok_or_else(|| Error::Corrupt(format!("timestamp {ts} is out of range")))?
            .naive_utc();

        let mut format = self.format.chars();

        // NOTE: Writing into a String can't fail
        while let Some(c) = format.next() {
            if c != '%' {
                out.push(c);
                continue;
            }

            match format.next() {
                Some('Y') => {
                    let _ = write!(out, "{:04}", dt.year());
                }
                Some('m') => {
                    let _ = write!(out, "{:02}", dt.month());
                }
                Some('d') => {
                    let _ = write!(out, "{:02}", dt.day());
                }
                Some('H') => {
                    let _ = write!(out, "{:02}", dt.hour());
                }
                Some('M') => {
                    let _ = write!(out, "{:02}", dt.minute());
                }
                Some('S') => {
                    let _ = write!(out, "{:02}", dt.second());
                }
                Some('3') => {
                    let _ = write!(out, "{:03}", dt.nanosecond() / 1_000_000);
                }
                Some('b') => {
                    let name = usize::try_from(dt.month0())
                        .ok()
                        .and_then(|ix| MONTHS.get(ix))
                        .ok_or_else(|| Error::Corrupt("month out of range".into()))?;
                    out.push_str(name);
                }
                Some('%') => out.push('%'),
                other => {
                    return Err(Error::Corrupt(format!(
                        "invalid timestamp specifier {other:?} in {:?}",
                        self.format
                    )))
                }
            }
        }

        Ok(())
    }

    /// Inserts the formatted timestamp into a message that had it removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if the message has fewer spaces than the pattern expects.
    pub fn insert_formatted(&self, ts: Timestamp, message: &str, out: &mut String) -> crate::Result<()> {
        let pos = offset_after_spaces(message, self.num_spaces_before_ts).ok_or_else(|| {
            Error::Corrupt(format!(
                "message has fewer than {} spaces for its timestamp",
                self.num_spaces_before_ts
            ))
        })?;

        let (head, tail) = message.split_at(pos);
        out.push_str(head);
        self.format_into(ts, out)?;
        out.push_str(tail);

        Ok(())
    }
}

impl std::fmt::Display for TimestampPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.num_spaces_before_ts, self.format)
    }
}

/// Ordered timestamp pattern changes of a file, keyed by message index
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TimestampPatternChanges(pub Vec<(u64, TimestampPattern)>);

impl TimestampPatternChanges {
    /// Serializes as `msg_num:spaces:format\n` records.
    #[must_use]
    pub fn to_records(&self) -> String {
        self.0
            .iter()
            .map(|(msg_num, pattern)| format!("{msg_num}:{pattern}\n"))
            .collect()
    }

    /// Parses `msg_num:spaces:format\n` records.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Corrupt`] if a record is malformed.
    pub fn from_records(records: &str) -> crate::Result<Self> {
        let mut changes = Vec::new();

        for record in records.split_terminator('\n') {
            let mut fields = record.splitn(3, ':');

            let (Some(msg_num), Some(spaces), Some(format)) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Corrupt(format!("invalid timestamp pattern record {record:?}")));
            };

            let msg_num = msg_num
                .parse()
                .map_err(|_| Error::Corrupt(format!("invalid message number in {record:?}")))?;
            let spaces = spaces
                .parse()
                .map_err(|_| Error::Corrupt(format!("invalid space count in {record:?}")))?;

            changes.push((msg_num, TimestampPattern::new(spaces, format)));
        }

        Ok(Self(changes))
    }

    /// Returns `true` if no pattern was ever set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Encode for TimestampPatternChanges {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        crate::coding::write_str(writer, &self.to_records())
    }
}

impl Decode for TimestampPatternChanges {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let records = crate::coding::read_str(reader, "TimestampPatternChanges")?;
        Self::from_records(&records).map_err(|_| DecodeError::InvalidHeader("TimestampPatternChanges"))
    }
}

/// Forward-only cursor over [`TimestampPatternChanges`]
#[derive(Debug, Default)]
pub(crate) struct PatternCursor {
    next: usize,
}

impl PatternCursor {
    pub(crate) fn reset(&mut self) {
        self.next = 0;
    }

    /// Returns the pattern active at `message_ix`.
    ///
    /// Message indices must not decrease between calls without a reset.
    pub(crate) fn active<'a>(
        &mut self,
        changes: &'a TimestampPatternChanges,
        message_ix: u64,
    ) -> Option<&'a TimestampPattern> {
        while changes
            .0
            .get(self.next)
            .is_some_and(|(msg_num, _)| *msg_num <= message_ix)
        {
            self.next += 1;
        }

        self.next
            .checked_sub(1)
            .and_then(|ix| changes.0.get(ix))
            .map(|(_, pattern)| pattern)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn timestamp_parse_date() {
        let (pattern, ts, range) =
            TimestampPattern::search_known("2023-01-01 ERROR code=42\n").expect("should parse");
        assert_eq!("%Y-%m-%d", pattern.format());
        assert_eq!(1_672_531_200_000, ts);
        assert_eq!(0..10, range);
    }

    #[test]
    fn timestamp_parse_longest_first() {
        let line = "2024-02-29 13:37:00,123 INFO ready";
        let (pattern, ts, range) = TimestampPattern::search_known(line).expect("should parse");
        assert_eq!("%Y-%m-%d %H:%M:%S,%3", pattern.format());
        assert_eq!(0..23, range);

        let mut out = String::new();
        pattern.format_into(ts, &mut out).expect("should format");
        assert_eq!("2024-02-29 13:37:00,123", out);
    }

    #[test]
    fn timestamp_parse_after_spaces() {
        let pattern = TimestampPattern::new(1, "%Y-%m-%d %H:%M:%S");
        let line = "INFO 2020-05-06 07:08:09 up";
        let (ts, range) = pattern.parse(line).expect("should parse");
        assert_eq!(5..24, range);

        let stripped = format!("{}{}", &line[..range.start], &line[range.end..]);
        assert_eq!("INFO  up", stripped);

        let mut out = String::new();
        pattern
            .insert_formatted(ts, &stripped, &mut out)
            .expect("should format");
        assert_eq!(line, out);
    }

    #[test]
    fn timestamp_month_name() {
        let pattern = TimestampPattern::new(0, "%d %b %Y %H:%M:%S");
        assert!(pattern.parse("07 Mar 2021 10:00:00 x").is_some());
        assert!(pattern.parse("07 Mrz 2021 10:00:00 x").is_none());
    }

    #[test]
    fn timestamp_rejects_invalid() {
        assert!(TimestampPattern::search_known("2023-13-01 nope").is_none());
        assert!(TimestampPattern::search_known("2023-02-30 nope").is_none());
        assert!(TimestampPattern::search_known("no timestamp here").is_none());
        assert!(TimestampPattern::search_known("").is_none());
    }

    #[test]
    fn timestamp_records() -> crate::Result<()> {
        let changes = TimestampPatternChanges(vec![
            (0, TimestampPattern::new(0, "%Y-%m-%d %H:%M:%S")),
            (17, TimestampPattern::new(2, "%H:%M:%S")),
        ]);

        let records = changes.to_records();
        assert_eq!("0:0:%Y-%m-%d %H:%M:%S\n17:2:%H:%M:%S\n", records);
        assert_eq!(changes, TimestampPatternChanges::from_records(&records)?);

        assert!(TimestampPatternChanges::from_records("x:0:%Y\n").is_err());
        assert!(TimestampPatternChanges::from_records("5:0\n").is_err());
        Ok(())
    }

    #[test]
    fn timestamp_cursor() {
        let changes = TimestampPatternChanges(vec![
            (2, TimestampPattern::new(0, "a")),
            (5, TimestampPattern::new(0, "b")),
        ]);
        let mut cursor = PatternCursor::default();

        assert!(cursor.active(&changes, 0).is_none());
        assert_eq!(Some("a"), cursor.active(&changes, 2).map(TimestampPattern::format));
        assert_eq!(Some("a"), cursor.active(&changes, 4).map(TimestampPattern::format));
        assert_eq!(Some("b"), cursor.active(&changes, 9).map(TimestampPattern::format));

        cursor.reset();
        assert!(cursor.active(&changes, 1).is_none());
    }
}
