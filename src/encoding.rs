// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-width encoding of integer and float variables
//!
//! Float layout, from the most significant bit:
//!
//! | width  | sign | unused | digits | num_digits - 1 | decimal_pos - 1 |
//! |--------|------|--------|--------|----------------|-----------------|
//! | 8 byte | 1    | 1      | 54     | 4              | 4               |
//! | 4 byte | 1    | 0      | 25     | 3              | 3               |
//!
//! `decimal_pos` is the number of digits after the decimal point.

use crate::{id::VariableId, Error};
use std::fmt::{Debug, Display};

/// Fixed-width integer holding one encoded variable
///
/// The logtype placeholder at the variable's position determines whether
/// the value is an integer, a float or a variable dictionary id.
pub trait EncodedVariable:
    Copy + Default + Eq + Ord + std::hash::Hash + Debug + Display + Send + Sync + 'static
{
    /// Width in bytes
    const SIZE: usize;

    /// Maximum number of digits of a directly encodable float
    const FLOAT_MAX_DIGITS: u32;

    #[doc(hidden)]
    const FLOAT_DIGITS_BITS: u32;

    #[doc(hidden)]
    const FLOAT_COUNT_BITS: u32;

    /// Reinterprets the lower [`Self::SIZE`] bytes of `bits`.
    fn from_bits(bits: u64) -> Self;

    /// Zero-extended bit pattern.
    fn to_bits(self) -> u64;

    /// Parses a canonical decimal integer, returns `None` on overflow.
    fn parse_decimal(digits: &str) -> Option<Self>;

    /// Widens the value.
    fn to_i64(self) -> i64;
}

impl EncodedVariable for i64 {
    const SIZE: usize = 8;
    const FLOAT_MAX_DIGITS: u32 = 16;
    const FLOAT_DIGITS_BITS: u32 = 54;
    const FLOAT_COUNT_BITS: u32 = 4;

    #[allow(clippy::cast_possible_wrap)]
    fn from_bits(bits: u64) -> Self {
        bits as Self
    }

    #[allow(clippy::cast_sign_loss)]
    fn to_bits(self) -> u64 {
        self as u64
    }

    fn parse_decimal(digits: &str) -> Option<Self> {
        digits.parse().ok()
    }

    fn to_i64(self) -> i64 {
        self
    }
}

impl EncodedVariable for i32 {
    const SIZE: usize = 4;
    const FLOAT_MAX_DIGITS: u32 = 8;
    const FLOAT_DIGITS_BITS: u32 = 25;
    const FLOAT_COUNT_BITS: u32 = 3;

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn from_bits(bits: u64) -> Self {
        bits as u32 as Self
    }

    #[allow(clippy::cast_sign_loss)]
    fn to_bits(self) -> u64 {
        u64::from(self as u32)
    }

    fn parse_decimal(digits: &str) -> Option<Self> {
        digits.parse().ok()
    }

    fn to_i64(self) -> i64 {
        i64::from(self)
    }
}

fn is_canonical_integer(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    // "-0" and "007" would not survive re-formatting
    if digits.starts_with('0') {
        return digits.len() == 1 && !s.starts_with('-');
    }

    true
}

/// Encodes `s` as an integer variable, if it re-formats to exactly `s`.
#[must_use]
pub fn encode_integer<E: EncodedVariable>(s: &str) -> Option<E> {
    if !is_canonical_integer(s) {
        return None;
    }
    E::parse_decimal(s)
}

/// Appends the text of an integer variable.
pub fn decode_integer<E: EncodedVariable>(value: E, out: &mut String) {
    use std::fmt::Write;

    // NOTE: Writing into a String can't fail
    let _ = write!(out, "{value}");
}

/// Encodes `s` as a float variable, if it fits the digit and bit budget.
///
/// Accepted: optional `-`, digits with exactly one `.` that is not the last
/// character. Leading zeros are kept by recording the digit count.
#[must_use]
pub fn encode_float<E: EncodedVariable>(s: &str) -> Option<E> {
    let (is_negative, body) = match s.strip_prefix('-') {
        Some(body) => (true, body),
        None => (false, s),
    };

    let (int_part, frac_part) = body.split_once('.')?;

    if frac_part.is_empty()
        || frac_part.contains('.')
        || !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let num_digits = u32::try_from(int_part.len() + frac_part.len()).ok()?;
    let decimal_pos = u32::try_from(frac_part.len()).ok()?;

    if num_digits > E::FLOAT_MAX_DIGITS {
        return None;
    }

    let mut digits: u64 = 0;
    for b in int_part.bytes().chain(frac_part.bytes()) {
        digits = digits * 10 + u64::from(b - b'0');
    }

    if digits >= (1 << E::FLOAT_DIGITS_BITS) {
        return None;
    }

    let count_bits = E::FLOAT_COUNT_BITS;
    let sign_shift = (E::SIZE as u32) * 8 - 1;

    let mut bits = u64::from(is_negative) << sign_shift;
    bits |= digits << (2 * count_bits);
    bits |= u64::from(num_digits - 1) << count_bits;
    bits |= u64::from(decimal_pos - 1);

    Some(E::from_bits(bits))
}

/// Appends the text of a float variable.
///
/// # Errors
///
/// Returns [`Error::Corrupt`] if the bit fields are inconsistent.
pub fn decode_float<E: EncodedVariable>(value: E, out: &mut String) -> crate::Result<()> {
    let bits = value.to_bits();

    let count_bits = E::FLOAT_COUNT_BITS;
    let count_mask = (1 << count_bits) - 1;
    let sign_shift = (E::SIZE as u32) * 8 - 1;

    let is_negative = (bits >> sign_shift) & 1 == 1;
    let digits = (bits >> (2 * count_bits)) & ((1 << E::FLOAT_DIGITS_BITS) - 1);

    #[allow(clippy::cast_possible_truncation)]
    let num_digits = ((bits >> count_bits) & count_mask) as usize + 1;

    #[allow(clippy::cast_possible_truncation)]
    let decimal_pos = (bits & count_mask) as usize + 1;

    let digits = format!("{digits:0num_digits$}");

    if decimal_pos > num_digits || digits.len() != num_digits {
        return Err(Error::Corrupt(format!("float variable {value} has invalid fields")));
    }

    let (int_part, frac_part) = digits.split_at(num_digits - decimal_pos);

    if is_negative {
        out.push('-');
    }
    out.push_str(int_part);
    out.push('.');
    out.push_str(frac_part);

    Ok(())
}

/// Wraps a variable dictionary id.
///
/// # Errors
///
/// Returns [`Error::IdSpaceExhausted`] if the id does not fit the width.
pub fn encode_dictionary_id<E: EncodedVariable>(id: VariableId) -> crate::Result<E> {
    let max_id = max_dictionary_id::<E>();

    if id > max_id {
        return Err(Error::IdSpaceExhausted {
            dictionary: "variable",
            max_id,
        });
    }
    Ok(E::from_bits(id))
}

/// Unwraps a variable dictionary id.
pub fn decode_dictionary_id<E: EncodedVariable>(value: E) -> VariableId {
    value.to_bits()
}

/// Largest dictionary id that can be stored in `E` without touching the sign bit.
#[must_use]
pub fn max_dictionary_id<E: EncodedVariable>() -> VariableId {
    (1 << ((E::SIZE as u32) * 8 - 1)) - 1
}

/// Returns `true` if every byte could be part of an integer variable.
pub(crate) fn could_be_integer(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || b == b'-')
}

/// Returns `true` if every byte could be part of a float variable.
pub(crate) fn could_be_float(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || b == b'-' || b == b'.')
}
