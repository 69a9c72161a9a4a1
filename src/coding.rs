// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};
use uuid::Uuid;

/// Error during serialization
#[derive(Debug)]
pub enum EncodeError {
    /// I/O error
    Io(std::io::Error),

    /// A length does not fit its on-disk width
    TooLong(&'static str),
}

/// Error during deserialization
#[derive(Debug)]
pub enum DecodeError {
    /// I/O error
    Io(std::io::Error),

    /// Invalid enum tag
    InvalidTag((&'static str, u8)),

    /// Invalid checksum trailer
    InvalidTrailer,

    /// Invalid block header
    InvalidHeader(&'static str),

    /// String is not valid UTF-8
    Utf8(&'static str),
}

impl From<std::io::Error> for EncodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<std::io::Error> for DecodeError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Trait to serialize stuff
pub trait Encode {
    /// Serializes into writer.
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError>;

    /// Serializes into vector.
    fn encode_into_vec(&self) -> Result<Vec<u8>, EncodeError> {
        let mut v = vec![];
        self.encode_into(&mut v)?;
        Ok(v)
    }
}

/// Trait to deserialize stuff
pub trait Decode {
    /// Deserializes from reader.
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

pub(crate) fn write_str<W: Write>(writer: &mut W, s: &str) -> Result<(), EncodeError> {
    let len = u32::try_from(s.len()).map_err(|_| EncodeError::TooLong("string"))?;
    writer.write_u32::<BigEndian>(len)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

pub(crate) fn read_str<R: Read>(reader: &mut R, what: &'static str) -> Result<String, DecodeError> {
    let len = reader.read_u32::<BigEndian>()?;

    // NOTE: Don't trust the length for preallocation
    let mut bytes = Vec::with_capacity(len.min(4_096) as usize);
    reader.by_ref().take(u64::from(len)).read_to_end(&mut bytes)?;

    if bytes.len() != len as usize {
        return Err(DecodeError::Io(std::io::ErrorKind::UnexpectedEof.into()));
    }

    String::from_utf8(bytes).map_err(|_| DecodeError::Utf8(what))
}

pub(crate) fn write_uuid<W: Write>(writer: &mut W, id: &Uuid) -> Result<(), EncodeError> {
    writer.write_all(id.as_bytes())?;
    Ok(())
}

pub(crate) fn read_uuid<R: Read>(reader: &mut R) -> Result<Uuid, DecodeError> {
    let mut bytes = [0; 16];
    reader.read_exact(&mut bytes)?;
    Ok(Uuid::from_bytes(bytes))
}

pub(crate) fn write_bool<W: Write>(writer: &mut W, b: bool) -> Result<(), EncodeError> {
    writer.write_u8(u8::from(b))?;
    Ok(())
}

pub(crate) fn read_bool<R: Read>(reader: &mut R, what: &'static str) -> Result<bool, DecodeError> {
    match reader.read_u8()? {
        0 => Ok(false),
        1 => Ok(true),
        tag => Err(DecodeError::InvalidTag((what, tag))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn str_round_trip() -> crate::Result<()> {
        let mut buf = vec![];
        write_str(&mut buf, "hello wörld")?;
        assert_eq!(4 + "hello wörld".len(), buf.len());

        let s = read_str(&mut &buf[..], "test")?;
        assert_eq!("hello wörld", s);
        Ok(())
    }

    #[test]
    fn str_truncated() {
        let mut buf = u32::MAX.to_be_bytes().to_vec();
        buf.extend_from_slice(b"short");

        match read_str(&mut &buf[..], "test") {
            Err(DecodeError::Io(e)) => assert_eq!(std::io::ErrorKind::UnexpectedEof, e.kind()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn bool_invalid_tag() {
        let err = read_bool(&mut &[7u8][..], "flag");
        assert!(matches!(err, Err(DecodeError::InvalidTag(("flag", 7)))));
    }
}
