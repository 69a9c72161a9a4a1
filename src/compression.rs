// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::{BufReader, Read, Write};

/// Compression type
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[allow(clippy::module_name_repetitions)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum CompressionType {
    /// No compression
    None,

    /// LZ4 frame compression (speed-optimized)
    #[cfg(feature = "lz4")]
    Lz4,

    /// Zstandard stream compression (space-optimized)
    #[cfg(feature = "zstd")]
    Zstd(i32),
}

impl Default for CompressionType {
    fn default() -> Self {
        #[cfg(feature = "zstd")]
        return Self::Zstd(3);

        #[cfg(all(feature = "lz4", not(feature = "zstd")))]
        return Self::Lz4;

        #[cfg(not(any(feature = "lz4", feature = "zstd")))]
        return Self::None;
    }
}

impl Encode for CompressionType {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        match self {
            Self::None => {
                writer.write_u8(0)?;
            }

            #[cfg(feature = "lz4")]
            Self::Lz4 => {
                writer.write_u8(1)?;
            }

            #[cfg(feature = "zstd")]
            Self::Zstd(level) => {
                writer.write_u8(2)?;

                // NOTE: zstd levels are within [-131072, 22]
                #[allow(clippy::cast_possible_truncation)]
                writer.write_i8((*level).clamp(-128, 127) as i8)?;
            }
        };

        Ok(())
    }
}

impl Decode for CompressionType {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let tag = reader.read_u8()?;

        match tag {
            0 => Ok(Self::None),

            #[cfg(feature = "lz4")]
            1 => Ok(Self::Lz4),

            #[cfg(feature = "zstd")]
            2 => {
                let level = reader.read_i8()?;
                Ok(Self::Zstd(i32::from(level)))
            }

            tag => Err(DecodeError::InvalidTag(("CompressionType", tag))),
        }
    }
}

impl std::fmt::Display for CompressionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::None => "no compression",

                #[cfg(feature = "lz4")]
                Self::Lz4 => "lz4",

                #[cfg(feature = "zstd")]
                Self::Zstd(_) => "zstd",
            }
        )
    }
}

/// Streaming compressor over some writer
///
/// Every byte passed to [`StreamCompressor::write_all`] is counted, so callers
/// can address data by its uncompressed offset in the stream.
pub enum StreamCompressor<W: Write> {
    /// Passthrough
    None(W),

    /// LZ4 frame encoder
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameEncoder<W>),

    /// Zstandard stream encoder
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::write::Encoder<'static, W>),
}

impl<W: Write> StreamCompressor<W> {
    /// Opens a compressor writing into `writer`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the codec fails to initialize.
    pub fn open(compression: CompressionType, writer: W) -> crate::Result<Self> {
        Ok(match compression {
            CompressionType::None => Self::None(writer),

            #[cfg(feature = "lz4")]
            CompressionType::Lz4 => Self::Lz4(lz4_flex::frame::FrameEncoder::new(writer)),

            #[cfg(feature = "zstd")]
            CompressionType::Zstd(level) => Self::Zstd(zstd::stream::write::Encoder::new(
                writer, level,
            )?),
        })
    }

    /// Compresses the given bytes.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn write_all(&mut self, bytes: &[u8]) -> crate::Result<()> {
        match self {
            Self::None(w) => w.write_all(bytes)?,

            #[cfg(feature = "lz4")]
            Self::Lz4(w) => w.write_all(bytes)?,

            #[cfg(feature = "zstd")]
            Self::Zstd(w) => w.write_all(bytes)?,
        }

        Ok(())
    }

    /// Flushes all data written so far, so that a concurrent reader of the
    /// underlying file can decompress it.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn flush(&mut self) -> crate::Result<()> {
        match self {
            Self::None(w) => w.flush()?,

            #[cfg(feature = "lz4")]
            Self::Lz4(w) => w.flush()?,

            #[cfg(feature = "zstd")]
            Self::Zstd(w) => w.flush()?,
        }

        Ok(())
    }

    /// Returns the underlying writer.
    pub fn get_mut(&mut self) -> &mut W {
        match self {
            Self::None(w) => w,

            #[cfg(feature = "lz4")]
            Self::Lz4(w) => w.get_mut(),

            #[cfg(feature = "zstd")]
            Self::Zstd(w) => w.get_mut(),
        }
    }

    /// Ends the compressed stream and returns the underlying writer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if an IO error occurs.
    pub fn close(self) -> crate::Result<W> {
        let mut writer = match self {
            Self::None(w) => w,

            #[cfg(feature = "lz4")]
            Self::Lz4(w) => w
                .finish()
                .map_err(|e| crate::Error::Failure(format!("lz4: {e}")))?,

            #[cfg(feature = "zstd")]
            Self::Zstd(w) => w.finish()?,
        };
        writer.flush()?;
        Ok(writer)
    }
}

/// Streaming decompressor over some reader
pub enum StreamDecompressor<R: Read> {
    /// Passthrough
    None(R),

    /// LZ4 frame decoder
    #[cfg(feature = "lz4")]
    Lz4(lz4_flex::frame::FrameDecoder<R>),

    /// Zstandard stream decoder
    #[cfg(feature = "zstd")]
    Zstd(zstd::stream::read::Decoder<'static, BufReader<R>>),
}

impl<R: Read> StreamDecompressor<R> {
    /// Opens a decompressor reading from `reader`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the codec fails to initialize.
    pub fn open(compression: CompressionType, reader: R) -> crate::Result<Self> {
        Ok(match compression {
            CompressionType::None => Self::None(reader),

            #[cfg(feature = "lz4")]
            CompressionType::Lz4 => Self::Lz4(lz4_flex::frame::FrameDecoder::new(reader)),

            #[cfg(feature = "zstd")]
            CompressionType::Zstd(_) => Self::Zstd(zstd::stream::read::Decoder::new(reader)?),
        })
    }
}

impl<R: Read> Read for StreamDecompressor<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            Self::None(r) => r.read(buf),

            #[cfg(feature = "lz4")]
            Self::Lz4(r) => r.read(buf),

            #[cfg(feature = "zstd")]
            Self::Zstd(r) => r.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn round_trip(compression: CompressionType) -> crate::Result<()> {
        let data = "verycompressable".repeat(1_000);

        let mut compressor = StreamCompressor::open(compression, vec![])?;
        compressor.write_all(data.as_bytes())?;
        compressor.flush()?;
        compressor.write_all(data.as_bytes())?;
        let compressed = compressor.close()?;

        let mut decompressor = StreamDecompressor::open(compression, &compressed[..])?;
        let mut out = vec![];
        decompressor.read_to_end(&mut out)?;

        assert_eq!(data.len() * 2, out.len());
        assert_eq!(data.as_bytes(), &out[..data.len()]);

        Ok(())
    }

    #[test]
    fn compression_none() -> crate::Result<()> {
        round_trip(CompressionType::None)
    }

    #[test]
    #[cfg(feature = "lz4")]
    fn compression_lz4() -> crate::Result<()> {
        round_trip(CompressionType::Lz4)
    }

    #[test]
    #[cfg(feature = "zstd")]
    fn compression_zstd() -> crate::Result<()> {
        round_trip(CompressionType::Zstd(3))
    }

    #[test]
    fn compression_type_tag() -> crate::Result<()> {
        let bytes = CompressionType::default().encode_into_vec()?;
        let decoded = CompressionType::decode_from(&mut &bytes[..])?;
        assert_eq!(CompressionType::default(), decoded);
        Ok(())
    }
}
