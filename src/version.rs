// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use byteorder::WriteBytesExt;

/// Archive format version
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Version {
    /// Version for 0.x releases
    V1,
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

impl From<Version> for u8 {
    fn from(value: Version) -> Self {
        match value {
            Version::V1 => 1,
        }
    }
}

impl TryFrom<u8> for Version {
    type Error = ();
    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::V1),
            _ => Err(()),
        }
    }
}

const MAGIC_BYTES: [u8; 3] = [b'L', b'G', b'A'];

impl Version {
    /// The only version this crate reads and writes.
    pub const CURRENT: Self = Self::V1;

    pub(crate) const fn len() -> usize {
        MAGIC_BYTES.len() + 1
    }

    /// Parses a file header.
    ///
    /// Returns `Err(None)` if the magic bytes don't match at all, and
    /// `Err(Some(byte))` if the magic matches but the version byte is unknown.
    pub(crate) fn parse_file_header(bytes: &[u8]) -> Result<Self, Option<u8>> {
        let first_three = bytes.get(0..3).ok_or(None)?;

        if first_three == MAGIC_BYTES {
            let version = *bytes.get(3).ok_or(None)?;
            Self::try_from(version).map_err(|()| Some(version))
        } else {
            Err(None)
        }
    }

    pub(crate) fn write_file_header<W: std::io::Write>(
        self,
        writer: &mut W,
    ) -> std::io::Result<usize> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u8(u8::from(self))?;
        Ok(Self::len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    pub fn version_serialize() -> crate::Result<()> {
        let mut bytes = vec![];
        Version::V1.write_file_header(&mut bytes)?;
        assert_eq!(bytes, &[b'L', b'G', b'A', 1]);
        Ok(())
    }

    #[test]
    pub fn version_deserialize_success() {
        let version = Version::parse_file_header(&[b'L', b'G', b'A', 1]);
        assert_eq!(version, Ok(Version::V1));
    }

    #[test]
    pub fn version_deserialize_fail() {
        let version = Version::parse_file_header(&[b'V', b'L', b'G', 1]);
        assert_eq!(version, Err(None));
    }

    #[test]
    pub fn version_deserialize_unknown_version() {
        let version = Version::parse_file_header(&[b'L', b'G', b'A', 9]);
        assert_eq!(version, Err(Some(9)));
    }

    #[test]
    #[allow(clippy::expect_used)]
    pub fn version_len() {
        let mut buf = vec![];
        let size = Version::V1.write_file_header(&mut buf).expect("can't fail");
        assert_eq!(Version::len(), size);
    }
}
