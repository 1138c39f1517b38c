//! Byte form for records handed across a screen or process boundary.
//!
//! Fields are written in declaration order. Strings are a little-endian
//! `i32` byte length followed by UTF-8 bytes; a length of `-1` with no
//! payload marks an absent string.

use crate::error::ParcelError;

const ABSENT: i32 = -1;

/// Sequential write/read buffer.
#[derive(Debug, Clone, Default)]
pub struct Parcel {
    data: Vec<u8>,
    pos: usize,
}

impl Parcel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap bytes for reading from the start.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            pos: 0,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn write_i32(&mut self, value: i32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub fn read_i32(&mut self) -> Result<i32, ParcelError> {
        let bytes = self.take(4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(bytes);
        Ok(i32::from_le_bytes(buf))
    }

    /// Fails for strings longer than `i32::MAX` bytes; nothing is written
    /// then.
    pub fn write_string(&mut self, value: Option<&str>) -> Result<(), ParcelError> {
        match value {
            Some(s) => {
                self.write_i32(string_len(s.len())?);
                self.data.extend_from_slice(s.as_bytes());
            }
            None => self.write_i32(ABSENT),
        }
        Ok(())
    }

    pub fn read_string(&mut self) -> Result<Option<String>, ParcelError> {
        let len = self.read_i32()?;
        if len == ABSENT {
            return Ok(None);
        }
        if len < 0 {
            return Err(ParcelError::InvalidLength(len));
        }
        let bytes = self.take(len as usize)?;
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| ParcelError::InvalidUtf8)
    }

    fn take(&mut self, needed: usize) -> Result<&[u8], ParcelError> {
        let available = self.remaining();
        if needed > available {
            return Err(ParcelError::Truncated {
                offset: self.pos,
                needed,
                available,
            });
        }
        let start = self.pos;
        self.pos += needed;
        Ok(&self.data[start..self.pos])
    }
}

fn string_len(len: usize) -> Result<i32, ParcelError> {
    i32::try_from(len).map_err(|_| ParcelError::TooLong(len))
}

/// A record that can be flattened into a [`Parcel`].
pub trait Parcelable: Sized {
    fn write_to_parcel(&self, parcel: &mut Parcel) -> Result<(), ParcelError>;

    fn read_from_parcel(parcel: &mut Parcel) -> Result<Self, ParcelError>;

    fn to_bytes(&self) -> Result<Vec<u8>, ParcelError> {
        let mut parcel = Parcel::new();
        self.write_to_parcel(&mut parcel)?;
        Ok(parcel.into_bytes())
    }

    fn from_bytes(data: &[u8]) -> Result<Self, ParcelError> {
        Self::read_from_parcel(&mut Parcel::from_bytes(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_string_is_not_empty() {
        let mut parcel = Parcel::new();
        parcel.write_string(None).unwrap();
        parcel.write_string(Some("")).unwrap();
        let bytes = parcel.into_bytes();
        assert_eq!(bytes, [0xff, 0xff, 0xff, 0xff, 0, 0, 0, 0]);

        let mut parcel = Parcel::from_bytes(bytes);
        assert_eq!(parcel.read_string().unwrap(), None);
        assert_eq!(parcel.read_string().unwrap(), Some(String::new()));
        assert_eq!(parcel.remaining(), 0);
    }

    #[test]
    fn strings_keep_field_order() {
        let mut parcel = Parcel::new();
        parcel.write_string(Some("Grüße")).unwrap();
        parcel.write_i32(7);
        let mut parcel = Parcel::from_bytes(parcel.into_bytes());
        assert_eq!(parcel.read_string().unwrap().as_deref(), Some("Grüße"));
        assert_eq!(parcel.read_i32().unwrap(), 7);
    }

    #[test]
    fn string_length_must_fit() {
        let limit = i32::MAX as usize;
        assert_eq!(string_len(limit), Ok(i32::MAX));
        assert_eq!(string_len(limit + 1), Err(ParcelError::TooLong(limit + 1)));
        assert_eq!(string_len(0), Ok(0));
    }

    #[test]
    fn truncated_input() {
        let mut parcel = Parcel::from_bytes(vec![5, 0, 0, 0, b'a', b'b']);
        assert_eq!(
            parcel.read_string(),
            Err(ParcelError::Truncated {
                offset: 4,
                needed: 5,
                available: 2
            })
        );

        let mut parcel = Parcel::from_bytes(vec![1, 0]);
        assert!(matches!(
            parcel.read_i32(),
            Err(ParcelError::Truncated { .. })
        ));
    }

    #[test]
    fn rejects_bad_length_and_utf8() {
        let mut parcel = Parcel::from_bytes((-2i32).to_le_bytes().to_vec());
        assert_eq!(parcel.read_string(), Err(ParcelError::InvalidLength(-2)));

        let mut parcel = Parcel::from_bytes(vec![2, 0, 0, 0, 0xc3, 0x28]);
        assert_eq!(parcel.read_string(), Err(ParcelError::InvalidUtf8));
    }
}
