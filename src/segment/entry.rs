//! Entry codec
//!
//! Encodes a single key/value pair into one self-contained record.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

use crate::error::{KvError, Result};

/// Size of every length field in a record
pub const LEN_PREFIX_SIZE: usize = 4;

/// Bytes a record adds on top of its key and value: Total + KeyLen + ValLen
pub const ENTRY_OVERHEAD: usize = 3 * LEN_PREFIX_SIZE;

/// A decoded record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Entry {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Bytes this entry occupies on disk
    pub fn encoded_len(&self) -> usize {
        ENTRY_OVERHEAD + self.key.len() + self.value.len()
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        encode(&self.key, &self.value)
    }
}

/// Why a byte slice is not a valid record
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("record is {len} bytes, shorter than the {min}-byte minimum")]
    TooShort { len: usize, min: usize },

    #[error("declared total length {declared} but record has {actual} bytes")]
    TotalMismatch { declared: usize, actual: usize },

    #[error("key length {key_len} overruns the {available} bytes left in the record")]
    KeyOverrun { key_len: usize, available: usize },

    #[error("value length {value_len} does not match the {available} bytes left in the record")]
    ValueMismatch { value_len: usize, available: usize },
}

/// Encode a key/value pair
///
/// Format: total (4) + key_len (4) + key + value_len (4) + value
pub fn encode(key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let total = ENTRY_OVERHEAD + key.len() + value.len();
    let total_field = u32::try_from(total).map_err(|_| {
        KvError::InvalidEntry(format!(
            "record of {} bytes does not fit a u32 length prefix",
            total
        ))
    })?;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_u32_le(total_field);
    // Both fit: each is smaller than `total`
    buf.put_u32_le(key.len() as u32);
    buf.put_slice(key);
    buf.put_u32_le(value.len() as u32);
    buf.put_slice(value);

    Ok(buf.to_vec())
}

/// Decode exactly one record; `bytes` must be the whole record and nothing more
pub fn decode(mut bytes: &[u8]) -> std::result::Result<Entry, DecodeError> {
    let actual = bytes.len();
    if actual < ENTRY_OVERHEAD {
        return Err(DecodeError::TooShort {
            len: actual,
            min: ENTRY_OVERHEAD,
        });
    }

    let declared = bytes.get_u32_le() as usize;
    if declared != actual {
        return Err(DecodeError::TotalMismatch { declared, actual });
    }

    let key_len = bytes.get_u32_le() as usize;
    // The value length field must still fit after the key
    let available = bytes.remaining() - LEN_PREFIX_SIZE;
    if key_len > available {
        return Err(DecodeError::KeyOverrun { key_len, available });
    }
    let key = bytes[..key_len].to_vec();
    bytes.advance(key_len);

    let value_len = bytes.get_u32_le() as usize;
    if value_len != bytes.remaining() {
        return Err(DecodeError::ValueMismatch {
            value_len,
            available: bytes.remaining(),
        });
    }
    let value = bytes.to_vec();

    Ok(Entry { key, value })
}
