//! Variable-length big-endian integers and a bounds-checked byte reader.
//!
//! Encoding: `len:u8 | magnitude[len]`, most significant byte first, no
//! leading zero bytes. Zero is the empty magnitude (`len = 0`). Because a
//! leading zero is rejected on read, each value has exactly one encoding,
//! which keeps `encode(decode(bytes)) == bytes` for everything accepted.

use alloy_primitives::U256;

use super::error::DecodeError;

/// Appends `be` (big-endian, any width) with leading zeros stripped.
fn put_trimmed(out: &mut Vec<u8>, be: &[u8]) {
    let skip = be.iter().take_while(|b| **b == 0).count();
    let magnitude = &be[skip..];
    out.push(magnitude.len() as u8);
    out.extend_from_slice(magnitude);
}

pub fn put_u64(out: &mut Vec<u8>, value: u64) {
    put_trimmed(out, &value.to_be_bytes());
}

pub fn put_u128(out: &mut Vec<u8>, value: u128) {
    put_trimmed(out, &value.to_be_bytes());
}

pub fn put_u256(out: &mut Vec<u8>, value: &U256) {
    put_trimmed(out, &value.to_be_bytes::<32>());
}

/// Cursor over a body. Every read is bounds-checked and fails with
/// [`DecodeError::InvalidFormat`] naming the field that ran out.
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, len: usize, field: &str) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::format(format!(
                "truncated `{field}`: need {len} bytes, have {}",
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn u8(&mut self, field: &str) -> Result<u8, DecodeError> {
        Ok(self.take(1, field)?[0])
    }

    pub fn array<const N: usize>(&mut self, field: &str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, field)?);
        Ok(out)
    }

    /// Reads a varint magnitude into a right-aligned `N`-byte buffer.
    fn magnitude<const N: usize>(&mut self, field: &str) -> Result<[u8; N], DecodeError> {
        let len = self.u8(field)? as usize;
        if len > N {
            return Err(DecodeError::format(format!(
                "`{field}` is {len} bytes wide, limit is {N}"
            )));
        }
        let bytes = self.take(len, field)?;
        if bytes.first() == Some(&0) {
            return Err(DecodeError::format(format!(
                "`{field}` has a leading zero byte"
            )));
        }
        let mut out = [0u8; N];
        out[N - len..].copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u64(&mut self, field: &str) -> Result<u64, DecodeError> {
        Ok(u64::from_be_bytes(self.magnitude::<8>(field)?))
    }

    pub fn u128(&mut self, field: &str) -> Result<u128, DecodeError> {
        Ok(u128::from_be_bytes(self.magnitude::<16>(field)?))
    }

    pub fn u256(&mut self, field: &str) -> Result<U256, DecodeError> {
        Ok(U256::from_be_bytes(self.magnitude::<32>(field)?))
    }

    /// Fails if anything is left unread.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(DecodeError::format(format!("{n} trailing bytes"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_empty_magnitude() {
        let mut out = Vec::new();
        put_u64(&mut out, 0);
        assert_eq!(out, vec![0x00]);
        assert_eq!(ByteReader::new(&out).u64("n").unwrap(), 0);
    }

    #[test]
    fn encodings_are_minimal_big_endian() {
        let mut out = Vec::new();
        put_u64(&mut out, 0x0102);
        assert_eq!(out, vec![0x02, 0x01, 0x02]);

        out.clear();
        put_u128(&mut out, u128::MAX);
        assert_eq!(out.len(), 17);
        assert_eq!(out[0], 16);
    }

    #[test]
    fn max_u256_roundtrips_at_full_width() {
        let mut out = Vec::new();
        put_u256(&mut out, &U256::MAX);
        assert_eq!(out.len(), 33);
        let mut reader = ByteReader::new(&out);
        assert_eq!(reader.u256("value").unwrap(), U256::MAX);
        reader.finish().unwrap();
    }

    #[test]
    fn leading_zero_is_rejected() {
        let err = ByteReader::new(&[0x02, 0x00, 0x05]).u64("nonce").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFormat(msg) if msg.contains("leading zero")));
    }

    #[test]
    fn over_wide_value_is_rejected() {
        let mut bytes = vec![9u8];
        bytes.extend_from_slice(&[0xFF; 9]);
        assert!(ByteReader::new(&bytes).u64("gas").is_err());
    }

    #[test]
    fn truncated_value_is_rejected() {
        let err = ByteReader::new(&[0x04, 0x01]).u64("nonce").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidFormat(msg) if msg.contains("nonce")));
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let mut reader = ByteReader::new(&[0x00, 0xAA]);
        reader.u64("x").unwrap();
        assert!(reader.finish().is_err());
    }
}
