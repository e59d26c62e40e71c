//! Wire format serialization and deserialization.
//!
//! Both payloads are fixed layout and ride on the transport's own framing.
//!
//! ## AREQ
//!
//! ```text
//! originator (2) || requested (2) || hops_remaining (1)
//! ```
//!
//! ## Collision notice
//!
//! ```text
//! "Address is not unique!\0" (23)
//! ```
//!
//! The notice carries no fields; receivers only check the marker.

use alloc::vec::Vec;

use crate::types::{Address, Areq, ADDRESS_LEN, AREQ_LEN, COLLISION_NOTICE};

/// Decoding error types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Unexpected end of buffer.
    #[error("unexpected end of buffer")]
    UnexpectedEof,
    /// Trailing bytes after a complete message.
    #[error("trailing bytes after message")]
    InvalidLength,
    /// Multihop payload is not a collision notice.
    #[error("payload is not a collision notice")]
    NotACollisionNotice,
}

/// Zero-copy reader over a byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let v = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_address(&mut self) -> Result<Address, DecodeError> {
        let bytes = self.read_bytes(ADDRESS_LEN)?;
        Ok(Address([bytes[0], bytes[1]]))
    }
}

/// Writer for encoding messages.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn write_address(&mut self, addr: &Address) {
        self.write_bytes(&addr.0);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Trait for types that can be encoded to wire format.
pub trait Encode {
    fn encode(&self, w: &mut Writer);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode(&mut w);
        w.finish()
    }
}

/// Trait for types that can be decoded from wire format.
pub trait Decode: Sized {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decode from a byte slice (strict: rejects trailing bytes).
    fn decode_from_slice(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(data);
        let result = Self::decode(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(result)
    }
}

impl Encode for Areq {
    fn encode(&self, w: &mut Writer) {
        w.write_address(&self.originator);
        w.write_address(&self.requested);
        w.write_u8(self.hops_remaining);
    }

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(AREQ_LEN);
        self.encode(&mut w);
        w.finish()
    }
}

impl Decode for Areq {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Areq {
            originator: r.read_address()?,
            requested: r.read_address()?,
            hops_remaining: r.read_u8()?,
        })
    }
}

/// "Address is not unique" marker sent back along the reverse path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollisionNotice;

impl Encode for CollisionNotice {
    fn encode(&self, w: &mut Writer) {
        w.write_bytes(COLLISION_NOTICE);
    }
}

impl Decode for CollisionNotice {
    fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let marker = r.read_bytes(COLLISION_NOTICE.len())?;
        if marker != COLLISION_NOTICE {
            return Err(DecodeError::NotACollisionNotice);
        }
        Ok(CollisionNotice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_areq_layout() {
        let areq = Areq {
            originator: Address::new(1, 2),
            requested: Address::new(0xAB, 0xCD),
            hops_remaining: 50,
        };
        let bytes = areq.encode_to_vec();
        assert_eq!(bytes, [1, 2, 0xAB, 0xCD, 50]);
        assert_eq!(bytes.len(), AREQ_LEN);
        assert_eq!(Areq::decode_from_slice(&bytes), Ok(areq));
    }

    #[test]
    fn test_areq_truncated_rejected() {
        assert_eq!(
            Areq::decode_from_slice(&[1, 2, 3, 4]),
            Err(DecodeError::UnexpectedEof)
        );
        assert_eq!(Areq::decode_from_slice(&[]), Err(DecodeError::UnexpectedEof));
    }

    #[test]
    fn test_areq_trailing_bytes_rejected() {
        assert_eq!(
            Areq::decode_from_slice(&[1, 2, 3, 4, 5, 6]),
            Err(DecodeError::InvalidLength)
        );
    }

    #[test]
    fn test_collision_notice_marker() {
        let bytes = CollisionNotice.encode_to_vec();
        assert_eq!(bytes.as_slice(), COLLISION_NOTICE);
        assert_eq!(CollisionNotice::decode_from_slice(&bytes), Ok(CollisionNotice));
    }

    #[test]
    fn test_collision_notice_rejects_other_payloads() {
        let mut bytes = CollisionNotice.encode_to_vec();
        bytes[0] = b'a';
        assert_eq!(
            CollisionNotice::decode_from_slice(&bytes),
            Err(DecodeError::NotACollisionNotice)
        );
        assert_eq!(
            CollisionNotice::decode_from_slice(b"short"),
            Err(DecodeError::UnexpectedEof)
        );
    }
}
