//! Consensus serialization.
//!
//! Little-endian byte layout shared by transaction ids, block hashes, stake
//! hashes and modifier checksums. Only encoding is provided; the wire codec
//! lives outside this repository.

use crate::hash::Hash256;

/// Byte-buffer builder for consensus encodings.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Variable-length integer: 1, 3, 5 or 9 bytes depending on magnitude.
    pub fn put_var_int(&mut self, v: u64) {
        match v {
            0..=0xfc => self.put_u8(v as u8),
            0xfd..=0xffff => {
                self.put_u8(0xfd);
                self.put_u16(v as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.put_u8(0xfe);
                self.put_u32(v as u32);
            }
            _ => {
                self.put_u8(0xff);
                self.put_u64(v);
            }
        }
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Length-prefixed byte string.
    pub fn put_var_bytes(&mut self, bytes: &[u8]) {
        self.put_var_int(bytes.len() as u64);
        self.put_bytes(bytes);
    }

    pub fn put_hash(&mut self, hash: &Hash256) {
        self.buf.extend_from_slice(hash.as_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Types with a canonical consensus encoding.
pub trait Encodable {
    fn consensus_encode(&self, enc: &mut Encoder);

    fn consensus_bytes(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.consensus_encode(&mut enc);
        enc.into_bytes()
    }

    /// Serialized size in bytes.
    fn consensus_size(&self) -> usize {
        let mut enc = Encoder::new();
        self.consensus_encode(&mut enc);
        enc.len()
    }
}
