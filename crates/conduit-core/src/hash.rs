//! LwHash — a 40-bit streaming digest for short identifiers.
//!
//! Merkle–Damgård construction over 16-byte blocks with five 8-bit
//! registers and an 80-round, four-band mixing schedule. Spreads identifiers
//! uniformly over the 40-bit partition space. Not a cryptographic hash.
//!
//! Output is always 5 bytes, rendered as 10 lowercase hex characters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identifier::Identifier;

/// Digest size in bytes.
pub const DIGEST_LEN: usize = 5;

/// Compression block size in bytes.
pub const BLOCK_LEN: usize = 16;

const ROUNDS: usize = 80;
const BAND_LEN: usize = 20;
const LENGTH_FIELD: usize = 8;

const INITIAL_STATE: [u8; DIGEST_LEN] = [0x67, 0xef, 0x98, 0x10, 0xc3];

type Mix = fn(i32, i32, i32) -> i32;

/// Mixing function and round constant for each 20-round band.
const BANDS: [(Mix, i32); 4] = [
    (choice, 0x5a),
    (parity, 0x6e),
    (majority, 0x8f),
    (parity, 0xca),
];

// ── Digest ────────────────────────────────────────────────────────────────────

/// A 40-bit digest, big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub const MIN: Digest = Digest([0x00; DIGEST_LEN]);
    pub const MAX: Digest = Digest([0xff; DIGEST_LEN]);

    /// Largest value representable in 40 bits.
    pub const MAX_VALUE: u64 = (1 << 40) - 1;

    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Interpret the digest as an unsigned 40-bit integer.
    pub fn to_u64(self) -> u64 {
        self.0
            .iter()
            .fold(0u64, |acc, &byte| (acc << 8) | u64::from(byte))
    }

    /// Returns None if `value` does not fit in 40 bits.
    pub fn from_u64(value: u64) -> Option<Self> {
        if value > Self::MAX_VALUE {
            return None;
        }
        let be = value.to_be_bytes();
        let mut bytes = [0u8; DIGEST_LEN];
        bytes.copy_from_slice(&be[8 - DIGEST_LEN..]);
        Some(Self(bytes))
    }

    /// Canonical 10-character lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestParseError {
    #[error("digest is empty")]
    Empty,
    #[error("digest has {0} hex digits, at most 10 allowed")]
    TooLong(usize),
    #[error("digest contains a non-hex character: {0:?}")]
    InvalidChar(char),
}

/// Parses 1 to 10 hex digits, either case, with an optional `0x` prefix.
/// `"0x0"` and `"0000000000"` are the same digest.
impl FromStr for Digest {
    type Err = DigestParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.is_empty() {
            return Err(DigestParseError::Empty);
        }
        if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(DigestParseError::InvalidChar(bad));
        }
        if digits.len() > DIGEST_LEN * 2 {
            return Err(DigestParseError::TooLong(digits.len()));
        }
        let value =
            u64::from_str_radix(digits, 16).map_err(|_| DigestParseError::TooLong(digits.len()))?;
        Digest::from_u64(value).ok_or(DigestParseError::TooLong(digits.len()))
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ── Hasher ────────────────────────────────────────────────────────────────────

/// Streaming hasher. Any chunking of the same input yields the same digest:
///
/// ```
/// use conduit_core::LwHasher;
///
/// let whole = LwHasher::new().update(b"sensor-01").finalize();
/// let split = LwHasher::new().update(b"sens").update(b"or-01").finalize();
/// assert_eq!(whole, split);
/// ```
#[derive(Debug, Clone)]
pub struct LwHasher {
    state: [u8; DIGEST_LEN],
    buffer: [u8; BLOCK_LEN],
    buffered: usize,
    /// Bytes already compressed; excludes `buffered`.
    compressed: u64,
}

impl Default for LwHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl LwHasher {
    pub fn new() -> Self {
        Self {
            state: INITIAL_STATE,
            buffer: [0u8; BLOCK_LEN],
            buffered: 0,
            compressed: 0,
        }
    }

    /// Append bytes to the message.
    pub fn update(&mut self, data: impl AsRef<[u8]>) -> &mut Self {
        let mut data = data.as_ref();

        if self.buffered > 0 {
            let take = (BLOCK_LEN - self.buffered).min(data.len());
            self.buffer[self.buffered..self.buffered + take].copy_from_slice(&data[..take]);
            self.buffered += take;
            data = &data[take..];
            if self.buffered < BLOCK_LEN {
                return self;
            }
            let block = self.buffer;
            compress(&mut self.state, &block);
            self.compressed += BLOCK_LEN as u64;
            self.buffered = 0;
        }

        let mut blocks = data.chunks_exact(BLOCK_LEN);
        for block in &mut blocks {
            compress(&mut self.state, block);
            self.compressed += BLOCK_LEN as u64;
        }

        let tail = blocks.remainder();
        self.buffer[..tail.len()].copy_from_slice(tail);
        self.buffered = tail.len();
        self
    }

    /// Pad, append the bit length and produce the digest. Does not consume
    /// the hasher, so more input may follow.
    pub fn finalize(&self) -> Digest {
        let mut state = self.state;
        let total_bytes = self.compressed + self.buffered as u64;

        // Zero-pad so exactly 8 bytes remain in the final block, then the
        // big-endian bit length. One or two blocks result.
        let pad = (BLOCK_LEN + LENGTH_FIELD - self.buffered) % BLOCK_LEN;
        let length_at = self.buffered + pad;
        let end = length_at + LENGTH_FIELD;

        let mut tail = [0u8; 2 * BLOCK_LEN];
        tail[..self.buffered].copy_from_slice(&self.buffer[..self.buffered]);
        tail[length_at..end].copy_from_slice(&total_bytes.wrapping_mul(8).to_be_bytes());

        for block in tail[..end].chunks_exact(BLOCK_LEN) {
            compress(&mut state, block);
        }
        Digest(state)
    }
}

/// Digest of raw bytes.
pub fn digest_bytes(data: impl AsRef<[u8]>) -> Digest {
    LwHasher::new().update(data).finalize()
}

/// Digest of an identifier's canonical text encoding.
pub fn digest_of(identifier: &Identifier) -> Digest {
    digest_bytes(identifier.as_bytes())
}

// ── Compression ───────────────────────────────────────────────────────────────

/// Compress one 16-byte block into `state`.
///
/// Schedule words are the block bytes read as signed and sign-extended;
/// the expansion rotates those extended words, so a negative XOR result
/// rotates to `0xfe | bit7`.
fn compress(state: &mut [u8; DIGEST_LEN], block: &[u8]) {
    debug_assert_eq!(block.len(), BLOCK_LEN);

    let mut w = [0i32; ROUNDS];
    for (word, &byte) in w.iter_mut().zip(block) {
        *word = i32::from(byte as i8);
    }
    for i in BLOCK_LEN..ROUNDS {
        w[i] = rotl8(w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16], 1);
    }

    let [mut a, mut b, mut c, mut d, mut e] = state.map(i32::from);

    for (band, &(mix, k)) in BANDS.iter().enumerate() {
        for &word in &w[band * BAND_LEN..(band + 1) * BAND_LEN] {
            let t = (rotl8(a, 1) + mix(b, c, d) + e + k + word) & 0xff;
            e = d;
            d = c;
            c = rotl8(b, 5);
            b = a;
            a = t;
        }
    }

    for (reg, value) in state.iter_mut().zip([a, b, c, d, e]) {
        *reg = reg.wrapping_add(value as u8);
    }
}

#[inline]
fn rotl8(n: i32, bits: u32) -> i32 {
    ((n << bits) | (n >> (8 - bits))) & 0xff
}

#[inline]
fn choice(b: i32, c: i32, d: i32) -> i32 {
    d ^ (b & (c ^ d))
}

#[inline]
fn parity(b: i32, c: i32, d: i32) -> i32 {
    b ^ c ^ d
}

#[inline]
fn majority(b: i32, c: i32, d: i32) -> i32 {
    (b & c) | (b & d) | (c & d)
}
