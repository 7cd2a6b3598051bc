//! 32-byte SHA-256 digest with hex rendering and proof-of-work target checks.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 digest length in bytes.
pub const HASH_LEN: usize = 32;

/// Number of hex digits in a rendered digest.
pub const HASH_HEX_LEN: usize = HASH_LEN * 2;

/// Error returned when a hex string does not describe a 32-byte digest.
#[derive(Debug, thiserror::Error)]
#[error("invalid hash '{input}': {source}")]
pub struct HashParseError {
    input: String,
    #[source]
    source: hex::FromHexError,
}

/// Fixed-size 32-byte hash identifying blocks.
///
/// `Copy` so it can be passed around freely while walking the chain.
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Ord, PartialOrd)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    /// Creates a zero-valued hash (all bytes are 0x00).
    pub fn zero() -> Hash {
        Hash([0u8; HASH_LEN])
    }

    /// Returns the hash as a byte slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Creates a new SHA-256 builder for incremental hashing.
    pub fn sha256() -> HashBuilder {
        HashBuilder::new()
    }

    /// Hashes `data` in one shot.
    pub fn digest(data: &[u8]) -> Hash {
        let mut h = Hash::sha256();
        h.update(data);
        h.finalize()
    }

    /// Parses a 64-digit hex string (either case).
    pub fn from_hex(s: &str) -> Result<Hash, HashParseError> {
        let mut out = [0u8; HASH_LEN];
        hex::decode_to_slice(s, &mut out).map_err(|source| HashParseError {
            input: s.to_string(),
            source,
        })?;
        Ok(Hash(out))
    }

    /// Lowercase hex rendering, the form hashed into the successor block.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Counts leading `'0'` characters of the hex rendering.
    pub fn leading_zero_digits(&self) -> u32 {
        let mut count = 0;
        for byte in &self.0 {
            if *byte == 0 {
                count += 2;
                continue;
            }
            if byte >> 4 == 0 {
                count += 1;
            }
            break;
        }
        count
    }

    /// Returns true if the hex rendering starts with `difficulty` zero digits.
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        self.leading_zero_digits() >= difficulty
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Hash::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Incremental SHA-256 builder.
///
/// `Clone` lets the miner hash a shared preimage prefix once and fork the
/// state for every nonce. Implements [`fmt::Write`] so preimages can be
/// streamed in with `write!` without building an intermediate string.
#[derive(Clone, Default)]
pub struct HashBuilder {
    hasher: Sha256,
}

impl HashBuilder {
    /// Creates a new hash builder with empty state.
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Feeds data into the hash computation.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Streams formatted text into the hash computation.
    pub fn update_fmt(&mut self, args: fmt::Arguments<'_>) {
        // `write_str` below never fails.
        let _ = fmt::Write::write_fmt(self, args);
    }

    /// Consumes the builder and returns the final hash.
    pub fn finalize(self) -> Hash {
        Hash(self.hasher.finalize().into())
    }
}

impl fmt::Write for HashBuilder {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.hasher.update(s.as_bytes());
        Ok(())
    }
}
