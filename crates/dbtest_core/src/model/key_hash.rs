//! Fixed-width opaque record identity.
//!
//! # Responsibility
//! - Provide the 32-byte key used as primary and reference key everywhere.
//! - Map keys to SQLite BLOB columns and to hex text for serde/logs.
//!
//! # Invariants
//! - The all-zero value is the null sentinel and is never a stored key.
//! - Ordering is byte-lexicographic, equality is byte equality.
//! - `generate()` never returns the null sentinel.

use rand::RngCore;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Width of every key in bytes.
pub const KEY_HASH_LEN: usize = 32;

/// Opaque 32-byte key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct KeyHash([u8; KEY_HASH_LEN]);

/// Errors raised while building or comparing keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyHashError {
    /// Raw input did not contain exactly `KEY_HASH_LEN` bytes.
    InvalidLength { expected: usize, actual: usize },
    /// Text form was not 64 hex characters.
    InvalidHex(String),
    /// A mandatory comparison operand was absent or null.
    InvalidArgument { index: u32 },
}

impl Display for KeyHashError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidLength { expected, actual } => {
                write!(f, "key must be {expected} bytes, got {actual}")
            }
            Self::InvalidHex(value) => write!(f, "invalid key hex `{value}`"),
            Self::InvalidArgument { index } => {
                write!(f, "key comparison operand {index} is absent")
            }
        }
    }
}

impl Error for KeyHashError {}

impl KeyHash {
    /// The null sentinel. Denotes "unset".
    pub const NULL: KeyHash = KeyHash([0; KEY_HASH_LEN]);

    pub const fn from_bytes(bytes: [u8; KEY_HASH_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyHashError> {
        if bytes.len() != KEY_HASH_LEN {
            return Err(KeyHashError::InvalidLength {
                expected: KEY_HASH_LEN,
                actual: bytes.len(),
            });
        }
        let mut key = [0_u8; KEY_HASH_LEN];
        key.copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Generates a fresh random key.
    ///
    /// Collisions are not checked here; the store's primary-key constraint
    /// reports them as conflicts.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let mut bytes = [0_u8; KEY_HASH_LEN];
            rng.fill_bytes(&mut bytes);
            let key = Self(bytes);
            if !key.is_null() {
                return key;
            }
        }
    }

    /// Derives a stable key as the SHA-256 digest of `seed`.
    ///
    /// Used for well-known records that must keep the same key across runs.
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut bytes = [0_u8; KEY_HASH_LEN];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_HASH_LEN] {
        &self.0
    }

    /// Returns true iff every byte is zero.
    pub fn is_null(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }

    /// Compares two mandatory keys.
    ///
    /// # Errors
    /// - `InvalidArgument` when either operand is absent or the null sentinel.
    pub fn compare(lhs: Option<&KeyHash>, rhs: Option<&KeyHash>) -> Result<Ordering, KeyHashError> {
        let lhs = lhs
            .filter(|key| !key.is_null())
            .ok_or(KeyHashError::InvalidArgument { index: 1 })?;
        let rhs = rhs
            .filter(|key| !key.is_null())
            .ok_or(KeyHashError::InvalidArgument { index: 2 })?;
        Ok(lhs.cmp(rhs))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Multiplicative fold over the key bytes, used by record digests.
    pub fn digest(&self) -> i32 {
        self.0
            .iter()
            .fold(0_i32, |acc, byte| acc.wrapping_mul(31).wrapping_add(i32::from(*byte)))
    }
}

impl Display for KeyHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Debug for KeyHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyHash({})", self.to_hex())
    }
}

impl FromStr for KeyHash {
    type Err = KeyHashError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0_u8; KEY_HASH_LEN];
        hex::decode_to_slice(value.trim(), &mut bytes)
            .map_err(|_| KeyHashError::InvalidHex(value.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for KeyHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeyHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

impl ToSql for KeyHash {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(ValueRef::Blob(&self.0)))
    }
}

impl FromSql for KeyHash {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let blob = value.as_blob()?;
        if blob.len() != KEY_HASH_LEN {
            return Err(FromSqlError::InvalidBlobSize {
                expected_size: KEY_HASH_LEN,
                blob_size: blob.len(),
            });
        }
        let mut bytes = [0_u8; KEY_HASH_LEN];
        bytes.copy_from_slice(blob);
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyHash, KeyHashError, KEY_HASH_LEN};
    use std::cmp::Ordering;

    #[test]
    fn default_is_null_sentinel() {
        assert!(KeyHash::default().is_null());
        assert_eq!(KeyHash::default(), KeyHash::NULL);
    }

    #[test]
    fn generate_never_returns_null() {
        for _ in 0..64 {
            assert!(!KeyHash::generate().is_null());
        }
    }

    #[test]
    fn from_seed_is_stable() {
        let first = KeyHash::from_seed("fedcba9876543210");
        let second = KeyHash::from_seed("fedcba9876543210");
        assert_eq!(first, second);
        assert_ne!(first, KeyHash::from_seed("0123456789abcdef"));
    }

    #[test]
    fn ordering_is_byte_lexicographic() {
        let mut low = [0_u8; KEY_HASH_LEN];
        low[31] = 0xff;
        let mut high = [0_u8; KEY_HASH_LEN];
        high[0] = 0x01;
        assert!(KeyHash::from_bytes(low) < KeyHash::from_bytes(high));
    }

    #[test]
    fn compare_rejects_absent_operands() {
        let key = KeyHash::generate();
        assert_eq!(
            KeyHash::compare(None, Some(&key)),
            Err(KeyHashError::InvalidArgument { index: 1 })
        );
        assert_eq!(
            KeyHash::compare(Some(&key), Some(&KeyHash::NULL)),
            Err(KeyHashError::InvalidArgument { index: 2 })
        );
        assert_eq!(KeyHash::compare(Some(&key), Some(&key)), Ok(Ordering::Equal));
    }

    #[test]
    fn hex_text_parses_back() {
        let key = KeyHash::generate();
        let parsed: KeyHash = key.to_hex().parse().expect("hex should parse");
        assert_eq!(parsed, key);
        assert!("abc".parse::<KeyHash>().is_err());
    }

    #[test]
    fn from_slice_checks_length() {
        let err = KeyHash::from_slice(&[1, 2, 3]).expect_err("short input must fail");
        assert_eq!(
            err,
            KeyHashError::InvalidLength {
                expected: KEY_HASH_LEN,
                actual: 3
            }
        );
    }
}
