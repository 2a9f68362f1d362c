//! Content hashes for uploaded and derived image bytes
//!
//! Every artifact the pipeline writes is recorded with its [`ContentHash`],
//! so a later download can prove the bytes on disk are the bytes that were
//! derived at upload time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// A 32-byte Blake3 digest of an artifact's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    /// Wrap raw digest bytes
    #[inline]
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    #[inline]
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Build from a byte slice
    ///
    /// # Errors
    /// Returns error if slice length is not exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| HashError::InvalidLength {
            expected: 32,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    /// Hash a byte buffer
    #[inline]
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    /// Check `data` against this digest.
    ///
    /// Comparison goes through [`blake3::Hash`], whose equality is constant time.
    #[must_use]
    pub fn matches(&self, data: &[u8]) -> bool {
        blake3::hash(data) == blake3::Hash::from_bytes(self.0)
    }

    /// First 16 hex chars, for log lines
    #[inline]
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..8])
    }
}

impl Display for ContentHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for ContentHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s)?;
        Self::from_slice(&bytes)
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            serializer.serialize_bytes(&self.0)
        }
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ContentHashVisitor;

        impl serde::de::Visitor<'_> for ContentHashVisitor {
            type Value = ContentHash;

            fn expecting(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
                formatter.write_str("a 32-byte hash as hex string or byte array")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                value.parse().map_err(serde::de::Error::custom)
            }

            fn visit_bytes<E>(self, value: &[u8]) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                ContentHash::from_slice(value).map_err(serde::de::Error::custom)
            }
        }

        if deserializer.is_human_readable() {
            deserializer.deserialize_str(ContentHashVisitor)
        } else {
            deserializer.deserialize_bytes(ContentHashVisitor)
        }
    }
}

/// Errors that can occur when parsing content hashes
#[derive(Debug, thiserror::Error)]
pub enum HashError {
    /// Invalid hash length
    #[error("invalid hash length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Hex encoding error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_slice_rejects_short_input() {
        let result = ContentHash::from_slice(&[1u8; 31]);
        assert!(matches!(
            result,
            Err(HashError::InvalidLength {
                expected: 32,
                actual: 31
            })
        ));
    }

    #[test]
    fn compute_is_deterministic() {
        let jpeg_ish = [0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
        assert_eq!(ContentHash::compute(&jpeg_ish), ContentHash::compute(&jpeg_ish));
        assert_ne!(ContentHash::compute(&jpeg_ish), ContentHash::compute(b"other"));
    }

    #[test]
    fn matches_detects_tampering() {
        let hash = ContentHash::compute(b"processed bytes");
        assert!(hash.matches(b"processed bytes"));
        assert!(!hash.matches(b"processed bytez"));
    }

    #[test]
    fn display_and_parse() {
        let hash = ContentHash::compute(b"photo");
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        assert_eq!(hash, parsed);
        assert!(hash.to_string().starts_with(&hash.short()));
        assert_eq!(hash.short().len(), 16);
    }

    #[test]
    fn serde_json_uses_hex() {
        let hash = ContentHash::compute(b"photo");
        let json = serde_json::to_string(&hash).unwrap();
        assert_eq!(json, format!("\"{hash}\""));
        let decoded: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, decoded);
    }
}
