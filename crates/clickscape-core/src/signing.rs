//! Signed, expiring download links
//!
//! A link is `path`, `exp` (unix seconds) and `sig`, where `sig` is a keyed
//! Blake3 MAC of `"{path}|{exp}"`. The key is derived from the download
//! secret, never used raw.

use crate::store::{validate_key, UPLOADS_PREFIX};
use serde::{Deserialize, Serialize};
use std::fmt;

const KEY_CONTEXT: &str = "clickscape 2024 signed download links v1";

/// Why a link was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    #[error("Invalid or expired link")]
    Expired,

    #[error("Invalid or expired link")]
    BadSignature,

    /// Path outside `/uploads/` or with separators in the file name
    #[error("Invalid path")]
    InvalidPath,
}

/// A signed download link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedLink {
    pub path: String,
    pub expires_at: i64,
    pub signature: String,
}

impl SignedLink {
    /// `path=...&exp=...&sig=...`
    #[must_use]
    pub fn query(&self) -> String {
        format!(
            "path={}&exp={}&sig={}",
            self.path, self.expires_at, self.signature
        )
    }

    /// Parse a query string produced by [`Self::query`]; order does not matter
    #[must_use]
    pub fn from_query(query: &str) -> Option<Self> {
        let (mut path, mut exp, mut sig) = (None, None, None);
        for pair in query.trim_start_matches('?').split('&') {
            match pair.split_once('=')? {
                ("path", v) => path = Some(v.to_string()),
                ("exp", v) => exp = v.parse().ok(),
                ("sig", v) => sig = Some(v.to_string()),
                _ => {}
            }
        }
        Some(Self {
            path: path?,
            expires_at: exp?,
            signature: sig?,
        })
    }

    /// Blob key the link points at
    #[must_use]
    pub fn key(&self) -> Option<&str> {
        self.path.strip_prefix(UPLOADS_PREFIX)
    }
}

impl fmt::Display for SignedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.query())
    }
}

/// Signs and verifies download links
#[derive(Clone)]
pub struct LinkSigner {
    key: [u8; 32],
}

impl fmt::Debug for LinkSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkSigner").finish_non_exhaustive()
    }
}

impl LinkSigner {
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
        }
    }

    fn mac(&self, path: &str, expires_at: i64) -> blake3::Hash {
        blake3::keyed_hash(&self.key, format!("{path}|{expires_at}").as_bytes())
    }

    #[must_use]
    pub fn sign(&self, path: &str, expires_at: i64) -> SignedLink {
        SignedLink {
            path: path.to_string(),
            expires_at,
            signature: self.mac(path, expires_at).to_hex().to_string(),
        }
    }

    /// Check a link at time `now` (unix seconds)
    ///
    /// # Errors
    /// Returns the first check the link fails
    pub fn verify(&self, path: &str, expires_at: i64, signature: &str, now: i64) -> Result<(), LinkError> {
        let key = path.strip_prefix(UPLOADS_PREFIX).ok_or(LinkError::InvalidPath)?;
        validate_key(key).map_err(|_| LinkError::InvalidPath)?;
        if expires_at < now {
            return Err(LinkError::Expired);
        }
        let given = blake3::Hash::from_hex(signature).map_err(|_| LinkError::BadSignature)?;
        // blake3::Hash equality is constant-time.
        if given != self.mac(path, expires_at) {
            return Err(LinkError::BadSignature);
        }
        Ok(())
    }

    /// [`Self::verify`] for a parsed link
    ///
    /// # Errors
    /// Same as [`Self::verify`]
    pub fn verify_link(&self, link: &SignedLink, now: i64) -> Result<(), LinkError> {
        self.verify(&link.path, link.expires_at, &link.signature, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn signed_link_verifies_until_expiry() {
        let signer = LinkSigner::new("s3cret");
        let link = signer.sign("/uploads/abc.jpg", NOW + 60);
        assert_eq!(link.signature.len(), 64);
        assert!(signer.verify_link(&link, NOW).is_ok());
        assert!(signer.verify_link(&link, NOW + 60).is_ok());
        assert_eq!(signer.verify_link(&link, NOW + 61), Err(LinkError::Expired));
    }

    #[test]
    fn tampering_is_detected() {
        let signer = LinkSigner::new("s3cret");
        let link = signer.sign("/uploads/abc.jpg", NOW + 60);

        let other_path = signer.verify("/uploads/abd.jpg", link.expires_at, &link.signature, NOW);
        assert_eq!(other_path, Err(LinkError::BadSignature));

        let later = signer.verify(&link.path, NOW + 6000, &link.signature, NOW);
        assert_eq!(later, Err(LinkError::BadSignature));

        let other_key = LinkSigner::new("different");
        assert_eq!(other_key.verify_link(&link, NOW), Err(LinkError::BadSignature));

        assert_eq!(
            signer.verify(&link.path, link.expires_at, "zz", NOW),
            Err(LinkError::BadSignature)
        );
    }

    #[test]
    fn paths_outside_uploads_are_refused() {
        let signer = LinkSigner::new("s3cret");
        for path in ["/etc/passwd", "/uploads/../secret.txt", "/uploads/a/b.jpg", "/uploads/"] {
            let link = signer.sign(path, NOW + 60);
            assert_eq!(signer.verify_link(&link, NOW), Err(LinkError::InvalidPath), "{path}");
        }
    }

    #[test]
    fn query_round_trip() {
        let signer = LinkSigner::new("s3cret");
        let link = signer.sign("/uploads/abc.png", NOW);
        let parsed = SignedLink::from_query(&format!("?{}", link.query())).unwrap();
        assert_eq!(parsed, link);
        assert_eq!(parsed.key(), Some("abc.png"));
        assert!(SignedLink::from_query("path=/uploads/a.png&exp=soon&sig=00").is_none());
    }
}
