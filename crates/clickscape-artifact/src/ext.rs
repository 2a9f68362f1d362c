//! Normalised file extensions
//!
//! Upload rules, stored blob names and download media types are all keyed
//! on a [`FileExt`]: the lowercase extension including its leading dot.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::path::Path;

/// Lowercase file extension with leading dot (`".jpg"`), or empty
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileExt(String);

impl FileExt {
    /// Extension of `filename`, lowercased. Empty when there is none.
    ///
    /// Dotfiles such as `.png` have no extension, matching how the
    /// filesystem treats them.
    #[must_use]
    pub fn from_filename(filename: &str) -> Self {
        Path::new(filename)
            .extension()
            .map(|e| Self(format!(".{}", e.to_string_lossy().to_lowercase())))
            .unwrap_or_default()
    }

    /// Parse a bare or dotted extension (`"PNG"`, `".png"`)
    #[must_use]
    pub fn parse(ext: &str) -> Self {
        let ext = ext.trim().trim_start_matches('.').to_lowercase();
        if ext.is_empty() {
            Self::default()
        } else {
            Self(format!(".{ext}"))
        }
    }

    /// The extension with its dot
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The extension without its dot
    #[inline]
    #[must_use]
    pub fn bare(&self) -> &str {
        self.0.trim_start_matches('.')
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// MIME type guessed from the extension
    #[must_use]
    pub fn media_type(&self) -> String {
        mime_guess::from_ext(self.bare())
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    }
}

impl Default for FileExt {
    fn default() -> Self {
        Self(String::new())
    }
}

impl Display for FileExt {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileExt {
    fn from(ext: &str) -> Self {
        Self::parse(ext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_filename_lowercases() {
        assert_eq!(FileExt::from_filename("Sunset.JPG").as_str(), ".jpg");
        assert_eq!(FileExt::from_filename("scan.final.TIFF").as_str(), ".tiff");
    }

    #[test]
    fn from_filename_without_extension() {
        assert!(FileExt::from_filename("README").is_empty());
        assert!(FileExt::from_filename("").is_empty());
        assert!(FileExt::from_filename(".png").is_empty());
    }

    #[test]
    fn parse_accepts_dotted_and_bare() {
        assert_eq!(FileExt::parse("PNG"), FileExt::parse(".png"));
        assert_eq!(FileExt::parse(".png").bare(), "png");
        assert!(FileExt::parse(" . ").is_empty());
    }

    #[test]
    fn media_types() {
        assert_eq!(FileExt::parse("jpg").media_type(), "image/jpeg");
        assert_eq!(FileExt::parse("png").media_type(), "image/png");
        assert_eq!(FileExt::default().media_type(), "application/octet-stream");
    }
}
