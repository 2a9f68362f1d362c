//! Core types for the ClickScape pipeline

use chrono::{DateTime, Utc};
use clickscape_artifact::{ArtifactVariant, ContentHash, FileExt};
use clickscape_plan::{Participation, Plan};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use ulid::Ulid;

/// Royalty share paid to the photographer on marketplace sales
pub const DEFAULT_ROYALTY_PERCENT: f64 = 0.15;

/// Account identifier, as issued by the user store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique photo identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PhotoId(pub Ulid);

impl PhotoId {
    /// Generate new photo ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PhotoId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_string(s).map(Self)
    }
}

/// An authenticated uploader or buyer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub plan: Plan,
    /// Competition participation, if any
    pub participation: Option<Participation>,
}

impl Account {
    #[inline]
    #[must_use]
    pub fn new(id: UserId, plan: Plan) -> Self {
        Self {
            id,
            plan,
            participation: None,
        }
    }

    #[inline]
    #[must_use]
    pub fn with_participation(mut self, participation: Participation) -> Self {
        self.participation = Some(participation);
        self
    }
}

/// Whoever is asking to see a photo; anonymous viewers count as free
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    pub user: Option<UserId>,
    pub plan: Plan,
}

impl Viewer {
    #[inline]
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            user: None,
            plan: Plan::Free,
        }
    }
}

impl From<&Account> for Viewer {
    fn from(account: &Account) -> Self {
        Self {
            user: Some(account.id),
            plan: account.plan,
        }
    }
}

/// A derived artifact as written to the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub variant: ArtifactVariant,
    /// Blob store key, `<uuid-hex><ext>`
    pub key: String,
    /// Public path, `/uploads/<key>`
    pub url: String,
    pub ext: FileExt,
    pub bytes: u64,
    pub hash: ContentHash,
}

/// Catalog entry for one uploaded photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: PhotoId,
    pub owner: UserId,
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    /// 0 means not listed for sale
    pub price: f64,
    pub royalty_percent: f64,
    /// Processed copy carries the watermark
    pub watermark: bool,
    pub processed: StoredArtifact,
    pub original: Option<StoredArtifact>,
    /// Bytes counted against the owner's quota; 0 for unmetered plans
    pub bytes_size: u64,
    pub competition_entry: bool,
    pub created_at: DateTime<Utc>,
}

impl PhotoRecord {
    #[inline]
    #[must_use]
    pub fn is_listed(&self) -> bool {
        self.price > 0.0
    }

    #[inline]
    #[must_use]
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    #[must_use]
    pub fn artifact(&self, variant: ArtifactVariant) -> Option<&StoredArtifact> {
        match variant {
            ArtifactVariant::Processed => Some(&self.processed),
            ArtifactVariant::Original => self.original.as_ref(),
        }
    }

    /// Every stored artifact, processed first
    pub fn artifacts(&self) -> impl Iterator<Item = &StoredArtifact> {
        std::iter::once(&self.processed).chain(self.original.as_ref())
    }
}

/// One uploaded file
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Arc<[u8]>,
}

impl UploadFile {
    #[must_use]
    pub fn new(filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Descriptive fields shared by single and batch uploads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoMetadata {
    /// Falls back to the file name when empty
    pub title: String,
    pub category: String,
    pub tags: Vec<String>,
    pub price: f64,
    pub competition_entry: bool,
}

impl PhotoMetadata {
    #[inline]
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    #[inline]
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// Tags from a comma-separated list
    #[inline]
    #[must_use]
    pub fn with_tags(mut self, tags: &str) -> Self {
        self.tags = parse_tags(tags);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = price;
        self
    }

    #[inline]
    #[must_use]
    pub fn as_competition_entry(mut self) -> Self {
        self.competition_entry = true;
        self
    }
}

/// Split a comma-separated tag list, dropping blanks
#[must_use]
pub fn parse_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Single-file upload
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file: UploadFile,
    pub meta: PhotoMetadata,
}

impl UploadRequest {
    #[must_use]
    pub fn new(file: UploadFile, meta: PhotoMetadata) -> Self {
        Self { file, meta }
    }
}

/// Multi-file upload sharing one set of metadata
#[derive(Debug, Clone, Default)]
pub struct BatchUpload {
    pub files: Vec<UploadFile>,
    pub meta: PhotoMetadata,
}

impl BatchUpload {
    #[must_use]
    pub fn new(meta: PhotoMetadata) -> Self {
        Self {
            files: Vec::new(),
            meta,
        }
    }

    #[must_use]
    pub fn with_file(mut self, file: UploadFile) -> Self {
        self.files.push(file);
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Owner edits; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhotoUpdate {
    pub title: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub price: Option<f64>,
}

impl PhotoUpdate {
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[inline]
    #[must_use]
    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }
}

/// Export quality label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    /// The retained original
    High,
    /// The processed web copy
    Web,
}

impl Quality {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Web => "web",
        }
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved export of one photo for one viewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub photo: PhotoId,
    pub url: String,
    pub quality: Quality,
    pub variant: ArtifactVariant,
}

/// Bytes served for a verified link
#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Arc<[u8]>,
    pub media_type: String,
    pub file_name: String,
}

/// Bytes currently counted against an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub used_bytes: u64,
    pub quota_bytes: u64,
}

impl Usage {
    #[inline]
    #[must_use]
    pub fn remaining_bytes(&self) -> u64 {
        self.quota_bytes.saturating_sub(self.used_bytes)
    }
}
