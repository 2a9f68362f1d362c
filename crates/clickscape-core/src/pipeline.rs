//! The photo pipeline
//!
//! Upload path: resolve rules, gate, reserve quota and entry slots, derive,
//! store blobs, record. Reservations are committed only once the record is
//! in the catalog, so every failure on the way gives back what it took.
//!
//! Read path: resolve entitlement, export or sign a link, download with an
//! integrity check against the recorded hash.

use crate::accountant::{Reservation, StorageAccountant};
use crate::catalog::{Page, PhotoCatalog};
use crate::config::PipelineConfig;
use crate::entitlement::resolve;
use crate::error::{ConfigError, PipelineError};
use crate::gate::{check_batch, check_entry, check_file, check_listing};
use crate::purchases::PurchaseLedger;
use crate::signing::{LinkError, LinkSigner, SignedLink};
use crate::store::{new_key, public_url, BlobStore, FsBlobStore, StoreError};
use crate::types::{
    Account, BatchUpload, Download, Export, PhotoId, PhotoMetadata, PhotoRecord, PhotoUpdate,
    StoredArtifact, UploadFile, UploadRequest, Usage, Viewer, DEFAULT_ROYALTY_PERCENT,
};
use chrono::{DateTime, Utc};
use clickscape_artifact::{
    Artifact, ArtifactType, ArtifactVariant, FileExt, ImageBlob, OriginalImage, ProcessedImage,
};
use clickscape_imaging::{Derivation, DerivationEngine};
use clickscape_plan::{Plan, RuleResolver, UploadRules};
use futures::{StreamExt, TryStreamExt};
use metrics::counter;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Plan-gated ingestion, storage and entitlement for photos
#[derive(Debug)]
pub struct PhotoPipeline {
    config: PipelineConfig,
    resolver: RuleResolver,
    engine: Arc<DerivationEngine>,
    store: Arc<dyn BlobStore>,
    catalog: PhotoCatalog,
    purchases: PurchaseLedger,
    accountant: StorageAccountant,
    signer: LinkSigner,
}

/// A file that passed the gate
struct Accepted {
    file: UploadFile,
    ext: FileExt,
}

impl PhotoPipeline {
    /// Build a pipeline over any blob store
    ///
    /// # Errors
    /// Returns error if plan limits are inconsistent or the watermark logo
    /// cannot be loaded
    pub fn new(config: PipelineConfig, store: Arc<dyn BlobStore>) -> Result<Self, ConfigError> {
        let resolver = RuleResolver::new(config.plans.clone())?;
        let engine = DerivationEngine::from_config(&config.imaging)?;
        if config.uses_insecure_secret() {
            warn!("download links are signed with the default secret; set DOWNLOAD_SECRET");
        }
        let signer = LinkSigner::new(&config.download_secret);
        Ok(Self {
            config,
            resolver,
            engine: Arc::new(engine),
            store,
            catalog: PhotoCatalog::new(),
            purchases: PurchaseLedger::new(),
            accountant: StorageAccountant::new(),
            signer,
        })
    }

    /// Build a pipeline storing blobs under `config.upload_dir`
    ///
    /// # Errors
    /// Returns error if the directory cannot be created or the configuration
    /// is invalid
    pub async fn open(config: PipelineConfig) -> Result<Self, ConfigError> {
        let store = FsBlobStore::open(config.upload_dir.clone()).await?;
        info!(dir = %store.root().display(), "opened uploads directory");
        Self::new(config, Arc::new(store))
    }

    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub fn resolver(&self) -> &RuleResolver {
        &self.resolver
    }

    #[inline]
    #[must_use]
    pub fn accountant(&self) -> &StorageAccountant {
        &self.accountant
    }

    #[inline]
    #[must_use]
    pub fn purchases(&self) -> &PurchaseLedger {
        &self.purchases
    }

    #[inline]
    #[must_use]
    pub fn signer(&self) -> &LinkSigner {
        &self.signer
    }

    /// Rules an account uploads under
    #[inline]
    #[must_use]
    pub fn rules_for(&self, account: &Account) -> &UploadRules {
        self.resolver.rules_for(account.plan)
    }

    // ---------------------------------------------------------------------
    // Upload
    // ---------------------------------------------------------------------

    /// Upload one photo
    ///
    /// # Errors
    /// Gate rejections, quota exhaustion, undecodable content on watermarking
    /// plans, and storage failures
    pub async fn upload(
        &self,
        account: &Account,
        request: UploadRequest,
    ) -> Result<PhotoRecord, PipelineError> {
        let rules = self.rules_for(account);
        let outcome = self
            .ingest(account, rules, vec![request.file], &request.meta)
            .await
            .map(|mut records| records.remove(0));
        Self::observe(rules.plan, outcome.as_ref().map(|_| 1));
        outcome
    }

    /// Upload several photos sharing one set of metadata
    ///
    /// All or nothing: every file is gated before any is derived, quota is
    /// reserved for the whole batch at once, and a failure part way through
    /// removes whatever was already stored.
    ///
    /// # Errors
    /// Same as [`Self::upload`], plus the plan's batch limit
    pub async fn upload_batch(
        &self,
        account: &Account,
        batch: BatchUpload,
    ) -> Result<Vec<PhotoRecord>, PipelineError> {
        let rules = self.rules_for(account);
        let outcome = self.ingest(account, rules, batch.files, &batch.meta).await;
        Self::observe(rules.plan, outcome.as_ref().map(Vec::len));
        outcome
    }

    fn observe(plan: Plan, outcome: Result<usize, &PipelineError>) {
        match outcome {
            Ok(n) => {
                counter!("clickscape_uploads_total", "plan" => plan.as_str()).increment(n as u64);
            }
            Err(e) => {
                counter!("clickscape_uploads_rejected_total", "reason" => e.reason()).increment(1);
                if e.is_client_error() {
                    warn!(plan = %plan, reason = e.reason(), error = %e, "upload rejected");
                } else {
                    warn!(plan = %plan, error = %e, "upload failed");
                }
            }
        }
    }

    async fn ingest(
        &self,
        account: &Account,
        rules: &UploadRules,
        files: Vec<UploadFile>,
        meta: &PhotoMetadata,
    ) -> Result<Vec<PhotoRecord>, PipelineError> {
        check_batch(rules, files.len())?;
        let accepted = files
            .into_iter()
            .map(|file| -> Result<Accepted, PipelineError> {
                let ext = check_file(rules, &file.filename, &file.bytes)?;
                Ok(Accepted { file, ext })
            })
            .collect::<Result<Vec<_>, PipelineError>>()?;
        check_listing(rules, meta.price)?;

        let entries = self.reserve_entries(account, meta.competition_entry, accepted.len())?;
        let storage = if rules.is_metered() {
            let total = accepted.iter().map(|a| a.file.len()).sum();
            Some(self.accountant.reserve(account.id, total, rules.storage_quota_bytes)?)
        } else {
            None
        };

        let derivations = self.derive_all(rules, &accepted).await?;

        let mut records = Vec::with_capacity(accepted.len());
        for (item, derivation) in accepted.iter().zip(&derivations) {
            match self.store_derivation(derivation).await {
                Ok((processed, original)) => {
                    records.push(build_record(account, rules, item, derivation, meta, processed, original));
                }
                Err(e) => {
                    self.discard(records.iter().flat_map(PhotoRecord::artifacts)).await;
                    return Err(e);
                }
            }
        }

        for record in &records {
            self.catalog.insert(record.clone());
            info!(
                photo = %record.id,
                owner = %record.owner,
                plan = %rules.plan,
                watermark = record.watermark,
                metered = record.bytes_size,
                "photo uploaded"
            );
        }
        if let Some(storage) = storage {
            storage.commit();
        }
        entries.into_iter().for_each(Reservation::commit);
        Ok(records)
    }

    fn reserve_entries(
        &self,
        account: &Account,
        wanted: bool,
        count: usize,
    ) -> Result<Vec<Reservation<'_>>, PipelineError> {
        if !wanted {
            return Ok(Vec::new());
        }
        let participation = account.participation.as_ref();
        let slots = participation.map_or(0, |p| self.resolver.entry_slots(p));
        check_entry(participation, self.accountant.entries_used(account.id), slots)?;
        (0..count)
            .map(|_| {
                self.accountant
                    .reserve_entry(account.id, slots)
                    .map_err(PipelineError::from)
            })
            .collect()
    }

    async fn derive_all(
        &self,
        rules: &UploadRules,
        accepted: &[Accepted],
    ) -> Result<Vec<Derivation>, PipelineError> {
        let limit = self.config.max_concurrent_derivations.max(1);
        futures::stream::iter(accepted)
            .map(|item| {
                Arc::clone(&self.engine).derive_blocking(
                    rules.clone(),
                    Arc::clone(&item.file.bytes),
                    item.ext.clone(),
                )
            })
            .buffered(limit)
            .map_err(PipelineError::from)
            .try_collect()
            .await
    }

    async fn store_derivation(
        &self,
        derivation: &Derivation,
    ) -> Result<(StoredArtifact, Option<StoredArtifact>), PipelineError> {
        let processed = self.put_artifact(&derivation.processed).await?;
        let original = match &derivation.original {
            Some(original) => match self.put_artifact(original).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    self.discard(std::iter::once(&processed)).await;
                    return Err(e);
                }
            },
            None => None,
        };
        Ok((processed, original))
    }

    async fn put_artifact<T: ArtifactType>(
        &self,
        artifact: &Artifact<T>,
    ) -> Result<StoredArtifact, PipelineError> {
        let blob = artifact.content();
        let key = new_key(blob.ext());
        self.store.put(&key, blob.shared_bytes()).await?;
        Ok(StoredArtifact {
            variant: T::VARIANT,
            url: public_url(&key),
            key,
            ext: blob.ext().clone(),
            bytes: blob.len() as u64,
            hash: *artifact.hash(),
        })
    }

    /// Best-effort removal of stored blobs
    async fn discard<'a>(&self, artifacts: impl Iterator<Item = &'a StoredArtifact>) {
        for artifact in artifacts {
            if let Err(e) = self.store.delete(&artifact.key).await {
                warn!(key = %artifact.key, error = %e, "failed to remove blob");
            }
        }
    }

    // ---------------------------------------------------------------------
    // Read path
    // ---------------------------------------------------------------------

    /// # Errors
    /// [`PipelineError::NotFound`]
    pub fn get(&self, id: PhotoId) -> Result<PhotoRecord, PipelineError> {
        self.catalog.get(id).ok_or(PipelineError::NotFound(id))
    }

    /// Newest photos first, optionally in one category
    ///
    /// # Errors
    /// [`PipelineError::InvalidPage`]
    pub fn list(
        &self,
        page: usize,
        size: usize,
        category: Option<&str>,
    ) -> Result<Vec<PhotoRecord>, PipelineError> {
        let page = Page::new(page, size).ok_or(PipelineError::InvalidPage { page, size })?;
        Ok(self.catalog.list(page, category))
    }

    /// The account's own photos, newest first
    ///
    /// # Errors
    /// [`PipelineError::InvalidPage`]
    pub fn list_mine(
        &self,
        account: &Account,
        page: usize,
        size: usize,
    ) -> Result<Vec<PhotoRecord>, PipelineError> {
        let page = Page::new(page, size).ok_or(PipelineError::InvalidPage { page, size })?;
        Ok(self.catalog.list_by_owner(account.id, page))
    }

    #[must_use]
    pub fn usage(&self, account: &Account) -> Usage {
        Usage {
            used_bytes: self.accountant.usage(account.id),
            quota_bytes: self.resolver.storage_quota_bytes(account.plan),
        }
    }

    /// The artifact `viewer` is entitled to
    ///
    /// # Errors
    /// [`PipelineError::NotFound`]
    pub fn export(&self, viewer: &Viewer, id: PhotoId) -> Result<Export, PipelineError> {
        let photo = self.get(id)?;
        let entitlement = resolve(viewer, &photo, &self.purchases);
        let artifact = photo
            .artifact(entitlement.variant)
            .unwrap_or(&photo.processed);
        counter!("clickscape_exports_total", "quality" => entitlement.quality.as_str()).increment(1);
        debug!(photo = %id, quality = %entitlement.quality, "export resolved");
        Ok(Export {
            photo: id,
            url: artifact.url.clone(),
            quality: entitlement.quality,
            variant: artifact.variant,
        })
    }

    /// [`Self::export`] as a link that expires after the configured TTL
    ///
    /// # Errors
    /// [`PipelineError::NotFound`]
    pub fn signed_export(
        &self,
        viewer: &Viewer,
        id: PhotoId,
        now: DateTime<Utc>,
    ) -> Result<SignedLink, PipelineError> {
        let export = self.export(viewer, id)?;
        let ttl = i64::try_from(self.config.link_ttl_secs).unwrap_or(i64::MAX);
        Ok(self.signer.sign(&export.url, now.timestamp().saturating_add(ttl)))
    }

    /// Serve the bytes behind a signed link
    ///
    /// # Errors
    /// Link rejections, unknown or missing blobs, and bytes that no longer
    /// match their recorded hash
    pub async fn download(
        &self,
        link: &SignedLink,
        now: DateTime<Utc>,
    ) -> Result<Download, PipelineError> {
        self.signer.verify_link(link, now.timestamp())?;
        let key = link.key().ok_or(LinkError::InvalidPath)?;
        let (photo, stored) = self
            .catalog
            .artifact_by_key(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let bytes = self.store.get(key).await?;

        let blob = ImageBlob::new(bytes, stored.ext.clone());
        let blob = match stored.variant {
            ArtifactVariant::Original => {
                Artifact::<OriginalImage>::restore(blob, stored.hash)?.into_content()
            }
            ArtifactVariant::Processed => {
                Artifact::<ProcessedImage>::restore(blob, stored.hash)?.into_content()
            }
        };
        debug!(photo = %photo, key, variant = %stored.variant, "serving download");
        Ok(Download {
            bytes: blob.shared_bytes(),
            media_type: stored.ext.media_type(),
            file_name: key.to_string(),
        })
    }

    // ---------------------------------------------------------------------
    // Owner and buyer actions
    // ---------------------------------------------------------------------

    /// Edit a photo's metadata
    ///
    /// # Errors
    /// Unknown photo, caller not the owner, or a price the plan cannot list
    pub fn update(
        &self,
        account: &Account,
        id: PhotoId,
        update: PhotoUpdate,
    ) -> Result<PhotoRecord, PipelineError> {
        let photo = self.get(id)?;
        if !photo.is_owned_by(account.id) {
            return Err(PipelineError::Forbidden("only the owner can edit a photo"));
        }
        if let Some(price) = update.price {
            check_listing(self.rules_for(account), price)?;
        }
        self.catalog
            .update(id, |record| {
                if let Some(title) = update.title {
                    record.title = title;
                }
                if let Some(category) = update.category {
                    record.category = category;
                }
                if let Some(tags) = update.tags {
                    record.tags = tags;
                }
                if let Some(price) = update.price {
                    record.price = price;
                }
            })
            .ok_or(PipelineError::NotFound(id))
    }

    /// Delete a photo, its blobs, and what it counted against the owner
    ///
    /// # Errors
    /// Unknown photo or caller not the owner
    pub async fn delete(&self, account: &Account, id: PhotoId) -> Result<(), PipelineError> {
        let photo = self.get(id)?;
        if !photo.is_owned_by(account.id) {
            return Err(PipelineError::Forbidden("only the owner can delete a photo"));
        }
        let photo = self.catalog.remove(id).ok_or(PipelineError::NotFound(id))?;
        self.discard(photo.artifacts()).await;
        self.accountant.release(photo.owner, photo.bytes_size);
        if photo.competition_entry {
            self.accountant.release_entry(photo.owner);
        }
        self.purchases.forget_photo(id);
        info!(photo = %id, owner = %photo.owner, released = photo.bytes_size, "photo deleted");
        Ok(())
    }

    /// Buy a listed photo; `false` if the buyer already owned a license
    ///
    /// # Errors
    /// Unknown photo, the buyer's own photo, or a photo not for sale
    pub fn purchase(&self, buyer: &Account, id: PhotoId) -> Result<bool, PipelineError> {
        let photo = self.get(id)?;
        if photo.is_owned_by(buyer.id) {
            return Err(PipelineError::OwnPhoto);
        }
        if !photo.is_listed() {
            return Err(PipelineError::NotForSale(id));
        }
        let granted = self.purchases.grant(buyer.id, id);
        if granted {
            info!(photo = %id, buyer = %buyer.id, price = photo.price, "photo purchased");
        }
        Ok(granted)
    }
}

fn build_record(
    account: &Account,
    rules: &UploadRules,
    item: &Accepted,
    derivation: &Derivation,
    meta: &PhotoMetadata,
    processed: StoredArtifact,
    original: Option<StoredArtifact>,
) -> PhotoRecord {
    let title = if meta.title.trim().is_empty() {
        file_stem(&item.file.filename)
    } else {
        meta.title.trim().to_string()
    };
    PhotoRecord {
        id: PhotoId::new(),
        owner: account.id,
        title,
        category: meta.category.clone(),
        tags: meta.tags.clone(),
        price: meta.price,
        royalty_percent: DEFAULT_ROYALTY_PERCENT,
        watermark: derivation.watermarked,
        processed,
        original,
        bytes_size: if rules.is_metered() { item.file.len() } else { 0 },
        competition_entry: meta.competition_entry,
        created_at: Utc::now(),
    }
}

fn file_stem(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled")
        .to_string()
}
