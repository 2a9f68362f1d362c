//! Plan rules end to end: formats, batch limits, export quality, quotas

use async_trait::async_trait;
use clickscape_core::{
    BatchUpload, BlobStore, GateError, MemoryBlobStore, PhotoMetadata, PhotoPipeline,
    PipelineError, Quality, StoreError, UploadFile, Viewer,
};
use clickscape_plan::{CompetitionTier, Plan, PlanConfig};
use clickscape_test_utils::{
    entrant, free_account, jpeg_file, make_image_bytes, make_noisy_image_bytes, memory_pipeline,
    premium_account, test_config, upload_request,
};
use image::ImageFormat;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Memory store that refuses writes once its allowance is spent
#[derive(Debug)]
struct FlakyStore {
    inner: MemoryBlobStore,
    puts_left: AtomicUsize,
}

impl FlakyStore {
    fn new(puts: usize) -> Self {
        Self {
            inner: MemoryBlobStore::new(),
            puts_left: AtomicUsize::new(puts),
        }
    }

    fn allow(&self, puts: usize) {
        self.puts_left.store(puts, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, bytes: Arc<[u8]>) -> Result<(), StoreError> {
        let spent = self
            .puts_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err();
        if spent {
            return Err(StoreError::Io {
                key: key.to_string(),
                source: std::io::Error::other("disk full"),
            });
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Arc<[u8]>, StoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }
}

#[tokio::test]
async fn free_plan_restricts_file_types() {
    let (pipeline, _) = memory_pipeline(test_config());
    let account = free_account(1);

    pipeline
        .upload(&account, upload_request(jpeg_file("test.jpg"), "Sample"))
        .await
        .unwrap();

    let tiff = UploadFile::new("test.tiff", make_image_bytes(ImageFormat::Tiff, (800, 600), [120, 180, 200]));
    let err = pipeline
        .upload(&account, upload_request(tiff, "Sample"))
        .await
        .unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("Unsupported file type"));
}

#[tokio::test]
async fn premium_allows_tiff_and_larger_files() {
    let (pipeline, store) = memory_pipeline(test_config());
    let account = premium_account(2);

    let png = UploadFile::new("test.png", make_image_bytes(ImageFormat::Png, (1600, 1200), [120, 180, 200]));
    pipeline
        .upload(&account, upload_request(png, "Premium"))
        .await
        .unwrap();

    let tiff = UploadFile::new("scan.tif", make_image_bytes(ImageFormat::Tiff, (640, 480), [30, 60, 90]));
    let record = pipeline
        .upload(&account, upload_request(tiff, "Scan"))
        .await
        .unwrap();
    let original = record.original.as_ref().unwrap();
    assert_eq!(original.ext.as_str(), ".tif");
    // TIFF previews are re-encoded for the web.
    assert_eq!(record.processed.ext.as_str(), ".jpg");
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn free_size_limit_is_enforced() {
    let (pipeline, _) = memory_pipeline(test_config());
    let big = UploadFile::new("big.png", make_noisy_image_bytes(ImageFormat::Png, (1100, 1100)));
    assert!(big.len() > 3 * 1024 * 1024);

    let err = pipeline
        .upload(&free_account(1), upload_request(big.clone(), "Big"))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "File too large for free plan. Max 3 MB");

    // Well within premium's 25 MB.
    assert!(pipeline
        .upload(&premium_account(2), upload_request(big, "Big"))
        .await
        .is_ok());
}

#[tokio::test]
async fn batch_limit_is_enforced() {
    let (pipeline, store) = memory_pipeline(test_config());
    let batch = (0..2).fold(BatchUpload::new(PhotoMetadata::new("Batch")), |b, i| {
        b.with_file(jpeg_file(&format!("file{i}.jpg")))
    });

    let err = pipeline
        .upload_batch(&free_account(1), batch.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Rejected(GateError::BatchLimitExceeded { limit: 1, requested: 2, .. })
    ));
    assert!(store.is_empty());

    let records = pipeline.upload_batch(&premium_account(2), batch).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.title == "Batch"));
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let (pipeline, store) = memory_pipeline(test_config());
    let account = premium_account(2);
    let batch = BatchUpload::new(PhotoMetadata::new("Mixed"))
        .with_file(jpeg_file("ok.jpg"))
        .with_file(UploadFile::new("notes.txt", b"hello".to_vec()));

    let err = pipeline.upload_batch(&account, batch).await.unwrap_err();
    assert!(matches!(err, PipelineError::Rejected(GateError::UnsupportedFileType { .. })));
    assert!(store.is_empty());
    assert_eq!(pipeline.usage(&account).used_bytes, 0);
    assert!(pipeline.list(1, 10, None).unwrap().is_empty());
}

#[tokio::test]
async fn store_failure_mid_batch_rolls_back() {
    // Each premium file writes two blobs; the fourth put fails on the
    // second file's original.
    let store = Arc::new(FlakyStore::new(3));
    let pipeline =
        PhotoPipeline::new(test_config(), Arc::clone(&store) as Arc<dyn BlobStore>).unwrap();
    let account = entrant(2, Plan::Premium, CompetitionTier::Enthusiast, 2);
    let batch = || {
        BatchUpload::new(PhotoMetadata::new("Entries").as_competition_entry())
            .with_file(jpeg_file("a.jpg"))
            .with_file(jpeg_file("b.jpg"))
            .with_file(jpeg_file("c.jpg"))
    };

    let err = pipeline.upload_batch(&account, batch()).await.unwrap_err();
    assert!(matches!(err, PipelineError::Store(StoreError::Io { .. })));
    assert!(!err.is_client_error());
    assert!(store.inner.is_empty());
    assert_eq!(pipeline.usage(&account).used_bytes, 0);
    assert_eq!(pipeline.accountant().entries_used(account.id), 0);
    assert!(pipeline.list(1, 10, None).unwrap().is_empty());

    // Quota and all three entry slots are available again.
    store.allow(usize::MAX);
    let records = pipeline.upload_batch(&account, batch()).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.competition_entry));
    assert_eq!(store.inner.len(), 6);
    assert_eq!(pipeline.accountant().entries_used(account.id), 3);
}

#[tokio::test]
async fn entry_slots_bound_a_batch() {
    let (pipeline, store) = memory_pipeline(test_config());
    let account = entrant(3, Plan::Premium, CompetitionTier::Enthusiast, 1);
    let batch = BatchUpload::new(PhotoMetadata::new("Too many").as_competition_entry())
        .with_file(jpeg_file("a.jpg"))
        .with_file(jpeg_file("b.jpg"))
        .with_file(jpeg_file("c.jpg"));

    assert!(pipeline.upload_batch(&account, batch).await.is_err());
    assert!(store.is_empty());
    assert_eq!(pipeline.accountant().entries_used(account.id), 0);

    let batch = BatchUpload::new(PhotoMetadata::new("Two").as_competition_entry())
        .with_file(jpeg_file("a.jpg"))
        .with_file(jpeg_file("b.jpg"));
    assert_eq!(pipeline.upload_batch(&account, batch).await.unwrap().len(), 2);
    assert_eq!(pipeline.accountant().entries_used(account.id), 2);
}

#[tokio::test]
async fn export_quality_follows_plan() {
    let (pipeline, _) = memory_pipeline(test_config());

    let free = free_account(1);
    let photo = pipeline
        .upload(&free, upload_request(jpeg_file("x.jpg"), "X"))
        .await
        .unwrap();
    let export = pipeline.export(&Viewer::from(&free), photo.id).unwrap();
    assert_eq!(export.quality, Quality::Web);
    assert_eq!(export.url, photo.processed.url);

    let premium = premium_account(2);
    let photo = pipeline
        .upload(&premium, upload_request(jpeg_file("x.jpg"), "X"))
        .await
        .unwrap();
    let export = pipeline.export(&Viewer::from(&premium), photo.id).unwrap();
    assert_eq!(export.quality, Quality::High);
    assert_eq!(export.url, photo.original.unwrap().url);

    // A free viewer of a premium photo still gets the web copy.
    let export = pipeline.export(&Viewer::anonymous(), photo.id).unwrap();
    assert_eq!(export.quality, Quality::Web);
}

#[tokio::test]
async fn quota_is_enforced() {
    let config = test_config().with_plans(PlanConfig::default().with_premium_quota_mb(1));
    let (pipeline, _) = memory_pipeline(config);
    let account = premium_account(3);

    // Noise does not compress: each PNG is just over half a MiB.
    let first = UploadFile::new("ok.png", make_noisy_image_bytes(ImageFormat::Png, (420, 420)));
    let second = UploadFile::new("fail.png", make_noisy_image_bytes(ImageFormat::Png, (420, 420)));
    assert!(first.len() > 512 * 1024);

    let kept = pipeline
        .upload(&account, upload_request(first.clone(), "Ok"))
        .await
        .unwrap();
    assert_eq!(pipeline.usage(&account).used_bytes, first.len());

    let err = pipeline
        .upload(&account, upload_request(second.clone(), "Fail"))
        .await
        .unwrap_err();
    assert!(err.to_string().to_lowercase().contains("quota"));
    assert_eq!(pipeline.usage(&account).used_bytes, first.len());

    pipeline.delete(&account, kept.id).await.unwrap();
    assert_eq!(pipeline.usage(&account).used_bytes, 0);
    assert!(pipeline
        .upload(&account, upload_request(second, "Retry"))
        .await
        .is_ok());
}

#[tokio::test]
async fn seeded_usage_counts_against_quota() {
    let config = test_config().with_plans(PlanConfig::default().with_premium_quota_mb(1));
    let (pipeline, _) = memory_pipeline(config);
    let account = premium_account(4);
    pipeline.accountant().seed(account.id, 1024 * 1024 - 100);

    let err = pipeline
        .upload(&account, upload_request(jpeg_file("late.jpg"), "Late"))
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "quota_exceeded");
    assert_eq!(pipeline.usage(&account).remaining_bytes(), 100);
}
