//! Testing utilities for the ClickScape workspace
//!
//! Shared fixtures: encoded test images, accounts on each plan, and
//! pipelines over memory or a temporary uploads directory.

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]

use clickscape_core::{
    Account, BlobStore, MemoryBlobStore, PhotoMetadata, PhotoPipeline, PipelineConfig, UploadFile,
    UploadRequest, UserId,
};
use clickscape_plan::{CompetitionTier, Participation, Plan};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

pub const TEST_SECRET: &str = "test-download-secret";

/// Solid-colour image encoded as `format`
pub fn make_image_bytes(format: ImageFormat, size: (u32, u32), color: [u8; 3]) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(size.0, size.1, Rgb(color)));
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// Noisy image encoded as `format`; compresses poorly, so sizes are
/// predictable enough for quota tests
pub fn make_noisy_image_bytes(format: ImageFormat, size: (u32, u32)) -> Vec<u8> {
    let mut state: u32 = 0x9E37_79B9;
    let image = RgbImage::from_fn(size.0, size.1, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image).write_to(&mut out, format).unwrap();
    out.into_inner()
}

/// 800x600 JPEG upload named `name`
pub fn jpeg_file(name: &str) -> UploadFile {
    UploadFile::new(name, make_image_bytes(ImageFormat::Jpeg, (800, 600), [120, 180, 200]))
}

pub fn upload_request(file: UploadFile, title: &str) -> UploadRequest {
    UploadRequest::new(file, PhotoMetadata::new(title).with_category("test"))
}

pub fn free_account(id: u64) -> Account {
    Account::new(UserId(id), Plan::Free)
}

pub fn premium_account(id: u64) -> Account {
    Account::new(UserId(id), Plan::Premium)
}

/// Account with a paid competition entry
pub fn entrant(id: u64, plan: Plan, tier: CompetitionTier, addon_slots: u32) -> Account {
    Account::new(UserId(id), plan)
        .with_participation(Participation::new(tier).paid().with_addon_slots(addon_slots))
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig::default().with_download_secret(TEST_SECRET)
}

/// Pipeline over an in-memory store; the store is returned for inspection
pub fn memory_pipeline(config: PipelineConfig) -> (PhotoPipeline, Arc<MemoryBlobStore>) {
    let store = Arc::new(MemoryBlobStore::new());
    let pipeline = PhotoPipeline::new(config, Arc::clone(&store) as Arc<dyn BlobStore>).unwrap();
    (pipeline, store)
}

/// Pipeline writing to a fresh temporary uploads directory
pub async fn temp_pipeline(config: PipelineConfig) -> (TempDir, PhotoPipeline) {
    let dir = tempfile::tempdir().unwrap();
    let config = config.with_upload_dir(dir.path().join("uploads"));
    let pipeline = PhotoPipeline::open(config).await.unwrap();
    (dir, pipeline)
}
