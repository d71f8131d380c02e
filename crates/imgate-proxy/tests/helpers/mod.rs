//! Shared fixtures for the proxy integration tests.
//!
//! Run from workspace root: `cargo test -p imgate-proxy`.

#![allow(dead_code)]

use chrono::Utc;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use imgate_core::{StorageType, StoredImageRecord};
use imgate_processing::{ImageService, ImageValidator};
use imgate_proxy::InMemoryRecordStore;
use imgate_storage::StorageDeps;
use rand::Rng;
use std::sync::Arc;
use tempfile::TempDir;

pub const MIB: usize = 1024 * 1024;

/// Owned resources for one test: upload root, record store and backend collaborators.
pub struct TestEnv {
    pub dir: TempDir,
    pub records: Arc<InMemoryRecordStore>,
    pub deps: StorageDeps,
    pub images: Arc<ImageService>,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let deps = StorageDeps::new(dir.path());
        Self {
            dir,
            records: Arc::new(InMemoryRecordStore::new()),
            deps,
            images: Arc::new(ImageService::default()),
        }
    }

    pub fn with_telegram_api(mut self, api_base: &str) -> Self {
        self.deps = self.deps.with_telegram_api_base(api_base);
        self
    }
}

pub fn validator() -> ImageValidator {
    ImageValidator::new(
        10 * MIB as u64,
        vec![
            "image/jpeg".to_string(),
            "image/png".to_string(),
            "image/gif".to_string(),
            "image/webp".to_string(),
        ],
    )
}

/// Gradient with per-pixel noise, encoded at quality 100 so the file stays large.
pub fn noisy_jpeg(width: u32, height: u32) -> Vec<u8> {
    let mut rng = rand::rng();
    let img = RgbImage::from_fn(width, height, |x, y| {
        let base = [
            (x * 255 / width) as i16,
            (y * 255 / height) as i16,
            ((x + y) * 127 / (width + height)) as i16,
        ];
        let mut px = [0u8; 3];
        for (channel, value) in px.iter_mut().zip(base) {
            let noise: i16 = rng.random_range(-40..=40);
            *channel = (value + noise).clamp(0, 255) as u8;
        }
        Rgb(px)
    });

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 100))
        .expect("encode jpeg");
    out
}

pub fn record(id: i64, storage: StorageType, file_name: &str) -> StoredImageRecord {
    StoredImageRecord {
        id,
        url: format!("/uploads/2024/05/{}", file_name),
        thumbnail_url: format!("/uploads/2024/05/thumbnails/{}", file_name),
        file_name: file_name.to_string(),
        file_size: 4,
        mime_type: "image/webp".to_string(),
        width: 1,
        height: 1,
        storage,
        owner: Default::default(),
        fingerprint: String::new(),
        remote_id: None,
        created_at: Utc::now(),
    }
}
