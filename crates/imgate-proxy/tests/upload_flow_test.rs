//! Upload through the default backend, then serve the result back through the proxy.

mod helpers;

use helpers::{noisy_jpeg, validator, TestEnv, MIB};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::HeaderMap;
use imgate_core::Settings;
use imgate_proxy::{ImageRecordStore, ProxyStreamer, UploadService};
use imgate_storage::FileInput;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn test_large_jpeg_becomes_smaller_webp_with_thumbnail() {
    let env = TestEnv::new();
    let input = noisy_jpeg(1600, 1600);
    assert!(input.len() > 2 * MIB, "fixture too small: {}", input.len());
    let input_len = input.len() as u64;

    let service = UploadService::new(env.images.clone(), validator(), env.deps.clone());
    let result = service
        .upload(
            Arc::new(Settings::default()),
            FileInput::from_bytes("photo.jpg", "image/jpeg", input),
            "alice",
        )
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mime_type, "image/webp");
    assert!(result.file_name.ends_with(".webp"));
    assert!(result.file_size < input_len);
    assert_eq!((result.width, result.height), (1600, 1600));
    assert!(result.has_thumbnail());

    let stored = env.dir.path().join(result.url.trim_start_matches('/'));
    assert_eq!(std::fs::metadata(&stored).unwrap().len(), result.file_size);

    let thumb = env
        .dir
        .path()
        .join(result.thumbnail_url.trim_start_matches('/'));
    let thumb = image::open(thumb).unwrap();
    assert!(thumb.width() <= 300 && thumb.height() <= 300);
}

#[tokio::test]
async fn test_uploaded_image_is_served_back() {
    let env = TestEnv::new();
    let service = UploadService::new(env.images.clone(), validator(), env.deps.clone());
    let result = service
        .upload(
            Arc::new(Settings::default()),
            FileInput::from_bytes("photo.jpg", "image/jpeg", noisy_jpeg(400, 300)),
            "alice",
        )
        .await
        .unwrap();

    let url = result.url.clone();
    let size = result.file_size;
    env.records
        .insert(result.into_record(1, Uuid::new_v4(), String::new()))
        .await;
    assert!(env.records.find_by_path(&url).await.unwrap().is_some());

    let proxy = ProxyStreamer::new(env.images.clone(), env.records.clone(), env.deps.clone());
    let response = proxy
        .serve(&url, Vec::<(String, String)>::new(), &HeaderMap::new(), &Settings::default())
        .await
        .unwrap();

    assert_eq!(response.headers[CONTENT_TYPE], "image/webp");
    assert_eq!(response.headers[CONTENT_LENGTH], size.to_string().as_str());
    let body = response.into_bytes().await.unwrap();
    assert_eq!(body.len() as u64, size);
}
