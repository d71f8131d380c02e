//! imgate storage backends
//!
//! One [`ImageUploader`] implementation per storage type, selected by [`create_uploader`].
//!
//! # Object layout
//!
//! Every backend that addresses objects by path uses the same layout:
//!
//! - **Image**: `uploads/{YYYY}/{MM}/{file_name}`
//! - **Thumbnail**: `uploads/{YYYY}/{MM}/thumbnails/{file_name}`
//!
//! The public URL is the key with a leading `/`. Telegram keeps the same URLs and maps the
//! file name to its message identifiers; the custom API returns its own absolute URL.

#[cfg(feature = "storage-custom")]
pub mod custom_api;
pub mod factory;
#[cfg(feature = "storage-ftp")]
pub mod ftp;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod retry;
#[cfg(feature = "storage-s3")]
pub mod s3;
#[cfg(feature = "storage-telegram")]
pub mod telegram;
pub mod traits;
#[cfg(feature = "storage-webdav")]
pub mod webdav;

// Re-export commonly used types
#[cfg(feature = "storage-custom")]
pub use custom_api::CustomApiUploader;
pub use factory::{create_uploader, StorageDeps};
#[cfg(feature = "storage-ftp")]
pub use ftp::FtpUploader;
pub use imgate_core::StorageType;
#[cfg(feature = "storage-local")]
pub use local::LocalUploader;
pub use retry::RetryPolicy;
#[cfg(feature = "storage-s3")]
pub use s3::S3Uploader;
#[cfg(feature = "storage-telegram")]
pub use telegram::{
    notify_upload, InMemoryTelegramIndex, TelegramClient, TelegramFileIndex, TelegramUploader,
};
pub use traits::{
    ByteStream, FetchedObject, FileInput, ImageUploader, StorageError, StorageResult,
    UploadContext,
};
#[cfg(feature = "storage-webdav")]
pub use webdav::WebDavUploader;
