//! imgate core library
//!
//! Domain models, settings, configuration, error types and telemetry shared by the
//! processing, storage and proxy crates.

pub mod config;
pub mod error;
pub mod models;
pub mod settings;
pub mod storage_types;
pub mod telemetry;

// Re-export commonly used types
pub use config::GlobalConfig;
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use models::{StoredImageRecord, TelegramFileRecord, UploadResult};
pub use settings::{
    CustomApiSettings, FtpSettings, RefererSettings, S3Settings, Settings, TelegramSettings,
    WatermarkSettings, WebDavSettings,
};
pub use storage_types::StorageType;
