//! Runtime settings snapshot
//!
//! Settings are owned by an external persistence layer and handed to the core as an
//! immutable snapshot (typically `Arc<Settings>`) for the lifetime of one request.

use crate::storage_types::StorageType;
use serde::{Deserialize, Serialize};

const DEFAULT_WATERMARK_TEXT: &str = "imgate";
const DEFAULT_WATERMARK_POSITION: &str = "bottom-right";
const DEFAULT_WATERMARK_SIZE: u32 = 10;
const DEFAULT_WATERMARK_COLOR: &str = "#000000";
const DEFAULT_WATERMARK_OPACITY: f64 = 0.5;
const DEFAULT_FTP_PORT: u16 = 21;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Keep the uploaded bytes instead of compressing them.
    pub original_image: bool,
    /// Convert foreign formats to webp.
    pub save_webp: bool,
    /// Generate and store a thumbnail next to the main object.
    pub thumbnail: bool,
    pub watermark: WatermarkSettings,
    pub referer: RefererSettings,
    pub storage_type: StorageType,
    pub s3: S3Settings,
    pub webdav: WebDavSettings,
    pub ftp: FtpSettings,
    pub telegram: TelegramSettings,
    pub custom_api: CustomApiSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            original_image: false,
            save_webp: true,
            thumbnail: true,
            watermark: WatermarkSettings::default(),
            referer: RefererSettings::default(),
            storage_type: StorageType::Default,
            s3: S3Settings::default(),
            webdav: WebDavSettings::default(),
            ftp: FtpSettings::default(),
            telegram: TelegramSettings::default(),
            custom_api: CustomApiSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkSettings {
    pub enable: bool,
    pub text: String,
    pub position: String,
    /// Percentage of the shorter image side, capped at 10%.
    pub size: u32,
    pub color: String,
    pub opacity: f64,
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            enable: false,
            text: DEFAULT_WATERMARK_TEXT.to_string(),
            position: DEFAULT_WATERMARK_POSITION.to_string(),
            size: DEFAULT_WATERMARK_SIZE,
            color: DEFAULT_WATERMARK_COLOR.to_string(),
            opacity: DEFAULT_WATERMARK_OPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RefererSettings {
    pub enable: bool,
    /// Comma separated domain list.
    pub white_list: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDavSettings {
    pub url: String,
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FtpSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub pass: String,
}

impl Default for FtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_FTP_PORT,
            user: String::new(),
            pass: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramSettings {
    pub bot_token: String,
    /// Comma separated chat ids.
    pub receivers: String,
    /// Send an upload notification to every receiver.
    pub notice: bool,
    pub notice_text: String,
}

impl TelegramSettings {
    pub fn receivers_list(&self) -> Vec<String> {
        self.receivers
            .split(',')
            .map(|r| r.trim())
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomApiSettings {
    pub url: String,
    pub key: String,
    /// Optional delete URL template with `{id}` or `{hash}` placeholders.
    pub delete_url: String,
}

impl Settings {
    /// Whether the credential block for the selected storage type is complete.
    pub fn is_valid_storage_config(&self) -> bool {
        let filled = |s: &str| !s.trim().is_empty();
        match self.storage_type {
            StorageType::Default => true,
            StorageType::S3 | StorageType::R2 => {
                filled(&self.s3.endpoint)
                    && filled(&self.s3.access_key)
                    && filled(&self.s3.secret_key)
                    && filled(&self.s3.bucket)
            }
            StorageType::WebDav => filled(&self.webdav.url),
            StorageType::Ftp => filled(&self.ftp.host),
            StorageType::Telegram => {
                filled(&self.telegram.bot_token) && !self.telegram.receivers_list().is_empty()
            }
            StorageType::Custom => filled(&self.custom_api.url),
        }
    }
}
