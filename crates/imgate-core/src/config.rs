//! Configuration module
//!
//! Process-level configuration read once from the environment. Per-request policy lives in
//! [`crate::settings::Settings`] instead.

use std::env;
use std::path::PathBuf;

const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
const DEFAULT_ALLOWED_TYPES: &str = "image/jpeg,image/png,image/gif,image/webp";

#[derive(Clone, Debug)]
pub struct GlobalConfig {
    pub environment: String,
    pub max_file_size: usize,
    pub allowed_types: Vec<String>,
    /// Root directory the local backend writes `uploads/` under.
    pub upload_root: PathBuf,
    /// Extra directory searched for watermark fonts.
    pub font_dir: Option<PathBuf>,
    pub log_json: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            max_file_size: MAX_FILE_SIZE,
            allowed_types: split_list(DEFAULT_ALLOWED_TYPES),
            upload_root: PathBuf::from("."),
            font_dir: None,
            log_json: false,
        }
    }
}

impl GlobalConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let max_file_size = env::var("MAX_FILE_SIZE")
            .unwrap_or_else(|_| MAX_FILE_SIZE.to_string())
            .parse::<usize>()
            .unwrap_or(MAX_FILE_SIZE);

        let allowed_types = split_list(
            &env::var("ALLOWED_TYPES").unwrap_or_else(|_| DEFAULT_ALLOWED_TYPES.to_string()),
        );

        let upload_root = env::var("UPLOAD_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let font_dir = env::var("FONT_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let log_json = env::var("LOG_JSON")
            .ok()
            .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok());

        let mut config = GlobalConfig {
            environment,
            max_file_size,
            allowed_types,
            upload_root,
            font_dir,
            log_json: false,
        };
        // JSON logs by default in production.
        config.log_json = log_json.unwrap_or_else(|| config.is_production());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.max_file_size == 0 {
            return Err(anyhow::anyhow!("MAX_FILE_SIZE must be greater than zero"));
        }
        if self.allowed_types.is_empty() {
            return Err(anyhow::anyhow!("ALLOWED_TYPES must list at least one MIME type"));
        }
        Ok(())
    }

    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
