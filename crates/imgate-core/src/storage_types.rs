use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backend types
///
/// The tag persisted on every stored image record. It selects the backend on upload
/// (from settings) and again on read/delete (from the record).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    #[default]
    Default,
    S3,
    R2,
    WebDav,
    Ftp,
    Telegram,
    Custom,
}

impl StorageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Default => "default",
            StorageType::S3 => "s3",
            StorageType::R2 => "r2",
            StorageType::WebDav => "webdav",
            StorageType::Ftp => "ftp",
            StorageType::Telegram => "telegram",
            StorageType::Custom => "custom",
        }
    }
}

impl FromStr for StorageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "default" | "local" => Ok(StorageType::Default),
            "s3" => Ok(StorageType::S3),
            "r2" => Ok(StorageType::R2),
            "webdav" => Ok(StorageType::WebDav),
            "ftp" => Ok(StorageType::Ftp),
            "telegram" => Ok(StorageType::Telegram),
            "custom" => Ok(StorageType::Custom),
            _ => Err(anyhow::anyhow!("Invalid storage type: {}", s)),
        }
    }
}

impl Display for StorageType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("WebDAV".parse::<StorageType>().unwrap(), StorageType::WebDav);
        assert_eq!(" r2 ".parse::<StorageType>().unwrap(), StorageType::R2);
        assert!("nfs".parse::<StorageType>().is_err());
    }

    #[test]
    fn test_display_matches_serde_tag() {
        for tag in [
            StorageType::Default,
            StorageType::S3,
            StorageType::R2,
            StorageType::WebDav,
            StorageType::Ftp,
            StorageType::Telegram,
            StorageType::Custom,
        ] {
            let json = serde_json::to_string(&tag).unwrap();
            assert_eq!(json, format!("\"{}\"", tag));
        }
    }
}
