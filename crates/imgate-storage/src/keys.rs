//! Shared object addressing for storage backends.
//!
//! Layout: `uploads/{YYYY}/{MM}/{name}` for the main object and
//! `uploads/{YYYY}/{MM}/thumbnails/{name}` for its thumbnail. Public URLs are the key with a
//! leading `/`. Persisted records depend on this layout.

use chrono::{DateTime, Datelike, Utc};

pub const UPLOAD_PREFIX: &str = "uploads";
pub const THUMBNAIL_DIR: &str = "thumbnails";

/// Keys for one upload, fixed at the moment the upload started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKeys {
    dir: String,
    file_name: String,
}

impl ObjectKeys {
    pub fn new(file_name: &str) -> Self {
        Self::at(Utc::now(), file_name)
    }

    pub fn at(now: DateTime<Utc>, file_name: &str) -> Self {
        Self {
            dir: format!("{}/{:04}/{:02}", UPLOAD_PREFIX, now.year(), now.month()),
            file_name: file_name.to_string(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn key(&self) -> String {
        format!("{}/{}", self.dir, self.file_name)
    }

    pub fn thumbnail_key(&self) -> String {
        format!("{}/{}/{}", self.dir, THUMBNAIL_DIR, self.file_name)
    }

    pub fn url(&self) -> String {
        format!("/{}", self.key())
    }

    pub fn thumbnail_url(&self) -> String {
        format!("/{}", self.thumbnail_key())
    }
}

/// Object key for a stored URL path.
pub fn key_from_url(url: &str) -> &str {
    url.trim_start_matches('/')
}

pub fn is_thumbnail_path(path: &str) -> bool {
    path.contains(&format!("/{}/", THUMBNAIL_DIR))
}

/// Last path segment, which is the unique file name for every layout above.
pub fn file_name_of(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_dated_layout() {
        let now = Utc.with_ymd_and_hms(2024, 3, 9, 12, 0, 0).unwrap();
        let keys = ObjectKeys::at(now, "1700000000000_abc123.webp");

        assert_eq!(keys.key(), "uploads/2024/03/1700000000000_abc123.webp");
        assert_eq!(
            keys.thumbnail_url(),
            "/uploads/2024/03/thumbnails/1700000000000_abc123.webp"
        );
        assert_eq!(key_from_url(&keys.url()), keys.key());
    }

    #[test]
    fn test_thumbnail_detection() {
        assert!(is_thumbnail_path("/uploads/2024/03/thumbnails/a.webp"));
        assert!(!is_thumbnail_path("/uploads/2024/03/a.webp"));
        assert_eq!(file_name_of("/uploads/2024/03/thumbnails/a.webp"), "a.webp");
    }
}
