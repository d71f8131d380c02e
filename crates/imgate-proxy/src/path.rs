use crate::error::{ProxyError, ProxyResult};
use imgate_core::StoredImageRecord;

/// Normalise the wildcard part of a proxy route to `/uploads/...`.
///
/// Accepts both `2024/05/a.webp` and `/uploads/2024/05/a.webp`.
pub fn normalize_request_path(param: &str) -> ProxyResult<String> {
    let rest = param.trim().trim_start_matches('/');
    let rest = rest.strip_prefix("uploads/").unwrap_or(rest);
    if rest.is_empty() || rest == "uploads" {
        return Err(ProxyError::BadRequest("empty image path".to_string()));
    }
    if rest.split('/').any(|segment| segment == "..") {
        return Err(ProxyError::BadRequest(param.to_string()));
    }
    Ok(format!("/uploads/{}", rest))
}

/// Pick the stored object a request resolves to.
///
/// An exact match on the thumbnail or the image wins; otherwise the thumbnail is preferred.
pub fn resolve_object_path(record: &StoredImageRecord, requested: &str) -> ProxyResult<String> {
    let path = if record.has_thumbnail() && record.thumbnail_url == requested {
        &record.thumbnail_url
    } else if record.url == requested {
        &record.url
    } else if record.has_thumbnail() {
        &record.thumbnail_url
    } else {
        &record.url
    };

    if path.is_empty() {
        return Err(ProxyError::NotFound(requested.to_string()));
    }
    Ok(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use imgate_core::StorageType;

    fn record(url: &str, thumbnail_url: &str) -> StoredImageRecord {
        StoredImageRecord {
            id: 1,
            url: url.to_string(),
            thumbnail_url: thumbnail_url.to_string(),
            file_name: "a.webp".to_string(),
            file_size: 10,
            mime_type: "image/webp".to_string(),
            width: 1,
            height: 1,
            storage: StorageType::Default,
            owner: Default::default(),
            fingerprint: String::new(),
            remote_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_request_path() {
        assert_eq!(
            normalize_request_path("/2024/05/a.webp").unwrap(),
            "/uploads/2024/05/a.webp"
        );
        assert_eq!(
            normalize_request_path("uploads/2024/05/a.webp").unwrap(),
            "/uploads/2024/05/a.webp"
        );
        assert!(matches!(normalize_request_path("/"), Err(ProxyError::BadRequest(_))));
        assert!(matches!(normalize_request_path(""), Err(ProxyError::BadRequest(_))));
        assert!(matches!(
            normalize_request_path("/2024/../../etc/passwd"),
            Err(ProxyError::BadRequest(_))
        ));
    }

    #[test]
    fn test_exact_matches_win() {
        let r = record("/uploads/2024/05/a.webp", "/uploads/2024/05/thumbnails/a.webp");
        assert_eq!(
            resolve_object_path(&r, "/uploads/2024/05/a.webp").unwrap(),
            "/uploads/2024/05/a.webp"
        );
        assert_eq!(
            resolve_object_path(&r, "/uploads/2024/05/thumbnails/a.webp").unwrap(),
            "/uploads/2024/05/thumbnails/a.webp"
        );
    }

    #[test]
    fn test_fallback_prefers_thumbnail() {
        let r = record("/uploads/2024/05/a.webp", "/uploads/2024/05/thumbnails/a.webp");
        assert_eq!(
            resolve_object_path(&r, "/uploads/other").unwrap(),
            "/uploads/2024/05/thumbnails/a.webp"
        );

        let r = record("/uploads/2024/05/a.webp", "");
        assert_eq!(
            resolve_object_path(&r, "/uploads/other").unwrap(),
            "/uploads/2024/05/a.webp"
        );
    }

    #[test]
    fn test_empty_record_is_not_found() {
        let r = record("", "");
        assert!(matches!(
            resolve_object_path(&r, "/uploads/x"),
            Err(ProxyError::NotFound(_))
        ));
    }
}
