//! Hotlink protection
//!
//! A request passes when the referer is empty, points at the serving host (or a subdomain of
//! it), or matches a whitelisted domain (or a subdomain of one).

use http::header::{HOST, REFERER};
use http::HeaderMap;
use imgate_core::RefererSettings;
use reqwest::Url;

const FORWARDED_HOST: &str = "x-forwarded-host";

#[derive(Debug, Clone, Default)]
pub struct RefererPolicy {
    enabled: bool,
    white_list: Vec<String>,
}

impl RefererPolicy {
    pub fn new(enabled: bool, white_list: &str) -> Self {
        Self {
            enabled,
            white_list: white_list
                .split(',')
                .map(|d| d.trim().to_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
        }
    }

    pub fn from_settings(settings: &RefererSettings) -> Self {
        Self::new(settings.enable, &settings.white_list)
    }

    /// Disabled policies and empty whitelists let everything through.
    pub fn is_active(&self) -> bool {
        self.enabled && !self.white_list.is_empty()
    }

    /// Check the `Referer` of a request against the policy.
    pub fn check_headers(&self, headers: &HeaderMap) -> bool {
        if !self.is_active() {
            return true;
        }
        let referer = headers
            .get(REFERER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        self.allows(referer, &self_domain(headers))
    }

    pub fn allows(&self, referer: &str, self_domain: &str) -> bool {
        if !self.is_active() || referer.trim().is_empty() {
            return true;
        }

        let Some(host) = referer_host(referer) else {
            return false;
        };

        if !self_domain.is_empty() && is_same_or_subdomain(&host, self_domain) {
            return true;
        }

        self.white_list
            .iter()
            .any(|domain| is_same_or_subdomain(&host, domain))
    }
}

/// Host serving the request: `X-Forwarded-Host` over `Host`, port stripped, lowercased.
pub fn self_domain(headers: &HeaderMap) -> String {
    let host = headers
        .get(FORWARDED_HOST)
        .or_else(|| headers.get(HOST))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    host.split(':').next().unwrap_or_default().trim().to_lowercase()
}

/// Lowercased host of a referer, tolerating a missing scheme.
pub fn referer_host(referer: &str) -> Option<String> {
    let referer = referer.trim();
    let parsed = if referer.starts_with("http") {
        Url::parse(referer)
    } else {
        Url::parse(&format!("http://{}", referer))
    };

    parsed
        .ok()
        .and_then(|url| url.host_str().map(str::to_lowercase))
        .filter(|host| !host.is_empty())
}

fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn policy() -> RefererPolicy {
        RefererPolicy::new(true, "example.com, Partner.org ,")
    }

    #[test]
    fn test_empty_referer_allowed() {
        assert!(policy().allows("", "img.test"));
    }

    #[test]
    fn test_whitelist_and_subdomains() {
        let p = policy();
        assert!(p.allows("https://example.com/page", "img.test"));
        assert!(p.allows("https://blog.example.com/post", "img.test"));
        assert!(p.allows("partner.org/x", "img.test"));
        assert!(!p.allows("https://notexample.com/", "img.test"));
        assert!(!p.allows("https://evil.test/", "img.test"));
    }

    #[test]
    fn test_own_host_allowed() {
        assert!(policy().allows("https://img.test/gallery", "img.test"));
        assert!(policy().allows("https://cdn.img.test/", "img.test"));
    }

    #[test]
    fn test_inactive_policy_allows_everything() {
        assert!(RefererPolicy::new(false, "example.com").allows("https://evil.test", ""));
        assert!(RefererPolicy::new(true, " , ").allows("https://evil.test", ""));
    }

    #[test]
    fn test_self_domain_prefers_forwarded_host() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("internal:8080"));
        assert_eq!(self_domain(&headers), "internal");

        headers.insert(FORWARDED_HOST, HeaderValue::from_static("Img.Example.com:443"));
        assert_eq!(self_domain(&headers), "img.example.com");
    }

    #[test]
    fn test_check_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(HOST, HeaderValue::from_static("img.test"));
        headers.insert(REFERER, HeaderValue::from_static("https://evil.test/"));
        assert!(!policy().check_headers(&headers));

        headers.insert(REFERER, HeaderValue::from_static("https://www.example.com/"));
        assert!(policy().check_headers(&headers));
    }
}
