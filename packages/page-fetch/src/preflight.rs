//! Pre-flight URL filtering and normalization.
//!
//! Rejects URLs that are never worth a request: local hosts, placeholder
//! domains, obvious error pages, search result pages and non-HTML assets.

use std::net::IpAddr;

use url::Url;

use crate::error::SkipReason;

const TEST_DOMAIN_SUFFIXES: &[&str] = &[
    ".test",
    ".local",
    ".localhost",
    ".invalid",
    ".example",
    ".internal",
];

const PLACEHOLDER_HOSTS: &[&str] = &["example.com", "example.org", "example.net"];

const NOT_FOUND_PATH_PATTERNS: &[&str] = &[
    "/404",
    "/not-found",
    "/notfound",
    "/page-not-found",
    "/error/404",
    "/errors/404",
];

const SEARCH_ENGINE_HOSTS: &[(&str, &str)] = &[
    ("google.", "/search"),
    ("bing.com", "/search"),
    ("search.yahoo.com", "/search"),
    ("yandex.", "/search"),
    ("baidu.com", "/s"),
];

const NON_HTML_EXTENSIONS: &[&str] = &[
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", ".ico", ".css", ".js", ".json",
    ".xml", ".zip", ".gz", ".tar", ".rar", ".7z", ".exe", ".dmg", ".mp3", ".mp4", ".mov",
    ".avi", ".webm", ".doc", ".docx", ".xls", ".xlsx", ".ppt", ".pptx", ".csv",
];

/// Normalize a URL to scheme + host + path (query and fragment stripped,
/// trailing slash trimmed). Adds `https://` when no scheme is present.
pub fn normalize_url(raw: &str) -> Option<String> {
    let raw = raw.trim();
    let with_scheme = if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else if raw.contains("://") {
        return None;
    } else {
        format!("https://{}", raw)
    };

    let mut url = Url::parse(&with_scheme).ok()?;
    url.host_str()?;
    url.set_query(None);
    url.set_fragment(None);
    let _ = url.set_username("");
    let _ = url.set_password(None);

    let path = url.path().trim_end_matches('/').to_string();
    url.set_path(if path.is_empty() { "/" } else { &path });

    Some(url.to_string())
}

/// Domain of a URL without a leading `www.`.
pub fn domain_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Check a URL against the skip rules. Returns the parsed URL when it should
/// be fetched.
pub fn check(raw: &str) -> Result<Url, SkipReason> {
    let url = Url::parse(raw.trim()).map_err(|_| SkipReason::InvalidUrl)?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SkipReason::UnsupportedScheme);
    }

    let host = url
        .host_str()
        .ok_or(SkipReason::InvalidUrl)?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase();

    if is_local_host(&host) {
        return Err(SkipReason::LocalHost);
    }
    if is_test_domain(&host) {
        return Err(SkipReason::TestDomain);
    }
    if is_search_results_page(&host, &url) {
        return Err(SkipReason::SearchResultsPage);
    }

    let path = url.path().to_lowercase();
    if is_not_found_path(&path) {
        return Err(SkipReason::NotFoundPath);
    }
    if has_non_html_extension(&path) {
        return Err(SkipReason::NonHtmlExtension);
    }

    Ok(url)
}

fn is_local_host(host: &str) -> bool {
    if host == "localhost" || host == "0.0.0.0" {
        return true;
    }
    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => ip.is_loopback() || ip.is_private() || ip.is_link_local(),
        Ok(IpAddr::V6(ip)) => ip.is_loopback() || ip.is_unspecified(),
        Err(_) => false,
    }
}

fn is_test_domain(host: &str) -> bool {
    let bare = host.strip_prefix("www.").unwrap_or(host);
    PLACEHOLDER_HOSTS.contains(&bare)
        || TEST_DOMAIN_SUFFIXES
            .iter()
            .any(|suffix| host.ends_with(suffix))
}

fn is_search_results_page(host: &str, url: &Url) -> bool {
    if host.ends_with("duckduckgo.com") && url.query_pairs().any(|(k, _)| k == "q") {
        return true;
    }
    SEARCH_ENGINE_HOSTS.iter().any(|(needle, path)| {
        host.contains(needle) && (url.path() == *path || url.path().starts_with(&format!("{}/", path)))
    })
}

fn is_not_found_path(path: &str) -> bool {
    let trimmed = path.trim_end_matches('/');
    NOT_FOUND_PATH_PATTERNS.iter().any(|pattern| {
        trimmed == *pattern
            || trimmed.ends_with(pattern)
            || trimmed.starts_with(&format!("{}.", pattern))
            || trimmed.contains(&format!("{}/", pattern))
    })
}

fn has_non_html_extension(path: &str) -> bool {
    NON_HTML_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_query_and_fragment() {
        assert_eq!(
            normalize_url("https://Docs.Rust-Lang.org/book/?utm_source=x#intro").as_deref(),
            Some("https://docs.rust-lang.org/book")
        );
    }

    #[test]
    fn test_normalize_adds_scheme() {
        assert_eq!(
            normalize_url("rust-lang.org/learn").as_deref(),
            Some("https://rust-lang.org/learn")
        );
        assert_eq!(
            normalize_url("https://rust-lang.org").as_deref(),
            Some("https://rust-lang.org/")
        );
    }

    #[test]
    fn test_normalize_rejects_other_schemes() {
        assert_eq!(normalize_url("ftp://files.rust-lang.org/x"), None);
        assert_eq!(normalize_url("not a url at all"), None);
    }

    #[test]
    fn test_domain_of_strips_www() {
        assert_eq!(
            domain_of("https://www.nytimes.com/2024/a").as_deref(),
            Some("nytimes.com")
        );
    }

    #[test]
    fn test_skips_local_and_test_hosts() {
        assert_eq!(check("http://localhost:3000/a"), Err(SkipReason::LocalHost));
        assert_eq!(check("http://127.0.0.1/a"), Err(SkipReason::LocalHost));
        assert_eq!(check("http://192.168.1.10/a"), Err(SkipReason::LocalHost));
        assert_eq!(check("https://shop.test/a"), Err(SkipReason::TestDomain));
        assert_eq!(check("https://www.example.com/a"), Err(SkipReason::TestDomain));
    }

    #[test]
    fn test_skips_error_pages() {
        assert_eq!(check("https://acme.io/404"), Err(SkipReason::NotFoundPath));
        assert_eq!(check("https://acme.io/404.html"), Err(SkipReason::NotFoundPath));
        assert_eq!(
            check("https://acme.io/page-not-found/"),
            Err(SkipReason::NotFoundPath)
        );
        assert!(check("https://acme.io/blog/4040-tips").is_ok());
    }

    #[test]
    fn test_skips_search_pages() {
        assert_eq!(
            check("https://www.google.com/search?q=rust"),
            Err(SkipReason::SearchResultsPage)
        );
        assert_eq!(
            check("https://duckduckgo.com/?q=rust"),
            Err(SkipReason::SearchResultsPage)
        );
        assert_eq!(
            check("https://www.bing.com/search?q=rust"),
            Err(SkipReason::SearchResultsPage)
        );
        assert!(check("https://blog.google/products/search").is_ok());
    }

    #[test]
    fn test_skips_assets() {
        assert_eq!(
            check("https://acme.io/whitepaper.PDF"),
            Err(SkipReason::NonHtmlExtension)
        );
        assert_eq!(
            check("https://acme.io/logo.png"),
            Err(SkipReason::NonHtmlExtension)
        );
        assert!(check("https://acme.io/pricing").is_ok());
    }

    #[test]
    fn test_rejects_unsupported_scheme() {
        assert_eq!(
            check("mailto:hello@acme.io"),
            Err(SkipReason::UnsupportedScheme)
        );
        assert_eq!(check("::::"), Err(SkipReason::InvalidUrl));
    }
}
