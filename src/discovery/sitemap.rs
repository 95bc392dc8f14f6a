use std::sync::LazyLock;
use std::time::Duration;
use regex::Regex;
use crate::errors::AuditError;

static LOC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<loc>\s*([^<]+?)\s*</loc>").expect("static regex")
});

/// `{base}/sitemap.xml`, ignoring a trailing slash on the base.
pub fn sitemap_url(base_url: &str) -> String {
    format!("{}/sitemap.xml", base_url.trim_end_matches('/'))
}

/// Extract `<loc>` entries from a complete `<urlset>` document. Sitemap
/// indexes, other documents and truncated bodies yield `None`.
pub fn parse_sitemap(xml: &str) -> Option<Vec<String>> {
    let open = xml.find("<urlset")?;
    let close = xml.rfind("</urlset>")?;
    if close < open {
        return None;
    }
    let xml = &xml[open..close];
    Some(
        LOC_RE
            .captures_iter(xml)
            .map(|c| decode_entities(&c[1]))
            .collect(),
    )
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

/// Fetch and parse the sitemap. Only an HTTP 200 `<urlset>` counts.
pub async fn fetch_sitemap(
    http: &reqwest::Client,
    base_url: &str,
    timeout: Duration,
) -> Result<Vec<String>, AuditError> {
    let url = sitemap_url(base_url);
    let response = http.get(&url).timeout(timeout).send().await?;
    if response.status() != reqwest::StatusCode::OK {
        return Err(AuditError::NotFound(format!("{} returned {}", url, response.status())));
    }
    let body = response.text().await?;
    parse_sitemap(&body)
        .ok_or_else(|| AuditError::InvalidTarget(format!("{} is not a complete <urlset> sitemap", url)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sitemap_url_trims_slash() {
        assert_eq!(sitemap_url("https://example.test/"), "https://example.test/sitemap.xml");
        assert_eq!(sitemap_url("https://example.test"), "https://example.test/sitemap.xml");
    }

    #[test]
    fn test_parse_urlset() {
        let xml = r#"<?xml version="1.0"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.test/</loc></url>
  <url><loc>
     https://example.test/pricing?a=1&amp;b=2
  </loc></url>
</urlset>"#;
        let locs = parse_sitemap(xml).unwrap();
        assert_eq!(locs, vec!["https://example.test/", "https://example.test/pricing?a=1&b=2"]);
    }

    #[test]
    fn test_parse_rejects_non_urlset() {
        assert!(parse_sitemap("<sitemapindex><sitemap><loc>x</loc></sitemap></sitemapindex>").is_none());
        assert!(parse_sitemap("<html>not found</html>").is_none());
    }

    #[test]
    fn test_parse_rejects_truncated_urlset() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url><loc>https://example.test/</loc></url>
  <url><loc>https://example.test/pri"#;
        assert!(parse_sitemap(xml).is_none());
        assert!(parse_sitemap("</urlset><urlset><url><loc>https://example.test/</loc></url>").is_none());
    }

    #[test]
    fn test_locs_outside_urlset_are_ignored() {
        let xml = "<!-- <loc>https://example.test/old</loc> --><urlset><url><loc>https://example.test/</loc></url></urlset>";
        assert_eq!(parse_sitemap(xml).unwrap(), vec!["https://example.test/"]);
    }
}
