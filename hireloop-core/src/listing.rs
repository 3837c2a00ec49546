//! Listing identity, raw-card normalization and page classification.
use crate::metadata::derive_metadata;
use crate::model::{ListingRecord, PageType};
use hireloop_config::SiteProfile;
use hireloop_drivers::RawListing;
use std::fmt::Write as _;
use url::Url;

/// Scheme, lowercase host and path without a trailing slash, plus the query
/// parameters named in `keep_query` sorted by key. Every other parameter and
/// the fragment are dropped. `None` for anything that is not an absolute
/// http(s) URL.
pub fn canonical_link(raw: &str, keep_query: &[String]) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let mut out = format!("{}://{host}{port}{path}", url.scheme());

    let mut kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, v)| !v.is_empty() && keep_query.iter().any(|key| key == k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if !kept.is_empty() {
        kept.sort();
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        out.push('?');
        out.push_str(&query);
    }
    Some(out)
}

fn normalize_part(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// `listing:` + hex of the first 16 bytes of the blake3 digest of the
/// normalized title, employer and location.
pub fn composite_identity(title: &str, employer: &str, location: &str) -> String {
    let material = format!(
        "{}|{}|{}",
        normalize_part(title),
        normalize_part(employer),
        normalize_part(location)
    );
    let digest = blake3::hash(material.as_bytes());
    let mut out = String::with_capacity(8 + 32);
    out.push_str("listing:");
    for byte in &digest.as_bytes()[..16] {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub fn listing_identity(
    link: Option<&str>,
    keep_query: &[String],
    title: &str,
    employer: &str,
    location: &str,
) -> String {
    link.and_then(|l| canonical_link(l, keep_query))
        .unwrap_or_else(|| composite_identity(title, employer, location))
}

/// Turn a scraped card into a record. Relative links are resolved against
/// `base`. Cards without a title are dropped.
pub fn normalize_raw(
    raw: RawListing,
    base: Option<&Url>,
    keep_query: &[String],
) -> Option<ListingRecord> {
    let title = raw.title.trim().to_string();
    if title.is_empty() {
        return None;
    }
    let employer = raw.company.trim().to_string();
    let location = raw.location.trim().to_string();
    let short_description = raw.snippet.trim().to_string();

    let link = raw
        .link
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .and_then(|l| match Url::parse(&l) {
            Ok(url) => Some(url.to_string()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                base.and_then(|b| b.join(&l).ok()).map(|u| u.to_string())
            }
            Err(_) => None,
        });

    let identity = listing_identity(link.as_deref(), keep_query, &title, &employer, &location);
    let metadata = derive_metadata(&title, &location, &short_description);
    Some(ListingRecord {
        identity,
        title,
        employer,
        location,
        short_description,
        full_description: None,
        requirements: None,
        benefits: None,
        compensation: None,
        metadata,
        link,
    })
}

/// Classify `url` against the configured site.
pub fn classify_page(url: &str, site: &SiteProfile) -> PageType {
    if url.trim().is_empty() {
        return PageType::Unknown;
    }
    let Ok(parsed) = Url::parse(url.trim()) else {
        return PageType::Unknown;
    };
    let host = site.host.trim().to_ascii_lowercase();
    let on_site = parsed.host_str().is_some_and(|h| {
        let h = h.to_ascii_lowercase();
        h == host || h.ends_with(&format!(".{host}"))
    });
    if !on_site {
        return PageType::OffSite;
    }
    let path = parsed.path();
    if !site.search_path.is_empty() && path.contains(&site.search_path) {
        PageType::SearchResults
    } else if !site.detail_path.is_empty() && path.contains(&site.detail_path) {
        PageType::ListingDetail
    } else {
        PageType::OtherOnSite
    }
}
