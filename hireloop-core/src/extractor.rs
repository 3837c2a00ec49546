//! Listing and detail extraction on top of the page surface.
use crate::listing::normalize_raw;
use crate::metadata::derive_metadata;
use crate::model::ListingRecord;
use crate::retry::RetryPolicy;
use hireloop_drivers::{
    decode, ListingsReply, PageSurface, RawDetail, SurfaceError, SurfaceRequest, TabId,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub detail_attempts: u32,
    pub min_description_chars: usize,
    pub detail_retry_delay: Duration,
    pub open_listing_settle: Duration,
    /// Base for resolving relative listing links.
    pub base_url: Option<Url>,
    pub identity_query_keys: Vec<String>,
}

impl ExtractorConfig {
    pub fn from_config(config: &hireloop_config::HireloopConfig) -> Self {
        let o = &config.orchestrator;
        Self {
            detail_attempts: o.detail_attempts,
            min_description_chars: o.min_description_chars,
            detail_retry_delay: Duration::from_millis(o.detail_retry_delay_ms),
            open_listing_settle: Duration::from_millis(o.open_listing_settle_ms),
            base_url: Url::parse(&config.browser.site.start_url).ok(),
            identity_query_keys: config.browser.site.identity_query_keys.clone(),
        }
    }
}

/// One listings pass: how many cards the page showed and which of them
/// are new.
#[derive(Debug, Clone, Default)]
pub struct ListingsPage {
    pub scraped: usize,
    pub listings: Vec<ListingRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailQuality {
    Complete,
    Degraded,
}

#[derive(Debug, Clone)]
pub struct DetailOutcome {
    pub record: ListingRecord,
    pub quality: DetailQuality,
    pub attempts: u32,
}

pub struct ContentExtractor {
    surface: Arc<dyn PageSurface>,
    config: ExtractorConfig,
    retry: RetryPolicy,
    session_seen: HashSet<String>,
}

impl ContentExtractor {
    pub fn new(surface: Arc<dyn PageSurface>, config: ExtractorConfig, retry: RetryPolicy) -> Self {
        Self {
            surface,
            config,
            retry,
            session_seen: HashSet::new(),
        }
    }

    /// Listings on the current page that are new to this session and not in
    /// `processed`.
    pub async fn extract_listings(
        &mut self,
        tab: &TabId,
        processed: &HashSet<String>,
    ) -> Result<Vec<ListingRecord>, SurfaceError> {
        Ok(self.extract_page(tab, processed).await?.listings)
    }

    /// Like [`ContentExtractor::extract_listings`], also reporting the raw
    /// card count so callers can tell an empty page from a seen one.
    pub async fn extract_page(
        &mut self,
        tab: &TabId,
        processed: &HashSet<String>,
    ) -> Result<ListingsPage, SurfaceError> {
        let raw = self
            .retry
            .run("extract_listings", || {
                self.surface.send(tab, SurfaceRequest::ExtractListings)
            })
            .await?;
        let reply: ListingsReply = decode(raw)?;
        let scraped = reply.listings.len();

        let mut malformed = 0usize;
        let mut duplicates = 0usize;
        let mut out = Vec::new();
        for raw in reply.listings {
            let Some(record) = normalize_raw(
                raw,
                self.config.base_url.as_ref(),
                &self.config.identity_query_keys,
            ) else {
                malformed += 1;
                continue;
            };
            if processed.contains(&record.identity) || !self.session_seen.insert(record.identity.clone()) {
                duplicates += 1;
                continue;
            }
            out.push(record);
        }

        if malformed > 0 {
            warn!(%tab, malformed, "extractor.listings.malformed");
        }
        info!(%tab, scraped, new = out.len(), duplicates, "extractor.listings");
        Ok(ListingsPage {
            scraped,
            listings: out,
        })
    }

    pub async fn open_listing(&self, tab: &TabId, link: &str) -> Result<(), SurfaceError> {
        self.retry
            .run("open_listing", || {
                self.surface.send(
                    tab,
                    SurfaceRequest::OpenListing {
                        link: link.to_string(),
                    },
                )
            })
            .await?;
        tokio::time::sleep(self.config.open_listing_settle).await;
        Ok(())
    }

    /// Enrich `record` from the open detail page.
    ///
    /// Each attempt re-extracts; between attempts the page is asked to expand
    /// its description and given a moment to render. When attempts run out
    /// the best text seen so far is kept and the outcome is `Degraded`.
    /// Only a closed or unreachable tab is an error.
    pub async fn extract_detail(
        &self,
        tab: &TabId,
        record: &ListingRecord,
    ) -> Result<DetailOutcome, SurfaceError> {
        let attempts = self.config.detail_attempts.max(1);
        let mut enriched = record.clone();

        for attempt in 1..=attempts {
            let detail = self
                .retry
                .run("extract_detail", || {
                    self.surface.send(tab, SurfaceRequest::ExtractDetail)
                })
                .await
                .and_then(decode::<RawDetail>);

            match detail {
                Ok(detail) => merge_detail(&mut enriched, detail),
                Err(e @ (SurfaceError::TabClosed(_) | SurfaceError::Disconnected(_))) => {
                    return Err(e);
                }
                Err(e) => debug!(%tab, attempt, error = %e, "extractor.detail.attempt_failed"),
            }

            let chars = enriched
                .full_description
                .as_deref()
                .map(|d| d.trim().chars().count())
                .unwrap_or(0);
            if chars >= self.config.min_description_chars {
                debug!(%tab, attempt, chars, "extractor.detail.complete");
                return Ok(self.finish(enriched, DetailQuality::Complete, attempt));
            }

            if attempt < attempts {
                if let Err(e) = self.surface.send(tab, SurfaceRequest::ExpandDetail).await {
                    debug!(%tab, attempt, error = %e, "extractor.detail.expand_failed");
                }
                tokio::time::sleep(self.config.detail_retry_delay).await;
            }
        }

        warn!(%tab, identity = %record.identity, attempts, "extractor.detail.degraded");
        Ok(self.finish(enriched, DetailQuality::Degraded, attempts))
    }

    fn finish(&self, mut record: ListingRecord, quality: DetailQuality, attempts: u32) -> DetailOutcome {
        record.metadata = derive_metadata(&record.title, &record.location, record.best_description());
        DetailOutcome {
            record,
            quality,
            attempts,
        }
    }

    /// Let `identity` be returned again by a later extraction.
    pub fn forget(&mut self, identity: &str) {
        self.session_seen.remove(identity);
    }

    /// Forget everything returned so far.
    pub fn reset_session(&mut self) {
        self.session_seen.clear();
    }

    pub fn seen_count(&self) -> usize {
        self.session_seen.len()
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

/// Keep the longest description seen; fill sections that are still empty.
fn merge_detail(record: &mut ListingRecord, detail: RawDetail) {
    let description = detail.description.trim();
    let longer = record
        .full_description
        .as_deref()
        .is_none_or(|current| description.chars().count() > current.chars().count());
    if !description.is_empty() && longer {
        record.full_description = Some(description.to_string());
    }
    if record.requirements.is_none() {
        record.requirements = non_blank(detail.requirements);
    }
    if record.benefits.is_none() {
        record.benefits = non_blank(detail.benefits);
    }
    if record.compensation.is_none() {
        record.compensation = non_blank(detail.compensation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ListingMetadata;

    fn record() -> ListingRecord {
        ListingRecord {
            identity: "id".into(),
            title: "Engineer".into(),
            employer: "Acme".into(),
            location: "Berlin".into(),
            short_description: String::new(),
            full_description: None,
            requirements: None,
            benefits: None,
            compensation: None,
            metadata: ListingMetadata::default(),
            link: None,
        }
    }

    #[test]
    fn merge_keeps_the_longest_description() {
        let mut r = record();
        merge_detail(
            &mut r,
            RawDetail {
                description: "a longer description".into(),
                requirements: Some("  ".into()),
                ..RawDetail::default()
            },
        );
        merge_detail(
            &mut r,
            RawDetail {
                description: "short".into(),
                requirements: Some("Rust".into()),
                compensation: Some("100k".into()),
                ..RawDetail::default()
            },
        );
        assert_eq!(r.full_description.as_deref(), Some("a longer description"));
        assert_eq!(r.requirements.as_deref(), Some("Rust"));
        assert_eq!(r.compensation.as_deref(), Some("100k"));
        assert!(r.benefits.is_none());
    }
}
