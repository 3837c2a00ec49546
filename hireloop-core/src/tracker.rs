//! Registry of open tabs.
//!
//! The registry is a `DashMap` behind an `Arc`, so the run loop and the
//! control actor can hold clones of the same [`ResourceTracker`]. Entries
//! are removed the moment a tab is released; a closed tab is never tracked
//! again.
use crate::clock::Clock;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use hireloop_common::HireloopError;
use hireloop_drivers::{decode, PageSurface, PingReply, SurfaceError, SurfaceRequest, TabId};
use serde::Serialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TabStatus {
    Ready,
    Partial,
    NavigatedAway,
    ForcedNew,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabResource {
    pub id: TabId,
    pub current_url: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub status: TabStatus,
    pub forced: bool,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub start_url: String,
    pub ready_attempts: u32,
    pub ready_interval: Duration,
}

impl TrackerConfig {
    pub fn from_config(config: &hireloop_config::HireloopConfig) -> Self {
        Self {
            start_url: config.browser.site.start_url.clone(),
            ready_attempts: config.orchestrator.ready_attempts,
            ready_interval: config.orchestrator.ready_interval(),
        }
    }
}

const NO_ACTIVITY: i64 = i64::MIN;

#[derive(Clone)]
pub struct ResourceTracker {
    surface: Arc<dyn PageSurface>,
    clock: Arc<dyn Clock>,
    tabs: Arc<DashMap<TabId, TabResource>>,
    last_activity_ms: Arc<AtomicI64>,
    config: TrackerConfig,
}

impl ResourceTracker {
    pub fn new(surface: Arc<dyn PageSurface>, clock: Arc<dyn Clock>, config: TrackerConfig) -> Self {
        Self {
            surface,
            clock,
            tabs: Arc::new(DashMap::new()),
            last_activity_ms: Arc::new(AtomicI64::new(NO_ACTIVITY)),
            config,
        }
    }

    /// Reuse the most recently active tab, or open one.
    pub async fn acquire(&self) -> Result<TabResource, SurfaceError> {
        let reusable = self
            .tabs
            .iter()
            .filter(|t| t.status != TabStatus::Closed)
            .max_by_key(|t| t.last_activity_at)
            .map(|t| t.id.clone());

        if let Some(id) = reusable {
            if let Some(tab) = self.touch(&id) {
                debug!(tab = %tab.id, "tracker.acquire.reuse");
                return Ok(tab);
            }
        }
        self.create(false).await
    }

    /// Always open a fresh tab.
    pub async fn force_new(&self) -> Result<TabResource, SurfaceError> {
        self.create(true).await
    }

    async fn create(&self, forced: bool) -> Result<TabResource, SurfaceError> {
        let id = self.surface.open_tab(&self.config.start_url).await?;
        let attempts = self.config.ready_attempts.max(1);
        let mut ready = None;

        for attempt in 1..=attempts {
            match self.surface.send(&id, SurfaceRequest::Ping).await {
                Ok(value) => match decode::<PingReply>(value) {
                    Ok(reply) if reply.ready => {
                        ready = Some(reply.url);
                        break;
                    }
                    Ok(_) => debug!(tab = %id, attempt, "tracker.ping.not_ready"),
                    Err(e) => debug!(tab = %id, attempt, error = %e, "tracker.ping.malformed"),
                },
                Err(e @ SurfaceError::TabClosed(_)) => return Err(e),
                Err(e) => debug!(tab = %id, attempt, error = %e, "tracker.ping.failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(self.config.ready_interval).await;
            }
        }

        let now = self.clock.now();
        let status = match (&ready, forced) {
            (Some(_), true) => TabStatus::ForcedNew,
            (Some(_), false) => TabStatus::Ready,
            (None, _) => {
                warn!(tab = %id, attempts, "tracker.create.partial");
                TabStatus::Partial
            }
        };
        let tab = TabResource {
            id: id.clone(),
            current_url: ready.unwrap_or_else(|| self.config.start_url.clone()),
            created_at: now,
            last_activity_at: now,
            status,
            forced,
        };
        self.tabs.insert(id, tab.clone());
        self.mark_activity(now);
        info!(tab = %tab.id, status = ?tab.status, forced, "tracker.create");
        Ok(tab)
    }

    /// Close `id` on the surface (best effort) and stop tracking it.
    pub async fn release(&self, id: &str) -> Result<TabResource, HireloopError> {
        let (_, mut tab) = self
            .tabs
            .remove(id)
            .ok_or_else(|| HireloopError::ResourceNotFound(id.to_string()))?;
        if let Err(e) = self.surface.close_tab(&tab.id).await {
            warn!(tab = %tab.id, error = %e, "tracker.release.close_failed");
        }
        let now = self.clock.now();
        tab.status = TabStatus::Closed;
        tab.last_activity_at = now;
        self.mark_activity(now);
        info!(tab = %tab.id, "tracker.release");
        Ok(tab)
    }

    /// Release every tab idle for longer than `max_age`.
    pub async fn reclaim_stale(&self, max_age: Duration) -> usize {
        let now = self.clock.now();
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let stale: Vec<TabId> = self
            .tabs
            .iter()
            .filter(|t| now.signed_duration_since(t.last_activity_at) > max_age)
            .map(|t| t.id.clone())
            .collect();

        let mut reclaimed = 0;
        for id in stale {
            if self.release(&id).await.is_ok() {
                reclaimed += 1;
            }
        }
        if reclaimed > 0 {
            info!(reclaimed, "tracker.reclaim_stale");
        }
        reclaimed
    }

    /// Record what a ping just showed for `id`.
    pub fn observe(&self, id: &str, url: &str, ready: bool, on_site: bool) -> Option<TabStatus> {
        let now = self.clock.now();
        let status = {
            let mut tab = self.tabs.get_mut(id)?;
            tab.current_url = url.to_string();
            tab.last_activity_at = now;
            tab.status = if !on_site {
                TabStatus::NavigatedAway
            } else if ready && tab.forced {
                TabStatus::ForcedNew
            } else if ready {
                TabStatus::Ready
            } else {
                TabStatus::Partial
            };
            tab.status
        };
        self.mark_activity(now);
        Some(status)
    }

    pub fn touch(&self, id: &str) -> Option<TabResource> {
        let now = self.clock.now();
        let tab = {
            let mut tab = self.tabs.get_mut(id)?;
            tab.last_activity_at = now;
            tab.clone()
        };
        self.mark_activity(now);
        Some(tab)
    }

    pub fn get(&self, id: &str) -> Option<TabResource> {
        self.tabs.get(id).map(|t| t.clone())
    }

    /// Tracked tabs, oldest first.
    pub fn list(&self) -> Vec<TabResource> {
        let mut tabs: Vec<TabResource> = self.tabs.iter().map(|t| t.clone()).collect();
        tabs.sort_by_key(|t| t.created_at);
        tabs
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    /// Release everything; returns how many tabs were tracked.
    pub async fn reset(&self) -> usize {
        let ids: Vec<TabId> = self.tabs.iter().map(|t| t.id.clone()).collect();
        let mut released = 0;
        for id in ids {
            if self.release(&id).await.is_ok() {
                released += 1;
            }
        }
        released
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            NO_ACTIVITY => None,
            ms => DateTime::from_timestamp_millis(ms),
        }
    }

    fn mark_activity(&self, at: DateTime<Utc>) {
        self.last_activity_ms
            .fetch_max(at.timestamp_millis(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    /// Opens numbered tabs; pings report ready once `ready_after` pings have
    /// been answered.
    struct CountingSurface {
        opened: AtomicUsize,
        pings: AtomicUsize,
        ready_after: usize,
    }

    impl CountingSurface {
        fn new(ready_after: usize) -> Self {
            Self {
                opened: AtomicUsize::new(0),
                pings: AtomicUsize::new(0),
                ready_after,
            }
        }
    }

    #[async_trait]
    impl PageSurface for CountingSurface {
        async fn open_tab(&self, _url: &str) -> Result<TabId, SurfaceError> {
            let n = self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(format!("tab-{n}"))
        }

        async fn close_tab(&self, _tab: &TabId) -> Result<(), SurfaceError> {
            Ok(())
        }

        async fn send(&self, _tab: &TabId, _request: SurfaceRequest) -> Result<Value, SurfaceError> {
            let n = self.pings.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({ "ready": n >= self.ready_after, "url": "https://www.linkedin.com/jobs/search/" }))
        }
    }

    fn tracker(surface: CountingSurface, attempts: u32) -> ResourceTracker {
        ResourceTracker::new(
            Arc::new(surface),
            Arc::new(ManualClock::default()),
            TrackerConfig {
                start_url: "https://www.linkedin.com/jobs/search/".into(),
                ready_attempts: attempts,
                ready_interval: Duration::from_millis(1000),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn unready_tab_is_still_returned_as_partial() {
        let t = tracker(CountingSurface::new(usize::MAX), 3);
        let tab = t.acquire().await.unwrap();
        assert_eq!(tab.status, TabStatus::Partial);
        assert_eq!(t.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn forced_tabs_keep_their_tag() {
        let t = tracker(CountingSurface::new(1), 3);
        let tab = t.force_new().await.unwrap();
        assert!(tab.forced);
        assert_eq!(tab.status, TabStatus::ForcedNew);

        let url = "https://www.linkedin.com/jobs/search/";
        assert_eq!(t.observe(&tab.id, "https://example.org/", true, false), Some(TabStatus::NavigatedAway));
        assert_eq!(t.observe(&tab.id, url, false, true), Some(TabStatus::Partial));
        assert_eq!(t.observe(&tab.id, url, true, true), Some(TabStatus::ForcedNew));
        assert_eq!(t.observe("missing", url, true, true), None);
    }

    #[tokio::test(start_paused = true)]
    async fn released_tabs_are_gone_for_good() {
        let t = tracker(CountingSurface::new(1), 3);
        let tab = t.acquire().await.unwrap();
        let closed = t.release(&tab.id).await.unwrap();
        assert_eq!(closed.status, TabStatus::Closed);
        assert!(t.get(&tab.id).is_none());
        assert!(matches!(
            t.release(&tab.id).await,
            Err(HireloopError::ResourceNotFound(_))
        ));
        assert!(t.last_activity().is_some());
    }
}
