use crate::browser::{behavioral::BehavioralEngine, scripts};
use crate::surface::{PageSurface, SurfaceError, SurfaceRequest, TabId};
use anyhow::Result;
use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder, Locator};
use hireloop_config::{BrowserConfig, SiteSelectors};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::Mutex;
use webdriver::capabilities::Capabilities;

const ENTER_KEY: &str = "\u{E007}";

/// [`PageSurface`] backed by a WebDriver session. Every tab is a window
/// handle; commands are serialized because WebDriver has a single focused
/// window per session.
pub struct WebDriverSurface {
    client: Client,
    selectors: SiteSelectors,
    behavioral_engine: BehavioralEngine,
    human_typing: bool,
    focus: Mutex<()>,
}

impl WebDriverSurface {
    /// Connect to a running WebDriver service (chromedriver by default).
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();
        let mut args = vec![
            json!("--window-size=1366,900"),
            json!("--disable-blink-features=AutomationControlled"),
        ];
        if config.headless {
            args.push(json!("--headless=new"));
            args.push(json!("--disable-gpu"));
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await?;
        tracing::info!(webdriver = %config.webdriver_url, headless = config.headless, "surface.webdriver.connected");

        Ok(Self {
            client,
            selectors: config.site.selectors.clone(),
            behavioral_engine: BehavioralEngine::new(),
            human_typing: config.human_typing,
            focus: Mutex::new(()),
        })
    }

    /// Close the underlying browser session.
    pub async fn shutdown(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }

    async fn focus_tab(&self, tab: &TabId) -> Result<(), SurfaceError> {
        let handle = WindowHandle::try_from(tab.clone())
            .map_err(|_| SurfaceError::TabClosed(tab.clone()))?;
        self.client
            .switch_to_window(handle)
            .await
            .map_err(|e| classify(tab, e))
    }

    async fn run_script(
        &self,
        tab: &TabId,
        script: &str,
        args: Vec<Value>,
    ) -> Result<Value, SurfaceError> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| classify(tab, e))
    }

    async fn goto(&self, tab: &TabId, url: &str) -> Result<Value, SurfaceError> {
        self.behavioral_engine.random_delay(300, 1200).await;
        self.client.goto(url).await.map_err(|e| classify(tab, e))?;
        Ok(json!({ "ok": true }))
    }

    async fn type_search(
        &self,
        tab: &TabId,
        keywords: &str,
        location: &str,
    ) -> Result<Value, SurfaceError> {
        let input = self
            .client
            .find(Locator::Css(&self.selectors.search_input))
            .await
            .map_err(|e| classify(tab, e))?;
        input.clear().await.map_err(|e| classify(tab, e))?;
        self.behavioral_engine
            .type_text_human_like(&input, keywords)
            .await
            .map_err(|e| classify(tab, e))?;

        if !location.is_empty() {
            match self
                .client
                .find(Locator::Css(&self.selectors.location_input))
                .await
            {
                Ok(loc) => {
                    loc.clear().await.map_err(|e| classify(tab, e))?;
                    self.behavioral_engine
                        .type_text_human_like(&loc, location)
                        .await
                        .map_err(|e| classify(tab, e))?;
                }
                Err(e) => tracing::debug!(error = %e, "surface.search.location_input_missing"),
            }
        }

        self.behavioral_engine.random_delay(150, 400).await;
        input
            .send_keys(ENTER_KEY)
            .await
            .map_err(|e| classify(tab, e))?;
        Ok(json!({ "ok": true }))
    }
}

#[async_trait]
impl PageSurface for WebDriverSurface {
    async fn open_tab(&self, url: &str) -> Result<TabId, SurfaceError> {
        let _guard = self.focus.lock().await;
        let opened = self
            .client
            .new_window(true)
            .await
            .map_err(|e| classify(&String::new(), e))?;
        let tab: TabId = String::from(opened.handle.clone());
        self.client
            .switch_to_window(opened.handle)
            .await
            .map_err(|e| classify(&tab, e))?;
        self.goto(&tab, url).await?;
        tracing::debug!(%tab, %url, "surface.tab.opened");
        Ok(tab)
    }

    async fn close_tab(&self, tab: &TabId) -> Result<(), SurfaceError> {
        let _guard = self.focus.lock().await;
        self.focus_tab(tab).await?;
        self.client
            .close_window()
            .await
            .map_err(|e| classify(tab, e))?;

        // Keep the session focused on a live window.
        if let Ok(remaining) = self.client.windows().await {
            if let Some(first) = remaining.into_iter().next() {
                let _ = self.client.switch_to_window(first).await;
            }
        }
        tracing::debug!(%tab, "surface.tab.closed");
        Ok(())
    }

    async fn send(&self, tab: &TabId, request: SurfaceRequest) -> Result<Value, SurfaceError> {
        let _guard = self.focus.lock().await;
        self.focus_tab(tab).await?;
        tracing::trace!(%tab, action = request.action(), "surface.send");

        let s = &self.selectors;
        match request {
            SurfaceRequest::Ping => {
                self.run_script(tab, scripts::PING, vec![json!(s.listing_card)])
                    .await
            }
            SurfaceRequest::Navigate { url } => self.goto(tab, &url).await,
            SurfaceRequest::PerformSearch { keywords, location } => {
                if self.human_typing {
                    self.type_search(tab, &keywords, &location).await
                } else {
                    self.run_script(
                        tab,
                        scripts::SEARCH,
                        vec![
                            json!(s.search_input),
                            json!(s.location_input),
                            json!(keywords),
                            json!(location),
                        ],
                    )
                    .await
                }
            }
            SurfaceRequest::ExtractListings => {
                self.run_script(
                    tab,
                    scripts::EXTRACT_LISTINGS,
                    vec![
                        json!(s.listing_card),
                        json!(s.listing_title),
                        json!(s.listing_company),
                        json!(s.listing_location),
                        json!(s.listing_link),
                        json!(s.listing_snippet),
                    ],
                )
                .await
            }
            SurfaceRequest::ExtractDetail => {
                self.run_script(
                    tab,
                    scripts::EXTRACT_DETAIL,
                    vec![
                        json!(s.detail_description),
                        json!(s.detail_requirements),
                        json!(s.detail_benefits),
                        json!(s.detail_compensation),
                    ],
                )
                .await
            }
            SurfaceRequest::ExpandDetail => {
                self.run_script(tab, scripts::CLICK_IF_PRESENT, vec![json!(s.expand_button)])
                    .await
            }
            SurfaceRequest::OpenListing { link } => self.goto(tab, &link).await,
            SurfaceRequest::NavigateNextPage => {
                self.run_script(tab, scripts::CLICK_IF_PRESENT, vec![json!(s.next_page)])
                    .await
            }
            SurfaceRequest::GoBack => {
                self.client.back().await.map_err(|e| classify(tab, e))?;
                Ok(json!({ "ok": true }))
            }
            SurfaceRequest::Scroll { pixels } => {
                self.run_script(tab, scripts::SCROLL, vec![json!(pixels)])
                    .await
            }
            SurfaceRequest::Apply {
                link,
                submit,
                applicant,
            } => {
                let current = self
                    .client
                    .current_url()
                    .await
                    .map_err(|e| classify(tab, e))?;
                if current.as_str() != link {
                    self.goto(tab, &link).await?;
                    self.behavioral_engine.random_delay(800, 1500).await;
                }
                self.run_script(
                    tab,
                    scripts::APPLY,
                    vec![
                        json!(s.apply_button),
                        json!(s.submit_button),
                        json!(applicant.full_name),
                        json!(applicant.email),
                        json!(applicant.phone),
                        json!(submit),
                    ],
                )
                .await
            }
        }
    }
}

/// Map WebDriver failures onto the surface error classes.
fn classify(tab: &TabId, err: CmdError) -> SurfaceError {
    match err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::NoSuchWindow => SurfaceError::TabClosed(tab.clone()),
            ErrorStatus::NoSuchElement
            | ErrorStatus::StaleElementReference
            | ErrorStatus::Timeout => SurfaceError::NotReady(wd.to_string()),
            ErrorStatus::InvalidSessionId => SurfaceError::Disconnected(wd.to_string()),
            _ => SurfaceError::Script(wd.to_string()),
        },
        CmdError::Lost(e) => SurfaceError::Disconnected(e.to_string()),
        CmdError::WaitTimeout => SurfaceError::NotReady("wait timed out".into()),
        other => SurfaceError::Script(other.to_string()),
    }
}
