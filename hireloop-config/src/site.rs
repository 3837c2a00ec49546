use serde::Deserialize;

/// Where the target site lives and how its pages are recognised.
///
/// Page classification only looks at the URL: the host must end with
/// `host`, then `search_path` / `detail_path` are matched as substrings of
/// the path. `identity_query_keys` names the query parameters that are
/// part of a listing's identity on sites that address postings by query
/// (`viewjob?jk=...`); every other parameter is dropped.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteProfile {
    pub name: String,
    pub start_url: String,
    pub host: String,
    pub search_path: String,
    pub detail_path: String,
    pub identity_query_keys: Vec<String>,
    pub selectors: SiteSelectors,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            name: "linkedin".into(),
            start_url: "https://www.linkedin.com/jobs/search/".into(),
            host: "linkedin.com".into(),
            search_path: "/jobs/search".into(),
            detail_path: "/jobs/view".into(),
            identity_query_keys: Vec::new(),
            selectors: SiteSelectors::default(),
        }
    }
}

/// CSS selectors the page scripts rely on. Comma-separated alternatives are
/// allowed anywhere the browser accepts them.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteSelectors {
    pub search_input: String,
    pub location_input: String,
    pub listing_card: String,
    pub listing_title: String,
    pub listing_company: String,
    pub listing_location: String,
    pub listing_link: String,
    pub listing_snippet: String,
    pub detail_description: String,
    pub detail_requirements: String,
    pub detail_benefits: String,
    pub detail_compensation: String,
    pub expand_button: String,
    pub next_page: String,
    pub apply_button: String,
    pub submit_button: String,
}

impl Default for SiteSelectors {
    fn default() -> Self {
        Self {
            search_input: "input.jobs-search-box__keyboard-text-input".into(),
            location_input: "input.jobs-search-box__text-input[aria-label*='City']".into(),
            listing_card: "li.jobs-search-results__list-item, div.job-card-container".into(),
            listing_title: ".job-card-list__title, .job-card-container__link".into(),
            listing_company: ".job-card-container__primary-description, .artdeco-entity-lockup__subtitle".into(),
            listing_location: ".job-card-container__metadata-item, .artdeco-entity-lockup__caption".into(),
            listing_link: "a.job-card-container__link, a.job-card-list__title".into(),
            listing_snippet: ".job-card-list__insight, .job-card-container__job-insight-text".into(),
            detail_description: ".jobs-description__content, #job-details".into(),
            detail_requirements: ".jobs-description__requirements".into(),
            detail_benefits: ".jobs-description__benefits".into(),
            detail_compensation: ".jobs-details__salary-main-rail-card, .compensation__salary".into(),
            expand_button: "button.jobs-description__footer-button, button[aria-label*='see more']".into(),
            next_page: "button[aria-label='View next page'], li.artdeco-pagination__indicator--number.selected + li button".into(),
            apply_button: "button.jobs-apply-button".into(),
            submit_button: "button[aria-label='Submit application']".into(),
        }
    }
}
