//! Records and context shared by the pipeline stages.
use hireloop_drivers::ApplicantFields;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Executive,
    Senior,
    Mid,
    Entry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remoteness {
    Remote,
    Hybrid,
    Onsite,
    Unspecified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    High,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingMetadata {
    pub level: Level,
    pub remoteness: Remoteness,
    pub urgency: Urgency,
}

impl Default for ListingMetadata {
    fn default() -> Self {
        Self {
            level: Level::Mid,
            remoteness: Remoteness::Unspecified,
            urgency: Urgency::Normal,
        }
    }
}

/// One normalized job listing.
///
/// `identity` is stable across re-extraction of the same posting; see
/// [`crate::listing::listing_identity`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub identity: String,
    pub title: String,
    pub employer: String,
    pub location: String,
    pub short_description: String,
    pub full_description: Option<String>,
    pub requirements: Option<String>,
    pub benefits: Option<String>,
    pub compensation: Option<String>,
    pub metadata: ListingMetadata,
    pub link: Option<String>,
}

impl ListingRecord {
    /// Full description when enriched, the card snippet otherwise.
    pub fn best_description(&self) -> &str {
        match self.full_description.as_deref() {
            Some(full) if !full.trim().is_empty() => full,
            _ => &self.short_description,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    Prescreen,
    Deep,
}

/// How an [`EvaluationResult`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalSource {
    Model,
    Heuristic,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub decision: bool,
    pub confidence: f64,
    pub score: u8,
    pub rationale: String,
    pub stage: Stage,
    pub source: EvalSource,
}

impl EvaluationResult {
    /// A rejected result standing in for a call that never produced output.
    pub fn failure(stage: Stage, rationale: impl Into<String>) -> Self {
        Self {
            decision: false,
            confidence: 0.0,
            score: 0,
            rationale: rationale.into(),
            stage,
            source: EvalSource::Failure,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub headline: String,
    pub skills: Vec<String>,
    pub years_experience: Option<u32>,
    pub resume_text: String,
}

impl UserProfile {
    pub fn applicant_fields(&self) -> ApplicantFields {
        ApplicantFields {
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserPreferences {
    pub keywords: String,
    pub location: String,
    pub remote_only: bool,
    pub preferred_levels: Vec<Level>,
    pub excluded_terms: Vec<String>,
    pub min_compensation: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    SearchResults,
    ListingDetail,
    OtherOnSite,
    OffSite,
    Unknown,
}

impl PageType {
    pub fn is_on_site(self) -> bool {
        matches!(
            self,
            PageType::SearchResults | PageType::ListingDetail | PageType::OtherOnSite
        )
    }
}

/// Snapshot of what the loop observed at the top of an iteration.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub page_type: PageType,
    pub jobs_found_count: usize,
    pub search_query: String,
    pub location: String,
    pub user_preferences: UserPreferences,
    pub user_profile: UserProfile,
    pub current_url: String,
    pub target_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ListingRecord {
        ListingRecord {
            identity: "https://jobs.example.com/view/1".into(),
            title: "Rust Engineer".into(),
            employer: "Acme".into(),
            location: "Berlin".into(),
            short_description: "snippet".into(),
            full_description: None,
            requirements: None,
            benefits: None,
            compensation: None,
            metadata: ListingMetadata::default(),
            link: None,
        }
    }

    #[test]
    fn best_description_prefers_full_text() {
        let mut r = record();
        assert_eq!(r.best_description(), "snippet");
        r.full_description = Some("   ".into());
        assert_eq!(r.best_description(), "snippet");
        r.full_description = Some("the whole posting".into());
        assert_eq!(r.best_description(), "the whole posting");
    }

    #[test]
    fn failure_result_is_a_rejection() {
        let r = EvaluationResult::failure(Stage::Deep, "network error: reset");
        assert!(!r.decision);
        assert_eq!(r.score, 0);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.source, EvalSource::Failure);
    }

    #[test]
    fn preferences_tolerate_partial_json() {
        let prefs: UserPreferences =
            serde_json::from_str(r#"{"keywords":"rust","preferred_levels":["senior"]}"#).unwrap();
        assert_eq!(prefs.keywords, "rust");
        assert_eq!(prefs.preferred_levels, vec![Level::Senior]);
        assert!(!prefs.remote_only);
    }
}
