//! Prompt text for both screening stages.
use crate::model::{ListingRecord, UserPreferences, UserProfile};
use std::fmt::Write as _;

pub const SYSTEM_PROMPT: &str = "You are a careful recruiting assistant. You judge whether a job \
listing fits a candidate. Answer with a single JSON object and nothing else.";

const ANSWER_FORMAT: &str = r#"Respond with JSON only:
{"decision": true|false, "confidence": 0.0-1.0, "score": 0-100, "rationale": "<one or two sentences>"}"#;

const MAX_RESUME_CHARS: usize = 6000;
const MAX_DESCRIPTION_CHARS: usize = 8000;

fn clip(text: &str, max: usize) -> String {
    let mut out: String = text.chars().take(max).collect();
    if text.chars().count() > max {
        out.push_str(" [...]");
    }
    out
}

fn candidate_block(out: &mut String, profile: &UserProfile, prefs: &UserPreferences) {
    let _ = writeln!(out, "Candidate:");
    if !profile.headline.is_empty() {
        let _ = writeln!(out, "- Headline: {}", profile.headline);
    }
    if !profile.skills.is_empty() {
        let _ = writeln!(out, "- Skills: {}", profile.skills.join(", "));
    }
    if let Some(years) = profile.years_experience {
        let _ = writeln!(out, "- Years of experience: {years}");
    }
    let _ = writeln!(out, "Preferences:");
    if !prefs.keywords.is_empty() {
        let _ = writeln!(out, "- Looking for: {}", prefs.keywords);
    }
    if !prefs.location.is_empty() {
        let _ = writeln!(out, "- Location: {}", prefs.location);
    }
    if prefs.remote_only {
        let _ = writeln!(out, "- Remote only");
    }
    if !prefs.preferred_levels.is_empty() {
        let levels: Vec<String> = prefs
            .preferred_levels
            .iter()
            .map(|l| format!("{l:?}").to_lowercase())
            .collect();
        let _ = writeln!(out, "- Preferred seniority: {}", levels.join(", "));
    }
    if let Some(min) = prefs.min_compensation {
        let _ = writeln!(out, "- Minimum compensation: {min}");
    }
}

fn listing_header(out: &mut String, record: &ListingRecord) {
    let _ = writeln!(out, "Listing:");
    let _ = writeln!(out, "- Title: {}", record.title);
    let _ = writeln!(out, "- Employer: {}", record.employer);
    let _ = writeln!(out, "- Location: {}", record.location);
    let m = &record.metadata;
    let _ = writeln!(
        out,
        "- Signals: level={:?}, remoteness={:?}, urgency={:?}",
        m.level, m.remoteness, m.urgency
    );
}

/// Quick gate: title, employer, location and the card snippet only.
pub fn prescreen_prompt(
    record: &ListingRecord,
    profile: &UserProfile,
    prefs: &UserPreferences,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Quick screen. Decide whether this listing is worth a closer look. \
         Be generous: only reject clear mismatches.\n"
    );
    candidate_block(&mut out, profile, prefs);
    out.push('\n');
    listing_header(&mut out, record);
    if !record.short_description.is_empty() {
        let _ = writeln!(out, "- Summary: {}", record.short_description);
    }
    out.push('\n');
    out.push_str(ANSWER_FORMAT);
    out
}

/// Authoritative screen over the full posting and the resume.
pub fn deep_prompt(
    record: &ListingRecord,
    resume_text: &str,
    profile: &UserProfile,
    prefs: &UserPreferences,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Detailed screen. Decide whether the candidate should apply. \
         Weigh hard requirements strictly.\n"
    );
    candidate_block(&mut out, profile, prefs);
    if !resume_text.trim().is_empty() {
        let _ = writeln!(out, "\nResume:\n{}", clip(resume_text.trim(), MAX_RESUME_CHARS));
    }
    out.push('\n');
    listing_header(&mut out, record);
    let _ = writeln!(
        out,
        "\nDescription:\n{}",
        clip(record.best_description(), MAX_DESCRIPTION_CHARS)
    );
    for (label, section) in [
        ("Requirements", &record.requirements),
        ("Benefits", &record.benefits),
        ("Compensation", &record.compensation),
    ] {
        if let Some(text) = section {
            let _ = writeln!(out, "\n{label}:\n{text}");
        }
    }
    out.push('\n');
    out.push_str(ANSWER_FORMAT);
    out
}
