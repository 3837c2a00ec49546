//! Keyword-based listing metadata.
//!
//! Matching is case-insensitive on word boundaries and the first matching
//! rule wins. Seniority is read from the title alone and urgency from title
//! and description. Remoteness is decided by the first of location, title
//! and description that mentions a work arrangement at all.
use crate::model::{Level, ListingMetadata, Remoteness, Urgency};
use regex::Regex;
use std::sync::OnceLock;

const LEVEL_RULES: &[(Level, &[&str])] = &[
    (
        Level::Executive,
        &["chief", "vp", "vice president", "director", "head of"],
    ),
    (Level::Senior, &["senior", "sr", "lead", "principal", "staff"]),
    (
        Level::Entry,
        &[
            "junior", "jr", "entry", "graduate", "intern", "associate", "trainee",
        ],
    ),
];

const REMOTE_RULES: &[(Remoteness, &[&str])] = &[
    (
        Remoteness::Remote,
        &[
            "remote",
            "remote-first",
            "fully remote",
            "work from home",
            "work from anywhere",
            "wfh",
            "fully distributed",
        ],
    ),
    (Remoteness::Hybrid, &["hybrid", "partially remote"]),
    (
        Remoteness::Onsite,
        &["on-site", "onsite", "in office", "in-office", "office-based"],
    ),
];

const URGENCY_RULES: &[(Urgency, &[&str])] = &[(
    Urgency::High,
    &[
        "urgent",
        "urgently",
        "immediate",
        "immediately",
        "asap",
        "start now",
    ],
)];

fn compile<T: Copy>(rules: &[(T, &[&str])]) -> Vec<(T, Regex)> {
    rules
        .iter()
        .filter_map(|(value, words)| {
            let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
            let pattern = format!(r"(?i)\b(?:{})\b", alternatives.join("|"));
            match Regex::new(&pattern) {
                Ok(re) => Some((*value, re)),
                Err(e) => {
                    tracing::error!(%pattern, error = %e, "metadata.rule.invalid");
                    None
                }
            }
        })
        .collect()
}

fn level_rules() -> &'static [(Level, Regex)] {
    static RULES: OnceLock<Vec<(Level, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| compile(LEVEL_RULES))
}

fn remote_rules() -> &'static [(Remoteness, Regex)] {
    static RULES: OnceLock<Vec<(Remoteness, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| compile(REMOTE_RULES))
}

fn urgency_rules() -> &'static [(Urgency, Regex)] {
    static RULES: OnceLock<Vec<(Urgency, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| compile(URGENCY_RULES))
}

fn first_match<T: Copy>(rules: &[(T, Regex)], texts: &[&str], fallback: T) -> T {
    rules
        .iter()
        .find(|(_, re)| texts.iter().any(|t| re.is_match(t)))
        .map(|(value, _)| *value)
        .unwrap_or(fallback)
}

/// Texts are tried in order; the first one any rule matches decides.
fn first_text_match<T: Copy>(rules: &[(T, Regex)], texts: &[&str], fallback: T) -> T {
    texts
        .iter()
        .find_map(|t| rules.iter().find(|(_, re)| re.is_match(t)).map(|(v, _)| *v))
        .unwrap_or(fallback)
}

pub fn derive_metadata(title: &str, location: &str, description: &str) -> ListingMetadata {
    ListingMetadata {
        level: first_match(level_rules(), &[title], Level::Mid),
        remoteness: first_text_match(
            remote_rules(),
            &[location, title, description],
            Remoteness::Unspecified,
        ),
        urgency: first_match(urgency_rules(), &[title, description], Urgency::Normal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executive_beats_entry_keywords() {
        let m = derive_metadata("Associate Director of Engineering", "", "");
        assert_eq!(m.level, Level::Executive);
    }

    #[test]
    fn abbreviations_match_on_word_boundaries() {
        assert_eq!(derive_metadata("Sr. Backend Engineer", "", "").level, Level::Senior);
        assert_eq!(derive_metadata("Jr Data Analyst", "", "").level, Level::Entry);
        // "intern" inside "internal" is not a match.
        assert_eq!(derive_metadata("Internal Tools Engineer", "", "").level, Level::Mid);
    }

    #[test]
    fn remoteness_reads_location_and_description() {
        assert_eq!(
            derive_metadata("Engineer", "Remote, EU", "").remoteness,
            Remoteness::Remote
        );
        assert_eq!(
            derive_metadata("Engineer", "Berlin", "Three days in-office per week").remoteness,
            Remoteness::Onsite
        );
        assert_eq!(
            derive_metadata("Engineer", "Berlin", "Hybrid setup").remoteness,
            Remoteness::Hybrid
        );
        assert_eq!(
            derive_metadata("Engineer", "Berlin", "").remoteness,
            Remoteness::Unspecified
        );
    }

    #[test]
    fn systems_wording_does_not_imply_remote() {
        let m = derive_metadata(
            "Distributed Systems Engineer",
            "Berlin (on-site)",
            "Five days a week in office. Flexible hours, ship anywhere in the stack.",
        );
        assert_eq!(m.remoteness, Remoteness::Onsite);
        assert_eq!(
            derive_metadata("Distributed Systems Engineer", "Berlin", "").remoteness,
            Remoteness::Unspecified
        );
    }

    #[test]
    fn location_outranks_description() {
        assert_eq!(
            derive_metadata("Engineer", "Munich (on-site)", "Remote onboarding week").remoteness,
            Remoteness::Onsite
        );
        assert_eq!(
            derive_metadata("Engineer", "Remote, EU", "Quarterly on-site meetups").remoteness,
            Remoteness::Remote
        );
        assert_eq!(
            derive_metadata("Engineer", "Berlin", "We are a fully distributed team").remoteness,
            Remoteness::Remote
        );
    }

    #[test]
    fn urgency_is_normal_unless_flagged() {
        assert_eq!(derive_metadata("Engineer", "", "").urgency, Urgency::Normal);
        assert_eq!(
            derive_metadata("Engineer", "", "We need someone ASAP").urgency,
            Urgency::High
        );
    }

    #[test]
    fn derivation_is_deterministic() {
        let a = derive_metadata("Lead Engineer (WFH)", "Worldwide", "start now");
        let b = derive_metadata("Lead Engineer (WFH)", "Worldwide", "start now");
        assert_eq!(a, b);
        assert_eq!(a.level, Level::Senior);
        assert_eq!(a.remoteness, Remoteness::Remote);
        assert_eq!(a.urgency, Urgency::High);
    }
}
