//! Turning free-form completion text into an [`EvaluationResult`].
//!
//! Parsing never fails: structured JSON is tried first (whole text, fenced
//! block, first balanced object), then lexical heuristics.
use crate::model::{EvalSource, EvaluationResult, Stage};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

const AFFIRMATIVE: &[&str] = &[
    "yes",
    "true",
    "apply",
    "good fit",
    "strong fit",
    "strong match",
    "recommend",
    "recommended",
    "suitable",
];

const NEGATIVE: &[&str] = &[
    "no",
    "not",
    "false",
    "reject",
    "skip",
    "decline",
    "poor fit",
    "unsuitable",
    "mismatch",
];

const RATIONALE_FIELDS: &[&str] = &["rationale", "reason", "reasoning", "explanation"];
const MAX_HEURISTIC_RATIONALE: usize = 280;

pub fn parse_result(text: &str, stage: Stage) -> EvaluationResult {
    let trimmed = text.trim();
    if let Some(result) = structured(trimmed, stage) {
        return result;
    }
    heuristic(trimmed, stage)
}

fn structured(text: &str, stage: Stage) -> Option<EvaluationResult> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        if let Some(r) = from_object(&map, stage) {
            return Some(r);
        }
    }
    if let Some(block) = fenced_block(text) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(block) {
            if let Some(r) = from_object(&map, stage) {
                return Some(r);
            }
        }
    }
    balanced_objects(text).find_map(|candidate| match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => from_object(&map, stage),
        _ => None,
    })
}

fn fenced_block(text: &str) -> Option<&str> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = FENCE
        .get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok())
        .as_ref()?;
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
}

/// Every top-level `{...}` span whose braces balance, skipping braces inside
/// string literals.
fn balanced_objects(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0;
    while let Some(offset) = text[start..].find('{') {
        let open = start + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut close = None;
        for (i, &b) in bytes.iter().enumerate().skip(open) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        match close {
            Some(end) => spans.push(&text[open..=end]),
            None => break,
        }
        start = open + 1;
    }
    spans.into_iter()
}

fn from_object(map: &Map<String, Value>, stage: Stage) -> Option<EvaluationResult> {
    let decision = ["decision", "apply", "should_apply", "match"]
        .iter()
        .find_map(|k| map.get(*k).and_then(as_decision));
    let confidence = map.get("confidence").and_then(as_confidence);
    let score = map.get("score").and_then(as_number).map(rescale_score);

    let confidence = match (confidence, score) {
        (Some(c), _) => c,
        (None, Some(s)) => f64::from(s) / 100.0,
        (None, None) => 0.5,
    };
    let decision = match decision {
        Some(d) => d,
        // An object with a confidence or score but no decision still counts.
        None if map.contains_key("confidence") || map.contains_key("score") => confidence >= 0.5,
        None => return None,
    };
    let score = score.unwrap_or_else(|| to_score(confidence));
    let rationale = RATIONALE_FIELDS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();

    Some(EvaluationResult {
        decision,
        confidence,
        score,
        rationale,
        stage,
        source: EvalSource::Model,
    })
}

fn as_decision(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" | "true" | "apply" | "match" => Some(true),
            "no" | "n" | "false" | "reject" | "skip" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    let n = match v {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn as_confidence(v: &Value) -> Option<f64> {
    let percent = matches!(v, Value::String(s) if s.trim().ends_with('%'));
    as_number(v).map(|n| rescale_unit(n, percent))
}

/// A `%` suffix or a value in `[2, 100]` is a percentage. Anything else
/// outside `[0, 1]` is clamped.
fn rescale_unit(n: f64, percent: bool) -> f64 {
    let n = if percent || (2.0..=100.0).contains(&n) {
        n / 100.0
    } else {
        n
    };
    n.clamp(0.0, 1.0)
}

/// Fractional values in `(0, 1)` are read as a unit-scale score.
fn rescale_score(n: f64) -> u8 {
    let n = if n > 0.0 && n < 1.0 { n * 100.0 } else { n };
    n.round().clamp(0.0, 100.0) as u8
}

fn to_score(confidence: f64) -> u8 {
    (confidence * 100.0).round().clamp(0.0, 100.0) as u8
}

fn word_regex(words: &[&str]) -> Option<Regex> {
    let alternatives: Vec<String> = words.iter().map(|w| regex::escape(w)).collect();
    Regex::new(&format!(r"(?i)\b(?:{})\b", alternatives.join("|"))).ok()
}

fn heuristic(text: &str, stage: Stage) -> EvaluationResult {
    static YES: OnceLock<Option<Regex>> = OnceLock::new();
    static NO: OnceLock<Option<Regex>> = OnceLock::new();
    static NUMBER: OnceLock<Option<Regex>> = OnceLock::new();

    let first = |re: &OnceLock<Option<Regex>>, words: &[&str]| {
        re.get_or_init(|| word_regex(words))
            .as_ref()
            .and_then(|re| re.find(text))
            .map(|m| m.start())
    };
    let decision = match (first(&YES, AFFIRMATIVE), first(&NO, NEGATIVE)) {
        (Some(y), Some(n)) => y < n,
        (Some(_), None) => true,
        _ => false,
    };

    let confidence = NUMBER
        .get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").ok())
        .as_ref()
        .and_then(|re| {
            re.find_iter(text)
                .filter_map(|m| m.as_str().parse::<f64>().ok())
                .find(|n| (0.0..=1.0).contains(n))
        })
        .unwrap_or(0.5);

    let rationale: String = text.chars().take(MAX_HEURISTIC_RATIONALE).collect();
    EvaluationResult {
        decision,
        confidence,
        score: to_score(confidence),
        rationale,
        stage,
        source: EvalSource::Heuristic,
    }
}
