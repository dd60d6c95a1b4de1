//! Recovers a structured diagnosis from free-form model output.
//!
//! Strategies run in order and the first one that yields findings wins:
//! fenced code blocks, then the outermost `{...}` span, then section headers.
//! Every strategy is a pure function of the input text.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::diagnosis::result::{DiagnosisResult, Findings};

type Strategy = fn(&str) -> Option<Findings>;

pub const STRATEGIES: [(&str, Strategy); 3] = [
    ("fenced_block", from_fenced_blocks),
    ("outer_braces", from_outer_braces),
    ("section_headers", from_section_headers),
];

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```(?i:json)?\s*([\s\S]*?)```").expect("fenced block pattern is valid")
});

pub fn extract(text: &str) -> DiagnosisResult {
    for (name, strategy) in STRATEGIES {
        if let Some(findings) = strategy(text) {
            debug!(strategy = name, "Diagnosis extracted");
            return DiagnosisResult::from_findings(findings, text);
        }
    }
    debug!("No structure recovered from model output");
    DiagnosisResult::unable_to_determine(text)
}

pub fn from_fenced_blocks(text: &str) -> Option<Findings> {
    FENCED_BLOCK
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .find_map(|m| parse_json_findings(m.as_str().trim()))
}

pub fn from_outer_braces(text: &str) -> Option<Findings> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    parse_json_findings(&text[start..=end])
}

/// Splits prose on the words "diagnosis", "causes" and "remedies"/"cure".
pub fn from_section_headers(text: &str) -> Option<Findings> {
    // ASCII lowering keeps byte offsets aligned with `text`.
    let lower = text.to_ascii_lowercase();
    let len = text.len();

    let mut findings = Findings::default();

    if let Some(start) = lower.find("diagnosis") {
        let end = [
            find_from(&lower, "causes", start),
            find_from(&lower, "remedies", start),
            find_from(&lower, "cure", start),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(len);
        findings.possible_diagnosis = section_lines(&text[start..end], &["diagnosis"]);
    }

    if let Some(start) = lower.find("causes") {
        let end = [
            find_from(&lower, "remedies", start),
            find_from(&lower, "cure", start),
        ]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(len);
        findings.causes = section_lines(&text[start..end], &["causes"]);
    }

    // The later of the two keywords opens the remedies section, so a "cure"
    // mentioned inside a remedies list cuts the lines before it. Header lines,
    // including inline ones like "Diagnosis: blight", are dropped whole. Both
    // match how existing clients have always split replies.
    if let Some(start) = [lower.find("remedies"), lower.find("cure")]
        .into_iter()
        .flatten()
        .max()
    {
        findings.remedies_or_cure = section_lines(&text[start..], &["remedies", "cure"]);
    }

    (!findings.is_empty()).then_some(findings)
}

fn find_from(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    haystack[from..].find(needle).map(|i| i + from)
}

fn section_lines(section: &str, headers: &[&str]) -> Vec<String> {
    section
        .lines()
        .map(clean_line)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            !headers.iter().any(|h| lower.starts_with(h))
        })
        .map(str::to_string)
        .collect()
}

fn clean_line(line: &str) -> &str {
    line.trim()
        .trim_start_matches(['-', '•'])
        .trim_matches(|c: char| c == '*' || c == '#' || c.is_whitespace())
}

fn parse_json_findings(candidate: &str) -> Option<Findings> {
    let value: Value = serde_json::from_str(candidate).ok()?;
    let object = value.as_object()?;

    let keys = ["possible_diagnosis", "causes", "remedies_or_cure"];
    if !keys.iter().any(|k| object.contains_key(*k)) {
        return None;
    }

    Some(Findings {
        possible_diagnosis: entries(object.get("possible_diagnosis")),
        causes: entries(object.get("causes")),
        remedies_or_cure: entries(object.get("remedies_or_cure")),
    })
}

/// A list of strings, or a lone string treated as a one-element list.
fn entries(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.trim().to_string(),
                other => other.to_string(),
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}
