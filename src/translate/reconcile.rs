//! Turns a raw API answer into exactly one translation per requested text.
//!
//! Extraction is a swappable strategy (`ResponseParser`); the reconciler
//! only enforces the length contract: extra lines are cut, missing tail
//! positions fall back to their source text.

use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

/// `<integer>. <text>`
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.\s*(.*)$").expect("numbered-line pattern is valid"));

/// Extracts translations, in response order, from a raw response.
pub trait ResponseParser: Send + Sync {
    fn extract(&self, raw: &str) -> Vec<String>;
}

/// Parser for the numbered one-line-per-input convention.
/// The ordinal is checked for shape only; position in the response decides
/// which request it answers.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberedLineParser;

impl ResponseParser for NumberedLineParser {
    fn extract(&self, raw: &str) -> Vec<String> {
        let mut out = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line == "---" {
                continue;
            }
            match NUMBERED_LINE.captures(line) {
                Some(caps) => {
                    let payload = caps.get(2).map_or("", |m| m.as_str()).trim();
                    if payload.is_empty() {
                        warn!(line, "empty translation for numbered line");
                    } else {
                        out.push(payload.to_string());
                    }
                }
                None => warn!(line, "skipping non-numbered line"),
            }
        }
        out
    }
}

/// Result of reconciling one response against its request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    /// Exactly one value per requested text, index-aligned.
    pub translations: Vec<String>,
    /// Lines the parser extracted before truncation/padding.
    pub extracted: usize,
    /// Tail positions filled with their source text.
    pub padded: usize,
}

impl Reconciled {
    /// Whether position `i` holds a real translation rather than a fallback.
    pub fn is_translated(&self, i: usize) -> bool {
        i < self.translations.len() - self.padded
    }
}

pub struct ResponseReconciler {
    parser: Box<dyn ResponseParser>,
}

impl Default for ResponseReconciler {
    fn default() -> Self {
        Self::new(Box::new(NumberedLineParser))
    }
}

impl ResponseReconciler {
    pub fn new(parser: Box<dyn ResponseParser>) -> Self {
        Self { parser }
    }

    /// Parse `raw` into `sources.len()` values.
    pub fn reconcile(&self, raw: &str, sources: &[String]) -> Reconciled {
        let expected = sources.len();
        let mut translations = self.parser.extract(raw);
        let extracted = translations.len();

        if extracted != expected {
            warn!(extracted, expected, "translation count mismatch, normalizing");
        }
        translations.truncate(expected);
        let kept = translations.len();
        let padded = expected - kept;
        translations.extend(sources[kept..].iter().cloned());

        Reconciled {
            translations,
            extracted,
            padded,
        }
    }
}
