//! Query sanitization and answer redaction

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::GuardConfig;
use crate::error::{Error, Result};

/// Marker substituted for scrubbed secrets
pub const REDACTION_MARKER: &str = "[REDACTED]";

static DEFAULT_GUARD: Lazy<QueryGuard> = Lazy::new(|| QueryGuard::new(&GuardConfig::default().forbidden_words));

static DEFAULT_REDACTOR: Lazy<Redactor> = Lazy::new(Redactor::default);

/// Rejects queries that ask for sensitive material
#[derive(Debug, Clone)]
pub struct QueryGuard {
    /// Lowercased forbidden substrings
    forbidden: Vec<String>,
}

impl QueryGuard {
    pub fn new(words: &[String]) -> Self {
        Self {
            forbidden: words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &GuardConfig) -> Self {
        Self::new(&config.forbidden_words)
    }

    /// `false` when the query contains any forbidden word, ignoring case
    pub fn is_safe(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        !self.forbidden.iter().any(|w| query.contains(w.as_str()))
    }
}

/// Check a query against the default forbidden words
pub fn sanitize_query(query: &str) -> bool {
    DEFAULT_GUARD.is_safe(query)
}

/// Scrubs credential-shaped substrings from generated text
#[derive(Debug, Clone)]
pub struct Redactor {
    rules: Vec<(Regex, &'static str)>,
}

impl Redactor {
    /// Built-in rules plus `extra` patterns, each replaced by the marker
    pub fn new(extra: &[String]) -> Result<Self> {
        let mut rules = builtin_rules();
        for pattern in extra {
            let regex = Regex::new(pattern)
                .map_err(|e| Error::Config(format!("invalid redaction pattern {:?}: {}", pattern, e)))?;
            rules.push((regex, REDACTION_MARKER));
        }
        Ok(Self { rules })
    }

    pub fn from_config(config: &GuardConfig) -> Result<Self> {
        Self::new(&config.extra_redaction_patterns)
    }

    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (regex, replacement) in &self.rules {
            if regex.is_match(&out) {
                out = regex.replace_all(&out, *replacement).into_owned();
            }
        }
        out
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self {
            rules: builtin_rules(),
        }
    }
}

fn builtin_rules() -> Vec<(Regex, &'static str)> {
    // Both patterns are literals known to compile
    [
        (r"AKIA[0-9A-Z]{16}", REDACTION_MARKER),
        (r"(?i)password\s*=\s*\S+", "password=[REDACTED]"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|r| (r, replacement)))
    .collect()
}

/// Scrub text with the built-in rules
pub fn redact_sensitive_data(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}
