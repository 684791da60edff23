//! Raw job argument parsing.
//!
//! Job runners hand us a flat token list such as
//! `--raw_bucket my-bucket --RAW_PREFIX landing/ --verbose`. Spellings vary
//! between runners (lower, upper, mixed case), so lookups go through a
//! table of candidate keys expanded once per setting.

use std::collections::HashMap;

/// Marker that starts a key token.
pub const KEY_MARKER: &str = "--";

/// Value assigned to a key that is followed by another key (a bare flag).
pub const FLAG_VALUE: &str = "true";

/// Parsed `--key value` pairs, first occurrence wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgMap {
    values: HashMap<String, String>,
}

impl ArgMap {
    /// Look up a key exactly as spelled.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Parse an ordered token sequence into an [`ArgMap`].
///
/// Tokens that are neither keys nor consumed as a value are ignored, which
/// lets callers pass the full process argv including the program name.
pub fn parse_args<I, S>(tokens: I) -> ArgMap
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let tokens: Vec<S> = tokens.into_iter().collect();
    let mut values = HashMap::new();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i].as_ref();
        if let Some(key) = token.strip_prefix(KEY_MARKER) {
            let mut value = FLAG_VALUE;
            if let Some(next) = tokens.get(i + 1).map(AsRef::as_ref) {
                if !next.starts_with(KEY_MARKER) {
                    value = next;
                    i += 1;
                }
            }
            values
                .entry(key.to_string())
                .or_insert_with(|| value.to_string());
        }
        i += 1;
    }

    ArgMap { values }
}

/// A logical job setting and every key spelling that may carry it.
#[derive(Debug, Clone)]
pub struct SettingSpec {
    /// Canonical name, used in summaries and missing-argument reports.
    pub name: &'static str,
    /// Candidate keys in lookup order: each candidate, then its lower- and
    /// upper-case forms.
    spellings: Vec<String>,
    pub default: Option<&'static str>,
    pub required: bool,
}

impl SettingSpec {
    pub fn new(name: &'static str, candidates: &[&str]) -> Self {
        let mut spellings: Vec<String> = Vec::with_capacity(candidates.len() * 3);
        for candidate in candidates {
            for spelling in [
                candidate.to_string(),
                candidate.to_lowercase(),
                candidate.to_uppercase(),
            ] {
                if !spellings.contains(&spelling) {
                    spellings.push(spelling);
                }
            }
        }
        Self {
            name,
            spellings,
            default: None,
            required: false,
        }
    }

    pub fn with_default(mut self, default: &'static str) -> Self {
        self.default = Some(default);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn spellings(&self) -> &[String] {
        &self.spellings
    }

    /// First supplied spelling wins; falls back to the default.
    pub fn lookup<'a>(&'a self, args: &'a ArgMap) -> Option<&'a str> {
        self.spellings
            .iter()
            .find_map(|key| args.get(key))
            .or(self.default)
    }
}
