//! Path segment matchers and capture bookkeeping

use crate::flatten::types::{Key, ResolvedValue, Segment};
use crate::flatten::value::{resolve_value, ValueResolver};
use once_cell::sync::OnceCell;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::rc::Rc;

/// Join delimiter for repeated wildcard captures
pub const DEFAULT_DELIMITER: &str = ",";

/// Columns a matcher writes when it matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureSpec {
    /// Column receiving the raw matched key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Columns resolved against the matched node
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub columns: BTreeMap<String, ValueResolver>,

    /// Only used by wildcards, which join repeated captures into one cell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

impl CaptureSpec {
    pub fn key(column: impl Into<String>) -> Self {
        CaptureSpec {
            key: Some(column.into()),
            ..Default::default()
        }
    }

    pub fn column(mut self, name: impl Into<String>, resolver: ValueResolver) -> Self {
        self.columns.insert(name.into(), resolver);
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = Some(delimiter.into());
        self
    }

    pub fn join_delimiter(&self) -> &str {
        self.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER)
    }

    /// Every column this capture writes, key column first
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.key
            .as_deref()
            .into_iter()
            .chain(self.columns.keys().map(String::as_str))
    }
}

/// A regular expression matcher; the pattern is compiled once and cached
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegexpMatcher {
    pub pattern: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub flags: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<CaptureSpec>,

    #[serde(skip)]
    compiled: OnceCell<Regex>,
}

impl RegexpMatcher {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        RegexpMatcher {
            pattern: pattern.into(),
            flags: flags.into(),
            ..Default::default()
        }
    }

    /// The compiled pattern, built on first use
    pub fn regex(&self) -> Result<&Regex, String> {
        self.compiled
            .get_or_try_init(|| build_regex(&self.pattern, &self.flags))
    }
}

impl PartialEq for RegexpMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.flags == other.flags && self.capture == other.capture
    }
}

/// Flags follow the usual regexp letters: `i`, `m`, `s`, `y` (anchor at start);
/// `u` and `g` are accepted and change nothing.
fn build_regex(pattern: &str, flags: &str) -> Result<Regex, String> {
    let mut case_insensitive = false;
    let mut multi_line = false;
    let mut dot_all = false;
    let mut sticky = false;
    for flag in flags.chars() {
        match flag {
            'i' => case_insensitive = true,
            'm' => multi_line = true,
            's' => dot_all = true,
            'y' => sticky = true,
            'u' | 'g' => {}
            other => return Err(format!("unsupported flag '{}'", other)),
        }
    }

    let source = if sticky {
        format!(r"\A(?:{})", pattern)
    } else {
        pattern.to_string()
    };

    RegexBuilder::new(&source)
        .case_insensitive(case_insensitive)
        .multi_line(multi_line)
        .dot_matches_new_line(dot_all)
        .build()
        .map_err(|e| e.to_string())
}

/// One path segment test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Matcher {
    /// Exact key equality
    #[serde(rename = "literal")]
    Literal {
        key: Segment,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<CaptureSpec>,
    },

    /// Any array index
    #[serde(rename = "index")]
    Index {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<CaptureSpec>,
    },

    /// Keys whose textual form matches a pattern
    #[serde(rename = "regexp")]
    Regexp(RegexpMatcher),

    /// Any key, spanning one or more levels
    #[serde(rename = "**")]
    Wildcard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        capture: Option<CaptureSpec>,
    },
}

impl Matcher {
    pub fn literal(key: impl Into<Segment>) -> Self {
        Matcher::Literal {
            key: key.into(),
            capture: None,
        }
    }

    pub fn index() -> Self {
        Matcher::Index { capture: None }
    }

    pub fn regexp(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Matcher::Regexp(RegexpMatcher::new(pattern, flags))
    }

    pub fn wildcard() -> Self {
        Matcher::Wildcard { capture: None }
    }

    pub fn with_capture(mut self, spec: CaptureSpec) -> Self {
        *self.capture_slot() = Some(spec);
        self
    }

    /// Shorthand for capturing the raw key into `column`
    pub fn capture_key_as(self, column: impl Into<String>) -> Self {
        self.with_capture(CaptureSpec::key(column))
    }

    pub fn capture(&self) -> Option<&CaptureSpec> {
        match self {
            Matcher::Literal { capture, .. }
            | Matcher::Index { capture }
            | Matcher::Wildcard { capture } => capture.as_ref(),
            Matcher::Regexp(re) => re.capture.as_ref(),
        }
    }

    fn capture_slot(&mut self) -> &mut Option<CaptureSpec> {
        match self {
            Matcher::Literal { capture, .. }
            | Matcher::Index { capture }
            | Matcher::Wildcard { capture } => capture,
            Matcher::Regexp(re) => &mut re.capture,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Matcher::Wildcard { .. })
    }
}

/// Does `key` satisfy `matcher`?
pub fn matches(key: Key<'_>, matcher: &Matcher) -> bool {
    match matcher {
        Matcher::Literal { key: literal, .. } => literal.matches_key(key),
        Matcher::Index { .. } => matches!(key, Key::Index(_)),
        // Patterns are checked at validation; an uncompilable one matches nothing.
        Matcher::Regexp(re) => re
            .regex()
            .map(|regex| regex.is_match(&key.as_text()))
            .unwrap_or(false),
        Matcher::Wildcard { .. } => true,
    }
}

/// Captured column values carried along one traversal branch.
///
/// Cloning is cheap and shares storage; any write copies first if the
/// storage is shared, so sibling branches never see each other's updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures(Rc<BTreeMap<String, ResolvedValue>>);

impl Captures {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&ResolvedValue> {
        self.0.get(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ResolvedValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn set(&mut self, column: &str, value: ResolvedValue) {
        Rc::make_mut(&mut self.0).insert(column.to_string(), value);
    }

    fn append(&mut self, column: &str, value: ResolvedValue, delimiter: &str) {
        if value.is_missing() {
            return;
        }
        Rc::make_mut(&mut self.0)
            .entry(column.to_string())
            .or_default()
            .append(value, delimiter);
    }

    fn store(&mut self, column: &str, value: ResolvedValue, join: Option<&str>) {
        match join {
            Some(delimiter) => self.append(column, value, delimiter),
            None => self.set(column, value),
        }
    }
}

/// Apply `matcher`'s capture spec for a match of `key` on `node`.
///
/// Returns `captures` untouched (sharing storage) when the matcher captures
/// nothing. Wildcards append to existing cells with their join delimiter;
/// every other matcher overwrites.
pub fn update_captures(
    key: Key<'_>,
    node: &Value,
    ancestors: &[&Value],
    matcher: &Matcher,
    captures: &Captures,
) -> Captures {
    let Some(spec) = matcher.capture() else {
        return captures.clone();
    };

    let join = matcher.is_wildcard().then(|| spec.join_delimiter());
    let mut updated = captures.clone();

    if let Some(column) = &spec.key {
        updated.store(column, ResolvedValue::from(key), join);
    }
    for (column, resolver) in &spec.columns {
        updated.store(column, resolve_value(node, ancestors, resolver), join);
    }

    updated
}
