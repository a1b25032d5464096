//! Readiness classification of captured process output
//!
//! A [`ReadinessMatcher`] is a pure function over the text a service has
//! written so far. It never touches processes, so every pattern table can be
//! tested against literal strings.

use indexmap::IndexMap;
use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

use crate::config::{ReadinessSpec, StreamSelector};

/// Terminal colour and cursor sequences emitted by dev servers
static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").unwrap());

/// Capture name holding the service's connection URL
pub const URL_CAPTURE: &str = "url";

/// Values extracted from a service's output once it is ready
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    captures: IndexMap<String, String>,
}

impl Endpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.captures.insert(name.into(), value.into());
        self
    }

    /// The connection URL, when the service reports one
    pub fn url(&self) -> Option<&str> {
        self.get(URL_CAPTURE)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.captures.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (name, value) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", name, value)?;
            first = false;
        }
        Ok(())
    }
}

/// Outcome of matching one output snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Neither marker seen yet
    Pending,
    /// Success marker and all required captures found
    Ready(Endpoint),
    /// Error marker found; carries the offending line
    Failed(String),
}

#[derive(Debug, Clone)]
struct CaptureRule {
    name: String,
    pattern: Regex,
    required: bool,
}

/// Per-service success/error pattern table
#[derive(Debug, Clone, Default)]
pub struct ReadinessMatcher {
    success: Option<Regex>,
    captures: Vec<CaptureRule>,
    error: Option<Regex>,
    error_stream: StreamSelector,
    hints: Vec<(Regex, String)>,
}

impl ReadinessMatcher {
    /// A matcher with no markers: never ready, never failed
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_spec(readiness: &ReadinessSpec) -> Result<Self, regex::Error> {
        let mut matcher = Self::new().with_error_stream(readiness.error_stream);

        if let Some(success) = &readiness.success {
            matcher = matcher.with_success(success)?;
        }
        for (name, pattern) in &readiness.captures {
            matcher = matcher.with_capture(name, pattern)?;
        }
        for (name, pattern) in &readiness.optional_captures {
            matcher = matcher.with_optional_capture(name, pattern)?;
        }
        if let Some(error) = &readiness.error {
            matcher = matcher.with_error(error)?;
        }
        for (pattern, hint) in &readiness.hints {
            matcher = matcher.with_hint(pattern, hint)?;
        }

        Ok(matcher)
    }

    pub fn with_success(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.success = Some(Regex::new(pattern)?);
        Ok(self)
    }

    /// Add a capture that must be present before the service counts as ready.
    ///
    /// The first group of `pattern` is the extracted value.
    pub fn with_capture(self, name: &str, pattern: &str) -> Result<Self, regex::Error> {
        self.push_capture(name, pattern, true)
    }

    pub fn with_optional_capture(self, name: &str, pattern: &str) -> Result<Self, regex::Error> {
        self.push_capture(name, pattern, false)
    }

    fn push_capture(
        mut self,
        name: &str,
        pattern: &str,
        required: bool,
    ) -> Result<Self, regex::Error> {
        self.captures.push(CaptureRule {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
            required,
        });
        Ok(self)
    }

    pub fn with_error(mut self, pattern: &str) -> Result<Self, regex::Error> {
        self.error = Some(Regex::new(pattern)?);
        Ok(self)
    }

    pub fn with_error_stream(mut self, stream: StreamSelector) -> Self {
        self.error_stream = stream;
        self
    }

    pub fn with_hint(mut self, pattern: &str, hint: &str) -> Result<Self, regex::Error> {
        self.hints.push((Regex::new(pattern)?, hint.to_string()));
        Ok(self)
    }

    /// Rewrite hint texts, e.g. to resolve `$(arg ...)` placeholders
    pub fn map_hints(mut self, mut f: impl FnMut(&str) -> String) -> Self {
        for (_, hint) in &mut self.hints {
            *hint = f(hint);
        }
        self
    }

    pub fn has_success_marker(&self) -> bool {
        self.success.is_some()
    }

    /// Classify the output accumulated so far.
    ///
    /// A complete success match is honoured before the error marker is
    /// consulted, so error-like text next to a real success never fails the
    /// service.
    pub fn evaluate(&self, stdout: &str, stderr: &str) -> Verdict {
        let stdout = strip_ansi(stdout);
        let stderr = strip_ansi(stderr);

        if let Some(endpoint) = self.match_success(&stdout, &stderr) {
            return Verdict::Ready(endpoint);
        }

        match self.error_line(&stdout, &stderr) {
            Some(line) => Verdict::Failed(self.with_hint_text(line, &stdout, &stderr)),
            None => Verdict::Pending,
        }
    }

    /// The first error line, with any matching hint appended
    pub fn find_error(&self, stdout: &str, stderr: &str) -> Option<String> {
        let stdout = strip_ansi(stdout);
        let stderr = strip_ansi(stderr);
        self.error_line(&stdout, &stderr)
            .map(|line| self.with_hint_text(line, &stdout, &stderr))
    }

    /// The first hint whose pattern matches either stream
    pub fn hint(&self, stdout: &str, stderr: &str) -> Option<&str> {
        self.hints
            .iter()
            .find(|(pattern, _)| pattern.is_match(stdout) || pattern.is_match(stderr))
            .map(|(_, hint)| hint.as_str())
    }

    fn match_success(&self, stdout: &str, stderr: &str) -> Option<Endpoint> {
        let success = self.success.as_ref()?;
        if !success.is_match(stdout) && !success.is_match(stderr) {
            return None;
        }

        let mut endpoint = Endpoint::new();
        for rule in &self.captures {
            match first_capture(&rule.pattern, stdout, stderr) {
                Some(value) => {
                    endpoint.captures.insert(rule.name.clone(), value);
                }
                // The marker can land before the line carrying the value
                None if rule.required => return None,
                None => {}
            }
        }

        Some(endpoint)
    }

    fn error_line(&self, stdout: &str, stderr: &str) -> Option<String> {
        let error = self.error.as_ref()?;
        let streams: &[&str] = match self.error_stream {
            StreamSelector::Stdout => &[stdout],
            StreamSelector::Stderr => &[stderr],
            StreamSelector::Any => &[stderr, stdout],
        };

        streams.iter().find_map(|text| {
            error
                .find(text)
                .map(|m| line_around(text, m.start(), m.end()).to_string())
        })
    }

    fn with_hint_text(&self, line: String, stdout: &str, stderr: &str) -> String {
        match self.hint(stdout, stderr) {
            Some(hint) => format!("{}\n{}", line, hint),
            None => line,
        }
    }
}

/// First match of `pattern` in stdout, then stderr, as its first group
fn first_capture(pattern: &Regex, stdout: &str, stderr: &str) -> Option<String> {
    [stdout, stderr].iter().find_map(|text| {
        pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}

/// The full line containing the byte range `start..end`
fn line_around(text: &str, start: usize, end: usize) -> &str {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line_end = text[end..].find('\n').map_or(text.len(), |i| end + i);
    text[line_start..line_end].trim_end_matches('\r')
}

pub fn strip_ansi(text: &str) -> Cow<'_, str> {
    ANSI_ESCAPE.replace_all(text, "")
}
