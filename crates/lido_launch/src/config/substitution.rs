//! Substitution engine for $(arg) and $(env) patterns in command templates

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

/// Regex for matching substitution patterns: $(type value)
static SUBSTITUTION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\((\w+)\s+([^)]+)\)|\$\((\w+)\)").unwrap());

const MAX_ITERATIONS: usize = 10;

/// Values available to command templates
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    /// Profile arguments, CLI overrides and exported endpoint captures
    pub args: HashMap<String, String>,
    /// Environment overrides consulted before the process environment
    pub env: HashMap<String, String>,
}

impl SubstitutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(name.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: HashMap<String, String>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn with_envs(mut self, envs: HashMap<String, String>) -> Self {
        self.env.extend(envs);
        self
    }

    /// Set or replace an argument on an existing context
    pub fn set_arg(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.args.insert(name.into(), value.into());
    }

    /// Whether an argument resolves to a non-empty value
    pub fn is_set(&self, name: &str) -> bool {
        self.args
            .get(name)
            .and_then(|v| self.substitute(v).ok())
            .is_some_and(|v| !v.is_empty())
    }

    /// Substitute all patterns in a string
    pub fn substitute(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut result = input.to_string();
        let mut last_result = String::new();

        // Nested values need repeated passes
        let mut iterations = 0;
        while result != last_result && iterations < MAX_ITERATIONS {
            last_result = result.clone();
            result = self.substitute_once(&result)?;
            iterations += 1;
        }

        if iterations >= MAX_ITERATIONS && result.contains("$(") {
            return Err(SubstitutionError::MaxIterationsExceeded(input.to_string()));
        }

        Ok(result)
    }

    /// Substitute every element of an argv template
    pub fn substitute_all(&self, inputs: &[String]) -> Result<Vec<String>, SubstitutionError> {
        inputs.iter().map(|s| self.substitute(s)).collect()
    }

    fn substitute_once(&self, input: &str) -> Result<String, SubstitutionError> {
        let mut error: Option<SubstitutionError> = None;

        let result = SUBSTITUTION_PATTERN.replace_all(input, |caps: &Captures| {
            if error.is_some() {
                return String::new();
            }

            match self.resolve_capture(caps) {
                Ok(value) => value,
                Err(e) => {
                    error = Some(e);
                    String::new()
                }
            }
        });

        if let Some(e) = error {
            return Err(e);
        }

        Ok(result.into_owned())
    }

    fn resolve_capture(&self, caps: &Captures) -> Result<String, SubstitutionError> {
        // $(type value), e.g. $(arg fork)
        if let (Some(subst_type), Some(value)) = (caps.get(1), caps.get(2)) {
            return self.resolve_typed(subst_type.as_str(), value.as_str().trim());
        }

        // $(type) with no value is never valid for arg/env
        if let Some(subst_type) = caps.get(3) {
            return self.resolve_typed(subst_type.as_str(), "");
        }

        let pattern = caps.get(0).map_or("", |m| m.as_str());
        Err(SubstitutionError::InvalidPattern(pattern.to_string()))
    }

    fn resolve_typed(&self, subst_type: &str, value: &str) -> Result<String, SubstitutionError> {
        match subst_type {
            "arg" if !value.is_empty() => self.resolve_arg(value),
            "env" if !value.is_empty() => self.resolve_env(value),
            "arg" | "env" => Err(SubstitutionError::InvalidPattern(format!("$({})", subst_type))),
            _ => Err(SubstitutionError::UnknownType(subst_type.to_string())),
        }
    }

    fn resolve_arg(&self, name: &str) -> Result<String, SubstitutionError> {
        self.args
            .get(name)
            .cloned()
            .ok_or_else(|| SubstitutionError::UndefinedArg(name.to_string()))
    }

    fn resolve_env(&self, name: &str) -> Result<String, SubstitutionError> {
        if let Some(value) = self.env.get(name) {
            return Ok(value.clone());
        }

        std::env::var(name).map_err(|_| SubstitutionError::UndefinedEnv(name.to_string()))
    }
}

/// Errors that can occur during substitution
#[derive(Debug, thiserror::Error)]
pub enum SubstitutionError {
    #[error("Unknown substitution type: {0}")]
    UnknownType(String),

    #[error("Undefined argument: {0}")]
    UndefinedArg(String),

    #[error("Undefined environment variable: {0}")]
    UndefinedEnv(String),

    #[error("Invalid substitution pattern: {0}")]
    InvalidPattern(String),

    #[error("Maximum substitution iterations exceeded for: {0}")]
    MaxIterationsExceeded(String),
}
