//! Assertion helpers for checks
//!
//! Each helper returns `Err(CaseFailure::Assertion)` carrying the expectation,
//! the expected value and the value actually observed.

use regex::Regex;
use serde_json::Value;
use std::fmt::{Debug, Display};

use crate::error::{AssertionFailure, CaseFailure};

/// How a check finished when it did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Passed,
    Skipped(String),
}

pub type CheckResult = Result<Completion, CaseFailure>;

pub fn fail(expectation: impl Into<String>, expected: impl Display, actual: impl Display) -> CaseFailure {
    CaseFailure::Assertion(AssertionFailure {
        expectation: expectation.into(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}

pub fn expect_eq<T: PartialEq + Debug>(expectation: &str, actual: T, expected: T) -> Result<(), CaseFailure> {
    if actual == expected {
        Ok(())
    } else {
        Err(fail(expectation, format!("{expected:?}"), format!("{actual:?}")))
    }
}

pub fn expect_contains(expectation: &str, haystack: &str, needle: &str) -> Result<(), CaseFailure> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(fail(
            expectation,
            format!("text containing {needle:?}"),
            format!("{:?}", preview(haystack)),
        ))
    }
}

pub fn expect_matches(expectation: &str, actual: &str, pattern: &Regex) -> Result<(), CaseFailure> {
    if pattern.is_match(actual) {
        Ok(())
    } else {
        Err(fail(expectation, format!("/{}/", pattern.as_str()), format!("{actual:?}")))
    }
}

/// Present and non-empty
pub fn expect_truthy(expectation: &str, value: Option<&str>) -> Result<(), CaseFailure> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        Some(v) => Err(fail(expectation, "a non-empty value", format!("{v:?}"))),
        None => Err(fail(expectation, "a non-empty value", "nothing")),
    }
}

pub fn expect_at_most<T: PartialOrd + Display>(expectation: &str, actual: T, limit: T) -> Result<(), CaseFailure> {
    if actual <= limit {
        Ok(())
    } else {
        Err(fail(expectation, format!("<= {limit}"), actual))
    }
}

pub fn expect_less_than<T: PartialOrd + Display>(expectation: &str, actual: T, limit: T) -> Result<(), CaseFailure> {
    if actual < limit {
        Ok(())
    } else {
        Err(fail(expectation, format!("< {limit}"), actual))
    }
}

/// `value[key]` exists; returns it
pub fn expect_property<'a>(expectation: &str, value: &'a Value, key: &str) -> Result<&'a Value, CaseFailure> {
    value
        .as_object()
        .and_then(|o| o.get(key))
        .ok_or_else(|| fail(expectation, format!("property {key:?}"), preview(&value.to_string())))
}

/// JavaScript truthiness of a JSON value
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn preview(s: &str) -> String {
    const LIMIT: usize = 200;
    if s.chars().count() > LIMIT {
        let cut: String = s.chars().take(LIMIT).collect();
        format!("{cut}…")
    } else {
        s.to_string()
    }
}
