//! Error types for E2E testing

use std::time::Duration;
use thiserror::Error;

/// Harness-level faults. Anything raised here before the run starts aborts
/// the whole run; anything raised while a case executes is folded into that
/// case's [`CaseFailure`].
#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Server failed to start: {0}")]
    ServerStartup(String),

    #[error("Server did not become ready after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Port {0} is already used; set web_server.reuse_existing_server = true to reuse it")]
    PortInUse(u16),

    #[error("Playwright not found. Install with: npx playwright install")]
    PlaywrightNotFound,

    #[error("Playwright error: {0}")]
    Playwright(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Too many redirects starting at {0}")]
    TooManyRedirects(String),

    #[error("Timeout waiting for: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// A violated expectation, recorded with what was expected and what was seen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expectation}: expected {expected}, received {actual}")]
pub struct AssertionFailure {
    pub expectation: String,
    pub expected: String,
    pub actual: String,
}

/// Why a single case attempt failed. Never propagates past the case.
#[derive(Debug, Clone, Error)]
pub enum CaseFailure {
    #[error("{0}")]
    Assertion(#[from] AssertionFailure),

    #[error("request failed: {0}")]
    Request(String),

    #[error("browser probe failed: {0}")]
    Browser(String),

    #[error("test timed out after {0:?}")]
    Timeout(Duration),
}

impl CaseFailure {
    /// Short machine-readable kind used by the reporters.
    pub fn kind(&self) -> &'static str {
        match self {
            CaseFailure::Assertion(_) => "assertion",
            CaseFailure::Request(_) => "request",
            CaseFailure::Browser(_) => "browser",
            CaseFailure::Timeout(_) => "timeout",
        }
    }
}

impl From<E2eError> for CaseFailure {
    fn from(err: E2eError) -> Self {
        match err {
            E2eError::Playwright(msg) => CaseFailure::Browser(msg),
            E2eError::PlaywrightNotFound => CaseFailure::Browser(err.to_string()),
            other => CaseFailure::Request(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assertion_message_carries_expected_and_actual() {
        let failure = AssertionFailure {
            expectation: "status of GET /health".to_string(),
            expected: "200".to_string(),
            actual: "503".to_string(),
        };
        assert_eq!(
            failure.to_string(),
            "expected status of GET /health: expected 200, received 503"
        );
    }

    #[test]
    fn test_playwright_errors_become_browser_failures() {
        let failure = CaseFailure::from(E2eError::Playwright("boom".into()));
        assert_eq!(failure.kind(), "browser");

        let failure = CaseFailure::from(E2eError::Timeout("/".into()));
        assert_eq!(failure.kind(), "request");
    }
}
