//! Error types for the harness

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    #[error("Fixture server failed to start: {0}")]
    ServerStartup(String),

    #[error("Fixture server health check failed after {0} attempts")]
    ServerHealthCheck(usize),

    #[error("Playwright not found. Install with: npm i playwright && npx playwright install")]
    PlaywrightNotFound,

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Unknown field '{0}' on page driver")]
    UnknownField(String),

    #[error("Script evaluation failed: {0}")]
    Evaluation(String),

    #[error("Target already closed")]
    TargetClosed,

    #[error("Timed out after {}ms waiting for {description} (last observed: {last_observed})", .elapsed.as_millis())]
    WaitTimeout {
        description: String,
        last_observed: String,
        elapsed: Duration,
    },

    #[error("Sample did not finish within {}ms", .0.as_millis())]
    SampleTimeout(Duration),

    #[error("Test spec parse error: {0}")]
    SpecParse(String),

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Dialog mismatch: expected {expected:?}, got {actual:?}")]
    DialogMismatch { expected: String, actual: String },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid pattern: {0}")]
    Regex(#[from] regex::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;
