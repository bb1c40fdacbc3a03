//! The seam between the harness and a live page.
//!
//! A [`Target`] is one page inside one browser context. It is exclusively
//! owned by a single test for its lifetime; see [`crate::session::Session`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::events::{DialogPolicy, ObservedEvent};

/// Callback invoked once per observed event, in arrival order
pub type EventListener = Arc<dyn Fn(ObservedEvent) + Send + Sync>;

/// What to read from an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "probe", content = "name", rename_all = "snake_case")]
pub enum Probe {
    /// `textContent`
    Text,
    /// `value` of an input, select or textarea
    InputValue,
    /// An attribute by name
    Attribute(String),
    /// A computed style property, e.g. `background-color`
    Style(String),
}

/// A user input dispatched to an element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "value", rename_all = "snake_case")]
pub enum Action {
    Click,
    Fill(String),
    Select(String),
    Check,
    Uncheck,
    Press(String),
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Click => "click",
            Action::Fill(_) => "fill",
            Action::Select(_) => "select",
            Action::Check => "check",
            Action::Uncheck => "uncheck",
            Action::Press(_) => "press",
        }
    }
}

#[async_trait]
pub trait Target: Send + Sync {
    /// Navigate to an absolute URL and wait for the load event
    async fn goto(&self, url: &str) -> E2eResult<()>;

    /// Read from the first element matching `selector`; `None` when absent
    async fn read(&self, selector: &str, probe: &Probe) -> E2eResult<Option<String>>;

    /// Number of elements matching `selector`
    async fn count(&self, selector: &str) -> E2eResult<usize>;

    /// Dispatch an input. Returns once the browser has accepted it; does not
    /// wait for any effect.
    async fn act(&self, selector: &str, action: &Action) -> E2eResult<()>;

    /// Evaluate a JavaScript expression in the page and return its JSON value
    async fn evaluate(&self, expression: &str) -> E2eResult<serde_json::Value>;

    /// Change how subsequent native dialogs are answered
    async fn set_dialog_policy(&self, policy: DialogPolicy) -> E2eResult<()>;

    /// Register a listener for console, exception and dialog events.
    ///
    /// Listeners only see events emitted after registration. Registering the
    /// same sink twice delivers every event twice.
    fn add_listener(&self, listener: EventListener);

    /// Release the page and its browser context. Further calls fail with
    /// [`crate::E2eError::TargetClosed`].
    async fn close(&self) -> E2eResult<()>;
}
