//! Events observed on a target page: console output, uncaught exceptions
//! and native dialogs.

use serde::{Deserialize, Serialize};

/// Console message severity, named the way browsers report it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl ConsoleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsoleLevel::Log => "log",
            ConsoleLevel::Debug => "debug",
            ConsoleLevel::Info => "info",
            ConsoleLevel::Warning => "warning",
            ConsoleLevel::Error => "error",
        }
    }
}

/// Native dialog flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
    #[serde(rename = "beforeunload")]
    BeforeUnload,
}

/// A single thing the page did that a test may want to assert on.
///
/// Events are immutable once created. The sidecar buffer keeps them in
/// arrival order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ObservedEvent {
    Console {
        level: ConsoleLevel,
        text: String,
    },
    Exception {
        name: String,
        message: String,
    },
    Dialog {
        #[serde(rename = "type")]
        dialog_type: DialogKind,
        message: String,
    },
}

impl ObservedEvent {
    pub fn console(level: ConsoleLevel, text: impl Into<String>) -> Self {
        ObservedEvent::Console {
            level,
            text: text.into(),
        }
    }

    pub fn exception(name: impl Into<String>, message: impl Into<String>) -> Self {
        ObservedEvent::Exception {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn dialog(dialog_type: DialogKind, message: impl Into<String>) -> Self {
        ObservedEvent::Dialog {
            dialog_type,
            message: message.into(),
        }
    }

    /// Uncaught exceptions and `console.error` output
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ObservedEvent::Exception { .. }
                | ObservedEvent::Console {
                    level: ConsoleLevel::Error,
                    ..
                }
        )
    }

    pub fn is_dialog(&self) -> bool {
        matches!(self, ObservedEvent::Dialog { .. })
    }

    /// The human-readable payload regardless of kind
    pub fn message(&self) -> &str {
        match self {
            ObservedEvent::Console { text, .. } => text,
            ObservedEvent::Exception { message, .. } => message,
            ObservedEvent::Dialog { message, .. } => message,
        }
    }
}

impl std::fmt::Display for ObservedEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedEvent::Console { level, text } => write!(f, "console.{}: {}", level.as_str(), text),
            ObservedEvent::Exception { name, message } => write!(f, "{}: {}", name, message),
            ObservedEvent::Dialog { dialog_type, message } => {
                write!(f, "dialog({:?}): {}", dialog_type, message)
            }
        }
    }
}

/// How the target answers native dialogs.
///
/// An unanswered `alert`/`confirm` blocks the page's main thread, so every
/// target must apply one of these to every dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "text", rename_all = "snake_case")]
pub enum DialogPolicy {
    #[default]
    Accept,
    Dismiss,
    /// Accept, answering a `prompt` with the given text
    AcceptWith(String),
}

impl DialogPolicy {
    /// Whether a `confirm` answered under this policy returns true
    pub fn confirms(&self) -> bool {
        !matches!(self, DialogPolicy::Dismiss)
    }

    /// The value a `prompt` answered under this policy returns
    pub fn prompt_answer(&self) -> Option<&str> {
        match self {
            DialogPolicy::Accept => Some(""),
            DialogPolicy::Dismiss => None,
            DialogPolicy::AcceptWith(text) => Some(text),
        }
    }
}
