//! Declarative YAML test specification

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};
use crate::events::{DialogKind, DialogPolicy};
use crate::target::Probe;

/// A complete test specification parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSpec {
    /// Unique name for this test
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering tests
    #[serde(default)]
    pub tags: Vec<String>,

    /// Page path relative to the fixture base URL, or an absolute URL
    pub page: String,

    /// How native dialogs are answered for the whole test
    #[serde(default)]
    pub dialog_policy: DialogPolicy,

    /// Field name -> selector
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Steps to execute in order
    pub steps: Vec<TestStep>,
}

/// What a step samples from a field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reading {
    #[default]
    Text,
    Value,
    Attribute(String),
    Style(String),
    /// Number of matching elements, as a decimal string
    Count,
}

impl Reading {
    /// The target probe for this reading; `None` for counts
    pub fn probe(&self) -> Option<Probe> {
        match self {
            Reading::Text => Some(Probe::Text),
            Reading::Value => Some(Probe::InputValue),
            Reading::Attribute(name) => Some(Probe::Attribute(name.clone())),
            Reading::Style(property) => Some(Probe::Style(property.clone())),
            Reading::Count => None,
        }
    }
}

/// A check on a sampled reading. `None` means the element is absent.
///
/// Text comparisons trim surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equals(String),
    Contains(String),
    /// Regular expression search
    Matches(Pattern),
    /// Parsed as a number, at least this value
    AtLeast(f64),
    /// Parsed as a number, at most this value
    AtMost(f64),
    /// Present with a non-empty reading
    NotEmpty,
    /// Absent or present with an empty reading
    Empty,
    Present,
    Absent,
}

impl Condition {
    pub fn check(&self, reading: Option<&str>) -> bool {
        match (self, reading) {
            (Condition::Absent, reading) => reading.is_none(),
            (Condition::Present, reading) => reading.is_some(),
            (Condition::Empty, reading) => reading.map(|r| r.trim().is_empty()).unwrap_or(true),
            (_, None) => false,
            (Condition::Equals(expected), Some(r)) => r.trim() == expected.trim(),
            (Condition::Contains(needle), Some(r)) => r.contains(needle.as_str()),
            (Condition::Matches(pattern), Some(r)) => pattern.is_match(r),
            (Condition::AtLeast(min), Some(r)) => parse_number(r).map(|n| n >= *min).unwrap_or(false),
            (Condition::AtMost(max), Some(r)) => parse_number(r).map(|n| n <= *max).unwrap_or(false),
            (Condition::NotEmpty, Some(r)) => !r.trim().is_empty(),
        }
    }
}

/// A regular expression compiled once when the spec is parsed
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern(Regex);

impl Pattern {
    pub fn new(pattern: &str) -> E2eResult<Self> {
        Ok(Self(Regex::new(pattern)?))
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Pattern {
    type Error = regex::Error;

    fn try_from(pattern: String) -> Result<Self, Self::Error> {
        Regex::new(&pattern).map(Self)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.0.as_str().to_string()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::fmt::Display for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Condition::Equals(s) => write!(f, "equals {:?}", s),
            Condition::Contains(s) => write!(f, "contains {:?}", s),
            Condition::Matches(s) => write!(f, "matches /{}/", s),
            Condition::AtLeast(n) => write!(f, ">= {}", n),
            Condition::AtMost(n) => write!(f, "<= {}", n),
            Condition::NotEmpty => write!(f, "is not empty"),
            Condition::Empty => write!(f, "is empty"),
            Condition::Present => write!(f, "is present"),
            Condition::Absent => write!(f, "is absent"),
        }
    }
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse().ok()
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TestStep {
    /// Navigate to the spec's page
    Goto,

    Fill {
        field: String,
        value: String,
    },

    Click {
        field: String,
    },

    Select {
        field: String,
        value: String,
    },

    Check {
        field: String,
    },

    Uncheck {
        field: String,
    },

    Press {
        field: String,
        key: String,
    },

    /// Poll a field reading until the condition holds
    WaitFor {
        field: String,
        #[serde(default)]
        read: Reading,
        condition: Condition,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        poll_interval_ms: Option<u64>,
    },

    /// Poll a script expression until it is truthy
    WaitForScript {
        expression: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
        #[serde(default)]
        poll_interval_ms: Option<u64>,
    },

    /// Check a field reading once, right now
    Assert {
        field: String,
        #[serde(default)]
        read: Reading,
        condition: Condition,
    },

    /// Expect exactly one dialog since the last dialog assertion, with this
    /// message. Consumes the dialog events.
    AssertDialog {
        message: String,
        #[serde(default)]
        dialog_type: Option<DialogKind>,
    },

    AssertNoDialogs,

    /// Check captured errors (exceptions and console errors)
    AssertErrors {
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        contains: Option<String>,
    },

    AssertNoErrors,

    /// Clear the sidecar buffer
    ResetEvents,

    /// Evaluate a script expression, optionally comparing the result
    Evaluate {
        expression: String,
        #[serde(default)]
        expected: Option<serde_json::Value>,
    },

    /// Wait for a fixed amount of time (use sparingly)
    Sleep {
        ms: u64,
    },

    /// Log a message (for debugging)
    Log {
        message: String,
    },
}

impl TestStep {
    /// Short label used in results and logs
    pub fn name(&self) -> String {
        match self {
            TestStep::Goto => "goto".to_string(),
            TestStep::Fill { field, .. } => format!("fill:{}", field),
            TestStep::Click { field } => format!("click:{}", field),
            TestStep::Select { field, .. } => format!("select:{}", field),
            TestStep::Check { field } => format!("check:{}", field),
            TestStep::Uncheck { field } => format!("uncheck:{}", field),
            TestStep::Press { field, key } => format!("press:{}:{}", field, key),
            TestStep::WaitFor { field, .. } => format!("wait_for:{}", field),
            TestStep::WaitForScript { .. } => "wait_for_script".to_string(),
            TestStep::Assert { field, .. } => format!("assert:{}", field),
            TestStep::AssertDialog { .. } => "assert_dialog".to_string(),
            TestStep::AssertNoDialogs => "assert_no_dialogs".to_string(),
            TestStep::AssertErrors { .. } => "assert_errors".to_string(),
            TestStep::AssertNoErrors => "assert_no_errors".to_string(),
            TestStep::ResetEvents => "reset_events".to_string(),
            TestStep::Evaluate { .. } => "evaluate".to_string(),
            TestStep::Sleep { ms } => format!("sleep:{}ms", ms),
            TestStep::Log { message } => {
                format!("log:{}", message.chars().take(30).collect::<String>())
            }
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            TestStep::Fill { field, .. }
            | TestStep::Click { field }
            | TestStep::Select { field, .. }
            | TestStep::Check { field }
            | TestStep::Uncheck { field }
            | TestStep::Press { field, .. }
            | TestStep::WaitFor { field, .. }
            | TestStep::Assert { field, .. } => Some(field),
            _ => None,
        }
    }
}

impl TestSpec {
    /// Parse a test spec from YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let spec: Self = serde_yaml::from_str(yaml)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parse a test spec from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::SpecParse(format!("{}: {}", path.display(), e)))
    }

    /// Load all test specs from a directory, sorted by name
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut specs = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            let spec = Self::from_file(entry.path())?;
            specs.push(spec);
        }

        specs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(specs)
    }

    /// Filter specs by tag
    pub fn filter_by_tag<'a>(specs: &'a [Self], tag: &str) -> Vec<&'a Self> {
        specs.iter().filter(|s| s.tags.iter().any(|t| t == tag)).collect()
    }

    /// Every field a step uses must be declared
    pub fn validate(&self) -> E2eResult<()> {
        for step in &self.steps {
            if let Some(field) = step.field() {
                if !self.fields.contains_key(field) {
                    return Err(E2eError::SpecParse(format!(
                        "{}: step '{}' uses undeclared field '{}'",
                        self.name,
                        step.name(),
                        field
                    )));
                }
            }
        }
        Ok(())
    }

    /// Absolute URL of the page under `base_url`
    pub fn page_url(&self, base_url: &str) -> String {
        if self.page.starts_with("http://") || self.page.starts_with("https://") || self.page.starts_with("file://") {
            return self.page.clone();
        }
        format!(
            "{}/{}",
            base_url.trim_end_matches('/'),
            self.page.trim_start_matches('/')
        )
    }
}
