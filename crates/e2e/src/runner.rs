//! Main test runner that orchestrates the fixture server, browser sessions
//! and declarative specs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::RunnerConfig;
use crate::driver::PageDriver;
use crate::error::{E2eError, E2eResult};
use crate::events::ObservedEvent;
use crate::playwright::PlaywrightLauncher;
use crate::server::ServerHandle;
use crate::session::{Launcher, Session};
use crate::spec::{Condition, Reading, TestSpec, TestStep};
use crate::wait::{wait_for, wait_until_truthy, WaitOptions};

/// Result of executing a test step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub success: bool,
    pub step_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    /// Events still in the sidecar buffer when the test ended
    pub events: Vec<ObservedEvent>,
    pub error: Option<String>,
}

/// Result of running all tests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuiteResult {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub results: Vec<TestResult>,
}

/// Main E2E test runner
pub struct TestRunner {
    config: RunnerConfig,

    /// Opens one isolated page per spec
    launcher: Arc<dyn Launcher>,

    /// Running fixture server (if any)
    server: Option<ServerHandle>,
}

impl TestRunner {
    /// Create a test runner driving Playwright
    pub fn with_config(config: RunnerConfig) -> Self {
        let launcher = Arc::new(PlaywrightLauncher::new(config.browser.clone()));
        Self::with_launcher(config, launcher)
    }

    /// Create a test runner with a custom page launcher
    pub fn with_launcher(config: RunnerConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            config,
            launcher,
            server: None,
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Start the fixture server if configured to
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() || !self.config.server.enabled {
            return Ok(());
        }

        let server = ServerHandle::spawn(&self.config.server).await?;
        self.server = Some(server);
        Ok(())
    }

    /// Stop the fixture server
    pub fn stop_server(&mut self) -> E2eResult<()> {
        if let Some(mut server) = self.server.take() {
            server.stop()?;
        }
        Ok(())
    }

    /// Base URL pages are resolved against
    pub fn base_url(&self) -> E2eResult<String> {
        match (&self.server, &self.config.base_url) {
            (Some(server), _) => Ok(server.base_url().to_string()),
            (None, Some(url)) => Ok(url.clone()),
            (None, None) => Err(E2eError::Config(
                "no fixture server running and no base_url configured".to_string(),
            )),
        }
    }

    /// Run all tests in the specs directory
    pub async fn run_all(&mut self) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.paths.specs_dir)?;
        self.run_specs(&specs).await
    }

    /// Run tests matching a tag
    pub async fn run_tagged(&mut self, tag: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.paths.specs_dir)?;
        let filtered: Vec<TestSpec> = TestSpec::filter_by_tag(&specs, tag)
            .into_iter()
            .cloned()
            .collect();
        self.run_specs(&filtered).await
    }

    /// Run a specific test by name
    pub async fn run_test(&mut self, name: &str) -> E2eResult<TestSuiteResult> {
        let specs = TestSpec::load_all(&self.config.paths.specs_dir)?;
        let spec = specs
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| E2eError::SpecParse(format!("Test not found: {}", name)))?;

        self.run_specs(std::slice::from_ref(&spec)).await
    }

    /// Run a list of test specs, each in a fresh session
    pub async fn run_specs(&mut self, specs: &[TestSpec]) -> E2eResult<TestSuiteResult> {
        let started_at = chrono::Utc::now();
        let start = Instant::now();
        let mut results = Vec::new();
        let mut passed = 0;
        let mut failed = 0;
        let skipped = 0;

        self.start_server().await?;

        info!("Running {} test(s)...", specs.len());

        for spec in specs {
            match self.run_spec(spec).await {
                Ok(result) => {
                    if result.success {
                        passed += 1;
                        info!("✓ {} ({} ms)", result.name, result.duration_ms);
                    } else {
                        failed += 1;
                        error!(
                            "✗ {} - {}",
                            result.name,
                            result.error.as_deref().unwrap_or("unknown error")
                        );
                    }
                    results.push(result);
                }
                Err(e) => {
                    failed += 1;
                    error!("✗ {} - {}", spec.name, e);
                    results.push(TestResult {
                        name: spec.name.clone(),
                        success: false,
                        duration_ms: 0,
                        steps: vec![],
                        events: vec![],
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Test Results: {} passed, {} failed, {} skipped ({} ms)",
            passed, failed, skipped, duration_ms
        );

        Ok(TestSuiteResult {
            total: specs.len(),
            passed,
            failed,
            skipped,
            duration_ms,
            started_at,
            results,
        })
    }

    /// Run a single test spec in its own session. Stops at the first
    /// failing step.
    pub async fn run_spec(&self, spec: &TestSpec) -> E2eResult<TestResult> {
        let start = Instant::now();
        debug!("Running test: {}", spec.name);

        let url = spec.page_url(&self.base_url()?);
        let session = Session::open(self.launcher.as_ref(), spec.dialog_policy.clone()).await?;
        let driver = session.driver(url).fields(spec.fields.clone());

        let mut step_results = Vec::new();
        let mut test_error = None;

        for step in &spec.steps {
            let step_start = Instant::now();
            let outcome = self.execute_step(&session, &driver, step).await;
            let result = StepResult {
                success: outcome.is_ok(),
                step_name: step.name(),
                duration_ms: step_start.elapsed().as_millis() as u64,
                error: outcome.err().map(|e| e.to_string()),
            };

            if !result.success {
                test_error = result.error.clone();
                step_results.push(result);
                break;
            }
            step_results.push(result);
        }

        let events = session.sidecar().events();
        if let Err(e) = session.close().await {
            warn!("Failed to close session for {}: {}", spec.name, e);
        }

        Ok(TestResult {
            name: spec.name.clone(),
            success: test_error.is_none(),
            duration_ms: start.elapsed().as_millis() as u64,
            steps: step_results,
            events,
            error: test_error,
        })
    }

    fn wait_options(&self, timeout_ms: Option<u64>, poll_interval_ms: Option<u64>) -> WaitOptions {
        WaitOptions::new(
            timeout_ms.unwrap_or(self.config.wait.timeout_ms),
            poll_interval_ms.unwrap_or(self.config.wait.poll_interval_ms),
        )
    }

    async fn execute_step(&self, session: &Session, driver: &PageDriver, step: &TestStep) -> E2eResult<()> {
        debug!("Executing step: {}", step.name());

        match step {
            TestStep::Goto => driver.goto().await,
            TestStep::Fill { field, value } => driver.fill(field, value.as_str()).await,
            TestStep::Click { field } => driver.click(field).await,
            TestStep::Select { field, value } => driver.select(field, value.as_str()).await,
            TestStep::Check { field } => driver.act(field, crate::target::Action::Check).await,
            TestStep::Uncheck { field } => driver.act(field, crate::target::Action::Uncheck).await,
            TestStep::Press { field, key } => driver.press(field, key.as_str()).await,
            TestStep::WaitFor {
                field,
                read,
                condition,
                timeout_ms,
                poll_interval_ms,
            } => {
                let options = self.wait_options(*timeout_ms, *poll_interval_ms);
                wait_for(
                    &options,
                    || sample(driver, field, read),
                    |reading: &Option<String>| condition.check(reading.as_deref()),
                )
                .await
                .into_result(format!("{} {}", field, condition))?;
                Ok(())
            }
            TestStep::WaitForScript {
                expression,
                timeout_ms,
                poll_interval_ms,
            } => {
                let options = self.wait_options(*timeout_ms, *poll_interval_ms);
                wait_until_truthy(&options, || driver.evaluate(expression))
                    .await
                    .into_result(format!("`{}` to be truthy", expression))?;
                Ok(())
            }
            TestStep::Assert {
                field,
                read,
                condition,
            } => {
                let reading = sample(driver, field, read).await?;
                check_condition(field, condition, reading.as_deref())
            }
            TestStep::AssertDialog {
                message,
                dialog_type,
            } => {
                let dialogs = session.sidecar().consume(ObservedEvent::is_dialog, true);
                check_single_dialog(&dialogs, message, *dialog_type)
            }
            TestStep::AssertNoDialogs => {
                let dialogs = session.sidecar().dialogs();
                if dialogs.is_empty() {
                    Ok(())
                } else {
                    Err(E2eError::AssertionFailed(format!(
                        "expected no dialogs, got {}",
                        describe(&dialogs)
                    )))
                }
            }
            TestStep::AssertErrors { count, contains } => {
                let errors = session.sidecar().errors();
                if let Some(expected) = count {
                    if errors.len() != *expected {
                        return Err(E2eError::AssertionFailed(format!(
                            "expected {} error(s), got {}: {}",
                            expected,
                            errors.len(),
                            describe(&errors)
                        )));
                    }
                }
                if let Some(needle) = contains {
                    if !errors.iter().any(|e| e.message().contains(needle.as_str())) {
                        return Err(E2eError::AssertionFailed(format!(
                            "no error containing {:?} in {}",
                            needle,
                            describe(&errors)
                        )));
                    }
                }
                Ok(())
            }
            TestStep::AssertNoErrors => {
                let errors = session.sidecar().errors();
                if errors.is_empty() {
                    Ok(())
                } else {
                    Err(E2eError::AssertionFailed(format!(
                        "expected no page errors, got {}",
                        describe(&errors)
                    )))
                }
            }
            TestStep::ResetEvents => {
                session.sidecar().reset();
                Ok(())
            }
            TestStep::Evaluate {
                expression,
                expected,
            } => {
                let value = driver.evaluate(expression).await?;
                match expected {
                    Some(expected) if &value != expected => Err(E2eError::AssertionFailed(format!(
                        "`{}` evaluated to {}, expected {}",
                        expression, value, expected
                    ))),
                    None => {
                        debug!("`{}` evaluated to {}", expression, value);
                        Ok(())
                    }
                    _ => Ok(()),
                }
            }
            TestStep::Sleep { ms } => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                Ok(())
            }
            TestStep::Log { message } => {
                info!("[TEST LOG] {}", message);
                Ok(())
            }
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &TestSuiteResult) -> E2eResult<PathBuf> {
        let output_dir = &self.config.paths.output_dir;
        std::fs::create_dir_all(output_dir)?;

        let path = output_dir.join("test-results.json");
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(&path, json)?;

        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        let _ = self.stop_server();
    }
}

/// Take one reading of a field
async fn sample(driver: &PageDriver, field: &str, read: &Reading) -> E2eResult<Option<String>> {
    match read.probe() {
        Some(probe) => driver.read(field, &probe).await,
        None => Ok(Some(driver.count(field).await?.to_string())),
    }
}

fn check_condition(field: &str, condition: &Condition, reading: Option<&str>) -> E2eResult<()> {
    if condition.check(reading) {
        Ok(())
    } else {
        Err(E2eError::AssertionFailed(format!(
            "{} {} (actual: {})",
            field,
            condition,
            reading.map(|r| format!("{:?}", r)).unwrap_or_else(|| "absent".to_string())
        )))
    }
}

fn check_single_dialog(
    dialogs: &[ObservedEvent],
    expected_message: &str,
    expected_type: Option<crate::events::DialogKind>,
) -> E2eResult<()> {
    let [ObservedEvent::Dialog {
        dialog_type,
        message,
    }] = dialogs
    else {
        return Err(E2eError::AssertionFailed(format!(
            "expected exactly one dialog, got {}: {}",
            dialogs.len(),
            describe(dialogs)
        )));
    };

    if message != expected_message {
        return Err(E2eError::DialogMismatch {
            expected: expected_message.to_string(),
            actual: message.clone(),
        });
    }
    if let Some(expected) = expected_type {
        if *dialog_type != expected {
            return Err(E2eError::AssertionFailed(format!(
                "expected a {:?} dialog, got {:?}",
                expected, dialog_type
            )));
        }
    }
    Ok(())
}

fn describe(events: &[ObservedEvent]) -> String {
    if events.is_empty() {
        return "none".to_string();
    }
    events
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::DialogKind;

    #[test]
    fn test_single_dialog_checks() {
        let one = vec![ObservedEvent::dialog(DialogKind::Alert, "Please enter a number")];
        assert!(check_single_dialog(&one, "Please enter a number", Some(DialogKind::Alert)).is_ok());

        let err = check_single_dialog(&one, "Please enter a value", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"Dialog mismatch: expected "Please enter a value", got "Please enter a number""#
        );

        assert!(check_single_dialog(&one, "Please enter a number", Some(DialogKind::Confirm)).is_err());
        assert!(check_single_dialog(&[], "anything", None).is_err());
    }

    #[test]
    fn test_condition_failure_message() {
        let err = check_condition("top", &Condition::Equals("3".into()), None).unwrap_err();
        assert_eq!(err.to_string(), "Assertion failed: top equals \"3\" (actual: absent)");
    }
}
