//! Declarative specs executed by the runner against scripted pages

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use vizcheck_e2e::events::ConsoleLevel;
use vizcheck_e2e::fake::{FakeElement, FakeLauncher};
use vizcheck_e2e::{ObservedEvent, RunnerConfig, TestRunner, TestSpec, TestSuiteResult};

const BASE_URL: &str = "http://fixtures.test";

fn launcher() -> Arc<FakeLauncher> {
    Arc::new(FakeLauncher::new(|page| {
        page.route("http://fixtures.test/queue.html", |dom| {
            dom.set_global("queue", serde_json::json!([]));
            dom.insert("#queueInput", FakeElement::new());
            dom.insert("#enqueueBtn", FakeElement::new());
            dom.insert("#dequeueBtn", FakeElement::new());
            dom.insert("#front", FakeElement::new().with_text("-"));
            dom.on_click("#enqueueBtn", |dom| {
                let value = dom.value("#queueInput");
                if value.is_empty() {
                    dom.alert("Please enter a number");
                    return;
                }
                let mut queue: Vec<String> =
                    serde_json::from_value(dom.global("queue")).unwrap_or_default();
                queue.push(value);
                dom.set_value("#queueInput", "");
                dom.set_global("queue", serde_json::json!(queue));
                dom.after(Duration::from_millis(300), move |dom| {
                    dom.set_text("#front", queue[0].clone());
                });
            });
            dom.on_click("#dequeueBtn", |dom| {
                dom.throw("TypeError", "Cannot read properties of undefined (reading 'value')");
            });
        });
        page.route("http://fixtures.test/noisy.html", |dom| {
            dom.console(ConsoleLevel::Error, "favicon.ico 404");
        });
    }))
}

fn config(specs_dir: PathBuf, output_dir: PathBuf) -> RunnerConfig {
    let mut config = RunnerConfig {
        base_url: Some(BASE_URL.to_string()),
        ..Default::default()
    };
    config.server.enabled = false;
    config.wait.timeout_ms = 2000;
    config.paths.specs_dir = specs_dir;
    config.paths.output_dir = output_dir;
    config
}

const PASSING: &str = r##"
name: queue-enqueue
tags: [queue]
page: /queue.html
fields:
  input: '#queueInput'
  enqueue: '#enqueueBtn'
  front: '#front'
steps:
  - action: goto
  - action: click
    field: enqueue
  - action: assert_dialog
    message: Please enter a number
    dialog_type: alert
  - action: fill
    field: input
    value: '7'
  - action: click
    field: enqueue
  - action: assert
    field: input
    read: value
    condition: empty
  - action: wait_for
    field: front
    condition:
      equals: '7'
  - action: evaluate
    expression: queue.length
    expected: 1
  - action: assert_no_dialogs
  - action: assert_no_errors
"##;

const FAILING: &str = r##"
name: queue-dequeue-throws
tags: [queue, errors]
page: /queue.html
fields:
  dequeue: '#dequeueBtn'
  front: '#front'
steps:
  - action: goto
  - action: click
    field: dequeue
  - action: assert_no_errors
  - action: log
    message: never reached
"##;

const EXPECTED_ERRORS: &str = r##"
name: noisy-page-errors
tags: [errors]
page: /noisy.html
steps:
  - action: goto
  - action: assert_errors
    count: 1
    contains: favicon
  - action: reset_events
  - action: assert_no_errors
"##;

fn write_specs(dir: &std::path::Path) {
    std::fs::write(dir.join("queue.yaml"), PASSING).unwrap();
    std::fs::write(dir.join("dequeue.yml"), FAILING).unwrap();
    std::fs::create_dir_all(dir.join("nested")).unwrap();
    std::fs::write(dir.join("nested/noisy.yaml"), EXPECTED_ERRORS).unwrap();
    std::fs::write(dir.join("README.md"), "not a spec").unwrap();
}

#[tokio::test]
async fn test_run_all_reports_each_spec() {
    let specs = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_specs(specs.path());

    let mut runner = TestRunner::with_launcher(
        config(specs.path().to_path_buf(), output.path().to_path_buf()),
        launcher(),
    );
    let results = runner.run_all().await.unwrap();

    assert_eq!(results.total, 3);
    assert_eq!(results.passed, 2);
    assert_eq!(results.failed, 1);

    let names: Vec<&str> = results.results.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["noisy-page-errors", "queue-dequeue-throws", "queue-enqueue"]
    );

    let passing = &results.results[2];
    assert!(passing.success, "{:?}", passing.error);
    assert_eq!(passing.steps.len(), 10);
    assert!(passing.events.is_empty());
}

#[tokio::test]
async fn test_failure_stops_the_spec_and_keeps_events() {
    let specs = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_specs(specs.path());

    let mut runner = TestRunner::with_launcher(
        config(specs.path().to_path_buf(), output.path().to_path_buf()),
        launcher(),
    );
    let results = runner.run_test("queue-dequeue-throws").await.unwrap();
    let result = &results.results[0];

    assert!(!result.success);
    assert_eq!(result.steps.len(), 3);
    assert_eq!(result.steps[2].step_name, "assert_no_errors");
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .contains("Cannot read properties of undefined"));
    assert_eq!(
        result.events,
        vec![ObservedEvent::exception(
            "TypeError",
            "Cannot read properties of undefined (reading 'value')"
        )]
    );
}

#[tokio::test]
async fn test_run_tagged_filters() {
    let specs = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_specs(specs.path());

    let mut runner = TestRunner::with_launcher(
        config(specs.path().to_path_buf(), output.path().to_path_buf()),
        launcher(),
    );
    let results = runner.run_tagged("errors").await.unwrap();
    assert_eq!(results.total, 2);
    assert_eq!(results.passed, 1);

    assert!(runner.run_test("no-such-spec").await.is_err());
}

#[tokio::test]
async fn test_dialog_mismatch_is_reported_verbatim() {
    let spec = TestSpec::from_yaml(
        r##"
name: wrong-message
page: /queue.html
fields:
  enqueue: '#enqueueBtn'
steps:
  - action: goto
  - action: click
    field: enqueue
  - action: assert_dialog
    message: Please enter a value
"##,
    )
    .unwrap();

    let output = tempfile::tempdir().unwrap();
    let mut runner = TestRunner::with_launcher(
        config(PathBuf::from("unused"), output.path().to_path_buf()),
        launcher(),
    );
    let results = runner.run_specs(&[spec]).await.unwrap();

    assert_eq!(
        results.results[0].error.as_deref(),
        Some(r#"Dialog mismatch: expected "Please enter a value", got "Please enter a number""#)
    );
}

#[tokio::test]
async fn test_unreachable_page_fails_navigation() {
    let spec = TestSpec::from_yaml("name: missing\npage: /missing.html\nsteps:\n  - action: goto\n")
        .unwrap();

    let output = tempfile::tempdir().unwrap();
    let mut runner = TestRunner::with_launcher(
        config(PathBuf::from("unused"), output.path().to_path_buf()),
        launcher(),
    );
    let results = runner.run_specs(&[spec]).await.unwrap();
    let error = results.results[0].error.as_deref().unwrap();

    assert!(error.contains("http://fixtures.test/missing.html"));
    assert!(error.contains("ERR_CONNECTION_REFUSED"));
}

#[tokio::test]
async fn test_results_report_round_trips() {
    let specs = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    write_specs(specs.path());

    let mut runner = TestRunner::with_launcher(
        config(specs.path().to_path_buf(), output.path().join("reports")),
        launcher(),
    );
    let results = runner.run_all().await.unwrap();
    let path = runner.write_results(&results).unwrap();

    assert_eq!(path, output.path().join("reports/test-results.json"));
    let report: TestSuiteResult =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report.total, results.total);
    assert_eq!(report.failed, 1);
    assert_eq!(report.started_at, results.started_at);
    assert_eq!(report.results[1].events, results.results[1].events);
}

#[test]
fn test_bundled_specs_parse() {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("specs");
    let specs = TestSpec::load_all(&dir).unwrap();

    assert!(specs.len() >= 4);
    assert!(specs.iter().all(|s| !s.steps.is_empty()));
    assert_eq!(TestSpec::filter_by_tag(&specs, "stack").len(), 2);
}
