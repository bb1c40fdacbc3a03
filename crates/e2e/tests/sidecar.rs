//! Observation sidecar against scripted pages

use std::sync::Arc;

use vizcheck_e2e::events::{ConsoleLevel, DialogKind, DialogPolicy, ObservedEvent};
use vizcheck_e2e::fake::{FakeElement, FakeLauncher, FakePage};
use vizcheck_e2e::{ObservationSidecar, PageDriver, Session, Target};

const HASHMAP_URL: &str = "http://fixtures.test/hashmap.html";
const BROKEN_URL: &str = "http://fixtures.test/broken.html";

fn hashmap_page(page: &FakePage) {
    page.route(HASHMAP_URL, |dom| {
        dom.insert("#keyInput", FakeElement::new());
        dom.insert("#valueInput", FakeElement::new());
        dom.insert("#putBtn", FakeElement::new().with_text("Put"));
        dom.insert("#output", FakeElement::new());
        dom.on_click("#putBtn", |dom| {
            let (key, value) = (dom.value("#keyInput"), dom.value("#valueInput"));
            if key.is_empty() || value.is_empty() {
                dom.alert("Please enter both key and value");
                return;
            }
            dom.set_text("#output", format!("put({}, {})", key, value));
        });
    });
    page.route(BROKEN_URL, |dom| {
        dom.console(ConsoleLevel::Error, "Failed to load resource: renderer.js");
        dom.throw("TypeError", "Cannot read properties of undefined (reading 'draw')");
        dom.console(ConsoleLevel::Warning, "falling back to text renderer");
        dom.console(ConsoleLevel::Error, "canvas context unavailable");
    });
}

#[tokio::test]
async fn test_errors_keep_arrival_order() {
    let session = Session::open(&FakeLauncher::new(hashmap_page), DialogPolicy::Accept)
        .await
        .unwrap();
    session.driver(BROKEN_URL).goto().await.unwrap();

    let errors = session.sidecar().errors();
    assert_eq!(
        errors,
        vec![
            ObservedEvent::console(ConsoleLevel::Error, "Failed to load resource: renderer.js"),
            ObservedEvent::exception(
                "TypeError",
                "Cannot read properties of undefined (reading 'draw')"
            ),
            ObservedEvent::console(ConsoleLevel::Error, "canvas context unavailable"),
        ]
    );
    assert_eq!(session.sidecar().len(), 4);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_late_attach_misses_load_time_exception() {
    let page = Arc::new(FakePage::new());
    hashmap_page(&page);

    page.goto(BROKEN_URL).await.unwrap();
    let sidecar = ObservationSidecar::attach(&*page);

    assert!(sidecar.is_empty());
    assert!(sidecar.errors().is_empty());

    // Events after attaching are still seen
    page.dom().throw("RangeError", "Maximum call stack size exceeded");
    assert_eq!(sidecar.errors().len(), 1);
}

#[tokio::test]
async fn test_empty_input_raises_single_dialog_without_output() {
    let session = Session::open(&FakeLauncher::new(hashmap_page), DialogPolicy::Accept)
        .await
        .unwrap();
    let driver = session
        .driver(HASHMAP_URL)
        .field("key", "#keyInput")
        .field("put", "#putBtn")
        .field("output", "#output");

    driver.goto().await.unwrap();
    driver.fill("key", "apple").await.unwrap();
    driver.click("put").await.unwrap();

    let dialogs = session.sidecar().dialogs();
    assert_eq!(
        dialogs,
        vec![ObservedEvent::dialog(
            DialogKind::Alert,
            "Please enter both key and value"
        )]
    );
    assert_eq!(driver.text("output").await.unwrap(), "");
    assert!(session.sidecar().errors().is_empty());
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_dismissed_confirm_is_recorded_and_answered() {
    let launcher = FakeLauncher::new(|page| {
        page.route("http://fixtures.test/list.html", |dom| {
            dom.insert("#clearBtn", FakeElement::new());
            dom.insert("#items", FakeElement::new().with_text("3 items"));
            dom.on_click("#clearBtn", |dom| {
                if dom.confirm("Clear all items?") {
                    dom.set_text("#items", "0 items");
                }
            });
        });
    });
    let session = Session::open(&launcher, DialogPolicy::Dismiss).await.unwrap();
    let driver = PageDriver::new(session.target(), "http://fixtures.test/list.html")
        .field("clear", "#clearBtn")
        .field("items", "#items");

    driver.goto().await.unwrap();
    driver.click("clear").await.unwrap();

    let drained = session.sidecar().consume(ObservedEvent::is_dialog, true);
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].message(), "Clear all items?");
    assert!(session.sidecar().dialogs().is_empty());
    assert_eq!(driver.text("items").await.unwrap(), "3 items");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_attaching_twice_records_each_event_twice() {
    let page = Arc::new(FakePage::new());
    hashmap_page(&page);

    let sidecar = ObservationSidecar::attach(&*page);
    sidecar.attach_again(&*page);
    page.goto(HASHMAP_URL).await.unwrap();
    page.dom().console(ConsoleLevel::Log, "rehash to 16 buckets");

    let events = sidecar.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], events[1]);
    assert_eq!(events[0].message(), "rehash to 16 buckets");
}
