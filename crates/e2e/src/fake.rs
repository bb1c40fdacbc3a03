//! In-process scripted page
//!
//! [`FakePage`] implements [`Target`] without a browser. Each route is a
//! load script that builds the page through a [`FakeDom`] handle: inserting
//! elements, wiring click/change handlers, starting tokio timers, raising
//! dialogs, logging to the console or throwing. Navigation discards all page
//! state (elements, handlers, globals, timers), the same way a real reload
//! does.
//!
//! Elements are addressed by the exact selector string a test uses; there is
//! no selector engine. Several elements may share a selector, in which case
//! reads and actions use the first and `count` returns all of them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};
use crate::events::{ConsoleLevel, DialogKind, DialogPolicy, ObservedEvent};
use crate::session::Launcher;
use crate::target::{Action, EventListener, Probe, Target};

type LoadScript = Arc<dyn Fn(&FakeDom) + Send + Sync>;
type Handler = Arc<dyn Fn(&FakeDom, &Action) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Trigger {
    Click,
    Change,
    Key,
}

/// A DOM-ish element: text, input value, attributes and computed style
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeElement {
    pub text: String,
    pub value: String,
    pub checked: bool,
    pub attributes: HashMap<String, String>,
    pub styles: HashMap<String, String>,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_style(mut self, property: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(property.into(), value.into());
        self
    }

    fn probe(&self, probe: &Probe) -> Option<String> {
        match probe {
            Probe::Text => Some(self.text.clone()),
            Probe::InputValue => Some(self.value.clone()),
            Probe::Attribute(name) => self.attributes.get(name).cloned(),
            Probe::Style(property) => Some(self.styles.get(property).cloned().unwrap_or_default()),
        }
    }
}

struct PageState {
    url: Option<String>,
    generation: u64,
    closed: bool,
    elements: Vec<(String, FakeElement)>,
    handlers: HashMap<(String, Trigger), Handler>,
    globals: HashMap<String, Value>,
    timers: Vec<JoinHandle<()>>,
    dialog_policy: DialogPolicy,
}

impl PageState {
    fn new() -> Self {
        Self {
            url: None,
            generation: 0,
            closed: false,
            elements: Vec::new(),
            handlers: HashMap::new(),
            globals: HashMap::new(),
            timers: Vec::new(),
            dialog_policy: DialogPolicy::default(),
        }
    }

    fn ensure_open(&self) -> E2eResult<()> {
        if self.closed {
            Err(E2eError::TargetClosed)
        } else {
            Ok(())
        }
    }

    fn find(&self, selector: &str) -> Option<&FakeElement> {
        self.elements
            .iter()
            .find(|(s, _)| s == selector)
            .map(|(_, el)| el)
    }

    fn find_mut(&mut self, selector: &str) -> Option<&mut FakeElement> {
        self.elements
            .iter_mut()
            .find(|(s, _)| s == selector)
            .map(|(_, el)| el)
    }

    fn stop_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }

    /// Throw away everything belonging to the previous document
    fn unload(&mut self) {
        self.stop_timers();
        self.elements.clear();
        self.handlers.clear();
        self.globals.clear();
        self.generation += 1;
    }
}

impl Drop for PageState {
    fn drop(&mut self) {
        self.stop_timers();
    }
}

/// Scripted page implementing [`Target`]
pub struct FakePage {
    state: Arc<Mutex<PageState>>,
    listeners: Arc<Mutex<Vec<EventListener>>>,
    routes: Mutex<HashMap<String, LoadScript>>,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(PageState::new())),
            listeners: Arc::new(Mutex::new(Vec::new())),
            routes: Mutex::new(HashMap::new()),
        }
    }

    /// Serve `url` with a load script. Unrouted URLs fail navigation the way
    /// an unreachable fixture server does.
    pub fn route<F>(&self, url: impl Into<String>, script: F) -> &Self
    where
        F: Fn(&FakeDom) + Send + Sync + 'static,
    {
        self.routes.lock().insert(url.into(), Arc::new(script));
        self
    }

    /// Handle on the current document
    pub fn dom(&self) -> FakeDom {
        let generation = self.state.lock().generation;
        self.dom_at(generation)
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().url.clone()
    }

    pub fn dialog_policy(&self) -> DialogPolicy {
        self.state.lock().dialog_policy.clone()
    }

    fn dom_at(&self, generation: u64) -> FakeDom {
        FakeDom {
            state: Arc::downgrade(&self.state),
            listeners: Arc::downgrade(&self.listeners),
            generation,
        }
    }
}

#[async_trait]
impl Target for FakePage {
    async fn goto(&self, url: &str) -> E2eResult<()> {
        let script = self.routes.lock().get(url).cloned();
        let script = script.ok_or_else(|| E2eError::Navigation {
            url: url.to_string(),
            reason: "net::ERR_CONNECTION_REFUSED".to_string(),
        })?;

        let dom = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            state.unload();
            state.url = Some(url.to_string());
            self.dom_at(state.generation)
        };

        debug!("Fake page loading {}", url);
        script(&dom);
        Ok(())
    }

    async fn read(&self, selector: &str, probe: &Probe) -> E2eResult<Option<String>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.find(selector).and_then(|el| el.probe(probe)))
    }

    async fn count(&self, selector: &str) -> E2eResult<usize> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.elements.iter().filter(|(s, _)| s == selector).count())
    }

    async fn act(&self, selector: &str, action: &Action) -> E2eResult<()> {
        let (dom, handler) = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            let element = state
                .find_mut(selector)
                .ok_or_else(|| E2eError::ElementNotFound(selector.to_string()))?;

            let trigger = match action {
                Action::Click => Trigger::Click,
                Action::Fill(value) | Action::Select(value) => {
                    element.value = value.clone();
                    Trigger::Change
                }
                Action::Check => {
                    element.checked = true;
                    Trigger::Change
                }
                Action::Uncheck => {
                    element.checked = false;
                    Trigger::Change
                }
                Action::Press(_) => Trigger::Key,
            };

            let handler = state.handlers.get(&(selector.to_string(), trigger)).cloned();
            (self.dom_at(state.generation), handler)
        };

        trace!("Fake page {} on {}", action.name(), selector);
        if let Some(handler) = handler {
            handler(&dom, action);
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> E2eResult<Value> {
        let state = self.state.lock();
        state.ensure_open()?;
        lookup_global(&state.globals, expression.trim())
    }

    async fn set_dialog_policy(&self, policy: DialogPolicy) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.dialog_policy = policy;
        Ok(())
    }

    fn add_listener(&self, listener: EventListener) {
        self.listeners.lock().push(listener);
    }

    async fn close(&self) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.stop_timers();
        state.closed = true;
        Ok(())
    }
}

/// Resolve `name`, `name.field.sub` and `.length` against page globals
fn lookup_global(globals: &HashMap<String, Value>, expression: &str) -> E2eResult<Value> {
    let mut parts = expression.split('.');
    let root = parts.next().unwrap_or_default();
    let mut current = globals
        .get(root)
        .ok_or_else(|| E2eError::Evaluation(format!("ReferenceError: {} is not defined", root)))?;

    for part in parts {
        if part == "length" {
            let len = match current {
                Value::Array(items) => items.len(),
                Value::String(s) => s.chars().count(),
                _ => return Ok(Value::Null),
            };
            return Ok(Value::from(len));
        }
        current = match current.get(part) {
            Some(next) => next,
            None => return Ok(Value::Null),
        };
    }

    Ok(current.clone())
}

/// Handle a load script, handler or timer uses to drive one document.
///
/// A handle belongs to the document it was created for. Once the page
/// navigates or closes, every method becomes a no-op and timers created
/// through it stop.
#[derive(Clone)]
pub struct FakeDom {
    state: Weak<Mutex<PageState>>,
    listeners: Weak<Mutex<Vec<EventListener>>>,
    generation: u64,
}

impl FakeDom {
    fn with_state<R>(&self, f: impl FnOnce(&mut PageState) -> R) -> Option<R> {
        let state = self.state.upgrade()?;
        let mut guard = state.lock();
        if guard.closed || guard.generation != self.generation {
            return None;
        }
        Some(f(&mut guard))
    }

    /// False once the document has been navigated away from or closed
    pub fn is_live(&self) -> bool {
        self.with_state(|_| ()).is_some()
    }

    pub fn insert(&self, selector: impl Into<String>, element: FakeElement) {
        let selector = selector.into();
        self.with_state(|s| s.elements.push((selector, element)));
    }

    /// Remove every element matching `selector`
    pub fn remove(&self, selector: &str) {
        self.with_state(|s| s.elements.retain(|(sel, _)| sel != selector));
    }

    pub fn exists(&self, selector: &str) -> bool {
        self.with_state(|s| s.find(selector).is_some()).unwrap_or(false)
    }

    pub fn count(&self, selector: &str) -> usize {
        self.with_state(|s| s.elements.iter().filter(|(sel, _)| sel == selector).count())
            .unwrap_or(0)
    }

    pub fn text(&self, selector: &str) -> String {
        self.with_state(|s| s.find(selector).map(|el| el.text.clone()))
            .flatten()
            .unwrap_or_default()
    }

    pub fn set_text(&self, selector: &str, text: impl Into<String>) {
        let text = text.into();
        self.update(selector, |el| el.text = text);
    }

    pub fn value(&self, selector: &str) -> String {
        self.with_state(|s| s.find(selector).map(|el| el.value.clone()))
            .flatten()
            .unwrap_or_default()
    }

    pub fn set_value(&self, selector: &str, value: impl Into<String>) {
        let value = value.into();
        self.update(selector, |el| el.value = value);
    }

    pub fn is_checked(&self, selector: &str) -> bool {
        self.with_state(|s| s.find(selector).map(|el| el.checked))
            .flatten()
            .unwrap_or(false)
    }

    pub fn set_attr(&self, selector: &str, name: impl Into<String>, value: impl Into<String>) {
        let (name, value) = (name.into(), value.into());
        self.update(selector, |el| {
            el.attributes.insert(name, value);
        });
    }

    pub fn set_style(&self, selector: &str, property: impl Into<String>, value: impl Into<String>) {
        let (property, value) = (property.into(), value.into());
        self.update(selector, |el| {
            el.styles.insert(property, value);
        });
    }

    fn update(&self, selector: &str, f: impl FnOnce(&mut FakeElement)) {
        self.with_state(|s| s.find_mut(selector).map(f));
    }

    pub fn on_click<F>(&self, selector: impl Into<String>, handler: F)
    where
        F: Fn(&FakeDom) + Send + Sync + 'static,
    {
        self.on(selector.into(), Trigger::Click, Arc::new(move |dom, _| handler(dom)));
    }

    /// Fired after fill, select, check and uncheck
    pub fn on_change<F>(&self, selector: impl Into<String>, handler: F)
    where
        F: Fn(&FakeDom) + Send + Sync + 'static,
    {
        self.on(selector.into(), Trigger::Change, Arc::new(move |dom, _| handler(dom)));
    }

    pub fn on_key<F>(&self, selector: impl Into<String>, handler: F)
    where
        F: Fn(&FakeDom, &str) + Send + Sync + 'static,
    {
        self.on(
            selector.into(),
            Trigger::Key,
            Arc::new(move |dom, action| {
                if let Action::Press(key) = action {
                    handler(dom, key);
                }
            }),
        );
    }

    fn on(&self, selector: String, trigger: Trigger, handler: Handler) {
        self.with_state(|s| s.handlers.insert((selector, trigger), handler));
    }

    pub fn set_global(&self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.with_state(|s| s.globals.insert(name, value));
    }

    pub fn global(&self, name: &str) -> Value {
        self.with_state(|s| s.globals.get(name).cloned())
            .flatten()
            .unwrap_or(Value::Null)
    }

    pub fn console(&self, level: ConsoleLevel, text: impl Into<String>) {
        self.emit(ObservedEvent::console(level, text));
    }

    /// Report an uncaught exception
    pub fn throw(&self, name: impl Into<String>, message: impl Into<String>) {
        self.emit(ObservedEvent::exception(name, message));
    }

    pub fn alert(&self, message: impl Into<String>) {
        self.emit(ObservedEvent::dialog(DialogKind::Alert, message));
    }

    /// Raise a `confirm` and return the answer the dialog policy gives
    pub fn confirm(&self, message: impl Into<String>) -> bool {
        self.emit(ObservedEvent::dialog(DialogKind::Confirm, message));
        self.with_state(|s| s.dialog_policy.confirms()).unwrap_or(false)
    }

    /// Raise a `prompt`; `None` when dismissed
    pub fn prompt(&self, message: impl Into<String>) -> Option<String> {
        self.emit(ObservedEvent::dialog(DialogKind::Prompt, message));
        self.with_state(|s| s.dialog_policy.prompt_answer().map(str::to_string))
            .flatten()
    }

    fn emit(&self, event: ObservedEvent) {
        if !self.is_live() {
            return;
        }
        let Some(listeners) = self.listeners.upgrade() else {
            return;
        };
        // Held for the whole dispatch so concurrent emitters cannot interleave
        let listeners = listeners.lock();
        for listener in listeners.iter() {
            listener(event.clone());
        }
    }

    /// Run `tick` every `period` (first run after one period) until it
    /// returns false or the document goes away
    pub fn every<F>(&self, period: Duration, mut tick: F)
    where
        F: FnMut(&FakeDom) -> bool + Send + 'static,
    {
        let dom = self.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if !dom.is_live() || !tick(&dom) {
                    break;
                }
            }
        });
        self.track(handle);
    }

    /// Run `f` once after `delay`, like `setTimeout`
    pub fn after<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce(&FakeDom) + Send + 'static,
    {
        let dom = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if dom.is_live() {
                f(&dom);
            }
        });
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        if let Some(state) = self.state.upgrade() {
            let mut guard = state.lock();
            if !guard.closed && guard.generation == self.generation {
                guard.timers.push(handle);
                return;
            }
        }
        handle.abort();
    }
}

/// [`Launcher`] that opens a fresh [`FakePage`] per session
pub struct FakeLauncher {
    setup: Arc<dyn Fn(&FakePage) + Send + Sync>,
}

impl FakeLauncher {
    /// `setup` installs routes on every new page
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn(&FakePage) + Send + Sync + 'static,
    {
        Self {
            setup: Arc::new(setup),
        }
    }
}

#[async_trait]
impl Launcher for FakeLauncher {
    async fn launch(&self) -> E2eResult<Arc<dyn Target>> {
        let page = FakePage::new();
        (self.setup)(&page);
        Ok(Arc::new(page))
    }
}
