//! Page driver: named fields and actions over one target page
//!
//! Actions return as soon as the browser has accepted the input. Anything
//! the page does in response (timers, animations, `setTimeout` chains) is
//! awaited separately with [`crate::wait`].

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::target::{Action, Probe, Target};
use crate::wait::{wait_for, WaitOptions, WaitOutcome};

#[derive(Clone)]
pub struct PageDriver {
    target: Arc<dyn Target>,
    url: String,
    fields: HashMap<String, String>,
}

impl PageDriver {
    pub fn new(target: Arc<dyn Target>, url: impl Into<String>) -> Self {
        Self {
            target,
            url: url.into(),
            fields: HashMap::new(),
        }
    }

    /// Name a selector
    pub fn field(mut self, name: impl Into<String>, selector: impl Into<String>) -> Self {
        self.fields.insert(name.into(), selector.into());
        self
    }

    /// Name several selectors at once
    pub fn fields<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.fields
            .extend(fields.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    /// Selector registered for `field`
    pub fn selector(&self, field: &str) -> E2eResult<&str> {
        self.fields
            .get(field)
            .map(String::as_str)
            .ok_or_else(|| E2eError::UnknownField(field.to_string()))
    }

    /// Navigate to this page's URL
    pub async fn goto(&self) -> E2eResult<()> {
        debug!("Navigating to {}", self.url);
        self.target.goto(&self.url).await
    }

    /// Read from a field; `None` when the element does not exist
    pub async fn read(&self, field: &str, probe: &Probe) -> E2eResult<Option<String>> {
        let selector = self.selector(field)?;
        self.target.read(selector, probe).await
    }

    /// Text content, or `""` when the element does not exist
    pub async fn text(&self, field: &str) -> E2eResult<String> {
        Ok(self.read(field, &Probe::Text).await?.unwrap_or_default())
    }

    /// Input value, or `""` when the element does not exist
    pub async fn value(&self, field: &str) -> E2eResult<String> {
        Ok(self.read(field, &Probe::InputValue).await?.unwrap_or_default())
    }

    pub async fn attribute(&self, field: &str, name: &str) -> E2eResult<Option<String>> {
        self.read(field, &Probe::Attribute(name.to_string())).await
    }

    pub async fn style(&self, field: &str, property: &str) -> E2eResult<Option<String>> {
        self.read(field, &Probe::Style(property.to_string())).await
    }

    pub async fn count(&self, field: &str) -> E2eResult<usize> {
        let selector = self.selector(field)?;
        self.target.count(selector).await
    }

    pub async fn exists(&self, field: &str) -> E2eResult<bool> {
        Ok(self.count(field).await? > 0)
    }

    /// Dispatch an action to a field. Fails if the element does not exist.
    pub async fn act(&self, field: &str, action: Action) -> E2eResult<()> {
        let selector = self.selector(field)?;
        debug!("{} {} ({})", action.name(), field, selector);
        self.target.act(selector, &action).await
    }

    pub async fn click(&self, field: &str) -> E2eResult<()> {
        self.act(field, Action::Click).await
    }

    pub async fn fill(&self, field: &str, value: impl Into<String>) -> E2eResult<()> {
        self.act(field, Action::Fill(value.into())).await
    }

    pub async fn select(&self, field: &str, value: impl Into<String>) -> E2eResult<()> {
        self.act(field, Action::Select(value.into())).await
    }

    pub async fn press(&self, field: &str, key: impl Into<String>) -> E2eResult<()> {
        self.act(field, Action::Press(key.into())).await
    }

    /// Evaluate a script expression in the page (page-scoped globals)
    pub async fn evaluate(&self, expression: &str) -> E2eResult<Value> {
        self.target.evaluate(expression).await
    }

    /// Wait until `accept` holds for a field reading
    pub async fn wait_for_read<A>(
        &self,
        field: &str,
        probe: &Probe,
        options: &WaitOptions,
        accept: A,
    ) -> WaitOutcome<Option<String>>
    where
        A: Fn(&Option<String>) -> bool,
    {
        wait_for(options, || self.read(field, probe), accept).await
    }

    /// Wait until the element count of a field satisfies `accept`
    pub async fn wait_for_count<A>(&self, field: &str, options: &WaitOptions, accept: A) -> WaitOutcome<usize>
    where
        A: Fn(&usize) -> bool,
    {
        wait_for(options, || self.count(field), accept).await
    }
}

impl std::fmt::Debug for PageDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageDriver")
            .field("url", &self.url)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeElement, FakePage};

    const URL: &str = "http://fixtures.test/queue.html";

    fn queue_page() -> Arc<FakePage> {
        let page = Arc::new(FakePage::new());
        page.route(URL, |dom| {
            dom.insert("#queueInput", FakeElement::new());
            dom.insert("#front", FakeElement::new().with_text("-").with_attr("class", "slot"));
        });
        page
    }

    #[tokio::test]
    async fn test_unknown_field() {
        let driver = PageDriver::new(queue_page(), URL);
        assert!(matches!(
            driver.text("nope").await,
            Err(E2eError::UnknownField(name)) if name == "nope"
        ));
    }

    #[tokio::test]
    async fn test_absent_element_reads_as_sentinel() {
        let driver = PageDriver::new(queue_page(), URL)
            .field("front", "#front")
            .field("error", "#errorBanner");
        driver.goto().await.unwrap();

        assert_eq!(driver.text("error").await.unwrap(), "");
        assert_eq!(driver.read("error", &Probe::Text).await.unwrap(), None);
        assert!(!driver.exists("error").await.unwrap());
        assert_eq!(driver.attribute("front", "class").await.unwrap().as_deref(), Some("slot"));
        assert_eq!(driver.attribute("front", "data-index").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_acting_on_missing_element_fails() {
        let driver = PageDriver::new(queue_page(), URL).field("dequeue", "#dequeueBtn");
        driver.goto().await.unwrap();
        assert!(matches!(
            driver.click("dequeue").await,
            Err(E2eError::ElementNotFound(sel)) if sel == "#dequeueBtn"
        ));
    }
}
