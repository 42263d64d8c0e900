//! Scriptable page double for pipeline tests.
//!
//! Selectors are matched by exact string equality against whatever the test
//! registered, which keeps the double honest: a component querying a selector
//! nobody registered sees an empty result, exactly like a missing element.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::traits::{BrowserPage, ElementHandle};

#[derive(Default)]
struct FakeElement {
    text: String,
    attrs: HashMap<String, String>,
    visible: bool,
}

#[derive(Default)]
struct FakeState {
    next_id: ElementHandle,
    elements: HashMap<ElementHandle, FakeElement>,
    roots: Vec<(String, ElementHandle)>,
    children: Vec<(ElementHandle, String, ElementHandle)>,
    clicks: Vec<ElementHandle>,
    coordinate_clicks: Vec<(f64, f64)>,
    element_scripts: Vec<(ElementHandle, String)>,
    page_scripts: Vec<String>,
    navigations: Vec<String>,
    /// (element, remaining clicks before it turns invisible)
    hide_after: Option<(ElementHandle, usize)>,
    fail_clicks: bool,
}

#[derive(Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_root(&self, selector: &str, text: &str) -> ElementHandle {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.elements.insert(
            id,
            FakeElement {
                text: text.to_string(),
                visible: true,
                ..Default::default()
            },
        );
        state.roots.push((selector.to_string(), id));
        id
    }

    pub async fn add_child(
        &self,
        parent: ElementHandle,
        selector: &str,
        text: &str,
    ) -> ElementHandle {
        let mut state = self.state.lock().await;
        let id = state.next_id;
        state.next_id += 1;
        state.elements.insert(
            id,
            FakeElement {
                text: text.to_string(),
                visible: true,
                ..Default::default()
            },
        );
        state.children.push((parent, selector.to_string(), id));
        id
    }

    pub async fn set_attr(&self, element: ElementHandle, name: &str, value: &str) {
        let mut state = self.state.lock().await;
        if let Some(el) = state.elements.get_mut(&element) {
            el.attrs.insert(name.to_string(), value.to_string());
        }
    }

    pub async fn set_visible(&self, element: ElementHandle, visible: bool) {
        let mut state = self.state.lock().await;
        if let Some(el) = state.elements.get_mut(&element) {
            el.visible = visible;
        }
    }

    /// Make `element` turn invisible once it has been clicked `clicks` times,
    /// modelling a load-more control that exhausts.
    pub async fn hide_after_clicks(&self, element: ElementHandle, clicks: usize) {
        self.state.lock().await.hide_after = Some((element, clicks));
    }

    /// Make every subsequent `click` return an error.
    pub async fn fail_clicks(&self) {
        self.state.lock().await.fail_clicks = true;
    }

    pub async fn clicks(&self) -> Vec<ElementHandle> {
        self.state.lock().await.clicks.clone()
    }

    pub async fn coordinate_clicks(&self) -> Vec<(f64, f64)> {
        self.state.lock().await.coordinate_clicks.clone()
    }

    pub async fn element_scripts(&self) -> Vec<(ElementHandle, String)> {
        self.state.lock().await.element_scripts.clone()
    }

    pub async fn navigations(&self) -> Vec<String> {
        self.state.lock().await.navigations.clone()
    }

    pub async fn page_scripts(&self) -> Vec<String> {
        self.state.lock().await.page_scripts.clone()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str, _timeout: Duration) -> Result<()> {
        self.state.lock().await.navigations.push(url.to_string());
        Ok(())
    }

    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let state = self.state.lock().await;
        Ok(state
            .roots
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, id)| *id)
            .collect())
    }

    async fn query_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        Ok(self
            .query_all_within(element, selector)
            .await?
            .into_iter()
            .next())
    }

    async fn query_all_within(
        &self,
        element: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let state = self.state.lock().await;
        Ok(state
            .children
            .iter()
            .filter(|(parent, s, _)| *parent == element && s == selector)
            .map(|(_, _, id)| *id)
            .collect())
    }

    async fn text(&self, element: ElementHandle) -> Result<String> {
        let state = self.state.lock().await;
        Ok(state
            .elements
            .get(&element)
            .map(|el| el.text.clone())
            .unwrap_or_default())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        Ok(state
            .elements
            .get(&element)
            .and_then(|el| el.attrs.get(name))
            .cloned())
    }

    async fn is_visible(&self, element: ElementHandle) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.elements.get(&element).is_some_and(|el| el.visible))
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.fail_clicks {
            return Err(anyhow!("click failed"));
        }
        state.clicks.push(element);

        if let Some((target, remaining)) = state.hide_after
            && target == element
        {
            if remaining <= 1 {
                state.hide_after = None;
                if let Some(el) = state.elements.get_mut(&target) {
                    el.visible = false;
                }
            } else {
                state.hide_after = Some((target, remaining - 1));
            }
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        self.state.lock().await.coordinate_clicks.push((x, y));
        Ok(())
    }

    async fn scroll_into_view(&self, _element: ElementHandle) -> Result<()> {
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.state.lock().await.page_scripts.push(script.to_string());
        Ok(serde_json::Value::Null)
    }

    async fn evaluate_on(
        &self,
        element: ElementHandle,
        script: &str,
    ) -> Result<serde_json::Value> {
        self.state
            .lock()
            .await
            .element_scripts
            .push((element, script.to_string()));
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> Result<String> {
        Ok("<html>fake</html>".to_string())
    }

    async fn screenshot(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}
