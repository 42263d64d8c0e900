//! Static [`BrowserPage`] implementation backed by reqwest + scraper.
//!
//! This drives the pipeline against pages that render their voucher listing
//! server-side. Script evaluation, clicks and scrolling are no-ops here,
//! since a static document has nothing for them to do, so popup dismissal and
//! the load-more loop naturally fall through to their non-fatal exits. A real
//! driven browser can implement the same trait for JavaScript-heavy sources.

use std::path::Path;
use std::time::Duration;

use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tokio::sync::Mutex;
use tracing::debug;

use crate::traits::{BrowserPage, ElementHandle};

#[cfg(test)]
pub mod fake;

/// One selector step from the document root; a handle is a path of steps.
type HandlePath = Vec<(String, usize)>;

#[derive(Default)]
struct PageState {
    html: String,
    /// Handle id is the index into this list. Cleared on navigation.
    handles: Vec<HandlePath>,
}

pub struct StaticPage {
    client: Client,
    state: Mutex<PageState>,
}

impl StaticPage {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .build()?;

        Ok(Self {
            client,
            state: Mutex::new(PageState::default()),
        })
    }

    #[cfg(test)]
    fn from_html(html: &str) -> Self {
        Self {
            client: Client::new(),
            state: Mutex::new(PageState {
                html: html.to_string(),
                handles: Vec::new(),
            }),
        }
    }
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| anyhow!("invalid selector '{selector}': {e:?}"))
}

fn resolve<'a>(document: &'a Html, path: &HandlePath) -> Result<Option<ElementRef<'a>>> {
    let mut current: Option<ElementRef<'a>> = None;
    for (selector, index) in path {
        let parsed = parse_selector(selector)?;
        current = match current {
            None => document.select(&parsed).nth(*index),
            Some(element) => element.select(&parsed).nth(*index),
        };
        if current.is_none() {
            return Ok(None);
        }
    }
    Ok(current)
}

fn style_hides(style: &str) -> bool {
    let compact: String = style.chars().filter(|c| !c.is_whitespace()).collect();
    compact.contains("display:none") || compact.contains("visibility:hidden")
}

fn inside_modal(element: ElementRef<'_>) -> bool {
    element.ancestors().any(|node| {
        scraper::ElementRef::wrap(node).is_some_and(|el| {
            let value = el.value();
            let class = value.attr("class").unwrap_or_default();
            class.contains("el-dialog__wrapper")
                || class.contains("modal")
                || value.attr("style").is_some_and(style_hides)
        })
    })
}

#[async_trait]
impl BrowserPage for StaticPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<()> {
        let response = tokio::time::timeout(timeout, self.client.get(url).send())
            .await
            .map_err(|_| anyhow!("navigation to {url} timed out after {timeout:?}"))??;

        if !response.status().is_success() {
            bail!("failed to fetch {url}: {}", response.status());
        }

        let html = response.text().await?;
        let mut state = self.state.lock().await;
        state.html = html;
        state.handles.clear();
        Ok(())
    }

    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.query_all(selector).await?.into_iter().next())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let mut state = self.state.lock().await;
        let document = Html::parse_document(&state.html);
        let parsed = parse_selector(selector)?;
        let count = document.select(&parsed).count();

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            state.handles.push(vec![(selector.to_string(), index)]);
            handles.push((state.handles.len() - 1) as ElementHandle);
        }
        Ok(handles)
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
        let mut state = self.state.lock().await;
        let base = state
            .handles
            .get(element as usize)
            .cloned()
            .ok_or_else(|| anyhow!("stale element handle {element}"))?;

        let document = Html::parse_document(&state.html);
        let count = match resolve(&document, &base)? {
            Some(root) => {
                let parsed = parse_selector(selector)?;
                root.select(&parsed).count()
            }
            None => 0,
        };

        let mut handles = Vec::with_capacity(count);
        for index in 0..count {
            let mut path = base.clone();
            path.push((selector.to_string(), index));
            state.handles.push(path);
            handles.push((state.handles.len() - 1) as ElementHandle);
        }
        Ok(handles)
    }

    async fn text(&self, element: ElementHandle) -> Result<String> {
        let state = self.state.lock().await;
        let path = state
            .handles
            .get(element as usize)
            .ok_or_else(|| anyhow!("stale element handle {element}"))?;
        let document = Html::parse_document(&state.html);
        Ok(resolve(&document, path)?
            .map(|el| el.text().collect::<String>().trim().to_string())
            .unwrap_or_default())
    }

    async fn attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.lock().await;
        let path = state
            .handles
            .get(element as usize)
            .ok_or_else(|| anyhow!("stale element handle {element}"))?;
        let document = Html::parse_document(&state.html);
        Ok(resolve(&document, path)?
            .and_then(|el| el.value().attr(name))
            .map(str::to_string))
    }

    async fn is_visible(&self, element: ElementHandle) -> Result<bool> {
        let state = self.state.lock().await;
        let path = state
            .handles
            .get(element as usize)
            .ok_or_else(|| anyhow!("stale element handle {element}"))?;
        let document = Html::parse_document(&state.html);

        // A static document has no computed layout; inline style and modal
        // ancestry are the best available approximation.
        Ok(resolve(&document, path)?.is_some_and(|el| {
            let hidden = el.value().attr("style").is_some_and(style_hides);
            !hidden && !inside_modal(el)
        }))
    }

    async fn click(&self, element: ElementHandle) -> Result<()> {
        debug!(element, "click is a no-op on a static page");
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<()> {
        debug!(x, y, "coordinate click is a no-op on a static page");
        Ok(())
    }

    async fn scroll_into_view(&self, element: ElementHandle) -> Result<()> {
        debug!(element, "scroll is a no-op on a static page");
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        debug!(script, "script evaluation unavailable on a static page");
        Ok(serde_json::Value::Null)
    }

    async fn evaluate_on(
        &self,
        element: ElementHandle,
        script: &str,
    ) -> Result<serde_json::Value> {
        debug!(element, script, "script evaluation unavailable on a static page");
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.state.lock().await.html.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        bail!(
            "screenshot to {} not supported without a renderer",
            path.display()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div class="ticket-wrap">
            <span class="name">Toàn Sàn</span>
            <a href="https://shopee.vn/deal">List áp dụng</a>
          </div>
          <div class="ticket-wrap" style="display: none">
            <span class="name">Hidden</span>
          </div>
          <div class="el-dialog__wrapper">
            <div class="ticket-wrap"><span class="name">In modal</span></div>
          </div>
        </body></html>
    "#;

    #[tokio::test]
    async fn queries_and_reads_nested_elements() {
        let page = StaticPage::from_html(PAGE);
        let tickets = page.query_all(".ticket-wrap").await.unwrap();
        assert_eq!(tickets.len(), 3);

        let name = page.query_within(tickets[0], ".name").await.unwrap().unwrap();
        assert_eq!(page.text(name).await.unwrap(), "Toàn Sàn");

        let link = page.query_within(tickets[0], "a").await.unwrap().unwrap();
        assert_eq!(
            page.attribute(link, "href").await.unwrap().as_deref(),
            Some("https://shopee.vn/deal")
        );
    }

    #[tokio::test]
    async fn visibility_excludes_hidden_and_modal_elements() {
        let page = StaticPage::from_html(PAGE);
        let tickets = page.query_all(".ticket-wrap").await.unwrap();

        assert!(page.is_visible(tickets[0]).await.unwrap());
        assert!(!page.is_visible(tickets[1]).await.unwrap());
        assert!(!page.is_visible(tickets[2]).await.unwrap());
    }

    #[tokio::test]
    async fn missing_elements_resolve_to_empty_values() {
        let page = StaticPage::from_html(PAGE);
        assert!(page.query_one(".nonexistent").await.unwrap().is_none());

        let tickets = page.query_all(".ticket-wrap").await.unwrap();
        assert!(
            page.query_within(tickets[0], ".expried-date")
                .await
                .unwrap()
                .is_none()
        );
    }
}
