//! Rendering surface abstraction
//!
//! A surface is one browser-like identity: it navigates, answers DOM queries,
//! scrolls and clicks, and publishes the background responses it observes.
//! The crawler never shares a surface between tasks.

use crate::surface::dom::{Closest, ElementData};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors raised by a rendering surface
#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Invalid selector {0}")]
    Selector(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("No page loaded")]
    NoPage,

    #[error("Operation not supported by this surface: {0}")]
    Unsupported(&'static str),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A response observed by the surface, either from navigation or in the background
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResponse {
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl NetworkResponse {
    /// Treats 200 and 302 as healthy, anything else ends a feed
    pub fn is_ok(&self) -> bool {
        self.status == 200 || self.status == 302
    }
}

/// Per-navigation settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Use the mobile device profile instead of the desktop one
    pub mobile: bool,

    /// Locale tag like `en-US`
    pub language: String,

    pub timeout: Duration,
}

impl Default for NavigateOptions {
    fn default() -> Self {
        Self {
            mobile: true,
            language: "en-US".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Scroll position and document size
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMetrics {
    pub scroll_y: f64,
    pub scroll_height: f64,
    pub inner_height: f64,
}

const METRICS_SCRIPT: &str = "({ scrollY: window.scrollY, scrollHeight: document.body.scrollHeight, innerHeight: window.innerHeight })";

/// One rendering identity
#[async_trait]
pub trait Surface: Send + Sync {
    /// Loads `url`, returning the main document response if there was one
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Option<NetworkResponse>, SurfaceError>;

    /// URL of the loaded document after redirects
    fn current_url(&self) -> String;

    /// All elements matching `selector`
    async fn query(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError>;

    /// Matches of `selector` paired with their closest `ancestor`
    async fn query_closest(
        &self,
        selector: &str,
        ancestor: &str,
    ) -> Result<Vec<Closest>, SurfaceError>;

    /// Runs a script in the page and returns its JSON result
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SurfaceError> {
        let _ = script;
        Err(SurfaceError::Unsupported("evaluate"))
    }

    /// Clicks every element matching `selector`, returning how many were clicked
    async fn click(&self, selector: &str) -> Result<usize, SurfaceError>;

    /// Clicks the matches of `selector` at `indices`, counted in document order
    ///
    /// Surfaces without a script engine click nothing.
    async fn click_at(&self, selector: &str, indices: &[usize]) -> Result<usize, SurfaceError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| SurfaceError::Evaluation(e.to_string()))?;
        let script = format!(
            "(() => {{ const all = document.querySelectorAll({}); let n = 0; for (const i of {:?}) {{ if (all[i]) {{ all[i].click(); n++; }} }} return n; }})()",
            quoted, indices
        );

        match self.evaluate(&script).await {
            Ok(value) => Ok(value.as_u64().unwrap_or(0) as usize),
            Err(SurfaceError::Unsupported(_)) => Ok(0),
            Err(e) => Err(e),
        }
    }

    /// Stream of responses observed from now on
    fn subscribe(&self) -> broadcast::Receiver<NetworkResponse>;

    async fn exists(&self, selector: &str) -> Result<bool, SurfaceError> {
        Ok(!self.query(selector).await?.is_empty())
    }

    /// Polls until `selector` matches or `timeout` elapses
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<bool, SurfaceError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.exists(selector).await? {
                return Ok(true);
            }

            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }

            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Returns true once an element matching `selector` was scrolled into view
    ///
    /// Surfaces without a script engine fall back to [`Surface::exists`].
    async fn in_viewport(&self, selector: &str) -> Result<bool, SurfaceError> {
        let quoted = serde_json::to_string(selector)
            .map_err(|e| SurfaceError::Evaluation(e.to_string()))?;
        let script = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; const r = el.getBoundingClientRect(); return r.top < window.innerHeight; }})()",
            quoted
        );

        match self.evaluate(&script).await {
            Ok(value) => Ok(value.as_bool().unwrap_or(false)),
            Err(SurfaceError::Unsupported(_)) => self.exists(selector).await,
            Err(e) => Err(e),
        }
    }

    async fn metrics(&self) -> Result<PageMetrics, SurfaceError> {
        let value = self.evaluate(METRICS_SCRIPT).await?;
        serde_json::from_value(value).map_err(|e| SurfaceError::Evaluation(e.to_string()))
    }

    async fn scroll_by(&self, pixels: f64) -> Result<(), SurfaceError> {
        self.evaluate(&format!("window.scrollBy({{ top: {} }})", pixels.round()))
            .await
            .map(|_| ())
    }
}

/// Hands out surfaces to workers and rotates identities
#[async_trait]
pub trait SurfacePool: Send + Sync {
    type Surface: Surface + 'static;

    /// Takes a surface for the exclusive use of one task
    async fn acquire(&self) -> Result<Self::Surface, SurfaceError>;

    /// Returns a healthy surface to the pool
    async fn release(&self, surface: Self::Surface);

    /// Discards a surface whose identity was flagged (captcha, wrong layout)
    async fn retire(&self, surface: Self::Surface);
}

/// Scrolls down by a fraction of the viewport, the usual way to grow a feed
pub async fn scroll_feed(surface: &dyn Surface) -> Result<(), SurfaceError> {
    let metrics = surface.metrics().await?;
    let step = (metrics.inner_height / 1.75).round();
    surface
        .scroll_by(if step > 0.0 { step } else { 100.0 })
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Answers `evaluate` only, like a bare script console
    struct ScriptConsole {
        scripts: Mutex<Vec<String>>,
        tx: broadcast::Sender<NetworkResponse>,
    }

    #[async_trait]
    impl Surface for ScriptConsole {
        async fn navigate(
            &self,
            _url: &str,
            _options: &NavigateOptions,
        ) -> Result<Option<NetworkResponse>, SurfaceError> {
            Ok(None)
        }

        fn current_url(&self) -> String {
            "about:blank".to_string()
        }

        async fn query(&self, _selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
            Ok(Vec::new())
        }

        async fn query_closest(
            &self,
            _selector: &str,
            _ancestor: &str,
        ) -> Result<Vec<Closest>, SurfaceError> {
            Ok(Vec::new())
        }

        async fn evaluate(&self, script: &str) -> Result<serde_json::Value, SurfaceError> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(serde_json::json!({ "scrollY": 350.0, "scrollHeight": 4000.0, "innerHeight": 700.0 }))
        }

        async fn click(&self, _selector: &str) -> Result<usize, SurfaceError> {
            Ok(0)
        }

        fn subscribe(&self) -> broadcast::Receiver<NetworkResponse> {
            self.tx.subscribe()
        }
    }

    fn console() -> ScriptConsole {
        let (tx, _) = broadcast::channel(4);
        ScriptConsole {
            scripts: Mutex::new(Vec::new()),
            tx,
        }
    }

    #[tokio::test]
    async fn test_default_metrics_via_evaluate() {
        let surface = console();
        let metrics = surface.metrics().await.unwrap();

        assert_eq!(metrics.scroll_y, 350.0);
        assert_eq!(metrics.scroll_height, 4000.0);
        assert_eq!(metrics.inner_height, 700.0);
    }

    #[tokio::test]
    async fn test_scroll_feed_uses_viewport_fraction() {
        let surface = console();
        scroll_feed(&surface).await.unwrap();

        let scripts = surface.scripts.lock().unwrap();
        assert_eq!(scripts.last().unwrap(), "window.scrollBy({ top: 400 })");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_gives_up() {
        let surface = console();
        let found = surface
            .wait_for("#never", Duration::from_secs(2))
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_in_viewport_runs_script() {
        let surface = console();
        // the console answers with an object, not a boolean
        assert!(!surface.in_viewport("#see_more").await.unwrap());

        let scripts = surface.scripts.lock().unwrap();
        assert!(scripts.last().unwrap().contains(r##"querySelector("#see_more")"##));
    }

    #[tokio::test]
    async fn test_click_at_targets_indices() {
        let surface = console();
        assert_eq!(surface.click_at("a.more", &[0, 2]).await.unwrap(), 0);

        let scripts = surface.scripts.lock().unwrap();
        let script = scripts.last().unwrap();
        assert!(script.contains(r#"querySelectorAll("a.more")"#));
        assert!(script.contains("[0, 2]"));
    }

    #[test]
    fn test_response_health() {
        let mut response = NetworkResponse {
            url: "https://m.facebook.com/ajax/bz".to_string(),
            status: 302,
            body: String::new(),
        };
        assert!(response.is_ok());
        response.status = 500;
        assert!(!response.is_ok());
    }
}
