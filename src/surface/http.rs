//! HTTP-backed rendering surface
//!
//! This module provides a static surface over `reqwest`:
//! - Building HTTP clients with compression and timeouts
//! - Picking the mobile or desktop user agent per navigation
//! - Sending the locale cookie for the configured language
//! - Publishing every navigation response to subscribers
//!
//! Nothing is executed client side: scrolling and clicking are no-ops and the
//! scroll metrics never change, so feeds settle after their minimum iterations.

use crate::config::UserAgentConfig;
use crate::surface::dom::{Closest, Document, ElementData};
use crate::surface::traits::{
    NavigateOptions, NetworkResponse, PageMetrics, Surface, SurfaceError, SurfacePool,
};
use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, COOKIE, USER_AGENT};
use reqwest::{redirect::Policy, Client};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the response broadcast channel
const RESPONSE_BUFFER: usize = 64;

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `timeout` - Total request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Locale cookie value: `en-US` becomes `en_US`
pub fn locale_cookie(language: &str) -> String {
    format!("locale={}", language.replace('-', "_"))
}

/// A surface that fetches documents over HTTP and queries them statically
pub struct HttpSurface {
    client: Client,
    agents: UserAgentConfig,
    document: Mutex<Option<Document>>,
    responses: broadcast::Sender<NetworkResponse>,
}

impl HttpSurface {
    pub fn new(client: Client, agents: UserAgentConfig) -> Self {
        let (responses, _) = broadcast::channel(RESPONSE_BUFFER);

        Self {
            client,
            agents,
            document: Mutex::new(None),
            responses,
        }
    }

    fn document(&self) -> Result<Document, SurfaceError> {
        let guard = match self.document.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        guard.clone().ok_or(SurfaceError::NoPage)
    }
}

#[async_trait]
impl Surface for HttpSurface {
    async fn navigate(
        &self,
        url: &str,
        options: &NavigateOptions,
    ) -> Result<Option<NetworkResponse>, SurfaceError> {
        let agent = if options.mobile {
            &self.agents.mobile
        } else {
            &self.agents.desktop
        };

        let response = self
            .client
            .get(url)
            .header(USER_AGENT, agent)
            .header(ACCEPT_LANGUAGE, &options.language)
            .header(COOKIE, locale_cookie(&options.language))
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SurfaceError::Timeout(url.to_string())
                } else {
                    SurfaceError::Navigation(format!("{}: {}", url, e))
                }
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await?;

        debug!(url = %final_url, status, bytes = body.len(), "Navigated");

        let observed = NetworkResponse {
            url: final_url.clone(),
            status,
            body: body.clone(),
        };

        // No subscribers is fine
        let _ = self.responses.send(observed.clone());

        let mut guard = match self.document.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Document::new(final_url, body));

        Ok(Some(observed))
    }

    fn current_url(&self) -> String {
        self.document()
            .map(|doc| doc.url().to_string())
            .unwrap_or_default()
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
        self.document()?.query(selector)
    }

    async fn query_closest(
        &self,
        selector: &str,
        ancestor: &str,
    ) -> Result<Vec<Closest>, SurfaceError> {
        self.document()?.query_closest(selector, ancestor)
    }

    async fn click(&self, selector: &str) -> Result<usize, SurfaceError> {
        debug!(selector, "Click ignored by static surface");
        Ok(0)
    }

    fn subscribe(&self) -> broadcast::Receiver<NetworkResponse> {
        self.responses.subscribe()
    }

    async fn metrics(&self) -> Result<PageMetrics, SurfaceError> {
        Ok(PageMetrics::default())
    }

    async fn scroll_by(&self, _pixels: f64) -> Result<(), SurfaceError> {
        Ok(())
    }
}

/// Pool of [`HttpSurface`]s sharing a connection pool
///
/// Retiring a surface rebuilds the client so the next identity starts
/// without any connection state of the flagged one.
pub struct HttpSurfacePool {
    client: Mutex<Client>,
    agents: UserAgentConfig,
    timeout: Duration,
    retired: AtomicUsize,
}

impl HttpSurfacePool {
    pub fn new(agents: UserAgentConfig, timeout: Duration) -> Result<Arc<Self>, SurfaceError> {
        Ok(Arc::new(Self {
            client: Mutex::new(build_http_client(timeout)?),
            agents,
            timeout,
            retired: AtomicUsize::new(0),
        }))
    }

    /// Number of identities retired so far
    pub fn retired_count(&self) -> usize {
        self.retired.load(Ordering::Relaxed)
    }

    fn client(&self) -> Client {
        match self.client.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SurfacePool for HttpSurfacePool {
    type Surface = HttpSurface;

    async fn acquire(&self) -> Result<HttpSurface, SurfaceError> {
        Ok(HttpSurface::new(self.client(), self.agents.clone()))
    }

    async fn release(&self, surface: HttpSurface) {
        drop(surface);
    }

    async fn retire(&self, surface: HttpSurface) {
        drop(surface);
        self.retired.fetch_add(1, Ordering::Relaxed);

        match build_http_client(self.timeout) {
            Ok(fresh) => {
                let mut guard = match self.client.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                *guard = fresh;
            }
            Err(e) => debug!("Keeping previous client, rebuild failed: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_locale_cookie() {
        assert_eq!(locale_cookie("en-US"), "locale=en_US");
        assert_eq!(locale_cookie("cs"), "locale=cs");
    }

    #[tokio::test]
    async fn test_query_before_navigation() {
        let surface = HttpSurface::new(
            build_http_client(Duration::from_secs(5)).unwrap(),
            UserAgentConfig::default(),
        );

        assert!(matches!(
            surface.query("div").await,
            Err(SurfaceError::NoPage)
        ));
        assert_eq!(surface.current_url(), "");
        assert_eq!(surface.click("a").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_retire_counts_identities() {
        let pool = HttpSurfacePool::new(UserAgentConfig::default(), Duration::from_secs(5)).unwrap();

        let surface = pool.acquire().await.unwrap();
        pool.retire(surface).await;
        let surface = pool.acquire().await.unwrap();
        pool.release(surface).await;

        assert_eq!(pool.retired_count(), 1);
    }
}
