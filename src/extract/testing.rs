//! Test helpers: a rendering surface over fixed markup

use crate::surface::{
    Closest, Document, ElementData, NavigateOptions, NetworkResponse, PageMetrics, Surface,
    SurfaceError,
};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Serves one static document; clicks are recorded and change nothing
pub(crate) struct StaticSurface {
    document: Mutex<Document>,
    pub clicks: Mutex<Vec<String>>,
    pub responses: broadcast::Sender<NetworkResponse>,
}

impl StaticSurface {
    pub fn new(url: &str, html: &str) -> Self {
        let (responses, _) = broadcast::channel(64);
        Self {
            document: Mutex::new(Document::new(url, html)),
            clicks: Mutex::new(Vec::new()),
            responses,
        }
    }

    pub fn set_html(&self, html: &str) {
        let mut document = self.document.lock().unwrap();
        *document = Document::new(document.url().to_string(), html);
    }

    fn document(&self) -> Document {
        self.document.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for StaticSurface {
    async fn navigate(
        &self,
        url: &str,
        _options: &NavigateOptions,
    ) -> Result<Option<NetworkResponse>, SurfaceError> {
        let html = self.document().html().to_string();
        *self.document.lock().unwrap() = Document::new(url, html);
        Ok(None)
    }

    fn current_url(&self) -> String {
        self.document().url().to_string()
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
        self.document().query(selector)
    }

    async fn query_closest(
        &self,
        selector: &str,
        ancestor: &str,
    ) -> Result<Vec<Closest>, SurfaceError> {
        self.document().query_closest(selector, ancestor)
    }

    async fn click(&self, selector: &str) -> Result<usize, SurfaceError> {
        self.clicks.lock().unwrap().push(selector.to_string());
        Ok(self.document().query(selector)?.len())
    }

    async fn click_at(&self, selector: &str, indices: &[usize]) -> Result<usize, SurfaceError> {
        let found = self.document().query(selector)?.len();
        let mut clicks = self.clicks.lock().unwrap();
        let mut clicked = 0;
        for index in indices.iter().filter(|i| **i < found) {
            clicks.push(format!("{}#{}", selector, index));
            clicked += 1;
        }
        Ok(clicked)
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
