//! Integration tests for the harvester
//!
//! The orchestrator runs against a scripted in-memory surface that serves
//! fixed markup per URL. The HTTP-backed surface is tested against wiremock.

use async_trait::async_trait;
use chrono::Utc;
use pagesweep::config::{parse_config, Config, UserAgentConfig};
use pagesweep::crawler::{run_task, Coordinator, PhaseContext, Section, Task};
use pagesweep::output::{export_dataset, MemorySink};
use pagesweep::state::{EntityStore, FieldsPatch, Patch};
use pagesweep::storage::{open_storage, share, MemoryStorage, Storage};
use pagesweep::surface::{
    build_http_client, Closest, Document, ElementData, HttpSurface, NavigateOptions,
    NetworkResponse, PageMetrics, Surface, SurfaceError, SurfacePool,
};
use pagesweep::{TaskError, TaskState};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Serves fixed markup per URL; unknown URLs fail to navigate
struct ScriptedSurface {
    pages: Arc<HashMap<String, String>>,
    document: Mutex<Document>,
    responses: broadcast::Sender<NetworkResponse>,
}

impl ScriptedSurface {
    fn new(pages: Arc<HashMap<String, String>>) -> Self {
        let (responses, _) = broadcast::channel(16);
        Self {
            pages,
            document: Mutex::new(Document::new("about:blank", "")),
            responses,
        }
    }

    fn document(&self) -> Document {
        self.document.lock().unwrap().clone()
    }
}

#[async_trait]
impl Surface for ScriptedSurface {
    async fn navigate(
        &self,
        url: &str,
        _options: &NavigateOptions,
    ) -> Result<Option<NetworkResponse>, SurfaceError> {
        let html = self
            .pages
            .get(url)
            .ok_or_else(|| SurfaceError::Navigation(format!("{}: connection refused", url)))?;

        *self.document.lock().unwrap() = Document::new(url, html.as_str());
        Ok(Some(NetworkResponse {
            url: url.to_string(),
            status: 200,
            body: html.clone(),
        }))
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

    async fn click(&self, _selector: &str) -> Result<usize, SurfaceError> {
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

struct ScriptedPool {
    pages: Arc<HashMap<String, String>>,
    retired: AtomicUsize,
}

impl ScriptedPool {
    fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: Arc::new(
                pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
            ),
            retired: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl SurfacePool for ScriptedPool {
    type Surface = ScriptedSurface;

    async fn acquire(&self) -> Result<ScriptedSurface, SurfaceError> {
        Ok(ScriptedSurface::new(self.pages.clone()))
    }

    async fn release(&self, _surface: ScriptedSurface) {}

    async fn retire(&self, _surface: ScriptedSurface) {
        self.retired.fetch_add(1, Ordering::SeqCst);
    }
}

/// Creates a test configuration for the given start URLs and sections
fn create_test_config(start_urls: &[&str], sections: &[&str], retries: u32) -> Config {
    let quoted = |values: &[&str]| {
        values
            .iter()
            .map(|v| format!("\"{}\"", v))
            .collect::<Vec<_>>()
            .join(", ")
    };

    parse_config(&format!(
        r#"
[crawler]
max-concurrency = 2
max-request-retries = {}
idle-timeout-secs = 5

[input]
start-urls = [{}]
sections = [{}]

[output]
checkpoint-path = "checkpoint.db"
dataset-path = "dataset.jsonl"
"#,
        retries,
        quoted(start_urls),
        quoted(sections)
    ))
    .expect("Failed to parse test config")
}

fn mobile_page(head: &str, body: &str) -> String {
    format!(
        r#"<html><head><meta name="viewport" content="width=device-width">{}</head>
        <body class="touch"><div id="pages_msite_body_contents">{}</div></body></html>"#,
        head, body
    )
}

const ENTITY_HEAD: &str = r#"
    <meta property="og:url" content="https://www.facebook.com/acme/">
    <meta property="og:title" content="Acme Bakery">
    <meta name="description" content="Acme Bakery, Prague. 1,234 likes">
"#;

const CATEGORIES: &str = r#"
    <div id="categories">
        <img src="https://static.xx.fbcdn.net/rsrc.php/v3/Knsy-moHXi6.png">
        <div>Bakery · Cafe</div>
    </div>
"#;

const PHONE: &str = r#"
    <div id="phone">
        <img src="https://static.xx.fbcdn.net/rsrc.php/v3/6oGknb-0EsE.png">
        <div>+420 123 456 789</div>
    </div>
"#;

#[tokio::test]
async fn test_listing_expands_into_section_tasks() {
    let listing = r#"<html><body>
        <div><a href="https://www.facebook.com/acme/" onmousedown="click_page_link()">Acme</a></div>
        <div><a href="https://www.facebook.com/beta/" onmousedown="click_page_link()">Beta</a></div>
        <div><a href="https://www.facebook.com/gamma/?ref=br_rs" onmousedown="click_page_link()">Gamma</a></div>
        <div><a href="https://www.facebook.com/acme/" onmousedown="click_page_link()">Acme again</a></div>
    </body></html>"#;

    let url = "https://www.facebook.com/biz/prague/";
    let config = create_test_config(&[url], &["posts", "reviews"], 0);
    let context = PhaseContext::from_config(&config).unwrap();
    let store = EntityStore::new(share(MemoryStorage::new()));
    let pages = Arc::new(HashMap::from([(url.to_string(), listing.to_string())]));
    let surface = ScriptedSurface::new(pages);

    let tasks = run_task(&context, &store, &surface, &Task::listing(url))
        .await
        .unwrap();

    assert_eq!(tasks.len(), 9);
    assert_eq!(
        tasks.iter().filter(|t| t.is_home()).count(),
        3,
        "one home task per entity"
    );
    assert!(tasks.iter().any(|t| t.url == "https://m.facebook.com/pg/gamma/reviews"));
    assert!(tasks.iter().all(|t| t.use_mobile));
}

#[tokio::test(start_paused = true)]
async fn test_full_crawl_checkpoints_and_exports() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("checkpoint.db");

    let home = mobile_page(ENTITY_HEAD, CATEGORIES);
    let about = mobile_page(ENTITY_HEAD, &format!("{}{}", CATEGORIES, PHONE));
    let services = mobile_page(ENTITY_HEAD, "");

    let pool = ScriptedPool::new(&[
        ("https://m.facebook.com/pg/acme", home.as_str()),
        ("https://m.facebook.com/pg/acme/about", about.as_str()),
        ("https://m.facebook.com/pg/acme/services", services.as_str()),
    ]);

    let config = create_test_config(
        &["https://www.facebook.com/acme", "https://www.facebook.com/acme/posts/10"],
        &["about", "services"],
        1,
    );

    let storage = share(open_storage(&db_path).unwrap());
    let mut coordinator =
        Coordinator::new(config, "hash", storage.clone(), pool.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.completed, 2);
    assert_eq!(report.soft_failed, 1, "no services listed");
    assert_eq!(report.skipped, 1, "single post start URL");
    assert_eq!(report.dropped, 0);
    assert_eq!(pool.retired.load(Ordering::SeqCst), 0);

    let sink = MemorySink::new();
    let written = export_dataset(&coordinator.store(), &sink, Utc::now()).unwrap();
    assert_eq!(written, 1);

    let record = &sink.records()[0];
    assert_eq!(record.url.as_deref(), Some("https://www.facebook.com/acme"));
    assert_eq!(record.referrer.as_deref(), Some("https://www.facebook.com/acme"));
    assert_eq!(record.title.as_deref(), Some("Acme Bakery"));
    assert_eq!(record.categories, vec!["Bakery", "Cafe"]);
    assert_eq!(record.phone.as_deref(), Some("+420 123 456 789"));
    assert!(record.finished_at.is_some());
    assert!(record.version.is_some());

    let counts = storage.lock().unwrap().count_outcomes_by_state().unwrap();
    assert_eq!(counts.get(&TaskState::Completed), Some(&2));
    assert_eq!(counts.get(&TaskState::SoftFailed), Some(&1));

    // A new process sees the same entities
    drop(coordinator);
    drop(storage);
    let reopened = EntityStore::open(share(open_storage(&db_path).unwrap())).unwrap();
    let resumed = reopened.get("acme").expect("entity was checkpointed");
    assert_eq!(resumed.categories, vec!["Bakery", "Cafe"]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_entity_is_not_retried() {
    let missing = mobile_page("", "<p>This content isn't available right now</p>");
    let pool = ScriptedPool::new(&[
        ("https://m.facebook.com/pg/ghost", missing.as_str()),
        ("https://m.facebook.com/pg/ghost/about", missing.as_str()),
    ]);

    let config = create_test_config(&["https://www.facebook.com/ghost"], &["about"], 3);
    let storage = share(MemoryStorage::new());

    let mut coordinator =
        Coordinator::new(config, "hash", storage.clone(), pool.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.not_found, 2);
    assert_eq!(report.retried, 0);
    assert_eq!(pool.retired.load(Ordering::SeqCst), 0);
    assert!(coordinator.store().export(Utc::now()).is_empty());

    let counts = storage.lock().unwrap().count_outcomes_by_state().unwrap();
    assert_eq!(counts.get(&TaskState::NotFound), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn test_captcha_retires_identity_until_dropped() {
    let captcha = mobile_page(
        ENTITY_HEAD,
        r#"<form action="/captcha/submit"><input name="captcha_response"></form>"#,
    );
    let pool = ScriptedPool::new(&[
        ("https://m.facebook.com/pg/acme", captcha.as_str()),
        ("https://m.facebook.com/pg/acme/about", captcha.as_str()),
    ]);

    let config = create_test_config(&["https://www.facebook.com/acme"], &["about"], 2);
    let storage = share(MemoryStorage::new());

    let mut coordinator =
        Coordinator::new(config, "hash", storage.clone(), pool.clone(), false).unwrap();
    let report = coordinator.run().await.unwrap();

    assert_eq!(report.retried, 4);
    assert_eq!(report.dropped, 2);
    assert_eq!(pool.retired.load(Ordering::SeqCst), 6);

    let failed = storage.lock().unwrap().get_failed_outcomes(10).unwrap();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|f| f.attempts == 3));
    assert!(failed
        .iter()
        .all(|f| f.error_message.as_deref().unwrap_or("").contains("Captcha")));
}

#[tokio::test]
async fn test_concurrent_merges_keep_every_update() {
    let store = Arc::new(EntityStore::new(share(MemoryStorage::new())));

    let merges = (0..20).map(|i| {
        let store = store.clone();
        tokio::spawn(async move {
            store
                .merge("acme", |record| async move {
                    tokio::task::yield_now().await;
                    let patch = Patch::About(FieldsPatch {
                        categories: vec![format!("category-{}", i)],
                        ..Default::default()
                    });
                    Ok::<_, TaskError>(patch.apply(record))
                })
                .await
        })
    });

    for merge in futures::future::join_all(merges).await {
        merge.unwrap().unwrap();
    }

    assert_eq!(store.get("acme").unwrap().categories.len(), 20);
}

#[tokio::test]
async fn test_http_surface_uses_mobile_profile() {
    let mock_server = MockServer::start().await;
    let agents = UserAgentConfig {
        mobile: "pagesweep-test-mobile".to_string(),
        desktop: "pagesweep-test-desktop".to_string(),
    };

    Mock::given(method("GET"))
        .and(path("/pg/acme"))
        .and(header("user-agent", agents.mobile.as_str()))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(mobile_page(ENTITY_HEAD, CATEGORIES)),
        )
        .mount(&mock_server)
        .await;

    let surface = HttpSurface::new(
        build_http_client(Duration::from_secs(5)).unwrap(),
        agents.clone(),
    );
    let mut responses = surface.subscribe();

    let url = format!("{}/pg/acme", mock_server.uri());
    let response = surface
        .navigate(&url, &NavigateOptions::default())
        .await
        .unwrap()
        .expect("navigation returns the document response");

    assert_eq!(response.status, 200);
    assert_eq!(responses.recv().await.unwrap().url, url);
    assert_eq!(surface.current_url(), url);

    let title = surface.query(r#"meta[property="og:title"]"#).await.unwrap();
    assert_eq!(title[0].attr("content"), Some("Acme Bakery"));
    assert!(surface.exists("body.touch").await.unwrap());
}

#[tokio::test]
async fn test_http_page_without_entity_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/pg/ghost/about"))
        .respond_with(ResponseTemplate::new(200).set_body_string(mobile_page("", "")))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&["https://www.facebook.com/ghost"], &["about"], 0);
    let context = PhaseContext::from_config(&config).unwrap();
    let store = EntityStore::new(share(MemoryStorage::new()));
    let surface = HttpSurface::new(
        build_http_client(Duration::from_secs(5)).unwrap(),
        config.user_agent.clone(),
    );

    let task = Task::page(
        format!("{}/pg/ghost/about", mock_server.uri()),
        Section::About,
        "ghost",
        "https://www.facebook.com/ghost",
    );

    let err = run_task(&context, &store, &surface, &task).await.unwrap_err();
    assert!(matches!(err, TaskError::NotFound { .. }));
    assert!(store.is_empty());
}
