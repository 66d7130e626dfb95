//! Per-task processing: navigate, check, extract, merge
//!
//! Each label and section has one handler. Handlers merge their result into
//! the entity store and return the tasks they discovered.

use crate::config::Config;
use crate::crawler::checks::check_page;
use crate::crawler::task::{expand_entity, Section, Task};
use crate::extract::{
    extract_fields, harvest_comments, harvest_post_links, harvest_reviews, harvest_services,
    listing_urls, page_info, post_content, post_stats, Bounds, CommentsMode, Selectors,
};
use crate::harvest::Cutoff;
use crate::state::{EntityRecord, EntityStore, Patch, PostRecord};
use crate::surface::{NavigateOptions, Surface};
use crate::url::Label;
use crate::{ConfigError, TaskError, TaskResult};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Settings shared by every task of a run
#[derive(Debug, Clone)]
pub struct PhaseContext {
    pub selectors: Selectors,
    pub sections: Vec<Section>,
    pub posts: Bounds,
    pub reviews: Bounds,
    pub comments: Bounds,
    pub comments_mode: CommentsMode,
    pub idle_timeout: Duration,
    pub language: String,
    pub navigation_timeout: Duration,
}

fn cutoff(value: &Option<String>) -> Result<Cutoff, ConfigError> {
    Cutoff::parse(value.as_deref()).map_err(ConfigError::InvalidDate)
}

impl PhaseContext {
    /// Resolves the textual settings of `config`
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let input = &config.input;
        let idle_timeout = Duration::from_secs(config.crawler.idle_timeout_secs);

        let sections = input
            .sections
            .iter()
            .map(|s| s.parse::<Section>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ConfigError::Validation)?;

        let comments_mode = input
            .comments_mode
            .parse::<CommentsMode>()
            .map_err(ConfigError::Validation)?;

        Ok(Self {
            selectors: config.selectors.clone(),
            sections,
            posts: Bounds {
                cap: input.max_posts,
                cutoff: cutoff(&input.max_post_date)?,
                idle_timeout,
            },
            reviews: Bounds {
                cap: input.max_reviews,
                cutoff: cutoff(&input.max_review_date)?,
                idle_timeout,
            },
            comments: Bounds {
                cap: input.max_post_comments,
                cutoff: cutoff(&input.max_comment_date)?,
                idle_timeout,
            },
            comments_mode,
            idle_timeout,
            language: input.language.clone(),
            navigation_timeout: Duration::from_secs(config.crawler.navigation_timeout_secs),
        })
    }

    pub fn navigate_options(&self, mobile: bool) -> NavigateOptions {
        NavigateOptions {
            mobile,
            language: self.language.clone(),
            timeout: self.navigation_timeout,
        }
    }
}

/// Fails a merge whose result would still have no category
fn require_categories(url: &str, record: EntityRecord) -> TaskResult<EntityRecord> {
    if record.categories.iter().all(|c| c.trim().is_empty()) {
        return Err(TaskError::MissingRequiredField {
            url: url.to_string(),
            field: "categories",
        });
    }
    Ok(record)
}

/// Processes one task on a surface reserved for it
///
/// # Returns
///
/// The tasks discovered while processing: entity sections for a listing,
/// post details for a posts view, nothing otherwise.
pub async fn run_task(
    ctx: &PhaseContext,
    store: &EntityStore,
    surface: &dyn Surface,
    task: &Task,
) -> TaskResult<Vec<Task>> {
    let started = Instant::now();

    surface
        .navigate(&task.url, &ctx.navigate_options(task.use_mobile))
        .await
        .map_err(|e| TaskError::Navigation {
            url: task.url.clone(),
            reason: e.to_string(),
        })?;

    check_page(surface, &ctx.selectors, task).await?;

    let discovered = match (task.label, task.section) {
        (Label::Listing, _) => listing(ctx, surface, task).await?,
        (Label::Post, _) => {
            post(ctx, store, surface, task).await?;
            Vec::new()
        }
        (Label::Page, Some(Section::Posts)) => posts(ctx, surface, task).await?,
        (Label::Page, Some(section)) => {
            section_phase(ctx, store, surface, task, section).await?;
            Vec::new()
        }
        (Label::Page, None) => {
            debug!(url = %task.url, "Page task without a section");
            Vec::new()
        }
    };

    info!(
        url = %task.url,
        label = %task.label,
        elapsed_ms = started.elapsed().as_millis() as u64,
        discovered = discovered.len(),
        "Task done"
    );

    Ok(discovered)
}

async fn listing(ctx: &PhaseContext, surface: &dyn Surface, task: &Task) -> TaskResult<Vec<Task>> {
    let urls = listing_urls(surface, &ctx.selectors).await?;
    info!(url = %task.url, "Found {} entities on listing", urls.len());

    let mut tasks = Vec::new();
    for url in urls {
        match expand_entity(&url, &ctx.sections, &task.url) {
            Ok(expanded) => tasks.extend(expanded),
            Err(e) => debug!(url = %url, "Ignoring listing link: {}", e),
        }
    }

    Ok(tasks)
}

async fn section_phase(
    ctx: &PhaseContext,
    store: &EntityStore,
    surface: &dyn Surface,
    task: &Task,
    section: Section,
) -> TaskResult<()> {
    let entity = task.entity_key()?;
    let url = task.url.as_str();

    match section {
        Section::Home => {
            store
                .merge(&entity, |record| async move {
                    let identity = page_info(surface, &ctx.selectors).await?;
                    let fields = extract_fields(surface, &ctx.selectors, ctx.idle_timeout).await?;
                    require_categories(url, Patch::Home(identity, fields).apply(record))
                })
                .await?;
        }
        Section::About => {
            store
                .merge(&entity, |record| async move {
                    let fields = extract_fields(surface, &ctx.selectors, ctx.idle_timeout).await?;
                    require_categories(url, Patch::About(fields).apply(record))
                })
                .await?;
        }
        Section::Services => {
            let services = harvest_services(surface, &ctx.selectors, ctx.idle_timeout).await;
            if services.is_empty() {
                return Err(TaskError::SectionMissing {
                    url: url.to_string(),
                    section: "services",
                    reason: "no services listed".to_string(),
                });
            }
            store.apply(&entity, Patch::Services(services)).await;
        }
        Section::Reviews => {
            let reviews = harvest_reviews(surface, &ctx.selectors, ctx.reviews).await?;
            debug!(entity = %entity, "Harvested {} reviews", reviews.reviews.len());
            store.apply(&entity, Patch::Reviews(reviews)).await;
        }
        Section::Posts => {}
    }

    Ok(())
}

async fn posts(ctx: &PhaseContext, surface: &dyn Surface, task: &Task) -> TaskResult<Vec<Task>> {
    let entity = task.entity_key()?;
    let targets = harvest_post_links(surface, &ctx.selectors, &entity, ctx.posts).await;

    info!(entity = %entity, "Queueing {} posts", targets.len());

    Ok(targets
        .into_iter()
        .map(|target| Task::post(target.url, target.canonical, entity.clone()))
        .collect())
}

async fn post(
    ctx: &PhaseContext,
    store: &EntityStore,
    surface: &dyn Surface,
    task: &Task,
) -> TaskResult<()> {
    let entity = task.entity_key()?;
    let canonical = task.canonical.clone().unwrap_or_else(|| task.url.clone());

    let (stats, content) = tokio::join!(
        post_stats(surface, &canonical),
        post_content(surface, &ctx.selectors),
    );

    let content = content?;
    let stats = stats.unwrap_or_else(|e| {
        warn!(url = %task.url, "Post statistics unavailable: {}", e);
        Default::default()
    });

    let comments = harvest_comments(surface, &ctx.selectors, ctx.comments_mode, ctx.comments).await;

    let record = PostRecord {
        date: content.date,
        text: Some(content.text).filter(|text| !text.is_empty()),
        url: Some(content.url),
        canonical_url: Some(canonical),
        stats,
        images: content.images,
        links: content.links,
        comments,
    };

    store.apply(&entity, Patch::Post(record)).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::extract::testing::StaticSurface;
    use crate::storage::{share, MemoryStorage};

    const CONFIG: &str = r#"
[input]
start-urls = ["https://www.facebook.com/acme"]
sections = ["posts", "reviews"]
max-post-date = "2019-01-01"
comments-mode = "RECENT_ACTIVITY"

[output]
checkpoint-path = "checkpoint.db"
dataset-path = "dataset.jsonl"
"#;

    fn context() -> PhaseContext {
        PhaseContext::from_config(&parse_config(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_context_from_config() {
        let ctx = context();

        assert_eq!(ctx.sections, vec![Section::Posts, Section::Reviews]);
        assert_eq!(ctx.comments_mode, CommentsMode::RecentActivity);
        assert!(ctx.posts.cutoff.min().is_some());
        assert!(ctx.reviews.cutoff.min().is_none());
        assert_eq!(ctx.posts.cap, 3);

        let options = ctx.navigate_options(false);
        assert!(!options.mobile);
        assert_eq!(options.language, "en-US");
    }

    #[test]
    fn test_missing_categories() {
        let err = require_categories("https://m.facebook.com/pg/acme", EntityRecord::default())
            .unwrap_err();
        assert_eq!(err.namespace(), "missing-required-field");

        let record = EntityRecord {
            categories: vec!["Bakery".to_string()],
            ..Default::default()
        };
        assert!(require_categories("https://m.facebook.com/pg/acme", record).is_ok());
    }

    #[tokio::test]
    async fn test_listing_task_expands_entities() {
        let ctx = context();
        let store = EntityStore::new(share(MemoryStorage::new()));
        let surface = StaticSurface::new(
            "https://www.facebook.com/biz/prague/",
            r#"<html><body>
                <div><a href="https://www.facebook.com/acme/?ref=br_rs" onmousedown="click_page_link()">Acme</a></div>
                <div><a href="https://www.facebook.com/other/" onmousedown="click_page_link()">Other</a></div>
            </body></html>"#,
        );

        let listing = Task::listing("https://www.facebook.com/biz/prague/");
        let tasks = run_task(&ctx, &store, &surface, &listing).await.unwrap();

        assert_eq!(tasks.len(), 6);
        assert!(tasks
            .iter()
            .all(|t| t.referrer.as_deref() == Some("https://www.facebook.com/biz/prague/")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_leaves_store_untouched() {
        let ctx = context();
        let store = EntityStore::new(share(MemoryStorage::new()));
        let surface = StaticSurface::new(
            "https://m.facebook.com/pg/ghost",
            r#"<html><head><meta name="viewport" content="x"></head><body class="touch"></body></html>"#,
        );

        let task = Task::page("https://m.facebook.com/pg/ghost", Section::Home, "ghost", "");
        let err = run_task(&ctx, &store, &surface, &task).await.unwrap_err();

        assert!(matches!(err, TaskError::NotFound { .. }));
        assert!(store.is_empty());
    }
}
