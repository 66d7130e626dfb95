//! Comments of a post
//!
//! Comments arrive as structured background responses once the comment list
//! is opened. Clicking "load more" is the advance action; the response
//! listener does the actual collecting and reports the end of the feed.

use crate::extract::{Bounds, CommentsMode, Selectors};
use crate::harvest::{
    convert_timestamp, Feed, GrowthSample, HarvestOptions, Harvester, ResponseListener,
    ResponseSignal, StopPolicy,
};
use crate::state::{CommentRecord, CommentsRecord};
use crate::surface::{scroll_feed, NetworkResponse, Surface, SurfaceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

const GRAPHQL: &str = "api/graphql/";
const BEACON: &str = "ajax/bz";

/// Beacon responses after which the comment feed is considered stuck
const MAX_BEACONS: u32 = 100;

const LOAD_ATTEMPTS: u32 = 10;
const ORDER_MENU: &str = r#"[role="menuitemcheckbox"]"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GraphQlData {
    feedback: Option<Feedback>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Feedback {
    display_comments: Option<DisplayComments>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DisplayComments {
    count: u64,
    edges: Vec<Edge>,
    page_info: Option<PageInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PageInfo {
    has_next_page: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Edge {
    node: Option<Node>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Node {
    id: String,
    created_time: Option<i64>,
    author: Option<Author>,
    body: Option<Body>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Author {
    name: Option<String>,
    url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Body {
    text: Option<String>,
}

/// One page of comments parsed from a background response
#[derive(Debug, Clone, PartialEq)]
pub struct CommentPage {
    /// Total announced by the platform
    pub count: u64,
    pub comments: Vec<(String, CommentRecord)>,
    /// `Some(false)` once the last page was delivered
    pub has_next: Option<bool>,
}

fn display_comments(json: &str) -> Option<DisplayComments> {
    serde_json::from_str::<GraphQlResponse>(json)
        .ok()?
        .data?
        .feedback?
        .display_comments
}

/// Parses a comment feed response
///
/// Bodies may hold several JSON documents, one per line; the first one with
/// comments wins. Returns `None` for unrelated responses.
pub fn parse_comment_page(body: &str) -> Option<CommentPage> {
    let data = display_comments(body)
        .or_else(|| body.lines().find_map(display_comments))?;

    let comments = data
        .edges
        .into_iter()
        .filter_map(|edge| edge.node)
        .filter(|node| !node.id.is_empty())
        .map(|node| {
            let (name, profile_url) = node
                .author
                .map(|author| (author.name, author.url))
                .unwrap_or_default();

            let comment = CommentRecord {
                name,
                date: node.created_time.and_then(convert_timestamp),
                text: node
                    .body
                    .and_then(|body| body.text)
                    .filter(|text| !text.is_empty()),
                profile_url,
                url: node.url,
            };
            (node.id, comment)
        })
        .collect();

    Some(CommentPage {
        count: data.count,
        comments,
        has_next: data.page_info.and_then(|info| info.has_next_page),
    })
}

/// Builds the listener that collects comments from background responses
///
/// The highest announced total is written to `count`.
fn comment_listener(count: Arc<AtomicU64>) -> ResponseListener<CommentRecord> {
    let mut beacons = 0u32;

    Box::new(move |response: &NetworkResponse| {
        if response.url.contains(BEACON) {
            beacons += 1;
        }

        if !response.is_ok() || beacons > MAX_BEACONS {
            debug!(beacons, status = response.status, "Comment feed stopped");
            return ResponseSignal::Finish;
        }

        if !response.url.contains(GRAPHQL) {
            return ResponseSignal::Ignore;
        }

        match parse_comment_page(&response.body) {
            Some(page) => {
                count.fetch_max(page.count, Ordering::Relaxed);
                ResponseSignal::Items {
                    items: page.comments,
                    has_more: page.has_next != Some(false),
                }
            }
            None => ResponseSignal::Ignore,
        }
    })
}

/// The comment list of an opened post, grown by clicking "load more"
pub struct CommentFeed<'a> {
    surface: &'a dyn Surface,
    load_more: &'a str,
}

impl<'a> CommentFeed<'a> {
    pub fn new(surface: &'a dyn Surface, selectors: &'a Selectors) -> Self {
        Self {
            surface,
            load_more: &selectors.load_more_comments,
        }
    }
}

#[async_trait]
impl Feed for CommentFeed<'_> {
    type Item = CommentRecord;

    /// Clicks "load more" unless only reply expanders are left
    async fn advance(&self) -> Result<bool, SurfaceError> {
        scroll_feed(self.surface).await?;

        let mut clickable = Vec::new();
        for (index, found) in self
            .surface
            .query_closest(self.load_more, "ul")
            .await?
            .into_iter()
            .enumerate()
        {
            if found.ancestor.is_none() && found.element.select("i")?.is_empty() {
                clickable.push(index);
            }
        }

        if clickable.is_empty() {
            return Ok(false);
        }

        Ok(self.surface.click_at(self.load_more, &clickable).await? > 0)
    }

    async fn sample(&self) -> Result<GrowthSample, SurfaceError> {
        let metrics = self.surface.metrics().await?;
        Ok(GrowthSample {
            a: metrics.scroll_y,
            b: metrics.scroll_height,
        })
    }

    async fn items(&self) -> Result<Vec<(String, CommentRecord)>, SurfaceError> {
        Ok(Vec::new())
    }
}

/// Clicks "comments" until the list shows up, retrying with a growing delay
async fn load_comments(surface: &dyn Surface, selectors: &Selectors) -> Result<bool, SurfaceError> {
    tokio::time::sleep(Duration::from_millis(700)).await;

    for attempt in 1..=LOAD_ATTEMPTS {
        if surface.exists(&selectors.comments_container).await?
            || surface.exists(&selectors.comment_order).await?
        {
            return Ok(true);
        }

        if surface.exists(&selectors.load_comments).await? {
            surface.click(&selectors.load_comments).await?;
        }

        tokio::time::sleep(Duration::from_millis(400 * u64::from(attempt))).await;
    }

    Ok(false)
}

/// Opens the comment list in the requested ordering
///
/// Returns the response stream to harvest from, or `None` if the post has no
/// comment list. Ranked orderings are shown on load, so their stream starts
/// before the first click; other orderings only after the switch.
async fn open_comments(
    surface: &dyn Surface,
    selectors: &Selectors,
    mode: CommentsMode,
) -> Result<Option<broadcast::Receiver<NetworkResponse>>, SurfaceError> {
    let url = surface.current_url();
    let early = mode.is_ranked().then(|| surface.subscribe());

    if !load_comments(surface, selectors).await? {
        debug!(url = %url, "Load comment button not found");
        return Ok(None);
    }

    debug!(url = %url, mode = %mode, "Load comments clicked, waiting more");
    if !surface
        .wait_for(&selectors.comment_order, Duration::from_secs(5))
        .await?
    {
        debug!(url = %url, "No comment ordering shown");
    }

    if mode != CommentsMode::RankedThreaded {
        if surface.click(&selectors.comment_order).await? > 0 {
            debug!(url = %url, "Opened comment ordering");
            surface.wait_for(ORDER_MENU, Duration::from_secs(15)).await?;

            let late = early.is_none().then(|| surface.subscribe());
            surface
                .click(&format!(
                    r#"{} [data-ordering="{}"]"#,
                    ORDER_MENU,
                    mode.as_str()
                ))
                .await?;
            debug!(url = %url, "Changed mode");

            surface
                .wait_for(&selectors.load_more_comments, Duration::from_secs(5))
                .await?;

            return Ok(early.or(late));
        }

        warn!(url = %url, "Comment ordering not found, using default \"Most relevant\"");
    }

    Ok(Some(early.unwrap_or_else(|| surface.subscribe())))
}

/// Harvests the comments of the loaded post
///
/// Never fails: a post without comments, or a surface error while opening
/// them, gives an empty record.
pub async fn harvest_comments(
    surface: &dyn Surface,
    selectors: &Selectors,
    mode: CommentsMode,
    bounds: Bounds,
) -> CommentsRecord {
    let empty = || CommentsRecord {
        count: 0,
        mode: mode.as_str().to_string(),
        comments: Vec::new(),
    };

    let responses = match open_comments(surface, selectors, mode).await {
        Ok(Some(responses)) => responses,
        Ok(None) => return empty(),
        Err(e) => {
            debug!(url = %surface.current_url(), "Opening comments failed: {}", e);
            return empty();
        }
    };

    let count = Arc::new(AtomicU64::new(0));
    let options = HarvestOptions::new("comments", StopPolicy::Fruitless { max: 3 })
        .cap(bounds.cap)
        .cutoff(bounds.cutoff)
        .settle(Duration::from_millis(500))
        .idle_timeout(bounds.idle_timeout);

    let feed = CommentFeed::new(surface, selectors);
    let report = Harvester::new(&feed, options)
        .listen(responses, comment_listener(count.clone()))
        .run()
        .await;

    CommentsRecord {
        count: count.load(Ordering::Relaxed),
        mode: mode.as_str().to_string(),
        comments: report.items,
    }
}
