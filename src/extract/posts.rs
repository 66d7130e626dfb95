//! Discovery of post links on the posts view
//!
//! Every rendered post is an `article` whose `data-ft` attribute carries its
//! metadata. Only links are collected here; the content of each post is read
//! later from its own page.

use crate::extract::{absolute_url, pagination_signal, Bounds, Selectors};
use crate::harvest::{
    convert_timestamp, Dated, Feed, GrowthSample, HarvestOptions, Harvester, ResponseListener,
    StopPolicy,
};
use crate::surface::{scroll_feed, ElementData, NetworkResponse, Surface, SurfaceError};
use crate::url::{story_to_permalink, DESKTOP_HOST};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Scheduled live videos have no content yet
const SCHEDULED_LIVE: &str = "scheduled_live_video_post";

/// Background request that loads the next page of a feed
pub(crate) const MORE_CONTENT: &str = "page_content_list_view/more";

/// A post link found in the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostLink {
    /// Top level post id
    pub id: String,
    pub url: String,
    pub date: DateTime<Utc>,
}

impl Dated for PostLink {
    fn date(&self) -> Option<DateTime<Utc>> {
        Some(self.date)
    }
}

/// A post to visit, with its permalink and canonical URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostTarget {
    pub url: String,
    pub canonical: String,
}

fn as_id(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses one post from its `article` and the link around its timestamp
///
/// Returns `None` for posts that cannot or should not be harvested.
pub fn parse_post_link(
    article: &ElementData,
    link: Option<&ElementData>,
    base: &str,
    skip_types: &[String],
) -> Option<PostLink> {
    let ft: Value = serde_json::from_str(article.attr("data-ft")?).ok()?;

    if ft.get("story_attachment_style").and_then(Value::as_str) == Some(SCHEDULED_LIVE) {
        return None;
    }

    let id = as_id(ft.get("top_level_post_id"))?;
    let page_id = as_id(ft.get("page_id"))?;
    let insights = ft.get("page_insights")?.get(&page_id)?;

    if let Some(psn) = insights.get("psn").and_then(Value::as_str) {
        if skip_types.iter().any(|skip| skip == psn) {
            return None;
        }
    }

    let publish_time = match insights.get("post_context")?.get("publish_time")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
    .filter(|t| *t != 0)?;

    let url = absolute_url(base, link?.attr("href")?)?;

    Some(PostLink {
        id,
        url,
        date: convert_timestamp(publish_time)?,
    })
}

/// The posts view, scrolled to load older posts
pub struct PostFeed<'a> {
    surface: &'a dyn Surface,
    skip_types: &'a [String],
}

impl<'a> PostFeed<'a> {
    pub fn new(surface: &'a dyn Surface, selectors: &'a Selectors) -> Self {
        Self {
            surface,
            skip_types: &selectors.post_types_skip,
        }
    }
}

#[async_trait]
impl Feed for PostFeed<'_> {
    type Item = PostLink;

    async fn advance(&self) -> Result<bool, SurfaceError> {
        scroll_feed(self.surface).await?;
        Ok(true)
    }

    async fn sample(&self) -> Result<GrowthSample, SurfaceError> {
        let metrics = self.surface.metrics().await?;
        Ok(GrowthSample {
            a: metrics.scroll_y,
            b: metrics.scroll_height,
        })
    }

    async fn items(&self) -> Result<Vec<(String, PostLink)>, SurfaceError> {
        let base = self.surface.current_url();
        let articles = self.surface.query_closest("abbr", "article").await?;
        let links = self.surface.query_closest("abbr", "a[href]").await?;

        Ok(articles
            .into_iter()
            .zip(links)
            .filter_map(|(article, link)| {
                let post = parse_post_link(
                    article.ancestor.as_ref()?,
                    link.ancestor.as_ref(),
                    &base,
                    self.skip_types,
                )?;
                debug!(url = %post.url, date = %post.date, "Post info");
                Some((post.id.clone(), post))
            })
            .collect())
    }
}

fn canonical_url(slug: &str, permalink: &str, fallback_id: &str) -> String {
    let story = Url::parse(permalink).ok().and_then(|url| {
        url.query_pairs()
            .find(|(key, _)| key == "story_fbid")
            .map(|(_, value)| value.into_owned())
    });

    format!(
        "https://{}/{}/posts/{}",
        DESKTOP_HOST,
        slug,
        story.as_deref().unwrap_or(fallback_id)
    )
}

/// Harvests post links from the loaded posts view
///
/// Links are rewritten to desktop permalinks and paired with the canonical
/// `/<slug>/posts/<id>` URL used as the post's stable key.
pub async fn harvest_post_links(
    surface: &dyn Surface,
    selectors: &Selectors,
    slug: &str,
    bounds: Bounds,
) -> Vec<PostTarget> {
    let stop = if bounds.cap > 0 {
        StopPolicy::Stable { min_iterations: 2 }
    } else {
        StopPolicy::EitherStalled { min_iterations: 10 }
    };

    let options = HarvestOptions::new("posts", stop)
        .cap(bounds.cap)
        .cutoff(bounds.cutoff)
        .settle(Duration::from_millis(300))
        .idle_timeout(bounds.idle_timeout);

    let listener: ResponseListener<PostLink> =
        Box::new(|response: &NetworkResponse| pagination_signal(response, MORE_CONTENT));

    let feed = PostFeed::new(surface, selectors);
    let report = Harvester::new(&feed, options)
        .listen(surface.subscribe(), listener)
        .run()
        .await;

    report
        .items
        .into_iter()
        .filter_map(|post| match story_to_permalink(&post.url) {
            Ok(url) => Some(PostTarget {
                canonical: canonical_url(slug, &url, &post.id),
                url,
            }),
            Err(e) => {
                debug!(url = %post.url, "Skipping post link: {}", e);
                None
            }
        })
        .collect()
}
