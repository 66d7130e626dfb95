//! Reviews of an entity
//!
//! Each review is anchored by an `abbr[data-store]` timestamp; its title,
//! text, attribute tags and link live in the enclosing review container.

use crate::extract::page_info::{aggregate_rating, ld_json};
use crate::extract::posts::MORE_CONTENT;
use crate::extract::{absolute_url, pagination_signal, Bounds, Selectors};
use crate::harvest::{
    convert_timestamp, Feed, GrowthSample, HarvestOptions, Harvester, ResponseListener,
    StopPolicy,
};
use crate::state::{ReviewRecord, ReviewsRecord};
use crate::surface::{scroll_feed, ElementData, NetworkResponse, Surface, SurfaceError};
use crate::url::story_to_permalink;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Container of one review, relative to its timestamp
const REVIEW_CONTAINER: &str = "div:not([id]):not([class]) > [data-ntid]";

/// Separator between attribute tags
const ATTRIBUTE_SEPARATOR: char = '・';

fn joined_texts(container: &ElementData, selector: &str) -> Result<Option<String>, SurfaceError> {
    let texts = container.select_texts(selector)?;
    Ok(Some(texts.join("\n")).filter(|t| !t.is_empty()))
}

/// Parses one review from its timestamp and container
///
/// Reviews without a timestamp are skipped.
pub fn parse_review(
    timestamp: &ElementData,
    container: Option<&ElementData>,
    base: &str,
) -> Result<Option<ReviewRecord>, SurfaceError> {
    let store: Option<Value> = timestamp
        .attr("data-store")
        .and_then(|store| serde_json::from_str(store).ok());

    let time = match store.as_ref().and_then(|s| s.get("time")) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    }
    .filter(|t| *t != 0);

    let Some(time) = time else {
        return Ok(None);
    };

    let Some(container) = container else {
        return Ok(Some(ReviewRecord {
            date: convert_timestamp(time),
            ..Default::default()
        }));
    };

    let attributes = container
        .select_texts(r#"[data-nt="FB:EXPANDABLE_TEXT"]"#)?
        .iter()
        .flat_map(|text| text.split(ATTRIBUTE_SEPARATOR))
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .collect();

    let url = container
        .select("a[aria-label]")?
        .into_iter()
        .find_map(|link| link.attr("href").and_then(|href| absolute_url(base, href)));

    Ok(Some(ReviewRecord {
        date: convert_timestamp(time),
        title: joined_texts(container, r#"[data-nt="FB:TEXT4"]"#)?,
        text: joined_texts(container, "[data-gt]")?,
        attributes,
        url,
        canonical: None,
    }))
}

/// The reviews view, scrolled to load older reviews
pub struct ReviewFeed<'a> {
    surface: &'a dyn Surface,
}

impl<'a> ReviewFeed<'a> {
    pub fn new(surface: &'a dyn Surface) -> Self {
        Self { surface }
    }
}

#[async_trait]
impl Feed for ReviewFeed<'_> {
    type Item = ReviewRecord;

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

    async fn items(&self) -> Result<Vec<(String, ReviewRecord)>, SurfaceError> {
        let base = self.surface.current_url();
        let mut reviews = Vec::new();

        for found in self
            .surface
            .query_closest("abbr[data-store]", REVIEW_CONTAINER)
            .await?
        {
            let review = parse_review(&found.element, found.ancestor.as_ref(), &base)?;
            if let Some(review) = review {
                // reviews are keyed by their link
                if let Some(url) = review.url.clone() {
                    reviews.push((url, review));
                }
            }
        }

        Ok(reviews)
    }
}

/// Harvests the reviews and the rating aggregate of the loaded reviews view
///
/// Story links are rewritten to desktop permalinks; the original link is kept
/// as `canonical`.
pub async fn harvest_reviews(
    surface: &dyn Surface,
    selectors: &Selectors,
    bounds: Bounds,
) -> Result<ReviewsRecord, SurfaceError> {
    let ld = ld_json(surface, selectors).await?;
    let (average, count) = aggregate_rating(&ld);

    let stop = if bounds.cap > 0 {
        StopPolicy::Stable { min_iterations: 2 }
    } else {
        StopPolicy::Stable { min_iterations: 3 }
    };

    let options = HarvestOptions::new("reviews", stop)
        .cap(bounds.cap)
        .cutoff(bounds.cutoff)
        .settle(Duration::from_millis(500))
        .idle_timeout(bounds.idle_timeout);

    let listener: ResponseListener<ReviewRecord> =
        Box::new(|response: &NetworkResponse| pagination_signal(response, MORE_CONTENT));

    let feed = ReviewFeed::new(surface);
    let report = Harvester::new(&feed, options)
        .listen(surface.subscribe(), listener)
        .run()
        .await;

    let reviews = report
        .items
        .into_iter()
        .map(|mut review| {
            if let Some(original) = review.url.clone().filter(|u| u.contains("story_fbid")) {
                review.url = story_to_permalink(&original).ok();
                review.canonical = Some(original);
            }
            review
        })
        .collect();

    Ok(ReviewsRecord {
        average,
        count,
        reviews,
    })
}
