//! Extraction of entity data from rendered pages
//!
//! This module provides:
//! - Configurable selectors for every probe
//! - Identity and labeled-field extraction for profile views
//! - Feeds for posts, reviews, services and comments, driven by the harvester
//! - Post detail extraction (statistics, content, images, links)
//! - Entity links found on listings

mod comments;
mod fields;
mod listing;
mod page_info;
mod post;
mod posts;
mod reviews;
mod selectors;
mod services;

#[cfg(test)]
pub(crate) mod testing;

pub use comments::{harvest_comments, parse_comment_page, CommentFeed, CommentPage};
pub use fields::{extract_fields, parse_lat_lng, probe_fields, reduce_fields, Field, FieldProbes};
pub use listing::listing_urls;
pub use page_info::{aggregate_rating, ld_json, page_info, parse_likes};
pub use post::{post_content, post_stats, stats_from_scripts, PostContent};
pub use posts::{harvest_post_links, parse_post_link, PostFeed, PostLink, PostTarget};
pub use reviews::{harvest_reviews, parse_review, ReviewFeed};
pub use selectors::{icon_selector, IconNames, Selectors};
pub use services::{harvest_services, ServiceFeed};

use crate::harvest::{Cutoff, ResponseSignal};
use crate::surface::{NetworkResponse, SurfaceError};
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Ordering requested for the comments of a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommentsMode {
    /// Most relevant first, replies threaded
    #[default]
    RankedThreaded,
    /// Newest first
    RecentActivity,
    /// All comments, most relevant first
    RankedUnfiltered,
}

impl CommentsMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RankedThreaded => "RANKED_THREADED",
            Self::RecentActivity => "RECENT_ACTIVITY",
            Self::RankedUnfiltered => "RANKED_UNFILTERED",
        }
    }

    /// Ranked orderings are shown on load, the others need a menu change first
    pub fn is_ranked(&self) -> bool {
        matches!(self, Self::RankedThreaded | Self::RankedUnfiltered)
    }
}

impl FromStr for CommentsMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RANKED_THREADED" => Ok(Self::RankedThreaded),
            "RECENT_ACTIVITY" => Ok(Self::RecentActivity),
            "RANKED_UNFILTERED" => Ok(Self::RankedUnfiltered),
            other => Err(format!(
                "Invalid comments mode '{}', expected RANKED_THREADED, RECENT_ACTIVITY or RANKED_UNFILTERED",
                other
            )),
        }
    }
}

impl fmt::Display for CommentsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits for one harvested section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    /// Maximum number of items, zero for no cap
    pub cap: usize,
    pub cutoff: Cutoff,
    pub idle_timeout: Duration,
}

/// Resolves `href` against the page it was found on
///
/// Returns `None` for empty links and links that cannot be resolved.
pub fn absolute_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(base)
            .ok()?
            .join(href)
            .ok()
            .map(|url| url.to_string()),
    }
}

/// Compiles a pattern, reporting failures as evaluation errors
pub(crate) fn compile(pattern: &str) -> Result<Regex, SurfaceError> {
    Regex::new(pattern).map_err(|e| SurfaceError::Evaluation(format!("{}: {}", pattern, e)))
}

/// Signals growth of a paginated feed, or its end once a request fails
pub(crate) fn pagination_signal<T>(response: &NetworkResponse, marker: &str) -> ResponseSignal<T> {
    if !response.is_ok() {
        ResponseSignal::Finish
    } else if response.url.contains(marker) {
        ResponseSignal::Progress
    } else {
        ResponseSignal::Ignore
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_mode_parse() {
        assert_eq!(
            "RECENT_ACTIVITY".parse::<CommentsMode>(),
            Ok(CommentsMode::RecentActivity)
        );
        assert!("recent".parse::<CommentsMode>().is_err());
        assert!(CommentsMode::RankedUnfiltered.is_ranked());
        assert!(!CommentsMode::RecentActivity.is_ranked());
        assert_eq!(CommentsMode::default().to_string(), "RANKED_THREADED");
    }

    #[test]
    fn test_absolute_url() {
        let base = "https://m.facebook.com/pg/acme/posts";

        assert_eq!(
            absolute_url(base, "/story.php?story_fbid=1&id=2").as_deref(),
            Some("https://m.facebook.com/story.php?story_fbid=1&id=2")
        );
        assert_eq!(
            absolute_url(base, "https://www.facebook.com/acme/").as_deref(),
            Some("https://www.facebook.com/acme/")
        );
        assert_eq!(absolute_url(base, "  "), None);
        assert_eq!(absolute_url("", "/relative"), None);
    }

    #[test]
    fn test_pagination_signal() {
        let response = |url: &str, status: u16| NetworkResponse {
            url: url.to_string(),
            status,
            body: String::new(),
        };

        assert!(matches!(
            pagination_signal::<()>(&response("https://m.facebook.com/page_content_list_view/more/?x", 200), "page_content_list_view/more"),
            ResponseSignal::Progress
        ));
        assert!(matches!(
            pagination_signal::<()>(&response("https://m.facebook.com/ajax/bz", 500), "page_content_list_view/more"),
            ResponseSignal::Finish
        ));
        assert!(matches!(
            pagination_signal::<()>(&response("https://m.facebook.com/ajax/bz", 200), "page_content_list_view/more"),
            ResponseSignal::Ignore
        ));
    }
}
