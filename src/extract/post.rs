//! Post detail: statistics and content
//!
//! Statistics are scattered over inline script payloads, often repeated and
//! sometimes partial, so every counter is the largest value seen. Content is
//! read from the post container of the desktop permalink.

use crate::extract::{absolute_url, compile, Selectors};
use crate::harvest::convert_date;
use crate::state::{unique_non_empty, ImageRecord, PostStats};
use crate::surface::{Surface, SurfaceError};
use crate::{TaskError, TaskResult};
use chrono::{DateTime, Utc};
use regex::Regex;
use url::Url;

/// Redirect wrapper around outbound links
const REDIRECT_LINK: &str = r#"[href*="l.facebook.com/l.php?u="]"#;

fn max_of(pattern: &Regex, text: &str) -> u64 {
    pattern
        .captures_iter(text)
        .filter_map(|captures| captures.get(1)?.as_str().parse::<u64>().ok())
        .fold(0, u64::max)
}

/// Folds every counter found in `scripts` into its maximum
///
/// Each script is read on its own, then the partial observations are
/// combined counter by counter.
pub fn stats_from_scripts<S: AsRef<str>>(scripts: &[S]) -> Result<PostStats, SurfaceError> {
    let comments = compile(r"comment_count:\{total_count:(\d+)")?;
    let reactions = compile(r"reaction_count:\{count:(\d+)")?;
    let shares = compile(r"share_count:\{count:(\d+)")?;

    Ok(scripts
        .iter()
        .map(|script| {
            let script = script.as_ref();
            PostStats {
                likes: max_of(&reactions, script),
                shares: max_of(&shares, script),
                comments: max_of(&comments, script),
            }
        })
        .fold(PostStats::default(), PostStats::max))
}

/// Reads the statistics of the post at `canonical`
///
/// Only scripts mentioning the post's own URL are considered, so counters of
/// related posts on the same page are ignored.
pub async fn post_stats(surface: &dyn Surface, canonical: &str) -> Result<PostStats, SurfaceError> {
    let mention = compile(&format!("(?i){}", regex::escape(&format!("url:\"{}", canonical))))?;

    let scripts: Vec<String> = surface
        .query("script")
        .await?
        .into_iter()
        .map(|script| script.html)
        .filter(|html| mention.is_match(html))
        .collect();

    stats_from_scripts(scripts.as_slice())
}

/// Content of a post read from its own page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostContent {
    pub date: Option<DateTime<Utc>>,
    pub text: String,
    pub images: Vec<ImageRecord>,
    /// Outbound links with the redirect wrapper removed
    pub links: Vec<String>,
    /// URL the content was read from
    pub url: String,
}

fn unwrap_redirect(href: &str) -> Option<String> {
    Url::parse(href)
        .ok()?
        .query_pairs()
        .find(|(key, _)| key == "u")
        .map(|(_, value)| value.into_owned())
        .filter(|target| !target.is_empty())
}

/// Reads the text, images and outbound links of the loaded post
///
/// # Errors
///
/// [`TaskError::SectionMissing`] when the post container or its text block
/// is not on the page.
pub async fn post_content(surface: &dyn Surface, selectors: &Selectors) -> TaskResult<PostContent> {
    let url = surface.current_url();
    let missing = |reason: &str| TaskError::SectionMissing {
        url: url.clone(),
        section: "post",
        reason: reason.to_string(),
    };

    let container = surface
        .query(&selectors.post_container)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| missing("missing post container"))?;

    let text = container
        .select(".userContent")?
        .into_iter()
        .next()
        .map(|content| content.text.trim().to_string())
        .ok_or_else(|| missing("missing .userContent"))?;

    let date = container
        .select("[data-utime]")?
        .into_iter()
        .find_map(|el| el.attr("data-utime").and_then(convert_date));

    let images = surface
        .query_closest(
            &format!(r#"{} img[src*="scontent"]"#, selectors.post_container),
            r#"a[rel="theater"]"#,
        )
        .await?
        .into_iter()
        .filter_map(|found| {
            let image = found.element.attr("src").filter(|src| !src.is_empty())?;
            let link = found.ancestor?.attr("href").and_then(|href| absolute_url(&url, href))?;
            Some(ImageRecord {
                link,
                image: image.to_string(),
            })
        })
        .collect();

    let links = unique_non_empty(
        container
            .select(REDIRECT_LINK)?
            .into_iter()
            .filter_map(|link| {
                link.attr("href")
                    .and_then(|href| absolute_url(&url, href))
                    .and_then(|href| unwrap_redirect(&href))
            }),
    );

    Ok(PostContent {
        date,
        text,
        images,
        links,
        url,
    })
}
