//! URL handling module for Pagesweep
//!
//! This module provides label detection, slug extraction, mobile and output
//! normalization, and sub-page generation for entity URLs.

mod normalize;

use crate::crawler::Section;
use crate::UrlError;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

// Re-export main functions
pub use normalize::{normalize_mobile_url, normalize_output_url, story_to_permalink, QueryParams};

/// Host serving the mobile layout
pub const MOBILE_HOST: &str = "m.facebook.com";

/// Host serving the desktop layout
pub const DESKTOP_HOST: &str = "www.facebook.com";

const PLATFORM_DOMAIN: &str = "facebook.com";

/// Kind of page a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    /// Directory of entities
    Listing,
    /// An entity or one of its sections
    Page,
    /// A single post
    Post,
}

impl Label {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "LISTING",
            Self::Page => "PAGE",
            Self::Post => "POST",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "LISTING" => Some(Self::Listing),
            "PAGE" => Some(Self::Page),
            "POST" => Some(Self::Post),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_post_path(path: &str) -> bool {
    path.split("/posts/")
        .skip(1)
        .any(|rest| rest.starts_with(|c: char| c.is_ascii_digit()))
}

fn is_page_path(path: &str) -> bool {
    let path = path.strip_prefix("/pg").unwrap_or(path);
    path.trim_start_matches('/')
        .starts_with(|c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Detects the label of a platform URL
///
/// Works with the mobile, desktop and localized hosts.
///
/// # Examples
///
/// ```
/// use pagesweep::url::{url_label, Label};
///
/// assert_eq!(url_label("https://www.facebook.com/biz/prague/").unwrap(), Label::Listing);
/// assert_eq!(url_label("https://m.facebook.com/acme/posts/123").unwrap(), Label::Post);
/// assert_eq!(url_label("https://www.facebook.com/acme").unwrap(), Label::Page);
/// ```
pub fn url_label(url_str: &str) -> Result<Label, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))?;

    let on_platform = url
        .host_str()
        .map(|host| host.contains(PLATFORM_DOMAIN))
        .unwrap_or(false);

    if on_platform {
        let path = url.path();

        if path.starts_with("/biz/") {
            return Ok(Label::Listing);
        }

        if is_post_path(path) {
            return Ok(Label::Post);
        }

        if is_page_path(path) {
            return Ok(Label::Page);
        }
    }

    Err(UrlError::Unrecognized(url_str.to_string()))
}

/// Extracts the entity slug, the stable key of an entity
///
/// # Examples
///
/// ```
/// use pagesweep::url::extract_slug;
///
/// assert_eq!(extract_slug("https://m.facebook.com/pg/acme/reviews").unwrap(), "acme");
/// ```
pub fn extract_slug(url_str: &str) -> Result<String, UrlError> {
    let missing = || UrlError::MissingSlug(url_str.to_string());

    let start = url_str.find(PLATFORM_DOMAIN).ok_or_else(missing)? + PLATFORM_DOMAIN.len();
    let rest = &url_str[start..];
    let rest = match rest.strip_prefix("/pg/") {
        Some(after_pg) => after_pg,
        None => rest.strip_prefix('/').ok_or_else(missing)?,
    };

    let slug = rest.split('/').next().unwrap_or_default();
    if slug.is_empty() {
        return Err(missing());
    }

    Ok(slug.to_string())
}

/// Generates the home URL plus one URL per section from any entity URL
///
/// The base is the mobile `/pg/<slug>` URL with no query string.
pub fn generate_subpages(
    url_str: &str,
    sections: &[Section],
) -> Result<Vec<(String, Section)>, UrlError> {
    let mobile = normalize_mobile_url(url_str, QueryParams::Strip)?;
    let base = mobile.split('/').take(5).collect::<Vec<_>>().join("/");

    let mut urls = vec![(base.clone(), Section::Home)];
    urls.extend(
        sections
            .iter()
            .filter(|section| **section != Section::Home)
            .map(|section| (format!("{}/{}", base, section.as_str()), *section)),
    );

    Ok(urls)
}
