//! Tasks and the sections of an entity

use crate::url::{extract_slug, generate_subpages, url_label, Label};
use crate::UrlResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Independently loading view of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Home,
    Posts,
    About,
    Reviews,
    Services,
}

impl Section {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Posts => "posts",
            Self::About => "about",
            Self::Reviews => "reviews",
            Self::Services => "services",
        }
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "home" => Ok(Self::Home),
            "posts" => Ok(Self::Posts),
            "about" => Ok(Self::About),
            "reviews" => Ok(Self::Reviews),
            "services" => Ok(Self::Services),
            other => Err(format!(
                "Unknown section '{}', expected posts, about, reviews or services",
                other
            )),
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work for a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub url: String,
    pub label: Label,
    pub section: Option<Section>,
    /// Key of the entity the result merges into
    pub entity: Option<String>,
    /// Stable URL of a post, used to find its statistics
    pub canonical: Option<String>,
    pub use_mobile: bool,
    /// Start URL or listing the task was discovered from
    pub referrer: Option<String>,
    #[serde(default)]
    pub retries: u32,
}

impl Task {
    /// A listing, rendered in the desktop layout
    pub fn listing(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: Label::Listing,
            section: None,
            entity: None,
            canonical: None,
            use_mobile: false,
            referrer: None,
            retries: 0,
        }
    }

    /// A section of an entity, rendered in the mobile layout
    pub fn page(
        url: impl Into<String>,
        section: Section,
        entity: impl Into<String>,
        referrer: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            label: Label::Page,
            section: Some(section),
            entity: Some(entity.into()),
            canonical: None,
            use_mobile: true,
            referrer: Some(referrer.into()),
            retries: 0,
        }
    }

    /// A post detail; only the desktop layout shows its content
    pub fn post(
        url: impl Into<String>,
        canonical: impl Into<String>,
        entity: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            label: Label::Post,
            section: None,
            entity: Some(entity.into()),
            canonical: Some(canonical.into()),
            use_mobile: false,
            referrer: None,
            retries: 0,
        }
    }

    /// Dedupe key: label, section and URL
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.label,
            self.section.map(|s| s.as_str()).unwrap_or("-"),
            self.url
        )
    }

    /// Key of the entity this task belongs to
    pub fn entity_key(&self) -> UrlResult<String> {
        match &self.entity {
            Some(entity) => Ok(entity.clone()),
            None => extract_slug(&self.url),
        }
    }

    pub fn is_home(&self) -> bool {
        self.label == Label::Page && self.section == Some(Section::Home)
    }
}

/// Expands an entity URL into its home task plus one task per section
///
/// # Arguments
///
/// * `url` - Any URL of the entity
/// * `sections` - Sections visited in addition to home
/// * `referrer` - Where the entity was found
pub fn expand_entity(url: &str, sections: &[Section], referrer: &str) -> UrlResult<Vec<Task>> {
    let entity = extract_slug(url)?;

    Ok(generate_subpages(url, sections)?
        .into_iter()
        .map(|(subpage, section)| Task::page(subpage, section, entity.clone(), referrer))
        .collect())
}

/// Initial tasks for the configured start URLs
///
/// Returns the tasks plus the start URLs that were skipped: single posts and
/// URLs that are not entity pages or listings.
pub fn seed_tasks(start_urls: &[String], sections: &[Section]) -> (Vec<Task>, Vec<String>) {
    let mut tasks = Vec::new();
    let mut skipped = Vec::new();

    for url in start_urls {
        match url_label(url) {
            Ok(Label::Page) => match expand_entity(url, sections, url) {
                Ok(expanded) => tasks.extend(expanded),
                Err(e) => {
                    warn!(url = %url, "Skipping start URL: {}", e);
                    skipped.push(url.clone());
                }
            },
            Ok(Label::Listing) => tasks.push(Task::listing(url.as_str())),
            Ok(Label::Post) => {
                warn!(url = %url, "Single posts are not supported as start URLs");
                skipped.push(url.clone());
            }
            Err(e) => {
                warn!(url = %url, "Skipping start URL: {}", e);
                skipped.push(url.clone());
            }
        }
    }

    (tasks, skipped)
}
