//! Entity record shapes
//!
//! These are both the checkpoint format and the exported dataset format.
//! Bookkeeping fields are prefixed with `#` in their serialized names.

use crate::harvest::Dated;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current dataset schema version
pub const SCHEMA_VERSION: u32 = 1;

/// One scraped entity with all its aggregated sub-content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntityRecord {
    #[serde(rename = "#startedAt", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(rename = "#finishedAt", skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// URL the entity was first requested with
    #[serde(rename = "#url", skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,

    /// Start URL or listing that led to this entity
    #[serde(rename = "#ref", skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,

    #[serde(rename = "#version", skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,

    /// Canonical desktop URL
    pub url: Option<String>,
    pub title: Option<String>,
    pub verified: Option<bool>,
    pub messenger: Option<String>,
    pub checkins: Option<String>,
    pub likes: Option<u64>,
    pub price_range: Option<String>,
    pub categories: Vec<String>,
    pub info: Vec<String>,
    pub website: Option<String>,
    pub email: Option<String>,
    pub twitter: Option<String>,
    pub phone: Option<String>,
    pub transit: Option<String>,
    pub youtube: Option<String>,
    pub payment: Option<String>,
    pub instagram: Option<String>,
    pub impressum: Vec<String>,
    pub awards: Vec<String>,
    pub mission: Vec<String>,
    pub overview: Vec<String>,
    pub products: Vec<String>,
    pub address: Option<Address>,
    pub services: Vec<ServiceRecord>,
    pub posts: Vec<PostRecord>,
    pub reviews: ReviewsRecord,
}

impl EntityRecord {
    /// Returns true if the record may be exported
    pub fn is_export_eligible(&self) -> bool {
        self.categories.iter().any(|c| !c.trim().is_empty())
    }
}

/// Postal address plus map coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceRecord {
    pub title: Option<String>,
    pub text: Option<String>,
}

impl ServiceRecord {
    /// Stable id used to dedupe services
    pub fn key(&self) -> String {
        format!(
            "{}\u{1f}{}",
            self.title.as_deref().unwrap_or_default(),
            self.text.as_deref().unwrap_or_default()
        )
    }
}

impl Dated for ServiceRecord {
    fn date(&self) -> Option<DateTime<Utc>> {
        None
    }
}

/// Aggregate rating plus individual reviews
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewsRecord {
    pub average: Option<f64>,
    pub count: Option<u64>,
    pub reviews: Vec<ReviewRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewRecord {
    pub date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub text: Option<String>,
    pub attributes: Vec<String>,
    /// Resolved permalink
    pub url: Option<String>,
    /// Link as it appeared before resolution, only set for story links
    pub canonical: Option<String>,
}

impl ReviewRecord {
    /// Stable id used to dedupe reviews
    pub fn key(&self) -> Option<String> {
        self.canonical.clone().or_else(|| self.url.clone())
    }
}

impl Dated for ReviewRecord {
    fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }
}

/// Best observed counters of a post
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostStats {
    pub likes: u64,
    pub shares: u64,
    pub comments: u64,
}

impl PostStats {
    /// Combines two observations, keeping the largest value of each counter
    pub fn max(self, other: PostStats) -> PostStats {
        PostStats {
            likes: self.likes.max(other.likes),
            shares: self.shares.max(other.shares),
            comments: self.comments.max(other.comments),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageRecord {
    pub link: String,
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentRecord {
    pub name: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub profile_url: Option<String>,
    pub url: Option<String>,
}

impl Dated for CommentRecord {
    fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommentsRecord {
    /// Total announced by the platform, not the number harvested
    pub count: u64,
    pub mode: String,
    pub comments: Vec<CommentRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PostRecord {
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    /// Desktop permalink the post was read from
    pub url: Option<String>,
    /// `https://www.facebook.com/<slug>/posts/<id>`
    pub canonical_url: Option<String>,
    pub stats: PostStats,
    pub images: Vec<ImageRecord>,
    pub links: Vec<String>,
    pub comments: CommentsRecord,
}

impl PostRecord {
    /// Stable id used to dedupe posts
    pub fn key(&self) -> Option<String> {
        self.canonical_url.clone().or_else(|| self.url.clone())
    }
}
