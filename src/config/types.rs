use serde::Deserialize;

use crate::extract::Selectors;

/// Main configuration structure for Pagesweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub selectors: Selectors,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of tasks processed in parallel
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,

    /// How many times a retryable task is re-queued before being dropped
    #[serde(default = "default_max_request_retries")]
    pub max_request_retries: u32,

    /// Window after which a harvest without new items is aborted (seconds)
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Navigation timeout handed to the rendering surface (seconds)
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Interval between periodic checkpoint writes (seconds)
    #[serde(default = "default_persist_interval_secs")]
    pub persist_interval_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_request_retries: default_max_request_retries(),
            idle_timeout_secs: default_idle_timeout_secs(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            persist_interval_secs: default_persist_interval_secs(),
        }
    }
}

/// User agent strings for the two device profiles
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UserAgentConfig {
    /// User agent sent when the mobile variant is requested
    #[serde(default = "default_mobile_agent")]
    pub mobile: String,

    /// User agent sent for desktop views (listings, post details)
    #[serde(default = "default_desktop_agent")]
    pub desktop: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            mobile: default_mobile_agent(),
            desktop: default_desktop_agent(),
        }
    }
}

/// What to harvest and how much of it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct InputConfig {
    /// Entity page or listing URLs to start from
    pub start_urls: Vec<String>,

    /// Sections visited in addition to the home view
    #[serde(default = "default_sections")]
    pub sections: Vec<String>,

    /// Maximum number of posts per entity
    #[serde(default = "default_max_posts")]
    pub max_posts: usize,

    /// Oldest post date to keep
    pub max_post_date: Option<String>,

    /// Maximum number of comments per post
    #[serde(default = "default_max_post_comments")]
    pub max_post_comments: usize,

    /// Oldest comment date to keep
    pub max_comment_date: Option<String>,

    /// Maximum number of reviews per entity
    #[serde(default = "default_max_reviews")]
    pub max_reviews: usize,

    /// Oldest review date to keep
    pub max_review_date: Option<String>,

    /// Comment ordering requested on post pages
    #[serde(default = "default_comments_mode")]
    pub comments_mode: String,

    /// Locale set on the surface before navigating
    #[serde(default = "default_language")]
    pub language: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint file
    pub checkpoint_path: String,

    /// Path to the JSON lines dataset
    pub dataset_path: String,
}

fn default_max_concurrency() -> u32 {
    4
}

fn default_max_request_retries() -> u32 {
    5
}

fn default_idle_timeout_secs() -> u64 {
    30
}

fn default_navigation_timeout_secs() -> u64 {
    60
}

fn default_persist_interval_secs() -> u64 {
    60
}

fn default_mobile_agent() -> String {
    "Mozilla/5.0 (Linux; Android 9; Pixel 3) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/80.0.3987.99 Mobile Safari/537.36".to_string()
}

fn default_desktop_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/80.0.3987.106 Safari/537.36".to_string()
}

fn default_sections() -> Vec<String> {
    ["posts", "about", "reviews", "services"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_posts() -> usize {
    3
}

fn default_max_post_comments() -> usize {
    15
}

fn default_max_reviews() -> usize {
    3
}

fn default_comments_mode() -> String {
    "RANKED_THREADED".to_string()
}

fn default_language() -> String {
    "en-US".to_string()
}
