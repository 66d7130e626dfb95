//! Labeled profile fields
//!
//! Profile views show each field next to a small icon. One probe per field
//! looks for its icons and reads the text beside them; probes run in
//! parallel and an absent field simply yields nothing.
//!
//! Before probing, the page is prepared: placeholder icons must resolve,
//! the page is scrolled until the about box is in view, and the first
//! "see more" toggle is opened.

use crate::extract::selectors::{icon_selector, IconNames};
use crate::extract::{compile, Selectors};
use crate::harvest::{Feed, GrowthSample, HarvestOptions, Harvester, StopPolicy};
use crate::state::{unique_non_empty, FieldsPatch};
use crate::surface::{scroll_feed, Surface, SurfaceError};
use crate::{TaskError, TaskResult};
use async_trait::async_trait;
use futures::future::join_all;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

const BLANK_ICONS_TIMEOUT: Duration = Duration::from_secs(15);
const BLANK_ICONS_POLL: Duration = Duration::from_millis(300);
const SEE_MORE_TIMEOUT: Duration = Duration::from_secs(10);
const SEE_MORE_SETTLE: Duration = Duration::from_secs(2);

/// Response that follows a successful "see more" click
const SEE_MORE_RESPONSE: &str = "ajax/bootloader-endpoint";

/// A profile field labeled by an icon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Checkins,
    Website,
    Categories,
    Email,
    Info,
    Impressum,
    Instagram,
    Twitter,
    Youtube,
    Overview,
    Awards,
    Mission,
    Address,
    Phone,
    PriceRange,
    Products,
    Transit,
    Payment,
}

impl Field {
    pub const ALL: [Field; 18] = [
        Field::Checkins,
        Field::Website,
        Field::Categories,
        Field::Email,
        Field::Info,
        Field::Impressum,
        Field::Instagram,
        Field::Twitter,
        Field::Youtube,
        Field::Overview,
        Field::Awards,
        Field::Mission,
        Field::Address,
        Field::Phone,
        Field::PriceRange,
        Field::Products,
        Field::Transit,
        Field::Payment,
    ];

    /// Icon names that label this field
    pub fn icons<'a>(&self, names: &'a IconNames) -> &'a [String] {
        match self {
            Self::Checkins => &names.checkins,
            Self::Website => &names.website,
            Self::Categories => &names.categories,
            Self::Email => &names.email,
            Self::Info => &names.info,
            Self::Impressum => &names.impressum,
            Self::Instagram => &names.instagram,
            Self::Twitter => &names.twitter,
            Self::Youtube => &names.youtube,
            Self::Overview => &names.overview,
            Self::Awards => &names.awards,
            Self::Mission => &names.mission,
            Self::Address => &names.address,
            Self::Phone => &names.phone,
            Self::PriceRange => &names.price_range,
            Self::Products => &names.products,
            Self::Transit => &names.transit,
            Self::Payment => &names.payment,
        }
    }
}

/// Texts found by each probe, in [`Field::ALL`] order
pub type FieldProbes = Vec<(Field, Vec<String>)>;

/// Reads the texts next to the icons of one field
async fn probe(surface: &dyn Surface, field: Field, icons: &IconNames) -> Vec<String> {
    let names = field.icons(icons);
    if names.is_empty() {
        return Vec::new();
    }

    match surface.query_closest(&icon_selector(names), "div[id]").await {
        Ok(found) => found
            .into_iter()
            .filter_map(|closest| closest.ancestor)
            .filter_map(|container| container.first_child_div_text())
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect(),
        Err(e) => {
            debug!(field = ?field, "Field probe failed: {}", e);
            Vec::new()
        }
    }
}

/// Runs every field probe in parallel
pub async fn probe_fields(surface: &dyn Surface, icons: &IconNames) -> FieldProbes {
    let results = join_all(Field::ALL.iter().map(|field| probe(surface, *field, icons))).await;
    Field::ALL.into_iter().zip(results).collect()
}

fn first_unique(values: &[String]) -> Option<String> {
    unique_non_empty(values.iter().cloned()).into_iter().next()
}

/// Turns the raw probe texts into field values
pub fn reduce_fields(probes: &[(Field, Vec<String>)]) -> FieldsPatch {
    let mut fields = FieldsPatch::default();

    for (field, values) in probes {
        // multi-part fields are kept as one entry
        let joined = || unique_non_empty(std::iter::once(values.join("\n")));

        match field {
            Field::Categories => {
                fields.categories = unique_non_empty(
                    values
                        .iter()
                        .flat_map(|v| v.split(" · "))
                        .map(str::to_string),
                );
            }
            Field::PriceRange => {
                fields.price_range = values
                    .iter()
                    .filter_map(|v| v.splitn(2, " · ").nth(1))
                    .map(|v| v.trim().to_string())
                    .find(|v| !v.is_empty());
            }
            Field::Info => fields.info = unique_non_empty(values.iter().cloned()),
            Field::Website => fields.website = first_unique(values),
            Field::Email => fields.email = first_unique(values),
            Field::Phone => fields.phone = first_unique(values),
            Field::Transit => fields.transit = first_unique(values),
            Field::Instagram => fields.instagram = first_unique(values),
            Field::Twitter => fields.twitter = first_unique(values),
            Field::Payment => fields.payment = first_unique(values),
            Field::Youtube => fields.youtube = first_unique(values),
            Field::Checkins => fields.checkins = first_unique(values),
            Field::Impressum => fields.impressum = joined(),
            Field::Awards => fields.awards = joined(),
            Field::Mission => fields.mission = joined(),
            Field::Overview => fields.overview = joined(),
            Field::Products => fields.products = joined(),
            // the postal address comes from LD+JSON, coordinates from the map
            Field::Address => {}
        }
    }

    fields
}

/// Parses the coordinates out of a static map style
///
/// Zero and unparsable coordinates are treated as absent.
pub fn parse_lat_lng(style: &str) -> Result<(Option<f64>, Option<f64>), SurfaceError> {
    let pattern = compile(r"marker_list%5B0%5D=([^%]+)%2C([^&]+)&")?;

    let Some(captures) = pattern.captures(style) else {
        return Ok((None, None));
    };

    let coordinate = |index: usize| {
        captures
            .get(index)
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| *v != 0.0 && v.is_finite())
    };

    Ok((coordinate(1), coordinate(2)))
}

async fn map_coordinates(
    surface: &dyn Surface,
    selectors: &Selectors,
) -> Result<(Option<f64>, Option<f64>), SurfaceError> {
    let maps = surface.query(&selectors.static_map).await?;

    match maps.first().and_then(|map| map.attr("style")) {
        Some(style) => parse_lat_lng(style),
        None => Ok((None, None)),
    }
}

/// Waits until no placeholder icon is left
async fn wait_for_icons(surface: &dyn Surface, selectors: &Selectors) -> TaskResult<()> {
    let deadline = tokio::time::Instant::now() + BLANK_ICONS_TIMEOUT;

    while surface.exists(&selectors.blank_icons).await? {
        if tokio::time::Instant::now() >= deadline {
            return Err(TaskError::RenderIncomplete {
                url: surface.current_url(),
            });
        }

        tokio::time::sleep(BLANK_ICONS_POLL).await;
    }

    Ok(())
}

/// Scrolls until the about box (or whatever follows it) is in view
struct PreparationFeed<'a> {
    surface: &'a dyn Surface,
    markers: [&'a str; 3],
}

#[async_trait]
impl Feed for PreparationFeed<'_> {
    type Item = ();

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

    async fn items(&self) -> Result<Vec<(String, ())>, SurfaceError> {
        Ok(Vec::new())
    }

    async fn end_reached(&self) -> Result<bool, SurfaceError> {
        for marker in self.markers {
            if self.surface.in_viewport(marker).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Opens the first "see more" toggle, returning true if the page reacted
async fn click_see_more(surface: &dyn Surface, selectors: &Selectors) -> bool {
    let url = surface.current_url();
    let mut responses = surface.subscribe();

    match surface.click(&selectors.see_more).await {
        Ok(0) => {
            debug!(url = %url, "No see more found");
            return false;
        }
        Ok(_) => info!(url = %url, "Clicking see more"),
        Err(e) => {
            debug!(url = %url, "See more error: {}", e);
            return false;
        }
    }

    let reacted = tokio::time::timeout(SEE_MORE_TIMEOUT, async {
        loop {
            match responses.recv().await {
                Ok(response) if response.url.contains(SEE_MORE_RESPONSE) => return true,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return false,
            }
        }
    })
    .await
    .unwrap_or(false);

    if reacted {
        tokio::time::sleep(SEE_MORE_SETTLE).await;
    } else {
        debug!(url = %url, "See more did not load anything");
    }

    reacted
}

/// Prepares the profile view and extracts every labeled field
///
/// # Errors
///
/// * [`TaskError::RenderIncomplete`] if placeholder icons never resolve
/// * [`TaskError::Surface`] if the surface stops answering queries
pub async fn extract_fields(
    surface: &dyn Surface,
    selectors: &Selectors,
    idle_timeout: Duration,
) -> TaskResult<FieldsPatch> {
    wait_for_icons(surface, selectors).await?;

    let feed = PreparationFeed {
        surface,
        markers: [
            selectors.see_more.as_str(),
            selectors.page_transparency.as_str(),
            "article",
        ],
    };
    let options = HarvestOptions::new("preparation", StopPolicy::Iterations(5))
        .idle_timeout(idle_timeout);
    Harvester::new(&feed, options).run().await;

    click_see_more(surface, selectors).await;

    let probes = probe_fields(surface, &selectors.icons).await;
    let mut fields = reduce_fields(&probes);

    let (lat, lng) = map_coordinates(surface, selectors).await.unwrap_or_else(|e| {
        debug!("Map coordinates unavailable: {}", e);
        (None, None)
    });
    fields.lat = lat;
    fields.lng = lng;

    Ok(fields)
}
