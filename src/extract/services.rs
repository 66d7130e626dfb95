//! Services section
//!
//! Services have no count or date, so the harvest runs until the list stops
//! growing and nothing caps it.

use crate::extract::Selectors;
use crate::harvest::{Feed, GrowthSample, HarvestOptions, Harvester, StopPolicy};
use crate::state::ServiceRecord;
use crate::surface::{scroll_feed, Surface, SurfaceError};
use async_trait::async_trait;
use std::time::Duration;

/// The services view; it ends as soon as no service is rendered
pub struct ServiceFeed<'a> {
    surface: &'a dyn Surface,
    selector: &'a str,
}

impl<'a> ServiceFeed<'a> {
    pub fn new(surface: &'a dyn Surface, selectors: &'a Selectors) -> Self {
        Self {
            surface,
            selector: &selectors.services,
        }
    }
}

#[async_trait]
impl Feed for ServiceFeed<'_> {
    type Item = ServiceRecord;

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

    async fn items(&self) -> Result<Vec<(String, ServiceRecord)>, SurfaceError> {
        let mut services = Vec::new();

        for element in self.surface.query(self.selector).await? {
            let title = element
                .select("div > h3")?
                .into_iter()
                .next()
                .map(|h3| h3.text);
            let text = element
                .select("div > span")?
                .into_iter()
                .next()
                .map(|span| span.text);

            // both parts are required
            if title.is_some() && text.is_some() {
                let service = ServiceRecord { title, text };
                services.push((service.key(), service));
            }
        }

        Ok(services)
    }

    async fn end_reached(&self) -> Result<bool, SurfaceError> {
        Ok(!self.surface.exists(self.selector).await?)
    }
}

/// Harvests every service listed on the loaded services view
pub async fn harvest_services(
    surface: &dyn Surface,
    selectors: &Selectors,
    idle_timeout: Duration,
) -> Vec<ServiceRecord> {
    let options = HarvestOptions::new("services", StopPolicy::Stable { min_iterations: 2 })
        .settle(Duration::from_millis(300))
        .idle_timeout(idle_timeout);

    let feed = ServiceFeed::new(surface, selectors);
    Harvester::new(&feed, options).run().await.items
}
