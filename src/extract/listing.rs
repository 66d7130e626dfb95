use crate::extract::{absolute_url, Selectors};
use crate::state::unique_non_empty;
use crate::surface::{Surface, SurfaceError};

/// Entity links on a listing page, deduplicated in page order
pub async fn listing_urls(
    surface: &dyn Surface,
    selectors: &Selectors,
) -> Result<Vec<String>, SurfaceError> {
    let base = surface.current_url();
    let links = surface.query(&selectors.listing_link).await?;

    Ok(unique_non_empty(links.into_iter().filter_map(|link| {
        link.attr("href").and_then(|href| absolute_url(&base, href))
    })))
}
