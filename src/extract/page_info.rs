//! Identity of an entity read from its home view
//!
//! Title, messenger link and verified badge come from page markup, the postal
//! address and rating aggregate from the embedded LD+JSON block, and the like
//! count from the meta description.

use crate::extract::{compile, Selectors};
use crate::state::IdentityPatch;
use crate::surface::{Surface, SurfaceError};
use serde_json::Value;
use tracing::debug;

/// Reads the identity fields of the loaded entity page
///
/// Every probe is optional: a missing element leaves its field empty.
pub async fn page_info(
    surface: &dyn Surface,
    selectors: &Selectors,
) -> Result<IdentityPatch, SurfaceError> {
    let title = surface
        .query(&selectors.page_name)
        .await?
        .into_iter()
        .find_map(|el| el.attr("content").map(str::to_string))
        .unwrap_or_default();

    let messenger = surface
        .query(&selectors.messenger)
        .await?
        .into_iter()
        .find_map(|el| el.attr("href").map(str::to_string));

    let mut verified = false;
    for header in surface.query(&selectors.verified_header).await? {
        if !header.select(&selectors.verified)?.is_empty() {
            verified = true;
            break;
        }
    }

    let description = surface
        .query(&selectors.meta_description)
        .await?
        .into_iter()
        .find_map(|el| el.attr("content").map(str::to_string))
        .unwrap_or_default();

    let likes = parse_likes(&description, &title)?;

    let ld = ld_json(surface, selectors).await?;
    let address = ld.first().and_then(|entry| entry.get("address"));
    let address_field = |name: &str| {
        address
            .and_then(|a| a.get(name))
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    Ok(IdentityPatch {
        title: Some(title).filter(|t| !t.is_empty()),
        verified: Some(verified),
        messenger,
        likes,
        street: address_field("streetAddress"),
        postal_code: address_field("postalCode"),
        region: address_field("addressRegion"),
        city: address_field("addressLocality"),
    })
}

/// Parses every LD+JSON block on the page, skipping malformed ones
pub async fn ld_json(
    surface: &dyn Surface,
    selectors: &Selectors,
) -> Result<Vec<Value>, SurfaceError> {
    let scripts = surface.query(&selectors.ld_json).await?;

    Ok(scripts
        .into_iter()
        .filter_map(|script| match serde_json::from_str::<Value>(&script.text) {
            Ok(value) => Some(value),
            Err(e) => {
                debug!("Skipping malformed LD+JSON: {}", e);
                None
            }
        })
        .collect())
}

/// Average rating and rating count from the first LD+JSON block
///
/// Both values may be published as numbers or as strings.
pub fn aggregate_rating(ld: &[Value]) -> (Option<f64>, Option<u64>) {
    let Some(rating) = ld.first().and_then(|entry| entry.get("aggregateRating")) else {
        return (None, None);
    };

    let number = |key: &str| match rating.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    let average = number("ratingValue");
    let count = number("ratingCount")
        .filter(|c| *c >= 0.0)
        .map(|c| c.round() as u64);

    (average, count)
}

/// Best effort like count from a meta description
///
/// The count follows the page name and is formatted per locale: `1,234`,
/// `1 200`, `1.2K` or `2M`.
pub fn parse_likes(description: &str, title: &str) -> Result<Option<u64>, SurfaceError> {
    let text = if title.is_empty() {
        description.to_string()
    } else {
        description.replacen(title, "", 1)
    };
    let text = text.trim_start_matches(|c: char| !c.is_ascii_digit());

    let pattern = compile(r"(?i)([\s,.0-9]+)\s?([mk]?)\b")?;
    let Some(captures) = pattern.captures(text) else {
        return Ok(None);
    };

    let number: String = captures[1]
        .trim()
        .replace(',', ".")
        .chars()
        .filter(|c| *c == '.' || c.is_ascii_digit())
        .collect();
    let digits_only = || -> f64 {
        number
            .chars()
            .filter(char::is_ascii_digit)
            .collect::<String>()
            .parse()
            .unwrap_or(0.0)
    };

    let suffix = captures.get(2).map(|m| m.as_str().to_ascii_lowercase());
    let likes = match suffix.as_deref() {
        Some("m") => number.parse::<f64>().unwrap_or_else(|_| digits_only()) * 1_000_000.0,
        Some("k") => number.parse::<f64>().unwrap_or_else(|_| digits_only()) * 1_000.0,
        // without a suffix separators are thousands separators
        _ => digits_only(),
    };

    Ok(Some(likes.round() as u64))
}
