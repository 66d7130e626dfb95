//! Sanity checks run on every loaded page before extraction
//!
//! A mobile task must land on the interactive mobile layout; any other
//! variant renders different icons and markup. Captchas and missing
//! entities are detected here too, so phases can assume a usable page.

use crate::crawler::task::Task;
use crate::extract::Selectors;
use crate::surface::Surface;
use crate::url::Label;
use crate::{TaskError, TaskResult};
use std::time::Duration;

/// How long the mobile layout may take to switch to its interactive variant
const MOBILE_LAYOUT_TIMEOUT: Duration = Duration::from_secs(3);

/// Verifies the loaded page can be extracted
///
/// # Errors
///
/// * [`TaskError::Captcha`] if a challenge is shown
/// * [`TaskError::LayoutMismatch`] if a mobile task got another layout
/// * [`TaskError::NotFound`] if the entity does not exist (listings excluded)
pub async fn check_page(surface: &dyn Surface, selectors: &Selectors, task: &Task) -> TaskResult<()> {
    let url = task.url.clone();

    if task.use_mobile {
        if surface.exists(&selectors.mobile_captcha).await? {
            return Err(TaskError::Captcha {
                url,
                variant: "mobile",
            });
        }

        let (meta, body) = tokio::join!(
            surface.wait_for(&selectors.mobile_meta, MOBILE_LAYOUT_TIMEOUT),
            surface.wait_for(&selectors.mobile_body_class, MOBILE_LAYOUT_TIMEOUT),
        );

        if !matches!((meta, body), (Ok(true), Ok(true))) {
            return Err(TaskError::LayoutMismatch { url });
        }
    } else if surface.exists(&selectors.desktop_captcha).await? {
        return Err(TaskError::Captcha {
            url,
            variant: "desktop",
        });
    }

    if task.label != Label::Listing && !surface.exists(&selectors.valid_page).await? {
        return Err(TaskError::NotFound { url });
    }

    Ok(())
}
