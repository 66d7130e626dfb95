//! Rendering surfaces
//!
//! The harvesting code only talks to the [`Surface`] trait. [`HttpSurface`]
//! is a static implementation used by the command line tool; browser-driven
//! implementations plug in through the same trait.

pub mod dom;
mod http;
mod traits;

pub use dom::{Closest, Document, ElementData};
pub use http::{build_http_client, locale_cookie, HttpSurface, HttpSurfacePool};
pub use traits::{
    scroll_feed, NavigateOptions, NetworkResponse, PageMetrics, Surface, SurfaceError,
    SurfacePool,
};
