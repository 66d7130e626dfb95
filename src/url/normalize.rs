use crate::url::{DESKTOP_HOST, MOBILE_HOST};
use crate::UrlError;
use url::Url;

/// Query parameters a story permalink needs to stay resolvable
const PERMALINK_PARAMS: &[&str] = &["story_fbid", "id", "substory_index", "type"];

/// What to do with the query string when normalizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryParams<'a> {
    /// Leave every parameter in place
    Keep,
    /// Remove every parameter
    Strip,
    /// Remove everything except the listed parameters
    Allow(&'a [&'a str]),
}

fn parse(url_str: &str) -> Result<Url, UrlError> {
    Url::parse(url_str).map_err(|e| UrlError::Parse(format!("{}: {}", url_str, e)))
}

fn set_host(url: &mut Url, host: &str) -> Result<(), UrlError> {
    url.set_host(Some(host))
        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))
}

/// Keeps only the query parameters accepted by `keep`, dropping a now-empty `?`
fn retain_params<F>(url: &mut Url, keep: F)
where
    F: Fn(&str) -> bool,
{
    if url.query().is_none() {
        return;
    }

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| keep(key))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if retained.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(retained);
    }
}

/// Normalizes an entity URL to its mobile `/pg/<slug>` form
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Prefix the path with `/pg` unless it already starts with it
/// 3. Switch the host to the mobile host
/// 4. Filter the query string according to `params`
///
/// # Examples
///
/// ```
/// use pagesweep::url::{normalize_mobile_url, QueryParams};
///
/// let url = normalize_mobile_url("https://www.facebook.com/acme/?ref=bookmarks", QueryParams::Strip).unwrap();
/// assert_eq!(url, "https://m.facebook.com/pg/acme");
/// ```
pub fn normalize_mobile_url(url_str: &str, params: QueryParams<'_>) -> Result<String, UrlError> {
    let mut url = parse(url_str)?;

    if !url.path().starts_with("/pg") {
        let segments: Vec<String> = url
            .path()
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        url.set_path(&format!("/pg/{}", segments.join("/")));
    }

    if url.host_str() != Some(MOBILE_HOST) {
        set_host(&mut url, MOBILE_HOST)?;
    }

    match params {
        QueryParams::Keep => {}
        QueryParams::Strip => url.set_query(None),
        QueryParams::Allow(allowed) => retain_params(&mut url, |key| allowed.contains(&key)),
    }

    Ok(url.to_string())
}

/// Turns any entity URL into the canonical desktop form used in the dataset
///
/// HTTPS, desktop host, no query string and no `/pg/` segment.
pub fn normalize_output_url(url_str: &str) -> Result<String, UrlError> {
    let mut url = parse(url_str)?;

    url.set_scheme("https")
        .map_err(|_| UrlError::Parse(format!("{}: cannot use https", url_str)))?;
    set_host(&mut url, DESKTOP_HOST)?;
    url.set_query(None);

    let path = url.path().replacen("/pg/", "/", 1);
    url.set_path(&path);

    Ok(url.to_string())
}

/// Takes a story link and turns it into a cleaned desktop permalink
///
/// Links with both `story_fbid` and `id` (and not pointing at photos) are
/// rewritten to `/permalink.php`. Only the parameters needed to resolve the
/// story are kept.
pub fn story_to_permalink(url_str: &str) -> Result<String, UrlError> {
    let mut url = parse(url_str)?;
    set_host(&mut url, DESKTOP_HOST)?;

    if url_str.contains("story_fbid=") && url_str.contains("id=") && !url_str.contains("/photos") {
        url.set_path("/permalink.php");
    }

    retain_params(&mut url, |key| PERMALINK_PARAMS.contains(&key));

    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mobile_adds_pg_prefix() {
        let url = normalize_mobile_url("https://www.facebook.com/acme/", QueryParams::Keep).unwrap();
        assert_eq!(url, "https://m.facebook.com/pg/acme");
    }

    #[test]
    fn test_mobile_keeps_existing_pg() {
        let url =
            normalize_mobile_url("https://m.facebook.com/pg/acme/posts", QueryParams::Keep).unwrap();
        assert_eq!(url, "https://m.facebook.com/pg/acme/posts");
    }

    #[test]
    fn test_mobile_query_handling() {
        let source = "https://www.facebook.com/acme?ref=page&refsrc=x";

        assert_eq!(
            normalize_mobile_url(source, QueryParams::Keep).unwrap(),
            "https://m.facebook.com/pg/acme?ref=page&refsrc=x"
        );
        assert_eq!(
            normalize_mobile_url(source, QueryParams::Strip).unwrap(),
            "https://m.facebook.com/pg/acme"
        );
        assert_eq!(
            normalize_mobile_url(source, QueryParams::Allow(&["ref"])).unwrap(),
            "https://m.facebook.com/pg/acme?ref=page"
        );
    }

    #[test]
    fn test_output_url() {
        let url = normalize_output_url("http://m.facebook.com/pg/acme/?ref=page").unwrap();
        assert_eq!(url, "https://www.facebook.com/acme/");
    }

    #[test]
    fn test_story_to_permalink() {
        let url = story_to_permalink(
            "https://m.facebook.com/story.php?story_fbid=123&id=456&refid=18&__tn__=H-R",
        )
        .unwrap();
        assert_eq!(
            url,
            "https://www.facebook.com/permalink.php?story_fbid=123&id=456"
        );
    }

    #[test]
    fn test_photo_story_keeps_path() {
        let url =
            story_to_permalink("https://m.facebook.com/acme/photos/a.1/2/?story_fbid=1&id=2&x=y")
                .unwrap();
        assert_eq!(
            url,
            "https://www.facebook.com/acme/photos/a.1/2/?story_fbid=1&id=2"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            normalize_output_url("not a url"),
            Err(UrlError::Parse(_))
        ));
    }
}
