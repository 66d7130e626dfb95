//! Static DOM snapshots
//!
//! Extractors receive plain [`ElementData`] values and re-parse their markup
//! with `scraper` whenever they need to look inside. `scraper::Html` is not
//! `Send`, so it is always parsed and dropped within one synchronous call.

use crate::surface::SurfaceError;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;

/// Class whose subtree is hidden until a "see more" toggle is used
const HIDDEN_CLASS: &str = "text_exposed_hide";

/// A detached copy of one element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,

    /// Visible text, whitespace collapsed
    pub text: String,

    /// Outer HTML
    pub html: String,

    pub attrs: HashMap<String, String>,
}

impl ElementData {
    /// Copies an element out of a parsed document
    pub fn from_element(element: ElementRef<'_>) -> Self {
        Self {
            tag: element.value().name().to_string(),
            text: visible_text(element),
            html: element.html(),
            attrs: element
                .value()
                .attrs()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Returns an attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    /// Runs `selector` inside this element's markup
    pub fn select(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
        let selector = parse_selector(selector)?;
        let fragment = Html::parse_fragment(&self.html);

        Ok(fragment
            .select(&selector)
            .map(ElementData::from_element)
            .collect())
    }

    /// Visible text of every match of `selector` inside this element
    pub fn select_texts(&self, selector: &str) -> Result<Vec<String>, SurfaceError> {
        Ok(self
            .select(selector)?
            .into_iter()
            .map(|el| el.text)
            .filter(|text| !text.is_empty())
            .collect())
    }

    /// Visible text of the first direct `div` child
    pub fn first_child_div_text(&self) -> Option<String> {
        let fragment = Html::parse_fragment(&self.html);
        let root = fragment_root(&fragment)?;

        root.children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "div")
            .map(visible_text)
            .filter(|text| !text.is_empty())
    }
}

/// An element matched by a query together with its closest matching ancestor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Closest {
    pub element: ElementData,
    pub ancestor: Option<ElementData>,
}

/// A rendered page held as markup
#[derive(Debug, Clone, Default)]
pub struct Document {
    url: String,
    html: String,
}

impl Document {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    /// All elements matching `selector`, in document order
    pub fn query(&self, selector: &str) -> Result<Vec<ElementData>, SurfaceError> {
        let selector = parse_selector(selector)?;
        let document = Html::parse_document(&self.html);

        Ok(document
            .select(&selector)
            .map(ElementData::from_element)
            .collect())
    }

    /// For every match of `selector`, also returns its closest ancestor matching `ancestor`
    pub fn query_closest(
        &self,
        selector: &str,
        ancestor: &str,
    ) -> Result<Vec<Closest>, SurfaceError> {
        let selector = parse_selector(selector)?;
        let ancestor = parse_selector(ancestor)?;
        let document = Html::parse_document(&self.html);

        Ok(document
            .select(&selector)
            .map(|element| Closest {
                element: ElementData::from_element(element),
                ancestor: element
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|parent| ancestor.matches(parent))
                    .map(ElementData::from_element),
            })
            .collect())
    }
}

/// Parses a CSS selector, mapping failures to [`SurfaceError::Selector`]
pub fn parse_selector(selector: &str) -> Result<Selector, SurfaceError> {
    Selector::parse(selector).map_err(|e| SurfaceError::Selector(format!("{}: {:?}", selector, e)))
}

/// Text a reader would see: hidden toggles, scripts and styles are skipped
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_visible_text(element, &mut out);
    collapse_whitespace(&out)
}

fn push_visible_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
            }
            Node::Element(el) => {
                if matches!(el.name(), "script" | "style")
                    || el.classes().any(|class| class == HIDDEN_CLASS)
                {
                    continue;
                }

                if el.name() == "br" {
                    out.push('\n');
                    continue;
                }

                if let Some(child) = ElementRef::wrap(child) {
                    push_visible_text(child, out);
                }
            }
            _ => {}
        }
    }
}

/// Collapses runs of spaces on each line and drops empty lines
fn collapse_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn fragment_root(fragment: &Html) -> Option<ElementRef<'_>> {
    fragment
        .root_element()
        .children()
        .filter_map(ElementRef::wrap)
        .next()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <div id="field-1">
            <img src="https://static.xx.fbcdn.net/rsrc.php/v3/Knsy-moHXi6.png">
            <div>Restaurant · Bar <span class="text_exposed_hide">...</span></div>
          </div>
          <article data-ft='{"top_level_post_id":"42"}'>
            <a href="/story.php?story_fbid=42&amp;id=7"><abbr>Yesterday</abbr></a>
          </article>
        </body></html>
    "#;

    #[test]
    fn test_query_returns_attrs_and_text() {
        let doc = Document::new("https://m.facebook.com/pg/acme", PAGE);
        let articles = doc.query("article").unwrap();

        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].tag, "article");
        assert_eq!(
            articles[0].attr("data-ft"),
            Some(r#"{"top_level_post_id":"42"}"#)
        );
        assert_eq!(articles[0].text, "Yesterday");
    }

    #[test]
    fn test_query_closest() {
        let doc = Document::new("https://m.facebook.com/pg/acme", PAGE);
        let found = doc.query_closest("abbr", "a[href]").unwrap();

        assert_eq!(found.len(), 1);
        let link = found[0].ancestor.as_ref().unwrap();
        assert_eq!(link.attr("href"), Some("/story.php?story_fbid=42&id=7"));

        let missing = doc.query_closest("abbr", "table").unwrap();
        assert!(missing[0].ancestor.is_none());
    }

    #[test]
    fn test_first_child_div_skips_hidden_text() {
        let doc = Document::new("https://m.facebook.com/pg/acme", PAGE);
        let found = doc
            .query_closest(r#"img[src*="Knsy-moHXi6.png"]"#, "div[id]")
            .unwrap();

        let container = found[0].ancestor.as_ref().unwrap();
        assert_eq!(
            container.first_child_div_text(),
            Some("Restaurant · Bar".to_string())
        );
    }

    #[test]
    fn test_invalid_selector() {
        let doc = Document::new("https://m.facebook.com/pg/acme", PAGE);
        assert!(matches!(
            doc.query("div[[["),
            Err(SurfaceError::Selector(_))
        ));
    }

    #[test]
    fn test_br_becomes_newline() {
        let doc = Document::new("", "<div><p>line one<br>line   two</p></div>");
        let p = doc.query("p").unwrap();
        assert_eq!(p[0].text, "line one\nline two");
    }
}
