use serde::Deserialize;

/// CSS selectors and icon names the extractors look for
///
/// Every value can be overridden from the `[selectors]` table of the
/// configuration file, so a layout change on the platform does not need a
/// new build.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Selectors {
    /// Present on every existing entity page
    pub valid_page: String,
    pub page_name: String,
    pub meta_description: String,
    pub ld_json: String,
    pub verified_header: String,
    pub verified: String,
    pub messenger: String,

    pub mobile_captcha: String,
    pub desktop_captcha: String,
    /// Both must be present once the mobile variant has rendered
    pub mobile_meta: String,
    pub mobile_body_class: String,

    pub see_more: String,
    pub page_transparency: String,
    /// Icons still rendered as inline placeholders
    pub blank_icons: String,
    pub static_map: String,

    pub services: String,
    pub listing_link: String,

    pub post_container: String,
    /// Post types (`psn` of the post insights) that are never harvested
    pub post_types_skip: Vec<String>,

    pub load_comments: String,
    pub comments_container: String,
    pub comment_order: String,
    pub load_more_comments: String,

    pub icons: IconNames,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            valid_page: r#"meta[property="og:url"]"#.to_string(),
            page_name: r#"meta[property="og:title"]"#.to_string(),
            meta_description: r#"meta[name="description"]"#.to_string(),
            ld_json: r#"script[type="application/ld+json"]"#.to_string(),
            verified_header:
                "#msite-pages-header-contents > div:not([class]):not([id]) > div:not([class]):not([id])"
                    .to_string(),
            verified: r#"[aria-label*="Verified"]"#.to_string(),
            messenger: r#"a[href^="https://m.me"]"#.to_string(),
            mobile_captcha: r#"form[action*="captcha"]"#.to_string(),
            desktop_captcha: "#captcha".to_string(),
            mobile_meta: r#"meta[name="viewport"]"#.to_string(),
            mobile_body_class: "body.touch".to_string(),
            see_more: ".see_more_link".to_string(),
            page_transparency: "#page_transparency".to_string(),
            blank_icons: r#"#pages_msite_body_contents img[src^="data"]"#.to_string(),
            static_map: r#"[style*="static_map.php"]"#.to_string(),
            services: r#"#pages_msite_body_contents div[data-sigil*="service"]"#.to_string(),
            listing_link: r#"div > a[href][onmousedown*="click_page_link"]"#.to_string(),
            post_container: ".userContentWrapper".to_string(),
            post_types_skip: Vec::new(),
            load_comments: r#"[data-testid="UFI2CommentsCount/root"]"#.to_string(),
            comments_container: r#"[data-testid="UFI2CommentsList/root_depth_0"]"#.to_string(),
            comment_order: r#"[data-testid="UFI2ViewOptionsSelector/link"]"#.to_string(),
            load_more_comments: r#"[data-testid="UFI2CommentsPagerRenderer/pager_depth_0"]"#
                .to_string(),
            icons: IconNames::default(),
        }
    }
}

/// Names of the icon images that label each profile field
///
/// A field is found by looking for `img[src*="<name>.png"]` and reading the
/// text next to it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct IconNames {
    pub checkins: Vec<String>,
    pub website: Vec<String>,
    pub categories: Vec<String>,
    pub email: Vec<String>,
    pub info: Vec<String>,
    pub impressum: Vec<String>,
    pub instagram: Vec<String>,
    pub twitter: Vec<String>,
    pub youtube: Vec<String>,
    pub overview: Vec<String>,
    pub awards: Vec<String>,
    pub mission: Vec<String>,
    pub address: Vec<String>,
    pub phone: Vec<String>,
    pub price_range: Vec<String>,
    pub products: Vec<String>,
    pub transit: Vec<String>,
    pub payment: Vec<String>,
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl Default for IconNames {
    fn default() -> Self {
        Self {
            checkins: names(&["a0b87sO1_bq"]),
            website: names(&["TcXGKbk-rV1", "xVA3lB-GVep", "EaDvTjOwxIV", "aE7VLFYMYdl"]),
            categories: names(&["Knsy-moHXi6", "LwDWwC1d0Rx", "3OfQvJdYD_W"]),
            email: names(&["C1eWXyukMez", "vKDzW_MdhyP"]),
            info: names(&["u_owK2Sz5n6", "fTt3W6Nw8z-"]),
            impressum: names(&["7Pg05R2u_QQ"]),
            instagram: names(&["EZj5-1P4vhh"]),
            twitter: names(&["IP-E0-f5J0m"]),
            youtube: names(&["MyCpzAb80U1"]),
            overview: names(&["uAsvCr33XaU"]),
            awards: names(&["rzXNHRgEfui"]),
            mission: names(&["z-wfU5xgk6Z"]),
            address: names(&["h2e1qHNjIzG"]),
            phone: names(&["6oGknb-0EsE", "znYEAkatLCe"]),
            price_range: names(&["q-WY9vrfkFZ"]),
            products: names(&["bBMZ-3vnEih"]),
            transit: names(&["uQHLMTQ0fUS"]),
            payment: names(&["Dx9c291MaDt"]),
        }
    }
}

/// Builds the selector matching any of the given icon images
pub fn icon_selector(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!(r#"img[src*="{}.png"]"#, name))
        .collect::<Vec<_>>()
        .join(",")
}
