use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evaluate_as;
use crate::browser::Page;
use crate::error::BrowserError;

const METADATA: &str = r#"(() => {
  const content = sel => { const el = document.querySelector(sel); return (el && el.getAttribute('content')) || ''; };
  const href = sel => { const el = document.querySelector(sel); return (el && el.getAttribute('href')) || ''; };
  const openGraph = {};
  document.querySelectorAll('meta[property^="og:"]').forEach(tag => {
    openGraph[tag.getAttribute('property').replace('og:', '')] = tag.getAttribute('content') || '';
  });
  const twitter = {};
  document.querySelectorAll('meta[name^="twitter:"]').forEach(tag => {
    twitter[tag.getAttribute('name').replace('twitter:', '')] = tag.getAttribute('content') || '';
  });
  const jsonLd = [];
  document.querySelectorAll('script[type="application/ld+json"]').forEach(s => {
    try { jsonLd.push(JSON.parse(s.textContent)); } catch (e) {}
  });
  const title = document.querySelector('title');
  return {
    openGraph,
    twitter,
    jsonLd,
    basic: {
      title: title ? title.textContent : '',
      description: content('meta[name="description"]'),
      keywords: content('meta[name="keywords"]'),
      author: content('meta[name="author"]'),
      themeColor: content('meta[name="theme-color"]')
    },
    icons: {
      favicon: href('link[rel*="icon"]'),
      appleTouchIcon: href('link[rel="apple-touch-icon"]'),
      manifestUrl: href('link[rel="manifest"]')
    }
  };
})()"#;

const PAGE_INFO: &str = r#"({
  title: document.title,
  url: window.location.href,
  documentHeight: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0)
})"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BasicMeta {
    pub title: String,
    pub description: String,
    pub keywords: String,
    pub author: String,
    pub theme_color: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Icons {
    pub favicon: String,
    pub apple_touch_icon: String,
    pub manifest_url: String,
}

/// Social cards, structured data and the basic head tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    pub open_graph: BTreeMap<String, String>,
    pub twitter: BTreeMap<String, String>,
    pub json_ld: Vec<Value>,
    pub basic: BasicMeta,
    pub icons: Icons,
}

/// What the page reported about itself once it was stable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    pub title: String,
    pub url: String,
    pub document_height: u64,
}

pub fn extract(page: &dyn Page) -> Result<PageMetadata, BrowserError> {
    evaluate_as(page, METADATA)
}

pub fn page_info(page: &dyn Page) -> Result<PageInfo, BrowserError> {
    evaluate_as(page, PAGE_INFO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;
    use serde_json::json;

    #[test]
    fn decodes_social_and_structured_data() {
        let page = ScriptedPage::new().on(
            "apple-touch-icon",
            json!({
                "openGraph": {"title": "Example", "image": "https://example.com/og.png"},
                "twitter": {"card": "summary_large_image"},
                "jsonLd": [{"@type": "Organization", "name": "Example"}],
                "basic": {"title": "Example", "themeColor": "#000000"},
                "icons": {"favicon": "/favicon.ico"}
            }),
        );
        let meta = extract(&page).unwrap();
        assert_eq!(meta.open_graph["image"], "https://example.com/og.png");
        assert_eq!(meta.twitter["card"], "summary_large_image");
        assert_eq!(meta.json_ld[0]["@type"], "Organization");
        assert_eq!(meta.basic.theme_color, "#000000");
        assert_eq!(meta.icons.manifest_url, "");

        let out = serde_json::to_value(&meta).unwrap();
        assert_eq!(out["icons"]["appleTouchIcon"], json!(""));
    }

    #[test]
    fn page_info_reads_document_height() {
        let page = ScriptedPage::new().on(
            "documentHeight",
            json!({"title": "Home", "url": "https://example.com/", "documentHeight": 5400}),
        );
        let info = page_info(&page).unwrap();
        assert_eq!(info.document_height, 5400);
        assert_eq!(info.url, "https://example.com/");
    }
}
