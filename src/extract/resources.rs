use serde::{Deserialize, Serialize};

use super::evaluate_as;
use crate::browser::Page;
use crate::error::BrowserError;

const RESOURCES: &str = r#"(() => {
  const stylesheets = Array.from(document.querySelectorAll('link[rel="stylesheet"]'))
    .map(link => ({ url: link.href, media: link.media || 'all' }));
  const scripts = Array.from(document.querySelectorAll('script[src]'))
    .map(s => ({ url: s.src, type: s.type || 'text/javascript', async: s.async, defer: s.defer }));
  const images = Array.from(document.querySelectorAll('img[src]'))
    .map(img => ({
      url: img.currentSrc || img.src,
      alt: img.alt || null,
      loading: img.loading || 'eager',
      width: img.naturalWidth,
      height: img.naturalHeight
    }));
  const fonts = [];
  Array.from(document.styleSheets).forEach(sheet => {
    let rules;
    try { rules = Array.from(sheet.cssRules || []); } catch (e) { return; }
    rules.forEach(rule => {
      if (rule instanceof CSSFontFaceRule) {
        const fontFamily = (rule.style.fontFamily || '').replace(/['"]/g, '');
        const src = rule.style.getPropertyValue('src');
        if (fontFamily && src) fonts.push({ fontFamily, src });
      }
    });
  });
  return { stylesheets, scripts, images, fonts };
})()"#;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stylesheet {
    pub url: String,
    pub media: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptRef {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "async")]
    pub is_async: bool,
    pub defer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub url: String,
    pub alt: Option<String>,
    pub loading: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontFace {
    pub font_family: String,
    pub src: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceInventory {
    pub stylesheets: Vec<Stylesheet>,
    pub scripts: Vec<ScriptRef>,
    pub images: Vec<ImageRef>,
    pub fonts: Vec<FontFace>,
}

impl ResourceInventory {
    pub fn total(&self) -> usize {
        self.stylesheets.len() + self.scripts.len() + self.images.len() + self.fonts.len()
    }
}

/// Cross-origin stylesheets whose rules cannot be read are skipped in the
/// page, so their font faces are simply absent.
pub fn extract(page: &dyn Page) -> Result<ResourceInventory, BrowserError> {
    evaluate_as(page, RESOURCES)
}
