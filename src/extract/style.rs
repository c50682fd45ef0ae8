use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{evaluate_as, or_default};
use crate::browser::Page;
use crate::error::BrowserError;

/// Representative elements whose resolved styles are recorded.
pub const STYLE_SELECTORS: &[&str] = &[
    "body",
    "main",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "p",
    "a",
    "button",
    "[role=\"button\"]",
    ".btn",
    ".button",
    "nav",
    "header",
    "footer",
];

const CLASS_ATTRIBUTES: &str =
    "Array.from(document.querySelectorAll('[class]')).map(el => el.getAttribute('class') || '')";

const ROOT_VARIABLES: &str = r#"(() => {
  const vars = {};
  const collect = style => {
    for (let i = 0; i < style.length; i++) {
      const prop = style[i];
      if (prop.startsWith('--')) vars[prop] = style.getPropertyValue(prop).trim();
    }
  };
  collect(getComputedStyle(document.documentElement));
  Array.from(document.styleSheets).forEach(sheet => {
    let rules = [];
    try { rules = Array.from(sheet.cssRules || []); } catch (e) { return; }
    rules.forEach(rule => {
      if (rule.selectorText === ':root' && rule.style) {
        for (let i = 0; i < rule.style.length; i++) {
          const prop = rule.style[i];
          if (prop.startsWith('--') && !(prop in vars)) vars[prop] = rule.style.getPropertyValue(prop).trim();
        }
      }
    });
  });
  return vars;
})()"#;

const COMPUTED: &str = r#"(() => {
  const out = {};
  for (const sel of __SELECTORS__) {
    const el = document.querySelector(sel);
    if (!el) continue;
    const s = getComputedStyle(el);
    out[sel] = {
      color: s.color, backgroundColor: s.backgroundColor, borderColor: s.borderColor,
      fontFamily: s.fontFamily, fontSize: s.fontSize, fontWeight: s.fontWeight,
      lineHeight: s.lineHeight, letterSpacing: s.letterSpacing,
      padding: s.padding, margin: s.margin, border: s.border, borderRadius: s.borderRadius,
      boxShadow: s.boxShadow, display: s.display, gap: s.gap, maxWidth: s.maxWidth
    };
  }
  return out;
})()"#;

/// Resolved style properties of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StyleSnapshot {
    pub color: String,
    pub background_color: String,
    pub border_color: String,
    pub font_family: String,
    pub font_size: String,
    pub font_weight: String,
    pub line_height: String,
    pub letter_spacing: String,
    pub padding: String,
    pub margin: String,
    pub border: String,
    pub border_radius: String,
    pub box_shadow: String,
    pub display: String,
    pub gap: String,
    pub max_width: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleInventory {
    pub classes: BTreeSet<String>,
    pub css_variables: BTreeMap<String, String>,
    pub computed_styles: BTreeMap<String, StyleSnapshot>,
}

/// Split raw `class` attribute values into a sorted, deduplicated set.
pub fn collect_classes<S: AsRef<str>>(raw: &[S]) -> BTreeSet<String> {
    raw.iter()
        .flat_map(|attr| attr.as_ref().split_whitespace())
        .map(str::to_string)
        .collect()
}

pub fn extract_classes(page: &dyn Page) -> Result<BTreeSet<String>, BrowserError> {
    let raw: Vec<String> = evaluate_as(page, CLASS_ATTRIBUTES)?;
    Ok(collect_classes(&raw))
}

impl StyleInventory {
    pub fn extract(page: &dyn Page) -> Self {
        let computed = COMPUTED.replace(
            "__SELECTORS__",
            &serde_json::to_string(STYLE_SELECTORS).unwrap_or_else(|_| "[]".into()),
        );
        Self {
            classes: or_default("classes", || extract_classes(page)),
            css_variables: or_default("css variables", || evaluate_as(page, ROOT_VARIABLES)),
            computed_styles: or_default("computed styles", || evaluate_as(page, &computed)),
        }
    }

    /// Fold another device's classes in.
    pub fn merge_classes(&mut self, other: BTreeSet<String>) {
        self.classes.extend(other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;
    use serde_json::json;

    #[test]
    fn classes_are_sorted_and_deduplicated() {
        let classes = collect_classes(&["  nav  nav--open ", "btn nav", "", "btn\tbtn-primary\n"]);
        assert_eq!(
            classes.into_iter().collect::<Vec<_>>(),
            vec!["btn", "btn-primary", "nav", "nav--open"]
        );
    }

    #[test]
    fn repeated_extraction_is_stable() {
        let page = ScriptedPage::new().on(
            "getAttribute('class')",
            json!(["w-nav hero", "hero cta", "footer w-nav"]),
        );
        let first = extract_classes(&page).unwrap();
        let second = extract_classes(&page).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn extracts_variables_and_computed_styles() {
        let page = ScriptedPage::new()
            .on("getAttribute('class')", json!(["a b"]))
            .on("startsWith('--')", json!({"--brand": "#ff0066", "--gap": "8px"}))
            .on(
                "boxShadow: s.boxShadow",
                json!({"body": {"color": "rgb(0, 0, 0)", "fontSize": "16px"}, "h1": {"fontWeight": "700"}}),
            );
        let inv = StyleInventory::extract(&page);

        assert_eq!(inv.css_variables["--brand"], "#ff0066");
        assert_eq!(inv.computed_styles["body"].font_size, "16px");
        assert_eq!(inv.computed_styles["h1"].font_weight, "700");
        assert_eq!(inv.computed_styles["h1"].color, "");
    }

    #[test]
    fn merge_keeps_set_semantics() {
        let mut inv = StyleInventory {
            classes: collect_classes(&["hero nav"]),
            ..Default::default()
        };
        inv.merge_classes(collect_classes(&["nav mobile-menu"]));
        assert_eq!(
            inv.classes.into_iter().collect::<Vec<_>>(),
            vec!["hero", "mobile-menu", "nav"]
        );
    }

    #[test]
    fn computed_script_lists_every_selector() {
        let script = COMPUTED.replace("__SELECTORS__", &serde_json::to_string(STYLE_SELECTORS).unwrap());
        assert!(script.contains(r#""[role=\"button\"]""#));
        assert!(script.contains(r#""footer""#));
    }
}
