use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use super::evaluate_as;
use crate::browser::Page;

const SELECTOR_DATA: &str = r#"(() => {
  const wanted = __SELECTORS__;
  const values = {};
  const failed = {};
  const read = el => {
    if (el.tagName === 'META') return el.getAttribute('content');
    if (el.tagName === 'A') return { text: el.textContent.trim(), href: el.href };
    return el.textContent.trim();
  };
  for (const [key, selector] of Object.entries(wanted)) {
    try {
      const found = Array.from(document.querySelectorAll(selector));
      if (found.length === 0) values[key] = null;
      else if (found.length === 1) values[key] = read(found[0]);
      else values[key] = found.map(read);
    } catch (e) {
      values[key] = null;
      failed[key] = String((e && e.message) || e);
    }
  }
  return { values, failed };
})()"#;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SelectorReport {
    values: BTreeMap<String, Value>,
    failed: BTreeMap<String, String>,
}

/// Read each named selector. A selector with no match, or one the page
/// rejects, maps to `null` without affecting the others.
pub fn extract(page: &dyn Page, selectors: &BTreeMap<String, String>) -> BTreeMap<String, Value> {
    let mut data: BTreeMap<String, Value> = selectors.keys().map(|k| (k.clone(), Value::Null)).collect();
    if selectors.is_empty() {
        return data;
    }

    let script = match serde_json::to_string(selectors) {
        Ok(json) => SELECTOR_DATA.replace("__SELECTORS__", &json),
        Err(e) => {
            warn!("could not encode selectors: {e}");
            return data;
        }
    };
    let report: SelectorReport = match evaluate_as(page, &script) {
        Ok(report) => report,
        Err(e) => {
            warn!("selector extraction failed, every field is null: {e}");
            return data;
        }
    };

    for (key, reason) in &report.failed {
        let selector = selectors.get(key).map(String::as_str).unwrap_or_default();
        warn!(field = %key, selector, "selector rejected: {reason}");
    }
    for (key, value) in report.values {
        if let Some(slot) = data.get_mut(&key) {
            *slot = value;
        }
    }
    data
}
