//! Structured data pulled from a stabilized page.
//!
//! Each stage runs one script in the page and decodes its JSON result. A
//! stage that fails is logged and replaced by its empty value so the rest of
//! the extraction still runs.

pub mod metadata;
pub mod resources;
pub mod selectors;
pub mod seo;
pub mod style;
pub mod tech;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::browser::Page;
use crate::error::BrowserError;

pub use metadata::{PageInfo, PageMetadata};
pub use resources::ResourceInventory;
pub use seo::{SeoAudit, SeoScore};
pub use style::StyleInventory;
pub use tech::TechStack;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub style: StyleInventory,
    pub resources: ResourceInventory,
    pub seo: SeoAudit,
    pub tech: TechStack,
    pub metadata: PageMetadata,
}

pub(crate) fn evaluate_as<T: DeserializeOwned>(page: &dyn Page, script: &str) -> Result<T, BrowserError> {
    let value = page.evaluate(script)?;
    Ok(serde_json::from_value(value)?)
}

/// Run `f`, falling back to `T::default()` with a warning on failure.
pub(crate) fn or_default<T: Default>(stage: &str, f: impl FnOnce() -> Result<T, BrowserError>) -> T {
    match f() {
        Ok(v) => {
            debug!(stage, "extracted");
            v
        }
        Err(e) => {
            warn!(stage, "extraction failed, using empty result: {e}");
            T::default()
        }
    }
}

/// Every stage against the primary device's page.
pub fn run(page: &dyn Page) -> ExtractionResult {
    let style = StyleInventory::extract(page);
    let resources = or_default("resources", || resources::extract(page));
    let seo = or_default("seo", || seo::audit(page));
    let tech = or_default("tech", || tech::gather_signals(page))
        .fingerprint(&style.classes);
    let metadata = or_default("metadata", || metadata::extract(page));

    ExtractionResult {
        style,
        resources,
        seo,
        tech,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPage;
    use serde_json::json;

    #[test]
    fn failed_stages_fall_back_to_empty() {
        let page = ScriptedPage::new()
            .on("getAttribute('class')", json!(["hero flex", "btn"]))
            .fail("link[rel=\"stylesheet\"]", "blocked")
            .fail("application/ld+json", "blocked");
        let result = run(&page);

        assert_eq!(
            result.style.classes.iter().collect::<Vec<_>>(),
            vec!["btn", "flex", "hero"]
        );
        assert!(result.resources.stylesheets.is_empty());
        assert_eq!(result.seo, SeoAudit::default());
        assert_eq!(result.metadata, PageMetadata::default());
        assert!(result.tech.is_empty());
    }
}
