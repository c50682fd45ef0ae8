//! SEO audit gathered from the page, and the additive rubric that scores it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::evaluate_as;
use crate::browser::Page;
use crate::error::BrowserError;

const AUDIT: &str = r#"(() => {
  const text = el => (el && el.textContent) || '';
  const attr = (el, name) => (el && el.getAttribute(name)) || null;
  const title = document.querySelector('title');
  const desc = document.querySelector('meta[name="description"]');
  const canonical = document.querySelector('link[rel="canonical"]');
  const og = document.querySelector('meta[property="og:title"], meta[property="og:description"], meta[property="og:image"]');
  const twitter = document.querySelector('meta[name="twitter:card"]');
  const viewport = document.querySelector('meta[name="viewport"]');
  const count = sel => document.querySelectorAll(sel).length;
  const h1s = Array.from(document.querySelectorAll('h1'));
  const images = Array.from(document.querySelectorAll('img'));
  const withoutAlt = images.filter(img => !img.alt || img.alt.trim() === '').length;
  const links = Array.from(document.querySelectorAll('a[href]'));
  const internal = links.filter(a => {
    const href = a.getAttribute('href');
    return href && (href.startsWith('/') || href.includes(window.location.hostname));
  }).length;
  const withoutText = links.filter(a => !a.textContent.trim() && !a.getAttribute('aria-label')).length;
  const ldScripts = Array.from(document.querySelectorAll('script[type="application/ld+json"]'));
  const types = [];
  ldScripts.forEach(s => { try { const d = JSON.parse(s.textContent); if (d['@type']) types.push(d['@type']); } catch (e) {} });
  const viewportContent = attr(viewport, 'content');
  return {
    metaTags: {
      title: title ? text(title) : null,
      titleLength: text(title).length,
      description: attr(desc, 'content'),
      descriptionLength: (attr(desc, 'content') || '').length,
      canonical: attr(canonical, 'href'),
      hasOpenGraph: !!og,
      hasTwitterCard: !!twitter,
      favicon: !!document.querySelector('link[rel*="icon"]')
    },
    headings: {
      h1Count: h1s.length,
      h1Text: h1s.map(h => h.textContent.trim()),
      h2Count: count('h2'), h3Count: count('h3'), h4Count: count('h4'), h5Count: count('h5'), h6Count: count('h6'),
      totalHeadings: count('h1, h2, h3, h4, h5, h6'),
      hasProperH1: h1s.length === 1
    },
    images: {
      total: images.length,
      withoutAlt,
      withAlt: images.length - withoutAlt,
      modernFormats: images.filter(img => /\.(webp|avif)/i.test(img.src)).length,
      altCoverage: images.length ? Math.round((images.length - withoutAlt) / images.length * 100) : 100
    },
    links: {
      total: links.length,
      internal,
      external: links.length - internal,
      withoutText,
      hasDescriptiveText: withoutText === 0
    },
    mobile: {
      hasViewport: !!viewport,
      viewportContent,
      isMobileOptimized: !!viewportContent && viewportContent.includes('width=device-width')
    },
    schema: { hasStructuredData: ldScripts.length > 0, count: ldScripts.length, types },
    performance: {
      totalImages: images.length,
      totalLinks: links.length,
      totalScripts: count('script'),
      totalStylesheets: count('link[rel="stylesheet"]'),
      documentSize: document.documentElement.innerHTML.length,
      hasLazyLoading: images.some(img => img.loading === 'lazy')
    }
  };
})()"#;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaTags {
    pub title: Option<String>,
    pub title_length: usize,
    pub description: Option<String>,
    pub description_length: usize,
    pub canonical: Option<String>,
    pub has_open_graph: bool,
    pub has_twitter_card: bool,
    pub favicon: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Headings {
    pub h1_count: usize,
    pub h1_text: Vec<String>,
    pub h2_count: usize,
    pub h3_count: usize,
    pub h4_count: usize,
    pub h5_count: usize,
    pub h6_count: usize,
    pub total_headings: usize,
    pub has_proper_h1: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageAudit {
    pub total: usize,
    pub without_alt: usize,
    pub with_alt: usize,
    pub modern_formats: usize,
    pub alt_coverage: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LinkAudit {
    pub total: usize,
    pub internal: usize,
    pub external: usize,
    pub without_text: usize,
    pub has_descriptive_text: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MobileAudit {
    pub has_viewport: bool,
    pub viewport_content: Option<String>,
    pub is_mobile_optimized: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchemaAudit {
    pub has_structured_data: bool,
    pub count: usize,
    pub types: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceAudit {
    pub total_images: usize,
    pub total_links: usize,
    pub total_scripts: usize,
    pub total_stylesheets: usize,
    pub document_size: usize,
    pub has_lazy_loading: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeoAudit {
    pub meta_tags: MetaTags,
    pub headings: Headings,
    pub images: ImageAudit,
    pub links: LinkAudit,
    pub mobile: MobileAudit,
    pub schema: SchemaAudit,
    pub performance: PerformanceAudit,
}

pub fn audit(page: &dyn Page) -> Result<SeoAudit, BrowserError> {
    evaluate_as(page, AUDIT)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    #[serde(rename = "Needs Improvement")]
    NeedsImprovement,
    Poor,
}

impl Grade {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => Grade::Excellent,
            75..=89 => Grade::Good,
            50..=74 => Grade::NeedsImprovement,
            _ => Grade::Poor,
        }
    }
}

/// Points awarded for one rubric line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub category: &'static str,
    pub points: u32,
    pub max: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeoScore {
    pub score: u32,
    pub grade: Grade,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip)]
    pub breakdown: Vec<LineItem>,
}

#[derive(Default)]
struct Rubric {
    items: Vec<LineItem>,
    issues: Vec<String>,
    recommendations: Vec<String>,
}

impl Rubric {
    /// Record a line. Anything below `max` must carry its issue.
    fn line(&mut self, category: &'static str, points: u32, max: u32, miss: impl FnOnce() -> (String, &'static str)) {
        let points = points.min(max);
        if points < max {
            let (issue, recommendation) = miss();
            self.issues.push(issue);
            self.recommendations.push(recommendation.to_string());
        }
        self.items.push(LineItem { category, points, max });
    }
}

fn present(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}

/// Score an audit. `load_time_ms` is the measured page load time.
pub fn score(audit: &SeoAudit, load_time_ms: u64) -> SeoScore {
    let mut r = Rubric::default();
    let meta = &audit.meta_tags;

    let title_len = meta.title_length;
    let title_ok = (30..=60).contains(&title_len);
    r.line("title", if !present(&meta.title) { 0 } else if title_ok { 15 } else { 8 }, 15, || {
        if !present(&meta.title) {
            ("Missing title tag".into(), "Add a descriptive title tag (30-60 chars)")
        } else if title_len < 30 {
            ("Title tag is too short (< 30 chars)".into(), "Expand title tag to 30-60 characters")
        } else {
            ("Title tag is too long (> 60 chars)".into(), "Shorten title tag to 30-60 characters")
        }
    });

    let desc_len = meta.description_length;
    let desc_ok = (120..=155).contains(&desc_len);
    r.line(
        "description",
        if !present(&meta.description) { 0 } else if desc_ok { 15 } else { 8 },
        15,
        || {
            if !present(&meta.description) {
                ("Missing meta description".into(), "Add a meta description (120-155 chars)")
            } else if desc_len < 120 {
                ("Meta description is too short (< 120 chars)".into(), "Expand meta description to 120-155 characters")
            } else {
                ("Meta description is too long (> 155 chars)".into(), "Shorten meta description to 120-155 characters")
            }
        },
    );

    let h1 = audit.headings.h1_count;
    r.line("h1", if h1 == 1 { 10 } else { 0 }, 10, || {
        if h1 == 0 {
            ("Missing H1 heading".into(), "Add exactly one H1 heading to the page")
        } else {
            (format!("Multiple H1 headings found ({h1})"), "Use only one H1 heading per page")
        }
    });
    r.line("h2", if audit.headings.h2_count > 0 { 5 } else { 0 }, 5, || {
        ("No H2 headings found".into(), "Add H2 headings to structure your content")
    });

    let images = &audit.images;
    let alt_points = if images.total == 0 {
        15
    } else {
        ((images.with_alt as f64 / images.total as f64) * 15.0).round() as u32
    };
    r.line("images", alt_points, 15, || {
        (
            format!("{} images missing alt text", images.without_alt),
            "Add descriptive alt text to all images",
        )
    });

    let mobile = &audit.mobile;
    let viewport_points = if mobile.is_mobile_optimized {
        10
    } else if mobile.has_viewport {
        5
    } else {
        0
    };
    r.line("viewport", viewport_points, 10, || {
        if mobile.has_viewport {
            ("Viewport not properly configured for mobile".into(), "Add width=device-width to viewport meta tag")
        } else {
            ("Missing viewport meta tag".into(), "Add viewport meta tag for mobile optimization")
        }
    });

    r.line("open graph", if meta.has_open_graph { 10 } else { 0 }, 10, || {
        ("Missing Open Graph tags".into(), "Add Open Graph tags for social sharing")
    });
    r.line("canonical", if present(&meta.canonical) { 5 } else { 0 }, 5, || {
        ("Missing canonical URL".into(), "Add canonical URL to avoid duplicate content issues")
    });
    r.line("structured data", if audit.schema.has_structured_data { 10 } else { 0 }, 10, || {
        ("No structured data (schema markup) found".into(), "Add JSON-LD structured data for rich snippets")
    });

    let load_points = match load_time_ms {
        0..=2999 => 5,
        3000..=4999 => 3,
        _ => 0,
    };
    r.line("load time", load_points, 5, || {
        ("Page load time is slow".into(), "Optimize page load time to under 3 seconds")
    });

    let score = r.items.iter().map(|i| i.points).sum::<u32>().min(100);
    SeoScore {
        score,
        grade: Grade::from_score(score),
        issues: r.issues,
        recommendations: r.recommendations,
        breakdown: r.items,
    }
}
