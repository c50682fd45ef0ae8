//! Technology fingerprinting.
//!
//! The page only reports raw signals. Matching against the catalog happens
//! here so it is deterministic and testable without a browser.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::evaluate_as;
use crate::browser::Page;
use crate::error::BrowserError;

/// Distinct utility-class tokens needed before utility CSS is reported.
pub const UTILITY_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Framework,
    Library,
    CssFramework,
    BuildTool,
}

#[derive(Debug, Clone, Copy)]
pub enum Rule {
    /// `window[name]` is defined.
    Global(&'static str),
    /// A selector matches at least one element.
    Marker(&'static str),
    /// Some element carries an attribute starting with this prefix.
    AttrPrefix(&'static str),
    /// Some class token starts with this prefix.
    ClassPrefix(&'static str),
    Script(&'static str),
    Stylesheet(&'static str),
    Generator(&'static str),
    Host(&'static str),
    UtilityClasses,
}

pub struct Signature {
    pub name: &'static str,
    pub bucket: Bucket,
    pub rules: &'static [Rule],
}

use Bucket::*;
use Rule::*;

pub const CATALOG: &[Signature] = &[
    Signature {
        name: "React",
        bucket: Framework,
        rules: &[Global("React"), Marker("[data-reactroot], [data-reactid]"), Script("react")],
    },
    Signature {
        name: "Vue",
        bucket: Framework,
        rules: &[Global("Vue"), AttrPrefix("data-v-"), Script("vue")],
    },
    Signature {
        name: "Angular",
        bucket: Framework,
        rules: &[Global("angular"), Global("ng"), Marker("[ng-app], [ng-version]")],
    },
    Signature {
        name: "Next.js",
        bucket: Framework,
        rules: &[Marker("#__next"), Script("/_next/")],
    },
    Signature {
        name: "Nuxt",
        bucket: Framework,
        rules: &[Global("__NUXT__"), Marker("#__nuxt"), Script("/_nuxt/")],
    },
    Signature {
        name: "Svelte",
        bucket: Framework,
        rules: &[Script("svelte"), ClassPrefix("svelte-")],
    },
    Signature {
        name: "GSAP",
        bucket: Library,
        rules: &[Global("gsap"), Script("gsap")],
    },
    Signature {
        name: "Three.js",
        bucket: Library,
        rules: &[Global("THREE"), Marker("canvas[data-engine*=\"three\"]")],
    },
    Signature {
        name: "Lenis",
        bucket: Library,
        rules: &[Global("Lenis"), Script("lenis"), ClassPrefix("lenis")],
    },
    Signature {
        name: "jQuery",
        bucket: Library,
        rules: &[Global("jQuery"), Script("jquery")],
    },
    Signature {
        name: "Tailwind CSS",
        bucket: CssFramework,
        rules: &[UtilityClasses, Script("tailwind"), Stylesheet("tailwind")],
    },
    Signature {
        name: "Bootstrap",
        bucket: CssFramework,
        rules: &[Stylesheet("bootstrap"), Script("bootstrap")],
    },
    Signature {
        name: "Webflow",
        bucket: BuildTool,
        rules: &[Generator("webflow"), Script("webflow"), Marker("html[data-wf-page]")],
    },
    Signature {
        name: "Framer",
        bucket: BuildTool,
        rules: &[Generator("framer"), Marker("[data-framer-name]"), Host("framer.app")],
    },
    Signature {
        name: "WordPress",
        bucket: BuildTool,
        rules: &[Generator("wordpress"), Script("/wp-content/"), Stylesheet("/wp-content/")],
    },
];

const SIGNALS: &str = r#"(() => {
  const globals = __GLOBALS__.filter(name => typeof window[name] !== 'undefined');
  const markers = __MARKERS__.filter(sel => {
    try { return !!document.querySelector(sel); } catch (e) { return false; }
  });
  const prefixes = __PREFIXES__;
  const attrPrefixes = prefixes.filter(prefix =>
    Array.from(document.querySelectorAll('*')).some(el =>
      Array.from(el.attributes).some(attr => attr.name.startsWith(prefix))));
  const generator = document.querySelector('meta[name="generator"]');
  return {
    globals,
    markers,
    attrPrefixes,
    scripts: Array.from(document.querySelectorAll('script[src]')).map(s => s.src),
    stylesheets: Array.from(document.querySelectorAll('link[href]')).map(l => l.href),
    generator: generator ? generator.getAttribute('content') : null,
    host: window.location.hostname
  };
})()"#;

/// Raw observations the catalog is matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TechSignals {
    pub globals: Vec<String>,
    pub markers: Vec<String>,
    pub attr_prefixes: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    pub generator: Option<String>,
    pub host: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TechStack {
    pub frameworks: Vec<String>,
    pub libraries: Vec<String>,
    pub css_frameworks: Vec<String>,
    pub build_tools: Vec<String>,
}

impl TechStack {
    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<String> {
        match bucket {
            Framework => &mut self.frameworks,
            Library => &mut self.libraries,
            CssFramework => &mut self.css_frameworks,
            BuildTool => &mut self.build_tools,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
            && self.libraries.is_empty()
            && self.css_frameworks.is_empty()
            && self.build_tools.is_empty()
    }
}

fn utility_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(?:[a-z0-9]+:)*-?(?:(?:p|px|py|pt|pb|pl|pr|m|mx|my|mt|mb|ml|mr|gap|w|h|space-x|space-y)-(?:\d+(?:\.\d+)?|px|auto|full)|grid-cols-\d+|flex-(?:row|col|wrap|1)|items-(?:start|center|end|stretch)|justify-(?:start|center|end|between|around)|text-(?:xs|sm|base|lg|\d?xl)|(?:bg|text)-[a-z]+-\d{2,3}|rounded(?:-[a-z0-9]+)?)$",
        )
        .expect("utility class pattern is valid")
    })
}

/// Count of distinct class tokens that look like spacing/layout utilities.
pub fn utility_class_count(classes: &BTreeSet<String>) -> usize {
    let pattern = utility_pattern();
    classes.iter().filter(|c| pattern.is_match(c)).count()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(&needle.to_ascii_lowercase())
}

impl TechSignals {
    fn matches(&self, rule: &Rule, classes: &BTreeSet<String>) -> bool {
        match *rule {
            Global(name) => self.globals.iter().any(|g| g == name),
            Marker(sel) => self.markers.iter().any(|m| m == sel),
            AttrPrefix(prefix) => self.attr_prefixes.iter().any(|p| p == prefix),
            ClassPrefix(prefix) => classes.iter().any(|c| c.starts_with(prefix)),
            Script(part) => self.scripts.iter().any(|s| contains_ci(s, part)),
            Stylesheet(part) => self.stylesheets.iter().any(|s| contains_ci(s, part)),
            Generator(part) => self.generator.as_deref().is_some_and(|g| contains_ci(g, part)),
            Host(part) => contains_ci(&self.host, part),
            UtilityClasses => utility_class_count(classes) >= UTILITY_THRESHOLD,
        }
    }

    /// Match every catalog entry; each name is reported at most once.
    pub fn fingerprint(&self, classes: &BTreeSet<String>) -> TechStack {
        let mut stack = TechStack::default();
        for sig in CATALOG {
            if sig.rules.iter().any(|rule| self.matches(rule, classes)) {
                stack.bucket_mut(sig.bucket).push(sig.name.to_string());
            }
        }
        stack
    }
}

fn signal_script() -> Result<String, BrowserError> {
    let mut globals = Vec::new();
    let mut markers = Vec::new();
    let mut prefixes = Vec::new();
    for rule in CATALOG.iter().flat_map(|sig| sig.rules) {
        match *rule {
            Global(g) => globals.push(g),
            Marker(m) => markers.push(m),
            AttrPrefix(p) => prefixes.push(p),
            _ => {}
        }
    }
    Ok(SIGNALS
        .replace("__GLOBALS__", &serde_json::to_string(&globals)?)
        .replace("__MARKERS__", &serde_json::to_string(&markers)?)
        .replace("__PREFIXES__", &serde_json::to_string(&prefixes)?))
}

pub fn gather_signals(page: &dyn Page) -> Result<TechSignals, BrowserError> {
    evaluate_as(page, &signal_script()?)
}
