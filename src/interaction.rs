//! Cookie banners and carousels.
//!
//! Both are found the same way: a [`Detector`] offers an ordered list of
//! [`Probe`]s, the first probe that tags a visible element in the page wins,
//! and the detector decides what to do with the tagged element.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifacts::ArtifactSink;
use crate::browser::{Page, ScreenshotOptions, ShotRegion};
use crate::error::BrowserError;
use crate::readiness::SCROLL_TOP;
use crate::timings::{pause, Timings};

pub const MAX_SLIDES: u32 = 6;
pub const DEFAULT_SLIDES: u32 = 3;

const TARGET_ATTR: &str = "data-pagelift-target";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Case-insensitive regex over the visible text of button-like elements.
    Text(&'static str),
    Css(&'static str),
}

const LOCATE: &str = r#"(() => {
  const tag = __TAG__;
  document.querySelectorAll('[__ATTR__="' + tag + '"]').forEach(el => el.removeAttribute('__ATTR__'));
  const visible = el => {
    const r = el.getBoundingClientRect();
    const s = getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
  };
  const kind = __KIND__;
  const query = __QUERY__;
  let candidates = [];
  if (kind === 'text') {
    const re = new RegExp(query, 'i');
    candidates = Array.from(document.querySelectorAll('button, a, [role="button"], input[type="button"], input[type="submit"]'))
      .filter(el => re.test((el.innerText || el.value || '').trim()));
  } else {
    try { candidates = Array.from(document.querySelectorAll(query)); } catch (e) { candidates = []; }
  }
  const hit = candidates.find(visible);
  if (!hit) return false;
  hit.setAttribute('__ATTR__', tag);
  return true;
})()"#;

impl Probe {
    fn kind(&self) -> &'static str {
        match self {
            Probe::Text(_) => "text",
            Probe::Css(_) => "css",
        }
    }

    fn query(&self) -> &'static str {
        match self {
            Probe::Text(q) | Probe::Css(q) => q,
        }
    }

    /// Script that tags the first visible match with `tag` and reports
    /// whether there was one.
    pub fn locate_script(&self, tag: &str) -> String {
        LOCATE
            .replace("__ATTR__", TARGET_ATTR)
            .replace("__TAG__", &js_string(tag))
            .replace("__KIND__", &js_string(self.kind()))
            .replace("__QUERY__", &js_string(self.query()))
    }
}

fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

pub(crate) fn tagged(tag: &str) -> String {
    format!("[{TARGET_ATTR}=\"{tag}\"]")
}

/// Something in the page found through an ordered list of probes.
pub trait Detector {
    type Found;

    /// Tag value the winning element is marked with.
    fn tag(&self) -> &'static str;
    fn probes(&self) -> &[Probe];
    /// Called with the selector of the tagged element. An error moves on to
    /// the next probe.
    fn on_match(&self, page: &dyn Page, probe: &Probe, target: &str) -> Result<Self::Found, BrowserError>;
}

/// Walk the detector's probes in order; absence of a match is not an error.
pub fn detect<D: Detector>(page: &dyn Page, detector: &D) -> Option<D::Found> {
    let target = tagged(detector.tag());
    for probe in detector.probes() {
        match page.evaluate(&probe.locate_script(detector.tag())) {
            Ok(Value::Bool(true)) => match detector.on_match(page, probe, &target) {
                Ok(found) => return Some(found),
                Err(e) => debug!(detector = detector.tag(), ?probe, "matched but unusable: {e}"),
            },
            Ok(_) => {}
            Err(e) => debug!(detector = detector.tag(), ?probe, "probe failed: {e}"),
        }
    }
    None
}

pub struct CookieBanner<'t> {
    timings: &'t Timings,
}

const COOKIE_PROBES: &[Probe] = &[
    Probe::Text("aceptar"),
    Probe::Text("accept"),
    Probe::Text("acepto"),
    Probe::Css(r#"button[aria-label*="close" i]"#),
    Probe::Css(r#"button[aria-label*="dismiss" i]"#),
    Probe::Css(r#"[id*="cookie" i] button"#),
    Probe::Css(r#"[class*="cookie" i] button"#),
    Probe::Css(".cookie-consent button"),
    Probe::Css("#cookie-banner button"),
];

impl<'t> CookieBanner<'t> {
    pub fn new(timings: &'t Timings) -> Self {
        Self { timings }
    }
}

impl Detector for CookieBanner<'_> {
    type Found = Probe;

    fn tag(&self) -> &'static str {
        "cookie"
    }

    fn probes(&self) -> &[Probe] {
        COOKIE_PROBES
    }

    fn on_match(&self, page: &dyn Page, probe: &Probe, target: &str) -> Result<Probe, BrowserError> {
        page.click(target, self.timings.probe)?;
        Ok(*probe)
    }
}

/// Click through the first visible consent control, if any.
pub fn dismiss_cookie_banner(page: &dyn Page, timings: &Timings) -> bool {
    match detect(page, &CookieBanner::new(timings)) {
        Some(probe) => {
            info!(?probe, "cookie consent dismissed");
            pause(timings.after_dismiss);
            true
        }
        None => {
            debug!("no cookie consent banner found");
            false
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderInfo {
    pub found: bool,
    pub has_next_control: bool,
    pub dot_count: u32,
    pub slides_to_capture: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Filled in after capture with the slides that could not be shot.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_slides: Vec<u32>,
}

/// `clamp(dot_count || 3, 1, 6)`
pub fn slides_to_capture(dot_count: u32) -> u32 {
    let wanted = if dot_count == 0 { DEFAULT_SLIDES } else { dot_count };
    wanted.clamp(1, MAX_SLIDES)
}

const CAROUSEL_PROBES: &[Probe] = &[
    Probe::Css(".w-slider"),
    Probe::Css(".slick-slider"),
    Probe::Css(".carousel"),
    Probe::Css(".swiper"),
    Probe::Css(r#"[class*="slider"]"#),
    Probe::Css(r#"[class*="carousel"]"#),
];

const NEXT_CONTROLS: &[&str] = &[
    r#"button[aria-label*="next" i]"#,
    ".slider-next",
    ".slick-next",
    ".swiper-button-next",
    ".w-slider-arrow-right",
    r#"[class*="arrow-right"]"#,
    r#"[class*="next"]"#,
];

const DOT_CONTROLS: &[&str] = &[
    ".w-slider-dot",
    ".slick-dots button",
    ".swiper-pagination-bullet",
    ".carousel-dot",
    r#"[class*="pagination"] button"#,
    r#"[class*="dot"]"#,
];

const SCAN_CONTROLS: &str = r#"(() => {
  const root = document.querySelector(__ROOT__);
  if (!root) return null;
  document.querySelectorAll('[data-pagelift-next], [data-pagelift-dot]').forEach(el => {
    el.removeAttribute('data-pagelift-next');
    el.removeAttribute('data-pagelift-dot');
  });
  let next = null;
  for (const sel of __NEXT__) {
    try { next = root.querySelector(sel); } catch (e) { next = null; }
    if (next) break;
  }
  if (next) next.setAttribute('data-pagelift-next', '');
  let dots = [];
  for (const sel of __DOTS__) {
    try { dots = Array.from(root.querySelectorAll(sel)); } catch (e) { dots = []; }
    if (dots.length) break;
  }
  dots.forEach((el, i) => el.setAttribute('data-pagelift-dot', String(i)));
  return { hasNext: !!next, dotCount: dots.length };
})()"#;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ControlScan {
    has_next: bool,
    dot_count: u32,
}

pub struct Carousel;

impl Detector for Carousel {
    type Found = SliderInfo;

    fn tag(&self) -> &'static str {
        "carousel"
    }

    fn probes(&self) -> &[Probe] {
        CAROUSEL_PROBES
    }

    fn on_match(&self, page: &dyn Page, probe: &Probe, target: &str) -> Result<SliderInfo, BrowserError> {
        let script = SCAN_CONTROLS
            .replace("__ROOT__", &js_string(target))
            .replace("__NEXT__", &serde_json::to_string(NEXT_CONTROLS)?)
            .replace("__DOTS__", &serde_json::to_string(DOT_CONTROLS)?);
        let value = page.evaluate(&script)?;
        if value.is_null() {
            return Err(BrowserError::Element {
                selector: target.to_string(),
                reason: "carousel vanished before its controls were scanned".into(),
            });
        }
        let scan: ControlScan = serde_json::from_value(value)?;
        Ok(SliderInfo {
            found: true,
            has_next_control: scan.has_next,
            dot_count: scan.dot_count,
            slides_to_capture: slides_to_capture(scan.dot_count),
            selector: Some(probe.query().to_string()),
            skipped_slides: Vec::new(),
        })
    }
}

pub fn detect_carousel(page: &dyn Page) -> SliderInfo {
    match detect(page, &Carousel) {
        Some(info) => {
            info!(
                dots = info.dot_count,
                next = info.has_next_control,
                slides = info.slides_to_capture,
                "carousel detected"
            );
            info
        }
        None => SliderInfo::default(),
    }
}

const FREEZE: &str = r#"(() => {
  if (document.getElementById('pagelift-freeze')) return true;
  const style = document.createElement('style');
  style.id = 'pagelift-freeze';
  style.textContent = '*, *::before, *::after { animation-play-state: paused !important; animation-delay: 0s !important; transition: none !important; }';
  (document.head || document.documentElement).appendChild(style);
  return true;
})()"#;

const UNFREEZE: &str = r#"(() => {
  const style = document.getElementById('pagelift-freeze');
  if (style) style.remove();
  return true;
})()"#;

pub fn freeze_animations(page: &dyn Page) {
    if let Err(e) = page.evaluate(FREEZE) {
        warn!("could not pause animations: {e}");
    }
}

pub fn resume_animations(page: &dyn Page) {
    if let Err(e) = page.evaluate(UNFREEZE) {
        warn!("could not resume animations: {e}");
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SliderShot {
    pub slide_number: u32,
    pub path: PathBuf,
    pub file_name: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SlideCapture {
    pub shots: Vec<SliderShot>,
    /// 1-based slide numbers no control could be moved to, or whose
    /// screenshot failed.
    pub skipped: Vec<u32>,
}

fn dot_selector(index: u32) -> String {
    format!("[data-pagelift-dot=\"{index}\"]")
}

const NEXT_SELECTOR: &str = "[data-pagelift-next]";

/// Bring slide `index` into view. `false` means no control moved it.
fn show_slide(page: &dyn Page, info: &SliderInfo, index: u32, timings: &Timings) -> bool {
    if index < info.dot_count {
        match page.click(&dot_selector(index), timings.probe) {
            Ok(()) => return true,
            Err(e) => warn!(slide = index + 1, "dot click failed: {e}"),
        }
    }
    if index == 0 {
        return true;
    }
    if info.has_next_control {
        match page.click(NEXT_SELECTOR, timings.probe) {
            Ok(()) => return true,
            Err(e) => warn!(slide = index + 1, "next control click failed: {e}"),
        }
    }
    false
}

/// Step through the carousel and take one viewport screenshot per slide.
/// Always returns whatever it managed to capture.
pub fn capture_slides(
    page: &dyn Page,
    info: &SliderInfo,
    sink: &dyn ArtifactSink,
    options: ScreenshotOptions,
    timings: &Timings,
) -> SlideCapture {
    let mut capture = SlideCapture::default();
    if !info.found {
        return capture;
    }
    if let Err(e) = page.evaluate(SCROLL_TOP) {
        warn!("could not scroll to carousel: {e}");
    }
    pause(timings.retop_settle);

    for index in 0..info.slides_to_capture {
        let slide_number = index + 1;
        if !show_slide(page, info, index, timings) {
            warn!(slide = slide_number, "no control reached this slide, skipping");
            capture.skipped.push(slide_number);
            continue;
        }
        pause(timings.slide_transition);
        freeze_animations(page);
        pause(timings.freeze_settle);

        let file_name = format!("slider-slide-{slide_number}.{}", options.format.extension());
        let stored = page
            .screenshot(ShotRegion::Viewport, options)
            .map_err(|e| e.to_string())
            .and_then(|bytes| sink.store(&file_name, &bytes).map_err(|e| e.to_string()));
        match stored {
            Ok(path) => {
                debug!(slide = slide_number, "slide captured");
                capture.shots.push(SliderShot {
                    slide_number,
                    path,
                    file_name,
                });
            }
            Err(e) => {
                warn!(slide = slide_number, "slide screenshot failed: {e}");
                capture.skipped.push(slide_number);
            }
        }

        resume_animations(page);
        pause(timings.after_slide);
    }
    info!(
        captured = capture.shots.len(),
        skipped = capture.skipped.len(),
        "carousel states captured"
    );
    capture
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemorySink, ScriptedPage};
    use serde_json::json;

    #[test]
    fn slide_count_is_clamped() {
        assert_eq!(slides_to_capture(0), 3);
        assert_eq!(slides_to_capture(1), 1);
        assert_eq!(slides_to_capture(2), 2);
        assert_eq!(slides_to_capture(6), 6);
        assert_eq!(slides_to_capture(20), 6);
    }

    #[test]
    fn locate_script_quotes_query() {
        let script = Probe::Css(r#"[id*="cookie" i] button"#).locate_script("cookie");
        assert!(script.contains(r#"const query = "[id*=\"cookie\" i] button";"#));
        assert!(script.contains(r#"const kind = "css";"#));
        assert!(!script.contains("__"));
    }

    #[test]
    fn cookie_dismissal_clicks_first_visible_match() {
        // The first probe whose locate script mentions "accept" matches.
        let page = ScriptedPage::new()
            .on(r#"const query = "accept""#, json!(true));
        let timings = Timings::immediate();
        assert!(dismiss_cookie_banner(&page, &timings));
        assert_eq!(page.log().clicks, vec![tagged("cookie")]);
        // "aceptar" was probed first and missed.
        assert_eq!(page.log().ran("const query = "), 2);
    }

    #[test]
    fn cookie_dismissal_moves_on_when_click_fails() {
        let page = ScriptedPage::new()
            .on_seq("const query = ", vec![json!(false), json!(true), json!(true)])
            .fail_click("cookie");
        let timings = Timings::immediate();
        assert!(!dismiss_cookie_banner(&page, &timings));
        assert_eq!(page.log().ran("const query = "), COOKIE_PROBES.len());
    }

    #[test]
    fn missing_banner_is_not_an_error() {
        let page = ScriptedPage::new();
        assert!(!dismiss_cookie_banner(&page, &Timings::immediate()));
        assert!(page.log().clicks.is_empty());
    }

    fn carousel_page(dots: u32, next: bool) -> ScriptedPage {
        ScriptedPage::new()
            .on(r#"const query = ".slick-slider""#, json!(true))
            .on("data-pagelift-dot', String(i)", json!({"hasNext": next, "dotCount": dots}))
    }

    #[test]
    fn detects_carousel_controls() {
        let info = detect_carousel(&carousel_page(4, true));
        assert_eq!(
            info,
            SliderInfo {
                found: true,
                has_next_control: true,
                dot_count: 4,
                slides_to_capture: 4,
                selector: Some(".slick-slider".into()),
                skipped_slides: vec![],
            }
        );
    }

    #[test]
    fn no_carousel_yields_not_found() {
        let info = detect_carousel(&ScriptedPage::new());
        assert!(!info.found);
        assert_eq!(info.slides_to_capture, 0);
    }

    #[test]
    fn captures_one_shot_per_dot() {
        let page = carousel_page(2, false);
        let info = detect_carousel(&page);
        let sink = MemorySink::default();
        let capture = capture_slides(&page, &info, &sink, ScreenshotOptions::default(), &Timings::immediate());

        assert_eq!(capture.shots.len(), 2);
        assert!(capture.skipped.is_empty());
        assert_eq!(sink.names(), vec!["slider-slide-1.png", "slider-slide-2.png"]);
        assert_eq!(page.log().clicks, vec![dot_selector(0), dot_selector(1)]);
        // freeze and unfreeze once per slide
        assert_eq!(page.log().ran("pagelift-freeze"), 4);
    }

    #[test]
    fn next_control_drives_slides_without_dots() {
        let page = carousel_page(0, true);
        let info = detect_carousel(&page);
        assert_eq!(info.slides_to_capture, 3);
        let sink = MemorySink::default();
        let capture = capture_slides(&page, &info, &sink, ScreenshotOptions::default(), &Timings::immediate());

        assert_eq!(capture.shots.len(), 3);
        assert_eq!(page.log().clicks, vec![NEXT_SELECTOR, NEXT_SELECTOR]);
    }

    #[test]
    fn unclickable_slides_are_skipped_not_fatal() {
        let page = carousel_page(3, false).fail_click("data-pagelift-dot");
        let info = detect_carousel(&page);
        let sink = MemorySink::default();
        let capture = capture_slides(&page, &info, &sink, ScreenshotOptions::default(), &Timings::immediate());

        // slide 1 is visible without a click; 2 and 3 cannot be reached
        assert_eq!(capture.shots.len(), 1);
        assert_eq!(capture.shots[0].slide_number, 1);
        assert_eq!(capture.skipped, vec![2, 3]);
    }

    #[test]
    fn failed_screenshots_leave_partial_results() {
        let page = carousel_page(3, false).fail_screenshots(1);
        let info = detect_carousel(&page);
        let sink = MemorySink::default();
        let capture = capture_slides(&page, &info, &sink, ScreenshotOptions::default(), &Timings::immediate());
        assert_eq!(capture.skipped, vec![1]);
        let numbers: Vec<_> = capture.shots.iter().map(|s| s.slide_number).collect();
        assert_eq!(numbers, vec![2, 3]);
    }
}
