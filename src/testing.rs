//! Scripted stand-ins for the browser and artifact store.

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use serde_json::Value;

use crate::artifacts::ArtifactSink;
use crate::browser::{Browser, Page, ScreenshotOptions, ShotRegion};
use crate::device::DeviceProfile;
use crate::error::BrowserError;

#[derive(Debug, Default)]
pub(crate) struct PageLog {
    pub navigations: Vec<String>,
    pub scripts: Vec<String>,
    pub clicks: Vec<String>,
    pub shots: Vec<ShotRegion>,
}

impl PageLog {
    pub fn ran(&self, needle: &str) -> usize {
        self.scripts.iter().filter(|s| s.contains(needle)).count()
    }
}

struct Rule {
    needle: String,
    replies: Vec<Result<Value, String>>,
    hits: usize,
}

#[derive(Default)]
struct Inner {
    rules: RefCell<Vec<Rule>>,
    log: RefCell<PageLog>,
    html: RefCell<String>,
    nav_errors: RefCell<Vec<String>>,
    click_failures: RefCell<Vec<String>>,
    shot_failures: RefCell<usize>,
}

/// A page whose script results are matched by substring. Unmatched scripts
/// evaluate to `null`. Clones share state, so a test can keep a handle after
/// handing a boxed copy to the code under test.
#[derive(Clone, Default)]
pub(crate) struct ScriptedPage {
    inner: Rc<Inner>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default().with_html("<html><body></body></html>")
    }

    pub fn on(self, needle: &str, reply: Value) -> Self {
        self.on_seq(needle, vec![reply])
    }

    /// Successive matches get successive replies; the last one repeats.
    pub fn on_seq(self, needle: &str, replies: Vec<Value>) -> Self {
        self.push_rule(needle, replies.into_iter().map(Ok).collect())
    }

    pub fn fail(self, needle: &str, msg: &str) -> Self {
        self.push_rule(needle, vec![Err(msg.to_string())])
    }

    fn push_rule(self, needle: &str, replies: Vec<Result<Value, String>>) -> Self {
        self.inner.rules.borrow_mut().push(Rule {
            needle: needle.to_string(),
            replies,
            hits: 0,
        });
        self
    }

    pub fn with_html(self, html: &str) -> Self {
        *self.inner.html.borrow_mut() = html.to_string();
        self
    }

    /// Fail the next navigation with `msg`; queue several for several failures.
    pub fn fail_navigation(self, msg: &str) -> Self {
        self.inner.nav_errors.borrow_mut().push(msg.to_string());
        self
    }

    pub fn fail_click(self, selector_part: &str) -> Self {
        self.inner
            .click_failures
            .borrow_mut()
            .push(selector_part.to_string());
        self
    }

    pub fn fail_screenshots(self, count: usize) -> Self {
        *self.inner.shot_failures.borrow_mut() = count;
        self
    }

    pub fn log(&self) -> Ref<'_, PageLog> {
        self.inner.log.borrow()
    }
}

impl Page for ScriptedPage {
    fn navigate(&self, url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.inner.log.borrow_mut().navigations.push(url.to_string());
        let mut errors = self.inner.nav_errors.borrow_mut();
        if !errors.is_empty() {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                reason: errors.remove(0),
            });
        }
        Ok(())
    }

    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        self.inner.log.borrow_mut().scripts.push(script.to_string());
        let mut rules = self.inner.rules.borrow_mut();
        match rules.iter_mut().find(|r| script.contains(&r.needle)) {
            Some(rule) => {
                let idx = rule.hits.min(rule.replies.len() - 1);
                rule.hits += 1;
                rule.replies[idx].clone().map_err(BrowserError::Script)
            }
            None => Ok(Value::Null),
        }
    }

    fn click(&self, selector: &str, _timeout: Duration) -> Result<(), BrowserError> {
        let failing = self
            .inner
            .click_failures
            .borrow()
            .iter()
            .any(|part| selector.contains(part.as_str()));
        if failing {
            return Err(BrowserError::Element {
                selector: selector.to_string(),
                reason: "not clickable".into(),
            });
        }
        self.inner.log.borrow_mut().clicks.push(selector.to_string());
        Ok(())
    }

    fn screenshot(&self, region: ShotRegion, _options: ScreenshotOptions) -> Result<Vec<u8>, BrowserError> {
        let mut failures = self.inner.shot_failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(BrowserError::Screenshot("surface lost".into()));
        }
        self.inner.log.borrow_mut().shots.push(region);
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    fn content(&self) -> Result<String, BrowserError> {
        Ok(self.inner.html.borrow().clone())
    }
}

/// Hands out a pre-scripted page per device label.
#[derive(Default)]
pub(crate) struct ScriptedBrowser {
    pages: HashMap<&'static str, ScriptedPage>,
    open_failures: HashMap<&'static str, String>,
    pub opened: RefCell<Vec<&'static str>>,
}

impl ScriptedBrowser {
    pub fn with_page(mut self, label: &'static str, page: ScriptedPage) -> Self {
        self.pages.insert(label, page);
        self
    }

    /// Opening a tab for `label` fails as tab setup would.
    pub fn fail_open(mut self, label: &'static str, msg: &str) -> Self {
        self.open_failures.insert(label, msg.to_string());
        self
    }
}

impl Browser for ScriptedBrowser {
    fn open_page(&self, device: &DeviceProfile) -> Result<Box<dyn Page>, BrowserError> {
        self.opened.borrow_mut().push(device.label);
        if let Some(msg) = self.open_failures.get(device.label) {
            return Err(BrowserError::Script(msg.clone()));
        }
        let page = self
            .pages
            .get(device.label)
            .cloned()
            .unwrap_or_else(ScriptedPage::new);
        Ok(Box::new(page))
    }
}

#[derive(Default)]
pub(crate) struct MemorySink {
    pub stored: RefCell<Vec<(String, usize)>>,
}

impl MemorySink {
    pub fn names(&self) -> Vec<String> {
        self.stored.borrow().iter().map(|(n, _)| n.clone()).collect()
    }
}

impl ArtifactSink for MemorySink {
    fn store(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        self.stored.borrow_mut().push((name.to_string(), bytes.len()));
        Ok(PathBuf::from("mem").join(name))
    }
}
