//! Brings a freshly navigated tab to a best-effort stable state.
//!
//! Only navigation can fail the caller. Every later stage that misses its
//! bound is recorded as a [`Degradation`] and the controller moves on.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::browser::Page;
use crate::error::BrowserError;
use crate::poll::{Poll, PollOutcome};
use crate::timings::{pause, Timings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ReadinessState {
    Navigating,
    DomSettled,
    FontsReady,
    Scrolled,
    LazyContentForced,
    NetworkSettled,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Degradation {
    pub stage: ReadinessState,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub reached: ReadinessState,
    pub degraded: Vec<Degradation>,
}

impl ReadinessReport {
    pub fn fully_stable(&self) -> bool {
        self.reached == ReadinessState::Stable && self.degraded.is_empty()
    }
}

const FONTS_READY: &str = r#"(async () => {
  if (!(document.fonts && document.fonts.ready)) return 'unsupported';
  const timeout = new Promise(resolve => setTimeout(() => resolve('timeout'), __TIMEOUT__));
  return await Promise.race([document.fonts.ready.then(() => 'ready'), timeout]);
})()"#;

const SCROLL_TICK: &str = r#"(() => {
  window.scrollBy(0, __STEP__);
  const height = Math.max(document.body ? document.body.scrollHeight : 0, document.documentElement.scrollHeight);
  return window.scrollY + window.innerHeight >= height;
})()"#;

pub(crate) const SCROLL_TOP: &str = "(() => { window.scrollTo(0, 0); return true; })()";

const FORCE_LAZY: &str = r#"(async () => {
  const lazy = Array.from(document.querySelectorAll('img[loading="lazy"], img[data-src], img[data-lazy], [data-srcset]'));
  lazy.forEach(el => {
    if (el.dataset.src) el.src = el.dataset.src;
    else if (el.dataset.lazy) el.src = el.dataset.lazy;
    if (el.dataset.srcset) el.srcset = el.dataset.srcset;
    if (el.loading === 'lazy') el.loading = 'eager';
  });
  const pending = Array.from(document.images).filter(img => !img.complete);
  let timedOut = 0;
  await Promise.all(pending.map(img => new Promise(resolve => {
    const timer = setTimeout(() => { timedOut++; resolve(); }, __TIMEOUT__);
    const done = () => { clearTimeout(timer); resolve(); };
    img.addEventListener('load', done, { once: true });
    img.addEventListener('error', done, { once: true });
  })));
  return { forced: lazy.length, pending: pending.length, timedOut };
})()"#;

const RESOURCE_COUNT: &str = "performance.getEntriesByType('resource').length";

pub struct ReadinessController<'a> {
    page: &'a dyn Page,
    timings: &'a Timings,
    state: ReadinessState,
    degraded: Vec<Degradation>,
}

impl<'a> ReadinessController<'a> {
    pub fn new(page: &'a dyn Page, timings: &'a Timings) -> Self {
        Self {
            page,
            timings,
            state: ReadinessState::Navigating,
            degraded: Vec::new(),
        }
    }

    pub fn state(&self) -> ReadinessState {
        self.state
    }

    fn advance(&mut self, next: ReadinessState) {
        if next <= self.state {
            warn!(from = ?self.state, to = ?next, "ignoring backwards readiness transition");
            return;
        }
        debug!(stage = ?next, "readiness advanced");
        self.state = next;
    }

    fn degrade(&mut self, stage: ReadinessState, reason: String) {
        warn!(stage = ?stage, "{reason}, continuing");
        self.degraded.push(Degradation { stage, reason });
    }

    /// The only stage allowed to fail the attempt.
    pub fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page.navigate(url, self.timings.navigation)?;
        self.advance(ReadinessState::DomSettled);
        Ok(())
    }

    /// Run every post-navigation stage in order, then hold for `settle`.
    pub fn settle(mut self, settle: Duration) -> ReadinessReport {
        if let Err(reason) = self.await_fonts() {
            self.degrade(ReadinessState::FontsReady, reason);
        }
        self.advance(ReadinessState::FontsReady);

        if let Err(reason) = self.scroll_through() {
            self.degrade(ReadinessState::Scrolled, reason);
        }
        self.advance(ReadinessState::Scrolled);

        if let Err(reason) = self.force_lazy_content() {
            self.degrade(ReadinessState::LazyContentForced, reason);
        }
        self.advance(ReadinessState::LazyContentForced);

        if let Err(reason) = self.await_network_idle() {
            self.degrade(ReadinessState::NetworkSettled, reason);
        }
        self.advance(ReadinessState::NetworkSettled);

        pause(settle);
        self.advance(ReadinessState::Stable);

        ReadinessReport {
            reached: self.state,
            degraded: self.degraded,
        }
    }

    fn await_fonts(&self) -> Result<(), String> {
        let script = FONTS_READY.replace("__TIMEOUT__", &self.timings.fonts.as_millis().to_string());
        match self.page.evaluate(&script) {
            Ok(Value::String(s)) if s == "timeout" => Err(format!(
                "fonts not ready after {}ms",
                self.timings.fonts.as_millis()
            )),
            Ok(other) => {
                debug!(result = %other, "font readiness");
                Ok(())
            }
            Err(e) => Err(format!("font readiness check failed: {e}")),
        }
    }

    fn scroll_through(&self) -> Result<(), String> {
        let tick = SCROLL_TICK.replace("__STEP__", &self.timings.scroll_step_px.to_string());
        let poll = Poll::within(self.timings.scroll_interval, self.timings.scroll_cap);
        let outcome = poll.run(|_| {
            self.page
                .evaluate(&tick)
                .map(|v| v.as_bool().unwrap_or(true))
        });
        let back_to_top = self.page.evaluate(SCROLL_TOP);

        match (outcome, back_to_top) {
            (Err(e), _) | (_, Err(e)) => Err(format!("scrolling failed: {e}")),
            (Ok(PollOutcome::Exhausted { ticks }), _) => {
                Err(format!("bottom not reached after {ticks} scroll steps"))
            }
            (Ok(PollOutcome::Done { ticks }), _) => {
                debug!(ticks, "scrolled to bottom");
                Ok(())
            }
        }
    }

    fn force_lazy_content(&self) -> Result<(), String> {
        let script = FORCE_LAZY.replace(
            "__TIMEOUT__",
            &self.timings.image_load.as_millis().to_string(),
        );
        let report = self
            .page
            .evaluate(&script)
            .map_err(|e| format!("lazy content could not be forced: {e}"))?;
        let timed_out = report["timedOut"].as_u64().unwrap_or(0);
        debug!(
            forced = report["forced"].as_u64().unwrap_or(0),
            pending = report["pending"].as_u64().unwrap_or(0),
            timed_out,
            "lazy content forced"
        );
        if timed_out > 0 {
            return Err(format!("{timed_out} image(s) still loading after the per-image bound"));
        }
        Ok(())
    }

    fn await_network_idle(&self) -> Result<(), String> {
        let t = self.timings;
        let quiet_ticks = if t.network_poll.is_zero() {
            1
        } else {
            (t.network_quiet.as_millis() / t.network_poll.as_millis().max(1)).max(1) as u32
        };
        let mut last: Option<u64> = None;
        let mut unchanged = 0u32;
        let outcome = Poll::within(t.network_poll, t.network_idle)
            .run(|_| {
                let count = self.page.evaluate(RESOURCE_COUNT)?.as_u64().unwrap_or(0);
                if last == Some(count) {
                    unchanged += 1;
                } else {
                    unchanged = 0;
                    last = Some(count);
                }
                Ok::<_, BrowserError>(unchanged >= quiet_ticks)
            })
            .map_err(|e| format!("network activity unreadable: {e}"))?;
        if outcome.is_done() {
            Ok(())
        } else {
            Err(format!(
                "network not idle within {}ms",
                t.network_idle.as_millis()
            ))
        }
    }
}
