//! Runs every job through the capture pipeline with retries.
//!
//! Jobs run one after another. Within a job each device gets its own tab,
//! opened after the previous one is closed, so nothing leaks between
//! attempts except the browser process itself.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::artifacts::{persist_bundle, ArtifactSink, RunDir};
use crate::assemble::{assemble_job, DeviceCapture, JobBundle, PrimaryCapture};
use crate::browser::{Browser, Page, ScreenshotOptions};
use crate::config::CaptureJob;
use crate::device::DeviceProfile;
use crate::error::{CaptureError, Result};
use crate::extract::{self, metadata, selectors, style};
use crate::interaction::{capture_slides, detect_carousel, dismiss_cookie_banner};
use crate::readiness::ReadinessController;
use crate::snapshot;
use crate::timings::{pause, Timings};

/// One attempt at one job. Returns the job's output directory.
pub trait JobPipeline {
    fn attempt(&mut self, job: &CaptureJob) -> Result<PathBuf>;
}

/// The wait between a failed attempt and the next one.
pub trait Backoff {
    fn wait(&mut self, failed_attempt: u32, delay: Duration);
}

pub struct SleepBackoff;

impl Backoff for SleepBackoff {
    fn wait(&mut self, failed_attempt: u32, delay: Duration) {
        info!(failed_attempt, delay_ms = delay.as_millis() as u64, "waiting before retry");
        pause(delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per job, at least one.
    pub max_retries: u32,
    pub delay: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Browser,
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub name: String,
    pub url: String,
    pub success: bool,
    pub elapsed_seconds: f64,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub transport: Transport,
}

fn seconds(d: Duration) -> f64 {
    (d.as_secs_f64() * 100.0).round() / 100.0
}

impl JobResult {
    /// A job answered by the plain HTTP fetch without a browser.
    pub fn fast_path(job: &CaptureJob, output: PathBuf, elapsed: Duration) -> Self {
        Self {
            name: job.name.clone(),
            url: job.url.clone(),
            success: true,
            elapsed_seconds: seconds(elapsed),
            attempts: 1,
            error: None,
            output: Some(output),
            transport: Transport::Http,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed_seconds: f64,
    pub jobs: Vec<JobResult>,
}

impl RunSummary {
    pub fn new(jobs: Vec<JobResult>, elapsed: Duration) -> Self {
        let succeeded = jobs.iter().filter(|j| j.success).count();
        Self {
            total: jobs.len(),
            succeeded,
            failed: jobs.len() - succeeded,
            elapsed_seconds: seconds(elapsed),
            jobs,
        }
    }
}

pub struct Orchestrator<P, B> {
    pipeline: P,
    backoff: B,
    policy: RetryPolicy,
}

impl<P: JobPipeline, B: Backoff> Orchestrator<P, B> {
    pub fn new(pipeline: P, backoff: B, policy: RetryPolicy) -> Self {
        Self {
            pipeline,
            backoff,
            policy,
        }
    }

    pub fn backoff(&self) -> &B {
        &self.backoff
    }

    /// A failing job never stops the ones after it.
    pub fn run(&mut self, jobs: &[CaptureJob]) -> Vec<JobResult> {
        jobs.iter().map(|job| self.run_job(job)).collect()
    }

    pub fn run_job(&mut self, job: &CaptureJob) -> JobResult {
        let started = Instant::now();
        let max = self.policy.max_retries.max(1);
        let mut attempts = 0;
        let mut last_error = None;

        while attempts < max {
            attempts += 1;
            info!(job = %job.name, url = %job.url, attempt = attempts, max, "capturing");
            match self.pipeline.attempt(job) {
                Ok(output) => {
                    let elapsed = started.elapsed();
                    info!(job = %job.name, elapsed_s = seconds(elapsed), "job succeeded");
                    return JobResult {
                        name: job.name.clone(),
                        url: job.url.clone(),
                        success: true,
                        elapsed_seconds: seconds(elapsed),
                        attempts,
                        error: None,
                        output: Some(output),
                        transport: Transport::Browser,
                    };
                }
                Err(e) => {
                    warn!(job = %job.name, attempt = attempts, "attempt failed: {e}");
                    let retryable = e.is_attempt_fatal();
                    last_error = Some(e.to_string());
                    if !retryable {
                        break;
                    }
                    if attempts < max {
                        self.backoff.wait(attempts, self.policy.delay);
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| "no attempt was made".to_string());
        error!(job = %job.name, attempts, "job failed: {error}");
        JobResult {
            name: job.name.clone(),
            url: job.url.clone(),
            success: false,
            elapsed_seconds: seconds(started.elapsed()),
            attempts,
            error: Some(error),
            output: None,
            transport: Transport::Browser,
        }
    }
}

/// Captures a job with a real browser, device by device.
pub struct BrowserPipeline<'b> {
    browser: &'b dyn Browser,
    output_root: PathBuf,
    timings: Timings,
    shots: ScreenshotOptions,
    devices: Vec<DeviceProfile>,
}

impl<'b> BrowserPipeline<'b> {
    pub fn new(browser: &'b dyn Browser, output_root: &Path, timings: Timings, shots: ScreenshotOptions) -> Self {
        Self {
            browser,
            output_root: output_root.to_path_buf(),
            timings,
            shots,
            devices: DeviceProfile::standard().to_vec(),
        }
    }

    /// Navigation failure on any device fails the whole attempt. A tab that
    /// cannot be set up, or anything after navigation, only fails that device.
    pub fn capture(&self, job: &CaptureJob, sink: &dyn ArtifactSink) -> Result<JobBundle> {
        let started = Instant::now();
        let mut captures = Vec::with_capacity(self.devices.len());

        for device in &self.devices {
            let page = match self.browser.open_page(device) {
                Ok(page) => page,
                Err(e) => {
                    warn!(job = %job.name, device = device.label, "could not prepare tab: {e}");
                    captures.push((*device, Err(e.to_string())));
                    continue;
                }
            };
            let mut readiness = ReadinessController::new(page.as_ref(), &self.timings);
            readiness
                .navigate(&job.url)
                .map_err(|source| CaptureError::Navigation {
                    device: device.label,
                    source,
                })?;

            let outcome = self
                .capture_device(page.as_ref(), device, job, readiness, sink, started)
                .map_err(|e| {
                    warn!(job = %job.name, device = device.label, "device capture failed: {e}");
                    e.to_string()
                });
            captures.push((*device, outcome));
        }

        Ok(assemble_job(job, captures, Utc::now()))
    }

    fn capture_device(
        &self,
        page: &dyn Page,
        device: &DeviceProfile,
        job: &CaptureJob,
        readiness: ReadinessController<'_>,
        sink: &dyn ArtifactSink,
        started: Instant,
    ) -> Result<DeviceCapture> {
        if device.is_primary() {
            dismiss_cookie_banner(page, &self.timings);
        }
        let report = readiness.settle(job.settle());
        let load_time_ms = started.elapsed().as_millis() as u64;
        let snapshots = snapshot::take(page, device, sink, self.shots, &self.timings)?;

        if !device.is_primary() {
            let classes = extract::or_default("classes", || style::extract_classes(page));
            return Ok(DeviceCapture {
                device: *device,
                snapshots,
                readiness: report,
                classes,
                primary: None,
            });
        }

        let selector_data = selectors::extract(page, &job.selectors);
        let extraction = extract::run(page);
        let page_info = extract::or_default("page info", || metadata::page_info(page));
        let slider = detect_carousel(page);
        let slides = capture_slides(page, &slider, sink, self.shots, &self.timings);

        Ok(DeviceCapture {
            device: *device,
            snapshots,
            readiness: report,
            classes: BTreeSet::new(),
            primary: Some(PrimaryCapture {
                extraction,
                selector_data,
                page_info,
                slider,
                slides,
                load_time_ms,
            }),
        })
    }
}

impl JobPipeline for BrowserPipeline<'_> {
    fn attempt(&mut self, job: &CaptureJob) -> Result<PathBuf> {
        let dir = RunDir::create(&self.output_root, &job.name)?;
        let bundle = self.capture(job, &dir)?;
        if bundle.captured_devices() == 0 {
            return Err(CaptureError::Incomplete(
                bundle.first_error().unwrap_or("no devices configured").to_string(),
            ));
        }
        persist_bundle(&bundle, &dir)?;
        Ok(dir.path().to_path_buf())
    }
}
