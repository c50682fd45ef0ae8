//! Render pages in a headless browser, wait for them to settle, and capture
//! screenshots plus style, SEO, resource and technology data.

pub mod artifacts;
pub mod assemble;
pub mod browser;
pub mod config;
pub mod device;
pub mod error;
pub mod extract;
pub mod http;
pub mod interaction;
pub mod orchestrator;
pub mod poll;
pub mod readiness;
pub mod snapshot;
pub mod timings;

#[cfg(test)]
mod testing;

pub use browser::{Browser, ChromeBrowser, ImageFormat, Page, ScreenshotOptions};
pub use config::{resolve_jobs, CaptureJob, RunOptions};
pub use device::DeviceProfile;
pub use error::{BrowserError, CaptureError};
pub use orchestrator::{BrowserPipeline, JobResult, Orchestrator, RetryPolicy, RunSummary, SleepBackoff};
pub use timings::Timings;
