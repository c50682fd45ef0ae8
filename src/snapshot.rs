use std::path::PathBuf;

use tracing::{debug, warn};

use crate::artifacts::ArtifactSink;
use crate::browser::{Page, ScreenshotOptions, ShotRegion};
use crate::device::DeviceProfile;
use crate::error::Result;
use crate::interaction::{freeze_animations, resume_animations};
use crate::readiness::SCROLL_TOP;
use crate::timings::{pause, Timings};

/// Where one device's screenshots and DOM snapshot were stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshots {
    pub full_page: PathBuf,
    pub viewport: PathBuf,
    pub html: PathBuf,
}

pub fn file_names(device: &DeviceProfile, options: ScreenshotOptions) -> [String; 3] {
    let ext = options.format.extension();
    [
        format!("{}-fullpage.{ext}", device.label),
        format!("{}-viewport.{ext}", device.label),
        format!("page-{}.html", device.label),
    ]
}

/// Full-page shot, viewport shot from the top, then the serialized DOM.
/// Animations are held still for both screenshots.
pub fn take(
    page: &dyn Page,
    device: &DeviceProfile,
    sink: &dyn ArtifactSink,
    options: ScreenshotOptions,
    timings: &Timings,
) -> Result<DeviceSnapshots> {
    let [full_name, viewport_name, html_name] = file_names(device, options);

    freeze_animations(page);
    let shots = shoot(page, sink, options, timings, &full_name, &viewport_name);
    resume_animations(page);
    let (full_page, viewport) = shots?;

    let html = page.content()?;
    let html = sink.store(&html_name, html.as_bytes())?;
    debug!(device = device.label, "snapshots stored");

    Ok(DeviceSnapshots {
        full_page,
        viewport,
        html,
    })
}

fn shoot(
    page: &dyn Page,
    sink: &dyn ArtifactSink,
    options: ScreenshotOptions,
    timings: &Timings,
    full_name: &str,
    viewport_name: &str,
) -> Result<(PathBuf, PathBuf)> {
    let full = page.screenshot(ShotRegion::FullPage, options)?;
    let full_page = sink.store(full_name, &full)?;

    if let Err(e) = page.evaluate(SCROLL_TOP) {
        warn!("could not scroll to top before viewport shot: {e}");
    }
    pause(timings.retop_settle);

    let viewport = page.screenshot(ShotRegion::Viewport, options)?;
    let viewport = sink.store(viewport_name, &viewport)?;
    Ok((full_page, viewport))
}
