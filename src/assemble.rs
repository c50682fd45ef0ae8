//! Folds per-device captures into the job bundle. Nothing here touches the
//! browser.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::CaptureJob;
use crate::device::DeviceProfile;
use crate::extract::{self, ExtractionResult, PageInfo, SeoScore};
use crate::interaction::{SlideCapture, SliderInfo, SliderShot};
use crate::readiness::{Degradation, ReadinessReport};
use crate::snapshot::DeviceSnapshots;

/// What only the primary device collects.
#[derive(Debug, Clone)]
pub struct PrimaryCapture {
    pub extraction: ExtractionResult,
    pub selector_data: BTreeMap<String, Value>,
    pub page_info: PageInfo,
    pub slider: SliderInfo,
    pub slides: SlideCapture,
    pub load_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct DeviceCapture {
    pub device: DeviceProfile,
    pub snapshots: DeviceSnapshots,
    pub readiness: ReadinessReport,
    /// Class tokens seen on a secondary device.
    pub classes: BTreeSet<String>,
    pub primary: Option<PrimaryCapture>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureResult {
    pub full_page_path: PathBuf,
    pub viewport_path: PathBuf,
    pub html_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slider_screenshots: Option<Vec<SliderShot>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeviceOutcome {
    Captured(CaptureResult),
    Failed { error: String },
}

impl DeviceOutcome {
    pub fn is_captured(&self) -> bool {
        matches!(self, DeviceOutcome::Captured(_))
    }
}

/// Desktop-only analysis, with classes merged across devices.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub extraction: ExtractionResult,
    pub seo: SeoScore,
    pub slider: SliderInfo,
    pub slider_shots: Vec<SliderShot>,
    pub selector_data: BTreeMap<String, Value>,
    pub page_info: PageInfo,
    pub load_time_ms: u64,
}

#[derive(Debug, Clone)]
pub struct JobBundle {
    pub name: String,
    pub url: String,
    pub captured_at: DateTime<Utc>,
    pub devices: BTreeMap<&'static str, DeviceOutcome>,
    pub analysis: Option<Analysis>,
}

pub fn assemble_device(capture: &DeviceCapture) -> CaptureResult {
    let slider_screenshots = capture
        .primary
        .as_ref()
        .filter(|p| !p.slides.shots.is_empty())
        .map(|p| p.slides.shots.clone());
    CaptureResult {
        full_page_path: capture.snapshots.full_page.clone(),
        viewport_path: capture.snapshots.viewport.clone(),
        html_path: capture.snapshots.html.clone(),
        slider_screenshots,
        degraded: capture.readiness.degraded.clone(),
    }
}

/// Combine every device's outcome for one job. A device that failed after
/// navigation is kept as `{error}`.
pub fn assemble_job(
    job: &CaptureJob,
    captures: Vec<(DeviceProfile, Result<DeviceCapture, String>)>,
    captured_at: DateTime<Utc>,
) -> JobBundle {
    let mut devices = BTreeMap::new();
    let mut primary = None;
    let mut extra_classes = BTreeSet::new();

    for (device, outcome) in captures {
        match outcome {
            Ok(capture) => {
                devices.insert(device.label, DeviceOutcome::Captured(assemble_device(&capture)));
                extra_classes.extend(capture.classes);
                if let Some(p) = capture.primary {
                    primary = Some(p);
                }
            }
            Err(error) => {
                devices.insert(device.label, DeviceOutcome::Failed { error });
            }
        }
    }

    let analysis = primary.map(|p| {
        let mut extraction = p.extraction;
        extraction.style.merge_classes(extra_classes);
        let seo = extract::seo::score(&extraction.seo, p.load_time_ms);
        Analysis {
            seo,
            slider: SliderInfo {
                skipped_slides: p.slides.skipped,
                ..p.slider
            },
            slider_shots: p.slides.shots,
            selector_data: p.selector_data,
            page_info: p.page_info,
            load_time_ms: p.load_time_ms,
            extraction,
        }
    });

    JobBundle {
        name: job.name.clone(),
        url: job.url.clone(),
        captured_at,
        devices,
        analysis,
    }
}

impl JobBundle {
    pub fn captured_devices(&self) -> usize {
        self.devices.values().filter(|d| d.is_captured()).count()
    }

    /// First device error, for reporting a bundle nothing was captured into.
    pub fn first_error(&self) -> Option<&str> {
        self.devices.values().find_map(|d| match d {
            DeviceOutcome::Failed { error } => Some(error.as_str()),
            DeviceOutcome::Captured(_) => None,
        })
    }

    /// Page metadata, selector data and screenshot references.
    pub fn data_json(&self) -> Value {
        let (metadata, data) = match &self.analysis {
            Some(a) => (
                json!({
                    "title": a.page_info.title,
                    "url": a.page_info.url,
                    "documentHeight": a.page_info.document_height,
                    "captureDate": self.captured_at.to_rfc3339(),
                    "loadTime": a.load_time_ms,
                }),
                json!(a.selector_data),
            ),
            None => (
                json!({ "url": self.url, "captureDate": self.captured_at.to_rfc3339() }),
                Value::Null,
            ),
        };
        json!({
            "name": self.name,
            "metadata": metadata,
            "data": data,
            "screenshots": self.devices,
        })
    }

    pub fn seo_json(&self) -> Option<Value> {
        self.analysis.as_ref().map(|a| {
            json!({
                "score": a.seo.score,
                "grade": a.seo.grade,
                "issues": a.seo.issues,
                "recommendations": a.seo.recommendations,
                "details": a.extraction.seo,
            })
        })
    }
}
