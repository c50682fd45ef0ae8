//! Browser-control seam.
//!
//! The capture pipeline only talks to [`Browser`] and [`Page`]. The
//! production implementation drives Chrome through `headless_chrome`.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use headless_chrome::protocol::cdp::Emulation;
use headless_chrome::protocol::cdp::Page::{CaptureScreenshot, CaptureScreenshotFormatOption, Viewport};
use headless_chrome::{LaunchOptionsBuilder, Tab};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::device::DeviceProfile;
use crate::error::BrowserError;

const DEFAULT_TAB_TIMEOUT: Duration = Duration::from_secs(30);
const SCRIPT_ERROR_KEY: &str = "__pageliftError";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    pub format: ImageFormat,
    /// Only honoured for JPEG.
    pub quality: u8,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 90,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShotRegion {
    FullPage,
    Viewport,
}

/// A single browser tab. Dropping it closes the tab.
pub trait Page {
    /// Navigate and wait for the load to finish, bounded by `timeout`.
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;
    /// Evaluate a JavaScript expression, awaiting it if it is a promise, and
    /// return its JSON value.
    fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;
    /// Click the first element matching `selector`, waiting up to `timeout`
    /// for it to appear.
    fn click(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError>;
    fn screenshot(&self, region: ShotRegion, options: ScreenshotOptions) -> Result<Vec<u8>, BrowserError>;
    /// Serialized DOM of the current document.
    fn content(&self) -> Result<String, BrowserError>;
}

/// A browser process that hands out one tab per device.
pub trait Browser {
    fn open_page(&self, device: &DeviceProfile) -> Result<Box<dyn Page>, BrowserError>;
}

/// Wraps a page expression so the result always comes back as a JSON string
/// and thrown errors come back as a tagged object instead of an exception.
fn wrap_script(script: &str) -> String {
    format!(
        "(async () => {{ try {{ const __v = await ({script}); return JSON.stringify(__v === undefined ? null : __v); }} catch (e) {{ return JSON.stringify({{ {SCRIPT_ERROR_KEY}: String((e && e.message) || e) }}); }} }})()"
    )
}

fn unwrap_result(raw: Option<Value>) -> Result<Value, BrowserError> {
    let value = match raw {
        Some(Value::String(s)) => serde_json::from_str(&s)?,
        Some(other) => other,
        None => Value::Null,
    };
    if let Some(msg) = value.get(SCRIPT_ERROR_KEY) {
        return Err(BrowserError::Script(
            msg.as_str().unwrap_or("unknown error").to_string(),
        ));
    }
    Ok(value)
}

const DOCUMENT_SIZE: &str = "({ width: Math.max(document.documentElement.scrollWidth, document.body ? document.body.scrollWidth : 0), \
    height: Math.max(document.documentElement.scrollHeight, document.body ? document.body.scrollHeight : 0) })";

/// A clip of `(width, height)` captures the whole document, including what
/// lies below the emulated viewport.
fn screenshot_request(options: ScreenshotOptions, clip: Option<(f64, f64)>) -> CaptureScreenshot {
    let (format, quality) = match options.format {
        ImageFormat::Png => (CaptureScreenshotFormatOption::Png, None),
        ImageFormat::Jpeg => (CaptureScreenshotFormatOption::Jpeg, Some(u32::from(options.quality))),
    };
    CaptureScreenshot {
        format: Some(format),
        quality,
        clip: clip.map(|(width, height)| Viewport {
            x: 0.0,
            y: 0.0,
            width,
            height,
            scale: 1.0,
        }),
        from_surface: Some(true),
        capture_beyond_viewport: clip.map(|_| true),
        optimize_for_speed: None,
    }
}

fn decode_image(data: &str) -> Result<Vec<u8>, BrowserError> {
    BASE64_STANDARD
        .decode(data)
        .map_err(|e| BrowserError::Screenshot(format!("undecodable image data: {e}")))
}

pub struct ChromeBrowser {
    browser: headless_chrome::Browser,
}

impl ChromeBrowser {
    pub fn launch(headless: bool) -> Result<Self, BrowserError> {
        let mut arg_vec = vec![
            "--no-sandbox",
            "--disable-setuid-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--no-first-run",
            "--no-default-browser-check",
            "--hide-scrollbars",
            "--disable-blink-features=AutomationControlled",
        ];
        if headless {
            arg_vec.push("--headless=new");
        }

        let launch_opts = LaunchOptionsBuilder::default()
            .headless(headless)
            .sandbox(false)
            .window_size(Some((1920, 1080)))
            .idle_browser_timeout(Duration::from_secs(300))
            .args(arg_vec.iter().map(OsStr::new).collect::<Vec<&OsStr>>())
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let browser =
            headless_chrome::Browser::new(launch_opts).map_err(|e| BrowserError::Launch(e.to_string()))?;
        info!(headless, "browser launched");
        Ok(Self { browser })
    }
}

impl Browser for ChromeBrowser {
    fn open_page(&self, device: &DeviceProfile) -> Result<Box<dyn Page>, BrowserError> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| BrowserError::Launch(format!("could not open tab: {e}")))?;

        tab.set_user_agent(device.user_agent, None, None)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        tab.call_method(Emulation::SetDeviceMetricsOverride {
            width: device.width,
            height: device.height,
            device_scale_factor: 1.0,
            mobile: device.mobile,
            scale: None,
            screen_width: None,
            screen_height: None,
            position_x: None,
            position_y: None,
            dont_set_visible_size: None,
            screen_orientation: None,
            viewport: None,
            display_feature: None,
            device_posture: None,
        })
        .map_err(|e| BrowserError::Script(format!("device emulation failed: {e}")))?;

        debug!(device = device.label, "tab opened");
        Ok(Box::new(ChromePage { tab }))
    }
}

pub struct ChromePage {
    tab: Arc<Tab>,
}

impl Page for ChromePage {
    fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        self.tab.set_default_timeout(timeout);
        let res = self
            .tab
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map(|_| ());
        self.tab.set_default_timeout(DEFAULT_TAB_TIMEOUT);
        res.map_err(|e| BrowserError::Navigation {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let remote = self
            .tab
            .evaluate(&wrap_script(script), true)
            .map_err(|e| BrowserError::Script(e.to_string()))?;
        unwrap_result(remote.value)
    }

    fn click(&self, selector: &str, timeout: Duration) -> Result<(), BrowserError> {
        let element_err = |e: anyhow::Error| BrowserError::Element {
            selector: selector.to_string(),
            reason: e.to_string(),
        };
        let element = self
            .tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map_err(element_err)?;
        element.click().map_err(element_err)?;
        Ok(())
    }

    fn screenshot(&self, region: ShotRegion, options: ScreenshotOptions) -> Result<Vec<u8>, BrowserError> {
        let clip = match region {
            ShotRegion::Viewport => None,
            ShotRegion::FullPage => {
                let dims = self.evaluate(DOCUMENT_SIZE)?;
                Some((
                    dims["width"].as_f64().unwrap_or(1920.0),
                    dims["height"].as_f64().unwrap_or(1080.0),
                ))
            }
        };
        let data = self
            .tab
            .call_method(screenshot_request(options, clip))
            .map_err(|e| BrowserError::Screenshot(e.to_string()))?
            .data;
        decode_image(&data)
    }

    fn content(&self) -> Result<String, BrowserError> {
        self.tab
            .get_content()
            .map_err(|e| BrowserError::Script(format!("could not serialize DOM: {e}")))
    }
}

impl Drop for ChromePage {
    fn drop(&mut self) {
        if let Err(e) = self.tab.close(true) {
            debug!("tab close failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_stringified_values() {
        let v = unwrap_result(Some(Value::String(r#"{"a":[1,2]}"#.into()))).unwrap();
        assert_eq!(v, json!({"a": [1, 2]}));
        assert_eq!(unwrap_result(None).unwrap(), Value::Null);
    }

    #[test]
    fn surfaces_page_exceptions() {
        let raw = Value::String(r#"{"__pageliftError":"bad selector"}"#.into());
        match unwrap_result(Some(raw)) {
            Err(BrowserError::Script(msg)) => assert_eq!(msg, "bad selector"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn wrapped_script_embeds_expression() {
        let wrapped = wrap_script("document.title");
        assert!(wrapped.contains("await (document.title)"));
        assert!(wrapped.starts_with("(async () =>"));
    }

    #[test]
    fn full_page_request_captures_beyond_viewport() {
        let req = screenshot_request(ScreenshotOptions::default(), Some((1920.0, 6400.0)));
        assert_eq!(req.capture_beyond_viewport, Some(true));
        let clip = req.clip.unwrap();
        assert_eq!((clip.width, clip.height), (1920.0, 6400.0));
        assert_eq!(req.quality, None);

        let jpeg = ScreenshotOptions {
            format: ImageFormat::Jpeg,
            quality: 70,
        };
        let viewport = screenshot_request(jpeg, None);
        assert_eq!(viewport.capture_beyond_viewport, None);
        assert!(viewport.clip.is_none());
        assert_eq!(viewport.quality, Some(70));
    }

    #[test]
    fn decodes_screenshot_payload() {
        assert_eq!(decode_image("iVBORw==").unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert!(matches!(decode_image("not base64!"), Err(BrowserError::Screenshot(_))));
    }

    #[test]
    fn jpeg_uses_jpg_extension() {
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
        assert_eq!(ImageFormat::default().extension(), "png");
    }
}
