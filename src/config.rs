//! Job list resolution from command-line URLs or a JSON config file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::browser::{ImageFormat, ScreenshotOptions};
use crate::error::{CaptureError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "pagelift.config.json";
pub const DEFAULT_WAIT_MS: u64 = 3000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

fn default_wait_ms() -> u64 {
    DEFAULT_WAIT_MS
}

/// One URL and how to capture it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureJob {
    #[serde(default)]
    pub name: String,
    pub url: String,
    #[serde(rename = "waitTime", default = "default_wait_ms")]
    pub wait_time_ms: u64,
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
}

impl CaptureJob {
    pub fn from_url(url: &str, wait_time_ms: u64) -> Self {
        Self {
            name: job_name_for(url, chrono::Utc::now().timestamp_millis()),
            url: url.to_string(),
            wait_time_ms,
            selectors: default_selectors(),
        }
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }
}

pub fn default_selectors() -> BTreeMap<String, String> {
    [
        ("title", "h1"),
        ("description", "meta[name=\"description\"]"),
        ("headings", "h2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// `<host without www.>-<millis>`, or `page-<millis>` when there is no host.
pub fn job_name_for(url: &str, millis: i64) -> String {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));
    match host {
        Some(host) if !host.is_empty() => format!("{host}-{millis}"),
        _ => format!("page-{millis}"),
    }
}

fn is_capturable(url: &str) -> bool {
    url::Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Each job writes into a directory named after it, so a repeated name gets
/// a `-2`, `-3`, ... suffix.
pub fn dedupe_names(jobs: &mut [CaptureJob]) {
    let mut taken: HashSet<String> = HashSet::new();
    for job in jobs.iter_mut() {
        if !taken.contains(&job.name) {
            taken.insert(job.name.clone());
            continue;
        }
        let mut n = 2;
        let mut candidate = format!("{}-{n}", job.name);
        while taken.contains(&candidate) {
            n += 1;
            candidate = format!("{}-{n}", job.name);
        }
        warn!(name = %job.name, renamed = %candidate, "duplicate job name");
        taken.insert(candidate.clone());
        job.name = candidate;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    pub headless: bool,
    pub max_retries: u32,
    pub screenshot: ScreenshotOptions,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            headless: true,
            max_retries: DEFAULT_MAX_RETRIES,
            screenshot: ScreenshotOptions::default(),
        }
    }
}

/// The `options` block of a config file; absent keys keep the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialOptions {
    pub headless: Option<bool>,
    pub max_retries: Option<u32>,
    pub screenshot_format: Option<ImageFormat>,
    pub screenshot_quality: Option<u8>,
}

impl RunOptions {
    pub fn apply(&mut self, partial: &PartialOptions) {
        if let Some(headless) = partial.headless {
            self.headless = headless;
        }
        if let Some(max_retries) = partial.max_retries {
            self.max_retries = max_retries.max(1);
        }
        if let Some(format) = partial.screenshot_format {
            self.screenshot.format = format;
        }
        if let Some(quality) = partial.screenshot_quality {
            self.screenshot.quality = quality.min(100);
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub pages: Vec<CaptureJob>,
    pub options: PartialOptions,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw)
            .map_err(|e| CaptureError::Config(format!("{}: {e}", path.display())))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    Urls,
    ConfigFile(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub jobs: Vec<CaptureJob>,
    pub options: RunOptions,
    pub source: JobSource,
}

/// URL arguments win; otherwise the config file is read. Arguments that are
/// not http(s) URLs are dropped with a warning.
pub fn resolve_jobs(args: &[String], config_path: &Path, wait_ms: u64) -> Result<ResolvedRun> {
    let (valid, invalid): (Vec<&String>, Vec<&String>) = args.iter().partition(|a| is_capturable(a));
    for arg in invalid {
        warn!(argument = %arg, "ignoring argument that is not an http(s) URL");
    }

    if !valid.is_empty() {
        let mut jobs: Vec<CaptureJob> = valid.iter().map(|u| CaptureJob::from_url(u, wait_ms)).collect();
        dedupe_names(&mut jobs);
        info!(jobs = jobs.len(), "jobs resolved from arguments");
        return Ok(ResolvedRun {
            jobs,
            options: RunOptions::default(),
            source: JobSource::Urls,
        });
    }

    if !config_path.is_file() {
        return Err(CaptureError::NoJobs(config_path.to_path_buf()));
    }
    let file = ConfigFile::load(config_path)?;
    let mut options = RunOptions::default();
    options.apply(&file.options);

    let now = chrono::Utc::now().timestamp_millis();
    let mut jobs: Vec<CaptureJob> = file
        .pages
        .into_iter()
        .filter_map(|mut job| {
            if !is_capturable(&job.url) {
                warn!(url = %job.url, "skipping config page without a valid http(s) URL");
                return None;
            }
            if job.name.trim().is_empty() {
                job.name = job_name_for(&job.url, now);
            }
            Some(job)
        })
        .collect();

    if jobs.is_empty() {
        return Err(CaptureError::NoJobs(config_path.to_path_buf()));
    }
    dedupe_names(&mut jobs);
    info!(jobs = jobs.len(), config = %config_path.display(), "jobs resolved from config file");
    Ok(ResolvedRun {
        jobs,
        options,
        source: JobSource::ConfigFile(config_path.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn names_derive_from_host() {
        assert_eq!(job_name_for("https://www.example.com/about", 1700), "example.com-1700");
        assert_eq!(job_name_for("https://shop.example.com", 5), "shop.example.com-5");
        assert_eq!(job_name_for("not a url", 42), "page-42");
    }

    #[test]
    fn url_arguments_become_default_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let run = resolve_jobs(
            &args(&["https://example.com", "--weird", "ftp://files.example.com"]),
            &dir.path().join(DEFAULT_CONFIG_FILE),
            1500,
        )
        .unwrap();
        assert_eq!(run.source, JobSource::Urls);
        assert_eq!(run.jobs.len(), 1);
        let job = &run.jobs[0];
        assert!(job.name.starts_with("example.com-"));
        assert_eq!(job.wait_time_ms, 1500);
        assert_eq!(job.selectors, default_selectors());
        assert_eq!(run.options, RunOptions::default());
    }

    #[test]
    fn falls_back_to_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.json");
        std::fs::write(
            &path,
            r#"{
              "pages": [
                {"name": "home", "url": "https://example.com", "selectors": {"cta": ".hero a"}},
                {"name": "broken", "url": "mailto:someone@example.com"},
                {"url": "https://www.example.org/pricing", "waitTime": 500}
              ],
              "options": {"headless": false, "maxRetries": 5, "screenshotFormat": "jpeg", "screenshotQuality": 70}
            }"#,
        )
        .unwrap();

        let run = resolve_jobs(&[], &path, DEFAULT_WAIT_MS).unwrap();
        assert_eq!(run.source, JobSource::ConfigFile(path.clone()));
        assert_eq!(run.jobs.len(), 2);
        assert_eq!(run.jobs[0].name, "home");
        assert_eq!(run.jobs[0].wait_time_ms, DEFAULT_WAIT_MS);
        assert_eq!(run.jobs[0].selectors["cta"], ".hero a");
        assert!(run.jobs[1].name.starts_with("example.org-"));
        assert_eq!(run.jobs[1].wait_time_ms, 500);
        assert!(run.jobs[1].selectors.is_empty());

        assert!(!run.options.headless);
        assert_eq!(run.options.max_retries, 5);
        assert_eq!(run.options.screenshot.format, ImageFormat::Jpeg);
        assert_eq!(run.options.screenshot.quality, 70);
    }

    #[test]
    fn no_urls_and_no_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(DEFAULT_CONFIG_FILE);
        match resolve_jobs(&args(&["nope"]), &missing, DEFAULT_WAIT_MS) {
            Err(CaptureError::NoJobs(p)) => assert_eq!(p, missing),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn same_host_pages_get_distinct_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("site.json");
        std::fs::write(
            &path,
            r#"{"pages": [
                {"url": "https://example.com/"},
                {"url": "https://example.com/pricing"},
                {"name": "home", "url": "https://example.org"},
                {"name": "home", "url": "https://example.org/about"}
            ]}"#,
        )
        .unwrap();
        let run = resolve_jobs(&[], &path, DEFAULT_WAIT_MS).unwrap();
        let names: Vec<&str> = run.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_ne!(names[0], names[1]);
        assert_eq!(names[1], format!("{}-2", names[0]));
        assert_eq!(&names[2..], ["home", "home-2"]);

        let urls = resolve_jobs(
            &args(&["https://example.com/", "https://example.com/pricing", "https://example.com/blog"]),
            &path,
            DEFAULT_WAIT_MS,
        )
        .unwrap();
        let unique: HashSet<&str> = urls.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn settle_delay_comes_from_wait_time() {
        let page: CaptureJob = serde_json::from_str(r#"{"url": "https://example.com"}"#).unwrap();
        assert_eq!(page.settle(), Duration::from_millis(DEFAULT_WAIT_MS));
        let quick: CaptureJob =
            serde_json::from_str(r#"{"url": "https://example.com", "waitTime": 250}"#).unwrap();
        assert_eq!(quick.settle(), Duration::from_millis(250));
    }

    #[test]
    fn dedupe_skips_names_already_taken() {
        let mut jobs: Vec<CaptureJob> = ["a", "a-2", "a"]
            .iter()
            .map(|name| CaptureJob {
                name: name.to_string(),
                ..CaptureJob::from_url("https://example.com", 0)
            })
            .collect();
        dedupe_names(&mut jobs);
        let names: Vec<&str> = jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, ["a", "a-2", "a-3"]);
    }

    #[test]
    fn malformed_config_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ pages: ").unwrap();
        assert!(matches!(
            resolve_jobs(&[], &path, DEFAULT_WAIT_MS),
            Err(CaptureError::Config(_))
        ));
    }

    #[test]
    fn empty_page_list_is_no_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");
        std::fs::write(&path, r#"{"pages": []}"#).unwrap();
        assert!(matches!(
            resolve_jobs(&[], &path, DEFAULT_WAIT_MS),
            Err(CaptureError::NoJobs(_))
        ));
    }
}
