use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use pagelift::artifacts::{ArtifactSink, RunDir};
use pagelift::config::{DEFAULT_CONFIG_FILE, DEFAULT_WAIT_MS};
use pagelift::http;
use pagelift::{
    resolve_jobs, BrowserPipeline, CaptureJob, ChromeBrowser, ImageFormat, JobResult, Orchestrator, RetryPolicy,
    RunOptions, RunSummary, SleepBackoff, Timings,
};

#[derive(Parser, Debug)]
#[command(version, about = "Capture and analyse rendered web pages")]
struct Cli {
    /// URLs to capture; when none are valid the config file is used
    urls: Vec<String>,
    /// Job list used when no URL arguments are given
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Directory receiving one folder per job
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
    /// Attempts per job before giving up
    #[arg(long)]
    max_retries: Option<u32>,
    /// Run Chrome with a visible window
    #[arg(long)]
    headful: bool,
    /// Try a plain HTTP fetch first and skip the browser when it suffices
    #[arg(long)]
    http_first: bool,
    /// Settle delay in milliseconds for jobs built from URL arguments
    #[arg(long, default_value_t = DEFAULT_WAIT_MS)]
    wait_ms: u64,
    #[arg(long, value_enum)]
    screenshot_format: Option<ImageFormat>,
    /// JPEG quality, 0-100
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    screenshot_quality: Option<u8>,
}

impl Cli {
    fn apply(&self, options: &mut RunOptions) {
        if let Some(max_retries) = self.max_retries {
            options.max_retries = max_retries.max(1);
        }
        if self.headful {
            options.headless = false;
        }
        if let Some(format) = self.screenshot_format {
            options.screenshot.format = format;
        }
        if let Some(quality) = self.screenshot_quality {
            options.screenshot.quality = quality;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pagelift=info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let started = Instant::now();

    let run = match resolve_jobs(&args.urls, &args.config, args.wait_ms) {
        Ok(run) => run,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };
    let mut options = run.options;
    args.apply(&mut options);

    let mut results: Vec<(usize, JobResult)> = Vec::with_capacity(run.jobs.len());
    let mut browser_jobs: Vec<(usize, CaptureJob)> = Vec::new();
    for (index, job) in run.jobs.into_iter().enumerate() {
        if args.http_first {
            match fast_path(&job, &args.output_dir).await {
                Ok(Some(result)) => {
                    results.push((index, result));
                    continue;
                }
                Ok(None) => info!(job = %job.name, "page needs rendering, using the browser"),
                Err(e) => warn!(job = %job.name, "http fetch failed, using the browser: {e:#}"),
            }
        }
        browser_jobs.push((index, job));
    }

    if !browser_jobs.is_empty() {
        let (indices, jobs): (Vec<usize>, Vec<CaptureJob>) = browser_jobs.into_iter().unzip();
        let output_dir = args.output_dir.clone();
        let captured = tokio::task::spawn_blocking(move || capture_with_browser(&jobs, &output_dir, options))
            .await
            .context("capture worker panicked")??;
        results.extend(indices.into_iter().zip(captured));
    }
    results.sort_by_key(|(index, _)| *index);

    let summary = RunSummary::new(results.into_iter().map(|(_, r)| r).collect(), started.elapsed());
    for job in &summary.jobs {
        match &job.error {
            None => info!(job = %job.name, url = %job.url, elapsed_s = job.elapsed_seconds, "ok"),
            Some(e) => error!(job = %job.name, url = %job.url, "failed: {e}"),
        }
    }
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        elapsed_s = summary.elapsed_seconds,
        "run finished"
    );
    print_json(&summary)?;
    Ok(())
}

/// `Ok(None)` when the static response is not enough and the job should be
/// rendered.
async fn fast_path(job: &CaptureJob, output_root: &Path) -> Result<Option<JobResult>> {
    let started = Instant::now();
    let probe = http::probe(&job.url).await?;
    if probe.needs_browser() {
        return Ok(None);
    }
    let dir = RunDir::create(output_root, &job.name)
        .with_context(|| format!("could not create output directory for {}", job.name))?;
    dir.store("page-desktop.html", probe.html.as_bytes())?;
    info!(
        job = %job.name,
        status = probe.status,
        final_url = %probe.final_url,
        redirected = probe.redirected,
        elapsed_ms = probe.elapsed_ms,
        "captured over plain http"
    );
    Ok(Some(JobResult::fast_path(job, dir.path().to_path_buf(), started.elapsed())))
}

fn capture_with_browser(jobs: &[CaptureJob], output_root: &Path, options: RunOptions) -> Result<Vec<JobResult>> {
    let browser = ChromeBrowser::launch(options.headless).context("headless-chrome launch failed")?;
    let timings = Timings::default();
    let policy = RetryPolicy {
        max_retries: options.max_retries,
        delay: timings.retry_backoff,
    };
    let pipeline = BrowserPipeline::new(&browser, output_root, timings, options.screenshot);
    let mut orchestrator = Orchestrator::new(pipeline, SleepBackoff, policy);
    Ok(orchestrator.run(jobs))
}

fn print_json<T: Serialize>(v: T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&v)?);
    Ok(())
}
