use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::assemble::JobBundle;
use crate::error::Result;

/// Where captured bytes end up. Returns the path the artifact is reachable at.
pub trait ArtifactSink {
    fn store(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf>;
}

/// One job's output directory.
#[derive(Debug, Clone)]
pub struct RunDir {
    path: PathBuf,
}

/// Keep job names usable as a single path component.
pub fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    let cleaned = cleaned.trim_matches('.');
    if cleaned.is_empty() {
        "page".to_string()
    } else {
        cleaned.to_string()
    }
}

impl RunDir {
    pub fn create(base: &Path, job_name: &str) -> io::Result<Self> {
        let path = base.join(sanitize(job_name));
        fs::create_dir_all(&path)?;
        let path = dunce::canonicalize(&path)?;
        debug!(dir = %path.display(), "output directory ready");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        let body = serde_json::to_vec_pretty(value)?;
        Ok(self.store(name, &body)?)
    }
}

impl ArtifactSink for RunDir {
    fn store(&self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.path.join(name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Write the JSON side of a bundle. Screenshots and HTML were stored while
/// capturing.
pub fn persist_bundle(bundle: &JobBundle, dir: &RunDir) -> Result<Vec<PathBuf>> {
    let mut written = vec![dir.write_json("data.json", &bundle.data_json())?];

    if let Some(analysis) = &bundle.analysis {
        let ex = &analysis.extraction;
        written.push(dir.write_json("classes.json", &ex.style.classes)?);
        written.push(dir.write_json("css-variables.json", &ex.style.css_variables)?);
        written.push(dir.write_json("computed-styles.json", &ex.style.computed_styles)?);
        if let Some(seo) = bundle.seo_json() {
            written.push(dir.write_json("seo-analysis.json", &seo)?);
        }
        written.push(dir.write_json("tech-stack.json", &ex.tech)?);
        written.push(dir.write_json("resources.json", &ex.resources)?);
        written.push(dir.write_json("metadata.json", &ex.metadata)?);
        if analysis.slider.found {
            written.push(dir.write_json("slider-info.json", &analysis.slider)?);
        }
        if !analysis.slider_shots.is_empty() {
            written.push(dir.write_json("slider-screenshots.json", &analysis.slider_shots)?);
        }
    }

    info!(job = %bundle.name, files = written.len(), dir = %dir.path().display(), "bundle written");
    Ok(written)
}
