//! Plain HTTP fetch used to skip the browser for pages that do not need it.

use std::time::{Duration, Instant};

use tracing::debug;

pub const MIN_HTML_BYTES: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpProbe {
    pub final_url: String,
    pub status: u16,
    pub redirected: bool,
    pub html: String,
    pub links_found: usize,
    pub elapsed_ms: u64,
}

impl HttpProbe {
    /// Whether the static response is too thin to stand in for a render.
    pub fn needs_browser(&self) -> bool {
        let looks_empty = self.html.trim().is_empty()
            || self.html.len() < MIN_HTML_BYTES
            || !self.html.to_ascii_lowercase().contains("<body");
        !(200..300).contains(&self.status) || looks_empty || self.links_found == 0
    }
}

pub async fn probe(url: &str) -> Result<HttpProbe, reqwest::Error> {
    let client = reqwest::Client::builder()
        .user_agent(ua_generator::ua::spoof_ua())
        .redirect(reqwest::redirect::Policy::limited(8))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .timeout(Duration::from_secs(10))
        .build()?;

    let start = Instant::now();
    let resp = client.get(url).send().await?;
    let status = resp.status().as_u16();
    let final_url = resp.url().to_string();
    let redirected = final_url != url;

    let is_html = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("text/html"))
        .unwrap_or(true);

    let html = if is_html { resp.text().await? } else { String::new() };
    let links_found = html.matches("<a ").count();
    let elapsed_ms = start.elapsed().as_millis() as u64;
    debug!(url, status, bytes = html.len(), links_found, elapsed_ms, "http probe finished");

    Ok(HttpProbe {
        final_url,
        status,
        redirected,
        html,
        links_found,
        elapsed_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_with(html: &str, status: u16) -> HttpProbe {
        HttpProbe {
            final_url: "https://example.com/".into(),
            status,
            redirected: false,
            links_found: html.matches("<a ").count(),
            html: html.to_string(),
            elapsed_ms: 10,
        }
    }

    #[test]
    fn rich_static_page_skips_browser() {
        let body = format!(
            "<html><head><title>x</title></head><body>{}<a href=\"/about\">About</a></body></html>",
            "<p>lorem ipsum dolor sit amet</p>".repeat(20)
        );
        assert!(!probe_with(&body, 200).needs_browser());
    }

    #[test]
    fn thin_or_failed_pages_need_browser() {
        assert!(probe_with("<html><body><div id=\"root\"></div></body></html>", 200).needs_browser());
        let linkless = format!("<html><body>{}</body></html>", "<p>text</p>".repeat(100));
        assert!(probe_with(&linkless, 200).needs_browser());
        let error_page = format!("<html><body>{}<a href=\"/\">home</a></body></html>", "x".repeat(600));
        assert!(probe_with(&error_page, 503).needs_browser());
    }
}
