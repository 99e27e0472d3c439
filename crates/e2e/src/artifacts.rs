//! Per-attempt artifacts: traces, screenshots and videos
//!
//! What gets recorded and what survives is decided by the capture policies in
//! `use`. Traces come from the page session itself; screenshots and videos
//! need Playwright and are silently left out when it is unavailable.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::browser::BrowserAccess;
use crate::config::{HarnessConfig, Project};
use crate::error::E2eResult;
use crate::page::{Exchange, Page};
use crate::suites::Check;

const MAX_SLUG: usize = 60;

/// A file attached to an attempt result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub name: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// Which artifacts an attempt records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapturePlan {
    pub trace: bool,
    pub screenshot: bool,
    pub video: bool,
}

impl CapturePlan {
    pub fn for_attempt(config: &HarnessConfig, retry: u32) -> Self {
        let opts = &config.use_options;
        Self {
            trace: opts.trace.records(retry),
            screenshot: opts.screenshot.records(retry),
            video: opts.video.records(retry),
        }
    }
}

/// Directory for one attempt's artifacts under `output_dir`
pub fn attempt_dir(output_dir: &Path, check: Check, project: &Project, retry: u32) -> PathBuf {
    let id = format!("{}-{}-{}", check.suite().file(), check.title(), project.name);
    let mut slug = String::with_capacity(id.len());
    for c in id.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    let slug: String = slug.trim_matches('-').chars().take(MAX_SLUG).collect();
    let hash = hex::encode(Sha256::digest(id.as_bytes()));

    let mut name = format!("{}-{}", slug.trim_end_matches('-'), &hash[..5]);
    if retry > 0 {
        name.push_str(&format!("-retry{retry}"));
    }
    output_dir.join(name)
}

/// Write whatever the policies keep for a finished attempt
pub async fn collect(
    config: &HarnessConfig,
    project: &Project,
    check: Check,
    retry: u32,
    failed: bool,
    page: Option<&Page>,
    browser: &BrowserAccess,
) -> Vec<Attachment> {
    let plan = CapturePlan::for_attempt(config, retry);
    let opts = &config.use_options;
    let dir = attempt_dir(&config.output_dir, check, project, retry);
    let mut attachments = Vec::new();

    if plan.trace && opts.trace.retains(retry, failed) {
        if let Some(page) = page {
            match write_trace(&dir, &page.take_trace()) {
                Ok(attachment) => attachments.push(attachment),
                Err(e) => warn!("could not write trace to {}: {}", dir.display(), e),
            }
        }
    }

    let want_screenshot = plan.screenshot && opts.screenshot.retains(retry, failed);
    let want_video = plan.video && opts.video.retains(retry, failed);
    if want_screenshot || want_video {
        match (browser.playwright(), page) {
            (Some(playwright), Some(page)) => {
                match capture_browser(playwright, page, check, &dir, want_screenshot, want_video).await {
                    Ok(mut found) => attachments.append(&mut found),
                    Err(e) => warn!("browser capture for {} failed: {}", check.title(), e),
                }
            }
            _ => debug!("no browser; skipping screenshot/video for {}", check.title()),
        }
    }

    attachments
}

fn write_trace(dir: &Path, exchanges: &[Exchange]) -> E2eResult<Attachment> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join("trace.json");
    std::fs::write(&path, serde_json::to_string_pretty(exchanges)?)?;
    Ok(Attachment {
        name: "trace".to_string(),
        path,
        content_type: "application/json".to_string(),
    })
}

async fn capture_browser(
    playwright: &crate::browser::Playwright,
    page: &Page,
    check: Check,
    dir: &Path,
    screenshot: bool,
    video: bool,
) -> E2eResult<Vec<Attachment>> {
    std::fs::create_dir_all(dir)?;
    let url = page.resolve(check.target())?;

    let mut context = page.context_options();
    let video_dir = dir.join("video");
    if video {
        context.record_video_dir = Some(video_dir.clone());
    }
    let screenshot_path = dir.join("test-failed-1.png");

    playwright
        .capture(&url, &context, screenshot.then_some(screenshot_path.as_path()))
        .await?;

    let mut attachments = Vec::new();
    if screenshot && screenshot_path.exists() {
        attachments.push(Attachment {
            name: "screenshot".to_string(),
            path: screenshot_path,
            content_type: "image/png".to_string(),
        });
    }
    if video && video_dir.is_dir() {
        for entry in std::fs::read_dir(&video_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|e| e == "webm") {
                attachments.push(Attachment {
                    name: "video".to_string(),
                    path,
                    content_type: "video/webm".to_string(),
                });
            }
        }
    }
    Ok(attachments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, HarnessConfig};

    #[test]
    fn test_attempt_dir_is_stable_and_distinct() {
        let config = HarnessConfig::defaults(&Environment::default()).unwrap();
        let chromium = &config.projects[0];
        let firefox = &config.projects[1];
        let out = Path::new("test-results");

        let a = attempt_dir(out, Check::DatabaseHealth, chromium, 0);
        assert_eq!(a, attempt_dir(out, Check::DatabaseHealth, chromium, 0));
        assert_ne!(a, attempt_dir(out, Check::DatabaseHealth, firefox, 0));

        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("health-spec-should-check-database-connectivity"));
        assert!(!name.contains("retry"));

        let retry = attempt_dir(out, Check::DatabaseHealth, chromium, 1);
        assert!(retry.to_string_lossy().ends_with("-retry1"));
    }

    #[test]
    fn test_default_plan_records_trace_only_on_first_retry() {
        let config = HarnessConfig::defaults(&Environment::default()).unwrap();
        assert!(!CapturePlan::for_attempt(&config, 0).trace);
        assert!(CapturePlan::for_attempt(&config, 1).trace);
        assert!(!CapturePlan::for_attempt(&config, 2).trace);
        assert!(CapturePlan::for_attempt(&config, 0).screenshot);
    }
}
