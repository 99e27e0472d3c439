//! Playwright browser automation
//!
//! Only checks that genuinely need a rendering engine go through here: layout
//! measurement and failure screenshots/videos. Each operation generates a
//! small Node script, runs it, and reads a single JSON line back from stdout.

use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{BrowserConfig, BrowserMode};
use crate::devices::{Engine, Viewport};
use crate::error::{E2eError, E2eResult};

/// Handle to an installed Playwright
#[derive(Debug)]
pub struct Playwright {
    node: String,
    project_dir: PathBuf,
}

/// Whether browser-only checks can run in this session
#[derive(Debug, Clone)]
pub enum BrowserAccess {
    Ready(Arc<Playwright>),
    Unavailable { required: bool, reason: String },
}

impl BrowserAccess {
    pub fn disabled() -> Self {
        BrowserAccess::Unavailable {
            required: false,
            reason: "browser disabled by configuration".to_string(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, BrowserAccess::Ready(_))
    }

    pub fn playwright(&self) -> Option<&Playwright> {
        match self {
            BrowserAccess::Ready(pw) => Some(pw),
            BrowserAccess::Unavailable { .. } => None,
        }
    }
}

/// Browser context settings for one script run
#[derive(Debug, Clone)]
pub struct ContextOptions {
    pub engine: Engine,
    pub viewport: Viewport,
    pub user_agent: String,
    pub device_scale_factor: f64,
    pub is_mobile: bool,
    pub has_touch: bool,
    pub extra_http_headers: BTreeMap<String, String>,
    pub navigation_timeout: Duration,
    pub record_video_dir: Option<PathBuf>,
}

impl ContextOptions {
    fn to_json(&self) -> serde_json::Value {
        let mut options = json!({
            "viewport": { "width": self.viewport.width, "height": self.viewport.height },
            "userAgent": self.user_agent,
            "deviceScaleFactor": self.device_scale_factor,
            "hasTouch": self.has_touch,
            "extraHTTPHeaders": self.extra_http_headers,
        });
        // Firefox rejects isMobile
        if self.engine != Engine::Firefox {
            options["isMobile"] = json!(self.is_mobile);
        }
        if let Some(dir) = &self.record_video_dir {
            options["recordVideo"] = json!({
                "dir": dir.to_string_lossy(),
                "size": { "width": self.viewport.width, "height": self.viewport.height },
            });
        }
        options
    }
}

/// What the layout probe measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutMetrics {
    pub status: Option<u16>,
    pub visible: bool,
    pub scroll_width: i64,
    pub client_width: i64,
}

impl Playwright {
    /// Find out whether Playwright can be used, per the configured mode
    pub async fn detect(config: &BrowserConfig) -> BrowserAccess {
        if config.mode == BrowserMode::Off {
            return BrowserAccess::disabled();
        }

        let status = TokioCommand::new("npx")
            .args(["--no-install", "playwright", "--version"])
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => {
                info!("Playwright available in {}", config.project_dir.display());
                BrowserAccess::Ready(Arc::new(Playwright {
                    node: config.node.clone(),
                    project_dir: config.project_dir.clone(),
                }))
            }
            _ => {
                let required = config.mode == BrowserMode::Required;
                if required {
                    warn!("Playwright is required but was not found");
                } else {
                    info!("Playwright not found; browser-only checks will be skipped");
                }
                BrowserAccess::Unavailable {
                    required,
                    reason: E2eError::PlaywrightNotFound.to_string(),
                }
            }
        }
    }

    /// Open `url` and measure body visibility and horizontal overflow
    pub async fn probe_layout(&self, url: &Url, context: &ContextOptions) -> E2eResult<LayoutMetrics> {
        let script = build_layout_script(url, context);
        let stdout = self.run_script(&script).await?;
        parse_last_json_line(&stdout)
    }

    /// Screenshot and/or video of `url`, written to the given paths
    pub async fn capture(
        &self,
        url: &Url,
        context: &ContextOptions,
        screenshot: Option<&Path>,
    ) -> E2eResult<()> {
        let script = build_capture_script(url, context, screenshot);
        self.run_script(&script).await.map(|_| ())
    }

    /// Run a generated script with node and return its stdout
    pub async fn run_script(&self, script: &str) -> E2eResult<String> {
        let temp_dir = tempfile::tempdir()?;
        let script_path = temp_dir.path().join("probe.js");
        std::fs::write(&script_path, script)?;

        debug!("Running Playwright script: {}", script_path.display());

        let output = TokioCommand::new(&self.node)
            .arg(&script_path)
            .current_dir(&self.project_dir)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(E2eError::Playwright(format!(
                "Script failed:\nstdout: {}\nstderr: {}",
                stdout, stderr
            )));
        }
        Ok(stdout)
    }
}

fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn script_prologue(context: &ContextOptions) -> String {
    format!(
        r#"const {{ chromium, firefox, webkit }} = require(require.resolve('playwright', {{ paths: [process.cwd()] }}));

(async () => {{
  const browser = await {engine}.launch({{ headless: true }});
  const context = await browser.newContext({options});
  const page = await context.newPage();
  page.setDefaultNavigationTimeout({timeout});

  try {{
"#,
        engine = context.engine.as_str(),
        options = context.to_json(),
        timeout = context.navigation_timeout.as_millis(),
    )
}

const SCRIPT_EPILOGUE: &str = r#"  } catch (error) {
    console.error(JSON.stringify({ success: false, error: error.message, stack: error.stack }));
    process.exitCode = 1;
  } finally {
    await context.close();
    await browser.close();
  }
})();
"#;

/// Script that reports `{status, visible, scrollWidth, clientWidth}`
pub fn build_layout_script(url: &Url, context: &ContextOptions) -> String {
    let mut script = script_prologue(context);
    script.push_str(&format!(
        r#"    const response = await page.goto({url});
    const visible = await page.locator('body').isVisible();
    const scrollWidth = await page.evaluate(() => document.body.scrollWidth);
    const clientWidth = await page.evaluate(() => document.body.clientWidth);
    console.log(JSON.stringify({{ status: response ? response.status() : null, visible, scrollWidth, clientWidth }}));
"#,
        url = js_string(url.as_str()),
    ));
    script.push_str(SCRIPT_EPILOGUE);
    script
}

/// Script that loads the page for a screenshot and/or video recording
pub fn build_capture_script(url: &Url, context: &ContextOptions, screenshot: Option<&Path>) -> String {
    let mut script = script_prologue(context);
    script.push_str(&format!(
        "    await page.goto({}).catch(() => null);\n",
        js_string(url.as_str())
    ));
    if let Some(path) = screenshot {
        script.push_str(&format!(
            "    await page.screenshot({{ path: {}, fullPage: true }});\n",
            js_string(&path.to_string_lossy())
        ));
    }
    script.push_str("    console.log(JSON.stringify({ success: true }));\n");
    script.push_str(SCRIPT_EPILOGUE);
    script
}

fn parse_last_json_line<T: for<'de> Deserialize<'de>>(stdout: &str) -> E2eResult<T> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| l.starts_with('{'))
        .ok_or_else(|| E2eError::Playwright(format!("no JSON result in output: {stdout}")))?;
    serde_json::from_str(line).map_err(E2eError::from)
}
