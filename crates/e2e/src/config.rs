//! Harness configuration
//!
//! Configuration is assembled once at startup from three layers, lowest
//! precedence first: built-in defaults, an optional TOML file, and the
//! process [`Environment`] plus command-line [`Overrides`]. The result is a
//! validated, immutable [`HarnessConfig`] shared by the whole run. A bad value
//! anywhere is reported before a single case runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::devices::{self, Device};
use crate::error::{E2eError, E2eResult};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_SERVER_COMMAND: &str = "php artisan serve --port=8080";

/// Environment variables the harness reacts to, read once
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    /// Running under continuous integration (`CI`)
    pub ci: bool,
    /// Origin override (`BASE_URL`)
    pub base_url: Option<String>,
}

impl Environment {
    /// Read the process environment
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    /// Resolve from an explicit variable list
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut env = Self::default();
        for (key, value) in vars {
            match key.as_ref() {
                "CI" => env.ci = is_truthy(value.as_ref()),
                "BASE_URL" => {
                    let value = value.as_ref().trim();
                    if !value.is_empty() {
                        env.base_url = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }
        env
    }
}

fn is_truthy(value: &str) -> bool {
    let value = value.trim();
    !(value.is_empty() || value == "0" || value.eq_ignore_ascii_case("false"))
}

/// Artifact capture policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapturePolicy {
    Off,
    On,
    OnFirstRetry,
    OnAllRetries,
    RetainOnFailure,
    OnlyOnFailure,
}

impl CapturePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapturePolicy::Off => "off",
            CapturePolicy::On => "on",
            CapturePolicy::OnFirstRetry => "on-first-retry",
            CapturePolicy::OnAllRetries => "on-all-retries",
            CapturePolicy::RetainOnFailure => "retain-on-failure",
            CapturePolicy::OnlyOnFailure => "only-on-failure",
        }
    }

    /// Whether an attempt with this retry index records the artifact at all
    pub fn records(&self, retry: u32) -> bool {
        match self {
            CapturePolicy::Off => false,
            CapturePolicy::On | CapturePolicy::RetainOnFailure | CapturePolicy::OnlyOnFailure => {
                true
            }
            CapturePolicy::OnFirstRetry => retry == 1,
            CapturePolicy::OnAllRetries => retry >= 1,
        }
    }

    /// Whether a recorded artifact is kept once the attempt outcome is known
    pub fn retains(&self, retry: u32, failed: bool) -> bool {
        match self {
            CapturePolicy::RetainOnFailure | CapturePolicy::OnlyOnFailure => failed,
            other => other.records(retry),
        }
    }
}

/// Which artifact a capture policy applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Trace,
    Screenshot,
    Video,
}

impl ArtifactKind {
    fn accepts(&self, policy: CapturePolicy) -> bool {
        use CapturePolicy::*;
        match self {
            ArtifactKind::Trace => !matches!(policy, OnlyOnFailure),
            ArtifactKind::Screenshot => matches!(policy, Off | On | OnlyOnFailure),
            ArtifactKind::Video => matches!(policy, Off | On | RetainOnFailure | OnFirstRetry),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ArtifactKind::Trace => "trace",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Video => "video",
        }
    }
}

/// One report artifact generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ReporterConfig {
    /// Console lines
    List,
    /// Human-readable HTML report directory
    Html { output_folder: PathBuf },
    /// Machine-readable JSON report
    Json { output_file: PathBuf },
    /// CI-consumable JUnit XML report
    Junit { output_file: PathBuf },
}

impl ReporterConfig {
    pub fn name(&self) -> &'static str {
        match self {
            ReporterConfig::List => "list",
            ReporterConfig::Html { .. } => "html",
            ReporterConfig::Json { .. } => "json",
            ReporterConfig::Junit { .. } => "junit",
        }
    }

    pub fn output(&self) -> Option<&Path> {
        match self {
            ReporterConfig::List => None,
            ReporterConfig::Html { output_folder } => Some(output_folder),
            ReporterConfig::Json { output_file } | ReporterConfig::Junit { output_file } => {
                Some(output_file)
            }
        }
    }
}

fn default_reporters() -> Vec<ReporterConfig> {
    vec![
        ReporterConfig::List,
        ReporterConfig::Html {
            output_folder: PathBuf::from("e2e-report"),
        },
        ReporterConfig::Json {
            output_file: PathBuf::from("test-results/results.json"),
        },
        ReporterConfig::Junit {
            output_file: PathBuf::from("test-results/results.xml"),
        },
    ]
}

/// How the harness uses Playwright for browser-only checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserMode {
    /// Use Playwright when installed, skip browser-only checks otherwise
    #[default]
    Auto,
    /// Fail browser-only checks when Playwright is missing
    Required,
    /// Never launch a browser
    Off,
}

/// Worker count as written in the file: a number or a share of cores
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WorkersSetting {
    Count(usize),
    Share(String),
}

impl WorkersSetting {
    fn resolve(&self, cores: usize) -> E2eResult<usize> {
        match self {
            WorkersSetting::Count(n) => Ok(*n),
            WorkersSetting::Share(s) => {
                let pct = s
                    .trim()
                    .strip_suffix('%')
                    .and_then(|p| p.trim().parse::<u32>().ok())
                    .filter(|p| (1..=100).contains(p))
                    .ok_or_else(|| {
                        E2eError::Config(format!(
                            "workers must be a number or a percentage like \"50%\", got {s:?}"
                        ))
                    })?;
                Ok(((cores * pct as usize) / 100).max(1))
            }
        }
    }
}

/// File layer: every field optional, unknown keys rejected
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub test_dir: Option<PathBuf>,
    pub fully_parallel: Option<bool>,
    pub forbid_only: Option<bool>,
    pub retries: Option<u32>,
    pub workers: Option<WorkersSetting>,
    pub timeout_ms: Option<u64>,
    pub output_dir: Option<PathBuf>,
    pub reporter: Option<Vec<ReporterConfig>>,
    #[serde(default, rename = "use")]
    pub use_options: UseFile,
    pub projects: Option<Vec<ProjectFile>>,
    pub web_server: Option<WebServerFile>,
    #[serde(default)]
    pub browser: BrowserFile,
    #[serde(default)]
    pub assets: AssetsFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UseFile {
    pub base_url: Option<String>,
    pub trace: Option<CapturePolicy>,
    pub screenshot: Option<CapturePolicy>,
    pub video: Option<CapturePolicy>,
    pub extra_http_headers: Option<BTreeMap<String, String>>,
    pub navigation_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectFile {
    pub name: String,
    pub device: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebServerFile {
    pub enabled: Option<bool>,
    pub command: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub reuse_existing_server: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrowserFile {
    pub mode: Option<BrowserMode>,
    pub node: Option<String>,
    pub project_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetsFile {
    pub require_match: Option<bool>,
}

impl FileConfig {
    /// Parse a configuration file body
    pub fn from_toml(content: &str) -> E2eResult<Self> {
        toml::from_str(content).map_err(E2eError::from)
    }

    /// Load configuration from file; a missing file means defaults
    pub fn load(path: &Path) -> E2eResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)
        } else {
            Ok(Self::default())
        }
    }
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub grep: Option<String>,
    pub projects: Vec<String>,
    pub workers: Option<usize>,
    pub retries: Option<u32>,
}

/// Options applied to every case
#[derive(Debug, Clone)]
pub struct UseOptions {
    pub base_url: Url,
    pub trace: CapturePolicy,
    pub screenshot: CapturePolicy,
    pub video: CapturePolicy,
    pub extra_http_headers: BTreeMap<String, String>,
    pub navigation_timeout: Duration,
}

/// A named device profile the full suite runs against
#[derive(Debug, Clone)]
pub struct Project {
    pub name: String,
    pub device: &'static Device,
}

/// Local instance of the application to boot outside CI
#[derive(Debug, Clone)]
pub struct WebServerConfig {
    pub command: String,
    pub port: u16,
    pub url: Option<Url>,
    pub reuse_existing_server: bool,
    pub timeout: Duration,
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub mode: BrowserMode,
    pub node: String,
    pub project_dir: PathBuf,
}

/// Fully resolved, validated run configuration
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub test_dir: PathBuf,
    pub fully_parallel: bool,
    /// Reported only; the suites carry no focus markers
    pub forbid_only: bool,
    pub retries: u32,
    pub workers: usize,
    pub timeout: Duration,
    pub output_dir: PathBuf,
    pub reporters: Vec<ReporterConfig>,
    pub use_options: UseOptions,
    pub projects: Vec<Project>,
    pub web_server: Option<WebServerConfig>,
    pub browser: BrowserConfig,
    pub require_asset_match: bool,
    pub grep: Option<String>,
    pub project_filter: Vec<String>,
    pub ci: bool,
}

fn default_projects() -> Vec<ProjectFile> {
    [
        ("chromium", "Desktop Chrome"),
        ("firefox", "Desktop Firefox"),
        ("webkit", "Desktop Safari"),
        ("Mobile Chrome", "Pixel 5"),
        ("Mobile Safari", "iPhone 12"),
    ]
    .into_iter()
    .map(|(name, device)| ProjectFile {
        name: name.to_string(),
        device: device.to_string(),
    })
    .collect()
}

fn default_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "application/json".to_string()),
        ("Content-Type".to_string(), "application/json".to_string()),
    ])
}

/// Half of the available cores, at least one
pub fn default_workers() -> usize {
    (available_cores() / 2).max(1)
}

fn available_cores() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl HarnessConfig {
    /// Defaults only, as seen from the given environment
    pub fn defaults(env: &Environment) -> E2eResult<Self> {
        Self::resolve(FileConfig::default(), env, Overrides::default())
    }

    /// Merge the layers and validate the result
    pub fn resolve(file: FileConfig, env: &Environment, overrides: Overrides) -> E2eResult<Self> {
        let mut problems = Vec::new();

        let workers = match overrides.workers {
            Some(n) => n,
            None => match &file.workers {
                Some(setting) => setting.resolve(available_cores())?,
                None if env.ci => 1,
                None => default_workers(),
            },
        };

        let retries = overrides
            .retries
            .or(file.retries)
            .unwrap_or(if env.ci { 2 } else { 0 });

        let base_url_raw = env
            .base_url
            .clone()
            .or(file.use_options.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = match Url::parse(&base_url_raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => url,
            Ok(url) => {
                problems.push(format!("base_url must be an http(s) origin, got {url}"));
                Url::parse(DEFAULT_BASE_URL)?
            }
            Err(e) => {
                problems.push(format!("base_url {base_url_raw:?} is not a valid URL: {e}"));
                Url::parse(DEFAULT_BASE_URL)?
            }
        };

        let uf = &file.use_options;
        let use_options = UseOptions {
            base_url,
            trace: uf.trace.unwrap_or(CapturePolicy::OnFirstRetry),
            screenshot: uf.screenshot.unwrap_or(CapturePolicy::OnlyOnFailure),
            video: uf.video.unwrap_or(CapturePolicy::RetainOnFailure),
            extra_http_headers: uf.extra_http_headers.clone().unwrap_or_else(default_headers),
            navigation_timeout: Duration::from_millis(uf.navigation_timeout_ms.unwrap_or(15_000)),
        };

        let mut projects = Vec::new();
        for p in file.projects.clone().unwrap_or_else(default_projects) {
            match devices::lookup(&p.device) {
                Some(device) => projects.push(Project {
                    name: p.name,
                    device,
                }),
                None => problems.push(format!(
                    "project {:?} references unknown device {:?}",
                    p.name, p.device
                )),
            }
        }

        let web_server = if env.ci {
            None
        } else {
            match &file.web_server {
                Some(ws) if ws.enabled == Some(false) => None,
                ws => {
                    let ws = ws.clone().unwrap_or_default();
                    let url = match ws.url.as_deref().map(Url::parse).transpose() {
                        Ok(url) => url,
                        Err(e) => {
                            problems.push(format!("web_server.url is not a valid URL: {e}"));
                            None
                        }
                    };
                    Some(WebServerConfig {
                        command: ws.command.unwrap_or_else(|| DEFAULT_SERVER_COMMAND.to_string()),
                        port: ws.port.unwrap_or(DEFAULT_SERVER_PORT),
                        url,
                        reuse_existing_server: ws.reuse_existing_server.unwrap_or(!env.ci),
                        timeout: Duration::from_millis(ws.timeout_ms.unwrap_or(60_000)),
                        cwd: ws.cwd,
                    })
                }
            }
        };

        let config = Self {
            test_dir: file.test_dir.clone().unwrap_or_else(|| PathBuf::from("tests")),
            fully_parallel: file.fully_parallel.unwrap_or(true),
            forbid_only: file.forbid_only.unwrap_or(env.ci),
            retries,
            workers,
            timeout: Duration::from_millis(file.timeout_ms.unwrap_or(30_000)),
            output_dir: file
                .output_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("test-results")),
            reporters: file.reporter.clone().unwrap_or_else(default_reporters),
            use_options,
            projects,
            web_server,
            browser: BrowserConfig {
                mode: file.browser.mode.unwrap_or_default(),
                node: file.browser.node.clone().unwrap_or_else(|| "node".to_string()),
                project_dir: file
                    .browser
                    .project_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(".")),
            },
            require_asset_match: file.assets.require_match.unwrap_or(false),
            grep: overrides.grep.filter(|g| !g.is_empty()),
            project_filter: overrides.projects,
            ci: env.ci,
        };

        problems.extend(config.problems());
        if problems.is_empty() {
            Ok(config)
        } else {
            Err(E2eError::Config(problems.join("; ")))
        }
    }

    /// Re-check invariants of an already built configuration
    pub fn validate(&self) -> E2eResult<()> {
        let problems = self.problems();
        if problems.is_empty() {
            Ok(())
        } else {
            Err(E2eError::Config(problems.join("; ")))
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.workers == 0 {
            problems.push("workers must be at least 1".to_string());
        }
        if self.timeout.is_zero() {
            problems.push("timeout_ms must be greater than 0".to_string());
        }
        if self.use_options.navigation_timeout.is_zero() {
            problems.push("use.navigation_timeout_ms must be greater than 0".to_string());
        }
        if self.projects.is_empty() {
            problems.push("at least one project is required".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for project in &self.projects {
            if project.name.trim().is_empty() {
                problems.push("project names must not be empty".to_string());
            } else if !seen.insert(project.name.as_str()) {
                problems.push(format!("duplicate project name {:?}", project.name));
            }
        }
        for wanted in &self.project_filter {
            if !self.projects.iter().any(|p| &p.name == wanted) {
                problems.push(format!("--project {wanted:?} does not match any project"));
            }
        }

        for reporter in &self.reporters {
            if let Some(path) = reporter.output() {
                if path.as_os_str().is_empty() {
                    problems.push(format!("{} reporter needs an output path", reporter.name()));
                }
            }
        }

        for (kind, policy) in [
            (ArtifactKind::Trace, self.use_options.trace),
            (ArtifactKind::Screenshot, self.use_options.screenshot),
            (ArtifactKind::Video, self.use_options.video),
        ] {
            if !kind.accepts(policy) {
                problems.push(format!(
                    "use.{} does not accept {:?}",
                    kind.label(),
                    policy.as_str()
                ));
            }
        }

        for (name, value) in &self.use_options.extra_http_headers {
            if reqwest::header::HeaderName::from_bytes(name.as_bytes()).is_err()
                || reqwest::header::HeaderValue::from_str(value).is_err()
            {
                problems.push(format!("invalid extra HTTP header {name:?}"));
            }
        }

        if let Some(ws) = &self.web_server {
            if ws.command.trim().is_empty() {
                problems.push("web_server.command must not be empty".to_string());
            }
            if ws.port == 0 {
                problems.push("web_server.port must not be 0".to_string());
            }
            if ws.timeout.is_zero() {
                problems.push("web_server.timeout_ms must be greater than 0".to_string());
            }
        }

        problems
    }

    /// Projects selected for this run, in configured order
    pub fn selected_projects(&self) -> impl Iterator<Item = &Project> {
        self.projects
            .iter()
            .filter(|p| self.project_filter.is_empty() || self.project_filter.contains(&p.name))
    }
}
