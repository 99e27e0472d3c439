//! Main test runner that orchestrates the server, the device projects and the
//! suites

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::artifacts::{self, Attachment, CapturePlan};
use crate::browser::{BrowserAccess, Playwright};
use crate::config::{HarnessConfig, Project, ReporterConfig};
use crate::error::{CaseFailure, E2eError, E2eResult};
use crate::expect::Completion;
use crate::page::{Page, PageOptions};
use crate::report;
use crate::server::WebServer;
use crate::suites::{Check, CheckOptions, SuiteId};

/// Outcome of one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AttemptStatus {
    Passed,
    Failed,
    TimedOut,
    Skipped,
}

/// Failure details as reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub kind: String,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl From<&CaseFailure> for ErrorInfo {
    fn from(failure: &CaseFailure) -> Self {
        let (expected, actual) = match failure {
            CaseFailure::Assertion(a) => (Some(a.expected.clone()), Some(a.actual.clone())),
            _ => (None, None),
        };
        Self {
            kind: failure.kind().to_string(),
            message: failure.to_string(),
            expected,
            actual,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub retry: u32,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub error: Option<ErrorInfo>,
    pub skip_reason: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Final verdict for a case in one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Passed on the first attempt
    Expected,
    /// Every attempt failed
    Unexpected,
    /// Passed after at least one retry
    Flaky,
    Skipped,
}

impl Outcome {
    fn from_attempts(attempts: &[AttemptResult]) -> Self {
        match attempts.last().map(|a| a.status) {
            Some(AttemptStatus::Passed) if attempts.len() > 1 => Outcome::Flaky,
            Some(AttemptStatus::Passed) => Outcome::Expected,
            Some(AttemptStatus::Skipped) => Outcome::Skipped,
            _ => Outcome::Unexpected,
        }
    }
}

/// Result of running a single case against a single project
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseReport {
    pub project: String,
    pub suite: SuiteId,
    pub check: Check,
    pub title: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptResult>,
    #[serde(skip)]
    order: (usize, usize),
}

impl CaseReport {
    pub fn new(
        project: &str,
        check: Check,
        outcome: Outcome,
        duration_ms: u64,
        attempts: Vec<AttemptResult>,
    ) -> Self {
        Self {
            project: project.to_string(),
            suite: check.suite(),
            check,
            title: check.title().to_string(),
            outcome,
            duration_ms,
            attempts,
            order: (0, 0),
        }
    }

    pub fn last_error(&self) -> Option<&ErrorInfo> {
        self.attempts.last().and_then(|a| a.error.as_ref())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub expected: usize,
    pub unexpected: usize,
    pub flaky: usize,
    pub skipped: usize,
}

/// Result of running all planned cases
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub stats: RunStats,
    pub cases: Vec<CaseReport>,
}

impl RunReport {
    /// No case ended unexpectedly
    pub fn success(&self) -> bool {
        self.stats.unexpected == 0
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }
}

/// One case scheduled against one project
#[derive(Debug, Clone)]
pub struct PlannedCase {
    pub project: Project,
    pub check: Check,
    order: (usize, usize),
}

/// Main E2E test runner
pub struct TestRunner {
    config: Arc<HarnessConfig>,

    /// Running or reused server (if any)
    server: Option<WebServer>,

    browser: Option<BrowserAccess>,
}

impl TestRunner {
    pub fn new(config: HarnessConfig) -> Self {
        Self {
            config: Arc::new(config),
            server: None,
            browser: None,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Boot (or reuse) the local server, unless the configuration has none
    pub async fn start_server(&mut self) -> E2eResult<()> {
        if self.server.is_some() {
            return Ok(()); // Already running
        }

        match &self.config.web_server {
            Some(ws) => {
                self.server = Some(WebServer::start(ws).await?);
            }
            None if self.config.ci => info!("CI run: expecting an externally provisioned server"),
            None => debug!("No web server configured"),
        }
        Ok(())
    }

    pub fn stop_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
    }

    /// Use this browser access instead of probing for Playwright
    pub fn with_browser(mut self, browser: BrowserAccess) -> Self {
        self.browser = Some(browser);
        self
    }

    async fn browser(&mut self) -> BrowserAccess {
        if let Some(browser) = &self.browser {
            return browser.clone();
        }
        let browser = Playwright::detect(&self.config.browser).await;
        self.browser = Some(browser.clone());
        browser
    }

    /// Selected projects × suites × checks, in report order
    pub fn plan(&self) -> Vec<PlannedCase> {
        let grep = self.config.grep.as_deref();
        let mut plan = Vec::new();

        for (project_index, project) in self.config.projects.iter().enumerate() {
            if !self.config.project_filter.is_empty()
                && !self.config.project_filter.contains(&project.name)
            {
                continue;
            }
            let mut case_index = 0;
            for suite in SuiteId::ALL {
                for &check in suite.checks() {
                    case_index += 1;
                    if grep.is_some_and(|g| !check.full_title().contains(g)) {
                        continue;
                    }
                    plan.push(PlannedCase {
                        project: project.clone(),
                        check,
                        order: (project_index, case_index),
                    });
                }
            }
        }
        plan
    }

    /// Group planned cases into units of work for the worker pool
    fn work_units(&self, plan: Vec<PlannedCase>) -> Vec<Vec<PlannedCase>> {
        if self.config.fully_parallel {
            return plan.into_iter().map(|case| vec![case]).collect();
        }

        let mut units: Vec<Vec<PlannedCase>> = Vec::new();
        for case in plan {
            match units.last_mut() {
                Some(unit)
                    if unit[0].project.name == case.project.name
                        && unit[0].check.suite() == case.check.suite() =>
                {
                    unit.push(case)
                }
                _ => units.push(vec![case]),
            }
        }
        units
    }

    /// Run every planned case
    pub async fn run(&mut self) -> E2eResult<RunReport> {
        let started_at = Utc::now();
        let start = Instant::now();
        let browser = self.browser().await;
        let plan = self.plan();

        if plan.is_empty() {
            warn!("No tests matched the current filters");
        }

        let units = self.work_units(plan);
        info!(
            "Running {} unit(s) using {} worker(s), base URL {}",
            units.len(),
            self.config.workers,
            self.config.use_options.base_url
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut set = JoinSet::new();
        for unit in units {
            let config = Arc::clone(&self.config);
            let semaphore = Arc::clone(&semaphore);
            let browser = browser.clone();
            set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| E2eError::Config(format!("worker pool closed: {e}")))?;
                let mut reports = Vec::with_capacity(unit.len());
                for case in unit {
                    reports.push(run_case(&config, &browser, case).await);
                }
                Ok::<_, E2eError>(reports)
            });
        }

        let mut cases = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(reports)) => cases.extend(reports),
                Ok(Err(e)) => return Err(e),
                Err(e) => error!("worker task failed: {}", e),
            }
        }
        cases.sort_by_key(|c| c.order);

        let mut stats = RunStats::default();
        for case in &cases {
            match case.outcome {
                Outcome::Expected => stats.expected += 1,
                Outcome::Unexpected => stats.unexpected += 1,
                Outcome::Flaky => stats.flaky += 1,
                Outcome::Skipped => stats.skipped += 1,
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Test Results: {} passed, {} failed, {} flaky, {} skipped ({} ms)",
            stats.expected, stats.unexpected, stats.flaky, stats.skipped, duration_ms
        );

        Ok(RunReport {
            started_at,
            duration_ms,
            stats,
            cases,
        })
    }

    /// Hand the finished run to every configured reporter
    pub fn write_reports(&self, report: &RunReport) -> E2eResult<Vec<PathBuf>> {
        report::write_all(&self.config, report)
    }
}

impl Drop for TestRunner {
    fn drop(&mut self) {
        self.stop_server();
    }
}

/// Attempt a case until it passes, is skipped, or runs out of retries
async fn run_case(config: &HarnessConfig, browser: &BrowserAccess, planned: PlannedCase) -> CaseReport {
    let start = Instant::now();
    let options = CheckOptions::from(config);
    let mut attempts = Vec::new();

    for retry in 0..=config.retries {
        let attempt = run_attempt(config, browser, &planned, &options, retry).await;
        let done = matches!(attempt.status, AttemptStatus::Passed | AttemptStatus::Skipped);
        attempts.push(attempt);
        if done {
            break;
        }
        if retry < config.retries {
            debug!("retrying {} [{}]", planned.check.title(), planned.project.name);
        }
    }

    let mut report = CaseReport::new(
        &planned.project.name,
        planned.check,
        Outcome::from_attempts(&attempts),
        start.elapsed().as_millis() as u64,
        attempts,
    );
    report.order = planned.order;
    log_case(config, &report);
    report
}

async fn run_attempt(
    config: &HarnessConfig,
    browser: &BrowserAccess,
    planned: &PlannedCase,
    options: &CheckOptions,
    retry: u32,
) -> AttemptResult {
    let started_at = Utc::now();
    let start = Instant::now();
    let plan = CapturePlan::for_attempt(config, retry);

    let page = Page::new(
        PageOptions::for_project(config, &planned.project, plan.trace),
        browser.clone(),
    );

    let outcome = match &page {
        Ok(page) => run_with_timeout(config.timeout, planned.check, page, options).await,
        Err(e) => Err(CaseFailure::Request(e.to_string())),
    };

    let (status, error, skip_reason) = match &outcome {
        Ok(Completion::Passed) => (AttemptStatus::Passed, None, None),
        Ok(Completion::Skipped(reason)) => (AttemptStatus::Skipped, None, Some(reason.clone())),
        Err(f @ CaseFailure::Timeout(_)) => (AttemptStatus::TimedOut, Some(ErrorInfo::from(f)), None),
        Err(f) => (AttemptStatus::Failed, Some(ErrorInfo::from(f)), None),
    };

    let failed = matches!(status, AttemptStatus::Failed | AttemptStatus::TimedOut);
    let attachments = artifacts::collect(
        config,
        &planned.project,
        planned.check,
        retry,
        failed,
        page.as_ref().ok(),
        browser,
    )
    .await;

    AttemptResult {
        retry,
        status,
        started_at,
        duration_ms: start.elapsed().as_millis() as u64,
        error,
        skip_reason,
        attachments,
    }
}

async fn run_with_timeout(
    timeout: Duration,
    check: Check,
    page: &Page,
    options: &CheckOptions,
) -> Result<Completion, CaseFailure> {
    match tokio::time::timeout(timeout, check.run(page, options)).await {
        Ok(result) => result,
        Err(_) => Err(CaseFailure::Timeout(timeout)),
    }
}

fn log_case(config: &HarnessConfig, report: &CaseReport) {
    let listed = config
        .reporters
        .iter()
        .any(|r| matches!(r, ReporterConfig::List));
    let line = format!("[{}] › {}", report.project, report.check.full_title());

    match report.outcome {
        Outcome::Expected if listed => info!("✓ {} ({} ms)", line, report.duration_ms),
        Outcome::Flaky if listed => warn!(
            "✓ {} ({} ms, flaky after {} attempts)",
            line,
            report.duration_ms,
            report.attempts.len()
        ),
        Outcome::Skipped if listed => info!("- {}", line),
        Outcome::Unexpected => error!(
            "✗ {} - {}",
            line,
            report
                .last_error()
                .map(|e| e.message.as_str())
                .unwrap_or("unknown error")
        ),
        _ => debug!("{} {:?}", line, report.outcome),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, FileConfig, Overrides};

    fn runner(toml: &str, overrides: Overrides) -> TestRunner {
        let file = FileConfig::from_toml(toml).unwrap();
        let config = HarnessConfig::resolve(file, &Environment::default(), overrides).unwrap();
        TestRunner::new(config).with_browser(BrowserAccess::disabled())
    }

    #[test]
    fn test_plan_covers_every_project() {
        let runner = runner("[web_server]\nenabled = false\n", Overrides::default());
        let plan = runner.plan();
        assert_eq!(plan.len(), 5 * 15);
        assert_eq!(plan[0].project.name, "chromium");
        assert_eq!(plan[0].check, Check::HomepageLoads);
        assert_eq!(plan[74].project.name, "Mobile Safari");
        assert_eq!(plan[74].check, Check::CacheHealth);
    }

    #[test]
    fn test_plan_filters() {
        let runner = runner(
            "[web_server]\nenabled = false\n",
            Overrides {
                grep: Some("Health Checks".to_string()),
                projects: vec!["webkit".to_string()],
                ..Default::default()
            },
        );
        let plan = runner.plan();
        assert_eq!(plan.len(), 5);
        assert!(plan.iter().all(|c| c.project.name == "webkit"));
        assert!(plan.iter().all(|c| c.check.suite() == SuiteId::Health));
    }

    #[test]
    fn test_sequential_units_group_by_suite() {
        let runner = runner(
            "fully_parallel = false\n[web_server]\nenabled = false\n",
            Overrides::default(),
        );
        let units = runner.work_units(runner.plan());
        // two suites per project
        assert_eq!(units.len(), 10);
        assert_eq!(units[0].len(), 10);
        assert_eq!(units[1].len(), 5);
    }

    #[test]
    fn test_outcome_from_attempts() {
        let attempt = |status| AttemptResult {
            retry: 0,
            status,
            started_at: Utc::now(),
            duration_ms: 1,
            error: None,
            skip_reason: None,
            attachments: vec![],
        };
        assert_eq!(Outcome::from_attempts(&[attempt(AttemptStatus::Passed)]), Outcome::Expected);
        assert_eq!(
            Outcome::from_attempts(&[attempt(AttemptStatus::Failed), attempt(AttemptStatus::Passed)]),
            Outcome::Flaky
        );
        assert_eq!(
            Outcome::from_attempts(&[attempt(AttemptStatus::Failed), attempt(AttemptStatus::TimedOut)]),
            Outcome::Unexpected
        );
        assert_eq!(Outcome::from_attempts(&[attempt(AttemptStatus::Skipped)]), Outcome::Skipped);
    }
}
