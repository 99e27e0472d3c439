//! The assertion suites
//!
//! Every case is an independent, stateless check against one page or
//! endpoint. Cases never share a page, so they can run in any order and in
//! parallel.

pub mod application;
pub mod health;

use serde::Serialize;

use crate::config::HarnessConfig;
use crate::expect::CheckResult;
use crate::page::Page;

/// A group of related checks, reported as one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteId {
    Application,
    Health,
}

impl SuiteId {
    pub const ALL: [SuiteId; 2] = [SuiteId::Application, SuiteId::Health];

    pub fn title(&self) -> &'static str {
        match self {
            SuiteId::Application => "Laravel Application Tests",
            SuiteId::Health => "Application Health Checks",
        }
    }

    /// File name the suite is reported under, relative to `test_dir`
    pub fn file(&self) -> &'static str {
        match self {
            SuiteId::Application => "application.spec",
            SuiteId::Health => "health.spec",
        }
    }

    pub fn checks(&self) -> &'static [Check] {
        match self {
            SuiteId::Application => &[
                Check::HomepageLoads,
                Check::NotFoundPage,
                Check::MetaTags,
                Check::AssetsLoad,
                Check::MobileLayout,
                Check::FormCsrf,
                Check::SecurityHeaders,
                Check::ApiHealth,
                Check::SessionCookie,
                Check::ConcurrentRequests,
            ],
            SuiteId::Health => &[
                Check::HealthStatus,
                Check::HealthHeaders,
                Check::HealthSystemInfo,
                Check::DatabaseHealth,
                Check::CacheHealth,
            ],
        }
    }
}

/// Per-run knobs a check may consult
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Fail the asset check when the page references no CSS/JS at all
    pub require_asset_match: bool,
}

impl From<&HarnessConfig> for CheckOptions {
    fn from(config: &HarnessConfig) -> Self {
        Self {
            require_asset_match: config.require_asset_match,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    HomepageLoads,
    NotFoundPage,
    MetaTags,
    AssetsLoad,
    MobileLayout,
    FormCsrf,
    SecurityHeaders,
    ApiHealth,
    SessionCookie,
    ConcurrentRequests,
    HealthStatus,
    HealthHeaders,
    HealthSystemInfo,
    DatabaseHealth,
    CacheHealth,
}

impl Check {
    pub fn suite(&self) -> SuiteId {
        match self {
            Check::HealthStatus
            | Check::HealthHeaders
            | Check::HealthSystemInfo
            | Check::DatabaseHealth
            | Check::CacheHealth => SuiteId::Health,
            _ => SuiteId::Application,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Check::HomepageLoads => "should load homepage successfully",
            Check::NotFoundPage => "should handle 404 pages gracefully",
            Check::MetaTags => "should have proper meta tags",
            Check::AssetsLoad => "should load CSS and JS assets",
            Check::MobileLayout => "should be responsive on mobile devices",
            Check::FormCsrf => "should handle form submissions",
            Check::SecurityHeaders => "should have proper security headers",
            Check::ApiHealth => "should handle API endpoints",
            Check::SessionCookie => "should maintain session across requests",
            Check::ConcurrentRequests => "should handle concurrent requests",
            Check::HealthStatus => "should return healthy status",
            Check::HealthHeaders => "should have proper response headers",
            Check::HealthSystemInfo => "should include system information",
            Check::DatabaseHealth => "should check database connectivity",
            Check::CacheHealth => "should check cache connectivity",
        }
    }

    /// "suite › title", the string `--grep` matches against
    pub fn full_title(&self) -> String {
        format!("{} › {}", self.suite().title(), self.title())
    }

    /// Page the check is about; used for failure screenshots
    pub fn target(&self) -> &'static str {
        match self {
            Check::NotFoundPage => application::MISSING_PAGE,
            Check::ApiHealth => "/api/health",
            Check::ConcurrentRequests
            | Check::HealthStatus
            | Check::HealthHeaders
            | Check::HealthSystemInfo
            | Check::DatabaseHealth
            | Check::CacheHealth => "/health",
            _ => "/",
        }
    }

    pub async fn run(self, page: &Page, options: &CheckOptions) -> CheckResult {
        match self {
            Check::HomepageLoads => application::homepage_loads(page).await,
            Check::NotFoundPage => application::not_found_page(page).await,
            Check::MetaTags => application::meta_tags(page).await,
            Check::AssetsLoad => application::assets_load(page, options).await,
            Check::MobileLayout => application::mobile_layout(page).await,
            Check::FormCsrf => application::form_csrf(page).await,
            Check::SecurityHeaders => application::security_headers(page).await,
            Check::ApiHealth => application::api_health(page).await,
            Check::SessionCookie => application::session_cookie(page).await,
            Check::ConcurrentRequests => application::concurrent_requests(page).await,
            Check::HealthStatus => health::healthy_status(page).await,
            Check::HealthHeaders => health::response_headers(page).await,
            Check::HealthSystemInfo => health::system_information(page).await,
            Check::DatabaseHealth => health::database_connectivity(page).await,
            Check::CacheHealth => health::cache_connectivity(page).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_check_belongs_to_its_suite() {
        for suite in SuiteId::ALL {
            for check in suite.checks() {
                assert_eq!(check.suite(), suite, "{check:?}");
            }
        }
        assert_eq!(SuiteId::Application.checks().len(), 10);
        assert_eq!(SuiteId::Health.checks().len(), 5);
    }

    #[test]
    fn test_full_title() {
        assert_eq!(
            Check::DatabaseHealth.full_title(),
            "Application Health Checks › should check database connectivity"
        );
    }
}
