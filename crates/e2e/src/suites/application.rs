//! Application suite: page rendering, error pages, headers, session and API

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::browser::BrowserAccess;
use crate::error::CaseFailure;
use crate::expect::{
    expect_at_most, expect_contains, expect_eq, expect_matches, expect_property, expect_truthy,
    fail, CheckResult, Completion,
};
use crate::page::Page;
use crate::suites::CheckOptions;

pub const MISSING_PAGE: &str = "/non-existent-page";
pub const MOBILE_WIDTH: u32 = 375;
pub const MOBILE_HEIGHT: u32 = 667;
pub const CONCURRENT_REQUESTS: usize = 5;
const XSS_PROTECTION: &str = "1; mode=block";

static TITLE_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new("Laravel").expect("valid regex"));

pub async fn homepage_loads(page: &Page) -> CheckResult {
    let response = page.goto("/").await?;
    if !response.ok() {
        return Err(fail("GET / to succeed", "a 2xx status", response.status));
    }

    let doc = response.document();
    let title = doc.title().unwrap_or_default();
    expect_matches("page title", &title, &TITLE_PATTERN)?;
    expect_contains("body text", &doc.body_text(), "Laravel")?;
    Ok(Completion::Passed)
}

pub async fn not_found_page(page: &Page) -> CheckResult {
    let response = page.goto(MISSING_PAGE).await?;
    expect_eq("status of a missing page", response.status, 404)?;

    let text = response.document().body_text().to_lowercase();
    expect_contains("lower-cased body text", &text, "not found")?;
    Ok(Completion::Passed)
}

pub async fn meta_tags(page: &Page) -> CheckResult {
    let response = page.goto("/").await?;
    let doc = response.document();

    if !doc.has_meta("viewport") {
        return Err(fail("meta[name=\"viewport\"] to exist", "an element", "none"));
    }
    let viewport = doc.meta_content("viewport").unwrap_or_default();
    expect_contains("viewport meta content", viewport, "width=device-width")?;

    expect_truthy("csrf-token meta content", doc.meta_content("csrf-token"))?;
    Ok(Completion::Passed)
}

/// Every `.css`/`.js` response observed while loading `/` must be a 200.
/// Requests that never produce a response are not observed.
pub async fn assets_load(page: &Page, options: &CheckOptions) -> CheckResult {
    let response = page.goto("/").await?;
    let assets: Vec<_> = response
        .document()
        .subresources(&response.url)
        .into_iter()
        .filter(|u| u.as_str().contains(".css") || u.as_str().contains(".js"))
        .collect();

    let observed = join_all(assets.iter().cloned().map(|url| page.fetch(url))).await;

    let mut responses = Vec::new();
    for (url, result) in assets.iter().zip(observed) {
        match result {
            Ok(r) => responses.push(r),
            Err(e) => warn!("asset {} produced no response: {}", url, e),
        }
    }

    if responses.is_empty() {
        if options.require_asset_match {
            return Err(fail("CSS/JS assets requested by /", "at least one", "none"));
        }
        debug!("no CSS/JS responses observed on /");
    }

    for r in &responses {
        expect_eq(&format!("status of asset {}", r.url), r.status, 200)?;
    }
    Ok(Completion::Passed)
}

pub async fn mobile_layout(page: &Page) -> CheckResult {
    page.set_viewport_size(MOBILE_WIDTH, MOBILE_HEIGHT);

    let playwright = match page.browser() {
        BrowserAccess::Ready(pw) => pw.clone(),
        BrowserAccess::Unavailable { required: false, reason } => {
            return Ok(Completion::Skipped(format!("needs a browser: {reason}")));
        }
        BrowserAccess::Unavailable { required: true, reason } => {
            return Err(CaseFailure::Browser(reason.clone()));
        }
    };

    let url = page.resolve("/")?;
    let metrics = playwright.probe_layout(&url, &page.context_options()).await?;

    expect_eq("body visibility", metrics.visible, true)?;
    expect_at_most(
        "document scroll width",
        metrics.scroll_width,
        metrics.client_width + 1,
    )?;
    Ok(Completion::Passed)
}

/// Only the first form's `_token` is checked, and only when it exists
pub async fn form_csrf(page: &Page) -> CheckResult {
    let response = page.goto("/").await?;
    let forms = response.document().forms();

    if let Some(first) = forms.first() {
        if let Some(token) = first.input("_token") {
            expect_truthy("value of the first form's _token input", token.attr("value"))?;
        }
    }
    Ok(Completion::Passed)
}

pub async fn security_headers(page: &Page) -> CheckResult {
    let response = page.goto("/").await?;

    for header in ["x-frame-options", "x-content-type-options"] {
        if response.header(header).is_none() {
            return Err(fail("response headers", format!("header {header:?}"), "missing"));
        }
    }

    if let Some(value) = response.header("x-xss-protection").filter(|v| !v.is_empty()) {
        expect_eq("x-xss-protection header", value, XSS_PROTECTION)?;
    }
    Ok(Completion::Passed)
}

pub async fn api_health(page: &Page) -> CheckResult {
    let response = page.get("/api/health").await?;
    expect_eq("status of GET /api/health", response.status, 200)?;

    let body = response
        .json()
        .map_err(|e| fail("GET /api/health body", "valid JSON", e))?;
    expect_property("GET /api/health body", &body, "status")?;
    Ok(Completion::Passed)
}

pub async fn session_cookie(page: &Page) -> CheckResult {
    page.goto("/").await?;

    let cookies = page.cookies();
    let session = cookies
        .iter()
        .find(|c| c.name.contains("session") || c.name.contains("laravel"));

    if let Some(cookie) = session {
        expect_truthy(&format!("value of cookie {}", cookie.name), Some(cookie.value.as_str()))?;
        expect_eq(&format!("httpOnly flag of cookie {}", cookie.name), cookie.http_only, true)?;
    }
    Ok(Completion::Passed)
}

pub async fn concurrent_requests(page: &Page) -> CheckResult {
    let requests = (0..CONCURRENT_REQUESTS).map(|_| page.get("/health"));
    let responses = join_all(requests).await;

    for (i, response) in responses.into_iter().enumerate() {
        let response = response?;
        expect_eq(
            &format!("status of concurrent GET /health #{}", i + 1),
            response.status,
            200,
        )?;
    }
    Ok(Completion::Passed)
}
