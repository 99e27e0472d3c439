//! In-process fake of the Laravel application under test

#![allow(dead_code)]

use axum::extract::State;
use axum::http::header::{
    HeaderValue, LOCATION, SET_COOKIE, X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use laravel_e2e::{Environment, FileConfig, HarnessConfig, Overrides};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheState {
    #[default]
    Healthy,
    Down,
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewportMeta {
    #[default]
    Responsive,
    Fixed,
    Missing,
}

/// How the fake application misbehaves
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub database_down: bool,
    /// Answer `/health` with 200 even when a service is down
    pub degraded_health_ok: bool,
    /// `/health` reports `"services": null`
    pub null_services: bool,
    /// Zero-based `/health` call answered with 500
    pub failing_health_call: Option<usize>,
    pub cache: CacheState,
    pub missing_security_headers: bool,
    pub insecure_session_cookie: bool,
    pub broken_asset: bool,
    /// Unknown pages answer 200 instead of 404
    pub missing_page_ok: bool,
    /// 404 page without any "not found" wording
    pub terse_missing_page: bool,
    pub viewport_meta: ViewportMeta,
    pub empty_csrf_meta: bool,
    pub empty_form_token: bool,
    /// Home page without stylesheet or script tags
    pub no_assets: bool,
    /// Replaces the `x-xss-protection` value
    pub xss_protection: Option<&'static str>,
    pub slow_health: Option<Duration>,
    /// Number of initial `/api/health` calls answered with 500
    pub api_failures: usize,
}

struct AppState {
    scenario: Scenario,
    api_calls: AtomicUsize,
    health_calls: AtomicUsize,
}

pub struct FakeApp {
    pub addr: SocketAddr,
    state: Arc<AppState>,
}

impl FakeApp {
    pub async fn spawn(scenario: Scenario) -> Self {
        let state = Arc::new(AppState {
            scenario,
            api_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
        });

        let app = Router::new()
            .route("/", get(home))
            .route("/redirect", get(redirect))
            .route("/logout", get(logout))
            .route("/css/app.css", get(stylesheet))
            .route("/js/app.js", get(script))
            .route("/health", get(health))
            .route("/api/health", get(api_health))
            .fallback(not_found)
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> usize {
        self.state.api_calls.load(Ordering::SeqCst)
    }

    /// Configuration pointing at this app: no server boot, no browser, one
    /// desktop project, reports under `dir`
    pub fn config(&self, dir: &Path, top_level: &str, overrides: Overrides) -> HarnessConfig {
        let toml = format!(
            r#"
{top_level}
output_dir = "{dir}/test-results"
reporter = [
  {{ kind = "list" }},
  {{ kind = "html", output_folder = "{dir}/report" }},
  {{ kind = "json", output_file = "{dir}/results.json" }},
  {{ kind = "junit", output_file = "{dir}/results.xml" }},
]

[use]
base_url = "{base}"

[web_server]
enabled = false

[browser]
mode = "off"
"#,
            dir = dir.display(),
            base = self.base_url(),
        );
        let file = FileConfig::from_toml(&toml).unwrap();
        HarnessConfig::resolve(file, &Environment::default(), overrides).unwrap()
    }
}

/// Restrict a run to the chromium project
pub const CHROMIUM_ONLY: &str = r#"projects = [{ name = "chromium", device = "Desktop Chrome" }]"#;

/// Links with `alternate`/`canonical` rel point at routes that 404; a
/// browser never requests them
fn home_page(scenario: &Scenario) -> String {
    let viewport = match scenario.viewport_meta {
        ViewportMeta::Responsive => {
            r#"<meta name="viewport" content="width=device-width, initial-scale=1">"#
        }
        ViewportMeta::Fixed => r#"<meta name="viewport" content="width=1024">"#,
        ViewportMeta::Missing => "",
    };
    let csrf = if scenario.empty_csrf_meta { "" } else { "k3Yb1xv0" };
    let token = if scenario.empty_form_token { "" } else { "k3Yb1xv0" };
    let assets = if scenario.no_assets {
        ""
    } else {
        r#"<link rel="stylesheet" href="/css/app.css">
    <script src="/js/app.js" defer></script>"#
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    {viewport}
    <meta name="csrf-token" content="{csrf}">
    <title>Laravel &amp; Friends</title>
    <link rel="canonical" href="/docs/install.jsp">
    <link rel="alternate" type="application/json+oembed" href="/oembed.json?url=home">
    {assets}
</head>
<body>
    <h1>Welcome to Laravel</h1>
    <form method="POST" action="/contact">
        <input type="hidden" name="_token" value="{token}">
        <input type="text" name="email">
    </form>
    <form method="GET" action="/search">
        <input type="hidden" name="_token" value="">
    </form>
</body>
</html>
"#
    )
}

async fn home(State(state): State<Arc<AppState>>) -> Response {
    let scenario = &state.scenario;
    let mut headers = HeaderMap::new();
    if !scenario.missing_security_headers {
        headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));
        headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        let xss = scenario.xss_protection.unwrap_or("1; mode=block");
        headers.insert(X_XSS_PROTECTION, HeaderValue::from_static(xss));
    }
    let cookie = if scenario.insecure_session_cookie {
        "laravel_session=s3ss10n; Path=/"
    } else {
        "laravel_session=s3ss10n; Path=/; HttpOnly"
    };
    headers.insert(SET_COOKIE, HeaderValue::from_static(cookie));
    (headers, Html(home_page(scenario))).into_response()
}

async fn redirect() -> Response {
    let mut headers = HeaderMap::new();
    headers.insert(LOCATION, HeaderValue::from_static("/"));
    headers.insert(SET_COOKIE, HeaderValue::from_static("XSRF-TOKEN=hop; Path=/"));
    (StatusCode::FOUND, headers).into_response()
}

/// Deletes the session cookie both ways servers do it
async fn logout() -> Response {
    let mut headers = HeaderMap::new();
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("laravel_session=deleted; Max-Age=0; Path=/; HttpOnly"),
    );
    headers.append(
        SET_COOKIE,
        HeaderValue::from_static("XSRF-TOKEN=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Path=/"),
    );
    (headers, Html("<html><body>Bye from Laravel</body></html>")).into_response()
}

async fn stylesheet() -> impl IntoResponse {
    ([("content-type", "text/css")], "body { margin: 0; }")
}

async fn script(State(state): State<Arc<AppState>>) -> Response {
    if state.scenario.broken_asset {
        return (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response();
    }
    ([("content-type", "application/javascript")], "console.log('ok');").into_response()
}

async fn health(State(state): State<Arc<AppState>>) -> Response {
    let scenario = &state.scenario;
    let call = state.health_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(delay) = scenario.slow_health {
        tokio::time::sleep(delay).await;
    }
    if scenario.failing_health_call == Some(call) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "Server Error" })))
            .into_response();
    }
    if scenario.null_services {
        return Json(json!({ "status": "healthy", "timestamp": "t", "services": null }))
            .into_response();
    }

    let database = if scenario.database_down { "unhealthy" } else { "healthy" };
    let mut services = json!({ "database": { "status": database, "connection": "mysql" } });
    match scenario.cache {
        CacheState::Healthy => services["cache"] = json!({ "status": "healthy", "driver": "redis" }),
        CacheState::Down => services["cache"] = json!({ "status": "unhealthy", "driver": "redis" }),
        CacheState::Absent => {}
    }
    let overall = if scenario.database_down || scenario.cache == CacheState::Down {
        "unhealthy"
    } else {
        "healthy"
    };
    let status = if overall == "healthy" || scenario.degraded_health_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": overall,
            "timestamp": "2026-10-16T12:00:00+00:00",
            "services": services,
        })),
    )
        .into_response()
}

async fn api_health(State(state): State<Arc<AppState>>) -> Response {
    let call = state.api_calls.fetch_add(1, Ordering::SeqCst);
    if call < state.scenario.api_failures {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "message": "Server Error" })))
            .into_response();
    }
    Json(json!({ "status": "ok" })).into_response()
}

async fn not_found(State(state): State<Arc<AppState>>) -> Response {
    let scenario = &state.scenario;
    if scenario.missing_page_ok {
        return Html("<html><body>Welcome to Laravel</body></html>").into_response();
    }
    let body = if scenario.terse_missing_page {
        "<html><head><title>Oops</title></head><body><div>404 | Page missing</div></body></html>"
    } else {
        "<html><head><title>Not Found</title></head><body><div>404 | Not Found</div></body></html>"
    };
    (StatusCode::NOT_FOUND, Html(body)).into_response()
}
