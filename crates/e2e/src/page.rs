//! Page session: an HTTP client dressed up as one device profile
//!
//! Every case attempt gets a fresh [`Page`] so nothing (cookies, viewport,
//! trace) leaks between cases. Navigations resolve against the configured
//! base URL, follow redirects hop by hop, and come back as [`Response`]
//! snapshots owned by the caller.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant, SystemTime};
use tracing::debug;
use url::Url;

use crate::browser::{BrowserAccess, ContextOptions};
use crate::config::{HarnessConfig, Project};
use crate::devices::{Device, Viewport};
use crate::error::{E2eError, E2eResult};
use crate::html::Document;

const MAX_REDIRECTS: usize = 20;
const TRACE_BODY_PREVIEW: usize = 2048;

/// Snapshot of one HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    /// Final URL after redirects
    pub url: Url,
    pub status: u16,
    /// Header names lower-cased; repeated headers joined
    pub headers: BTreeMap<String, String>,
    pub body: String,
    /// Time from the first request to the last body byte
    pub elapsed: Duration,
}

impl Response {
    /// 2xx status
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn json(&self) -> E2eResult<serde_json::Value> {
        serde_json::from_str(&self.body).map_err(E2eError::from)
    }

    pub fn document(&self) -> Document {
        Document::parse(&self.body)
    }
}

/// A cookie held by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
}

/// One request/response pair, recorded for traces
#[derive(Debug, Clone, Serialize)]
pub struct Exchange {
    pub started_at: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub status: Option<u16>,
    pub response_headers: BTreeMap<String, String>,
    pub elapsed_ms: u64,
    pub body_preview: Option<String>,
    pub error: Option<String>,
}

/// Settings a page is built from
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub base_url: Url,
    pub device: &'static Device,
    pub extra_http_headers: BTreeMap<String, String>,
    pub navigation_timeout: Duration,
    pub record_trace: bool,
}

impl PageOptions {
    pub fn for_project(config: &HarnessConfig, project: &Project, record_trace: bool) -> Self {
        Self {
            base_url: config.use_options.base_url.clone(),
            device: project.device,
            extra_http_headers: config.use_options.extra_http_headers.clone(),
            navigation_timeout: config.use_options.navigation_timeout,
            record_trace,
        }
    }
}

pub struct Page {
    client: reqwest::Client,
    options: PageOptions,
    viewport: Mutex<Viewport>,
    cookies: Mutex<Vec<Cookie>>,
    trace: Mutex<Vec<Exchange>>,
    browser: BrowserAccess,
}

impl Page {
    pub fn new(options: PageOptions, browser: BrowserAccess) -> E2eResult<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &options.extra_http_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| E2eError::Config(format!("header {name:?}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| E2eError::Config(format!("header value {value:?}: {e}")))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(options.device.user_agent)
            .default_headers(headers)
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .timeout(options.navigation_timeout)
            .build()?;

        Ok(Self {
            client,
            viewport: Mutex::new(options.device.viewport),
            options,
            cookies: Mutex::new(Vec::new()),
            trace: Mutex::new(Vec::new()),
            browser,
        })
    }

    pub fn device(&self) -> &'static Device {
        self.options.device
    }

    pub fn base_url(&self) -> &Url {
        &self.options.base_url
    }

    /// Resolve a navigation target against the base URL
    pub fn resolve(&self, target: &str) -> E2eResult<Url> {
        self.options.base_url.join(target).map_err(E2eError::from)
    }

    /// Navigate to `target` and return the final response
    pub async fn goto(&self, target: &str) -> E2eResult<Response> {
        let url = self.resolve(target)?;
        self.fetch(url).await
    }

    /// API request through the session's cookies and headers
    pub async fn get(&self, target: &str) -> E2eResult<Response> {
        let url = self.resolve(target)?;
        self.fetch(url).await
    }

    /// Fetch an absolute URL, following redirects
    pub async fn fetch(&self, url: Url) -> E2eResult<Response> {
        let started = Instant::now();
        let mut current = url.clone();

        for _ in 0..=MAX_REDIRECTS {
            let hop_started_at = Utc::now();
            let hop_start = Instant::now();
            debug!("GET {}", current);

            let resp = match self.client.get(current.clone()).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    self.record(Exchange {
                        started_at: hop_started_at,
                        method: "GET".to_string(),
                        url: current.to_string(),
                        status: None,
                        response_headers: BTreeMap::new(),
                        elapsed_ms: hop_start.elapsed().as_millis() as u64,
                        body_preview: None,
                        error: Some(e.to_string()),
                    });
                    return Err(if e.is_timeout() {
                        E2eError::Timeout(current.to_string())
                    } else {
                        E2eError::Navigation {
                            url: current.to_string(),
                            reason: e.to_string(),
                        }
                    });
                }
            };

            self.remember_cookies(&resp, &current);
            let status = resp.status();
            let headers = collect_headers(resp.headers());

            if status.is_redirection() {
                if let Some(location) = resp.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
                    let next = current.join(location)?;
                    self.record(Exchange {
                        started_at: hop_started_at,
                        method: "GET".to_string(),
                        url: current.to_string(),
                        status: Some(status.as_u16()),
                        response_headers: headers,
                        elapsed_ms: hop_start.elapsed().as_millis() as u64,
                        body_preview: None,
                        error: None,
                    });
                    current = next;
                    continue;
                }
            }

            let body = resp.text().await?;
            self.record(Exchange {
                started_at: hop_started_at,
                method: "GET".to_string(),
                url: current.to_string(),
                status: Some(status.as_u16()),
                response_headers: headers.clone(),
                elapsed_ms: hop_start.elapsed().as_millis() as u64,
                body_preview: Some(body.chars().take(TRACE_BODY_PREVIEW).collect()),
                error: None,
            });

            return Ok(Response {
                url: current,
                status: status.as_u16(),
                headers,
                body,
                elapsed: started.elapsed(),
            });
        }

        Err(E2eError::TooManyRedirects(url.to_string()))
    }

    fn remember_cookies(&self, resp: &reqwest::Response, url: &Url) {
        let mut jar = self.cookies.lock();
        for c in resp.cookies() {
            let cookie = Cookie {
                name: c.name().to_string(),
                value: c.value().to_string(),
                domain: c
                    .domain()
                    .map(|d| d.trim_start_matches('.').to_string())
                    .or_else(|| url.host_str().map(String::from))
                    .unwrap_or_default(),
                path: c.path().unwrap_or("/").to_string(),
                http_only: c.http_only(),
                secure: c.secure(),
            };
            jar.retain(|k| {
                !(k.name == cookie.name && k.domain == cookie.domain && k.path == cookie.path)
            });
            // an already expired cookie is a deletion
            if !is_expired(&c) {
                jar.push(cookie);
            }
        }
    }

    fn record(&self, exchange: Exchange) {
        if self.options.record_trace {
            self.trace.lock().push(exchange);
        }
    }

    /// Cookies the session currently holds
    pub fn cookies(&self) -> Vec<Cookie> {
        self.cookies.lock().clone()
    }

    pub fn set_viewport_size(&self, width: u32, height: u32) {
        *self.viewport.lock() = Viewport { width, height };
    }

    pub fn viewport(&self) -> Viewport {
        *self.viewport.lock()
    }

    pub fn browser(&self) -> &BrowserAccess {
        &self.browser
    }

    /// Browser context matching this page's device, headers and viewport
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            engine: self.options.device.engine,
            viewport: self.viewport(),
            user_agent: self.options.device.user_agent.to_string(),
            device_scale_factor: self.options.device.device_scale_factor,
            is_mobile: self.options.device.is_mobile,
            has_touch: self.options.device.has_touch,
            extra_http_headers: self.options.extra_http_headers.clone(),
            navigation_timeout: self.options.navigation_timeout,
            record_video_dir: None,
        }
    }

    /// Recorded exchanges, oldest first
    pub fn take_trace(&self) -> Vec<Exchange> {
        std::mem::take(&mut *self.trace.lock())
    }
}

fn is_expired(cookie: &reqwest::cookie::Cookie<'_>) -> bool {
    if let Some(max_age) = cookie.max_age() {
        return max_age.is_zero();
    }
    cookie
        .expires()
        .is_some_and(|expires| expires <= SystemTime::now())
}

fn collect_headers(map: &HeaderMap) -> BTreeMap<String, String> {
    let mut headers: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in map {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        let separator = if name == reqwest::header::SET_COOKIE { "\n" } else { ", " };
        headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(separator);
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    headers
}
