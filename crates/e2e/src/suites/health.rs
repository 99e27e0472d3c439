//! Health suite: `/health` shape, headers, timing and subsystem status

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::expect::{
    expect_contains, expect_eq, expect_less_than, expect_property, fail, is_truthy, CheckResult,
    Completion,
};
use crate::error::CaseFailure;
use crate::page::Page;

pub const HEALTH_PATH: &str = "/health";
pub const HEALTHY: &str = "healthy";
pub const RESPONSE_BUDGET: Duration = Duration::from_millis(1000);

/// Body of `GET /health` as the application reports it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: Value,
    pub services: BTreeMap<String, ServiceHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(flatten)]
    pub details: BTreeMap<String, Value>,
}

impl HealthReport {
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value.clone())
    }

    fn service_healthy(&self, name: &str) -> Option<bool> {
        self.services.get(name).map(|s| s.status == HEALTHY)
    }

    /// Database is mandatory
    pub fn database_healthy(&self) -> bool {
        self.service_healthy("database").unwrap_or(false)
    }

    /// Cache is optional: absent counts as fine
    pub fn cache_ok(&self) -> bool {
        self.service_healthy("cache").unwrap_or(true)
    }

    /// Top-level status the subsystems justify
    pub fn expected_status(&self) -> &'static str {
        if self.database_healthy() && self.cache_ok() {
            HEALTHY
        } else {
            "unhealthy"
        }
    }

    /// Top-level status agrees with the subsystems
    pub fn is_consistent(&self) -> bool {
        (self.status == HEALTHY) == (self.expected_status() == HEALTHY)
    }
}

async fn health_json(page: &Page) -> Result<Value, CaseFailure> {
    let response = page.goto(HEALTH_PATH).await?;
    response
        .json()
        .map_err(|e| fail("GET /health body", "valid JSON", e))
}

pub async fn healthy_status(page: &Page) -> CheckResult {
    let response = page.goto(HEALTH_PATH).await?;
    expect_eq("status of GET /health", response.status, 200)?;
    expect_contains("GET /health body", &response.document().body_text(), HEALTHY)?;
    Ok(Completion::Passed)
}

pub async fn response_headers(page: &Page) -> CheckResult {
    let response = page.goto(HEALTH_PATH).await?;
    let content_type = response.header("content-type").unwrap_or_default();
    expect_contains("content-type of GET /health", content_type, "application/json")?;

    let start = Instant::now();
    page.goto(HEALTH_PATH).await?;
    let elapsed = start.elapsed();
    expect_less_than(
        "GET /health round trip in ms",
        elapsed.as_millis(),
        RESPONSE_BUDGET.as_millis(),
    )?;
    Ok(Completion::Passed)
}

pub async fn system_information(page: &Page) -> CheckResult {
    let body = health_json(page).await?;

    for field in ["status", "timestamp", "services"] {
        expect_property("GET /health body", &body, field)?;
    }
    expect_eq("health status", body["status"].as_str(), Some(HEALTHY))?;

    match HealthReport::from_value(&body) {
        Ok(report) if !report.is_consistent() => warn!(
            "health status {:?} disagrees with its subsystems (expected {:?})",
            report.status,
            report.expected_status()
        ),
        Ok(_) => {}
        Err(e) => warn!("health body does not match the report model: {}", e),
    }
    Ok(Completion::Passed)
}

pub async fn database_connectivity(page: &Page) -> CheckResult {
    let body = health_json(page).await?;
    let services = expect_property("GET /health body", &body, "services")?;
    let database = expect_property("health services", services, "database")?;
    expect_eq("database status", database["status"].as_str(), Some(HEALTHY))?;
    Ok(Completion::Passed)
}

/// Cache is optional; only a reported cache has to be healthy
pub async fn cache_connectivity(page: &Page) -> CheckResult {
    let body = health_json(page).await?;
    let services = match body.get("services") {
        Some(services) if services.is_object() => services,
        Some(other) => return Err(fail("health services", "an object", other)),
        None => return Err(fail("GET /health body", "property \"services\"", "none")),
    };

    if let Some(cache) = services.get("cache").filter(|c| is_truthy(c)) {
        expect_eq("cache status", cache["status"].as_str(), Some(HEALTHY))?;
    }
    Ok(Completion::Passed)
}
