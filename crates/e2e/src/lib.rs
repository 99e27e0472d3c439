//! Laravel E2E acceptance harness
//!
//! This crate runs a fixed acceptance suite against a Laravel application:
//! - Boots (or reuses) the local server unless running under CI
//! - Runs every case once per configured device project
//! - Uses an HTTP page session for request/response checks and drives
//!   Playwright through generated Node scripts for browser-only checks
//! - Retries failing cases and writes list, HTML, JSON and JUnit reports
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  E2E Test Runner (Rust)                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  HarnessConfig  (harness.toml + CI/BASE_URL + CLI flags)    │
//! │  TestRunner                                                 │
//! │    ├── start_server() -> WebServer                          │
//! │    ├── plan() -> projects × suites × checks                 │
//! │    ├── run() -> RunReport   (workers, retries, timeout)     │
//! │    └── write_reports()  list | html | json | junit          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Check::run(page)                                           │
//! │    ├── Page      HTTP session emulating the device          │
//! │    ├── Document  title, meta, forms, sub-resources          │
//! │    └── Playwright  layout probe, screenshot, video          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod artifacts;
pub mod browser;
pub mod config;
pub mod devices;
pub mod error;
pub mod expect;
pub mod html;
pub mod page;
pub mod report;
pub mod runner;
pub mod server;
pub mod suites;

pub use browser::{BrowserAccess, Playwright};
pub use config::{Environment, FileConfig, HarnessConfig, Overrides};
pub use error::{CaseFailure, E2eError, E2eResult};
pub use runner::{Outcome, RunReport, TestRunner};
pub use suites::{Check, SuiteId};
