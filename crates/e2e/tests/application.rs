//! Application suite checks against the in-process fake application

mod common;

use common::{FakeApp, Scenario, ViewportMeta};
use laravel_e2e::browser::BrowserAccess;
use laravel_e2e::expect::{CheckResult, Completion};
use laravel_e2e::page::{Page, PageOptions};
use laravel_e2e::suites::CheckOptions;
use laravel_e2e::{devices, CaseFailure, Check, SuiteId};
use std::collections::BTreeMap;
use std::time::Duration;
use test_case::test_case;
use url::Url;

fn page(app: &FakeApp, browser: BrowserAccess) -> Page {
    let options = PageOptions {
        base_url: Url::parse(&app.base_url()).unwrap(),
        device: devices::lookup("Desktop Chrome").unwrap(),
        extra_http_headers: BTreeMap::from([("Accept".to_string(), "application/json".to_string())]),
        navigation_timeout: Duration::from_secs(5),
        record_trace: true,
    };
    Page::new(options, browser).unwrap()
}

async fn run(scenario: Scenario, check: Check) -> CheckResult {
    run_with(scenario, check, CheckOptions::default()).await
}

async fn run_with(scenario: Scenario, check: Check, options: CheckOptions) -> CheckResult {
    let app = FakeApp::spawn(scenario).await;
    check.run(&page(&app, BrowserAccess::disabled()), &options).await
}

fn assertion(result: CheckResult) -> (String, String, String) {
    match result {
        Err(CaseFailure::Assertion(a)) => (a.expectation, a.expected, a.actual),
        other => panic!("expected an assertion failure, got {other:?}"),
    }
}

#[tokio::test]
async fn healthy_application_passes_every_check() {
    let app = FakeApp::spawn(Scenario::default()).await;
    let options = CheckOptions::default();

    for &check in SuiteId::Application.checks() {
        let page = page(&app, BrowserAccess::disabled());
        let result = check.run(&page, &options).await;
        match check {
            Check::MobileLayout => assert!(
                matches!(result, Ok(Completion::Skipped(_))),
                "{check:?}: {result:?}"
            ),
            _ => assert_eq!(result.unwrap(), Completion::Passed, "{check:?}"),
        }
    }
}

#[tokio::test]
async fn missing_security_headers_fail() {
    let result = run(
        Scenario {
            missing_security_headers: true,
            ..Default::default()
        },
        Check::SecurityHeaders,
    )
    .await;

    let (_, expected, actual) = assertion(result);
    assert!(expected.contains("x-frame-options"));
    assert_eq!(actual, "missing");
}

#[tokio::test]
async fn session_cookie_must_be_http_only() {
    let result = run(
        Scenario {
            insecure_session_cookie: true,
            ..Default::default()
        },
        Check::SessionCookie,
    )
    .await;

    let (expectation, expected, actual) = assertion(result);
    assert!(expectation.contains("laravel_session"), "{expectation}");
    assert_eq!(expected, "true");
    assert_eq!(actual, "false");
}

#[tokio::test]
async fn broken_asset_fails_asset_check() {
    let result = run(
        Scenario {
            broken_asset: true,
            ..Default::default()
        },
        Check::AssetsLoad,
    )
    .await;

    let (expectation, _, actual) = assertion(result);
    assert!(expectation.contains("/js/app.js"), "{expectation}");
    assert_eq!(actual, "500");
}

#[tokio::test]
async fn failing_api_endpoint_fails() {
    let result = run(
        Scenario {
            api_failures: usize::MAX,
            ..Default::default()
        },
        Check::ApiHealth,
    )
    .await;

    let (_, expected, actual) = assertion(result);
    assert_eq!((expected.as_str(), actual.as_str()), ("200", "500"));
}

#[tokio::test]
async fn mobile_layout_fails_when_browser_is_required() {
    let app = FakeApp::spawn(Scenario::default()).await;
    let page = page(
        &app,
        BrowserAccess::Unavailable {
            required: true,
            reason: "Playwright not found".to_string(),
        },
    );

    let result = Check::MobileLayout.run(&page, &CheckOptions::default()).await;
    assert!(matches!(result, Err(CaseFailure::Browser(_))), "{result:?}");
    assert_eq!(page.viewport().width, 375);
    assert_eq!(page.viewport().height, 667);
}

#[tokio::test]
async fn redirects_keep_cookies_from_every_hop() {
    let app = FakeApp::spawn(Scenario::default()).await;
    let page = page(&app, BrowserAccess::disabled());

    let response = page.goto("/redirect").await.unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.url.path(), "/");
    assert_eq!(response.document().title().as_deref(), Some("Laravel & Friends"));

    let names: Vec<String> = page.cookies().into_iter().map(|c| c.name).collect();
    assert!(names.contains(&"XSRF-TOKEN".to_string()), "{names:?}");
    assert!(names.contains(&"laravel_session".to_string()), "{names:?}");

    let trace = page.take_trace();
    assert_eq!(trace.len(), 2);
    assert_eq!(trace[0].status, Some(302));
}

#[tokio::test]
async fn unreachable_server_is_a_request_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let options = PageOptions {
        base_url: Url::parse(&format!("http://127.0.0.1:{port}")).unwrap(),
        device: devices::lookup("Pixel 5").unwrap(),
        extra_http_headers: BTreeMap::new(),
        navigation_timeout: Duration::from_secs(2),
        record_trace: false,
    };
    let page = Page::new(options, BrowserAccess::disabled()).unwrap();

    let result = Check::HomepageLoads.run(&page, &CheckOptions::default()).await;
    assert!(matches!(result, Err(CaseFailure::Request(_))), "{result:?}");
}

#[tokio::test]
async fn missing_page_answering_200_fails() {
    let result = run(
        Scenario {
            missing_page_ok: true,
            ..Default::default()
        },
        Check::NotFoundPage,
    )
    .await;

    let (_, expected, actual) = assertion(result);
    assert_eq!((expected.as_str(), actual.as_str()), ("404", "200"));
}

#[tokio::test]
async fn missing_page_must_say_not_found() {
    let result = run(
        Scenario {
            terse_missing_page: true,
            ..Default::default()
        },
        Check::NotFoundPage,
    )
    .await;

    let (expectation, expected, actual) = assertion(result);
    assert!(expectation.contains("body text"), "{expectation}");
    assert!(expected.contains("not found"), "{expected}");
    assert!(actual.contains("page missing"), "{actual}");
}

#[test_case(Scenario { empty_csrf_meta: true, ..Default::default() }, "csrf-token" ; "empty csrf token")]
#[test_case(Scenario { viewport_meta: ViewportMeta::Fixed, ..Default::default() }, "viewport meta content" ; "fixed width viewport")]
#[test_case(Scenario { viewport_meta: ViewportMeta::Missing, ..Default::default() }, "meta[name=\"viewport\"]" ; "no viewport meta")]
#[tokio::test]
async fn broken_meta_tags_fail(scenario: Scenario, expectation: &str) {
    let (actual_expectation, _, _) = assertion(run(scenario, Check::MetaTags).await);
    assert!(actual_expectation.contains(expectation), "{actual_expectation}");
}

#[tokio::test]
async fn empty_token_in_first_form_fails() {
    let result = run(
        Scenario {
            empty_form_token: true,
            ..Default::default()
        },
        Check::FormCsrf,
    )
    .await;

    let (expectation, _, actual) = assertion(result);
    assert!(expectation.contains("first form"), "{expectation}");
    assert_eq!(actual, "\"\"");
}

#[tokio::test]
async fn wrong_xss_protection_value_fails() {
    let result = run(
        Scenario {
            xss_protection: Some("0"),
            ..Default::default()
        },
        Check::SecurityHeaders,
    )
    .await;

    let (_, expected, actual) = assertion(result);
    assert_eq!(expected, "\"1; mode=block\"");
    assert_eq!(actual, "\"0\"");
}

#[tokio::test]
async fn one_failing_concurrent_request_fails() {
    let app = FakeApp::spawn(Scenario {
        failing_health_call: Some(2),
        ..Default::default()
    })
    .await;
    let page = page(&app, BrowserAccess::disabled());

    let result = Check::ConcurrentRequests.run(&page, &CheckOptions::default()).await;
    let (expectation, _, actual) = assertion(result);
    assert!(expectation.contains("concurrent GET /health"), "{expectation}");
    assert_eq!(actual, "500");
    assert_eq!(app.health_calls(), 5);
}

#[tokio::test]
async fn page_without_assets_fails_only_when_a_match_is_required() {
    let scenario = Scenario {
        no_assets: true,
        ..Default::default()
    };

    let result = run(scenario.clone(), Check::AssetsLoad).await;
    assert_eq!(result.unwrap(), Completion::Passed);

    let result = run_with(
        scenario,
        Check::AssetsLoad,
        CheckOptions {
            require_asset_match: true,
        },
    )
    .await;
    let (_, _, actual) = assertion(result);
    assert_eq!(actual, "none");
}

#[tokio::test]
async fn links_the_browser_never_loads_are_not_assets() {
    let app = FakeApp::spawn(Scenario::default()).await;
    let page = page(&app, BrowserAccess::disabled());

    assert_eq!(page.get("/oembed.json?url=home").await.unwrap().status, 404);
    assert_eq!(page.get("/docs/install.jsp").await.unwrap().status, 404);

    let result = Check::AssetsLoad.run(&page, &CheckOptions::default()).await;
    assert_eq!(result.unwrap(), Completion::Passed);
}

#[tokio::test]
async fn deleted_cookies_leave_the_session() {
    let app = FakeApp::spawn(Scenario::default()).await;
    let page = page(&app, BrowserAccess::disabled());

    page.goto("/redirect").await.unwrap();
    let names: Vec<String> = page.cookies().into_iter().map(|c| c.name).collect();
    assert_eq!(names.len(), 2, "{names:?}");

    page.goto("/logout").await.unwrap();
    let names: Vec<String> = page.cookies().into_iter().map(|c| c.name).collect();
    assert!(names.is_empty(), "{names:?}");
}
