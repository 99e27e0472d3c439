//! Machine-readable report in the layout Playwright's JSON reporter uses:
//! file suites, describe suites, specs, per-project tests and per-retry
//! results.

use serde_json::{json, Value};

use crate::config::HarnessConfig;
use crate::runner::{AttemptResult, CaseReport, Outcome, RunReport};
use crate::suites::SuiteId;

pub fn render_json(config: &HarnessConfig, report: &RunReport) -> Value {
    let suites: Vec<Value> = SuiteId::ALL
        .iter()
        .filter_map(|&suite| file_suite(config, report, suite))
        .collect();

    json!({
        "config": {
            "rootDir": config.test_dir,
            "fullyParallel": config.fully_parallel,
            "forbidOnly": config.forbid_only,
            "workers": config.workers,
            "retries": config.retries,
            "timeout": config.timeout.as_millis() as u64,
            "outputDir": config.output_dir,
            "baseURL": config.use_options.base_url.as_str(),
            "projects": config
                .projects
                .iter()
                .map(|p| json!({ "name": p.name, "device": p.device.name }))
                .collect::<Vec<_>>(),
            "reporter": config.reporters.iter().map(|r| r.name()).collect::<Vec<_>>(),
        },
        "suites": suites,
        "errors": [],
        "stats": {
            "startTime": report.started_at.to_rfc3339(),
            "duration": report.duration_ms,
            "expected": report.stats.expected,
            "unexpected": report.stats.unexpected,
            "flaky": report.stats.flaky,
            "skipped": report.stats.skipped,
        },
    })
}

fn file_suite(config: &HarnessConfig, report: &RunReport, suite: SuiteId) -> Option<Value> {
    let cases: Vec<&CaseReport> = report.cases.iter().filter(|c| c.suite == suite).collect();
    if cases.is_empty() {
        return None;
    }

    // one spec per check, holding one test per project
    let mut specs: Vec<Value> = Vec::new();
    for check in suite.checks() {
        let tests: Vec<&CaseReport> = cases.iter().copied().filter(|c| c.check == *check).collect();
        if tests.is_empty() {
            continue;
        }
        specs.push(json!({
            "title": check.title(),
            "ok": tests.iter().all(|t| t.outcome != Outcome::Unexpected),
            "file": suite.file(),
            "tests": tests.iter().map(|t| test(t)).collect::<Vec<_>>(),
        }));
    }

    let file = config.test_dir.join(suite.file());
    Some(json!({
        "title": suite.file(),
        "file": file,
        "specs": [],
        "suites": [{
            "title": suite.title(),
            "file": suite.file(),
            "specs": specs,
        }],
    }))
}

fn test(case: &CaseReport) -> Value {
    let expected_status = if case.outcome == Outcome::Skipped {
        "skipped"
    } else {
        "passed"
    };
    json!({
        "projectName": case.project,
        "expectedStatus": expected_status,
        "status": case.outcome,
        "results": case.attempts.iter().map(result).collect::<Vec<_>>(),
    })
}

fn result(attempt: &AttemptResult) -> Value {
    let mut value = json!({
        "retry": attempt.retry,
        "status": attempt.status,
        "duration": attempt.duration_ms,
        "startTime": attempt.started_at.to_rfc3339(),
        "attachments": attempt.attachments,
    });
    if let Some(error) = &attempt.error {
        value["error"] = json!({
            "message": error.message,
            "kind": error.kind,
            "expected": error.expected,
            "actual": error.actual,
        });
    }
    if let Some(reason) = &attempt.skip_reason {
        value["annotations"] = json!([{ "type": "skip", "description": reason }]);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use crate::report::fixtures;

    #[test]
    fn test_playwright_layout() {
        let config = HarnessConfig::defaults(&Environment::default()).unwrap();
        let doc = render_json(&config, &fixtures::report());

        assert_eq!(doc["stats"]["expected"], 1);
        assert_eq!(doc["stats"]["flaky"], 1);
        assert_eq!(doc["config"]["projects"].as_array().unwrap().len(), 5);

        let suites = doc["suites"].as_array().unwrap();
        assert_eq!(suites.len(), 2);
        assert_eq!(suites[0]["title"], "application.spec");
        assert_eq!(suites[0]["suites"][0]["title"], "Laravel Application Tests");

        let api = &suites[0]["suites"][0]["specs"][2];
        assert_eq!(api["title"], "should handle API endpoints");
        assert_eq!(api["tests"][0]["status"], "flaky");
        assert_eq!(api["tests"][0]["results"][0]["status"], "failed");
        assert_eq!(api["tests"][0]["results"][1]["retry"], 1);

        let db = &suites[1]["suites"][0]["specs"][0];
        assert_eq!(db["ok"], false);
        assert_eq!(db["tests"][0]["results"][0]["error"]["kind"], "assertion");
    }
}
