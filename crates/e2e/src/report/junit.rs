//! JUnit XML for CI systems: one `<testsuite>` per project and suite

use once_cell::sync::Lazy;
use regex::Regex;

use crate::report::escape_xml;
use crate::runner::{CaseReport, Outcome, RunReport};
use crate::suites::SuiteId;

static ANSI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid regex"));
static CONTROL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("valid regex"));

/// Escaped text with terminal colors and characters XML 1.0 forbids removed
fn xml_text(s: &str) -> String {
    let uncolored = ANSI_RE.replace_all(s, "");
    escape_xml(&CONTROL_RE.replace_all(&uncolored, ""))
}

pub fn render_junit(report: &RunReport) -> String {
    let mut xml = String::new();
    xml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    xml.push('\n');

    let failures = report.stats.unexpected;
    xml.push_str(&format!(
        r#"<testsuites id="" name="" tests="{}" failures="{}" skipped="{}" errors="0" time="{:.3}">"#,
        report.total(),
        failures,
        report.stats.skipped,
        report.duration_ms as f64 / 1000.0
    ));
    xml.push('\n');

    // cases are ordered by project then suite, so groups are contiguous
    let mut groups: Vec<(&str, SuiteId, Vec<&CaseReport>)> = Vec::new();
    for case in &report.cases {
        match groups.last_mut() {
            Some((project, suite, cases)) if *project == case.project && *suite == case.suite => {
                cases.push(case)
            }
            _ => groups.push((case.project.as_str(), case.suite, vec![case])),
        }
    }

    for (project, suite, cases) in groups {
        render_suite(&mut xml, project, suite, &cases);
    }

    xml.push_str("</testsuites>\n");
    xml
}

fn render_suite(xml: &mut String, project: &str, suite: SuiteId, cases: &[&CaseReport]) {
    let failures = cases.iter().filter(|c| c.outcome == Outcome::Unexpected).count();
    let skipped = cases.iter().filter(|c| c.outcome == Outcome::Skipped).count();
    let time: u64 = cases.iter().map(|c| c.duration_ms).sum();

    xml.push_str(&format!(
        r#"  <testsuite name="{}" hostname="{}" tests="{}" failures="{}" skipped="{}" time="{:.3}" errors="0">"#,
        escape_xml(suite.file()),
        escape_xml(project),
        cases.len(),
        failures,
        skipped,
        time as f64 / 1000.0
    ));
    xml.push('\n');

    for case in cases {
        xml.push_str(&format!(
            r#"    <testcase name="{}" classname="{}" time="{:.3}">"#,
            escape_xml(&case.check.full_title()),
            escape_xml(suite.file()),
            case.duration_ms as f64 / 1000.0
        ));
        xml.push('\n');

        match case.outcome {
            Outcome::Unexpected => {
                let (message, kind) = case
                    .last_error()
                    .map(|e| (e.message.as_str(), e.kind.as_str()))
                    .unwrap_or(("failed", "assertion"));
                xml.push_str(&format!(
                    r#"      <failure message="{}" type="{}">{}</failure>"#,
                    xml_text(message),
                    kind,
                    xml_text(message)
                ));
                xml.push('\n');
            }
            Outcome::Skipped => xml.push_str("      <skipped/>\n"),
            Outcome::Flaky => {
                xml.push_str(&format!(
                    "      <system-out>passed after {} attempts</system-out>\n",
                    case.attempts.len()
                ));
            }
            Outcome::Expected => {}
        }

        xml.push_str("    </testcase>\n");
    }

    xml.push_str("  </testsuite>\n");
}
