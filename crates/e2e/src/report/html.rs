//! Self-contained HTML report

use crate::config::HarnessConfig;
use crate::report::escape_xml;
use crate::runner::{CaseReport, Outcome, RunReport};

pub fn render_html(config: &HarnessConfig, report: &RunReport) -> String {
    let mut html = String::new();

    html.push_str(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <title>Laravel E2E Report</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; margin: 20px; }
        .summary { background: #f5f5f5; padding: 20px; border-radius: 8px; margin-bottom: 20px; }
        .progress-bar { background: #ddd; height: 20px; border-radius: 10px; overflow: hidden; }
        .passed { background: #4caf50; height: 100%; }
        .test { padding: 10px; margin: 5px 0; border-radius: 4px; }
        .test.expected { background: #e8f5e9; border-left: 4px solid #4caf50; }
        .test.flaky { background: #fffde7; border-left: 4px solid #fbc02d; }
        .test.unexpected { background: #ffebee; border-left: 4px solid #f44336; }
        .test.skipped { background: #fff3e0; border-left: 4px solid #ff9800; }
        .project { color: #666; font-size: 0.9em; }
        .error { color: #d32f2f; font-family: monospace; white-space: pre-wrap; }
    </style>
</head>
<body>
"#,
    );

    let stats = &report.stats;
    let total = report.total();
    let ok = stats.expected + stats.flaky;
    let rate = if total == 0 {
        100.0
    } else {
        ok as f64 * 100.0 / total as f64
    };

    html.push_str(&format!(
        r#"<div class="summary">
    <h1>Laravel E2E Report</h1>
    <p>Base URL: {}</p>
    <h2>Results: {}/{} passed ({:.1}%)</h2>
    <div class="progress-bar">
        <div class="passed" style="width: {:.1}%"></div>
    </div>
    <p>{} flaky, {} failed, {} skipped. Duration: {:.2}s</p>
</div>
"#,
        escape_xml(config.use_options.base_url.as_str()),
        ok,
        total,
        rate,
        rate,
        stats.flaky,
        stats.unexpected,
        stats.skipped,
        report.duration_ms as f64 / 1000.0
    ));

    html.push_str("<h2>Test Results</h2>\n");
    for case in &report.cases {
        render_case(&mut html, case);
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn render_case(html: &mut String, case: &CaseReport) {
    let class = match case.outcome {
        Outcome::Expected => "expected",
        Outcome::Flaky => "flaky",
        Outcome::Unexpected => "unexpected",
        Outcome::Skipped => "skipped",
    };

    html.push_str(&format!(
        r#"<div class="test {}">
    <span class="project">[{}]</span> <strong>{}</strong> - {} ({}ms, {} attempt(s))
"#,
        class,
        escape_xml(&case.project),
        escape_xml(&case.check.full_title()),
        class,
        case.duration_ms,
        case.attempts.len()
    ));

    for attempt in &case.attempts {
        if let Some(error) = &attempt.error {
            html.push_str(&format!(
                "    <div class=\"error\">retry #{}: {}</div>\n",
                attempt.retry,
                escape_xml(&error.message)
            ));
        }
        if let Some(reason) = &attempt.skip_reason {
            html.push_str(&format!("    <div>skipped: {}</div>\n", escape_xml(reason)));
        }
        for attachment in &attempt.attachments {
            html.push_str(&format!(
                "    <div><a href=\"{}\">{}</a></div>\n",
                escape_xml(&attachment.path.display().to_string()),
                escape_xml(&attachment.name)
            ));
        }
    }

    html.push_str("</div>\n");
}
