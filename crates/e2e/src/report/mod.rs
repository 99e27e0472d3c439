//! Run reporters
//!
//! Every configured reporter receives the same finished [`RunReport`]. File
//! reporters create their parent directories; the list reporter only logs.

mod html;
mod json;
mod junit;

pub use html::render_html;
pub use json::render_json;
pub use junit::render_junit;

use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::{HarnessConfig, ReporterConfig};
use crate::error::E2eResult;
use crate::runner::RunReport;

/// Write every configured report, returning the files produced
pub fn write_all(config: &HarnessConfig, report: &RunReport) -> E2eResult<Vec<PathBuf>> {
    let mut written = Vec::new();

    for reporter in &config.reporters {
        match reporter {
            ReporterConfig::List => log_summary(report),
            ReporterConfig::Html { output_folder } => {
                let path = output_folder.join("index.html");
                write_file(&path, &render_html(config, report))?;
                written.push(path);
            }
            ReporterConfig::Json { output_file } => {
                let body = serde_json::to_string_pretty(&render_json(config, report))?;
                write_file(output_file, &body)?;
                written.push(output_file.clone());
            }
            ReporterConfig::Junit { output_file } => {
                write_file(output_file, &render_junit(report))?;
                written.push(output_file.clone());
            }
        }
    }

    for path in &written {
        info!("Report written to {}", path.display());
    }
    Ok(written)
}

fn write_file(path: &Path, content: &str) -> E2eResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

fn log_summary(report: &RunReport) {
    let stats = &report.stats;
    info!(
        "{} passed, {} failed, {} flaky, {} skipped of {} ({:.1}s)",
        stats.expected,
        stats.unexpected,
        stats.flaky,
        stats.skipped,
        report.total(),
        report.duration_ms as f64 / 1000.0
    );
}

/// Escape XML/HTML special characters
pub(crate) fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Environment, FileConfig, Overrides};

    #[test]
    fn test_write_all_creates_every_report() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
reporter = [
  {{ kind = "list" }},
  {{ kind = "html", output_folder = "{0}/html" }},
  {{ kind = "json", output_file = "{0}/out/results.json" }},
  {{ kind = "junit", output_file = "{0}/out/results.xml" }},
]
[web_server]
enabled = false
"#,
            dir.path().display()
        );
        let file = FileConfig::from_toml(&toml).unwrap();
        let config = HarnessConfig::resolve(file, &Environment::default(), Overrides::default()).unwrap();

        let written = write_all(&config, &fixtures::report()).unwrap();
        assert_eq!(written.len(), 3);
        for path in written {
            assert!(path.is_file(), "{}", path.display());
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&apos;&amp;&apos;&lt;/a&gt;");
    }
}
