//! Report files written after a successful run.

use std::path::{Path, PathBuf};

use anyhow::Context;
use vigil_agents::{render_markdown, Report};

const REPORT_SUFFIX: &str = "_review_report";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// `<dir>/<input stem>_review_report.{json,md}`
pub fn report_paths(input: &Path, output_dir: Option<&Path>) -> ReportPaths {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    let dir = output_dir.unwrap_or_else(|| Path::new("."));
    ReportPaths {
        json: dir.join(format!("{stem}{REPORT_SUFFIX}.json")),
        markdown: dir.join(format!("{stem}{REPORT_SUFFIX}.md")),
    }
}

/// Write both renderings of `report`. Failed reports are refused so that an
/// error never leaves report files behind.
pub fn write_reports(report: &Report, input: &Path, output_dir: Option<&Path>) -> anyhow::Result<ReportPaths> {
    if let Some(ref error) = report.error {
        anyhow::bail!("refusing to write a failed report: {error}");
    }

    let paths = report_paths(input, output_dir);
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory '{}'", dir.display()))?;
    }

    std::fs::write(&paths.json, report.to_json()?)
        .with_context(|| format!("Failed to write '{}'", paths.json.display()))?;
    std::fs::write(&paths.markdown, render_markdown(report))
        .with_context(|| format!("Failed to write '{}'", paths.markdown.display()))?;

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_paths() {
        let paths = report_paths(Path::new("src/app.py"), Some(Path::new("out")));
        assert_eq!(paths.json, PathBuf::from("out/app_review_report.json"));
        assert_eq!(paths.markdown, PathBuf::from("out/app_review_report.md"));

        let here = report_paths(Path::new("/tmp/x/lib.rs"), None);
        assert_eq!(here.json, PathBuf::from("./lib_review_report.json"));
    }

    #[test]
    fn test_write_reports() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("reports");
        let report = Report::draft("app.py", "analysis", "findings", "feedback");

        let paths = write_reports(&report, Path::new("app.py"), Some(out.as_path())).unwrap();

        let json = std::fs::read_to_string(&paths.json).unwrap();
        let back: Report = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        let md = std::fs::read_to_string(&paths.markdown).unwrap();
        assert!(md.starts_with("# "));
    }

    #[test]
    fn test_failed_report_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let report = Report::failed("app.py", "Run cancelled");

        assert!(write_reports(&report, Path::new("app.py"), Some(dir.path())).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
