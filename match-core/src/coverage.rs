//! Coverage verdicts for the files touched by a pull request.
//!
//! The input pairs the list of changed files with per-file metrics exported
//! from the code-quality service. Fetching either is left to other tools.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Metrics of one file as reported by the code-quality service. Absent
/// fields stay `None`; only an explicit zero line count means "nothing to
/// cover".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileMetrics {
    pub coverage: Option<f64>,
    pub new_coverage: Option<f64>,
    pub lines_to_cover: Option<u32>,
    pub uncovered_lines: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageInput {
    pub pull_request: Option<u64>,
    pub files: Vec<String>,
    pub metrics: HashMap<String, FileMetrics>,
}

impl CoverageInput {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read coverage input {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("invalid coverage input {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub min_coverage: f64,
    pub source_extensions: Vec<String>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds { min_coverage: 80.0, source_extensions: vec![".java".to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    Fail,
    NoData,
    Skipped(&'static str),
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::NoData => write!(f, "NO DATA"),
            Verdict::Skipped(reason) => write!(f, "skipped ({})", reason),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: String,
    pub metrics: Option<FileMetrics>,
    pub verdict: Verdict,
}

pub fn judge(path: &str, metrics: Option<&FileMetrics>, thresholds: &Thresholds) -> Verdict {
    if !thresholds.source_extensions.iter().any(|ext| path.ends_with(ext.as_str())) {
        return Verdict::Skipped("not source");
    }
    if path.contains("/test/") {
        return Verdict::Skipped("test source");
    }

    let Some(metrics) = metrics else {
        return Verdict::NoData;
    };
    if metrics.lines_to_cover == Some(0) {
        return Verdict::Pass;
    }
    match metrics.new_coverage.or(metrics.coverage) {
        Some(value) if value >= thresholds.min_coverage => Verdict::Pass,
        Some(_) => Verdict::Fail,
        None => Verdict::NoData,
    }
}

#[derive(Debug, Clone)]
pub struct CoverageReport {
    pub pull_request: Option<u64>,
    pub files: Vec<FileReport>,
}

impl CoverageReport {
    pub fn build(input: &CoverageInput, thresholds: &Thresholds) -> Self {
        let files = input
            .files
            .iter()
            .map(|path| {
                let metrics = input.metrics.get(path);
                FileReport {
                    path: path.clone(),
                    verdict: judge(path, metrics, thresholds),
                    metrics: metrics.cloned(),
                }
            })
            .collect();
        CoverageReport { pull_request: input.pull_request, files }
    }

    pub fn count(&self, verdict: &Verdict) -> usize {
        self.files
            .iter()
            .filter(|f| match (verdict, &f.verdict) {
                (Verdict::Skipped(_), Verdict::Skipped(_)) => true,
                (expected, actual) => expected == actual,
            })
            .count()
    }

    pub fn passed(&self) -> bool {
        self.count(&Verdict::Fail) == 0
    }

    /// Aligned text table plus a summary line
    pub fn render(&self) -> String {
        let header = ["File", "Coverage", "New code", "Verdict"];
        let rows: Vec<[String; 4]> = self
            .files
            .iter()
            .map(|f| {
                let metrics = f.metrics.as_ref();
                [
                    f.path.clone(),
                    percent(metrics.and_then(|m| m.coverage)),
                    percent(metrics.and_then(|m| m.new_coverage)),
                    f.verdict.to_string(),
                ]
            })
            .collect();

        let mut widths = header.map(str::len);
        for row in &rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut out = String::new();
        if let Some(pr) = self.pull_request {
            out.push_str(&format!("Pull request #{}\n", pr));
        }
        push_row(&mut out, &header.map(str::to_string), &widths);
        out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
        out.push('\n');
        for row in &rows {
            push_row(&mut out, row, &widths);
        }
        out.push_str(&format!(
            "\n{} files: {} passed, {} failed, {} without data, {} skipped => {}\n",
            self.files.len(),
            self.count(&Verdict::Pass),
            self.count(&Verdict::Fail),
            self.count(&Verdict::NoData),
            self.count(&Verdict::Skipped("")),
            if self.passed() { "PASS" } else { "FAIL" },
        ));
        out
    }
}

fn percent(value: Option<f64>) -> String {
    value.map(|v| format!("{:.1}%", v)).unwrap_or_else(|| "-".to_string())
}

fn push_row(out: &mut String, cells: &[String; 4], widths: &[usize; 4]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = *width))
        .collect();
    out.push_str(line.join(" | ").trim_end());
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn metrics(coverage: f64, new_coverage: Option<f64>, lines: u32) -> FileMetrics {
        FileMetrics { coverage: Some(coverage), new_coverage, lines_to_cover: Some(lines), uncovered_lines: None }
    }

    #[test]
    fn test_judge_heuristics() {
        let t = Thresholds::default();
        assert_eq!(judge("README.md", None, &t), Verdict::Skipped("not source"));
        assert_eq!(judge("core/src/test/java/FooTest.java", None, &t), Verdict::Skipped("test source"));
        assert_eq!(judge("core/src/main/java/Foo.java", None, &t), Verdict::NoData);
        assert_eq!(judge("Foo.java", Some(&metrics(10.0, Some(95.0), 40)), &t), Verdict::Pass);
        assert_eq!(judge("Foo.java", Some(&metrics(95.0, Some(50.0), 40)), &t), Verdict::Fail);
        assert_eq!(judge("Foo.java", Some(&metrics(79.9, None, 40)), &t), Verdict::Fail);
        assert_eq!(judge("Foo.java", Some(&metrics(0.0, None, 0)), &t), Verdict::Pass);
    }

    #[test]
    fn test_missing_line_count_is_judged_on_coverage() {
        let t = Thresholds::default();
        let low: FileMetrics = serde_json::from_str(r#"{ "coverage": 5.0, "new_coverage": 3.0 }"#).unwrap();
        assert_eq!(low.lines_to_cover, None);
        assert_eq!(judge("Foo.java", Some(&low), &t), Verdict::Fail);

        let high: FileMetrics = serde_json::from_str(r#"{ "coverage": 85.0 }"#).unwrap();
        assert_eq!(judge("Foo.java", Some(&high), &t), Verdict::Pass);

        let empty: FileMetrics = serde_json::from_str("{}").unwrap();
        assert_eq!(judge("Foo.java", Some(&empty), &t), Verdict::NoData);
    }

    #[test]
    fn test_report_from_json() {
        let input: CoverageInput = serde_json::from_str(
            r#"{
                "pull_request": 42,
                "files": ["src/main/java/A.java", "src/main/java/B.java", "pom.xml"],
                "metrics": {
                    "src/main/java/A.java": { "coverage": 91.5, "new_coverage": 88.0, "lines_to_cover": 10 },
                    "src/main/java/B.java": { "coverage": 40.0, "lines_to_cover": 12, "uncovered_lines": 7 }
                }
            }"#,
        )
        .unwrap();

        let report = CoverageReport::build(&input, &Thresholds::default());
        assert!(!report.passed());
        assert_eq!(report.count(&Verdict::Pass), 1);
        assert_eq!(report.count(&Verdict::Fail), 1);
        assert_eq!(report.count(&Verdict::Skipped("")), 1);

        let rendered = report.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Pull request #42");
        assert_eq!(lines[1], "File                 | Coverage | New code | Verdict");
        assert_eq!(lines[3], "src/main/java/A.java | 91.5%    | 88.0%    | PASS");
        assert_eq!(lines[5], "pom.xml              | -        | -        | skipped (not source)");
        assert!(rendered.ends_with("3 files: 1 passed, 1 failed, 0 without data, 1 skipped => FAIL\n"));
    }
}
