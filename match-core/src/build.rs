use crate::error::BuildError;
use crate::repository::Commit;
use crate::side::{Side, SidePair};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Options handed through to the build program untouched by the search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    pub profile: Option<String>,
    pub test_module: Option<String>,
    pub test_class: Option<String>,
    pub test_method: Option<String>,
    pub extra_args: Vec<String>,
}

/// What to build. The working tree must already be checked out at `commit`.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub side: Side,
    pub workdir: &'a Path,
    pub commit: &'a Commit,
}

/// Result of a build that ran. Failure here is an expected outcome, not an
/// error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    pub success: bool,
    pub output: Vec<String>,
}

impl BuildOutcome {
    pub fn passed() -> Self {
        BuildOutcome { success: true, output: Vec::new() }
    }

    pub fn failed() -> Self {
        BuildOutcome { success: false, output: Vec::new() }
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics::scan(self.output.as_slice())
    }
}

/// Runs the external build against a working tree. Calls on one working
/// tree must not overlap.
pub trait BuildGate {
    fn build(&mut self, request: BuildRequest<'_>) -> Result<BuildOutcome, BuildError>;
}

/// Classification of captured build output. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub compilation_error: bool,
    pub no_tests_executed: bool,
    pub test_failure: bool,
    pub failing_tests: Vec<String>,
}

const COMPILATION_MARKERS: &[&str] = &["COMPILATION ERROR", "Compilation failure"];
const NO_TESTS_MARKERS: &[&str] = &["No tests were executed", "No tests to run", "No tests matching pattern"];
const TEST_FAILURE_MARKERS: &[&str] = &["<<< FAILURE!", "<<< ERROR!", "There are test failures"];
const FAILED_BLOCK_HEADERS: &[&str] = &["Failed tests:", "Tests in error:", "[ERROR] Failures:", "[ERROR] Errors:"];

impl Diagnostics {
    pub fn scan<S: AsRef<str>>(lines: &[S]) -> Self {
        let mut diagnostics = Diagnostics::default();
        let mut in_block = false;

        for line in lines.iter().map(AsRef::as_ref) {
            let contains_any = |markers: &[&str]| markers.iter().any(|m| line.contains(m));

            if contains_any(COMPILATION_MARKERS) {
                diagnostics.compilation_error = true;
            }
            if contains_any(NO_TESTS_MARKERS) {
                diagnostics.no_tests_executed = true;
            }
            if contains_any(TEST_FAILURE_MARKERS) {
                diagnostics.test_failure = true;
            }

            if contains_any(FAILED_BLOCK_HEADERS) {
                diagnostics.test_failure = true;
                in_block = true;
                continue;
            }

            if in_block {
                let entry = line.trim_start_matches("[ERROR]").trim();
                if entry.is_empty() || line.contains("Tests run:") {
                    in_block = false;
                } else {
                    diagnostics.failing_tests.push(entry.to_string());
                }
            }
        }

        diagnostics
    }

    /// One line for logs
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if self.compilation_error {
            parts.push("compilation error".to_string());
        }
        if self.no_tests_executed {
            parts.push("no tests executed".to_string());
        }
        if self.test_failure {
            match self.failing_tests.len() {
                0 => parts.push("test failure".to_string()),
                n => parts.push(format!("{} failing tests", n)),
            }
        }
        if parts.is_empty() {
            "no failure markers".to_string()
        } else {
            parts.join(", ")
        }
    }

    /// Multi-line report for the operator
    pub fn report(&self) -> String {
        let mut out = self.summary();
        for test in &self.failing_tests {
            out.push_str("\n    ");
            out.push_str(test);
        }
        out
    }
}

/// [`BuildGate`] that shells out to maven (or a compatible program). Both
/// sides share the options; each side may add a profile of its own.
pub struct MavenGate {
    program: String,
    options: BuildOptions,
    side_profiles: SidePair<Option<String>>,
}

impl MavenGate {
    pub fn new(program: impl Into<String>, options: BuildOptions) -> Self {
        MavenGate { program: program.into(), options, side_profiles: SidePair::default() }
    }

    pub fn with_side_profile(mut self, side: Side, profile: Option<String>) -> Self {
        self.side_profiles[side] = profile;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments for one build. Tests are skipped unless a test class is
    /// selected, in which case only that class (and method) runs.
    pub fn args(&self, side: Side) -> Vec<String> {
        let mut args = vec!["-B".to_string(), "clean".to_string(), "install".to_string()];

        let profiles: Vec<&str> = [&self.options.profile, &self.side_profiles[side]]
            .into_iter()
            .flatten()
            .map(String::as_str)
            .collect();
        if !profiles.is_empty() {
            args.push(format!("-P{}", profiles.join(",")));
        }
        if let Some(module) = &self.options.test_module {
            args.push("-pl".to_string());
            args.push(module.clone());
            args.push("-am".to_string());
        }

        match (&self.options.test_class, &self.options.test_method) {
            (Some(class), Some(method)) => {
                args.push(format!("-Dtest={}#{}", class, method));
                args.push("-DfailIfNoTests=false".to_string());
            }
            (Some(class), None) => {
                args.push(format!("-Dtest={}", class));
                args.push("-DfailIfNoTests=false".to_string());
            }
            _ => args.push("-DskipTests".to_string()),
        }

        args.extend(self.options.extra_args.iter().cloned());
        args
    }
}

impl BuildGate for MavenGate {
    fn build(&mut self, request: BuildRequest<'_>) -> Result<BuildOutcome, BuildError> {
        let args = self.args(request.side);
        debug!("{}: {} {} @ {}", request.side, self.program, args.join(" "), request.commit.short_id());

        let output = Command::new(&self.program)
            .args(&args)
            .current_dir(request.workdir)
            .output()
            .map_err(|source| BuildError::Invocation {
                program: self.program.clone(),
                workdir: PathBuf::from(request.workdir),
                source,
            })?;

        let lines = String::from_utf8_lossy(&output.stdout)
            .lines()
            .chain(String::from_utf8_lossy(&output.stderr).lines())
            .map(str::to_string)
            .collect();

        Ok(BuildOutcome { success: output.status.success(), output: lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn commit() -> Commit {
        Commit {
            id: "0123456789abcdef0123456789abcdef01234567".to_string(),
            summary: "test".to_string(),
            author: "Test User".to_string(),
            timestamp: 0,
        }
    }

    #[test]
    fn test_scan_compilation_error() {
        let output = [
            "[INFO] Compiling 12 source files",
            "[ERROR] COMPILATION ERROR : ",
            "[ERROR] /src/Foo.java:[3,1] cannot find symbol",
        ];
        let diagnostics = Diagnostics::scan(&output);
        assert!(diagnostics.compilation_error);
        assert!(!diagnostics.test_failure);
        assert_eq!(diagnostics.summary(), "compilation error");
    }

    #[test]
    fn test_scan_extracts_failing_test_block() {
        let output = [
            "Running org.example.FooTest",
            "Tests run: 3, Failures: 1, Errors: 0, Skipped: 0 <<< FAILURE!",
            "Results :",
            "Failed tests: ",
            "  testBar(org.example.FooTest): expected:<1> but was:<2>",
            "  testBaz(org.example.FooTest)",
            "",
            "Tests run: 3, Failures: 2, Errors: 0, Skipped: 0",
        ];
        let diagnostics = Diagnostics::scan(&output);
        assert!(diagnostics.test_failure);
        assert_eq!(
            diagnostics.failing_tests,
            vec![
                "testBar(org.example.FooTest): expected:<1> but was:<2>".to_string(),
                "testBaz(org.example.FooTest)".to_string(),
            ]
        );
        assert_eq!(diagnostics.summary(), "2 failing tests");
    }

    #[test]
    fn test_scan_surefire3_block_stops_at_summary() {
        let output = [
            "[ERROR] Failures: ",
            "[ERROR]   FooTest.testBar:42 expected: <1> but was: <2>",
            "[ERROR] Tests run: 3, Failures: 1, Errors: 0, Skipped: 0",
        ];
        let diagnostics = Diagnostics::scan(&output);
        assert_eq!(diagnostics.failing_tests, vec!["FooTest.testBar:42 expected: <1> but was: <2>".to_string()]);
    }

    #[test]
    fn test_scan_no_tests() {
        let diagnostics = Diagnostics::scan(&["[WARNING] No tests were executed!"]);
        assert!(diagnostics.no_tests_executed);
        assert_eq!(diagnostics.summary(), "no tests executed");

        assert_eq!(Diagnostics::scan(&["[INFO] BUILD SUCCESS"]), Diagnostics::default());
    }

    #[test]
    fn test_maven_args_skip_tests_by_default() {
        let gate = MavenGate::new("mvn", BuildOptions { profile: Some("ee".to_string()), ..Default::default() });
        assert_eq!(gate.args(Side::A), vec!["-B", "clean", "install", "-Pee", "-DskipTests"]);
    }

    #[test]
    fn test_maven_args_add_side_profile() {
        let gate = MavenGate::new("mvn", BuildOptions { profile: Some("ci".to_string()), ..Default::default() })
            .with_side_profile(Side::B, Some("enterprise".to_string()));
        assert_eq!(gate.args(Side::A), vec!["-B", "clean", "install", "-Pci", "-DskipTests"]);
        assert_eq!(gate.args(Side::B), vec!["-B", "clean", "install", "-Pci,enterprise", "-DskipTests"]);

        let only_side =
            MavenGate::new("mvn", BuildOptions::default()).with_side_profile(Side::B, Some("ee".to_string()));
        assert_eq!(only_side.args(Side::A), vec!["-B", "clean", "install", "-DskipTests"]);
        assert_eq!(only_side.args(Side::B), vec!["-B", "clean", "install", "-Pee", "-DskipTests"]);
    }

    #[test]
    fn test_maven_args_select_test() {
        let gate = MavenGate::new(
            "mvn",
            BuildOptions {
                test_module: Some("core".to_string()),
                test_class: Some("FooTest".to_string()),
                test_method: Some("testBar".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            gate.args(Side::A),
            vec!["-B", "clean", "install", "-pl", "core", "-am", "-Dtest=FooTest#testBar", "-DfailIfNoTests=false"]
        );
    }

    #[test]
    fn test_missing_program_is_invocation_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let commit = commit();
        let mut gate = MavenGate::new("qa-match-no-such-program", BuildOptions::default());
        let err = gate
            .build(BuildRequest { side: Side::A, workdir: dir.path(), commit: &commit })
            .unwrap_err();
        assert!(matches!(err, BuildError::Invocation { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_decides_success() {
        let dir = tempfile::TempDir::new().unwrap();
        let commit = commit();
        let request = BuildRequest { side: Side::B, workdir: dir.path(), commit: &commit };

        let mut passing = MavenGate::new("true", BuildOptions::default());
        assert!(passing.build(request).unwrap().success);

        let mut failing = MavenGate::new("false", BuildOptions::default());
        assert!(!failing.build(request).unwrap().success);
    }
}
