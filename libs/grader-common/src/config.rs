// Grading directory layout and suite file schema
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::GradingError;
use crate::recorder::ScoreBounds;
use crate::subtest::SubTestOptions;
use crate::types::TestInfo;

pub const DEFAULT_GRADE_DIR: &str = "/grade";
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Where everything lives for one grading run
#[derive(Debug, Clone, PartialEq)]
pub struct GradingDirs {
    pub root: PathBuf,
    pub data: PathBuf,
    pub results: PathBuf,
    pub student: PathBuf,
    pub tests: PathBuf,
    pub suite_file: PathBuf,
    pub results_file: PathBuf,
}

impl GradingDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let tests = root.join("tests");
        let results = root.join("results");
        Self {
            data: root.join("data"),
            student: root.join("student"),
            suite_file: tests.join("suite.json"),
            results_file: results.join("results.json"),
            tests,
            results,
            root,
        }
    }

    /// GRADE_DIR, GRADER_SUITE and GRADER_RESULTS, with defaults
    pub fn from_env() -> Self {
        let root = env::var("GRADE_DIR").unwrap_or_else(|_| DEFAULT_GRADE_DIR.to_string());
        let mut dirs = Self::new(root);
        if let Ok(suite) = env::var("GRADER_SUITE") {
            dirs.suite_file = PathBuf::from(suite);
        }
        if let Ok(results) = env::var("GRADER_RESULTS") {
            dirs.results_file = PathBuf::from(results);
        }
        dirs
    }

    pub fn data_file(&self) -> PathBuf {
        self.data.join("data.json")
    }

    /// Instructor data shared by every suite; null when there is none
    pub fn load_data(&self) -> Result<Value, GradingError> {
        let path = self.data_file();
        if !path.exists() {
            warn!(path = %path.display(), "No instructor data file");
            return Ok(Value::Null);
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn create_layout(&self) -> Result<(), GradingError> {
        for dir in [&self.data, &self.results, &self.student, &self.tests] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Top level of `suite.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteFile {
    pub suites: Vec<SuiteSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteSpec {
    pub name: String,
    #[serde(default)]
    pub score_floor: f64,
    #[serde(default = "default_ceiling")]
    pub score_ceiling: f64,
    #[serde(default)]
    pub tests: Vec<ProgramTestSpec>,
}

/// A data-driven test: run the student's program and compare
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramTestSpec {
    #[serde(flatten)]
    pub info: TestInfo,
    #[serde(default)]
    pub expect_failure: bool,
    /// Student command line
    pub student: Vec<String>,
    /// Reference command line; its output is the expectation when `expected` is absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructor: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub compare: CompareOptions,
    #[serde(default)]
    pub ungradable_on_timeout: bool,
    #[serde(default)]
    pub ungradable_on_crash: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cases: Vec<CaseSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareOptions {
    pub return_code: bool,
    pub output: bool,
    pub error: bool,
    pub enforce_whitespace: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            return_code: true,
            output: true,
            error: false,
            enforce_whitespace: false,
        }
    }
}

/// One input/expectation pair of a program test, run as a sub-test
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points_lost_on_failure: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_in_results: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<ExpectedOutput>,
}

impl CaseSpec {
    /// Sub-test overrides; extra arguments are listed in the description
    pub fn options(&self) -> SubTestOptions {
        let mut options = SubTestOptions::new();
        options.name = self.name.clone();
        options.description = self.description.clone();
        options.max_points = self.max_points;
        options.points_lost_on_failure = self.points_lost_on_failure;
        options.hidden = self.hidden;
        if let Some(include) = self.include_in_results {
            options = options.include_in_results(include);
        }
        if !self.args.is_empty() {
            options = options.param("args", self.args.join(" "));
        }
        options
    }
}

fn default_ceiling() -> f64 {
    1.0
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl SuiteFile {
    pub fn load(path: &Path) -> Result<Self, GradingError> {
        if !path.exists() {
            return Err(GradingError::Suite(format!(
                "Suite file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        let suite_file: SuiteFile = serde_json::from_str(&content).map_err(|e| {
            GradingError::Suite(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        debug!(
            path = %path.display(),
            suites = suite_file.suites.len(),
            "Loaded suite file"
        );
        Ok(suite_file)
    }

    /// Every problem found, in file order. Empty means the file is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.suites.is_empty() {
            problems.push("No suites defined".to_string());
        }

        for suite in &self.suites {
            let label = format!("suite '{}'", suite.name);
            match ScoreBounds::new(suite.score_floor, suite.score_ceiling) {
                Ok(bounds) => {
                    if let Err(e) = bounds.validate_order() {
                        problems.push(format!("{}: {}", label, e));
                    }
                }
                Err(e) => problems.push(format!("{}: {}", label, e)),
            }

            let mut names = HashSet::new();
            for test in &suite.tests {
                let test_label = format!("{} test '{}'", label, test.info.name);
                if !names.insert(test.info.name.as_str()) {
                    problems.push(format!("{}: duplicate test name", test_label));
                }
                problems.extend(
                    test.problems()
                        .into_iter()
                        .map(|p| format!("{}: {}", test_label, p)),
                );
            }
        }

        problems
    }
}

impl ProgramTestSpec {
    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.student.is_empty() {
            problems.push("student command is empty".to_string());
        }
        if matches!(&self.instructor, Some(argv) if argv.is_empty()) {
            problems.push("instructor command is empty".to_string());
        }
        if self.info.max_points < 0.0 {
            problems.push(format!("max_points is negative ({})", self.info.max_points));
        }
        if self.info.points_lost_on_failure < 0.0 {
            problems.push(format!(
                "points_lost_on_failure is negative ({})",
                self.info.points_lost_on_failure
            ));
        }
        if self.timeout_ms == 0 {
            problems.push("timeout_ms must be greater than zero".to_string());
        }

        let has_reference = self.instructor.is_some();
        if self.cases.is_empty() {
            if self.expected.is_none() && !has_reference {
                problems.push("nothing to compare against: set expected or instructor".to_string());
            }
        } else {
            for (i, case) in self.cases.iter().enumerate() {
                let case_label = case.name.clone().unwrap_or_else(|| format!("case {}", i + 1));
                if case.expected.is_none() && self.expected.is_none() && !has_reference {
                    problems.push(format!("{}: nothing to compare against", case_label));
                }
                if matches!(case.max_points, Some(points) if points < 0.0) {
                    problems.push(format!("{}: max_points is negative", case_label));
                }
                if matches!(case.points_lost_on_failure, Some(points) if points < 0.0) {
                    problems.push(format!("{}: points_lost_on_failure is negative", case_label));
                }
            }
        }

        problems
    }
}
