// CLI commands for authoring and inspecting grading runs
use anyhow::{bail, Context, Result};
use grader_common::config::{
    CaseSpec, CompareOptions, ExpectedOutput, GradingDirs, ProgramTestSpec, SuiteFile, SuiteSpec,
    DEFAULT_TIMEOUT_MS,
};
use grader_common::{GradingResults, TestInfo};
use handlebars::Handlebars;
use serde::Serialize;
use std::fs;
use std::path::Path;

const REPORT_TEMPLATE: &str = "{{#if gradable}}Gradable: yes{{else}}Gradable: NO{{/if}}
Score: {{score}}%
{{#if message}}
{{message}}
{{/if}}{{#each tests}}
{{marker}} {{name}} ({{points}}/{{max_points}}){{#if description}}
   {{description}}{{/if}}{{#if message}}
   {{message}}{{/if}}
{{/each}}{{#if output}}
--------Output--------
{{output}}
{{/if}}";

#[derive(Debug, Serialize)]
struct ReportView {
    gradable: bool,
    score: String,
    message: Option<String>,
    output: Option<String>,
    tests: Vec<TestView>,
}

#[derive(Debug, Serialize)]
struct TestView {
    marker: &'static str,
    name: String,
    points: String,
    max_points: String,
    description: Option<String>,
    message: Option<String>,
}

/// Sample suite written by `init`
fn sample_suite() -> SuiteFile {
    SuiteFile {
        suites: vec![SuiteSpec {
            name: "Basics".to_string(),
            score_floor: 0.0,
            score_ceiling: 1.0,
            tests: vec![
                ProgramTestSpec {
                    info: TestInfo::new("Prints a greeting")
                        .description("Running with no input prints Hello, World!")
                        .max_points(2.0),
                    expect_failure: false,
                    student: vec!["./main".to_string()],
                    instructor: None,
                    expected: Some(ExpectedOutput {
                        stdout: Some("Hello, World!\n".to_string()),
                        stderr: None,
                        return_code: Some(0),
                    }),
                    stdin: None,
                    timeout_ms: DEFAULT_TIMEOUT_MS,
                    compare: CompareOptions::default(),
                    ungradable_on_timeout: false,
                    ungradable_on_crash: false,
                    cases: Vec::new(),
                },
                ProgramTestSpec {
                    info: TestInfo::new("Matches the reference solution")
                        .max_points(1.0)
                        .points_lost_on_failure(0.5),
                    expect_failure: false,
                    student: vec!["./main".to_string()],
                    instructor: Some(vec!["./solution".to_string()]),
                    expected: None,
                    stdin: None,
                    timeout_ms: DEFAULT_TIMEOUT_MS,
                    compare: CompareOptions::default(),
                    ungradable_on_timeout: false,
                    ungradable_on_crash: true,
                    cases: vec![
                        CaseSpec {
                            args: vec!["3".to_string()],
                            ..Default::default()
                        },
                        CaseSpec {
                            name: Some("Large input".to_string()),
                            args: vec!["1000".to_string()],
                            hidden: Some(true),
                            ..Default::default()
                        },
                    ],
                },
            ],
        }],
    }
}

/// Initialize a grading directory
pub fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing grading directory at: {}", path);

    let dirs = GradingDirs::new(path);
    dirs.create_layout()
        .with_context(|| format!("Failed to create grading layout in {}", path))?;
    for dir in ["data", "results", "student", "tests"] {
        println!("  ✅ Created: {}", dir);
    }

    if !dirs.suite_file.exists() {
        let content = serde_json::to_string_pretty(&sample_suite())?;
        fs::write(&dirs.suite_file, content)
            .with_context(|| format!("Failed to write {}", dirs.suite_file.display()))?;
        println!("  ✅ Created: tests/suite.json");
    }

    let data_file = dirs.data_file();
    if !data_file.exists() {
        fs::write(&data_file, "{}\n")
            .with_context(|| format!("Failed to write {}", data_file.display()))?;
        println!("  ✅ Created: data/data.json");
    }

    println!("✅ Grading directory initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Put the reference solution in tests/ and edit tests/suite.json");
    println!("  2. Check it: grader-cli validate --suite {}/tests/suite.json", path);
    println!("  3. Copy a submission into student/ and run grader-worker with GRADE_DIR={}", path);

    Ok(())
}

/// Validate a suite file; fails when any problem is found
pub fn validate_suite(path: &str) -> Result<()> {
    let suite_file = SuiteFile::load(Path::new(path))?;
    let problems = suite_file.validate();

    if problems.is_empty() {
        let tests: usize = suite_file.suites.iter().map(|s| s.tests.len()).sum();
        println!(
            "✅ {} is valid: {} suite(s), {} test(s)",
            path,
            suite_file.suites.len(),
            tests
        );
        return Ok(());
    }

    println!("❌ {} has {} problem(s):", path, problems.len());
    for problem in &problems {
        println!("  - {}", problem);
    }
    bail!("Suite file {} is invalid", path);
}

/// Print a results file as a readable report
pub fn show_results(path: &str) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let results: GradingResults =
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path))?;

    print!("{}", render_report(&results)?);
    Ok(())
}

fn render_report(results: &GradingResults) -> Result<String> {
    let view = ReportView {
        gradable: results.gradable,
        score: format_number(results.score),
        message: results.message.clone(),
        output: results.output.clone(),
        tests: results
            .tests
            .iter()
            .map(|test| TestView {
                marker: if test.points >= test.max_points { "✅" } else { "❌" },
                name: test.name.clone(),
                points: format_number(test.points),
                max_points: format_number(test.max_points),
                description: test.description.clone(),
                message: test.message.clone(),
            })
            .collect(),
    };

    let mut handlebars = Handlebars::new();
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars
        .render_template(REPORT_TEMPLATE, &view)
        .context("Failed to render results report")
}

fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0 + 0.0;
    format!("{}", rounded)
}
