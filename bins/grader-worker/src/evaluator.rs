/// Program Evaluator - Expected vs Actual
///
/// **Core Responsibility:**
/// Compare a program's raw execution output against an expectation and
/// explain the result to the student.
///
/// **Critical Properties:**
/// - Knows nothing about process spawning
/// - Knows nothing about the run recorder
/// - Pure function: (expectation, execution output) → verdict
///
/// **Comparison Rules:**
/// - Return code: exact
/// - stdout / stderr: exact when whitespace is enforced, otherwise every
///   whitespace character is removed from both sides before comparing
/// - Case sensitivity: YES
/// - Only the parts of the expectation that are set get checked

use crate::engine::{ExecutionOutput, Invocation};
use grader_common::config::{CompareOptions, ExpectedOutput};

/// What a correct run looks like. Unset fields are not checked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Expectation {
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub return_code: Option<i32>,
}

impl Expectation {
    /// Explicit expectations from the suite file are checked as written
    pub fn from_expected(expected: &ExpectedOutput) -> Self {
        Self {
            stdout: expected.stdout.clone(),
            stderr: expected.stderr.clone(),
            return_code: expected.return_code,
        }
    }

    /// Whatever the reference program produced, filtered by the compare flags
    pub fn from_reference(reference: &ExecutionOutput, compare: &CompareOptions) -> Self {
        Self {
            stdout: compare.output.then(|| reference.stdout.clone()),
            stderr: compare.error.then(|| reference.stderr.clone()),
            return_code: if compare.return_code {
                reference.exit_code
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictKind {
    Correct,
    Mismatch,
    TimedOut,
    Crashed,
}

/// Evaluation of one run, with the texts shown to the student
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub kind: VerdictKind,
    /// Status header followed by what the program produced
    pub output: String,
    /// What was expected and how the program was run
    pub message: String,
}

/// Compare strings after removing every whitespace character
pub fn equal_ignoring_whitespace(a: &str, b: &str) -> bool {
    let strip = |s: &str| s.chars().filter(|c| !c.is_whitespace()).collect::<String>();
    strip(a) == strip(b)
}

/// Evaluate a single execution output
///
/// Priority:
/// 1. Timeout
/// 2. Killed by a signal
/// 3. Return code / stdout / stderr comparison
pub fn evaluate(
    expectation: &Expectation,
    actual: &ExecutionOutput,
    invocation: &Invocation,
    enforce_whitespace: bool,
) -> Verdict {
    let message = describe_expectation(expectation, invocation);

    if actual.timed_out {
        let header = format!(
            "Your Program took longer than {} seconds to complete.",
            invocation.timeout.as_secs_f64()
        );
        return Verdict {
            kind: VerdictKind::TimedOut,
            output: build_student_output(expectation, actual, &header),
            message,
        };
    }

    if actual.killed() {
        return Verdict {
            kind: VerdictKind::Crashed,
            output: build_student_output(expectation, actual, "Your Program Crashed"),
            message,
        };
    }

    let same = |expected: &str, got: &str| {
        if enforce_whitespace {
            expected == got
        } else {
            equal_ignoring_whitespace(expected, got)
        }
    };

    let mut correct = true;
    let mut status = Vec::new();

    if let Some(code) = expectation.return_code {
        if actual.exit_code == Some(code) {
            status.push("Return Code: Correct");
        } else {
            status.push("Return Code: Mismatch");
            correct = false;
        }
    }
    if let Some(stdout) = &expectation.stdout {
        if same(stdout, &actual.stdout) {
            status.push("Output: Correct");
        } else {
            status.push("Output: Mismatch");
            correct = false;
        }
    }
    if let Some(stderr) = &expectation.stderr {
        if same(stderr, &actual.stderr) {
            status.push("Standard Error: Correct");
        } else {
            status.push("Standard Error: Mismatch");
            correct = false;
        }
    }

    Verdict {
        kind: if correct {
            VerdictKind::Correct
        } else {
            VerdictKind::Mismatch
        },
        output: build_student_output(expectation, actual, &status.join("\n")),
        message,
    }
}

/// What the program produced. Everything is shown when it exited abnormally.
pub fn build_student_output(
    expectation: &Expectation,
    actual: &ExecutionOutput,
    header: &str,
) -> String {
    let return_code = match actual.exit_code {
        Some(code) => code.to_string(),
        None => "none".to_string(),
    };
    let return_code_line = format!("Your Program's Return Code: {}", return_code);
    let output_line = format!("Your Program's Output: {}", actual.stdout);
    let error_line = format!("Your Program's Error: {}", actual.stderr);

    let mut sections = Vec::new();
    if !header.is_empty() {
        sections.push(header.to_string());
    }

    let abnormal = !actual.timed_out && actual.exited_abnormally();
    if abnormal {
        sections.extend([return_code_line, output_line, error_line]);
    } else {
        if expectation.return_code.is_some() {
            sections.push(return_code_line);
        }
        if expectation.stdout.as_deref().is_some_and(|s| !s.is_empty()) {
            sections.push(output_line);
        }
        if expectation.stderr.as_deref().is_some_and(|s| !s.is_empty()) {
            sections.push(error_line);
        }
    }

    sections.join("\n\n")
}

pub fn build_expected_output(expectation: &Expectation) -> String {
    let mut lines = Vec::new();
    if let Some(code) = expectation.return_code {
        lines.push(format!("Expected Return Code: {}", code));
    }
    if let Some(stdout) = expectation.stdout.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Expected Output: {}", stdout));
    }
    if let Some(stderr) = expectation.stderr.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("Expected Error: {}", stderr));
    }
    lines.join("\n")
}

pub fn describe_run(invocation: &Invocation) -> String {
    let mut lines = vec![format!(
        "Your program was run as: {}",
        invocation.command_line()
    )];
    if let Some(stdin) = &invocation.stdin {
        lines.push(format!("It was provided the following input: {}", stdin));
    }
    lines.join("\n")
}

fn describe_expectation(expectation: &Expectation, invocation: &Invocation) -> String {
    let expected = build_expected_output(expectation);
    let run = describe_run(invocation);
    if expected.is_empty() {
        run
    } else {
        format!("{}\n{}", expected, run)
    }
}
