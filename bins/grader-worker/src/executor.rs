/// Suite Executor - Suite File to Runnable Tests
///
/// **Responsibility:**
/// Turn every program test of the suite file into a `TestCase` whose body
/// runs the student's program, builds the expectation and asks the
/// evaluator for a verdict.
///
/// **Architecture:**
/// 1. ProcessEngine runs programs (engine.rs)
/// 2. Evaluator compares and explains (evaluator.rs)
/// 3. The verdict becomes a test result the run recorder understands
///
/// A test with `cases` runs each case as a sub-test. Instructor program
/// problems are never the student's fault and make the run ungradable.
///
/// Test bodies are synchronous; program runs are driven to completion on
/// the worker's tokio runtime through its `Handle`, so this must be called
/// off the runtime's own threads.

use crate::engine::{ExecutionOutput, Invocation, ProcessEngine};
use crate::evaluator::{self, Expectation, VerdictKind};
use grader_common::config::{CaseSpec, ExpectedOutput, GradingDirs, ProgramTestSpec, SuiteFile};
use grader_common::{Suite, TestCase, TestContext, TestError, TestOutcome};
use serde_json::Value;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info};

/// Everything a program test needs at run time
struct ProgramTest {
    spec: ProgramTestSpec,
    dirs: GradingDirs,
    engine: ProcessEngine,
    handle: Handle,
}

/// Build runnable suites from a validated suite file
pub fn build_suites(
    file: &SuiteFile,
    dirs: &GradingDirs,
    data: &Value,
    engine: &ProcessEngine,
    handle: &Handle,
) -> Vec<Suite> {
    file.suites
        .iter()
        .map(|suite_spec| {
            let mut suite = Suite::new(suite_spec.name.clone())
                .score_bounds(suite_spec.score_floor, suite_spec.score_ceiling)
                .data(data.clone());

            for test_spec in &suite_spec.tests {
                let program = Arc::new(ProgramTest {
                    spec: test_spec.clone(),
                    dirs: dirs.clone(),
                    engine: engine.clone(),
                    handle: handle.clone(),
                });
                let mut case = TestCase::new(test_spec.info.clone(), move |ctx| program.run(ctx));
                if test_spec.expect_failure {
                    case = case.expect_failure();
                }
                suite = suite.test(case);
            }

            info!(
                suite = %suite_spec.name,
                tests = suite.tests.len(),
                "Suite prepared"
            );
            suite
        })
        .collect()
}

impl ProgramTest {
    fn run(&self, ctx: &mut TestContext<'_>) -> Result<(), TestError> {
        if self.spec.cases.is_empty() {
            return self.check(ctx.outcome_mut(), &[], self.spec.stdin.as_deref(), None);
        }

        for case in &self.spec.cases {
            ctx.subtest(case.options(), |sub| self.check_case(case, sub))?;
        }
        Ok(())
    }

    fn check_case(&self, case: &CaseSpec, outcome: &mut TestOutcome) -> Result<(), TestError> {
        let stdin = case.stdin.as_deref().or(self.spec.stdin.as_deref());
        self.check(outcome, &case.args, stdin, case.expected.as_ref())
    }

    /// Run the student's program once and record the verdict on `outcome`
    fn check(
        &self,
        outcome: &mut TestOutcome,
        extra_args: &[String],
        stdin: Option<&str>,
        expected: Option<&ExpectedOutput>,
    ) -> Result<(), TestError> {
        let expectation = match expected.or(self.spec.expected.as_ref()) {
            Some(expected) => Expectation::from_expected(expected),
            None => self.reference_expectation(extra_args, stdin)?,
        };

        let invocation = self.invocation(&self.spec.student, extra_args, stdin, &self.dirs.student);
        let actual = match self.handle.block_on(self.engine.execute(&invocation)) {
            Ok(actual) => actual,
            Err(e) => {
                outcome.set_output(format!("Your Program Crashed due to the following\n{:#}", e));
                outcome.set_message(evaluator::describe_run(&invocation));
                return self.student_crashed(outcome);
            }
        };

        let verdict = evaluator::evaluate(
            &expectation,
            &actual,
            &invocation,
            self.spec.compare.enforce_whitespace,
        );
        debug!(
            test = %outcome.name(),
            verdict = ?verdict.kind,
            execution_ms = actual.execution_time_ms,
            "Program evaluated"
        );
        outcome.set_output(verdict.output);
        outcome.set_message(verdict.message);

        match verdict.kind {
            VerdictKind::Correct => Ok(()),
            VerdictKind::Mismatch => Err(TestError::failure("Program results did not match")),
            VerdictKind::TimedOut if self.spec.ungradable_on_timeout => Err(TestError::ungradable(
                outcome.output.clone().unwrap_or_default(),
            )),
            VerdictKind::TimedOut => Err(TestError::failure("Program timed out")),
            VerdictKind::Crashed => self.student_crashed(outcome),
        }
    }

    fn student_crashed(&self, outcome: &TestOutcome) -> Result<(), TestError> {
        if self.spec.ungradable_on_crash {
            Err(TestError::ungradable(format!(
                "Student Program Crashed on test {}. See that test for more info.",
                outcome.name()
            )))
        } else {
            Err(TestError::failure("Program crashed"))
        }
    }

    /// Run the instructor's program on the same input
    fn reference_expectation(
        &self,
        extra_args: &[String],
        stdin: Option<&str>,
    ) -> Result<Expectation, TestError> {
        let Some(instructor) = &self.spec.instructor else {
            return Err(TestError::ungradable(format!(
                "Test {} has nothing to compare against: no expected output and no instructor program",
                self.spec.info.name
            )));
        };

        let invocation = self.invocation(instructor, extra_args, stdin, &self.dirs.tests);
        let reference: ExecutionOutput = self
            .handle
            .block_on(self.engine.execute(&invocation))
            .map_err(|e| {
                TestError::ungradable(format!("Instructor program failed to run\n{:#}", e))
            })?;

        if reference.timed_out {
            return Err(TestError::ungradable(format!(
                "Instructor program took longer than {} seconds to complete.\nIt was run as: {}",
                invocation.timeout.as_secs_f64(),
                invocation.command_line()
            )));
        }
        if reference.killed() {
            return Err(TestError::ungradable(format!(
                "Instructor program was killed.\nIt was run as: {}\n{}",
                invocation.command_line(),
                reference.stderr
            )));
        }

        Ok(Expectation::from_reference(&reference, &self.spec.compare))
    }

    fn invocation(
        &self,
        argv: &[String],
        extra_args: &[String],
        stdin: Option<&str>,
        working_dir: &std::path::Path,
    ) -> Invocation {
        Invocation::new([argv, extra_args].concat(), working_dir)
            .stdin(stdin.map(str::to_string))
            .timeout_ms(self.spec.timeout_ms)
    }
}
