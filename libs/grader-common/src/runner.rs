/// Execution Driver
///
/// Runs suites of test cases one at a time, in registration order, and
/// feeds the lifecycle events to a `RunRecorder`:
///
/// ```text
/// run_started
///   per suite:  validate bounds
///     per test: should_stop? -> test_started -> body -> terminal event -> test_ended
///   merge suite report fields
/// run_ended -> publisher
/// ```
///
/// Test bodies return `Result<(), TestError>`. A panic inside a body is
/// caught at the test or sub-test boundary and treated as a crash.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{GradingError, TestError};
use crate::publisher::ResultPublisher;
use crate::recorder::{ReportFields, RunRecorder, ScoreBounds};
use crate::status::TestStatus;
use crate::subtest::{SubTestOptions, SubTestScope};
use crate::types::{Image, TestInfo, TestOutcome};

pub type TestBody = Box<dyn Fn(&mut TestContext<'_>) -> Result<(), TestError>>;

pub struct TestCase {
    pub info: TestInfo,
    /// The body is expected to fail; passing makes the run ungradable
    pub expect_failure: bool,
    /// Overrides the suite's score bounds from this test onwards
    pub score_bounds: Option<(f64, f64)>,
    body: TestBody,
}

impl TestCase {
    pub fn new(
        info: TestInfo,
        body: impl Fn(&mut TestContext<'_>) -> Result<(), TestError> + 'static,
    ) -> Self {
        Self {
            info,
            expect_failure: false,
            score_bounds: None,
            body: Box::new(body),
        }
    }

    pub fn expect_failure(mut self) -> Self {
        self.expect_failure = true;
        self
    }

    pub fn score_bounds(mut self, floor: f64, ceiling: f64) -> Self {
        self.score_bounds = Some((floor, ceiling));
        self
    }
}

impl fmt::Debug for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("info", &self.info)
            .field("expect_failure", &self.expect_failure)
            .field("score_bounds", &self.score_bounds)
            .finish_non_exhaustive()
    }
}

/// A group of tests sharing score bounds and instructor data
#[derive(Debug)]
pub struct Suite {
    pub name: String,
    pub score_floor: f64,
    pub score_ceiling: f64,
    pub data: Value,
    pub tests: Vec<TestCase>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score_floor: 0.0,
            score_ceiling: 1.0,
            data: Value::Null,
            tests: Vec::new(),
        }
    }

    pub fn score_bounds(mut self, floor: f64, ceiling: f64) -> Self {
        self.score_floor = floor;
        self.score_ceiling = ceiling;
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn test(mut self, case: TestCase) -> Self {
        self.tests.push(case);
        self
    }
}

/// What a running test body sees
pub struct TestContext<'a> {
    recorder: &'a mut RunRecorder,
    outcome: &'a mut TestOutcome,
    subtests: &'a mut Vec<TestOutcome>,
    report: &'a mut ReportFields,
    data: &'a Value,
    /// First sub-test crash, kept even if the body drops the returned error
    crash: Option<TestError>,
}

impl<'a> TestContext<'a> {
    pub fn outcome(&self) -> &TestOutcome {
        self.outcome
    }

    pub fn outcome_mut(&mut self) -> &mut TestOutcome {
        self.outcome
    }

    /// Instructor data shared by every test of the suite
    pub fn data(&self) -> &Value {
        self.data
    }

    pub fn set_points(&mut self, points: f64) {
        self.outcome.set_points(points);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.outcome.set_message(message);
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        self.outcome.set_output(output);
    }

    pub fn add_image(&mut self, image: Image) {
        self.outcome.add_image(image);
    }

    /// Run-level message/output/images for the current suite
    pub fn suite_report(&mut self) -> &mut ReportFields {
        self.report
    }

    /// Run `body` as a sub-test of the current test.
    ///
    /// Failures are recorded and swallowed; the returned error is only set
    /// when the sub-test crashed, so `?` aborts the parent. A crash crashes
    /// the parent test whether or not the error is propagated.
    pub fn subtest<F>(&mut self, options: SubTestOptions, body: F) -> Result<(), TestError>
    where
        F: FnOnce(&mut TestOutcome) -> Result<(), TestError>,
    {
        let sequence = self.subtests.len() + 1;
        let mut scope = SubTestScope::begin(&*self.outcome, sequence, &options);
        let result = guarded(|| body(scope.outcome_mut()));
        let (outcome, escalated) = scope.finish(result);

        let failed = outcome.status() == TestStatus::Failed;
        self.subtests.push(outcome);
        if failed {
            self.recorder.sub_test_failed(&mut *self.outcome);
        }
        if let Err(err) = &escalated {
            if self.crash.is_none() {
                self.crash = Some(err.clone());
            }
        }
        escalated
    }
}

/// Drive every suite through the recorder and publish once at the end.
///
/// Returns an error only when publishing itself fails. Configuration
/// problems are published as an ungradable artifact.
pub fn run_suites(
    suites: &[Suite],
    recorder: &mut RunRecorder,
    publisher: &mut dyn ResultPublisher,
) -> Result<(), GradingError> {
    recorder.run_started();
    info!(suites = suites.len(), "Grading started");

    for suite in suites {
        if recorder.should_stop() {
            warn!(suite = %suite.name, "Run halted; skipping suite");
            continue;
        }

        let mut bounds = match ScoreBounds::new(suite.score_floor, suite.score_ceiling) {
            Ok(bounds) => bounds,
            Err(e) => return recorder.publish_ungradable(&e.to_string(), publisher),
        };

        info!(suite = %suite.name, tests = suite.tests.len(), "Suite started");
        let mut report = ReportFields::default();

        for case in &suite.tests {
            if recorder.should_stop() {
                warn!(test = %case.info.name, "Run halted; skipping test");
                continue;
            }
            if let Some((floor, ceiling)) = case.score_bounds {
                bounds = match ScoreBounds::new(floor, ceiling) {
                    Ok(bounds) => bounds,
                    Err(e) => return recorder.publish_ungradable(&e.to_string(), publisher),
                };
            }
            run_case(case, &suite.data, bounds, recorder, &mut report);
        }

        recorder.merge_report(&report);
        debug!(suite = %suite.name, "Suite ended");
    }

    match recorder.run_ended(publisher) {
        Err(GradingError::Configuration(reason)) => recorder.publish_ungradable(&reason, publisher),
        other => other,
    }
}

fn run_case(
    case: &TestCase,
    data: &Value,
    bounds: ScoreBounds,
    recorder: &mut RunRecorder,
    report: &mut ReportFields,
) {
    let mut outcome = TestOutcome::new(case.info.clone());
    let mut subtests = Vec::new();
    recorder.test_started(&mut outcome, bounds);

    let (result, crash) = {
        let mut ctx = TestContext {
            recorder: &mut *recorder,
            outcome: &mut outcome,
            subtests: &mut subtests,
            report: &mut *report,
            data,
            crash: None,
        };
        let result = guarded(|| (case.body)(&mut ctx));
        (result, ctx.crash.take())
    };

    let result = match (result, crash) {
        (Ok(()) | Err(TestError::Failure(_)), Some(crash)) => {
            warn!(test = %outcome.name(), "Test body ignored a sub-test crash");
            Err(crash)
        }
        (result, _) => result,
    };

    match result {
        Ok(()) if !case.expect_failure => {
            if outcome.status() == TestStatus::Running {
                recorder.test_passed(&mut outcome);
            }
        }
        Ok(()) if outcome.status() == TestStatus::Failed => {
            debug!(test = %outcome.name(), "Expected failure came from a sub-test");
        }
        Ok(()) => recorder.unexpected_success(&outcome),
        Err(TestError::Failure(reason)) if case.expect_failure => {
            debug!(test = %outcome.name(), reason = %reason, "Expected failure");
        }
        Err(TestError::Failure(reason)) => {
            info!(test = %outcome.name(), reason = %reason, "Test failed");
            recorder.log_failure(&mut outcome);
        }
        Err(err) => recorder.test_crashed(&mut outcome, &mut subtests, &err),
    }

    recorder.test_ended(&mut outcome, &mut subtests);
}

fn guarded<F>(body: F) -> Result<(), TestError>
where
    F: FnOnce() -> Result<(), TestError>,
{
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(result) => result,
        Err(payload) => Err(TestError::crash(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::CollectingPublisher;
    use crate::recorder::RunReport;
    use crate::{check, check_eq};
    use serde_json::json;

    fn run(suites: &[Suite]) -> (RunRecorder, RunReport) {
        let mut recorder = RunRecorder::new();
        let mut publisher = CollectingPublisher::default();
        run_suites(suites, &mut recorder, &mut publisher).unwrap();
        assert_eq!(publisher.reports.len(), 1);
        let report = publisher.reports.remove(0);
        (recorder, report)
    }

    fn passing(name: &str, max: f64) -> TestCase {
        TestCase::new(TestInfo::new(name).max_points(max), |_| Ok(()))
    }

    fn failing(name: &str, max: f64) -> TestCase {
        TestCase::new(TestInfo::new(name).max_points(max), |_| {
            Err(TestError::failure("wrong answer"))
        })
    }

    #[test]
    fn test_mixed_suite_scores() {
        let suite = Suite::new("basics")
            .test(passing("a", 3.0))
            .test(failing("b", 1.0));

        let (_, report) = run(&[suite]);

        assert!(report.gradable);
        assert_eq!(report.score, 0.75);
        assert_eq!(report.tests[0].points, 3.0);
        assert_eq!(report.tests[0].message.as_deref(), Some("Passed a"));
        assert_eq!(report.tests[1].points, 0.0);
        assert!(report.tests[1].points.is_sign_positive());
        assert_eq!(report.tests[1].message.as_deref(), Some("Failed b"));
    }

    #[test]
    fn test_subtests_with_excluded_parent() {
        let parent = TestInfo::new("T")
            .max_points(10.0)
            .points_lost_on_failure(4.0)
            .include_in_results(false);
        let suite = Suite::new("subtests").test(TestCase::new(parent, |ctx| {
            ctx.subtest(SubTestOptions::new(), |_| Ok(()))?;
            ctx.subtest(SubTestOptions::new(), |_| {
                Err(TestError::failure("mismatch"))
            })?;
            Ok(())
        }));

        let (recorder, report) = run(&[suite]);

        assert_eq!(report.total_summary.points_earned, 6.0);
        assert_eq!(report.total_summary.points_available, 20.0);
        assert_eq!(report.tests[0].name, "T subtest 1");
        assert_eq!(report.tests[0].points, 10.0);
        assert_eq!(report.tests[1].name, "T subtest 2");
        assert_eq!(report.tests[1].points, -4.0);
        // a failing sub-test fails its parent
        assert_eq!(recorder.excluded()[0].status(), TestStatus::Failed);
        assert_eq!(recorder.excluded()[0].points, Some(-4.0));
    }

    #[test]
    fn test_subtests_with_included_parent() {
        let parent = TestInfo::new("T").max_points(10.0).points_lost_on_failure(4.0);
        let suite = Suite::new("subtests").test(TestCase::new(parent, |ctx| {
            ctx.subtest(SubTestOptions::new(), |_| Ok(()))?;
            ctx.subtest(SubTestOptions::new(), |_| Err(TestError::failure("no")))
        }));

        let (_, report) = run(&[suite]);

        let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["T", "T subtest 1", "T subtest 2"]);
        assert_eq!(report.total_summary.points_available, 30.0);
        assert_eq!(report.total_summary.points_earned, 2.0);
    }

    #[test]
    fn test_crash_in_subtest_halts_run() {
        let suite = Suite::new("crashing")
            .test(TestCase::new(TestInfo::new("T"), |ctx| {
                ctx.subtest(SubTestOptions::new(), |sub| {
                    sub.set_output("partial log");
                    Err(TestError::crash("segfault"))
                })?;
                ctx.set_message("unreachable");
                Ok(())
            }))
            .test(passing("never runs", 1.0));

        let (recorder, report) = run(&[suite]);

        assert!(!report.gradable);
        assert_eq!(report.score, 0.0);
        assert!(recorder.should_stop());
        let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["T subtest 1"]);

        let culprit = report.tests[0].output.as_deref().unwrap();
        assert!(culprit.starts_with("This test CRASHED"));
        assert!(culprit.ends_with("--------Original Output--------\npartial log"));
        assert!(report
            .output
            .as_deref()
            .unwrap()
            .starts_with("T subtest 1 CRASHED"));
    }

    #[test]
    fn test_ignored_subtest_crash_still_halts_run() {
        let suite = Suite::new("ignoring")
            .test(TestCase::new(TestInfo::new("T"), |ctx| {
                let _ = ctx.subtest(SubTestOptions::new(), |_| Err(TestError::crash("boom")));
                Ok(())
            }))
            .test(passing("next", 1.0));

        let (recorder, report) = run(&[suite]);

        assert!(!report.gradable);
        assert_eq!(report.score, 0.0);
        assert!(recorder.should_stop());
        let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["T subtest 1"]);
        assert!(report
            .output
            .as_deref()
            .unwrap()
            .starts_with("T subtest 1 CRASHED for the following reason\n"));
    }

    #[test]
    fn test_parent_crash_after_subtest_failure_keeps_diagnostic() {
        let suite = Suite::new("late crash").test(TestCase::new(TestInfo::new("T"), |ctx| {
            ctx.subtest(SubTestOptions::new(), |_| Err(TestError::failure("mismatch")))?;
            Err(TestError::crash("boom"))
        }));

        let (_, report) = run(&[suite]);

        assert!(!report.gradable);
        assert_eq!(report.tests[0].name, "T");
        let output = report.tests[0].output.as_deref().unwrap();
        assert!(output.starts_with("This test CRASHED for the following reason\n"));
        assert!(output.contains("Error: boom"));
        assert!(report.output.as_deref().unwrap().starts_with("T CRASHED"));
    }

    #[test]
    fn test_parent_edits_after_subtest_failure_are_reported() {
        let suite = Suite::new("late edits").test(TestCase::new(TestInfo::new("T"), |ctx| {
            ctx.subtest(SubTestOptions::new(), |_| Err(TestError::failure("mismatch")))?;
            ctx.set_message("parent summary");
            ctx.set_output("parent log");
            Ok(())
        }));

        let (_, report) = run(&[suite]);

        assert!(report.gradable);
        assert_eq!(report.tests[0].name, "T");
        assert_eq!(report.tests[0].message.as_deref(), Some("parent summary"));
        assert_eq!(report.tests[0].output.as_deref(), Some("parent log"));
    }

    #[test]
    fn test_panic_is_a_crash() {
        let suite = Suite::new("panics").test(TestCase::new(TestInfo::new("p"), |_| {
            panic!("index out of bounds")
        }));

        let (recorder, report) = run(&[suite]);

        assert!(!report.gradable);
        assert!(report.output.as_deref().unwrap().contains("panicked: index out of bounds"));
        // a crashed test with no sub-tests is reported through the run output only
        assert!(recorder.visible().is_empty());
    }

    #[test]
    fn test_check_macros_fail_tests() {
        let suite = Suite::new("checks")
            .test(TestCase::new(TestInfo::new("eq"), |_| {
                check_eq!(2 + 2, 5);
                Ok(())
            }))
            .test(TestCase::new(TestInfo::new("cond"), |ctx| {
                check!(ctx.data()["enabled"] == json!(true), "feature disabled");
                Ok(())
            }));

        let (_, report) = run(&[suite.data(json!({ "enabled": true }))]);

        assert!(report.gradable);
        assert_eq!(report.visible_summary.failed, 1);
        assert_eq!(report.visible_summary.passed, 1);
    }

    #[test]
    fn test_expected_failure() {
        let suite = Suite::new("expected").test(failing("known bad", 2.0).expect_failure());

        let (_, report) = run(&[suite]);

        assert!(report.gradable);
        assert_eq!(report.tests[0].points, 2.0);
        assert_eq!(report.tests[0].message.as_deref(), Some("Passed known bad"));
    }

    #[test]
    fn test_unexpected_success_halts() {
        let suite = Suite::new("surprise")
            .test(passing("should fail", 1.0).expect_failure())
            .test(passing("skipped", 1.0));

        let (_, report) = run(&[suite]);

        assert!(!report.gradable);
        assert_eq!(report.tests.len(), 1);
        assert_eq!(report.tests[0].message.as_deref(), Some("Passed should fail"));
        assert!(report
            .message
            .as_deref()
            .unwrap()
            .contains("marked as expecting to fail"));
    }

    #[test]
    fn test_pinned_bounds() {
        let suite = Suite::new("pinned").score_bounds(0.5, 0.5).test(passing("a", 1.0)).test(
            TestCase::new(TestInfo::new("b").max_points(4.0), |_| {
                Err(TestError::failure("no"))
            }),
        );

        let (_, report) = run(&[suite]);

        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_inverted_bounds_publish_ungradable() {
        let suite = Suite::new("inverted")
            .score_bounds(0.6, 0.4)
            .test(passing("a", 1.0));

        let (_, report) = run(&[suite]);

        assert!(!report.gradable);
        assert_eq!(report.score, 0.0);
        assert!(report.tests.is_empty());
        assert_eq!(
            report.output.as_deref(),
            Some("Score floor set above score ceiling. 0.6 > 0.4")
        );
    }

    #[test]
    fn test_out_of_range_bounds_publish_ungradable() {
        let suite = Suite::new("range").score_bounds(-0.5, 1.0).test(passing("a", 1.0));

        let (recorder, report) = run(&[suite]);

        assert!(!report.gradable);
        assert!(report.output.as_deref().unwrap().contains("cannot be set below 0.0"));
        assert!(recorder.visible().is_empty());
    }

    #[test]
    fn test_hidden_and_excluded() {
        let suite = Suite::new("visibility")
            .test(passing("shown", 1.0))
            .test(TestCase::new(TestInfo::new("secret").max_points(1.0).hidden(true), |_| {
                Err(TestError::failure("no"))
            }))
            .test(TestCase::new(
                TestInfo::new("practice").max_points(50.0).include_in_results(false),
                |_| Ok(()),
            ));

        let (_, report) = run(&[suite]);

        let names: Vec<_> = report.tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["shown"]);
        assert_eq!(report.total_summary.points_available, 2.0);
        assert_eq!(report.score, 0.5);
    }

    #[test]
    fn test_suite_report_fields_merge() {
        let first = Suite::new("one").test(TestCase::new(TestInfo::new("a"), |ctx| {
            ctx.suite_report().message = Some("style checked".to_string());
            Ok(())
        }));
        let second = Suite::new("two").test(TestCase::new(TestInfo::new("b"), |ctx| {
            ctx.suite_report().message = Some("docs checked".to_string());
            ctx.suite_report().images.push(Image::new("plot", "plot.png"));
            Ok(())
        }));

        let (_, report) = run(&[first, second]);

        assert_eq!(report.message.as_deref(), Some("style checked\ndocs checked"));
        assert_eq!(report.images.len(), 1);
    }

    #[test]
    fn test_explicit_points_survive() {
        let suite = Suite::new("partial").test(TestCase::new(
            TestInfo::new("half").max_points(4.0),
            |ctx| {
                ctx.set_points(2.0);
                ctx.set_message("half credit");
                Ok(())
            },
        ));

        let (_, report) = run(&[suite]);

        assert_eq!(report.tests[0].points, 2.0);
        assert_eq!(report.tests[0].message.as_deref(), Some("half credit"));
        assert_eq!(report.score, 0.5);
    }
}
