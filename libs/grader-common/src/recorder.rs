/// Run Recorder - Lifecycle Events to Partitioned Outcomes
///
/// **Core Responsibility:**
/// Receive lifecycle events from the execution driver, resolve each
/// outcome's status and default points/message, and file every terminal
/// outcome exactly once into one of three partitions:
/// - excluded: `include_in_results == false`
/// - hidden: `hidden == true`
/// - visible: everything else
///
/// **Fatal events:**
/// A crash or an unexpected success marks the run ungradable and raises the
/// stop flag. The driver checks `should_stop` before starting the next test;
/// nothing in flight is preempted. Outcomes recorded so far are kept and
/// still published.
///
/// **Scoring:**
/// earned / available over hidden + visible, clamped to the score bounds,
/// computed at most once per run.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{GradingError, TestError};
use crate::publisher::ResultPublisher;
use crate::status::TestStatus;
use crate::summary::RunSummary;
use crate::types::{GradingResults, Image, TestOutcome, TestRecord};

/// Separator placed between a crash diagnostic and output that was already recorded
pub const ORIGINAL_OUTPUT_SEPARATOR: &str = "\n\n--------Original Output--------\n";

/// Score floor and ceiling, each within [0, 1].
///
/// The ordering `floor <= ceiling` is only enforced when the run ends, so
/// the two can be adjusted independently in between.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBounds {
    floor: f64,
    ceiling: f64,
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self {
            floor: 0.0,
            ceiling: 1.0,
        }
    }
}

impl ScoreBounds {
    pub fn new(floor: f64, ceiling: f64) -> Result<Self, GradingError> {
        check_bound("floor", floor)?;
        check_bound("ceiling", ceiling)?;
        Ok(Self { floor, ceiling })
    }

    pub fn floor(&self) -> f64 {
        self.floor
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling
    }

    pub fn validate_order(&self) -> Result<(), GradingError> {
        if self.floor > self.ceiling {
            return Err(GradingError::Configuration(format!(
                "Score floor set above score ceiling. {} > {}",
                self.floor, self.ceiling
            )));
        }
        Ok(())
    }

    /// `max(floor, min(ceiling, raw))`
    pub fn clamp(&self, raw: f64) -> f64 {
        self.floor.max(self.ceiling.min(raw))
    }
}

fn check_bound(label: &str, value: f64) -> Result<(), GradingError> {
    let attempted = format!("Attempted to set score {} to {}.\n", label, value);
    if value.is_nan() {
        Err(GradingError::Configuration(format!(
            "{}The score {} must be a number",
            attempted, label
        )))
    } else if value < 0.0 {
        Err(GradingError::Configuration(format!(
            "{}The score {} cannot be set below 0.0",
            attempted, label
        )))
    } else if value > 1.0 {
        Err(GradingError::Configuration(format!(
            "{}The score {} cannot be set above 1.0",
            attempted, label
        )))
    } else {
        Ok(())
    }
}

/// Free-form run-level reporting fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFields {
    pub message: Option<String>,
    pub output: Option<String>,
    pub images: Vec<Image>,
}

impl ReportFields {
    pub fn is_empty(&self) -> bool {
        self.message.is_none() && self.output.is_none() && self.images.is_empty()
    }

    /// Append another set of fields; text already present is kept first
    pub fn merge(&mut self, other: &ReportFields) {
        append_line(&mut self.message, other.message.as_deref());
        append_line(&mut self.output, other.output.as_deref());
        self.images.extend(other.images.iter().cloned());
    }
}

fn append_line(target: &mut Option<String>, addition: Option<&str>) {
    let Some(addition) = addition else {
        return;
    };
    *target = Some(match target.take() {
        Some(existing) if !existing.is_empty() => format!("{}\n{}", existing, addition),
        _ => addition.to_string(),
    });
}

/// Everything the publisher needs once the run is over
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub gradable: bool,
    /// Fraction in [0, 1]
    pub score: f64,
    pub visible_summary: RunSummary,
    pub hidden_summary: RunSummary,
    pub total_summary: RunSummary,
    /// Records of visible outcomes only
    pub tests: Vec<TestRecord>,
    pub message: Option<String>,
    pub output: Option<String>,
    pub images: Vec<Image>,
}

impl RunReport {
    /// Build the artifact; a rendered summary goes in front of the run message
    pub fn into_results(self, summary_text: Option<&str>) -> GradingResults {
        let mut message = summary_text
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        append_line(&mut message, self.message.as_deref());

        GradingResults {
            gradable: self.gradable,
            score: self.score * 100.0,
            message,
            output: self.output,
            images: self.images,
            tests: self.tests,
        }
    }
}

#[derive(Debug)]
pub struct RunRecorder {
    visible: Vec<TestOutcome>,
    hidden: Vec<TestOutcome>,
    excluded: Vec<TestOutcome>,
    gradable: bool,
    score: f64,
    scored: bool,
    bounds: ScoreBounds,
    report: ReportFields,
    stop_requested: bool,
    published: bool,
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecorder {
    pub fn new() -> Self {
        Self {
            visible: Vec::new(),
            hidden: Vec::new(),
            excluded: Vec::new(),
            gradable: true,
            score: 0.0,
            scored: false,
            bounds: ScoreBounds::default(),
            report: ReportFields::default(),
            stop_requested: false,
            published: false,
        }
    }

    pub fn run_started(&mut self) {
        *self = Self::new();
        debug!("Run started");
    }

    pub fn test_started(&mut self, outcome: &mut TestOutcome, bounds: ScoreBounds) {
        self.bounds = bounds;
        if let Err(e) = outcome.advance(TestStatus::Running) {
            warn!(error = %e, "Ignoring start event");
            return;
        }
        info!(
            test = %outcome.name(),
            max_points = outcome.info.max_points,
            "Test started"
        );
    }

    /// The test body finished without failing
    pub fn test_passed(&mut self, outcome: &mut TestOutcome) {
        self.log_success(outcome);
    }

    pub fn log_success(&mut self, outcome: &mut TestOutcome) {
        if outcome.status() != TestStatus::Passed {
            if let Err(e) = outcome.advance(TestStatus::Passed) {
                warn!(error = %e, "Ignoring success event");
                return;
            }
        }
        if outcome.points.is_none() {
            outcome.points = Some(outcome.info.max_points);
        }
        if outcome.message.is_none() {
            outcome.message = Some(format!("Passed {}", outcome.name()));
        }
        self.file(outcome);
    }

    /// Record an assertion-style failure.
    ///
    /// A CRASHED sub-test keeps its status but is filed with failure
    /// defaults.
    pub fn log_failure(&mut self, outcome: &mut TestOutcome) {
        match outcome.status() {
            TestStatus::Failed | TestStatus::Crashed => {}
            _ => {
                if let Err(e) = outcome.advance(TestStatus::Failed) {
                    warn!(error = %e, "Ignoring failure event");
                    return;
                }
            }
        }
        if outcome.points.is_none() {
            // 0.0 - x keeps a zero penalty from being recorded as -0.0
            outcome.points = Some(0.0 - outcome.info.points_lost_on_failure);
        }
        if outcome.message.is_none() {
            outcome.message = Some(format!("Failed {}", outcome.name()));
        }
        self.file(outcome);
    }

    /// A sub-test of `parent` failed; the parent fails with it, once.
    ///
    /// The parent is only filed by `test_ended`, so whatever the test body
    /// or a later crash writes to it still reaches the report.
    pub fn sub_test_failed(&mut self, parent: &mut TestOutcome) {
        if parent.status() != TestStatus::Running {
            return;
        }
        if let Err(e) = parent.advance(TestStatus::Failed) {
            warn!(error = %e, "Ignoring sub-test failure event");
            return;
        }
        debug!(test = %parent.name(), "Sub-test failure fails its parent");
    }

    /// An error other than an assertion failure escaped the test.
    ///
    /// The first crashed sub-test is blamed if there is one, otherwise the
    /// test itself. The diagnostic replaces the culprit's output (keeping
    /// what was there after a separator) and becomes the run output.
    pub fn test_crashed(
        &mut self,
        test: &mut TestOutcome,
        subtests: &mut [TestOutcome],
        error: &TestError,
    ) {
        self.gradable = false;
        self.score = 0.0;
        self.scored = true;
        self.stop_requested = true;

        if test.status() == TestStatus::Running {
            let _ = test.advance(TestStatus::Crashed);
        }

        let reason = error.crash_reason();
        let culprit = match subtests
            .iter_mut()
            .find(|sub| sub.status() == TestStatus::Crashed)
        {
            Some(sub) => sub,
            None => test,
        };

        culprit.output = Some(format!(
            "This test CRASHED for the following reason\n{}{}",
            reason,
            previous_output(culprit.output.as_deref())
        ));
        self.report.output = Some(format!(
            "{} CRASHED for the following reason\n{}{}",
            culprit.name(),
            reason,
            previous_output(self.report.output.as_deref())
        ));

        error!(
            test = %culprit.name(),
            error = %error,
            "Test crashed; halting the run"
        );
    }

    /// File a test failed by one of its sub-tests, then every unfiled
    /// sub-test, then resolve a test that is still RUNNING because all of
    /// its work was delegated to sub-tests.
    pub fn test_ended(&mut self, test: &mut TestOutcome, subtests: &mut [TestOutcome]) {
        if test.status() == TestStatus::Failed && !test.is_filed() {
            self.log_failure(test);
        }

        for sub in subtests.iter_mut() {
            if sub.is_filed() {
                continue;
            }
            match sub.status() {
                TestStatus::Passed => self.log_success(sub),
                TestStatus::Failed => self.log_failure(sub),
                TestStatus::Crashed => {
                    warn!(subtest = %sub.name(), "Sub-test crashed");
                    self.log_failure(sub);
                }
                status => warn!(
                    test = %test.name(),
                    subtest = %sub.name(),
                    status = %status,
                    "Test completed before its sub-test finished running"
                ),
            }
        }

        if test.status() == TestStatus::Running {
            self.log_success(test);
        }

        debug!(
            test = %test.name(),
            status = %test.status(),
            subtests = subtests.len(),
            "Test ended"
        );
    }

    /// A test expected to fail passed anyway. It still resolves PASSED.
    pub fn unexpected_success(&mut self, outcome: &TestOutcome) {
        self.gradable = false;
        self.stop_requested = true;
        let diagnostic = format!(
            "{} passed when it was marked as expecting to fail.",
            outcome.name()
        );
        append_line(&mut self.report.message, Some(&diagnostic));
        error!(test = %outcome.name(), "Unexpected success; halting the run");
    }

    /// Fold run-level fields set by test code into the recorder
    pub fn merge_report(&mut self, fields: &ReportFields) {
        if fields.is_empty() {
            return;
        }
        self.report.merge(fields);
    }

    /// Score the run unless it has already been scored
    pub fn compute_score(&mut self, total: &RunSummary) -> f64 {
        if !self.scored {
            self.score = self.bounds.clamp(total.raw_score());
            self.scored = true;
        }
        self.score
    }

    /// Validate bounds, score, and hand the visible results to the publisher.
    ///
    /// A floor above the ceiling fails before anything is published.
    pub fn run_ended(&mut self, publisher: &mut dyn ResultPublisher) -> Result<(), GradingError> {
        if self.published {
            warn!("Results already published for this run");
            return Ok(());
        }
        self.bounds.validate_order()?;

        let hidden_summary = RunSummary::from_outcomes(&self.hidden);
        let visible_summary = RunSummary::from_outcomes(&self.visible);
        let total_summary = hidden_summary.combine(&visible_summary);
        let score = self.compute_score(&total_summary);

        info!(
            gradable = self.gradable,
            score = score,
            points_earned = total_summary.points_earned,
            points_available = total_summary.points_available,
            visible = self.visible.len(),
            hidden = self.hidden.len(),
            excluded = self.excluded.len(),
            "Run ended"
        );

        let report = RunReport {
            gradable: self.gradable,
            score,
            tests: self.visible.iter().map(TestOutcome::record).collect(),
            visible_summary,
            hidden_summary,
            total_summary,
            message: self.report.message.clone(),
            output: self.report.output.clone(),
            images: self.report.images.clone(),
        };

        publisher.publish(&report)?;
        self.published = true;
        Ok(())
    }

    /// Publish a bare ungradable artifact explaining `reason`.
    ///
    /// Used when grading cannot proceed at all: bad configuration, an
    /// unreadable suite, or a score-bounds violation at the end of the run.
    pub fn publish_ungradable(
        &mut self,
        reason: &str,
        publisher: &mut dyn ResultPublisher,
    ) -> Result<(), GradingError> {
        self.gradable = false;
        self.score = 0.0;
        self.scored = true;
        self.stop_requested = true;
        self.report.output = Some(reason.to_string());

        error!(reason = %reason, "Submission is ungradable");

        let report = RunReport {
            gradable: false,
            score: 0.0,
            visible_summary: RunSummary::default(),
            hidden_summary: RunSummary::default(),
            total_summary: RunSummary::default(),
            tests: Vec::new(),
            message: self.report.message.clone(),
            output: self.report.output.clone(),
            images: self.report.images.clone(),
        };

        publisher.publish(&report)?;
        self.published = true;
        Ok(())
    }

    pub fn should_stop(&self) -> bool {
        self.stop_requested
    }

    pub fn gradable(&self) -> bool {
        self.gradable
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn is_scored(&self) -> bool {
        self.scored
    }

    pub fn visible(&self) -> &[TestOutcome] {
        &self.visible
    }

    pub fn hidden(&self) -> &[TestOutcome] {
        &self.hidden
    }

    pub fn excluded(&self) -> &[TestOutcome] {
        &self.excluded
    }

    pub fn report(&self) -> &ReportFields {
        &self.report
    }

    fn file(&mut self, outcome: &mut TestOutcome) {
        if outcome.is_filed() {
            debug!(test = %outcome.name(), "Outcome already filed");
            return;
        }
        outcome.mark_filed();

        let partition = if !outcome.info.include_in_results {
            &mut self.excluded
        } else if outcome.info.hidden {
            &mut self.hidden
        } else {
            &mut self.visible
        };
        partition.push(outcome.clone());

        info!(
            test = %outcome.name(),
            status = %outcome.status(),
            points = outcome.points.unwrap_or(0.0),
            max_points = outcome.info.max_points,
            "Outcome recorded"
        );
    }
}

fn previous_output(output: Option<&str>) -> String {
    match output {
        Some(previous) if !previous.is_empty() => {
            format!("{}{}", ORIGINAL_OUTPUT_SEPARATOR, previous)
        }
        _ => String::new(),
    }
}
