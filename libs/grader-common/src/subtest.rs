/// Sub-test scopes
///
/// A sub-test is a child outcome created inside a running test. It inherits
/// most of its configuration from the parent, resolves its own status when
/// the scope closes, and is appended to the parent's sub-test list no matter
/// how it ended.

use tracing::debug;

use crate::error::TestError;
use crate::status::TestStatus;
use crate::types::{TestInfo, TestOutcome};

/// Parameter key reserved for a free-text annotation; never listed in the description
pub const MSG_PARAM: &str = "msg";

/// Overrides for a sub-test. Unset fields fall back to the parent.
#[derive(Debug, Clone, PartialEq)]
pub struct SubTestOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    pub max_points: Option<f64>,
    pub points_lost_on_failure: Option<f64>,
    pub hidden: Option<bool>,
    pub include_in_results: bool,
    pub include_params_in_description: bool,
    pub params: Vec<(String, String)>,
}

impl Default for SubTestOptions {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            max_points: None,
            points_lost_on_failure: None,
            hidden: None,
            include_in_results: true,
            include_params_in_description: true,
            params: Vec::new(),
        }
    }
}

impl SubTestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn max_points(mut self, max_points: f64) -> Self {
        self.max_points = Some(max_points);
        self
    }

    pub fn points_lost_on_failure(mut self, points: f64) -> Self {
        self.points_lost_on_failure = Some(points);
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = Some(hidden);
        self
    }

    pub fn include_in_results(mut self, include: bool) -> Self {
        self.include_in_results = include;
        self
    }

    pub fn include_params_in_description(mut self, include: bool) -> Self {
        self.include_params_in_description = include;
        self
    }

    /// Extra key/value shown in the description, in insertion order
    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((key.into(), value.to_string()));
        self
    }

    pub fn msg(self, annotation: impl Into<String>) -> Self {
        self.param(MSG_PARAM, annotation.into())
    }

    pub fn annotation(&self) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| key == MSG_PARAM)
            .map(|(_, value)| value.as_str())
    }

    /// Resolve the sub-test configuration against its parent.
    ///
    /// `sequence` is the 1-based position of this sub-test among the
    /// parent's sub-tests and only feeds the default name.
    pub fn resolve(&self, parent: &TestInfo, sequence: usize) -> TestInfo {
        let mut description = self
            .description
            .clone()
            .or_else(|| parent.description.clone());

        if self.include_params_in_description {
            let listing = self
                .params
                .iter()
                .filter(|(key, _)| key != MSG_PARAM)
                .map(|(key, value)| format!("{} = {}", key, value))
                .collect::<Vec<_>>()
                .join("  \n");

            if !listing.is_empty() {
                description = Some(match description {
                    Some(base) if !base.is_empty() => format!("{}\n{}", base, listing),
                    _ => listing,
                });
            }
        }

        TestInfo {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| format!("{} subtest {}", parent.name, sequence)),
            description,
            max_points: self.max_points.unwrap_or(parent.max_points),
            points_lost_on_failure: self
                .points_lost_on_failure
                .unwrap_or(parent.points_lost_on_failure),
            include_in_results: self.include_in_results,
            hidden: self.hidden.unwrap_or(parent.hidden),
        }
    }
}

/// An open sub-test. Created RUNNING by `begin`, resolved by `finish`.
#[derive(Debug)]
pub struct SubTestScope {
    outcome: TestOutcome,
    annotation: Option<String>,
}

impl SubTestScope {
    pub fn begin(parent: &TestOutcome, sequence: usize, options: &SubTestOptions) -> Self {
        let info = options.resolve(&parent.info, sequence);
        let mut outcome = TestOutcome::new(info);
        // a fresh outcome is always SCHEDULED
        let _ = outcome.advance(TestStatus::Running);

        debug!(
            parent = %parent.name(),
            subtest = %outcome.name(),
            "Sub-test started"
        );

        Self {
            outcome,
            annotation: options.annotation().map(str::to_string),
        }
    }

    pub fn outcome(&self) -> &TestOutcome {
        &self.outcome
    }

    pub fn outcome_mut(&mut self) -> &mut TestOutcome {
        &mut self.outcome
    }

    /// Close the scope with the body's result.
    ///
    /// Assertion failures are swallowed and leave the sub-test FAILED.
    /// Crashes and ungradable signals leave it CRASHED and are handed back
    /// so they abort the parent.
    pub fn finish(mut self, result: Result<(), TestError>) -> (TestOutcome, Result<(), TestError>) {
        let (status, escalated) = match result {
            Ok(()) => (TestStatus::Passed, Ok(())),
            Err(TestError::Failure(reason)) => {
                debug!(
                    subtest = %self.outcome.name(),
                    reason = %reason,
                    annotation = ?self.annotation,
                    "Sub-test failed"
                );
                (TestStatus::Failed, Ok(()))
            }
            Err(err) => (TestStatus::Crashed, Err(err)),
        };

        // scopes only ever close from RUNNING
        let _ = self.outcome.advance(status);
        (self.outcome, escalated)
    }
}
