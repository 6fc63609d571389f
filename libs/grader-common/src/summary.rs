/// Score Aggregation
///
/// Pure reduction of a sequence of outcomes into counts and point totals.
/// Sums run in outcome order so identical inputs always give identical
/// floating-point results.

use serde::Serialize;
use std::ops::Add;

use crate::types::TestOutcome;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    #[serde(skip)]
    pub tests: Vec<TestOutcome>,
    pub available: usize,
    pub ran: usize,
    pub passed: usize,
    pub failed: usize,
    pub points_available: f64,
    pub points_earned: f64,
}

impl RunSummary {
    pub fn from_outcomes(outcomes: &[TestOutcome]) -> Self {
        let mut summary = RunSummary {
            tests: outcomes.to_vec(),
            ..Default::default()
        };

        for outcome in outcomes {
            let status = outcome.status();
            summary.available += 1;
            summary.points_available += outcome.info.max_points;
            if status.has_run() {
                summary.ran += 1;
            }
            if status.is_completed() {
                summary.points_earned += outcome.points.unwrap_or(0.0);
            }
            match status {
                crate::TestStatus::Passed => summary.passed += 1,
                crate::TestStatus::Failed => summary.failed += 1,
                _ => {}
            }
        }

        summary
    }

    /// Field-wise sum; outcome lists are concatenated, `self` first
    pub fn combine(&self, other: &RunSummary) -> RunSummary {
        let mut tests = self.tests.clone();
        tests.extend(other.tests.iter().cloned());

        RunSummary {
            tests,
            available: self.available + other.available,
            ran: self.ran + other.ran,
            passed: self.passed + other.passed,
            failed: self.failed + other.failed,
            points_available: self.points_available + other.points_available,
            points_earned: self.points_earned + other.points_earned,
        }
    }

    /// Earned over available, or 0 when nothing is available. Unclamped.
    pub fn raw_score(&self) -> f64 {
        if self.points_available > 0.0 {
            self.points_earned / self.points_available
        } else {
            0.0
        }
    }
}

impl Add for RunSummary {
    type Output = RunSummary;

    fn add(self, other: RunSummary) -> RunSummary {
        self.combine(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestInfo, TestStatus};

    fn outcome(name: &str, max: f64, status: TestStatus, points: Option<f64>) -> TestOutcome {
        let mut outcome = TestOutcome::new(TestInfo::new(name).max_points(max));
        outcome.advance(TestStatus::Running).unwrap();
        if status != TestStatus::Running {
            outcome.advance(status).unwrap();
        }
        outcome.points = points;
        outcome
    }

    #[test]
    fn test_empty_summary() {
        let summary = RunSummary::from_outcomes(&[]);
        assert_eq!(summary.available, 0);
        assert_eq!(summary.points_available, 0.0);
        assert_eq!(summary.raw_score(), 0.0);
    }

    #[test]
    fn test_counts_and_points() {
        let outcomes = vec![
            outcome("a", 10.0, TestStatus::Passed, Some(10.0)),
            outcome("b", 10.0, TestStatus::Failed, Some(-4.0)),
            outcome("c", 5.0, TestStatus::Crashed, Some(-1.0)),
        ];

        let summary = RunSummary::from_outcomes(&outcomes);

        assert_eq!(summary.available, 3);
        assert_eq!(summary.ran, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.points_available, 25.0);
        // crashed outcomes never contribute earned points
        assert_eq!(summary.points_earned, 6.0);
    }

    #[test]
    fn test_unfinished_outcome_counts_as_available_only() {
        let outcomes = vec![outcome("running", 3.0, TestStatus::Running, None)];
        let summary = RunSummary::from_outcomes(&outcomes);

        assert_eq!(summary.available, 1);
        assert_eq!(summary.ran, 0);
        assert_eq!(summary.points_available, 3.0);
        assert_eq!(summary.points_earned, 0.0);
    }

    #[test]
    fn test_combine_concatenates_in_order() {
        let hidden = RunSummary::from_outcomes(&[outcome("h", 2.0, TestStatus::Passed, Some(2.0))]);
        let visible = RunSummary::from_outcomes(&[outcome("v", 8.0, TestStatus::Failed, Some(0.0))]);

        let total = hidden.clone() + visible.clone();

        assert_eq!(total.available, 2);
        assert_eq!(total.passed, 1);
        assert_eq!(total.failed, 1);
        assert_eq!(total.points_available, 10.0);
        assert_eq!(total.points_earned, 2.0);
        let names: Vec<_> = total.tests.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["h", "v"]);
        assert_eq!(total.raw_score(), 0.2);
    }

    #[test]
    fn test_negative_raw_score_is_not_clamped_here() {
        let summary = RunSummary::from_outcomes(&[outcome("x", 4.0, TestStatus::Failed, Some(-2.0))]);
        assert_eq!(summary.raw_score(), -0.5);
    }
}
