/// Outcome State Machine
///
/// SCHEDULED → RUNNING → {PASSED, FAILED, CRASHED}
///
/// Terminal states never change again. Everything that moves an outcome
/// goes through `TestStatus::can_transition_to`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TestStatus {
    #[default]
    Scheduled,
    Running,
    Passed,
    Failed,
    Crashed,
}

impl TestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TestStatus::Passed | TestStatus::Failed | TestStatus::Crashed
        )
    }

    /// Counted as "ran" in summaries
    pub fn has_run(self) -> bool {
        self.is_terminal()
    }

    /// Contributes its points to `points_earned`; crashes do not
    pub fn is_completed(self) -> bool {
        matches!(self, TestStatus::Passed | TestStatus::Failed)
    }

    pub fn can_transition_to(self, next: TestStatus) -> bool {
        matches!(
            (self, next),
            (TestStatus::Scheduled, TestStatus::Running)
                | (
                    TestStatus::Running,
                    TestStatus::Passed | TestStatus::Failed | TestStatus::Crashed
                )
        )
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TestStatus::Scheduled => "Scheduled",
            TestStatus::Running => "Running",
            TestStatus::Passed => "Passed",
            TestStatus::Failed => "Failed",
            TestStatus::Crashed => "Crashed",
        };
        f.write_str(label)
    }
}
