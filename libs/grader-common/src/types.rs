use serde::{Deserialize, Serialize};

use crate::error::GradingError;
use crate::status::TestStatus;

/// An image shown to the student alongside a test or the whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub label: String,
    pub url: String,
}

impl Image {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// Declarative configuration attached to a test when it is registered.
///
/// Sub-tests inherit `description`, `max_points`, `points_lost_on_failure`
/// and `hidden` from their parent unless overridden. `name` and
/// `include_in_results` are never inherited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestInfo {
    pub name: String,
    pub description: Option<String>,
    pub max_points: f64,
    pub points_lost_on_failure: f64,
    /// When false the test still runs but never counts toward the score or the report
    pub include_in_results: bool,
    /// When true the test counts toward the score but is not shown by name
    pub hidden: bool,
}

impl Default for TestInfo {
    fn default() -> Self {
        Self {
            name: "Unnamed Test".to_string(),
            description: None,
            max_points: 1.0,
            points_lost_on_failure: 0.0,
            include_in_results: true,
            hidden: false,
        }
    }
}

impl TestInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn max_points(mut self, max_points: f64) -> Self {
        self.max_points = max_points;
        self
    }

    pub fn points_lost_on_failure(mut self, points: f64) -> Self {
        self.points_lost_on_failure = points;
        self
    }

    pub fn include_in_results(mut self, include: bool) -> Self {
        self.include_in_results = include;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }
}

/// Result of one test or sub-test.
///
/// `points`, `message`, `output` and `images` are free for test code to set
/// while the test runs. The recorder only fills `points` and `message` with
/// defaults when they are still unset at resolution time.
#[derive(Debug, Clone, PartialEq)]
pub struct TestOutcome {
    pub info: TestInfo,
    pub points: Option<f64>,
    pub message: Option<String>,
    pub output: Option<String>,
    pub images: Vec<Image>,
    status: TestStatus,
    filed: bool,
}

impl TestOutcome {
    pub fn new(info: TestInfo) -> Self {
        Self {
            info,
            points: None,
            message: None,
            output: None,
            images: Vec::new(),
            status: TestStatus::Scheduled,
            filed: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn status(&self) -> TestStatus {
        self.status
    }

    /// Whether the recorder has already placed this outcome into a partition
    pub fn is_filed(&self) -> bool {
        self.filed
    }

    pub(crate) fn mark_filed(&mut self) {
        self.filed = true;
    }

    /// Move the outcome forward along the state machine
    pub fn advance(&mut self, next: TestStatus) -> Result<(), GradingError> {
        if !self.status.can_transition_to(next) {
            return Err(GradingError::Transition {
                name: self.info.name.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn set_points(&mut self, points: f64) {
        self.points = Some(points);
    }

    pub fn set_message(&mut self, message: impl Into<String>) {
        self.message = Some(message.into());
    }

    pub fn set_output(&mut self, output: impl Into<String>) {
        self.output = Some(output.into());
    }

    pub fn add_image(&mut self, image: Image) {
        self.images.push(image);
    }

    /// Student-visible record; empty optional fields are dropped
    pub fn record(&self) -> TestRecord {
        TestRecord {
            name: self.info.name.clone(),
            description: non_empty(&self.info.description),
            max_points: self.info.max_points,
            points: self.points.unwrap_or(0.0),
            message: non_empty(&self.message),
            output: non_empty(&self.output),
            images: self.images.clone(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|s| !s.is_empty()).cloned()
}

/// One entry of the `tests` list in the published artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub max_points: f64,
    pub points: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
}

/// The artifact handed to the grading host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingResults {
    pub gradable: bool,
    /// Percentage, 0 to 100
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<Image>,
    #[serde(default)]
    pub tests: Vec<TestRecord>,
}
