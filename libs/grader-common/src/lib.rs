//! Core of the grading harness: the test outcome state machine, sub-test
//! scopes, the run recorder and score aggregation.
//!
//! A run is driven by [`runner::run_suites`], which feeds lifecycle events
//! to a [`RunRecorder`] and hands the finished [`RunReport`] to a
//! [`ResultPublisher`].

pub mod config;
pub mod error;
pub mod publisher;
pub mod recorder;
pub mod runner;
pub mod status;
pub mod subtest;
pub mod summary;
pub mod types;

pub use error::{GradingError, TestError};
pub use publisher::{CollectingPublisher, ResultPublisher};
pub use recorder::{ReportFields, RunRecorder, RunReport, ScoreBounds};
pub use runner::{run_suites, Suite, TestCase, TestContext};
pub use status::TestStatus;
pub use subtest::{SubTestOptions, SubTestScope};
pub use summary::RunSummary;
pub use types::{GradingResults, Image, TestInfo, TestOutcome, TestRecord};
