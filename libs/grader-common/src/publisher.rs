use crate::error::GradingError;
use crate::recorder::RunReport;

/// Sink for the finished run.
///
/// Called at most once per run by `RunRecorder::run_ended` (or
/// `publish_ungradable`). The transport and artifact format belong to the
/// implementation.
pub trait ResultPublisher {
    fn publish(&mut self, report: &RunReport) -> Result<(), GradingError>;
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct CollectingPublisher {
    pub reports: Vec<RunReport>,
}

impl ResultPublisher for CollectingPublisher {
    fn publish(&mut self, report: &RunReport) -> Result<(), GradingError> {
        self.reports.push(report.clone());
        Ok(())
    }
}

impl<P: ResultPublisher + ?Sized> ResultPublisher for Box<P> {
    fn publish(&mut self, report: &RunReport) -> Result<(), GradingError> {
        (**self).publish(report)
    }
}
