/// Results File Publisher
///
/// Renders a short human-readable summary with handlebars, puts it in front
/// of the run message and writes the artifact as pretty JSON.

use grader_common::{GradingError, GradingResults, ResultPublisher, RunReport, RunSummary};
use handlebars::Handlebars;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const SUMMARY_TEMPLATE: &str = "Score: {{score}}%
Visible tests: {{visible.passed}}/{{visible.available}} passed, {{visible.earned}}/{{visible.points}} points
{{#if has_hidden}}Hidden tests: {{hidden.passed}}/{{hidden.available}} passed, {{hidden.earned}}/{{hidden.points}} points
{{/if}}Total: {{total.earned}}/{{total.points}} points{{#unless gradable}}
This submission could not be graded.{{/unless}}";

pub struct JsonFilePublisher {
    path: PathBuf,
    handlebars: Handlebars<'static>,
    last: Option<GradingResults>,
}

impl JsonFilePublisher {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, GradingError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // plain text, not HTML
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string("summary", SUMMARY_TEMPLATE)
            .map_err(|e| GradingError::Render(e.to_string()))?;

        Ok(Self {
            path: path.into(),
            handlebars,
            last: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The artifact written by the last publish, if any
    pub fn last(&self) -> Option<&GradingResults> {
        self.last.as_ref()
    }

    pub fn render_summary(&self, report: &RunReport) -> Result<String, GradingError> {
        let data = json!({
            "score": format_number(report.score * 100.0),
            "gradable": report.gradable,
            "has_hidden": report.hidden_summary.available > 0,
            "visible": summary_data(&report.visible_summary),
            "hidden": summary_data(&report.hidden_summary),
            "total": summary_data(&report.total_summary),
        });
        self.handlebars
            .render("summary", &data)
            .map_err(|e| GradingError::Render(e.to_string()))
    }
}

impl ResultPublisher for JsonFilePublisher {
    fn publish(&mut self, report: &RunReport) -> Result<(), GradingError> {
        let summary = self.render_summary(report)?;
        let results = report.clone().into_results(Some(&summary));

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&results)?;
        fs::write(&self.path, content)?;

        info!(
            path = %self.path.display(),
            gradable = results.gradable,
            score = results.score,
            tests = results.tests.len(),
            "Results written"
        );
        self.last = Some(results);
        Ok(())
    }
}

fn summary_data(summary: &RunSummary) -> serde_json::Value {
    json!({
        "available": summary.available,
        "passed": summary.passed,
        "points": format_number(summary.points_available),
        "earned": format_number(summary.points_earned),
    })
}

/// At most two decimals, no trailing zeros, never "-0"
fn format_number(value: f64) -> String {
    let rounded = (value * 100.0).round() / 100.0 + 0.0;
    format!("{}", rounded)
}
