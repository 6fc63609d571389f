mod config;
mod engine;
mod evaluator;
mod executor;
mod publisher;

#[cfg(test)]
mod engine_tests;

use anyhow::Context;
use config::{LogFormat, WorkerSettings};
use engine::ProcessEngine;
use grader_common::config::SuiteFile;
use grader_common::{run_suites, GradingError, RunRecorder, Suite};
use publisher::JsonFilePublisher;
use tokio::runtime::Handle;
use tracing::{error, info, info_span, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = WorkerSettings::from_env();
    init_tracing(settings.log_format);

    let run_id = uuid::Uuid::new_v4();
    let handle = Handle::current();

    // Test bodies block on program runs, so the whole run lives on a blocking thread
    tokio::task::spawn_blocking(move || {
        let span = info_span!("grading_run", run_id = %run_id);
        let _entered = span.enter();
        grade(&settings, &handle)
    })
    .await
    .context("Grading task panicked")?
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn grade(settings: &WorkerSettings, handle: &Handle) -> anyhow::Result<()> {
    let dirs = &settings.dirs;
    info!(
        grade_dir = %dirs.root.display(),
        suite_file = %dirs.suite_file.display(),
        results_file = %dirs.results_file.display(),
        "Grader booting..."
    );

    let mut publisher = JsonFilePublisher::new(&dirs.results_file)?;
    let mut recorder = RunRecorder::new();

    match load_suites(settings, handle) {
        Ok(suites) => {
            run_suites(&suites, &mut recorder, &mut publisher)
                .context("Failed to publish grading results")?;
        }
        Err(e) => {
            error!(error = %e, "Cannot grade this submission");
            recorder
                .publish_ungradable(&e.to_string(), &mut publisher)
                .context("Failed to publish ungradable results")?;
        }
    }

    let Some(results) = publisher.last() else {
        anyhow::bail!("Grading finished without publishing results");
    };
    info!(
        gradable = results.gradable,
        score = results.score,
        tests = results.tests.len(),
        results_file = %publisher.path().display(),
        "Grading complete"
    );

    if settings.echo_results {
        println!("{}", serde_json::to_string_pretty(results)?);
    }
    Ok(())
}

fn load_suites(settings: &WorkerSettings, handle: &Handle) -> Result<Vec<Suite>, GradingError> {
    let dirs = &settings.dirs;
    let file = SuiteFile::load(&dirs.suite_file)?;

    let problems = file.validate();
    if !problems.is_empty() {
        for problem in &problems {
            warn!(problem = %problem, "Suite file problem");
        }
        return Err(GradingError::Suite(problems.join("\n")));
    }

    let data = dirs.load_data()?;
    Ok(executor::build_suites(
        &file,
        dirs,
        &data,
        &ProcessEngine::new(),
        handle,
    ))
}
