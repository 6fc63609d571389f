// Worker settings, read once from the environment
use grader_common::config::GradingDirs;
use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub dirs: GradingDirs,
    pub log_format: LogFormat,
    /// Print the results artifact on stdout once it is written
    pub echo_results: bool,
}

impl WorkerSettings {
    /// GRADE_DIR / GRADER_SUITE / GRADER_RESULTS for paths,
    /// GRADER_LOG_FORMAT (pretty | json), GRADER_ECHO (true | 1)
    pub fn from_env() -> Self {
        let log_format = env::var("GRADER_LOG_FORMAT")
            .map(|v| LogFormat::parse(&v))
            .unwrap_or(LogFormat::Pretty);
        let echo_results = env::var("GRADER_ECHO")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            dirs: GradingDirs::from_env(),
            log_format,
            echo_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse("json"), LogFormat::Json);
        assert_eq!(LogFormat::parse("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse("pretty"), LogFormat::Pretty);
        assert_eq!(LogFormat::parse("anything else"), LogFormat::Pretty);
    }
}
