use thiserror::Error;

use crate::status::TestStatus;

/// Message used when test code signals an ungradable submission without
/// saying why.
pub const DEFAULT_UNGRADABLE_MESSAGE: &str = "Your submission is ungradable for some reason.\n\
     Ask your instructor to update their test cases to provide you \
     a better explanation for what went wrong";

/// Errors raised by the harness itself, as opposed to the code under test
#[derive(Error, Debug)]
pub enum GradingError {
    /// Score bounds outside [0, 1] or floor above ceiling
    #[error("{0}")]
    Configuration(String),

    /// A lifecycle event tried to move an outcome backwards or out of a terminal state
    #[error("Illegal status transition for '{name}': {from} -> {to}")]
    Transition {
        name: String,
        from: TestStatus,
        to: TestStatus,
    },

    /// The suite file could not be understood
    #[error("Invalid suite file: {0}")]
    Suite(String),

    /// Summary rendering failed
    #[error("Failed to render results summary: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Why a test or sub-test body stopped early.
///
/// `Failure` is the assertion-style outcome: it is caught at the test or
/// sub-test boundary and turned into a FAILED status. The other two variants
/// crash the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TestError {
    #[error("{0}")]
    Failure(String),

    #[error("{0}")]
    Crash(String),

    #[error("{0}")]
    Ungradable(String),
}

impl TestError {
    pub fn failure(message: impl Into<String>) -> Self {
        TestError::Failure(message.into())
    }

    pub fn crash(message: impl Into<String>) -> Self {
        TestError::Crash(message.into())
    }

    pub fn ungradable(message: impl Into<String>) -> Self {
        TestError::Ungradable(message.into())
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, TestError::Failure(_))
    }

    /// Reason text used in crash diagnostics.
    ///
    /// Ungradable signals are reported verbatim since the test author wrote
    /// them for the student; anything else is framed as an unexpected error.
    /// An ungradable signal with no text gets the stock explanation.
    pub fn crash_reason(&self) -> String {
        match self {
            TestError::Ungradable(message) if message.trim().is_empty() => {
                DEFAULT_UNGRADABLE_MESSAGE.to_string()
            }
            TestError::Ungradable(message) => message.clone(),
            TestError::Crash(message) | TestError::Failure(message) => format!(
                "An unexpected error occurred when testing.\nError: {}\n",
                message
            ),
        }
    }
}

impl From<std::io::Error> for TestError {
    fn from(err: std::io::Error) -> Self {
        TestError::Crash(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for TestError {
    fn from(err: serde_json::Error) -> Self {
        TestError::Crash(format!("JSON error: {}", err))
    }
}

/// Return a `TestError::Failure` from the enclosing test body unless the
/// condition holds.
///
/// ```
/// use grader_common::{check, TestError};
///
/// fn body(answer: i32) -> Result<(), TestError> {
///     check!(answer == 42, "expected 42, got {}", answer);
///     Ok(())
/// }
///
/// assert!(body(42).is_ok());
/// assert!(body(7).unwrap_err().is_failure());
/// ```
#[macro_export]
macro_rules! check {
    ($cond:expr $(,)?) => {
        if !$cond {
            return ::std::result::Result::Err($crate::TestError::Failure(
                ::std::format!("check failed: {}", ::std::stringify!($cond)),
            ));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return ::std::result::Result::Err($crate::TestError::Failure(
                ::std::format!($($arg)+),
            ));
        }
    };
}

/// Equality flavour of [`check!`]; the failure message shows both sides.
#[macro_export]
macro_rules! check_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return ::std::result::Result::Err($crate::TestError::Failure(
                        ::std::format!("expected {:?}, got {:?}", right, left),
                    ));
                }
            }
        }
    };
    ($left:expr, $right:expr, $($arg:tt)+) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return ::std::result::Result::Err($crate::TestError::Failure(
                        ::std::format!($($arg)+),
                    ));
                }
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checked(value: i32) -> Result<(), TestError> {
        check!(value > 0);
        check_eq!(value % 2, 0, "{} is odd", value);
        Ok(())
    }

    #[test]
    fn test_check_macros() {
        assert!(checked(4).is_ok());
        assert_eq!(
            checked(-1),
            Err(TestError::failure("check failed: value > 0"))
        );
        assert_eq!(checked(3), Err(TestError::failure("3 is odd")));
    }

    #[test]
    fn test_crash_reason() {
        let ungradable = TestError::ungradable("instructor program missing");
        assert_eq!(ungradable.crash_reason(), "instructor program missing");

        let crash = TestError::crash("index out of bounds");
        assert!(crash.crash_reason().contains("Error: index out of bounds"));
        assert!(!crash.is_failure());

        let silent = TestError::ungradable("");
        assert_eq!(silent.crash_reason(), DEFAULT_UNGRADABLE_MESSAGE);
    }

    #[test]
    fn test_io_error_is_crash() {
        let err: TestError = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert!(matches!(err, TestError::Crash(_)));
    }
}
