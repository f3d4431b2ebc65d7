/// Application-level error carrying the process exit code.
///
/// Exit codes:
/// - `2`: bad input (files, configuration, arguments)
/// - `3`: nothing to process (no exposures found)
/// - `4`: internal failure
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// A requested extraction window does not fit inside the source frame.
///
/// This is the only error the line fitter raises; a fit that does not
/// converge is reported through `FitResult::convergence` instead.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RangeError {
    #[error("window [{start}, {end}) falls outside frame columns [0, {cols})")]
    Columns { start: i64, end: i64, cols: usize },
    #[error("row range [{start}, {end}) falls outside frame rows [0, {rows})")]
    Rows { start: usize, end: usize, rows: usize },
    #[error("window half-width must be > 0")]
    EmptyWindow,
    #[error("window center {0} is not a finite pixel coordinate")]
    NonFiniteCenter(f64),
}

impl From<RangeError> for AppError {
    fn from(err: RangeError) -> Self {
        AppError::new(2, format!("Extraction window error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_error_converts_to_input_error() {
        let err: AppError = RangeError::Columns { start: -5, end: 15, cols: 100 }.into();
        assert_eq!(err.exit_code(), 2);
        assert_eq!(
            err.to_string(),
            "Extraction window error: window [-5, 15) falls outside frame columns [0, 100)"
        );
    }
}
