//! The uniform success/failure value returned by checks and teardowns.

/// Anything that reports success or failure with a human description.
pub trait Status {
    /// Whether the thing being described holds.
    fn is_success(&self) -> bool;

    /// One-line human description of the outcome.
    fn status_description(&self) -> &str;

    /// Informational lines gathered while producing the status.
    fn logs(&self) -> &[String];

    /// Detailed error lines, suitable for line-by-line display.
    fn errors(&self) -> &[String];
}

/// A plain [`Status`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleStatus {
    success: bool,
    description: String,
    logs: Vec<String>,
    errors: Vec<String>,
}

impl SimpleStatus {
    /// Create a successful status.
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            success: true,
            description: description.into(),
            logs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Create a failed status with error lines.
    pub fn failure(description: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            description: description.into(),
            logs: Vec::new(),
            errors,
        }
    }

    /// Attach log lines.
    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

impl Status for SimpleStatus {
    fn is_success(&self) -> bool {
        self.success
    }

    fn status_description(&self) -> &str {
        &self.description
    }

    fn logs(&self) -> &[String] {
        &self.logs
    }

    fn errors(&self) -> &[String] {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_has_no_errors() {
        let status = SimpleStatus::success("All good.");
        assert!(status.is_success());
        assert_eq!(status.status_description(), "All good.");
        assert!(status.errors().is_empty());
    }

    #[test]
    fn failure_keeps_errors_in_order() {
        let status = SimpleStatus::failure("Broken.", vec!["first".into(), "second".into()]);
        assert!(!status.is_success());
        assert_eq!(status.errors(), &["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn logs_are_attached() {
        let status = SimpleStatus::success("ok").with_logs(vec!["a".into()]);
        assert_eq!(status.logs(), &["a".to_string()]);
    }
}
