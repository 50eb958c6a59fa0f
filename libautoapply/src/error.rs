//! Error types for AutoApply

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutoApplyError>;

#[derive(Error, Debug)]
pub enum AutoApplyError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl AutoApplyError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            AutoApplyError::InvalidInput(_) => 3,
            AutoApplyError::Platform(PlatformError::Authentication(_)) => 2,
            AutoApplyError::Platform(_) => 1,
            AutoApplyError::Config(_) => 1,
            AutoApplyError::Database(_) => 1,
            AutoApplyError::Serialization(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors surfaced by job-platform collaborators.
///
/// `QuotaExceeded` is deliberately absent: a refused rate check is a
/// deferred state carried by `RateDecision`, not an error.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Job search failed: {0}")]
    Search(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Notification failed: {0}")]
    Notification(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = AutoApplyError::InvalidInput("empty user id".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let error = AutoApplyError::Platform(PlatformError::Authentication(
            "session expired".to_string(),
        ));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        let submission = AutoApplyError::Platform(PlatformError::Submission("form".to_string()));
        let network = AutoApplyError::Platform(PlatformError::Network("timeout".to_string()));
        let search = AutoApplyError::Platform(PlatformError::Search("500".to_string()));
        let notification =
            AutoApplyError::Platform(PlatformError::Notification("smtp".to_string()));

        assert_eq!(submission.exit_code(), 1);
        assert_eq!(network.exit_code(), 1);
        assert_eq!(search.exit_code(), 1);
        assert_eq!(notification.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_and_database() {
        let config = AutoApplyError::Config(ConfigError::MissingField("database.path".into()));
        assert_eq!(config.exit_code(), 1);

        let db = AutoApplyError::Database(DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        )));
        assert_eq!(db.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = AutoApplyError::Platform(PlatformError::Submission(
            "could not locate apply button".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Platform error: Submission failed: could not locate apply button"
        );

        let error = AutoApplyError::InvalidInput("offset must be non-negative".to_string());
        assert_eq!(
            format!("{}", error),
            "Invalid input: offset must be non-negative"
        );
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let platform_error = PlatformError::Network("connection refused".to_string());
        let error: AutoApplyError = platform_error.into();
        assert!(matches!(error, AutoApplyError::Platform(_)));
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("connection reset".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
