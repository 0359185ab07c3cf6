//! Error types for Crosscast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosscastError>;

#[derive(Error, Debug)]
pub enum CrosscastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl CrosscastError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosscastError::InvalidInput(_) => 3,
            CrosscastError::Provider(ProviderError::Authentication(_)) => 2,
            CrosscastError::Provider(_) => 1,
            CrosscastError::Config(_) => 1,
            CrosscastError::Database(_) => 1,
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

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("OAuth exchange failed: {0}")]
    OAuth(String),

    #[error("Publishing failed: {0}")]
    Publish(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl ProviderError {
    /// Whether the failure is worth retrying on a later dispatch run.
    ///
    /// Network and rate-limit failures clear on their own; everything else
    /// needs operator action (reconnect the account, fix the content).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Network(_) | ProviderError::RateLimit(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = CrosscastError::InvalidInput("Empty content".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_authentication_error() {
        let provider_error = ProviderError::Authentication("Token revoked".to_string());
        let error = CrosscastError::Provider(provider_error);
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_provider_errors() {
        let cases = vec![
            ProviderError::Validation("too long".to_string()),
            ProviderError::OAuth("grant rejected".to_string()),
            ProviderError::Publish("rejected".to_string()),
            ProviderError::Network("timeout".to_string()),
            ProviderError::RateLimit("slow down".to_string()),
            ProviderError::NotSupported("no publish".to_string()),
        ];
        for case in cases {
            let error = CrosscastError::Provider(case);
            assert_eq!(error.exit_code(), 1);
        }
    }

    #[test]
    fn test_exit_code_config_error() {
        let config_error = ConfigError::MissingField("database.path".to_string());
        let error = CrosscastError::Config(config_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_database_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        let error = CrosscastError::Database(db_error);
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosscastError::InvalidInput("Content cannot be empty".to_string());
        assert_eq!(
            format!("{}", error),
            "Invalid input: Content cannot be empty"
        );

        let error = CrosscastError::Provider(ProviderError::Authentication(
            "Twitter token expired".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Provider error: Authentication failed: Twitter token expired"
        );

        let error = CrosscastError::Config(ConfigError::MissingField(
            "twitter.client_id".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Configuration error: Missing required field: twitter.client_id"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Network("timeout".to_string()).is_retryable());
        assert!(ProviderError::RateLimit("429".to_string()).is_retryable());

        assert!(!ProviderError::Authentication("revoked".to_string()).is_retryable());
        assert!(!ProviderError::Validation("too long".to_string()).is_retryable());
        assert!(!ProviderError::OAuth("bad code".to_string()).is_retryable());
        assert!(!ProviderError::Publish("rejected".to_string()).is_retryable());
        assert!(!ProviderError::NotSupported("no publish".to_string()).is_retryable());
    }

    #[test]
    fn test_error_conversion_from_provider_error() {
        let provider_error = ProviderError::Publish("test".to_string());
        let error: CrosscastError = provider_error.into();

        match error {
            CrosscastError::Provider(_) => {}
            _ => panic!("Expected CrosscastError::Provider"),
        }
    }

    #[test]
    fn test_provider_error_clone() {
        // Clone is required so per-post failures can be both logged and reported
        let original = ProviderError::Network("Connection failed".to_string());
        let cloned = original.clone();

        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<String> {
            Ok("success".to_string())
        }

        fn returns_err() -> Result<String> {
            Err(CrosscastError::InvalidInput("test".to_string()))
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }
}
