use thiserror::Error;

/// Top-level error type for the AquaMind system.
///
/// Subsystem crates define their own error types and convert into
/// `AquaError` where they cross into the application layer, so that `?`
/// works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AquaError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chat error: {0}")]
    Chat(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for AquaError {
    fn from(err: toml::de::Error) -> Self {
        AquaError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for AquaError {
    fn from(err: toml::ser::Error) -> Self {
        AquaError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for AquaError {
    fn from(err: serde_json::Error) -> Self {
        AquaError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for AquaMind operations.
pub type Result<T> = std::result::Result<T, AquaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AquaError::Config("missing field".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing field");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: AquaError = io_err.into();
        assert!(matches!(err, AquaError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse_err = toml::from_str::<toml::Value>("= broken").unwrap_err();
        let err: AquaError = parse_err.into();
        assert!(matches!(err, AquaError::Config(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: AquaError = parse_err.into();
        assert!(matches!(err, AquaError::Serialization(_)));
        assert!(err.to_string().starts_with("Serialization error:"));
    }

    #[test]
    fn test_error_display_all_variants() {
        let cases: Vec<(AquaError, &str)> = vec![
            (AquaError::Chat("x".into()), "Chat error: x"),
            (AquaError::Api("bind".into()), "API error: bind"),
            (AquaError::Serialization("bad".into()), "Serialization error: bad"),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }
}
