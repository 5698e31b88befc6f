use thiserror::Error as ThisError;

pub type Result<T> = std::result::Result<T, ServerPromiseError>;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum ServerPromiseError {
    #[error("no provider found. Did you forget to wrap the tree in a ServerPromiseProvider?")]
    NoProvider,

    #[error("cache snapshot could not be parsed: {0}")]
    Parse(String),

    #[error("value could not be serialized: {0}")]
    Serialization(String),

    #[error("cached value for {key} could not be deserialized: {message}")]
    Deserialization { key: String, message: String },

    #[error("no entry for key {0}")]
    MissingEntry(String),

    #[error("no snapshot file given and SERVER_PROMISE_SNAPSHOT is not set")]
    NoSnapshot,

    #[error("I/O error: {0}")]
    Io(String),
}

impl ServerPromiseError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoProvider => "NO_PROVIDER",
            Self::Parse(_) => "PARSE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Deserialization { .. } => "DESERIALIZATION_ERROR",
            Self::MissingEntry(_) => "MISSING_ENTRY",
            Self::NoSnapshot => "NO_SNAPSHOT",
            Self::Io(_) => "IO_ERROR",
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    pub fn deserialization(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Deserialization { key: key.into(), message: message.into() }
    }

    /// True for misuse of the API rather than bad data.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::NoProvider | Self::NoSnapshot)
    }
}

impl From<std::io::Error> for ServerPromiseError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for ServerPromiseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_provider_message() {
        let error = ServerPromiseError::NoProvider;
        assert!(error.to_string().starts_with("no provider found"));
        assert_eq!(error.code(), "NO_PROVIDER");
        assert!(error.is_configuration());
    }

    #[test]
    fn test_io_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "snapshot missing");
        let error: ServerPromiseError = io_error.into();

        match error {
            ServerPromiseError::Io(msg) => assert!(msg.contains("snapshot missing")),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_json_conversion_is_serialization() {
        let json_error = serde_json::from_str::<u32>("nope").unwrap_err();
        let error: ServerPromiseError = json_error.into();

        assert_eq!(error.code(), "SERIALIZATION_ERROR");
        assert!(!error.is_configuration());
    }

    #[test]
    fn test_missing_entry_is_not_io() {
        let error = ServerPromiseError::MissingEntry(":r0:".to_string());
        assert_eq!(error.to_string(), "no entry for key :r0:");
        assert_eq!(error.code(), "MISSING_ENTRY");

        assert!(ServerPromiseError::NoSnapshot.is_configuration());
        assert_eq!(ServerPromiseError::NoSnapshot.code(), "NO_SNAPSHOT");
    }

    #[test]
    fn test_deserialization_display() {
        let error = ServerPromiseError::deserialization("user", "invalid type");
        assert_eq!(
            error.to_string(),
            "cached value for user could not be deserialized: invalid type"
        );
    }
}
