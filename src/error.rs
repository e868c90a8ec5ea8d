//! Error types for dbdeck.

use thiserror::Error;

/// The main error type for dbdeck operations.
///
/// Reads against the catalog never surface [`Error::CatalogUnavailable`] to
/// callers of [`crate::Session`]; the session degrades them to empty results.
/// Write and DDL failures always carry the backend's native message verbatim.
#[derive(Debug, Error)]
pub enum Error {
    /// Connecting failed (bad credentials, unreachable host, backend not compiled in).
    #[error("{0}")]
    Connect(String),

    /// An introspection query failed or returned nothing.
    #[error("Catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// A statement failed on the server.
    #[error("{message}")]
    Statement {
        /// Position of the statement inside a script, if it came from one.
        index: Option<usize>,
        /// Native error code (SQLSTATE or vendor number) when the client exposes one.
        code: Option<String>,
        message: String,
    },

    /// A best-effort kill could not be delivered.
    #[error("Timeout advisory: {0}")]
    TimeoutAdvisory(String),

    /// The backend does not offer this operation or operator.
    #[error("Not supported by {backend}: {what}")]
    Unsupported { backend: &'static str, what: String },

    /// The caller passed something unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a statement error from a native message.
    pub fn statement(message: impl Into<String>) -> Self {
        Self::Statement {
            index: None,
            code: None,
            message: message.into(),
        }
    }

    /// Create a statement error carrying a native code.
    pub fn statement_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Statement {
            index: None,
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Create an unsupported-operation error.
    pub fn unsupported(backend: &'static str, what: impl Into<String>) -> Self {
        Self::Unsupported {
            backend,
            what: what.into(),
        }
    }

    /// Attach a script position to a statement error.
    pub fn at_statement(self, position: usize) -> Self {
        match self {
            Self::Statement { code, message, .. } => Self::Statement {
                index: Some(position),
                code,
                message,
            },
            other => other,
        }
    }

    /// Whether this error only signals a missing catalog feature.
    pub fn is_catalog_unavailable(&self) -> bool {
        matches!(self, Self::CatalogUnavailable(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => Self::Statement {
                index: None,
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
            },
            other => Self::statement(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type alias for dbdeck operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "mssql")]
impl From<tiberius::error::Error> for Error {
    fn from(err: tiberius::error::Error) -> Self {
        match err {
            tiberius::error::Error::Server(token) => Self::Statement {
                index: None,
                code: Some(token.code().to_string()),
                message: token.message().to_string(),
            },
            other => Self::statement(other.to_string()),
        }
    }
}

#[cfg(feature = "oracle")]
impl From<oracle::Error> for Error {
    fn from(err: oracle::Error) -> Self {
        Self::statement(err.to_string())
    }
}

#[cfg(feature = "mongodb")]
impl From<mongodb::error::Error> for Error {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            mongodb::error::ErrorKind::Command(command) => Self::Statement {
                index: None,
                code: Some(command.code.to_string()),
                message: command.message.clone(),
            },
            _ => Self::statement(err.to_string()),
        }
    }
}

#[cfg(feature = "elasticsearch")]
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::statement(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_error_keeps_native_text() {
        let err = Error::statement("Table 'shop.nope' doesn't exist").at_statement(3);
        assert_eq!(err.to_string(), "Table 'shop.nope' doesn't exist");
        match err {
            Error::Statement { index, .. } => assert_eq!(index, Some(3)),
            _ => panic!("expected statement error"),
        }
    }

    #[test]
    fn test_unsupported_display() {
        let err = Error::unsupported("SQLite", "schemas");
        assert_eq!(err.to_string(), "Not supported by SQLite: schemas");
    }
}
