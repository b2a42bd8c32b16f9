use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuarryError {
    /// No conversion is registered for a value type
    #[error("No conversion registered for type `{0}`")]
    UnknownType(String),

    /// Malformed mapping metadata, raised before any database I/O
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The storage engine rejected a row (NOT NULL, UNIQUE, CHECK, FOREIGN KEY)
    #[error("Constraint violation ({code}): {message}")]
    ConstraintViolation { code: i32, message: String },

    /// Any other storage engine failure, carrying the engine's raw code
    #[error("Engine error ({code}): {message}")]
    Engine { code: i32, message: String },

    /// A stored value could not be decoded into the field's type
    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A record of one type was handed to a descriptor of another
    #[error("Type mismatch: expected `{expected}`")]
    TypeMismatch { expected: &'static str },

    /// No rows returned when one was expected
    #[error("No rows found")]
    NotFound,

    /// The schema version cannot be brought to the target version
    #[error("Migration error: {0}")]
    Migration(String),
}

impl QuarryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// Whether the engine reported a constraint violation.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Self::ConstraintViolation { .. })
    }
}

#[cfg(feature = "rusqlite")]
impl From<rusqlite::Error> for QuarryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                if failure.code == rusqlite::ErrorCode::ConstraintViolation {
                    Self::ConstraintViolation {
                        code: failure.extended_code,
                        message,
                    }
                } else {
                    Self::Engine {
                        code: failure.extended_code,
                        message,
                    }
                }
            }
            rusqlite::Error::QueryReturnedNoRows => Self::NotFound,
            other => Self::Engine {
                code: -1,
                message: other.to_string(),
            },
        }
    }
}

/// Result type for mapping and database operations
pub type Result<T> = std::result::Result<T, QuarryError>;
