use thiserror::Error;

/// Bridge error types covering foreign-call failures, invalid instances, and payload decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    /// A blocking foreign call completed with a non-zero return code,
    /// or was rejected before it could complete.
    #[error("error {op}: {message} (code {code})")]
    Foreign {
        /// Name of the foreign operation (`new`, `destroy`, `set_alarm`, ...).
        op: &'static str,
        /// Return code reported by the library.
        code: i32,
        /// Message supplied by the library, possibly empty.
        message: String,
    },

    /// Operation attempted on a nil or already destroyed instance.
    #[error("invalid instance: {0}")]
    InvalidInstance(String),

    /// Argument could not be passed across the foreign boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A reply from the library could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Configuration or initialization error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ClockError {
    /// Build a foreign-call error from the raw reply of the library.
    pub fn foreign(op: &'static str, code: i32, message: impl Into<String>) -> Self {
        Self::Foreign {
            op,
            code,
            message: message.into(),
        }
    }

    /// Returns true if the error was reported by the foreign library.
    #[must_use]
    pub fn is_foreign(&self) -> bool {
        matches!(self, Self::Foreign { .. })
    }
}

/// Convenience type alias for bridge operations.
pub type ClockResult<T> = Result<T, ClockError>;
