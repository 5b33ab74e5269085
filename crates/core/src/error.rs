/// Result alias that carries the custom [`AtmoError`] type.
pub type Result<T> = std::result::Result<T, AtmoError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum AtmoError {
    /// Free-form failure reported by a collaborator.
    #[error("{0}")]
    Message(String),
    /// An API argument was outside the accepted domain.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The audio capture source could not be acquired.
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration files that are not valid JSON.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Failure inside the FFT backend.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl AtmoError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for AtmoError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AtmoError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
