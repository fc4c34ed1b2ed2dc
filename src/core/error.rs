use thiserror::Error;

/// Errors surfaced by the reporting pipeline and its collaborators.
#[derive(Error, Debug)]
pub enum ReporterError {
    /// Invalid or incomplete reporter configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A registered metric name that does not follow the encoded key layout
    #[error("Unparseable metric name: {0}")]
    UnparseableName(String),

    /// The remote service rejected a batch submission
    #[error("Submission error: {0}")]
    Submission(String),

    /// Wire-format serialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO failure in a sink implementation
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for reporter operations
pub type Result<T> = std::result::Result<T, ReporterError>;

impl ReporterError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new unparseable-name error
    pub fn unparseable<S: Into<String>>(msg: S) -> Self {
        Self::UnparseableName(msg.into())
    }

    /// Creates a new submission error
    pub fn submission<S: Into<String>>(msg: S) -> Self {
        Self::Submission(msg.into())
    }

    /// Returns true if the next reporting cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Submission(_) | Self::Io(_) => true,
            Self::Config(_) | Self::UnparseableName(_) | Self::Serialization(_) => false,
        }
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::UnparseableName(_) => "codec",
            Self::Submission(_) => "submission",
            Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}
