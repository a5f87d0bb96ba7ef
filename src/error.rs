use std::path::PathBuf;

/// Result type for harness operations
pub type RegressResult<T> = Result<T, RegressError>;

/// Error types for harness operations
#[derive(Debug)]
pub enum RegressError {
    /// Invalid command-line or environment configuration
    Config(String),

    /// Corpus repository preparation error (clone, checkout, helpers)
    Repo(String),

    /// Malformed skip/ignore/group input file
    List { path: PathBuf, reason: String },

    /// I/O error
    Io(std::io::Error),

    /// JSON parse error
    Json(serde_json::Error),
}

impl std::fmt::Display for RegressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegressError::Config(msg) => write!(f, "Configuration error: {}", msg),
            RegressError::Repo(msg) => write!(f, "Repository error: {}", msg),
            RegressError::List { path, reason } => {
                write!(f, "List error in {}: {}", path.display(), reason)
            }
            RegressError::Io(err) => write!(f, "I/O error: {}", err),
            RegressError::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for RegressError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegressError::Config(_) => None,
            RegressError::Repo(_) => None,
            RegressError::List { .. } => None,
            RegressError::Io(err) => Some(err),
            RegressError::Json(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for RegressError {
    fn from(err: std::io::Error) -> Self {
        RegressError::Io(err)
    }
}

impl From<serde_json::Error> for RegressError {
    fn from(err: serde_json::Error) -> Self {
        RegressError::Json(err)
    }
}
