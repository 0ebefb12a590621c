use std::path::PathBuf;
use thiserror::Error;

/// Errors from building the drivetrain or loading its configuration.
/// Nothing in the per-cycle control path returns these.
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("failed to read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("module geometry is degenerate: {0}")]
    DegenerateGeometry(&'static str),
}
