//! Error type shared by every stage of the coarsening pipeline.
//!
//! No stage recovers from its own errors: a failure while embedding aborts before
//! clustering and a failure while clustering aborts before the operator is built.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("a graph or an adjacency matrix should be provided")]
    MissingInput,

    #[error("adjacency matrix must be square, got {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("invalid number of clusters: {requested} requested for {nodes} nodes")]
    InvalidClusterCount { requested: usize, nodes: usize },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("unsupported option: {0}")]
    UnsupportedOption(String),

    #[error("backend returned an invalid result: {0}")]
    Backend(String),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("invalid configuration file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("failed to read matrix market file: {0}")]
    MatrixMarket(#[from] sprs::io::IoError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by what the caller asked for rather than by a failing
    /// backend or the environment.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::MissingInput
                | Error::NotSquare { .. }
                | Error::InvalidClusterCount { .. }
                | Error::InvalidParameter(_)
                | Error::UnsupportedOption(_)
                | Error::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::Error;

    #[test]
    fn configuration_family() {
        assert!(Error::MissingInput.is_configuration());
        assert!(Error::UnsupportedOption("spectral".into()).is_configuration());
        assert!(Error::InvalidClusterCount {
            requested: 0,
            nodes: 4
        }
        .is_configuration());
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(!Error::from(io).is_configuration());
        assert!(!Error::Backend("short".into()).is_configuration());
    }

    #[test]
    fn messages_name_the_problem() {
        let err = Error::NotSquare { rows: 3, cols: 4 };
        assert_eq!(err.to_string(), "adjacency matrix must be square, got 3x4");
        let err = Error::InvalidClusterCount {
            requested: 9,
            nodes: 4,
        };
        assert!(err.to_string().contains("9 requested for 4 nodes"));
    }
}
