use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, BaselineError>;

#[derive(thiserror::Error, Debug)]
pub enum BaselineError {
    #[error("Input error: {0}")]
    Input(String),
    #[error("Serializer error: {0}")]
    Serializer(String),
    #[error("Reader error: {0}")]
    Reader(String),
    #[error("Comparison error: {0}")]
    Comparison(String),
    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl BaselineError {
    /// Wraps an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BaselineError::Io {
            path: path.into(),
            source,
        }
    }
}
