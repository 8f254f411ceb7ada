use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("failed to open capture device {device}: {source}")]
    Open {
        device: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to set capture filter: {0}")]
    Filter(String),

    #[error("failed to set capture direction: {0}")]
    Direction(String),

    #[error("capture read failed: {0}")]
    Read(#[from] ReadError),
}

/// Why a blocking frame read gave up.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("capture source closed")]
    Closed,
}

impl Error {
    /// True if the session was closed underneath a read.
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Read(ReadError::Closed))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
