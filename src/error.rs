use std::path::PathBuf;

/// Failure of one pipeline run, or of the invocation as a whole for `Validation`.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode {path}: {message}")]
    Decode { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Validation(String),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("MIDI error for {path}: {message}")]
    Midi { path: PathBuf, message: String },

    #[error("cancelled before {path} was processed")]
    Cancelled { path: PathBuf },
}

impl PipelineError {
    pub fn decode(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Decode {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn midi(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Midi {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
