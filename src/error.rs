use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable machine-readable code for each failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidRequest,
    AcquisitionFailed,
    ConversionFailed,
    ToolUnavailable,
    PersistenceFailed,
    Io,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidRequest => "INVALID_REQUEST",
            Self::AcquisitionFailed => "ACQUISITION_FAILED",
            Self::ConversionFailed => "CONVERSION_FAILED",
            Self::ToolUnavailable => "TOOL_UNAVAILABLE",
            Self::PersistenceFailed => "PERSISTENCE_FAILED",
            Self::Io => "IO_FAILED",
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    AcquisitionFailed(String),

    #[error("{0}")]
    ConversionFailed(String),

    #[error("{tool} no esta instalado en el sistema. Instala {tool} y reinicia el backend.")]
    ToolUnavailable { tool: String },

    #[error("{0}")]
    PersistenceFailed(String),

    #[error("{operation} fallo en {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: io::Error,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::AcquisitionFailed(_) => ErrorKind::AcquisitionFailed,
            Self::ConversionFailed(_) => ErrorKind::ConversionFailed,
            Self::ToolUnavailable { .. } => ErrorKind::ToolUnavailable,
            Self::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    pub(crate) fn acquisition(message: impl Into<String>) -> Self {
        Self::AcquisitionFailed(message.into())
    }

    pub(crate) fn conversion(message: impl Into<String>) -> Self {
        Self::ConversionFailed(message.into())
    }

    pub(crate) fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceFailed(message.into())
    }

    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}
