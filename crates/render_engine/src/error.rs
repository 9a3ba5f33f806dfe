//! Engine-layer error types.

use std::path::PathBuf;

/// Errors that can occur while preparing, launching, or harvesting a render.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The renderer process could not be spawned.
    #[error("failed to spawn renderer `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A filesystem operation on a render input or output failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The renderer reported success but a declared output is missing.
    #[error("expected render output missing: {0}")]
    MissingOutput(PathBuf),

    /// `begin_render` was called before the scene or frame was set.
    #[error("render not configured: {0} is unset")]
    NotConfigured(&'static str),

    /// No adapter is registered for the requested engine type.
    #[error("no adapter registered for engine type `{0}`")]
    UnknownEngine(String),
}

impl EngineError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
