//! Engine-specific render recipes.
//!
//! A [`RenderRecipe`] knows how one renderer is launched and where it leaves
//! its output. [`ProcessAdapter`](crate::ProcessAdapter) supplies everything
//! else: process ownership, retry, timeout, and log capture.

use std::path::PathBuf;

use crate::adapter::AdapterSettings;
use crate::artifact::Artifacts;
use crate::error::EngineError;

/// The job a recipe is asked to run.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// Adapter startup configuration.
    pub settings: &'a AdapterSettings,
    /// Scene identifier, relative to `settings.scene_root`.
    pub scene: &'a str,
    /// Frame number to render.
    pub frame: i64,
}

impl RenderContext<'_> {
    /// Directory of the current scene.
    #[must_use]
    pub fn scene_dir(&self) -> PathBuf {
        self.settings.scene_root.join(self.scene)
    }
}

/// A fully resolved process launch.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Program to execute.
    pub program: PathBuf,
    /// Command-line arguments.
    pub args: Vec<String>,
    /// Working directory, if different from the node's own.
    pub cwd: Option<PathBuf>,
    /// Environment overrides layered on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Bytes written to the process's stdin before it is closed.
    pub stdin: Option<Vec<u8>>,
}

impl Invocation {
    /// Start an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set an environment override.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the process in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Feed `bytes` on stdin.
    #[must_use]
    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }
}

/// The engine-specific half of an adapter.
pub trait RenderRecipe: Send {
    /// Engine key (e.g. `"BLENDER"`).
    fn node_type(&self) -> &str;

    /// Artifact file extension.
    fn extension(&self) -> &str;

    /// Prepare the filesystem for an attempt and describe the process to
    /// launch. Called once per attempt.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if the attempt cannot be launched; the
    /// adapter counts that as a failed attempt.
    fn prepare(&mut self, job: &RenderContext<'_>) -> Result<Invocation, EngineError>;

    /// Read the outputs of a successful attempt and remove the temporary files.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if a declared output cannot be read.
    fn collect(&mut self, job: &RenderContext<'_>) -> Result<Artifacts, EngineError>;

    /// Check whether a failed or timed-out attempt nevertheless produced its
    /// output.
    fn verify_despite_failure(&self, _job: &RenderContext<'_>) -> bool {
        false
    }

    /// Engine-specific tidy-up after a process is released.
    ///
    /// # Errors
    ///
    /// Failures are logged by the adapter and never change its state.
    fn cleanup(&mut self, _job: &RenderContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }
}
