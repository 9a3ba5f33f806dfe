//! The uniform renderer interface.

use std::path::PathBuf;
use std::time::Duration;

use crate::artifact::Artifacts;
use crate::state::ProcessState;

/// Startup configuration shared by every adapter.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    /// Path to the renderer executable.
    pub executable: PathBuf,
    /// Renderer-specific user configuration directory.
    pub config_path: PathBuf,
    /// Directory that scene identifiers are resolved against.
    pub scene_root: PathBuf,
    /// Wall-clock budget per attempt. `None` disables the timeout.
    pub timeout: Option<Duration>,
    /// Maximum number of attempts per render, including the first.
    pub attempts: u32,
}

impl AdapterSettings {
    /// Create settings with no timeout and a single attempt.
    #[must_use]
    pub fn new(
        executable: impl Into<PathBuf>,
        config_path: impl Into<PathBuf>,
        scene_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            executable: executable.into(),
            config_path: config_path.into(),
            scene_root: scene_root.into(),
            timeout: None,
            attempts: 1,
        }
    }

    /// Set the per-attempt timeout from seconds. Negative values disable it.
    #[must_use]
    pub fn with_timeout_secs(mut self, secs: f64) -> Self {
        self.timeout = timeout_from_secs(secs);
        self
    }

    /// Set the attempt budget. Values below one are treated as one.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }
}

/// Convert a configured timeout in seconds to a [`Duration`]; negative or
/// non-finite values mean "no timeout".
#[must_use]
pub fn timeout_from_secs(secs: f64) -> Option<Duration> {
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// A renderer the dispatcher can drive.
///
/// Implementations own at most one external process. `status` is the only
/// place state advances: it polls the process, applies the retry and timeout
/// policy, and reports where things stand.
pub trait EngineAdapter: Send {
    /// The engine key jobs use to select this adapter (e.g. `"BLENDER"`).
    fn node_type(&self) -> &str;

    /// File extension of uploaded artifacts (e.g. `"png"`).
    fn extension(&self) -> &str;

    /// Set the scene for the next render.
    fn set_scene(&mut self, scene: &str);

    /// Set the frame for the next render.
    fn set_frame(&mut self, frame: i64);

    /// Stop any running process and launch a new job with the full attempt
    /// budget.
    fn begin_render(&mut self);

    /// Kill the running process, if any, and release it. The job ends here:
    /// the attempt counter is reset.
    fn stop_render(&mut self);

    /// Poll the process and report the resulting state.
    fn status(&mut self) -> ProcessState;

    /// Drain the output captured since the last call.
    fn log(&mut self) -> String;

    /// Artifacts of the most recent successful render.
    fn last_render(&self) -> &Artifacts;
}
