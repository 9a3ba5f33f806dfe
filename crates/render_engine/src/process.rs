//! Process supervision state machine.
//!
//! [`ProcessAdapter`] turns a [`RenderRecipe`] into an [`EngineAdapter`]. It
//! owns at most one child process, drains its stdout on a [`LogReader`]
//! thread, feeds its stdin from an [`InputWriter`] thread, and on every
//! [`status`](EngineAdapter::status) call:
//!
//! 1. Exit code 0: collect artifacts, reset the attempt counter → `Success`.
//! 2. Non-zero exit: ask the recipe whether the output exists anyway; if so
//!    treat as (1), otherwise restart while attempts remain, else `Failure`.
//! 3. Still running past the timeout: kill it, then apply (2).
//!
//! Every error on the way (launch, capture, cleanup) is logged and folded into
//! one of those transitions, so an observed exit never leaves the adapter
//! `Running`.

use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterSettings, EngineAdapter};
use crate::artifact::Artifacts;
use crate::clock::{Clock, SystemClock};
use crate::error::EngineError;
use crate::input_writer::InputWriter;
use crate::log_reader::LogReader;
use crate::recipe::{RenderContext, RenderRecipe};
use crate::state::ProcessState;

/// Exit code recorded when the process was terminated by a signal.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

/// Exit code recorded when an attempt could not be launched.
pub const LAUNCH_FAILED_EXIT_CODE: i32 = -2;

/// Exit code recorded when a successful exit left no readable output.
pub const MISSING_OUTPUT_EXIT_CODE: i32 = -3;

/// How long a released process's pipe threads may take to finish.
const PIPE_DRAIN_LIMIT: Duration = Duration::from_secs(2);

/// An [`EngineAdapter`] that supervises one external renderer process.
#[derive(Debug)]
pub struct ProcessAdapter<R> {
    recipe: R,
    settings: AdapterSettings,
    clock: Arc<dyn Clock>,
    scene: Option<String>,
    frame: Option<i64>,
    child: Option<Child>,
    log: Option<LogReader>,
    input: Option<InputWriter>,
    last_exit: Option<i32>,
    artifacts: Artifacts,
    attempt: u32,
    started_at: Option<Instant>,
}

impl<R: RenderRecipe> ProcessAdapter<R> {
    /// Create an adapter using the system clock.
    #[must_use]
    pub fn new(recipe: R, settings: AdapterSettings) -> Self {
        Self {
            recipe,
            settings,
            clock: Arc::new(SystemClock),
            scene: None,
            frame: None,
            child: None,
            log: None,
            input: None,
            last_exit: None,
            artifacts: Artifacts::new(),
            attempt: 0,
            started_at: None,
        }
    }

    /// Measure timeouts against `clock` instead of the system clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The attempt counter: number of launches since the last terminal state.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Exit code of the most recently released process.
    #[must_use]
    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit
    }

    /// OS process id of the live renderer, if any.
    #[must_use]
    pub fn process_id(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    fn launch(&mut self) -> Result<(), EngineError> {
        let scene = self
            .scene
            .as_deref()
            .ok_or(EngineError::NotConfigured("scene"))?;
        let frame = self.frame.ok_or(EngineError::NotConfigured("frame"))?;
        let job = RenderContext {
            settings: &self.settings,
            scene,
            frame,
        };
        let invocation = self.recipe.prepare(&job)?;

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .stdin(if invocation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &invocation.cwd {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(|source| EngineError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;

        self.log = child.stdout.take().map(LogReader::spawn);
        self.input = child
            .stdin
            .take()
            .zip(invocation.stdin)
            .map(|(stdin, bytes)| InputWriter::spawn(stdin, bytes));

        info!(
            engine = self.recipe.node_type(),
            scene,
            frame,
            attempt = self.attempt,
            pid = child.id(),
            "renderer started"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Launch the next attempt of the current job, killing any live process.
    fn restart(&mut self) {
        self.kill();
        self.log = None;
        self.attempt += 1;
        self.started_at = Some(self.clock.now());

        if let Err(e) = self.launch() {
            error!(
                engine = self.recipe.node_type(),
                attempt = self.attempt,
                error = %e,
                "failed to launch renderer"
            );
            self.retry_or_fail(LAUNCH_FAILED_EXIT_CODE);
        }
    }

    /// Kill and reap the live process, leaving the attempt counter alone.
    fn kill(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };

        if let Err(e) = child.kill() {
            debug!(error = %e, "renderer exited before kill");
        }
        let code = match child.wait() {
            Ok(status) => exit_code(status),
            Err(e) => {
                warn!(error = %e, "failed to reap renderer");
                SIGNALLED_EXIT_CODE
            }
        };
        self.last_exit = Some(code);
        info!(engine = self.recipe.node_type(), code, "renderer stopped");
        self.release();
    }

    /// Join the pipe threads and run the recipe's cleanup hook.
    fn release(&mut self) {
        if let Some(mut input) = self.input.take() {
            input.join(PIPE_DRAIN_LIMIT);
        }
        if let Some(log) = self.log.as_mut() {
            log.join(PIPE_DRAIN_LIMIT);
        }
        if let Some(job) = context(&self.settings, &self.scene, self.frame)
            && let Err(e) = self.recipe.cleanup(&job)
        {
            warn!(
                engine = self.recipe.node_type(),
                error = %e,
                "renderer cleanup failed"
            );
        }
    }

    fn check_status(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                self.child = None;
                let code = exit_code(status);
                self.last_exit = Some(code);
                self.release();
                self.resolve(code);
            }
            Ok(None) => {
                if self.timed_out() {
                    warn!(
                        engine = self.recipe.node_type(),
                        attempt = self.attempt,
                        "render timeout exceeded"
                    );
                    self.kill();
                    let code = self.last_exit.unwrap_or(SIGNALLED_EXIT_CODE);
                    self.resolve(code);
                }
            }
            Err(e) => {
                error!(
                    engine = self.recipe.node_type(),
                    error = %e,
                    "failed to poll renderer"
                );
                self.kill();
                let code = self.last_exit.unwrap_or(SIGNALLED_EXIT_CODE);
                self.resolve(code);
            }
        }
    }

    fn timed_out(&self) -> bool {
        match (self.settings.timeout, self.started_at) {
            (Some(limit), Some(started)) => self.clock.now().duration_since(started) > limit,
            _ => false,
        }
    }

    fn resolve(&mut self, code: i32) {
        if code == 0 {
            self.succeed();
            return;
        }

        info!(
            engine = self.recipe.node_type(),
            code,
            attempt = self.attempt,
            "render attempt failed"
        );

        let verified = context(&self.settings, &self.scene, self.frame)
            .is_some_and(|job| self.recipe.verify_despite_failure(&job));
        if verified {
            info!(
                engine = self.recipe.node_type(),
                "found render output despite failure, treating as success"
            );
            self.succeed();
        } else {
            self.retry_or_fail(code);
        }
    }

    fn succeed(&mut self) {
        let collected = match context(&self.settings, &self.scene, self.frame) {
            Some(job) => self.recipe.collect(&job),
            None => Err(EngineError::NotConfigured("scene")),
        };

        match collected {
            Ok(artifacts) => {
                info!(
                    engine = self.recipe.node_type(),
                    outputs = artifacts.len(),
                    attempt = self.attempt,
                    "render succeeded"
                );
                self.artifacts = artifacts;
                self.last_exit = Some(0);
                self.attempt = 0;
            }
            Err(e) => {
                error!(
                    engine = self.recipe.node_type(),
                    error = %e,
                    "failed to capture render output"
                );
                self.retry_or_fail(MISSING_OUTPUT_EXIT_CODE);
            }
        }
    }

    fn retry_or_fail(&mut self, code: i32) {
        if self.attempt < self.settings.attempts {
            info!(
                engine = self.recipe.node_type(),
                next_attempt = self.attempt + 1,
                max_attempts = self.settings.attempts,
                "restarting render"
            );
            self.restart();
        } else {
            warn!(
                engine = self.recipe.node_type(),
                attempts = self.attempt,
                "terminating render after repeated failures"
            );
            self.kill();
            self.last_exit = Some(code);
            self.attempt = 0;
        }
    }
}

impl<R: RenderRecipe> EngineAdapter for ProcessAdapter<R> {
    fn node_type(&self) -> &str {
        self.recipe.node_type()
    }

    fn extension(&self) -> &str {
        self.recipe.extension()
    }

    fn set_scene(&mut self, scene: &str) {
        self.scene = Some(scene.to_string());
    }

    fn set_frame(&mut self, frame: i64) {
        self.frame = Some(frame);
    }

    fn begin_render(&mut self) {
        self.attempt = 0;
        self.restart();
    }

    fn stop_render(&mut self) {
        self.kill();
        self.attempt = 0;
    }

    fn status(&mut self) -> ProcessState {
        self.check_status();
        match (&self.child, self.last_exit) {
            (Some(_), _) => ProcessState::Running,
            (None, None) => ProcessState::Stopped,
            (None, Some(0)) => ProcessState::Success,
            (None, Some(_)) => ProcessState::Failure,
        }
    }

    fn log(&mut self) -> String {
        self.log
            .as_ref()
            .map(|log| log.drain().join("\n"))
            .unwrap_or_default()
    }

    fn last_render(&self) -> &Artifacts {
        &self.artifacts
    }
}

impl<R> Drop for ProcessAdapter<R> {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

fn context<'a>(
    settings: &'a AdapterSettings,
    scene: &'a Option<String>,
    frame: Option<i64>,
) -> Option<RenderContext<'a>> {
    Some(RenderContext {
        settings,
        scene: scene.as_deref()?,
        frame: frame?,
    })
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(SIGNALLED_EXIT_CODE)
}
