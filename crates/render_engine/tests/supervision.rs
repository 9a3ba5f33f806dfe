//! Process supervision against real `/bin/sh` children.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use render_engine::artifact::DEFAULT_LABEL;
use render_engine::{
    AdapterSettings, Artifacts, EngineAdapter, EngineError, Invocation, ManualClock,
    ProcessAdapter, ProcessState, RenderContext, RenderRecipe,
};

/// Recipe that runs a shell script and treats `output` as the render result.
#[derive(Debug)]
struct ScriptRecipe {
    script: String,
    output: PathBuf,
    input: Option<Vec<u8>>,
}

impl RenderRecipe for ScriptRecipe {
    fn node_type(&self) -> &str {
        "SCRIPT"
    }

    fn extension(&self) -> &str {
        "txt"
    }

    fn prepare(&mut self, _job: &RenderContext<'_>) -> Result<Invocation, EngineError> {
        let invocation = Invocation::new("/bin/sh").arg("-c").arg(self.script.clone());
        Ok(match &self.input {
            Some(bytes) => invocation.stdin(bytes.clone()),
            None => invocation,
        })
    }

    fn collect(&mut self, _job: &RenderContext<'_>) -> Result<Artifacts, EngineError> {
        let bytes = fs::read(&self.output).map_err(|e| EngineError::io(&self.output, e))?;
        let mut artifacts = Artifacts::new();
        artifacts.insert(DEFAULT_LABEL.to_string(), bytes);
        Ok(artifacts)
    }

    fn verify_despite_failure(&self, _job: &RenderContext<'_>) -> bool {
        self.output.exists()
    }
}

struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn counter(&self) -> PathBuf {
        self.dir.path().join("counter")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("output")
    }

    fn runs(&self) -> usize {
        fs::read_to_string(self.counter())
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    /// Build an adapter whose script first appends to the run counter.
    fn adapter(&self, body: &str, attempts: u32) -> ProcessAdapter<ScriptRecipe> {
        self.adapter_with(body, self.settings().with_attempts(attempts))
    }

    fn settings(&self) -> AdapterSettings {
        AdapterSettings::new("/bin/sh", self.dir.path(), self.dir.path())
    }

    fn adapter_with(&self, body: &str, settings: AdapterSettings) -> ProcessAdapter<ScriptRecipe> {
        self.build(body, settings, None)
    }

    /// Build an adapter whose script receives `input` on stdin.
    fn adapter_fed(&self, body: &str, input: Vec<u8>) -> ProcessAdapter<ScriptRecipe> {
        self.build(body, self.settings(), Some(input))
    }

    fn build(
        &self,
        body: &str,
        settings: AdapterSettings,
        input: Option<Vec<u8>>,
    ) -> ProcessAdapter<ScriptRecipe> {
        let script = format!("echo run >> {}; {body}", shell_path(&self.counter()));
        let recipe = ScriptRecipe {
            script,
            output: self.output(),
            input,
        };
        let mut adapter = ProcessAdapter::new(recipe, settings);
        adapter.set_scene("scene");
        adapter.set_frame(1);
        adapter
    }
}

fn shell_path(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Poll until the adapter leaves `Running`.
fn settle(adapter: &mut impl EngineAdapter) -> ProcessState {
    for _ in 0..400 {
        let state = adapter.status();
        if state != ProcessState::Running {
            return state;
        }
        thread::sleep(Duration::from_millis(25));
    }
    panic!("renderer never settled");
}

#[test]
fn test_success_collects_output_and_log() {
    let fixture = Fixture::new();
    let body = format!(
        "echo rendering; printf pixels > {}; exit 0",
        shell_path(&fixture.output())
    );
    let mut adapter = fixture.adapter(&body, 3);

    adapter.begin_render();
    assert_eq!(settle(&mut adapter), ProcessState::Success);

    assert_eq!(adapter.attempt(), 0);
    assert_eq!(fixture.runs(), 1);
    assert_eq!(
        adapter.last_render().get(DEFAULT_LABEL).map(Vec::as_slice),
        Some(&b"pixels"[..])
    );
    assert!(adapter.log().contains("rendering"));
    assert!(adapter.log().is_empty());
}

#[test]
fn test_failures_exhaust_attempts() {
    let fixture = Fixture::new();
    let mut adapter = fixture.adapter("exit 3", 3);

    adapter.begin_render();
    assert_eq!(settle(&mut adapter), ProcessState::Failure);

    assert_eq!(fixture.runs(), 3);
    assert_eq!(adapter.attempt(), 0);
    assert_eq!(adapter.last_exit_code(), Some(3));
    assert!(adapter.last_render().is_empty());
}

#[test]
fn test_output_despite_failure_is_success() {
    let fixture = Fixture::new();
    let body = format!("printf pixels > {}; exit 1", shell_path(&fixture.output()));
    let mut adapter = fixture.adapter(&body, 3);

    adapter.begin_render();
    assert_eq!(settle(&mut adapter), ProcessState::Success);

    assert_eq!(fixture.runs(), 1);
    assert_eq!(adapter.attempt(), 0);
    assert!(adapter.last_render().contains_key(DEFAULT_LABEL));
}

#[test]
fn test_success_without_output_retries() {
    let fixture = Fixture::new();
    let mut adapter = fixture.adapter("exit 0", 2);

    adapter.begin_render();
    assert_eq!(settle(&mut adapter), ProcessState::Failure);
    assert_eq!(fixture.runs(), 2);
}

#[test]
fn test_timeout_kills_and_restarts() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new());
    let settings = fixture.settings().with_attempts(2).with_timeout_secs(1.0);
    let mut adapter = fixture
        .adapter_with("exec sleep 30", settings)
        .with_clock(clock.clone());

    adapter.begin_render();
    assert_eq!(adapter.status(), ProcessState::Running);
    let first = adapter.process_id();
    assert!(first.is_some());

    clock.advance(Duration::from_secs(2));
    assert_eq!(adapter.status(), ProcessState::Running);
    let second = adapter.process_id();
    assert!(second.is_some());
    assert_ne!(first, second);
    assert_eq!(adapter.attempt(), 2);

    clock.advance(Duration::from_secs(2));
    assert_eq!(adapter.status(), ProcessState::Failure);
    assert_eq!(adapter.process_id(), None);
    assert_eq!(adapter.attempt(), 0);
}

#[test]
fn test_no_timeout_keeps_running() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new());
    let mut adapter = fixture.adapter("exec sleep 30", 1).with_clock(clock.clone());

    adapter.begin_render();
    clock.advance(Duration::from_secs(3600));
    assert_eq!(adapter.status(), ProcessState::Running);

    adapter.stop_render();
    assert_eq!(adapter.status(), ProcessState::Failure);
}

#[test]
fn test_begin_render_twice_keeps_one_process() {
    let fixture = Fixture::new();
    let mut adapter = fixture.adapter("exec sleep 30", 1);

    adapter.begin_render();
    let first = adapter.process_id().unwrap();
    adapter.begin_render();
    let second = adapter.process_id().unwrap();

    assert_ne!(first, second);
    if cfg!(target_os = "linux") {
        assert!(!Path::new(&format!("/proc/{first}")).exists());
        assert!(Path::new(&format!("/proc/{second}")).exists());
    }

    adapter.stop_render();
    assert_eq!(adapter.process_id(), None);
}

#[test]
fn test_stopped_job_leaves_full_budget_for_next() {
    let fixture = Fixture::new();
    let hold = fixture.dir.path().join("hold");
    fs::write(&hold, b"").unwrap();
    let body = format!("if [ -f {} ]; then exec sleep 30; fi; exit 3", shell_path(&hold));
    let mut adapter = fixture.adapter(&body, 3);

    adapter.begin_render();
    for _ in 0..400 {
        if fixture.runs() == 1 {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(adapter.status(), ProcessState::Running);
    adapter.stop_render();
    assert_eq!(adapter.status(), ProcessState::Failure);
    assert_eq!(adapter.attempt(), 0);

    fs::remove_file(&hold).unwrap();
    adapter.begin_render();
    assert_eq!(settle(&mut adapter), ProcessState::Failure);

    // One held run, then the next job's full three attempts.
    assert_eq!(fixture.runs(), 4);
    assert_eq!(adapter.attempt(), 0);
}

#[test]
fn test_new_job_restarts_attempt_count_mid_retry() {
    let fixture = Fixture::new();
    let clock = Arc::new(ManualClock::new());
    let settings = fixture.settings().with_attempts(3).with_timeout_secs(1.0);
    let mut adapter = fixture
        .adapter_with("exec sleep 30", settings)
        .with_clock(clock.clone());

    adapter.begin_render();
    clock.advance(Duration::from_secs(2));
    assert_eq!(adapter.status(), ProcessState::Running);
    assert_eq!(adapter.attempt(), 2);

    adapter.begin_render();
    assert_eq!(adapter.attempt(), 1);
    adapter.stop_render();
}

#[test]
fn test_stdin_is_fed_without_blocking() {
    let fixture = Fixture::new();
    let input = vec![b'r'; 1 << 20];
    let body = format!("sleep 2; cat > {}", shell_path(&fixture.output()));
    let mut adapter = fixture.adapter_fed(&body, input.clone());

    let started = Instant::now();
    adapter.begin_render();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(adapter.status(), ProcessState::Running);

    assert_eq!(settle(&mut adapter), ProcessState::Success);
    assert_eq!(adapter.last_render().get(DEFAULT_LABEL), Some(&input));
}

#[test]
fn test_stop_does_not_wait_for_unread_stdin() {
    let fixture = Fixture::new();
    let mut adapter = fixture.adapter_fed("exec sleep 30", vec![0; 1 << 20]);

    adapter.begin_render();
    let started = Instant::now();
    adapter.stop_render();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(adapter.process_id(), None);
}
