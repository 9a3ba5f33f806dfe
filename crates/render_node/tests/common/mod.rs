//! In-memory broker, manager, and adapter fakes shared by the node tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use render_engine::{Artifacts, EngineAdapter, ProcessState};
use render_net::{
    AvailableJob, Connector, Delivery, EventKind, Inbound, JobChannel, Manager, NetError,
    RenderEvent,
};

// ── Broker ──────────────────────────────────────────────────────────────────

/// How a delivery was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Acked,
    Requeued,
}

/// A delivery that records its resolution.
#[derive(Debug)]
pub struct FakeDelivery {
    payload: Vec<u8>,
    outcomes: Arc<Mutex<Vec<Outcome>>>,
}

impl FakeDelivery {
    pub fn new(payload: impl Into<Vec<u8>>) -> (Self, Arc<Mutex<Vec<Outcome>>>) {
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let delivery = Self {
            payload: payload.into(),
            outcomes: outcomes.clone(),
        };
        (delivery, outcomes)
    }
}

#[async_trait]
impl Delivery for FakeDelivery {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(&self) -> Result<(), NetError> {
        self.outcomes.lock().unwrap().push(Outcome::Acked);
        Ok(())
    }

    async fn requeue(&self) -> Result<(), NetError> {
        self.outcomes.lock().unwrap().push(Outcome::Requeued);
        Ok(())
    }
}

pub fn render_command(frame: i64, scene: &str, job_type: &str, uuid: &str) -> Vec<u8> {
    format!(
        r#"{{"command":"render","frame":{frame},"scene":"{scene}","type":"{job_type}","uuid":"{uuid}"}}"#
    )
    .into_bytes()
}

/// What a channel observed, shared with the test.
#[derive(Debug, Default)]
pub struct ChannelLog {
    pub events: Vec<RenderEvent>,
    pub subscribes: Vec<String>,
    pub cancels: usize,
    /// `recv` calls that were allowed to take a job.
    pub job_recvs: usize,
}

impl ChannelLog {
    pub fn event_kinds(&self) -> Vec<EventKind> {
        self.events.iter().map(|e| e.event).collect()
    }
}

/// A channel fed from a scripted inbound queue. Once the queue is empty,
/// `recv` waits forever. A queued delivery is only handed out when `recv` is
/// allowed to take jobs; a queued disconnect is reported either way.
#[derive(Debug, Default)]
pub struct FakeChannel {
    pub log: Arc<Mutex<ChannelLog>>,
    pub inbound: VecDeque<Inbound<FakeDelivery>>,
    active: Option<String>,
}

impl FakeChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribed_to(queue: &str) -> Self {
        Self {
            active: Some(queue.to_string()),
            ..Self::default()
        }
    }

    pub fn with_inbound(mut self, inbound: Inbound<FakeDelivery>) -> Self {
        self.inbound.push_back(inbound);
        self
    }
}

#[async_trait]
impl JobChannel for FakeChannel {
    type Delivery = FakeDelivery;

    async fn publish_event(&mut self, event: &RenderEvent) -> Result<(), NetError> {
        self.log.lock().unwrap().events.push(event.clone());
        Ok(())
    }

    async fn subscribe(&mut self, queue: &str) -> Result<(), NetError> {
        self.log.lock().unwrap().subscribes.push(queue.to_string());
        self.active = Some(queue.to_string());
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), NetError> {
        if self.active.take().is_some() {
            self.log.lock().unwrap().cancels += 1;
        }
        Ok(())
    }

    fn active_queue(&self) -> Option<&str> {
        self.active.as_deref()
    }

    async fn recv(&mut self, accept_jobs: bool) -> Inbound<FakeDelivery> {
        if accept_jobs {
            self.log.lock().unwrap().job_recvs += 1;
        }
        let ready = match self.inbound.front() {
            Some(Inbound::Disconnected) => true,
            Some(Inbound::Delivery(_)) => accept_jobs,
            None => false,
        };
        if ready {
            if let Some(inbound) = self.inbound.pop_front() {
                return inbound;
            }
        }
        std::future::pending().await
    }
}

/// Hands out scripted connection results, failing once they run out.
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub results: Mutex<VecDeque<Result<FakeChannel, String>>>,
    pub attempts: Arc<Mutex<usize>>,
}

impl FakeConnector {
    pub fn new(results: Vec<Result<FakeChannel, String>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            attempts: Arc::default(),
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Channel = FakeChannel;

    async fn connect(&self) -> Result<FakeChannel, NetError> {
        *self.attempts.lock().unwrap() += 1;
        match self.results.lock().unwrap().pop_front() {
            Some(Ok(channel)) => Ok(channel),
            Some(Err(message)) => Err(NetError::JetStream(message)),
            None => Err(NetError::JetStream("connection refused".to_string())),
        }
    }
}

// ── Manager ─────────────────────────────────────────────────────────────────

/// One recorded upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub uuid: String,
    pub label: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct ManagerState {
    pub available: Vec<AvailableJob>,
    pub available_fails: bool,
    pub failing_labels: BTreeSet<String>,
    pub uploads: Vec<Upload>,
    pub queries: usize,
}

/// A manager serving a fixed priority list and recording uploads.
#[derive(Debug, Clone, Default)]
pub struct FakeManager {
    pub state: Arc<Mutex<ManagerState>>,
}

impl FakeManager {
    pub fn with_jobs(jobs: &[(&str, &str)]) -> Self {
        let manager = Self::default();
        manager.state.lock().unwrap().available = jobs
            .iter()
            .map(|(queue, job_type)| AvailableJob::new(*queue, *job_type))
            .collect();
        manager
    }

    pub fn fail_label(&self, label: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_labels
            .insert(label.to_string());
    }
}

#[async_trait]
impl Manager for FakeManager {
    async fn available_jobs(&self) -> Result<Vec<AvailableJob>, NetError> {
        let mut state = self.state.lock().unwrap();
        state.queries += 1;
        if state.available_fails {
            return Err(NetError::Status {
                status: 503,
                body: String::new(),
            });
        }
        Ok(state.available.clone())
    }

    async fn upload_render(
        &self,
        uuid: &str,
        label: &str,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<(), NetError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_labels.contains(label) {
            return Err(NetError::Status {
                status: 500,
                body: "disk full".to_string(),
            });
        }
        state.uploads.push(Upload {
            uuid: uuid.to_string(),
            label: label.to_string(),
            file_name: file_name.to_string(),
            bytes,
        });
        Ok(())
    }
}

// ── Adapter ─────────────────────────────────────────────────────────────────

/// Shared handle to a scripted adapter.
#[derive(Debug, Default)]
pub struct AdapterScript {
    pub state: ProcessState,
    pub artifacts: Artifacts,
    pub log: String,
    pub scene: Option<String>,
    pub frame: Option<i64>,
    pub begins: usize,
    pub stops: usize,
}

/// An adapter whose state the test sets directly.
#[derive(Debug)]
pub struct ScriptedAdapter {
    key: &'static str,
    extension: &'static str,
    script: Arc<Mutex<AdapterScript>>,
    artifacts: Artifacts,
}

impl ScriptedAdapter {
    pub fn new(key: &'static str, extension: &'static str) -> (Box<Self>, Arc<Mutex<AdapterScript>>) {
        let script = Arc::new(Mutex::new(AdapterScript::default()));
        let adapter = Self {
            key,
            extension,
            script: script.clone(),
            artifacts: Artifacts::new(),
        };
        (Box::new(adapter), script)
    }
}

impl EngineAdapter for ScriptedAdapter {
    fn node_type(&self) -> &str {
        self.key
    }

    fn extension(&self) -> &str {
        self.extension
    }

    fn set_scene(&mut self, scene: &str) {
        self.script.lock().unwrap().scene = Some(scene.to_string());
    }

    fn set_frame(&mut self, frame: i64) {
        self.script.lock().unwrap().frame = Some(frame);
    }

    fn begin_render(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.begins += 1;
        script.state = ProcessState::Running;
    }

    fn stop_render(&mut self) {
        let mut script = self.script.lock().unwrap();
        if script.state == ProcessState::Running {
            script.stops += 1;
            script.state = ProcessState::Failure;
        }
    }

    fn status(&mut self) -> ProcessState {
        let script = self.script.lock().unwrap();
        self.artifacts = script.artifacts.clone();
        script.state
    }

    fn log(&mut self) -> String {
        std::mem::take(&mut self.script.lock().unwrap().log)
    }

    fn last_render(&self) -> &Artifacts {
        &self.artifacts
    }
}
