//! Job dispatcher.
//!
//! The dispatcher owns the render registry and at most one in-flight job. It
//! decides what happens to every delivery:
//!
//! - malformed → acknowledged and discarded;
//! - a job already in flight, or an engine type this node lacks → requeued;
//! - otherwise the render starts and `render_start` is published.
//!
//! On each render check a finished job publishes `render_finish`, uploads its
//! artifacts, and is acknowledged only if every upload succeeded (else
//! requeued); a failed job publishes `render_fail` and is acknowledged.
//! While idle it follows the manager's priority list to pick a queue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use render_engine::{Clock, ProcessState, RenderRegistry, SystemClock};
use render_net::{
    Delivery, EventKind, JobChannel, JobCommand, Manager, RenderEvent, RenderRequest, decode_command,
};

use crate::ticker::Ticker;

/// Target that renderer output is re-emitted under.
pub const PROCESS_LOG_TARGET: &str = "render_node::process";

/// The job currently being rendered.
#[derive(Debug)]
pub struct RenderJob<D> {
    /// Frame number.
    pub frame: i64,
    /// Scene identifier.
    pub scene: String,
    /// Job identifier.
    pub uuid: String,
    /// Engine key.
    pub render_type: String,
    /// Broker handle resolved once the job reaches a terminal state.
    pub delivery: D,
}

impl<D> RenderJob<D> {
    fn event(&self, kind: EventKind) -> RenderEvent {
        RenderEvent::now(
            kind,
            self.frame,
            self.scene.as_str(),
            self.uuid.as_str(),
            self.render_type.as_str(),
        )
    }
}

/// Where the node stands with respect to the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherState {
    /// No broker session.
    Disconnected,
    /// Connected, not consuming any queue.
    ConnectedIdle,
    /// Consuming a queue, nothing in flight.
    ConnectedSubscribed,
    /// A job is being rendered.
    JobInFlight,
}

/// Applies the job-handling rules to deliveries, render checks, and queue
/// refreshes.
pub struct Dispatcher<M, D> {
    registry: RenderRegistry,
    manager: M,
    clock: Arc<dyn Clock>,
    render_ticker: Ticker,
    job: Option<RenderJob<D>>,
}

impl<M, D: std::fmt::Debug> std::fmt::Debug for Dispatcher<M, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("render_ticker", &self.render_ticker)
            .field("job", &self.job)
            .finish_non_exhaustive()
    }
}

impl<M: Manager, D: Delivery> Dispatcher<M, D> {
    /// Create a dispatcher that checks the active render every
    /// `check_interval`.
    #[must_use]
    pub fn new(registry: RenderRegistry, manager: M, check_interval: Duration) -> Self {
        Self::with_clock(registry, manager, check_interval, Arc::new(SystemClock))
    }

    /// Create a dispatcher measuring the check interval on `clock`.
    #[must_use]
    pub fn with_clock(
        registry: RenderRegistry,
        manager: M,
        check_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let render_ticker = Ticker::new(check_interval, clock.now());
        Self {
            registry,
            manager,
            clock,
            render_ticker,
            job: None,
        }
    }

    /// The job in flight, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<&RenderJob<D>> {
        self.job.as_ref()
    }

    /// Current state given the broker session, if any.
    #[must_use]
    pub fn state<C: JobChannel>(&self, channel: Option<&C>) -> DispatcherState {
        match (channel, &self.job) {
            (None, _) => DispatcherState::Disconnected,
            (Some(_), Some(_)) => DispatcherState::JobInFlight,
            (Some(channel), None) if channel.active_queue().is_some() => {
                DispatcherState::ConnectedSubscribed
            }
            (Some(_), None) => DispatcherState::ConnectedIdle,
        }
    }

    /// Handle one delivery from the active queue.
    pub async fn handle_delivery<C>(&mut self, channel: &mut C, delivery: D)
    where
        C: JobChannel<Delivery = D>,
    {
        let command = match decode_command(delivery.payload()) {
            Ok(command) => command,
            Err(e) => {
                error!(
                    error = %e,
                    body = %String::from_utf8_lossy(delivery.payload()),
                    "discarding malformed job message"
                );
                ack(&delivery).await;
                return;
            }
        };
        let JobCommand::Render(request) = command;

        self.render_check(channel).await;

        if self.job.is_some() {
            debug!(uuid = %request.uuid, "job already in flight, requeueing");
            requeue(&delivery).await;
            return;
        }

        if !self.registry.can_handle(&request.render_type) {
            info!(
                job_type = %request.render_type,
                uuid = %request.uuid,
                "cannot render this job type, requeueing"
            );
            requeue(&delivery).await;
            return;
        }

        self.start(channel, request, delivery).await;
    }

    async fn start<C>(&mut self, channel: &mut C, request: RenderRequest, delivery: D)
    where
        C: JobChannel<Delivery = D>,
    {
        let RenderRequest {
            frame,
            scene,
            render_type,
            uuid,
        } = request;

        info!(frame, scene = %scene, job_type = %render_type, uuid = %uuid, "rendering frame");
        if let Err(e) = self.registry.render(&scene, frame, &uuid, &render_type) {
            error!(error = %e, uuid = %uuid, "failed to start render, requeueing");
            requeue(&delivery).await;
            return;
        }

        let job = RenderJob {
            frame,
            scene,
            uuid,
            render_type,
            delivery,
        };
        publish(channel, job.event(EventKind::RenderStart)).await;
        self.job = Some(job);
    }

    /// Poll the active render and resolve the in-flight job if it reached a
    /// terminal state.
    pub async fn render_check<C>(&mut self, channel: &mut C)
    where
        C: JobChannel<Delivery = D>,
    {
        if self.job.is_none() {
            return;
        }

        let status = self.registry.status();
        self.forward_process_log();

        match status {
            ProcessState::Success => {
                let Some(job) = self.job.take() else { return };
                info!(frame = job.frame, scene = %job.scene, uuid = %job.uuid, "render complete");
                publish(channel, job.event(EventKind::RenderFinish)).await;

                if self.upload(&job).await {
                    ack(&job.delivery).await;
                } else {
                    warn!(uuid = %job.uuid, "upload incomplete, requeueing job");
                    requeue(&job.delivery).await;
                }
            }
            ProcessState::Failure => {
                let Some(job) = self.job.take() else { return };
                warn!(frame = job.frame, scene = %job.scene, uuid = %job.uuid, "render failed");
                publish(channel, job.event(EventKind::RenderFail)).await;
                ack(&job.delivery).await;
            }
            ProcessState::Running | ProcessState::Stopped => {}
        }
    }

    /// Upload every artifact of the last render; `true` if all succeeded.
    async fn upload(&self, job: &RenderJob<D>) -> bool {
        let extension = self.registry.extension().unwrap_or_default();
        let artifacts = self.registry.last_render();

        let mut all_sent = true;
        for (label, bytes) in artifacts {
            let file_name = format!("{label}.{extension}");
            info!(uuid = %job.uuid, file_name = %file_name, "uploading render");
            if let Err(e) = self
                .manager
                .upload_render(&job.uuid, label, &file_name, bytes.clone())
                .await
            {
                warn!(error = %e, uuid = %job.uuid, label = %label, "failed to upload render");
                all_sent = false;
            }
        }
        all_sent
    }

    fn forward_process_log(&mut self) {
        let output = self.registry.log();
        let uuid = self
            .registry
            .last_render_info()
            .map_or("", |info| info.uuid.as_str());
        for line in output.lines().filter(|line| !line.is_empty()) {
            debug!(target: PROCESS_LOG_TARGET, uuid, "{line}");
        }
    }

    /// Follow the manager's priority list: leave the queue when the list is
    /// empty, otherwise consume the first queue this node can render.
    /// Skipped while a job is in flight.
    pub async fn refresh_queue<C>(&mut self, channel: &mut C)
    where
        C: JobChannel<Delivery = D>,
    {
        if self.job.is_some() {
            return;
        }

        let jobs = match self.manager.available_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!(error = %e, "failed to retrieve job priority list");
                return;
            }
        };

        if jobs.is_empty() {
            if let Some(queue) = channel.active_queue() {
                info!(queue, "no jobs available, leaving queue");
                if let Err(e) = channel.cancel().await {
                    warn!(error = %e, "failed to cancel queue consumer");
                }
            }
            return;
        }

        let Some(next) = jobs
            .iter()
            .find(|job| self.registry.can_handle(&job.job_type))
        else {
            debug!(queues = jobs.len(), "no available queue matches a local engine");
            return;
        };

        if channel.active_queue() == Some(next.queue.as_str()) {
            return;
        }
        info!(queue = %next.queue, job_type = %next.job_type, "switching to priority queue");
        if let Err(e) = channel.subscribe(&next.queue).await {
            warn!(error = %e, queue = %next.queue, "failed to consume queue");
        }
    }

    /// Periodic work: once per check interval, run a render check and, if
    /// idle, refresh the queue.
    pub async fn on_tick<C>(&mut self, channel: &mut C)
    where
        C: JobChannel<Delivery = D>,
    {
        if !self.render_ticker.poll(self.clock.now()) {
            return;
        }
        self.render_check(channel).await;
        if self.job.is_none() {
            self.refresh_queue(channel).await;
        }
    }

    /// The broker session is gone: kill the active process and forget the
    /// in-flight job. Its message is redelivered by the broker.
    pub fn disconnect(&mut self) {
        if let Some(job) = self.job.take() {
            warn!(uuid = %job.uuid, "connection lost with a job in flight, killing renderer");
        }
        self.registry.stop_active();
    }

    /// Final render check, then stop the active process. A job still in
    /// flight is handed back to its queue.
    pub async fn shutdown<C>(&mut self, channel: &mut C)
    where
        C: JobChannel<Delivery = D>,
    {
        self.render_check(channel).await;
        if let Some(job) = self.job.take() {
            info!(uuid = %job.uuid, "shutting down with a job in flight, requeueing");
            requeue(&job.delivery).await;
        }
        self.registry.stop_active();
    }

    /// Stop the active process without a broker session.
    pub fn stop(&mut self) {
        self.job = None;
        self.registry.stop_active();
    }
}

async fn publish<C: JobChannel>(channel: &mut C, event: RenderEvent) {
    if let Err(e) = channel.publish_event(&event).await {
        warn!(error = %e, event = ?event.event, uuid = %event.uuid, "failed to publish event");
    }
}

async fn ack<D: Delivery>(delivery: &D) {
    if let Err(e) = delivery.ack().await {
        warn!(error = %e, "failed to acknowledge message");
    }
}

async fn requeue<D: Delivery>(delivery: &D) {
    if let Err(e) = delivery.requeue().await {
        warn!(error = %e, "failed to requeue message");
    }
}
