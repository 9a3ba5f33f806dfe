//! NATS JetStream transport.
//!
//! Provides the [`Connector`]/[`JobChannel`] implementation used in
//! production. Job queues are durable pull consumers on the work-queue stream
//! [`JOBS_STREAM`](crate::subjects::JOBS_STREAM). Messages are pulled on
//! demand, one per request, and only while [`recv`](JobChannel::recv) is
//! asked for jobs; the worker stops asking while a job is in flight, so a node
//! never holds more than one job it has not resolved.
//!
//! An outstanding pull request lives on the channel rather than in the `recv`
//! future, so racing `recv` against timers never abandons a request.

use std::time::Duration;

use async_nats::jetstream::consumer::{AckPolicy, PullConsumer, pull};
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::{self, AckKind};
use async_nats::{ConnectOptions, Event, HeaderMap};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::{Connector, Delivery, Inbound, JobChannel};
use crate::codec::encode_event;
use crate::error::NetError;
use crate::messages::RenderEvent;
use crate::subjects;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Server-side expiry of one pull request. Bounds how long leaving a queue
/// waits for an outstanding request to finish.
pub const PULL_EXPIRES: Duration = Duration::from_secs(2);

/// Opens [`NatsChannel`]s against one NATS server.
#[derive(Debug, Clone)]
pub struct NatsConnector {
    url: String,
    node_name: String,
}

impl NatsConnector {
    /// Create a connector for `url`, tagging published events with
    /// `node_name`.
    #[must_use]
    pub fn new(url: impl Into<String>, node_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            node_name: node_name.into(),
        }
    }

    /// The server URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for NatsConnector {
    type Channel = NatsChannel;

    async fn connect(&self) -> Result<NatsChannel, NetError> {
        info!(url = %self.url, "connecting to NATS");

        let (events_tx, events) = mpsc::unbounded_channel();
        let client = ConnectOptions::new()
            .name(&self.node_name)
            .event_callback(move |event| {
                let _ = events_tx.send(event);
                async {}
            })
            .connect(self.url.as_str())
            .await?;

        let jetstream = jetstream::new(client);
        let jobs = jetstream
            .get_or_create_stream(StreamConfig {
                name: subjects::JOBS_STREAM.to_string(),
                subjects: vec![subjects::JOBS_WILDCARD.to_string()],
                retention: RetentionPolicy::WorkQueue,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(NetError::jetstream)?;
        jetstream
            .get_or_create_stream(StreamConfig {
                name: subjects::EVENTS_STREAM.to_string(),
                subjects: vec![subjects::EVENTS.to_string()],
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(NetError::jetstream)?;

        info!("NATS connection established");
        Ok(NatsChannel {
            jetstream,
            jobs,
            node_name: self.node_name.clone(),
            events,
            active: None,
        })
    }
}

struct Subscription {
    queue: String,
    consumer: PullConsumer,
    pending: Option<pull::Batch>,
}

impl Subscription {
    /// Pull the next job, issuing a single-message request when none is
    /// outstanding. Empty requests expire and are reissued.
    async fn next_message(&mut self) -> Result<jetstream::Message, NetError> {
        loop {
            if self.pending.is_none() {
                let batch = self
                    .consumer
                    .batch()
                    .max_messages(1)
                    .expires(PULL_EXPIRES)
                    .messages()
                    .await
                    .map_err(NetError::jetstream)?;
                self.pending = Some(batch);
            }
            let Some(batch) = self.pending.as_mut() else {
                continue;
            };

            match batch.next().await {
                Some(Ok(message)) => {
                    self.pending = None;
                    return Ok(message);
                }
                Some(Err(e)) => {
                    self.pending = None;
                    return Err(NetError::jetstream(e));
                }
                None => self.pending = None,
            }
        }
    }

    /// Wait out an outstanding request and hand back anything it delivers.
    async fn drain(&mut self) {
        let Some(mut batch) = self.pending.take() else {
            return;
        };
        let drained = tokio::time::timeout(PULL_EXPIRES * 2, async {
            while let Some(Ok(message)) = batch.next().await {
                if let Err(e) = message.ack_with(AckKind::Nak(None)).await {
                    warn!(error = %e, "failed to requeue message pulled while leaving queue");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(queue = %self.queue, "pull request did not expire, abandoning it");
        }
    }
}

/// A JetStream session consuming at most one job queue.
pub struct NatsChannel {
    jetstream: jetstream::Context,
    jobs: jetstream::stream::Stream,
    node_name: String,
    events: mpsc::UnboundedReceiver<Event>,
    active: Option<Subscription>,
}

impl std::fmt::Debug for NatsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsChannel")
            .field("node_name", &self.node_name)
            .field("active_queue", &self.active_queue())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl JobChannel for NatsChannel {
    type Delivery = JetStreamDelivery;

    async fn publish_event(&mut self, event: &RenderEvent) -> Result<(), NetError> {
        let payload = encode_event(event)?;
        let mut headers = HeaderMap::new();
        headers.insert(subjects::APP_ID_HEADER, self.node_name.as_str());

        self.jetstream
            .publish_with_headers(subjects::EVENTS, headers, payload.into())
            .await
            .map_err(NetError::jetstream)?
            .await
            .map_err(NetError::jetstream)?;
        debug!(event = ?event.event, uuid = %event.uuid, "published event");
        Ok(())
    }

    async fn subscribe(&mut self, queue: &str) -> Result<(), NetError> {
        self.cancel().await?;

        let name = subjects::consumer_name(queue);
        let consumer = self
            .jobs
            .get_or_create_consumer(
                &name,
                pull::Config {
                    durable_name: Some(name.clone()),
                    filter_subject: subjects::job_subject(queue),
                    ack_policy: AckPolicy::Explicit,
                    ..Default::default()
                },
            )
            .await
            .map_err(NetError::jetstream)?;

        info!(queue, consumer = %name, "consuming job queue");
        self.active = Some(Subscription {
            queue: queue.to_string(),
            consumer,
            pending: None,
        });
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), NetError> {
        if let Some(mut subscription) = self.active.take() {
            subscription.drain().await;
            info!(queue = %subscription.queue, "stopped consuming job queue");
        }
        Ok(())
    }

    fn active_queue(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.queue.as_str())
    }

    async fn recv(&mut self, accept_jobs: bool) -> Inbound<JetStreamDelivery> {
        let Self { events, active, .. } = self;
        loop {
            let next_message = async {
                match active.as_mut().filter(|_| accept_jobs) {
                    Some(subscription) => subscription.next_message().await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                event = events.recv() => match event {
                    Some(Event::Disconnected) | None => {
                        warn!("NATS connection lost");
                        return Inbound::Disconnected;
                    }
                    Some(other) => debug!(event = ?other, "NATS connection event"),
                },
                message = next_message => match message {
                    Ok(message) => return Inbound::Delivery(JetStreamDelivery { message }),
                    Err(e) => {
                        warn!(error = %e, "job pull failed");
                        return Inbound::Disconnected;
                    }
                },
            }
        }
    }
}

/// A job message pulled from JetStream.
#[derive(Debug)]
pub struct JetStreamDelivery {
    message: jetstream::Message,
}

#[async_trait]
impl Delivery for JetStreamDelivery {
    fn payload(&self) -> &[u8] {
        &self.message.payload
    }

    async fn ack(&self) -> Result<(), NetError> {
        self.message.ack().await.map_err(NetError::ack)
    }

    async fn requeue(&self) -> Result<(), NetError> {
        self.message
            .ack_with(AckKind::Nak(None))
            .await
            .map_err(NetError::ack)
    }
}
