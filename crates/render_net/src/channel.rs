//! Broker abstraction.
//!
//! The dispatcher is written against these traits rather than against NATS
//! directly, so the job-handling rules can be exercised with in-memory fakes.
//! [`connection`](crate::connection) provides the JetStream implementation.

use async_trait::async_trait;

use crate::error::NetError;
use crate::messages::RenderEvent;

/// A message received from a job queue, awaiting resolution.
///
/// Every delivery must eventually be either acknowledged (removed from the
/// queue) or requeued (handed back for another worker).
#[async_trait]
pub trait Delivery: Send + Sync {
    /// Raw message body.
    fn payload(&self) -> &[u8];

    /// Acknowledge the message, removing it from the queue.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Ack`] if the broker rejects the acknowledgement.
    async fn ack(&self) -> Result<(), NetError>;

    /// Hand the message back to the queue for redelivery.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Ack`] if the broker rejects the request.
    async fn requeue(&self) -> Result<(), NetError>;
}

/// What the channel produced while the dispatcher was waiting.
#[derive(Debug)]
pub enum Inbound<D> {
    /// A job message arrived on the active queue.
    Delivery(D),
    /// The broker connection is gone; the channel must be discarded.
    Disconnected,
}

/// An open broker session.
#[async_trait]
pub trait JobChannel: Send {
    /// Deliveries produced by this channel.
    type Delivery: Delivery;

    /// Publish a lifecycle event.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    async fn publish_event(&mut self, event: &RenderEvent) -> Result<(), NetError>;

    /// Start consuming `queue`, replacing any current subscription.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the queue cannot be declared or consumed.
    async fn subscribe(&mut self, queue: &str) -> Result<(), NetError>;

    /// Stop consuming the current queue, if any.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the broker rejects the cancellation.
    async fn cancel(&mut self) -> Result<(), NetError>;

    /// The queue currently being consumed.
    fn active_queue(&self) -> Option<&str>;

    /// Wait for the next delivery or for the connection to drop.
    ///
    /// With `accept_jobs` false nothing is taken from the queue and only a
    /// lost connection is reported; the worker passes false while a job is in
    /// flight. Must be cancel-safe: it is raced against the render-check timer.
    async fn recv(&mut self, accept_jobs: bool) -> Inbound<Self::Delivery>;
}

/// Opens broker sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Sessions produced by this connector.
    type Channel: JobChannel;

    /// Connect and declare the durable streams.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if the broker is unreachable or the streams cannot
    /// be declared.
    async fn connect(&self) -> Result<Self::Channel, NetError>;
}
