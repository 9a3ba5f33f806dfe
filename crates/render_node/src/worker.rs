//! Worker loop. Connects to the broker and drives the [`Dispatcher`].
//!
//! Connection failures are retried forever on a fixed delay. Within a session
//! the loop waits on shutdown, the broker and the poll timer at once. Jobs are
//! only taken from the broker while nothing is in flight; a lost connection is
//! noticed either way, kills any active render and starts over from a fresh
//! connection.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use render_net::{Connector, Inbound, JobChannel, Manager};

use crate::dispatcher::Dispatcher;

/// Default delay between connection attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Default period of dispatcher polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

type DeliveryOf<C> = <<C as Connector>::Channel as JobChannel>::Delivery;

/// Why a broker session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The connection dropped; reconnect.
    Disconnected,
    /// Shutdown was requested.
    Shutdown,
}

/// Owns the connector and the dispatcher for the life of the node.
pub struct Worker<C: Connector, M> {
    connector: C,
    dispatcher: Dispatcher<M, DeliveryOf<C>>,
    reconnect_delay: Duration,
    poll_interval: Duration,
}

impl<C: Connector, M: Manager> Worker<C, M> {
    /// Create a worker with the default reconnect delay and poll interval.
    #[must_use]
    pub fn new(connector: C, dispatcher: Dispatcher<M, DeliveryOf<C>>) -> Self {
        Self {
            connector,
            dispatcher,
            reconnect_delay: RECONNECT_DELAY,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Override the delay between connection attempts.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Override the poll interval. Must be non-zero.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<M, DeliveryOf<C>> {
        &self.dispatcher
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(&mut self, shutdown: CancellationToken) {
        loop {
            let channel = tokio::select! {
                () = shutdown.cancelled() => {
                    self.dispatcher.stop();
                    info!("shutdown requested while disconnected");
                    return;
                }
                channel = self.connect() => channel,
            };

            match self.run_session(channel, &shutdown).await {
                SessionEnd::Shutdown => return,
                SessionEnd::Disconnected => {
                    warn!("lost connection to broker, killing any active render");
                    self.dispatcher.disconnect();
                }
            }
        }
    }

    async fn connect(&self) -> C::Channel {
        loop {
            match self.connector.connect().await {
                Ok(channel) => return channel,
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in_secs = self.reconnect_delay.as_secs_f64(),
                        "broker connection failed"
                    );
                    tokio::time::sleep(self.reconnect_delay).await;
                }
            }
        }
    }

    /// Drive one connected session until it drops or shutdown is requested.
    pub async fn run_session(
        &mut self,
        mut channel: C::Channel,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        info!("connected to broker, waiting for jobs");
        self.dispatcher.refresh_queue(&mut channel).await;

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let accept_jobs = self.dispatcher.in_flight().is_none();
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("shutdown requested, finishing up");
                    self.dispatcher.shutdown(&mut channel).await;
                    return SessionEnd::Shutdown;
                }
                inbound = channel.recv(accept_jobs) => match inbound {
                    Inbound::Delivery(delivery) => {
                        self.dispatcher.handle_delivery(&mut channel, delivery).await;
                    }
                    Inbound::Disconnected => return SessionEnd::Disconnected,
                },
                _ = poll.tick() => self.dispatcher.on_tick(&mut channel).await,
            }
        }
    }
}
