//! # render_net
//!
//! Transport layer of the render node.
//!
//! This crate provides:
//!
//! - [`subjects`] — JetStream stream, subject, and consumer naming.
//! - [`messages`] — Job commands, lifecycle events, and manager payloads.
//! - [`codec`] — Job command and lifecycle event bodies.
//! - [`channel`] — The broker abstraction the dispatcher is written against.
//! - [`connection`] — The NATS JetStream implementation of that abstraction.
//! - [`manager`] — HTTP client for the farm manager.
//! - [`error`] — Network-layer error types.

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod manager;
pub mod messages;
pub mod subjects;

pub use channel::{Connector, Delivery, Inbound, JobChannel};
pub use codec::{decode_command, encode_event};
pub use connection::{JetStreamDelivery, NatsChannel, NatsConnector};
pub use error::NetError;
pub use manager::{Manager, ManagerClient};
pub use messages::{AvailableJob, EventKind, JobCommand, RenderEvent, RenderRequest};
