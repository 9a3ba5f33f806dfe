//! # render_node
//!
//! Worker node of a distributed render farm.
//!
//! This crate provides:
//!
//! - [`config`] — CLI arguments, the engines file, and registry construction.
//! - [`dispatcher`] — [`Dispatcher`], the job-handling rules: one job in
//!   flight, acknowledge/requeue decisions, lifecycle events, uploads, and
//!   priority queue selection.
//! - [`worker`] — [`Worker`], the connect/reconnect loop driving the
//!   dispatcher from broker deliveries and a poll timer.
//! - [`ticker`] — Fixed-period ticker over an injectable clock.

pub mod config;
pub mod dispatcher;
pub mod ticker;
pub mod worker;

pub use config::{Args, NodeConfig};
pub use dispatcher::{Dispatcher, DispatcherState, RenderJob};
pub use ticker::Ticker;
pub use worker::{SessionEnd, Worker};
