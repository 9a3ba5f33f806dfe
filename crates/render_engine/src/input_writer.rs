//! Background feeding of a renderer's stdin.
//!
//! Renderers such as `prman` read their scene from stdin. The bytes are
//! written on an [`InputWriter`] thread so a renderer that reads slowly, or
//! not at all, cannot stall the controller. Killing the process breaks the
//! pipe and ends the write.

use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::log_reader::join_within;

/// Writer thread owning the stdin pipe until every byte is written.
#[derive(Debug)]
pub struct InputWriter {
    handle: Option<JoinHandle<()>>,
}

impl InputWriter {
    /// Start a thread that writes `bytes` to `sink`, then closes it.
    pub fn spawn<W>(mut sink: W, bytes: Vec<u8>) -> Self
    where
        W: Write + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("render-stdin".to_string())
            .spawn(move || match sink.write_all(&bytes) {
                Ok(()) => debug!(bytes = bytes.len(), "renderer input written"),
                Err(e) => warn!(error = %e, "failed to write renderer stdin"),
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to start renderer stdin thread");
                None
            }
        };
        Self { handle }
    }

    /// Wait up to `limit` for the write to finish, then detach.
    pub fn join(&mut self, limit: Duration) -> bool {
        match self.handle.take() {
            Some(handle) => join_within(handle, limit, "renderer stdin"),
            None => true,
        }
    }
}
