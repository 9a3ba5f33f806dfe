//! Background draining of a renderer's output stream.
//!
//! A [`LogReader`] owns one thread that reads its stream line by line into a
//! channel until the stream closes. The controller pops lines without
//! blocking; [`LogReader::join`] waits for the thread after the process has
//! been reaped. The wait is bounded, since a grandchild that inherited the
//! pipe can keep it open past the renderer's exit.

use std::io::{BufRead, BufReader, Read};
use std::sync::mpsc::{self, Receiver};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

const JOIN_POLL: Duration = Duration::from_millis(5);

/// Reader thread plus the queue it fills.
#[derive(Debug)]
pub struct LogReader {
    lines: Receiver<String>,
    handle: Option<JoinHandle<()>>,
}

impl LogReader {
    /// Start a thread that drains `stream` until end-of-stream.
    pub fn spawn<R>(stream: R) -> Self
    where
        R: Read + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("render-log".to_string())
            .spawn(move || {
                let mut reader = BufReader::new(stream);
                let mut buf = Vec::new();
                loop {
                    buf.clear();
                    match reader.read_until(b'\n', &mut buf) {
                        Ok(0) => break,
                        Ok(_) => {
                            let line = String::from_utf8_lossy(&buf);
                            let line = line.trim_end_matches(['\n', '\r']).to_string();
                            if tx.send(line).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "renderer output stream failed");
                            break;
                        }
                    }
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!(error = %e, "failed to start renderer log thread");
                None
            }
        };

        Self { lines: rx, handle }
    }

    /// Pop every line queued so far without blocking.
    pub fn drain(&self) -> Vec<String> {
        self.lines.try_iter().collect()
    }

    /// Wait up to `limit` for the reader thread to observe end-of-stream.
    ///
    /// Returns `false` if the stream is still open after `limit` (a
    /// grandchild may hold the pipe); the thread is then detached.
    pub fn join(&mut self, limit: Duration) -> bool {
        match self.handle.take() {
            Some(handle) => join_within(handle, limit, "renderer log"),
            None => true,
        }
    }
}

/// Join `handle` if it finishes within `limit`, otherwise detach it.
pub(crate) fn join_within(handle: JoinHandle<()>, limit: Duration, what: &str) -> bool {
    let deadline = Instant::now() + limit;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!(thread = what, "pipe still open after process exit, detaching");
            return false;
        }
        thread::sleep(JOIN_POLL);
    }
    if handle.join().is_err() {
        warn!(thread = what, "pipe thread panicked");
    }
    true
}
