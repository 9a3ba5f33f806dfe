//! Job and event payloads on the wire.
//!
//! A job message body is one JSON object whose `command` field selects the
//! [`JobCommand`]; an event body is one [`RenderEvent`] object. Bodies carry no
//! node identity: that travels in the `app-id` header.

use crate::error::NetError;
use crate::messages::{JobCommand, RenderEvent};

/// Serialise a lifecycle event for the event stream.
///
/// # Errors
///
/// Returns [`NetError::Codec`] if serialisation fails.
pub fn encode_event(event: &RenderEvent) -> Result<Vec<u8>, NetError> {
    serde_json::to_vec(event).map_err(NetError::Codec)
}

/// Parse the body of a job message.
///
/// Anything that is not a single, complete command object is rejected, so the
/// caller can discard it instead of retrying it forever.
///
/// # Errors
///
/// Returns [`NetError::Codec`] for malformed JSON, an unknown `command`, or a
/// missing field.
pub fn decode_command(body: &[u8]) -> Result<JobCommand, NetError> {
    serde_json::from_slice(body).map_err(NetError::Codec)
}
