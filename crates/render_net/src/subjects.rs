//! JetStream naming.
//!
//! Each manager queue id maps to one subject under `render.jobs.`, stored in
//! the work-queue stream [`JOBS_STREAM`] and consumed through a durable pull
//! consumer shared by every node. Lifecycle events go to [`EVENTS`].

/// Stream holding pending render jobs.
pub const JOBS_STREAM: &str = "RENDER_JOBS";

/// Subjects captured by [`JOBS_STREAM`].
pub const JOBS_WILDCARD: &str = "render.jobs.*";

/// Stream holding lifecycle events.
pub const EVENTS_STREAM: &str = "RENDER_EVENTS";

/// Subject lifecycle events are published on.
pub const EVENTS: &str = "render.events";

/// Header naming the node that published an event.
pub const APP_ID_HEADER: &str = "app-id";

/// Build the subject a queue's jobs are published on.
///
/// `render.jobs.<queue>`
#[must_use]
pub fn job_subject(queue: &str) -> String {
    format!("render.jobs.{}", sanitize(queue))
}

/// Build the durable consumer name for a queue.
///
/// `render_<queue>`
#[must_use]
pub fn consumer_name(queue: &str) -> String {
    format!("render_{}", sanitize(queue))
}

// Subject tokens and consumer names cannot contain separators or wildcards.
fn sanitize(queue: &str) -> String {
    queue
        .chars()
        .map(|c| match c {
            '.' | '*' | '>' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_subject() {
        assert_eq!(job_subject("17"), "render.jobs.17");
    }

    #[test]
    fn test_consumer_name() {
        assert_eq!(consumer_name("17"), "render_17");
    }

    #[test]
    fn test_names_are_sanitized() {
        assert_eq!(job_subject("a.b *>"), "render.jobs.a_b___");
        assert_eq!(consumer_name("x y"), "render_x_y");
    }
}
