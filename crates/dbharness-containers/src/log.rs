//! Container log forwarding
//!
//! Database servers write their most useful diagnostics to the container's
//! stderr, often with far more detail than the client-side error carries.
//! [`ContainerLogConsumer`] forwards that output to `tracing` so a failed
//! test has the server's side of the story in the same log stream.
//!
//! Stdout is mostly startup noise, so it is suppressed until the container
//! wrapper enables it after the server is up, and suppressed again while
//! the container shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use testcontainers::core::logs::consumer::LogConsumer;
use testcontainers::core::logs::LogFrame;

static ISO_TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}[T ][0-9]{2}:[0-9]{2}:[0-9]{2}(?:\.[0-9]+)?(?: UTC)? (.+)$")
        .unwrap()
});

/// Forwards container output to `tracing`, with the log-header cruft removed.
///
/// Clones share the stdout gate, so the handle kept by the container wrapper
/// controls the instance registered with testcontainers.
#[derive(Clone)]
pub struct ContainerLogConsumer {
    /// Image reference, attached to every record as the `container` field
    name: String,
    stdout_enabled: Arc<AtomicBool>,
}

impl ContainerLogConsumer {
    pub fn new(image_ref: &str) -> Self {
        Self {
            name: image_ref.replace(':', "$"),
            stdout_enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Gate routine stdout messages. Stderr is always forwarded.
    pub fn set_stdout_enabled(&self, enabled: bool) {
        self.stdout_enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn stdout_enabled(&self) -> bool {
        self.stdout_enabled.load(Ordering::SeqCst)
    }

    /// Remove duplicated header cruft from a server log line.
    ///
    /// The tracing record already carries a timestamp and severity, so a
    /// leading ISO-8601 timestamp and the ` LOG: ` marker are dropped.
    /// `FATAL`/`ERROR` markers are left alone.
    fn scrub(message: &str) -> String {
        let message = message.replacen(" LOG: ", " ", 1);
        match ISO_TIMESTAMP.captures(&message) {
            Some(captures) => captures[1].to_string(),
            None => message,
        }
    }

    fn forward(&self, frame: &LogFrame) {
        match frame {
            LogFrame::StdOut(bytes) => {
                if self.stdout_enabled() {
                    let message = String::from_utf8_lossy(bytes);
                    let message = message.trim();
                    if !message.is_empty() {
                        tracing::info!(target: "container", container = %self.name, "{}", Self::scrub(message));
                    }
                }
            }
            LogFrame::StdErr(bytes) => {
                let message = String::from_utf8_lossy(bytes);
                let message = message.trim();
                if !message.is_empty() {
                    tracing::warn!(target: "container", container = %self.name, "{}", Self::scrub(message));
                }
            }
        }
    }
}

impl LogConsumer for ContainerLogConsumer {
    fn accept<'a>(&'a self, record: &'a LogFrame) -> BoxFuture<'a, ()> {
        Box::pin(async move {
            self.forward(record);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn scrub_strips_leading_iso_timestamp() {
        assert_eq!(
            ContainerLogConsumer::scrub("2024-07-01 12:34:56.789 UTC listening on IPv4 address"),
            "listening on IPv4 address"
        );
        assert_eq!(
            ContainerLogConsumer::scrub("2024-07-01T12:34:56 checkpoint complete"),
            "checkpoint complete"
        );
    }

    #[test]
    fn scrub_removes_log_marker_but_keeps_fatal() {
        assert_eq!(
            ContainerLogConsumer::scrub("2024-07-01 12:34:56 UTC [29] LOG: database system is ready"),
            "[29] database system is ready"
        );
        let fatal = "FATAL:  password authentication failed";
        assert_eq!(ContainerLogConsumer::scrub(fatal), fatal);
    }

    #[test]
    fn scrub_passes_plain_lines_through() {
        assert_eq!(ContainerLogConsumer::scrub("init process complete"), "init process complete");
    }

    #[test]
    fn stdout_gate_defaults_closed_and_is_shared_between_clones() {
        let consumer = ContainerLogConsumer::new("postgres:16.3");
        assert!(!consumer.stdout_enabled());

        let clone = consumer.clone();
        consumer.set_stdout_enabled(true);
        assert!(clone.stdout_enabled());
    }

    #[test]
    fn log_field_name_replaces_tag_separator() {
        let consumer = ContainerLogConsumer::new("timescale/timescaledb:2.15.3");
        assert_eq!(consumer.name, "timescale/timescaledb$2.15.3");
    }
}
