//! Metrics declarations for the NXT link.
//!
//! This crate declares every metric recorded by the transport session, the
//! low-speed bus controller and the command sequencer as a structured
//! [`Metric`] constant, and re-exports the `metrics` facade. Nothing is
//! recorded unless the application installs a recorder.
//!
//! # Example
//!
//! ```rust,ignore
//! use nxt_metrics::{describe_metrics, metric_defs, LinkLabels};
//!
//! describe_metrics();
//!
//! let labels = LinkLabels::new("/dev/ttyACM0");
//! metrics::counter!(metric_defs::COMMANDS_SENT.name, &labels.with_opcode("GetBatteryLevel"))
//!     .increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// Name, kind, unit and label keys of one metric, fixed at compile time.
///
/// ```rust
/// use nxt_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const RETRIES: Metric = Metric::counter("nxt.example.retries", Unit::Count)
///     .help("Commands sent again after a timeout")
///     .labels(&["port"]);
///
/// assert_eq!(RETRIES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub description: &'static str,
    /// Label keys every recording of this metric carries.
    pub labels: &'static [&'static str],
}

impl Metric {
    pub const fn counter(name: &'static str, unit: Unit) -> Self {
        Metric::declare(name, MetricKind::Counter, unit)
    }

    pub const fn gauge(name: &'static str, unit: Unit) -> Self {
        Metric::declare(name, MetricKind::Gauge, unit)
    }

    pub const fn histogram(name: &'static str, unit: Unit) -> Self {
        Metric::declare(name, MetricKind::Histogram, unit)
    }

    const fn declare(name: &'static str, kind: MetricKind, unit: Unit) -> Self {
        Metric {
            name,
            kind,
            unit,
            description: "",
            labels: &[],
        }
    }

    pub const fn help(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Hand the unit and description to the installed recorder.
    pub fn describe(&self) {
        match self.kind {
            MetricKind::Counter => describe_counter!(self.name, self.unit, self.description),
            MetricKind::Gauge => describe_gauge!(self.name, self.unit, self.description),
            MetricKind::Histogram => describe_histogram!(self.name, self.unit, self.description),
        }
    }
}

/// All metric declarations.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels carried by every link metric.
    pub const STANDARD_LABELS: &[&str] = &["port"];

    /// Labels carried by per-command metrics.
    pub const COMMAND_LABELS: &[&str] = &["port", "opcode"];

    // Transport session

    pub const COMMANDS_SENT: Metric = Metric::counter("nxt.link.commands_sent", Unit::Count)
        .help("Commands written to the channel")
        .labels(COMMAND_LABELS);

    pub const REPLIES_RECEIVED: Metric = Metric::counter("nxt.link.replies_received", Unit::Count)
        .help("Well-formed replies matched to a command")
        .labels(&["port", "opcode", "status"]);

    pub const TIMEOUTS: Metric = Metric::counter("nxt.link.timeouts", Unit::Count)
        .help("Commands whose reply did not arrive in time")
        .labels(COMMAND_LABELS);

    pub const PROTOCOL_VIOLATIONS: Metric = Metric::counter("nxt.link.protocol_violations", Unit::Count)
        .help("Replies that desynchronized the session")
        .labels(COMMAND_LABELS);

    pub const BUSY_REJECTIONS: Metric = Metric::counter("nxt.link.busy_rejections", Unit::Count)
        .help("Commands refused because the previous write had not drained")
        .labels(COMMAND_LABELS);

    pub const ROUND_TRIP_TIME: Metric = Metric::histogram("nxt.link.round_trip_ms", Unit::Milliseconds)
        .help("Time from write to matched reply")
        .labels(COMMAND_LABELS);

    pub const BYTES_WRITTEN: Metric = Metric::counter("nxt.link.bytes_written", Unit::Bytes)
        .help("Framed bytes written to the channel")
        .labels(STANDARD_LABELS);

    pub const STALE_FRAMES_DISCARDED: Metric = Metric::counter("nxt.link.stale_frames_discarded", Unit::Count)
        .help("Unread frames dropped before a new command")
        .labels(STANDARD_LABELS);

    pub const OPEN_SESSIONS: Metric = Metric::gauge("nxt.link.open_sessions", Unit::Count)
        .help("Sessions currently holding a channel");

    // Low-speed bus

    pub const LOWSPEED_TRANSACTIONS: Metric = Metric::counter("nxt.lowspeed.transactions", Unit::Count)
        .help("Completed write-poll-read exchanges")
        .labels(&["port", "outcome"]);

    pub const LOWSPEED_POLLS: Metric = Metric::histogram("nxt.lowspeed.polls", Unit::Count)
        .help("Status polls needed before data was ready")
        .labels(STANDARD_LABELS);

    // Command sequencer

    pub const SEQUENCE_CYCLES: Metric = Metric::counter("nxt.sequence.cycles", Unit::Count)
        .help("Sequence cycles run")
        .labels(STANDARD_LABELS);

    pub const SEQUENCE_COMMAND_FAILURES: Metric = Metric::counter("nxt.sequence.command_failures", Unit::Count)
        .help("Sequence commands that failed or returned an error status")
        .labels(COMMAND_LABELS);

    pub const SEQUENCE_AVERAGE_PERIOD: Metric = Metric::gauge("nxt.sequence.average_period_ms", Unit::Milliseconds)
        .help("Moving average of the time between cycle starts")
        .labels(STANDARD_LABELS);

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &COMMANDS_SENT,
        &REPLIES_RECEIVED,
        &TIMEOUTS,
        &PROTOCOL_VIOLATIONS,
        &BUSY_REJECTIONS,
        &ROUND_TRIP_TIME,
        &BYTES_WRITTEN,
        &STALE_FRAMES_DISCARDED,
        &OPEN_SESSIONS,
        &LOWSPEED_TRANSACTIONS,
        &LOWSPEED_POLLS,
        &SEQUENCE_CYCLES,
        &SEQUENCE_COMMAND_FAILURES,
        &SEQUENCE_AVERAGE_PERIOD,
    ];
}

/// Labels identifying the channel a metric belongs to.
#[derive(Debug, Clone)]
pub struct LinkLabels {
    /// Port name or other channel label.
    pub port: String,
}

impl LinkLabels {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }

    /// Convert to the label pairs accepted by the `metrics` macros.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("port", self.port.clone())]
    }

    /// Standard labels plus an opcode.
    pub fn with_opcode(&self, opcode: impl Into<String>) -> Vec<(&'static str, String)> {
        self.with(&[("opcode", opcode.into())])
    }

    /// Standard labels plus extra pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_labels() {
        let labels = LinkLabels::new("COM3");
        assert_eq!(labels.to_labels(), vec![("port", "COM3".to_string())]);

        let with_op = labels.with_opcode("LsRead");
        assert_eq!(with_op.len(), 2);
        assert!(with_op.contains(&("opcode", "LsRead".to_string())));
    }

    #[test]
    fn test_metric_names_are_unique() {
        let all = metric_defs::ALL;
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::ROUND_TRIP_TIME.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::ROUND_TRIP_TIME.unit, Unit::Milliseconds);
        assert_eq!(metric_defs::OPEN_SESSIONS.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::COMMANDS_SENT.labels, &["port", "opcode"]);
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
        for metric in metric_defs::ALL {
            assert!(!metric.description.is_empty(), "{} has no description", metric.name);
        }
    }
}
