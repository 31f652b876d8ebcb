//! Replays a list of commands once or periodically.

use crate::error::{ExecuteError, SequenceError};
use crate::session::Session;
use chrono::{DateTime, Utc};
use nxt_metrics::{metric_defs, LinkLabels};
use nxt_protocol::{Command, ErrorCode, OpCode, Response};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Weight of the newest sample in the period average.
const PERIOD_SMOOTHING: f64 = 0.25;

/// Longest uninterrupted sleep between cycles; bounds stop latency.
const STOP_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// An ordered list of commands and how to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSequence {
    pub commands: Vec<Command>,
    /// Period between cycle starts; negative runs a single cycle.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: i64,
    /// Keep going with the next command after a failure instead of ending
    /// the cycle.
    #[serde(default)]
    pub continue_on_error: bool,
}

fn default_poll_interval() -> i64 {
    -1
}

impl CommandSequence {
    /// Run `commands` once, stopping a cycle at the first failure.
    pub fn new(commands: Vec<Command>) -> Self {
        CommandSequence {
            commands,
            poll_interval_ms: default_poll_interval(),
            continue_on_error: false,
        }
    }

    pub fn with_poll_interval_ms(mut self, poll_interval_ms: i64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Cycle period, `None` for a one-shot sequence.
    pub fn poll_interval(&self) -> Option<Duration> {
        u64::try_from(self.poll_interval_ms)
            .ok()
            .map(Duration::from_millis)
    }
}

/// Result of one command within a cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommandOutcome {
    Completed {
        index: usize,
        response: Response,
    },
    Failed {
        index: usize,
        opcode: OpCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<ErrorCode>,
        error: String,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Completed { .. })
    }
}

/// What happened during one pass over the sequence.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    /// Zero-based cycle number.
    pub index: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: f64,
    pub outcomes: Vec<CommandOutcome>,
    /// A failure ended the cycle before every command ran.
    pub aborted: bool,
}

impl CycleReport {
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}

/// Runs a [`CommandSequence`] against a session.
#[derive(Debug)]
pub struct SequenceRunner {
    sequence: CommandSequence,
    cycles: u64,
    average_polling_ms: Option<f64>,
    last_start: Option<Instant>,
}

impl SequenceRunner {
    pub fn new(sequence: CommandSequence) -> Self {
        SequenceRunner {
            sequence,
            cycles: 0,
            average_polling_ms: None,
            last_start: None,
        }
    }

    pub fn sequence(&self) -> &CommandSequence {
        &self.sequence
    }

    /// Cycles started so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Smoothed time between cycle starts. Diagnostic only; scheduling
    /// never reads it.
    pub fn average_polling_ms(&self) -> Option<f64> {
        self.average_polling_ms
    }

    /// Run every command once, each with its own retry budget.
    ///
    /// Errors that leave the session unusable end the run with
    /// [`SequenceError`] regardless of `continue_on_error`.
    pub fn run_once(&mut self, session: &mut Session) -> Result<CycleReport, SequenceError> {
        let started = Instant::now();
        if let Some(previous) = self.last_start {
            self.observe_period(session, started.duration_since(previous));
        }
        self.last_start = Some(started);

        let cycle = self.cycles;
        self.cycles += 1;
        let labels = LinkLabels::new(session.port().to_string());
        metrics::counter!(metric_defs::SEQUENCE_CYCLES.name, &labels.to_labels()).increment(1);

        let mut report = CycleReport {
            index: cycle,
            started_at: Utc::now(),
            elapsed_ms: 0.0,
            outcomes: Vec::with_capacity(self.sequence.commands.len()),
            aborted: false,
        };

        for (index, command) in self.sequence.commands.iter().enumerate() {
            let opcode = command.opcode();
            match session.execute_with_retries(command) {
                Ok(response) => report.outcomes.push(CommandOutcome::Completed { index, response }),
                Err(err) if err.is_fatal() || matches!(err, ExecuteError::Encode(_)) => {
                    warn!(cycle, index, error = %err, "sequence stopped");
                    return Err(SequenceError {
                        cycle,
                        index,
                        opcode,
                        source: err,
                    });
                }
                Err(err) => {
                    debug!(cycle, index, error = %err, "sequence command failed");
                    metrics::counter!(
                        metric_defs::SEQUENCE_COMMAND_FAILURES.name,
                        &labels.with_opcode(format!("{:?}", opcode))
                    )
                    .increment(1);
                    report.outcomes.push(CommandOutcome::Failed {
                        index,
                        opcode,
                        status: err.status(),
                        error: err.to_string(),
                    });
                    if !self.sequence.continue_on_error {
                        report.aborted = index + 1 < self.sequence.commands.len();
                        break;
                    }
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(report)
    }

    /// Run cycles until `max_cycles` is reached, `stop` is set, or a fatal
    /// error occurs. A one-shot sequence runs exactly one cycle; a limit of
    /// zero runs none.
    ///
    /// Returns the number of cycles completed.
    pub fn run<F>(
        &mut self,
        session: &mut Session,
        max_cycles: Option<u64>,
        stop: &AtomicBool,
        mut on_cycle: F,
    ) -> Result<u64, SequenceError>
    where
        F: FnMut(&CycleReport),
    {
        if max_cycles == Some(0) {
            return Ok(0);
        }
        let interval = self.sequence.poll_interval();
        let mut completed = 0;

        while !stop.load(Ordering::Acquire) {
            let cycle_start = Instant::now();
            let report = self.run_once(session)?;
            completed += 1;
            on_cycle(&report);

            let Some(interval) = interval else { break };
            if max_cycles.is_some_and(|max| completed >= max) {
                break;
            }
            sleep_until(cycle_start + interval, stop);
        }

        info!(
            port = session.port(),
            cycles = completed,
            average_polling_ms = ?self.average_polling_ms,
            "sequence finished"
        );
        Ok(completed)
    }

    fn observe_period(&mut self, session: &Session, period: Duration) {
        let sample = period.as_secs_f64() * 1000.0;
        let average = match self.average_polling_ms {
            Some(previous) => previous + PERIOD_SMOOTHING * (sample - previous),
            None => sample,
        };
        self.average_polling_ms = Some(average);
        metrics::gauge!(
            metric_defs::SEQUENCE_AVERAGE_PERIOD.name,
            &LinkLabels::new(session.port().to_string()).to_labels()
        )
        .set(average);
    }
}

fn sleep_until(deadline: Instant, stop: &AtomicBool) {
    loop {
        let now = Instant::now();
        if now >= deadline || stop.load(Ordering::Acquire) {
            return;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_INTERVAL));
    }
}
