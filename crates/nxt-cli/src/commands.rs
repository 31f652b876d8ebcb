//! Subcommand implementations.

use crate::config::CliConfig;
use crate::error::CliError;
use nxt_link::{CommandSequence, CycleReport, LowSpeedController, SequenceRunner, Session};
use nxt_protocol::{
    Command, ErrorCode, FileEntry, MotorPort, Response, ResponseBody, SensorIdentity, SensorPort,
};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Prints results as text or JSON.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    pub fn show<T, F>(&self, value: &T, text: F) -> Result<(), CliError>
    where
        T: Serialize,
        F: FnOnce() -> String,
    {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            println!("{}", text());
        }
        Ok(())
    }
}

fn unexpected(response: &Response) -> CliError {
    CliError::UnexpectedReply {
        opcode: response.opcode,
    }
}

fn or_unknown<T: ToString>(value: Option<T>) -> String {
    value.map_or_else(|| "?".to_string(), |v| v.to_string())
}

pub fn battery(session: &mut Session, out: Output) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::battery_level())?;
    let ResponseBody::BatteryLevel(level) = &response.body else {
        return Err(unexpected(&response));
    };
    out.show(level, || match level.volts() {
        Some(volts) => format!("battery: {:.3} V", volts),
        None => "battery: unknown".to_string(),
    })
}

#[derive(Serialize)]
struct BrickInfo {
    firmware: nxt_protocol::FirmwareVersion,
    device: nxt_protocol::DeviceInfo,
    program: Option<String>,
}

pub fn info(session: &mut Session, out: Output) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::firmware_version())?;
    let ResponseBody::FirmwareVersion(firmware) = response.body.clone() else {
        return Err(unexpected(&response));
    };
    let response = session.execute_checked(&Command::device_info())?;
    let ResponseBody::DeviceInfo(device) = response.body.clone() else {
        return Err(unexpected(&response));
    };
    // No running program is reported as a status, not a failure.
    let program = session
        .execute(&Command::current_program_name())?
        .program_name()
        .map(str::to_string);

    let info = BrickInfo {
        firmware,
        device,
        program,
    };
    out.show(&info, || {
        format!(
            "name:       {}\n{}\nbluetooth:  {}\nsignal:     {}\nfree flash: {} bytes\nprogram:    {}",
            info.device.name.as_deref().unwrap_or("?"),
            info.firmware,
            info.device
                .bluetooth_address_string()
                .unwrap_or_else(|| "?".to_string()),
            or_unknown(info.device.signal_strength),
            or_unknown(info.device.free_flash),
            info.program.as_deref().unwrap_or("(none)"),
        )
    })
}

pub fn keep_alive(session: &mut Session, out: Output) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::keep_alive())?;
    let ResponseBody::KeepAlive(keep_alive) = &response.body else {
        return Err(unexpected(&response));
    };
    out.show(keep_alive, || {
        format!("sleep timeout: {} ms", or_unknown(keep_alive.sleep_time_ms))
    })
}

pub fn tone(
    session: &mut Session,
    out: Output,
    frequency_hz: u16,
    duration_ms: u16,
) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::play_tone(frequency_hz, duration_ms))?;
    out.show(&response, || format!("tone {} Hz for {} ms", frequency_hz, duration_ms))
}

pub fn sensor(session: &mut Session, out: Output, port: SensorPort) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::input_values(port))?;
    let ResponseBody::InputValues(values) = &response.body else {
        return Err(unexpected(&response));
    };
    out.show(values, || {
        format!(
            "{}: type {:?}, mode {:?}, raw {}, normalized {}, scaled {}{}",
            port,
            values.sensor_type,
            values.mode,
            or_unknown(values.raw),
            or_unknown(values.normalized),
            or_unknown(values.scaled),
            if values.valid == Some(true) { "" } else { " (invalid)" },
        )
    })
}

pub fn motor(session: &mut Session, out: Output, port: MotorPort) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::output_state(port))?;
    let ResponseBody::OutputState(state) = &response.body else {
        return Err(unexpected(&response));
    };
    out.show(state, || {
        format!(
            "{:?}: power {}, run state {:?}, tacho {} / limit {}, rotation {}",
            port,
            or_unknown(state.power),
            state.run_state,
            or_unknown(state.tacho_count),
            or_unknown(state.tacho_limit),
            or_unknown(state.rotation_count),
        )
    })
}

pub fn buttons(session: &mut Session, out: Output) -> Result<(), CliError> {
    let response = session.execute_checked(&Command::button_state())?;
    let state = match &response.body {
        ResponseBody::IoMapRead(map) => map.button_state(),
        _ => None,
    }
    .ok_or_else(|| unexpected(&response))?;
    out.show(&state, || {
        format!(
            "enter: {}, left: {}, right: {}, cancel: {}",
            state.enter, state.left, state.right, state.cancel
        )
    })
}

/// List files matching `pattern` with FindFirst/FindNext.
pub fn ls(session: &mut Session, out: Output, pattern: &str) -> Result<(), CliError> {
    let mut entries: Vec<FileEntry> = Vec::new();

    let mut response = session.execute(&Command::find_first(pattern))?;
    let mut handle = None;
    loop {
        match (response.status, &response.body) {
            (ErrorCode::Success, ResponseBody::FileEntry(entry)) => {
                handle = entry.handle.or(handle);
                entries.push(entry.clone());
            }
            (ErrorCode::FileNotFound | ErrorCode::NoMoreFiles, _) => break,
            (ErrorCode::Success, _) => return Err(unexpected(&response)),
            (status, _) => {
                return Err(nxt_link::ExecuteError::Device {
                    opcode: response.opcode,
                    status,
                }
                .into())
            }
        }
        let Some(h) = handle else { break };
        response = session.execute(&Command::find_next(h))?;
    }

    if let Some(h) = handle {
        // Some firmware already released the handle with NoMoreFiles.
        let closed = session.execute(&Command::close(h))?;
        debug!(handle = h, status = %closed.status, "search handle closed");
    }

    out.show(&entries, || {
        entries
            .iter()
            .map(|e| {
                format!(
                    "{:>8}  {}",
                    or_unknown(e.size),
                    e.file_name.as_deref().unwrap_or("?")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}

#[derive(Serialize)]
struct SonarReading {
    port: SensorPort,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity: Option<SensorIdentity>,
    distance_cm: u8,
    polls: u32,
}

pub fn sonar(
    session: &mut Session,
    out: Output,
    config: &CliConfig,
    port: SensorPort,
    identify: bool,
) -> Result<(), CliError> {
    let mut bus = LowSpeedController::with_config(session, config.lowspeed.clone());
    let identity = if identify {
        Some(bus.read_identity(port)?)
    } else {
        None
    };
    let distance_cm = bus.read_sonar_distance(port)?;
    let reading = SonarReading {
        port,
        identity,
        distance_cm,
        polls: bus.polls(),
    };
    out.show(&reading, || match &reading.identity {
        Some(id) => format!("{} ({}): {} cm", port, id, reading.distance_cm),
        None => format!("{}: {} cm", port, reading.distance_cm),
    })
}

/// Load a sequence file and replay it until done or interrupted.
pub fn run(
    session: &mut Session,
    out: Output,
    path: &Path,
    cycles: Option<u64>,
) -> Result<(), CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let sequence: CommandSequence =
        serde_yaml::from_str(&text).map_err(|source| CliError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
    info!(
        path = %path.display(),
        commands = sequence.commands.len(),
        poll_interval_ms = sequence.poll_interval_ms,
        "running sequence"
    );

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::Release))?;
    }

    let mut runner = SequenceRunner::new(sequence);
    let mut print_error = None;
    let completed = runner.run(session, cycles, &stop, |report| {
        if print_error.is_none() {
            if let Err(e) = print_cycle(out, report) {
                print_error = Some(e);
            }
        }
    })?;
    if let Some(e) = print_error {
        return Err(e);
    }

    if !out.json {
        match runner.average_polling_ms() {
            Some(avg) => println!("{} cycles, average period {:.1} ms", completed, avg),
            None => println!("{} cycle(s)", completed),
        }
    }
    Ok(())
}

fn print_cycle(out: Output, report: &CycleReport) -> Result<(), CliError> {
    if out.json {
        // One report per line so the output can be streamed.
        println!("{}", serde_json::to_string(report)?);
        return Ok(());
    }
    println!(
        "cycle {}: {} ok, {} failed{} ({:.1} ms)",
        report.index,
        report.outcomes.len() - report.failures(),
        report.failures(),
        if report.aborted { ", aborted" } else { "" },
        report.elapsed_ms
    );
    for outcome in &report.outcomes {
        if let nxt_link::CommandOutcome::Failed { index, error, .. } = outcome {
            println!("  #{}: {}", index, error);
        }
    }
    Ok(())
}
