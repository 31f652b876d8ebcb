//! Byte channels and the frame reader thread.
//!
//! A [`Transport`] is the only thing that touches the underlying channel.
//! Its read half is handed to a dedicated thread that reassembles frames and
//! forwards them to the session over a channel; the write half stays with
//! the session.

use crossbeam_channel::{Receiver, Sender};
use nxt_protocol::{FrameCodec, ProtocolError};
use parking_lot::Mutex;
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// A full-duplex byte channel to a brick.
pub trait Transport: Send {
    /// Label used in logs, metrics and errors.
    fn name(&self) -> &str;

    /// Write one framed command.
    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Bytes written but not yet transmitted.
    fn pending_output(&mut self) -> io::Result<usize>;

    /// Detach the read half. Called once, when the session starts.
    ///
    /// Reads should return `ErrorKind::TimedOut` periodically so the reader
    /// thread can notice shutdown.
    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>>;

    /// Drop bytes received but not yet read.
    fn discard_input(&mut self) -> io::Result<()>;
}

/// A serial port (USB CDC or Bluetooth SPP).
pub struct SerialTransport {
    name: String,
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open `name` at `baud_rate`; reads give up after `read_timeout`.
    pub fn open(name: &str, baud_rate: u32, read_timeout: Duration) -> serialport::Result<Self> {
        let port = serialport::new(name, baud_rate)
            .timeout(read_timeout)
            .open()?;
        debug!(port = name, baud_rate, "serial port opened");
        Ok(SerialTransport {
            name: name.to_string(),
            port,
        })
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn pending_output(&mut self) -> io::Result<usize> {
        Ok(self.port.bytes_to_write()? as usize)
    }

    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let reader = self.port.try_clone()?;
        Ok(Box::new(reader))
    }

    fn discard_input(&mut self) -> io::Result<()> {
        Ok(self.port.clear(ClearBuffer::Input)?)
    }
}

/// What the reader thread reports to the session.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// A complete payload.
    Frame(Vec<u8>),
    /// The byte stream could not be split into frames.
    Malformed(ProtocolError),
    /// Reading failed; the thread has exited.
    Failed(io::Error),
    /// End of stream; the thread has exited.
    Closed,
}

/// The running reader thread and the state it shares with the session.
pub(crate) struct FrameReader {
    pub(crate) inbound: Receiver<Inbound>,
    codec: Arc<Mutex<FrameCodec>>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameReader {
    pub(crate) fn spawn(label: &str, reader: Box<dyn Read + Send>) -> io::Result<FrameReader> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let codec = Arc::new(Mutex::new(FrameCodec::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let thread = {
            let codec = Arc::clone(&codec);
            let stop = Arc::clone(&stop);
            let label = label.to_string();
            thread::Builder::new()
                .name(format!("nxt-reader-{}", label))
                .spawn(move || read_loop(&label, reader, &codec, &tx, &stop))?
        };

        Ok(FrameReader {
            inbound: rx,
            codec,
            stop,
            thread: Some(thread),
        })
    }

    /// Drop bytes of a frame that has not completed.
    pub(crate) fn clear_partial(&self) {
        let mut codec = self.codec.lock();
        if codec.buffered_len() > 0 {
            debug!(bytes = codec.buffered_len(), "discarding partial frame");
            codec.clear();
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("frame reader thread panicked");
            }
        }
    }
}

impl Drop for FrameReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read_loop(
    label: &str,
    mut reader: Box<dyn Read + Send>,
    codec: &Mutex<FrameCodec>,
    tx: &Sender<Inbound>,
    stop: &AtomicBool,
) {
    let mut buf = [0u8; 256];
    while !stop.load(Ordering::Acquire) {
        let n = match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.send(Inbound::Closed);
                return;
            }
            Ok(n) => n,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => {
                let _ = tx.send(Inbound::Failed(e));
                return;
            }
        };

        trace!(port = label, rx = %hex::encode(&buf[..n]), "bytes received");

        let mut codec = codec.lock();
        codec.push(&buf[..n]);
        loop {
            let msg = match codec.decode() {
                Ok(Some(payload)) => Inbound::Frame(payload),
                Ok(None) => break,
                Err(e) => {
                    codec.clear();
                    Inbound::Malformed(e)
                }
            };
            let malformed = matches!(msg, Inbound::Malformed(_));
            if tx.send(msg).is_err() {
                // Session dropped its receiver.
                return;
            }
            if malformed {
                break;
            }
        }
    }
}
