//! In-process transport with a scripted device on the other end.
//!
//! [`pair`] returns a [`LoopbackTransport`] for the session and a
//! [`DeviceEnd`] that plays the brick: it sees every framed command the
//! host writes and answers with whatever bytes the test chooses.
//!
//! ```rust,ignore
//! let (transport, device) = loopback::pair("loop0");
//! let _device = device.serve(|command| Some(Response::acknowledged(command.opcode())));
//! let mut session = Session::with_transport(transport, SessionConfig::default())?;
//! ```

use crate::transport::Transport;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use nxt_protocol::{Command, FrameCodec, Response};
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// How long a reader blocks before reporting a timeout.
const READ_SLICE: Duration = Duration::from_millis(20);

/// Create a connected host/device pair.
pub fn pair(name: &str) -> (LoopbackTransport, DeviceEnd) {
    let (host_tx, device_rx) = crossbeam_channel::unbounded();
    let (device_tx, host_rx) = crossbeam_channel::unbounded();
    let pending = Arc::new(AtomicUsize::new(0));

    let transport = LoopbackTransport {
        name: name.to_string(),
        to_device: host_tx,
        unread: host_rx.clone(),
        from_device: Some(host_rx),
        pending: Arc::clone(&pending),
    };
    let device = DeviceEnd {
        from_host: device_rx,
        to_host: device_tx,
        codec: FrameCodec::new(),
        pending,
    };
    (transport, device)
}

/// Host side of a loopback pair.
#[derive(Debug)]
pub struct LoopbackTransport {
    name: String,
    to_device: Sender<Vec<u8>>,
    from_device: Option<Receiver<Vec<u8>>>,
    /// Shares the reader's queue; chunks still here have not been read.
    unread: Receiver<Vec<u8>>,
    pending: Arc<AtomicUsize>,
}

impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.to_device
            .send(frame.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "device end dropped"))
    }

    fn pending_output(&mut self) -> io::Result<usize> {
        Ok(self.pending.load(Ordering::Acquire))
    }

    fn take_reader(&mut self) -> io::Result<Box<dyn Read + Send>> {
        let rx = self
            .from_device
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "reader already taken"))?;
        Ok(Box::new(ChannelReader {
            rx,
            leftover: Vec::new(),
        }))
    }

    fn discard_input(&mut self) -> io::Result<()> {
        let dropped = self.unread.try_iter().map(|chunk| chunk.len()).sum::<usize>();
        if dropped > 0 {
            debug!(port = %self.name, bytes = dropped, "discarded unread input");
        }
        Ok(())
    }
}

/// Adapts the device-to-host channel to [`Read`].
struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    leftover: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.leftover.is_empty() {
            match self.rx.recv_timeout(READ_SLICE) {
                Ok(bytes) => self.leftover = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

/// Device side of a loopback pair.
#[derive(Debug)]
pub struct DeviceEnd {
    from_host: Receiver<Vec<u8>>,
    to_host: Sender<Vec<u8>>,
    codec: FrameCodec,
    pending: Arc<AtomicUsize>,
}

impl DeviceEnd {
    /// Wait for the next command the host writes.
    ///
    /// `None` when nothing arrives in time, the host hung up, or the bytes
    /// do not parse as a command.
    pub fn recv_command(&mut self, timeout: Duration) -> Option<Command> {
        self.next_command(timeout).ok().flatten()
    }

    fn next_command(&mut self, timeout: Duration) -> Result<Option<Command>, RecvTimeoutError> {
        loop {
            match self.codec.decode() {
                Ok(Some(payload)) => {
                    return match Command::decode(&payload) {
                        Ok(command) => Ok(Some(command)),
                        Err(e) => {
                            warn!(error = %e, "device could not parse command");
                            Ok(None)
                        }
                    };
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "device lost framing");
                    self.codec.clear();
                    return Ok(None);
                }
            }
            let bytes = self.from_host.recv_timeout(timeout)?;
            self.codec.push(&bytes);
        }
    }

    /// Send a framed reply.
    pub fn reply(&self, response: &Response) -> io::Result<()> {
        let payload = response
            .encode()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let frame = FrameCodec::encode(&payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        self.send_raw(&frame)
    }

    /// Send arbitrary bytes to the host.
    pub fn send_raw(&self, bytes: &[u8]) -> io::Result<()> {
        self.to_host
            .send(bytes.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "host end dropped"))
    }

    /// Make the host see `bytes` of unsent output.
    pub fn set_pending_output(&self, bytes: usize) {
        self.pending.store(bytes, Ordering::Release);
    }

    /// Answer commands on a background thread until the host hangs up.
    ///
    /// The handler sees every command; its reply is sent only when the
    /// command asked for one. Returning `None` leaves the host waiting.
    pub fn serve<F>(mut self, mut handler: F) -> JoinHandle<()>
    where
        F: FnMut(&Command) -> Option<Response> + Send + 'static,
    {
        thread::spawn(move || loop {
            let command = match self.next_command(READ_SLICE) {
                Ok(Some(command)) => command,
                Ok(None) | Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            let reply = handler(&command);
            if !command.wants_response() {
                continue;
            }
            if let Some(response) = reply {
                if self.reply(&response).is_err() {
                    break;
                }
            } else {
                debug!(opcode = %command.opcode(), "device stays silent");
            }
        })
    }
}
