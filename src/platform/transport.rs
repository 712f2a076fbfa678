//! Byte transport between the device and the host.

use std::{
    collections::VecDeque,
    io::{self, Read, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{self, Receiver, RecvTimeoutError},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use hexplay::HexViewBuilder;
use log::{debug, info, log_enabled, trace, Level::Trace};
use serialport::SerialPort;
use thiserror::Error;

use crate::Settings;

// =============================================================================
// Public Interface
// =============================================================================

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TransportError {
    /// Nothing (or not enough) arrived before the deadline. The link itself
    /// is still usable.
    #[error("timed out waiting for data")]
    Timeout,
    /// The link is gone.
    #[error("{0}")]
    Io(String),
}

/// The serial link as seen by the update engine.
pub trait Transport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Block until `buf` is completely filled or until `timeout` elapses.
    /// `None` waits indefinitely.
    fn receive(&mut self, buf: &mut [u8], timeout: Option<Duration>)
        -> Result<(), TransportError>;
}

// SerialTransport =============================================================

/// A [`Transport`] over a host serial port.
///
/// A reader thread plays the role of the receive-complete interrupt: every
/// block it reads is handed over a channel to the shell, which waits on it
/// with a deadline instead of spinning.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    blocks: Receiver<io::Result<Vec<u8>>>,
    pending: VecDeque<u8>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}
impl SerialTransport {
    /// Open and configure the port named in `settings`, retrying a few times
    /// in case the device is still enumerating.
    pub fn open(settings: &Settings) -> Result<Self, serialport::Error> {
        let port = open_and_setup_port(settings)?;
        SerialTransport::new(port)
    }

    pub fn new(port: Box<dyn SerialPort>) -> Result<Self, serialport::Error> {
        let mut reader_port = port.try_clone()?;
        reader_port.set_timeout(Duration::from_millis(100))?;

        let (tx, blocks) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let reader_stop = Arc::clone(&stop);

        let reader = thread::spawn(move || {
            let mut buf = vec![0u8; 4096];
            while !reader_stop.load(Ordering::Relaxed) {
                match reader_port.read(&mut buf) {
                    Ok(0) => {}
                    Ok(n) => {
                        if tx.send(Ok(buf[..n].to_vec())).is_err() {
                            break;
                        }
                    }
                    Err(ref e) if e.kind() == io::ErrorKind::TimedOut => {}
                    Err(e) => {
                        info!("serial reader stopped: {}", e);
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });

        Ok(SerialTransport {
            port,
            blocks,
            pending: VecDeque::new(),
            stop,
            reader: Some(reader),
        })
    }

    fn next_block(&mut self, deadline: Option<Instant>) -> Result<Vec<u8>, TransportError> {
        let received = match deadline {
            None => self
                .blocks
                .recv()
                .map_err(|_| TransportError::Io("serial reader is gone".into()))?,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Err(TransportError::Timeout);
                }
                match self.blocks.recv_timeout(deadline - now) {
                    Ok(block) => block,
                    Err(RecvTimeoutError::Timeout) => return Err(TransportError::Timeout),
                    Err(RecvTimeoutError::Disconnected) => {
                        return Err(TransportError::Io("serial reader is gone".into()))
                    }
                }
            }
        };
        received.map_err(|e| TransportError::Io(e.to_string()))
    }
}
impl Transport for SerialTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        trace!("sending {} bytes", bytes.len());
        self.port
            .write_all(bytes)
            .and_then(|_| self.port.flush())
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        timeout: Option<Duration>,
    ) -> Result<(), TransportError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut filled = 0;
        loop {
            while filled < buf.len() {
                match self.pending.pop_front() {
                    Some(b) => {
                        buf[filled] = b;
                        filled += 1;
                    }
                    None => break,
                }
            }
            if filled == buf.len() {
                return Ok(());
            }

            let block = match self.next_block(deadline) {
                Ok(block) => block,
                Err(e) => {
                    unread(&mut self.pending, &buf[..filled]);
                    return Err(e);
                }
            };
            // Dump the received data in a hex table for debugging
            if log_enabled!(Trace) {
                let view = HexViewBuilder::new(&block)
                    .address_offset(0)
                    .row_width(16)
                    .finish();
                trace!("received {} bytes\n{}", block.len(), view);
            }
            self.pending.extend(block);
        }
    }
}
impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

// MemoryTransport =============================================================

/// An in-memory [`Transport`] fed from a script.
///
/// Clones share the same queues, so a handle can be kept to push host input
/// and inspect device output after the transport itself has been handed
/// over. A receive that cannot be satisfied from what is queued fails with
/// [`TransportError::Timeout`] without consuming anything.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    incoming: Arc<Mutex<VecDeque<u8>>>,
    outgoing: Arc<Mutex<Vec<u8>>>,
    hung_up: Arc<AtomicBool>,
}
impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Queue bytes as if the host had sent them.
    pub fn push<B: AsRef<[u8]>>(&self, bytes: B) {
        let mut incoming = self.incoming.lock().unwrap_or_else(|e| e.into_inner());
        incoming.extend(bytes.as_ref());
    }

    /// Everything the device sent so far.
    pub fn output(&self) -> Vec<u8> {
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Device output as text, with invalid UTF-8 replaced.
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output()).into_owned()
    }

    /// Simulate losing the link: every further call fails with an I/O error.
    pub fn hang_up(&self) {
        self.hung_up.store(true, Ordering::SeqCst);
    }

    fn check_link(&self) -> Result<(), TransportError> {
        if self.hung_up.load(Ordering::SeqCst) {
            return Err(TransportError::Io("link hung up".into()));
        }
        Ok(())
    }
}
impl Transport for MemoryTransport {
    fn send(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.check_link()?;
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(bytes);
        Ok(())
    }

    fn receive(
        &mut self,
        buf: &mut [u8],
        _timeout: Option<Duration>,
    ) -> Result<(), TransportError> {
        self.check_link()?;
        let mut incoming = self.incoming.lock().unwrap_or_else(|e| e.into_inner());
        if incoming.len() < buf.len() {
            return Err(TransportError::Timeout);
        }
        let n = buf.len();
        for (slot, byte) in buf.iter_mut().zip(incoming.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// Put bytes taken out of `pending` back at its front, in their original
/// order.
fn unread(pending: &mut VecDeque<u8>, bytes: &[u8]) {
    for &b in bytes.iter().rev() {
        pending.push_front(b);
    }
}

fn open_and_setup_port(settings: &Settings) -> Result<Box<dyn SerialPort>, serialport::Error> {
    use retry::{delay, retry_with_index};

    let path = settings.path.clone().ok_or_else(|| {
        serialport::Error::new(serialport::ErrorKind::InvalidInput, "no serial port given")
    })?;

    let result = retry_with_index(
        delay::Fixed::from_millis(1000).take(4),
        |index| -> Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            serialport::new(&path, settings.baud_rate)
                .data_bits(settings.data_bits)
                .stop_bits(settings.stop_bits)
                .parity(settings.parity)
                .flow_control(settings.flow_control)
                .open()
        },
    );
    match result {
        Ok(mut port) => {
            port.set_baud_rate(settings.baud_rate)?;
            port.set_data_bits(settings.data_bits)?;
            port.set_stop_bits(settings.stop_bits)?;
            port.set_parity(settings.parity)?;
            port.set_flow_control(settings.flow_control)?;

            info!("Connected to {} at {} baud", path, settings.baud_rate);
            debug!("data_bits    : {:#?}", settings.data_bits);
            debug!("stop_bits    : {:#?}", settings.stop_bits);
            debug!("parity       : {:#?}", settings.parity);
            debug!("flow control : {:#?}", settings.flow_control);
            Ok(port)
        }
        Err(err) => match err {
            retry::Error::Operation {
                error,
                total_delay,
                tries,
            } => {
                info!(
                    "Failed to open the port after {:?} and {} tries: {}",
                    total_delay, tries, error,
                );
                Err(error)
            }
            retry::Error::Internal(_) => {
                info!("Internal retry error while opening port");
                Err(serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ))
            }
        },
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
