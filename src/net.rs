//! Device Facade over TCP, talking to [`crate::server::serve`].
//!
//! The facade is synchronous; it owns a small tokio runtime and blocks on it
//! for each exchange. `stop_immediately` uses its own short-lived connection
//! because the main one is busy with the in-flight poll.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::device::{DeviceInfo, InventoryRequest, RawTagRead, ReaderDevice};
use crate::error::DeviceError;
use crate::protocol::{encode_line, parse_line, ReaderRequest, ReaderResponse};

pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);
/// Slack added on top of a poll's scan budget before the reply is abandoned.
pub const POLL_TIMEOUT_MARGIN: Duration = Duration::from_secs(2);

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn open(addr: &str) -> std::io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader: BufReader::new(reader), writer })
    }

    async fn exchange(&mut self, request: &ReaderRequest) -> Result<ReaderResponse, DeviceError> {
        let line = encode_line(request).map_err(|_| DeviceError::communication())?;
        self.writer.write_all(line.as_bytes()).await?;

        let mut reply = String::new();
        if self.reader.read_line(&mut reply).await? == 0 {
            return Err(DeviceError::communication());
        }
        parse_line(&reply).map_err(|_| DeviceError::communication())
    }
}

async fn send_once(addr: &str, request: ReaderRequest) -> Result<ReaderResponse, DeviceError> {
    let mut connection = Connection::open(addr).await?;
    connection.exchange(&request).await
}

pub struct NetworkReader {
    addr: String,
    runtime: Runtime,
    connection: Mutex<Option<Connection>>,
    io_timeout: Duration,
}

impl NetworkReader {
    pub fn new(host: &str, port: u16) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("uhfscan-net")
            .enable_all()
            .build()?;

        Ok(Self {
            addr: format!("{}:{}", host, port),
            runtime,
            connection: Mutex::new(None),
            io_timeout: DEFAULT_IO_TIMEOUT,
        })
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.addr
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.connection.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Send one request on the main connection. Any transport failure drops
    /// the connection and reports a communication error.
    fn request(&self, request: &ReaderRequest, timeout: Duration) -> Result<ReaderResponse, DeviceError> {
        let mut guard = self.lock();
        let connection = guard.as_mut().ok_or_else(DeviceError::communication)?;

        let outcome = self
            .runtime
            .block_on(async { tokio::time::timeout(timeout, connection.exchange(request)).await });

        match outcome {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => {
                warn!(addr = %self.addr, "Reader exchange failed: {}", e);
                *guard = None;
                Err(e)
            }
            Err(_) => {
                warn!(addr = %self.addr, timeout_ms = timeout.as_millis() as u64, "Reader exchange timed out");
                *guard = None;
                Err(DeviceError::communication())
            }
        }
    }

    fn command(&self, request: ReaderRequest) -> Result<(), DeviceError> {
        self.request(&request, self.io_timeout)?.check()
    }
}

impl ReaderDevice for NetworkReader {
    fn connect(&self) -> Result<(), DeviceError> {
        let opened = self
            .runtime
            .block_on(async { tokio::time::timeout(self.io_timeout, Connection::open(&self.addr)).await });

        let connection = match opened {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => {
                warn!(addr = %self.addr, "Failed to connect to reader: {}", e);
                return Err(e.into());
            }
            Err(_) => {
                warn!(addr = %self.addr, "Connecting to reader timed out");
                return Err(DeviceError::communication());
            }
        };

        *self.lock() = Some(connection);
        debug!(addr = %self.addr, "TCP connection established");
        self.command(ReaderRequest::Connect)
    }

    fn disconnect(&self) -> Result<(), DeviceError> {
        if self.lock().is_none() {
            return Ok(());
        }
        let result = self.command(ReaderRequest::Disconnect);
        *self.lock() = None;
        result
    }

    fn poll_inventory(&self, request: &InventoryRequest) -> Result<Vec<RawTagRead>, DeviceError> {
        let budget = request.scan_budget();
        self.request(&ReaderRequest::PollInventory { request: *request }, budget + POLL_TIMEOUT_MARGIN)?
            .into_tags()
    }

    fn set_region(&self, band: u8, max_index: u8, min_index: u8) -> Result<(), DeviceError> {
        self.command(ReaderRequest::SetRegion { band, max_index, min_index })
    }

    fn set_antenna_mask(&self, persist: bool, mask: u16) -> Result<(), DeviceError> {
        self.command(ReaderRequest::SetAntennaMask { persist, mask })
    }

    fn reader_info(&self) -> Result<DeviceInfo, DeviceError> {
        self.request(&ReaderRequest::ReaderInfo, self.io_timeout)?.into_info()
    }

    fn serial_number(&self) -> Result<String, DeviceError> {
        self.request(&ReaderRequest::SerialNumber, self.io_timeout)?.into_serial()
    }

    fn stop_immediately(&self) -> Result<(), DeviceError> {
        let outcome = self
            .runtime
            .block_on(async { tokio::time::timeout(self.io_timeout, send_once(&self.addr, ReaderRequest::StopImmediately)).await });

        match outcome {
            Ok(response) => response?.check(),
            Err(_) => Err(DeviceError::communication()),
        }
    }

    fn set_power(&self, dbm: u8) -> Result<(), DeviceError> {
        self.command(ReaderRequest::SetPower { dbm })
    }

    fn set_beep(&self, enabled: bool) -> Result<(), DeviceError> {
        self.command(ReaderRequest::SetBeep { enabled })
    }

    fn set_write_power(&self, packed: u8) -> Result<(), DeviceError> {
        self.command(ReaderRequest::SetWritePower { packed })
    }
}
