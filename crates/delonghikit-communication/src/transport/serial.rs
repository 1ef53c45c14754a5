//! Serial port transport
//!
//! Connects to the bridge over USB serial. Supports:
//! - Port enumeration and discovery
//! - Baud rate, data bits, stop bits, parity and flow control
//! - Separate read and write timeouts
//! - A background reader thread feeding the registered listener

use delonghikit_core::{Error, Result, TransportError};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{ConnectionStatus, Transport, TransportListener};

/// Name of the reader thread
const READER_THREAD_NAME: &str = "delonghikit-serial-rx";

/// Size of a single read from the port
const READ_CHUNK: usize = 256;

/// Serial parity setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerialParity {
    /// No parity
    #[default]
    None,
    /// Even parity
    Even,
    /// Odd parity
    Odd,
}

/// Serial connection parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialParams {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5-8)
    pub data_bits: u8,
    /// Stop bits (1-2)
    pub stop_bits: u8,
    /// Parity
    pub parity: SerialParity,
    /// Hardware flow control
    pub flow_control: bool,
    /// How long a single read waits for bytes
    pub read_timeout: Duration,
    /// Upper bound for a single write
    pub write_timeout: Duration,
}

impl Default for SerialParams {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 115_200,
            data_bits: 8,
            stop_bits: 1,
            parity: SerialParity::None,
            flow_control: false,
            read_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(windows) {
        "COM3"
    } else if cfg!(target_os = "macos") {
        "/dev/cu.usbserial-0001"
    } else {
        "/dev/ttyUSB0"
    }
}

/// Information about an available serial port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialPortInfo {
    /// Port name (e.g., "/dev/ttyUSB0", "COM3")
    pub port_name: String,

    /// Port description (e.g., "USB Silicon Labs CP2102")
    pub description: String,

    /// Manufacturer name if available
    pub manufacturer: Option<String>,

    /// USB vendor ID if applicable
    pub vid: Option<u16>,

    /// USB product ID if applicable
    pub pid: Option<u16>,
}

/// List serial ports the bridge could be attached to
///
/// Filters ports to USB serial patterns:
/// - Windows: COM* (e.g., COM1, COM3)
/// - Linux: /dev/ttyUSB*, /dev/ttyACM*
/// - macOS: /dev/cu.usbserial-*, /dev/cu.usbmodem*, /dev/cu.SLAB_USBtoUART
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    let ports = serialport::available_ports().map_err(|e| {
        tracing::error!("Failed to enumerate serial ports: {}", e);
        Error::other(format!("Failed to enumerate ports: {}", e))
    })?;

    Ok(ports
        .iter()
        .filter(|port| is_bridge_port(&port.port_name))
        .map(|port| {
            let mut info = SerialPortInfo {
                port_name: port.port_name.clone(),
                description: port_description(port),
                manufacturer: None,
                vid: None,
                pid: None,
            };
            if let serialport::SerialPortType::UsbPort(usb) = &port.port_type {
                info.vid = Some(usb.vid);
                info.pid = Some(usb.pid);
                info.manufacturer = usb.manufacturer.clone();
            }
            info
        })
        .collect())
}

/// Check if a port name matches a USB serial adapter
pub fn is_bridge_port(port_name: &str) -> bool {
    if let Some(number) = port_name.strip_prefix("COM") {
        return !number.is_empty() && number.chars().all(|c| c.is_ascii_digit());
    }

    port_name.starts_with("/dev/ttyUSB")
        || port_name.starts_with("/dev/ttyACM")
        || port_name.starts_with("/dev/cu.usbserial")
        || port_name.starts_with("/dev/cu.usbmodem")
        || port_name.starts_with("/dev/cu.SLAB_USBtoUART")
}

fn port_description(port: &serialport::SerialPortInfo) -> String {
    match &port.port_type {
        serialport::SerialPortType::UsbPort(usb_info) => {
            format!(
                "USB {} {}",
                usb_info.manufacturer.as_deref().unwrap_or("Device"),
                usb_info.product.as_deref().unwrap_or("Serial Port")
            )
        }
        serialport::SerialPortType::BluetoothPort => "Bluetooth Serial".to_string(),
        serialport::SerialPortType::PciPort => "PCI Serial".to_string(),
        _ => "Serial Port".to_string(),
    }
}

fn to_serialport_parity(parity: SerialParity) -> serialport::Parity {
    match parity {
        SerialParity::None => serialport::Parity::None,
        SerialParity::Even => serialport::Parity::Even,
        SerialParity::Odd => serialport::Parity::Odd,
    }
}

/// State shared with the reader thread
struct Shared {
    status: RwLock<ConnectionStatus>,
    listener: RwLock<Option<Arc<dyn TransportListener>>>,
    running: AtomicBool,
}

impl Shared {
    fn listener(&self) -> Option<Arc<dyn TransportListener>> {
        self.listener.read().clone()
    }
}

/// Serial connection to the bridge
///
/// Inbound bytes are read on a dedicated thread, started when the first
/// listener is registered. Dropping the transport closes the port and stops
/// the thread.
pub struct SerialTransport {
    name: String,
    writer: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    reader: Mutex<Option<Box<dyn serialport::SerialPort>>>,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
    write_timeout: Duration,
    shared: Arc<Shared>,
}

impl SerialTransport {
    /// Open a serial port with the given parameters
    pub fn open(params: &SerialParams) -> std::result::Result<Self, TransportError> {
        let open_failed = |reason: String| {
            tracing::warn!("Failed to open serial port {}: {}", params.port, reason);
            TransportError::open_failed(&params.port, reason)
        };

        let data_bits = match params.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            8 => serialport::DataBits::Eight,
            other => return Err(open_failed(format!("Invalid data bits: {}", other))),
        };
        let stop_bits = match params.stop_bits {
            1 => serialport::StopBits::One,
            2 => serialport::StopBits::Two,
            other => return Err(open_failed(format!("Invalid stop bits: {}", other))),
        };

        let mut writer = serialport::new(&params.port, params.baud_rate)
            .timeout(params.write_timeout)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(to_serialport_parity(params.parity))
            .flow_control(if params.flow_control {
                serialport::FlowControl::Hardware
            } else {
                serialport::FlowControl::None
            })
            .open()
            .map_err(|e| open_failed(e.to_string()))?;

        let mut reader = writer
            .try_clone()
            .map_err(|e| open_failed(format!("cannot clone port handle: {}", e)))?;
        reader
            .set_timeout(params.read_timeout)
            .map_err(|e| open_failed(e.to_string()))?;
        writer
            .set_timeout(params.write_timeout)
            .map_err(|e| open_failed(e.to_string()))?;

        tracing::info!(
            "Opened serial port {} at {} baud",
            params.port,
            params.baud_rate
        );

        Ok(Self {
            name: params.port.clone(),
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
            reader_thread: Mutex::new(None),
            write_timeout: params.write_timeout,
            shared: Arc::new(Shared {
                status: RwLock::new(ConnectionStatus::Open),
                listener: RwLock::new(None),
                running: AtomicBool::new(true),
            }),
        })
    }

    fn start_reader(&self) {
        let Some(port) = self.reader.lock().take() else {
            return;
        };

        let shared = self.shared.clone();
        let name = self.name.clone();
        let spawned = thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn(move || read_loop(port, shared, name));

        match spawned {
            Ok(handle) => *self.reader_thread.lock() = Some(handle),
            Err(e) => {
                tracing::error!("Failed to start serial reader for {}: {}", self.name, e);
                *self.shared.status.write() = ConnectionStatus::Error;
            }
        }
    }

    fn mark_disconnected(&self) {
        let mut status = self.shared.status.write();
        if *status == ConnectionStatus::Open {
            *status = ConnectionStatus::Disconnected;
        }
    }
}

fn read_loop(mut port: Box<dyn serialport::SerialPort>, shared: Arc<Shared>, name: String) {
    tracing::debug!("Serial reader for {} started", name);
    let mut buf = [0u8; READ_CHUNK];

    while shared.running.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                if let Some(listener) = shared.listener() {
                    listener.on_data(&buf[..n]);
                }
            }
            Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::Interrupted) => {
                continue
            }
            Err(e) => {
                if !shared.running.load(Ordering::SeqCst) {
                    break;
                }
                tracing::error!("Serial port {} read failed: {}", name, e);
                *shared.status.write() = ConnectionStatus::Disconnected;
                shared.running.store(false, Ordering::SeqCst);
                if let Some(listener) = shared.listener() {
                    listener.on_status_changed(ConnectionStatus::Disconnected);
                }
                break;
            }
        }
    }

    tracing::debug!("Serial reader for {} stopped", name);
}

impl Transport for SerialTransport {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn status(&self) -> ConnectionStatus {
        *self.shared.status.read()
    }

    fn write(&self, data: &[u8]) -> std::result::Result<(), TransportError> {
        if !self.status().is_open() {
            return Err(TransportError::Disconnected);
        }

        let mut guard = self.writer.lock();
        let Some(port) = guard.as_mut() else {
            return Err(TransportError::Disconnected);
        };

        let result = port.write_all(data).and_then(|_| port.flush());
        match result {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                tracing::error!("Write to {} timed out", self.name);
                Err(TransportError::write_failed(format!(
                    "timed out after {} ms",
                    self.write_timeout.as_millis()
                )))
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::BrokenPipe
                        | io::ErrorKind::NotConnected
                        | io::ErrorKind::UnexpectedEof
                ) =>
            {
                tracing::error!("Serial port {} lost: {}", self.name, e);
                drop(guard);
                self.mark_disconnected();
                Err(TransportError::Disconnected)
            }
            Err(e) => {
                tracing::error!("Write to {} failed: {}", self.name, e);
                Err(TransportError::write_failed(e.to_string()))
            }
        }
    }

    fn set_listener(&self, listener: Arc<dyn TransportListener>) {
        *self.shared.listener.write() = Some(listener);
        self.start_reader();
    }

    fn close(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.mark_disconnected();
        self.writer.lock().take();
        self.reader.lock().take();

        if let Some(handle) = self.reader_thread.lock().take() {
            // A listener may close the transport from the reader thread itself.
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::error!("Serial reader for {} panicked", self.name);
            }
        }
        tracing::info!("Closed serial port {}", self.name);
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.shared.running.load(Ordering::SeqCst) || self.reader_thread.lock().is_some() {
            self.close();
        }
    }
}

impl std::fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialTransport")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
