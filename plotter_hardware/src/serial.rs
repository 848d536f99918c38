//! Serial-port backend built on `serialport`.

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use plotter_traits::{BoxError, Connector, LineSink, LineSource, LinkPair};
use tracing::{debug, trace};

use crate::error::{HwError, Result};
use crate::PortInfo;
use crate::util::LineBuffer;

/// Opens serial endpoints with fixed line settings.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    pub baud: u32,
    /// Per-read timeout; bounds how long one reader poll may block.
    pub read_timeout: Duration,
}

impl Default for SerialConnector {
    fn default() -> Self {
        Self {
            baud: 115_200,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConnector {
    pub fn new(baud: u32, read_timeout: Duration) -> Self {
        Self { baud, read_timeout }
    }

    pub fn open(&self, port_id: &str) -> Result<(SerialSink, SerialSource)> {
        let port = serialport::new(port_id, self.baud)
            .timeout(self.read_timeout)
            .open()
            .map_err(|e| HwError::PortUnavailable {
                port: port_id.to_string(),
                reason: e.to_string(),
            })?;
        let reader = port.try_clone().map_err(|e| HwError::PortUnavailable {
            port: port_id.to_string(),
            reason: format!("clone handle: {e}"),
        })?;
        debug!(port = port_id, baud = self.baud, "serial port opened");
        Ok((
            SerialSink { port },
            SerialSource {
                port: reader,
                buf: LineBuffer::new(),
            },
        ))
    }
}

impl Connector for SerialConnector {
    fn connect(&self, port_id: &str) -> std::result::Result<LinkPair, BoxError> {
        let (sink, source) = self.open(port_id)?;
        Ok(LinkPair {
            sink: Box::new(sink),
            source: Box::new(source),
        })
    }
}

pub struct SerialSink {
    port: Box<dyn serialport::SerialPort>,
}

impl LineSink for SerialSink {
    fn send_line(&mut self, line: &str) -> std::result::Result<(), BoxError> {
        let framed = format!("{line}\n");
        self.port.write_all(framed.as_bytes()).map_err(HwError::Io)?;
        self.port.flush().map_err(HwError::Io)?;
        trace!(line, "serial write");
        Ok(())
    }
}

pub struct SerialSource {
    port: Box<dyn serialport::SerialPort>,
    buf: LineBuffer,
}

impl LineSource for SerialSource {
    fn poll_line(&mut self) -> std::result::Result<Option<String>, BoxError> {
        if let Some(line) = self.buf.next_line() {
            return Ok(Some(line));
        }
        let mut chunk = [0u8; 256];
        match self.port.read(&mut chunk) {
            Ok(0) => Ok(None),
            Ok(n) => {
                self.buf.push(&chunk[..n]);
                Ok(self.buf.next_line())
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(e) => Err(Box::new(HwError::Io(e))),
        }
    }
}

/// Describe the serial endpoints present on this machine.
pub fn available_ports() -> Result<Vec<PortInfo>> {
    let ports = serialport::available_ports().map_err(|e| HwError::Serial(e.to_string()))?;
    Ok(ports
        .into_iter()
        .map(|p| {
            let description = match p.port_type {
                serialport::SerialPortType::UsbPort(usb) => {
                    let product = usb.product.unwrap_or_else(|| "usb".to_string());
                    format!("{product} ({:04x}:{:04x})", usb.vid, usb.pid)
                }
                serialport::SerialPortType::BluetoothPort => "bluetooth".to_string(),
                serialport::SerialPortType::PciPort => "pci".to_string(),
                serialport::SerialPortType::Unknown => "unknown".to_string(),
            };
            PortInfo {
                name: p.port_name,
                description,
            }
        })
        .collect())
}
