use anyhow::Result;
use serialport::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, SerialPortType, StopBits,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const AUTO: &str = "auto";

/// Where the link should connect: a named device or "pick one for me".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Auto,
    Named(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PortSpecError {
    #[error("empty port name")]
    Empty,
}

impl FromStr for PortSpec {
    type Err = PortSpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            Err(PortSpecError::Empty)
        } else if s.eq_ignore_ascii_case(AUTO) {
            Ok(PortSpec::Auto)
        } else {
            Ok(PortSpec::Named(s.to_string()))
        }
    }
}

/// Picks a device out of the enumerated ports when the spec is `auto`.
pub trait PortResolver {
    fn resolve(&self, ports: &[SerialPortInfo]) -> Option<String>;
}

/// Never finds anything; the link comes up disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDetect;

impl PortResolver for NoDetect {
    fn resolve(&self, _ports: &[SerialPortInfo]) -> Option<String> {
        None
    }
}

/// First USB serial device whose VID (and PID, if given) match.
#[derive(Debug, Clone, Copy)]
pub struct UsbIdResolver {
    pub vid: u16,
    pub pid: Option<u16>,
}

impl PortResolver for UsbIdResolver {
    fn resolve(&self, ports: &[SerialPortInfo]) -> Option<String> {
        ports
            .iter()
            .find(|p| match &p.port_type {
                SerialPortType::UsbPort(usb) => {
                    usb.vid == self.vid && self.pid.is_none_or(|pid| usb.pid == pid)
                }
                _ => false,
            })
            .map(|p| p.port_name.clone())
    }
}

/// Turn a port spec into a device name. Enumeration failures count as
/// "nothing found".
pub fn resolve_port(spec: &PortSpec, resolver: &dyn PortResolver) -> Option<String> {
    match spec {
        PortSpec::Named(name) => Some(name.clone()),
        PortSpec::Auto => match serialport::available_ports() {
            Ok(ports) => resolver.resolve(&ports),
            Err(e) => {
                eprintln!("[port] enumerate failed: {}", e);
                None
            }
        },
    }
}

pub fn open_port(dev: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
    let builder = serialport::new(dev, baud)
        .timeout(Duration::from_millis(100))
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None);

    builder
        .open()
        .map_err(|e| anyhow::anyhow!("open {}: {}", dev, e))
}

pub fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => format!(
            "{} usb vid={:04X} pid={:04X} product={} serial={}",
            info.port_name,
            usb.vid,
            usb.pid,
            usb.product.as_deref().unwrap_or("-"),
            usb.serial_number.as_deref().unwrap_or("-"),
        ),
        SerialPortType::PciPort => format!("{} pci", info.port_name),
        SerialPortType::BluetoothPort => format!("{} bluetooth", info.port_name),
        SerialPortType::Unknown => format!("{} unknown", info.port_name),
    }
}
