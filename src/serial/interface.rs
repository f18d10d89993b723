use std::path::Path;

use tokio_serial::SerialPortBuilderExt;

use super::{Result, SerialError, SerialSettings};
use crate::endpoint::Transport;

/// Something that can be probed for presence and opened as a byte stream.
///
/// The bridge only ever talks to the device through this trait, so tests can
/// substitute an in-memory stream for a real UART.
pub trait SerialDevice: Send {
    /// Human readable name used in log lines
    fn name(&self) -> &str;

    /// True if the device node currently exists
    fn is_present(&self) -> bool;

    /// Open and configure the device
    fn open(&self) -> Result<Box<dyn Transport>>;
}

/// A tty / COM port opened through tokio-serial
pub struct TtyDevice {
    settings: SerialSettings,
}

impl TtyDevice {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    /// Whether the OS enumerates a port with this name (covers COM ports,
    /// which have no filesystem node)
    fn is_enumerated(&self) -> Result<bool> {
        let ports = serialport::available_ports()?;
        Ok(ports.iter().any(|p| p.port_name == self.settings.device))
    }
}

impl SerialDevice for TtyDevice {
    fn name(&self) -> &str {
        &self.settings.device
    }

    fn is_present(&self) -> bool {
        if Path::new(&self.settings.device).exists() {
            return true;
        }
        match self.is_enumerated() {
            Ok(found) => found,
            Err(e) => {
                log::debug!("Port enumeration failed: {}", e);
                false
            }
        }
    }

    fn open(&self) -> Result<Box<dyn Transport>> {
        if !self.is_present() {
            return Err(SerialError::PortNotFound(self.settings.device.clone()));
        }

        let stream = tokio_serial::new(&self.settings.device, self.settings.baud_rate)
            .flow_control(self.settings.flow_control.into())
            .open_native_async()
            .map_err(|e| SerialError::OpenFailed {
                port: self.settings.device.clone(),
                reason: e.to_string(),
            })?;

        log::info!(
            "Opened {} at {} baud (flow control: {})",
            self.settings.device,
            self.settings.baud_rate,
            self.settings.flow_control
        );
        let transport: Box<dyn Transport> = Box::new(stream);
        Ok(transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::FlowControl;

    fn missing_device() -> TtyDevice {
        TtyDevice::new(SerialSettings {
            device: "/dev/serialbridge-does-not-exist".to_string(),
            baud_rate: 115200,
            flow_control: FlowControl::None,
        })
    }

    #[test]
    fn absent_device_is_not_present() {
        let device = missing_device();
        assert!(!device.is_present());
        assert_eq!(device.name(), device.settings().device);
        assert!(!device.is_enumerated().unwrap_or(false));
    }

    #[test]
    fn opening_absent_device_reports_port_not_found() {
        match missing_device().open() {
            Err(SerialError::PortNotFound(port)) => {
                assert_eq!(port, "/dev/serialbridge-does-not-exist")
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("absent device opened"),
        }
    }
}
