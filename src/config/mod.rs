pub mod args;

pub use args::Arguments;

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::ReconnectPolicy;
use crate::serial::SerialSettings;

/// Listen address meaning "every interface"
pub const ALL_INTERFACES: &str = "all interfaces";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid listen address '{0}'")]
    InvalidAddress(String),

    #[error("Baud rate must be greater than zero")]
    InvalidBaudRate,

    #[error("Poll interval must be greater than zero")]
    InvalidPollInterval,
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub serial: SerialSettings,
    pub listen: SocketAddr,
    pub poll_interval: Duration,
    pub reconnect: ReconnectPolicy,
    pub ssl_cert: Option<PathBuf>,
}

impl TryFrom<&Arguments> for BridgeConfig {
    type Error = ConfigError;

    fn try_from(args: &Arguments) -> Result<Self, Self::Error> {
        if args.baudrate == 0 {
            return Err(ConfigError::InvalidBaudRate);
        }
        if args.poll_interval == 0 {
            return Err(ConfigError::InvalidPollInterval);
        }

        let poll_interval = Duration::from_millis(args.poll_interval);
        let reconnect = if args.reconnect {
            ReconnectPolicy::Poll(poll_interval)
        } else {
            ReconnectPolicy::Never
        };

        Ok(Self {
            serial: SerialSettings {
                device: args.device.clone(),
                baud_rate: args.baudrate,
                flow_control: args.flow_control,
            },
            listen: SocketAddr::new(parse_listen_ip(&args.ip)?, args.port),
            poll_interval,
            reconnect,
            ssl_cert: (!args.ssl_cert.is_empty()).then(|| PathBuf::from(&args.ssl_cert)),
        })
    }
}

pub fn parse_listen_ip(ip: &str) -> Result<IpAddr, ConfigError> {
    let ip = ip.trim();
    if ip.eq_ignore_ascii_case(ALL_INTERFACES) {
        return Ok(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }
    ip.parse().map_err(|_| ConfigError::InvalidAddress(ip.to_string()))
}

impl fmt::Display for BridgeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SerialBridge Configuration")?;
        writeln!(f, "------------------------------")?;
        writeln!(f, "Address: {}", self.listen.ip())?;
        writeln!(f, "Port: {}", self.listen.port())?;
        writeln!(f, "Device: {}", self.serial.device)?;
        writeln!(f, "Baudrate: {}", self.serial.baud_rate)?;
        writeln!(f, "Flow control: {}", self.serial.flow_control)?;
        match self.reconnect {
            ReconnectPolicy::Never => writeln!(f, "Reconnect: off"),
            ReconnectPolicy::Poll(every) => {
                writeln!(f, "Reconnect: every {} ms", every.as_millis())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    fn config(argv: &[&str]) -> Result<BridgeConfig, ConfigError> {
        let mut full = vec!["serialbridge"];
        full.extend_from_slice(argv);
        BridgeConfig::try_from(&Arguments::parse_from(full))
    }

    #[test]
    fn default_configuration() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen, "127.0.0.1:23".parse().unwrap());
        assert_eq!(config.serial.device, "/dev/ttyUSB0");
        assert_eq!(config.reconnect, ReconnectPolicy::Never);
        assert_eq!(config.poll_interval, Duration::from_millis(4000));
        assert!(config.ssl_cert.is_none());
    }

    #[test]
    fn all_interfaces_alias() {
        let config = config(&["--ip", "all interfaces", "--port", "2000"]).unwrap();
        assert_eq!(config.listen, "0.0.0.0:2000".parse().unwrap());
    }

    #[test]
    fn ipv6_listen_address() {
        let config = config(&["--ip", "::1"]).unwrap();
        assert_eq!(config.listen, "[::1]:23".parse().unwrap());
    }

    #[test]
    fn hostnames_are_rejected() {
        assert!(matches!(config(&["--ip", "localhost"]), Err(ConfigError::InvalidAddress(_))));
    }

    #[test]
    fn reconnect_uses_poll_interval() {
        let config = config(&["--reconnect", "--poll-interval", "250"]).unwrap();
        assert_eq!(config.reconnect, ReconnectPolicy::Poll(Duration::from_millis(250)));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(matches!(config(&["-b", "0"]), Err(ConfigError::InvalidBaudRate)));
        assert!(matches!(config(&["--poll-interval", "0"]), Err(ConfigError::InvalidPollInterval)));
    }

    #[test]
    fn display_lists_the_essentials() {
        let text = config(&["-d", "/dev/ttyACM1", "-b", "57600"]).unwrap().to_string();
        assert!(text.contains("Device: /dev/ttyACM1"));
        assert!(text.contains("Baudrate: 57600"));
        assert!(text.contains("Port: 23"));
    }
}
