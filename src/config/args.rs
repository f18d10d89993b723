use clap::Parser;

use crate::serial::FlowControl;

/// Bridges a serial device to a TCP client
#[derive(Debug, Clone, Parser)]
#[command(name = "serialbridge", about, disable_version_flag = true)]
pub struct Arguments {
    /// Path to the serial device
    #[arg(short, long, default_value = "/dev/ttyUSB0", help_heading = "Device")]
    pub device: String,

    /// Baud rate for the selected device
    #[arg(short, long, default_value_t = 115200, help_heading = "Device")]
    pub baudrate: u32,

    /// Handshake mode for the selected device
    #[arg(short, long, value_enum, default_value_t = FlowControl::None, help_heading = "Device")]
    pub flow_control: FlowControl,

    /// Reopen the device if it disappears while running
    #[arg(long, help_heading = "Device")]
    pub reconnect: bool,

    /// Delay between device presence checks, in milliseconds
    #[arg(long, default_value_t = 4000, help_heading = "Device")]
    pub poll_interval: u64,

    /// Address of the server ("all interfaces" listens everywhere)
    #[arg(short, long, default_value = "127.0.0.1", help_heading = "TCP/IP Server Interface")]
    pub ip: String,

    /// TCP port of the server
    #[arg(short, long, default_value_t = 23, help_heading = "TCP/IP Server Interface")]
    pub port: u16,

    /// SSL certificate of the server (not supported yet, ignored)
    #[arg(short = 'r', long, default_value = "", help_heading = "TCP/IP Server Interface")]
    pub ssl_cert: String,

    /// Print the current configuration and exit
    #[arg(long)]
    pub config: bool,

    /// Print version information and exit
    #[arg(short = 'v', long)]
    pub version: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_a_usb_adapter_on_telnet() {
        let args = Arguments::try_parse_from(["serialbridge"]).unwrap();
        assert_eq!(args.device, "/dev/ttyUSB0");
        assert_eq!(args.baudrate, 115200);
        assert_eq!(args.ip, "127.0.0.1");
        assert_eq!(args.port, 23);
        assert_eq!(args.ssl_cert, "");
        assert_eq!(args.flow_control, FlowControl::None);
        assert_eq!(args.poll_interval, 4000);
        assert!(!args.reconnect && !args.config && !args.version);
    }

    #[test]
    fn short_flags() {
        let args = Arguments::try_parse_from([
            "serialbridge",
            "-d",
            "/dev/ttyACM0",
            "-b",
            "9600",
            "-i",
            "0.0.0.0",
            "-p",
            "2323",
            "-f",
            "hardware",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.device, "/dev/ttyACM0");
        assert_eq!(args.baudrate, 9600);
        assert_eq!(args.ip, "0.0.0.0");
        assert_eq!(args.port, 2323);
        assert_eq!(args.flow_control, FlowControl::Hardware);
        assert!(args.version);
    }

    #[test]
    fn bad_port_is_rejected() {
        assert!(Arguments::try_parse_from(["serialbridge", "--port", "70000"]).is_err());
    }
}
