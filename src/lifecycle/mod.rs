pub mod network;
pub mod serial;

pub use network::{NetworkError, NetworkLifecycle};
pub use serial::{ReconnectPolicy, SerialLifecycle};

use std::fmt;

/// Which side of the bridge something belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Link {
    Serial,
    Network,
}

impl fmt::Display for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Link::Serial => f.write_str("serial"),
            Link::Network => f.write_str("network"),
        }
    }
}

/// Connection state of one side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    AwaitingDevice,
    Connected,
    Closed,
}

/// Observer for everything a lifecycle reports upward.
///
/// Both lifecycles are handed the same implementation (the bridge) on each
/// call, so no handler reference is ever stored.
pub trait LinkHandler {
    fn on_connected(&mut self, link: Link);

    fn on_read_complete(&mut self, link: Link, data: &[u8]);

    fn on_write_complete(&mut self, _link: Link, _written: usize) {}

    fn on_disconnect(&mut self, link: Link);
}
