//! The mediator between the UART and the TCP client.
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::time::Duration;

use crate::config::BridgeConfig;
use crate::lifecycle::{
    ConnectionState, Link, LinkHandler, NetworkError, NetworkLifecycle, SerialLifecycle,
};
use crate::reactor::{Reactor, Task};
use crate::serial::{SerialError, TtyDevice};

/// Sent once to every client after both sides are up
pub const GREETING: &[u8] = b"SerialBridge\n\r";

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Serial error: {0}")]
    Serial(#[from] SerialError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

/// Readiness flags and forwarding rules.
///
/// Forwarded bytes are collected in an outbox that the bridge hands to the
/// endpoints before it takes the next task, so they always reach the
/// session that was current when they were produced.
#[derive(Debug, Default)]
pub struct BridgeState {
    serial_ready: bool,
    tcp_ready: bool,
    hello_sent: bool,
    outbox: Vec<(Link, Vec<u8>)>,
}

impl BridgeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serial_ready(&self) -> bool {
        self.serial_ready
    }

    pub fn tcp_ready(&self) -> bool {
        self.tcp_ready
    }

    pub fn hello_sent(&self) -> bool {
        self.hello_sent
    }

    /// Bytes forwarded since the last call, oldest first
    pub fn take_outgoing(&mut self) -> Vec<(Link, Vec<u8>)> {
        std::mem::take(&mut self.outbox)
    }

    fn check_readiness(&mut self) {
        if !(self.serial_ready && self.tcp_ready) || self.hello_sent {
            return;
        }

        log::info!("TCP + Serial ready");
        self.forward(Link::Network, GREETING);
        self.hello_sent = true;
    }

    fn forward(&mut self, to: Link, data: &[u8]) {
        self.outbox.push((to, data.to_vec()));
    }
}

impl LinkHandler for BridgeState {
    fn on_connected(&mut self, link: Link) {
        match link {
            Link::Serial => self.serial_ready = true,
            Link::Network => {
                log::info!("Client connect");
                self.tcp_ready = true;
            }
        }
        self.check_readiness();
    }

    fn on_read_complete(&mut self, link: Link, data: &[u8]) {
        match link {
            Link::Serial if self.tcp_ready => self.forward(Link::Network, data),
            Link::Network if self.tcp_ready && self.serial_ready => {
                self.forward(Link::Serial, data)
            }
            _ => log::debug!("Dropping {} bytes from {}, bridge not ready", data.len(), link),
        }
    }

    fn on_write_complete(&mut self, link: Link, written: usize) {
        log::trace!("{} wrote {} bytes", link, written);
    }

    fn on_disconnect(&mut self, link: Link) {
        match link {
            Link::Network => {
                log::info!("Client disconnect");
                self.tcp_ready = false;
                self.hello_sent = false;
            }
            // serial readiness is latched; clients stay connected either way
            Link::Serial => log::warn!("Serial device disconnected"),
        }
    }
}

/// Owns both sides and runs the dispatch loop
pub struct Bridge {
    state: BridgeState,
    serial: SerialLifecycle,
    network: NetworkLifecycle,
}

impl Bridge {
    pub fn new(serial: SerialLifecycle, network: NetworkLifecycle) -> Self {
        Self {
            state: BridgeState::new(),
            serial,
            network,
        }
    }

    /// Build both sides from configuration. The listener is bound right away.
    pub async fn open(config: &BridgeConfig, reactor: &Reactor) -> Result<Self> {
        let handle = reactor.handle();
        let device = TtyDevice::new(config.serial.clone());
        let serial = SerialLifecycle::new(Box::new(device), config.reconnect, &handle);
        let network = NetworkLifecycle::bind(config.listen, &handle).await?;
        Ok(Self::new(serial, network))
    }

    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    pub fn serial_state(&self) -> ConnectionState {
        self.serial.state()
    }

    pub fn network_state(&self) -> ConnectionState {
        self.network.state()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.network.local_addr()
    }

    pub fn is_serial_available(&self) -> bool {
        self.state.serial_ready
    }

    /// One presence check of the serial device; sleeps `delay` if absent
    pub async fn wait_for_serial(&mut self, delay: Duration) -> Result<bool> {
        let connected = self.serial.await_connection(delay, &mut self.state).await?;
        self.flush();
        Ok(connected)
    }

    pub fn start(&mut self) {
        self.serial.start();
    }

    /// Apply one reactor task. Breaks on shutdown.
    pub fn dispatch(&mut self, task: Task) -> ControlFlow<()> {
        match task {
            Task::Io { link: Link::Serial, completion } => {
                self.serial.on_completion(completion, &mut self.state)
            }
            Task::Io { link: Link::Network, completion } => {
                self.network.on_completion(completion, &mut self.state)
            }
            Task::Accepted { stream, peer } => {
                self.network.on_accept(stream, peer, &mut self.state)
            }
            Task::ProbeDevice => self.serial.probe(&mut self.state),
            Task::Shutdown => return ControlFlow::Break(()),
        }
        self.flush();
        ControlFlow::Continue(())
    }

    /// Hand forwarded bytes to the endpoints that are current right now
    fn flush(&mut self) {
        for (to, data) in self.state.take_outgoing() {
            match to {
                Link::Serial => self.serial.send(&data),
                Link::Network => self.network.send(&data),
            };
        }
    }

    /// Drain the reactor until shutdown, then close both sides
    pub async fn run(mut self, mut reactor: Reactor) {
        self.start();
        while let Some(task) = reactor.next().await {
            if self.dispatch(task).is_break() {
                break;
            }
        }
        self.close();
    }

    pub fn close(&mut self) {
        log::info!("Closing bridge");
        self.network.close();
        self.serial.close();
    }
}
