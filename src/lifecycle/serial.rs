use std::time::Duration;

use super::{ConnectionState, Link, LinkHandler};
use crate::endpoint::{Completion, Endpoint, Notice};
use crate::reactor::{ReactorHandle, Task};
use crate::serial::{self, SerialDevice};

/// What happens when the serial device goes away mid-session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Stay closed; the bridge keeps serving clients without a device
    Never,
    /// Probe for the device at this interval and reopen it when it returns
    Poll(Duration),
}

/// Presence polling, opening and supervision of the UART side
pub struct SerialLifecycle {
    device: Box<dyn SerialDevice>,
    policy: ReconnectPolicy,
    reactor: ReactorHandle,
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    sessions: u64,
}

impl SerialLifecycle {
    pub fn new(
        device: Box<dyn SerialDevice>,
        policy: ReconnectPolicy,
        reactor: &ReactorHandle,
    ) -> Self {
        Self {
            device,
            policy,
            reactor: reactor.clone(),
            state: ConnectionState::Disconnected,
            endpoint: None,
            sessions: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Open the device if it is present, otherwise sleep for `timeout`.
    ///
    /// Returns `Ok(true)` once connected. Absence is not an error, the caller
    /// loops; failing to open a device that is there is.
    pub async fn await_connection(
        &mut self,
        timeout: Duration,
        handler: &mut dyn LinkHandler,
    ) -> serial::Result<bool> {
        if self.is_connected() {
            return Ok(true);
        }

        self.state = ConnectionState::AwaitingDevice;
        if self.device.is_present() {
            self.open(handler)?;
            return Ok(true);
        }

        log::info!("Waiting {:?} for {}", timeout, self.device.name());
        tokio::time::sleep(timeout).await;
        Ok(false)
    }

    fn open(&mut self, handler: &mut dyn LinkHandler) -> serial::Result<()> {
        let transport = self.device.open()?;

        self.sessions += 1;
        let mut endpoint = Endpoint::new(transport, Link::Serial, self.sessions, &self.reactor);
        endpoint.start_reading();
        self.endpoint = Some(endpoint);
        self.state = ConnectionState::Connected;

        log::info!("Serial device {} connected", self.device.name());
        handler.on_connected(Link::Serial);
        Ok(())
    }

    /// Start the read pump of the open device. No-op when already running.
    pub fn start(&mut self) -> bool {
        match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.start_reading(),
            None => false,
        }
    }

    pub fn send(&mut self, data: &[u8]) -> bool {
        match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.send(data),
            None => {
                log::debug!("Serial device not open, dropping {} bytes", data.len());
                false
            }
        }
    }

    /// Handle a completion posted by the serial endpoint
    pub fn on_completion(&mut self, completion: Completion, handler: &mut dyn LinkHandler) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        if endpoint.session() != completion.session {
            return;
        }

        match endpoint.on_completion(completion.kind) {
            Some(Notice::Received(data)) => handler.on_read_complete(Link::Serial, &data),
            Some(Notice::Sent(n)) => handler.on_write_complete(Link::Serial, n),
            Some(Notice::Disconnected(reason)) => {
                self.endpoint = None;
                match self.policy {
                    ReconnectPolicy::Never => {
                        log::error!(
                            "Serial device {} lost ({}), not reopening",
                            self.device.name(),
                            reason
                        );
                        self.state = ConnectionState::Closed;
                    }
                    ReconnectPolicy::Poll(interval) => {
                        log::warn!(
                            "Serial device {} lost ({}), polling every {:?}",
                            self.device.name(),
                            reason,
                            interval
                        );
                        self.state = ConnectionState::AwaitingDevice;
                        self.reactor.post_after(interval, Task::ProbeDevice);
                    }
                }
                handler.on_disconnect(Link::Serial);
            }
            None => {}
        }
    }

    /// One presence poll after a loss. Reschedules itself until the device
    /// is back; open failures here are retried rather than fatal.
    pub fn probe(&mut self, handler: &mut dyn LinkHandler) {
        let ReconnectPolicy::Poll(interval) = self.policy else {
            return;
        };
        if self.state != ConnectionState::AwaitingDevice {
            return;
        }

        if self.device.is_present() {
            match self.open(handler) {
                Ok(()) => return,
                Err(e) => log::warn!("Reopening {} failed: {}", self.device.name(), e),
            }
        }
        self.reactor.post_after(interval, Task::ProbeDevice);
    }

    pub fn close(&mut self) {
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.shutdown();
        }
        self.state = ConnectionState::Closed;
    }
}
