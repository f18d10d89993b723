//! One transport (a UART stream or an accepted TCP socket) with its receive
//! buffer, transmit queue and the tasks that perform its I/O.
pub mod pump;
pub mod queue;

pub use pump::RX_BUF_SIZE;
pub use queue::TransmitQueue;

use std::io;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::sync::{mpsc, watch};

use crate::lifecycle::Link;
use crate::reactor::ReactorHandle;
use pump::Poster;

/// Any duplex byte stream the bridge can relay
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Why an endpoint operation stopped
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Cancellation we asked for ourselves
    #[error("operation aborted")]
    Aborted,

    #[error("end of stream")]
    Eof,

    #[error("connection reset: {0}")]
    Reset(#[source] io::Error),

    #[error("transport I/O error: {0}")]
    Io(#[source] io::Error),
}

impl LinkError {
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => LinkError::Reset(err),
            _ => LinkError::Io(err),
        }
    }

    /// Locally requested cancellation, never reported as a failure
    pub fn is_benign(&self) -> bool {
        matches!(self, LinkError::Aborted)
    }

    /// The peer went away (EOF or reset) as opposed to a transport fault
    pub fn is_disconnect(&self) -> bool {
        matches!(self, LinkError::Eof | LinkError::Reset(_))
    }
}

/// A finished endpoint operation, tagged with the session that issued it
#[derive(Debug)]
pub struct Completion {
    pub session: u64,
    pub kind: CompletionKind,
}

#[derive(Debug)]
pub enum CompletionKind {
    Read(Vec<u8>),
    Wrote(usize),
    Closed(LinkError),
}

/// What the owning lifecycle has to act on after a completion
#[derive(Debug)]
pub enum Notice {
    Received(Vec<u8>),
    Sent(usize),
    Disconnected(LinkError),
}

pub struct Endpoint {
    link: Link,
    session: u64,
    active: bool,
    queue: TransmitQueue,
    reader: Option<ReadHalf<Box<dyn Transport>>>,
    write_ops: mpsc::UnboundedSender<Vec<u8>>,
    cancel: watch::Sender<bool>,
    poster: Poster,
}

impl Endpoint {
    /// Wrap a transport. The write side is ready immediately; reading starts
    /// with [`Endpoint::start_reading`]. Must be called inside the runtime.
    pub fn new(
        transport: Box<dyn Transport>,
        link: Link,
        session: u64,
        reactor: &ReactorHandle,
    ) -> Self {
        let (reader, writer) = tokio::io::split(transport);
        let (write_ops, ops_rx) = mpsc::unbounded_channel();
        let (cancel, cancel_rx) = watch::channel(false);
        let poster = Poster { link, session, reactor: reactor.clone() };

        tokio::spawn(pump::write_ops(writer, ops_rx, poster.clone(), cancel_rx));

        Self {
            link,
            session,
            active: true,
            queue: TransmitQueue::new(),
            reader: Some(reader),
            write_ops,
            cancel,
            poster,
        }
    }

    pub fn session(&self) -> u64 {
        self.session
    }

    /// Bytes queued but not yet acknowledged by a write completion
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Arm the read pump. Calling it again is a no-op.
    pub fn start_reading(&mut self) -> bool {
        if !self.active {
            return false;
        }
        let Some(reader) = self.reader.take() else {
            return true;
        };

        tokio::spawn(pump::read_pump(reader, self.poster.clone(), self.cancel.subscribe()));
        true
    }

    /// Queue bytes for transmission, starting a write if none is in flight
    pub fn send(&mut self, data: &[u8]) -> bool {
        if !self.active {
            return false;
        }
        match self.queue.push(data) {
            Some(chunk) => self.start_write(chunk),
            None => true,
        }
    }

    fn start_write(&mut self, chunk: Vec<u8>) -> bool {
        if self.write_ops.send(chunk).is_err() {
            log::warn!("{} writer is gone, dropping {} queued bytes", self.link, self.queue.len());
            self.queue.clear();
            return false;
        }
        true
    }

    /// Apply a completion posted by this endpoint's tasks
    pub fn on_completion(&mut self, kind: CompletionKind) -> Option<Notice> {
        match kind {
            CompletionKind::Read(data) => self.active.then_some(Notice::Received(data)),
            CompletionKind::Wrote(n) => {
                if !self.active {
                    return None;
                }
                if let Some(next) = self.queue.complete() {
                    self.start_write(next);
                }
                Some(Notice::Sent(n))
            }
            CompletionKind::Closed(reason) => {
                if self.close(&reason) {
                    Some(Notice::Disconnected(reason))
                } else {
                    None
                }
            }
        }
    }

    /// Returns true if the endpoint actually went down and the owner must be
    /// told. Aborts and repeated closes are swallowed.
    fn close(&mut self, reason: &LinkError) -> bool {
        if reason.is_benign() {
            log::debug!("{} operation cancelled: {}", self.link, reason);
            return false;
        }
        if !self.active {
            return false;
        }

        if reason.is_disconnect() {
            log::info!("{} closed: {}", self.link, reason);
        } else {
            log::error!("{} failed: {}", self.link, reason);
        }
        self.shutdown();
        true
    }

    /// Stop all I/O and release the transport
    pub fn shutdown(&mut self) {
        self.active = false;
        self.queue.clear();
        self.reader = None;
        let _ = self.cancel.send(true);
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("link", &self.link)
            .field("session", &self.session)
            .field("active", &self.active)
            .field("pending", &self.queue.len())
            .finish()
    }
}
