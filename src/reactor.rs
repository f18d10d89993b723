//! The single dispatcher every completion is funnelled through.
//!
//! I/O runs in tokio tasks, but those tasks never touch bridge state. They
//! post a [`Task`] and the bridge loop, the only consumer of the queue,
//! applies it. Anything that wants to talk to the engine from elsewhere
//! (a signal handler, another thread) does the same through a
//! [`ReactorHandle`].
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::endpoint::Completion;
use crate::lifecycle::Link;

/// Work queued on the reactor
#[derive(Debug)]
pub enum Task {
    /// An endpoint operation finished
    Io { link: Link, completion: Completion },
    /// The listener accepted a client
    Accepted { stream: TcpStream, peer: SocketAddr },
    /// Look for the serial device again
    ProbeDevice,
    /// Close everything and leave the loop
    Shutdown,
}

/// Cloneable posting side of the reactor
#[derive(Debug, Clone)]
pub struct ReactorHandle {
    tx: mpsc::UnboundedSender<Task>,
}

impl ReactorHandle {
    /// Queue a task. Returns false once the reactor is gone.
    pub fn post(&self, task: Task) -> bool {
        self.tx.send(task).is_ok()
    }

    /// Queue a task after `delay` without blocking the caller
    pub fn post_after(&self, delay: Duration, task: Task) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(task).is_err() {
                log::debug!("Reactor closed before delayed task fired");
            }
        });
    }

    /// Ask the loop to close both sides and return
    pub fn shutdown(&self) -> bool {
        self.post(Task::Shutdown)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Owner of the task queue. Built once, its handle is passed to every
/// component constructor.
#[derive(Debug)]
pub struct Reactor {
    handle: ReactorHandle,
    rx: mpsc::UnboundedReceiver<Task>,
}

impl Reactor {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { handle: ReactorHandle { tx }, rx }
    }

    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Wait for the next queued task
    pub async fn next(&mut self) -> Option<Task> {
        self.rx.recv().await
    }

    /// Pop a task if one is already queued
    pub fn try_next(&mut self) -> Option<Task> {
        self.rx.try_recv().ok()
    }
}

impl Default for Reactor {
    fn default() -> Self {
        Self::new()
    }
}
