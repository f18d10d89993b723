use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::{ConnectionState, Link, LinkHandler};
use crate::endpoint::{Completion, Endpoint, Notice};
use crate::reactor::{ReactorHandle, Task};

/// Back-off after a failed accept (e.g. out of file descriptors)
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("Failed to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// TCP listener serving one client at a time
pub struct NetworkLifecycle {
    local_addr: SocketAddr,
    reactor: ReactorHandle,
    acceptor: JoinHandle<()>,
    state: ConnectionState,
    endpoint: Option<Endpoint>,
    peer: Option<SocketAddr>,
    sessions: u64,
}

impl NetworkLifecycle {
    /// Bind and start accepting. Accepted sockets are posted to the reactor
    /// and only adopted once the bridge loop handles them.
    pub async fn bind(addr: SocketAddr, reactor: &ReactorHandle) -> Result<Self, NetworkError> {
        let bind_error = |source: io::Error| NetworkError::Bind { addr, source };
        let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        log::info!("Listening on {}", local_addr);
        let acceptor = tokio::spawn(accept_loop(listener, reactor.clone()));

        Ok(Self {
            local_addr,
            reactor: reactor.clone(),
            acceptor,
            state: ConnectionState::Disconnected,
            endpoint: None,
            peer: None,
            sessions: 0,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Adopt a freshly accepted client. A client that is still tracked is
    /// shut down and reported as disconnected first.
    pub fn on_accept(
        &mut self,
        stream: TcpStream,
        peer: SocketAddr,
        handler: &mut dyn LinkHandler,
    ) {
        if let Some(mut previous) = self.endpoint.take() {
            let old = self.peer.map(|p| p.to_string()).unwrap_or_default();
            log::warn!("Client {} replaced by {}", old, peer);
            previous.shutdown();
            self.state = ConnectionState::Disconnected;
            handler.on_disconnect(Link::Network);
        }

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("TCP_NODELAY for {}: {}", peer, e);
        }

        self.sessions += 1;
        let endpoint = Endpoint::new(Box::new(stream), Link::Network, self.sessions, &self.reactor);
        self.endpoint = Some(endpoint);
        self.peer = Some(peer);
        self.state = ConnectionState::Connected;

        log::info!("Client {} connected", peer);
        handler.on_connected(Link::Network);

        if let Some(endpoint) = self.endpoint.as_mut() {
            endpoint.start_reading();
        }
    }

    pub fn send(&mut self, data: &[u8]) -> bool {
        match self.endpoint.as_mut() {
            Some(endpoint) => endpoint.send(data),
            None => {
                log::debug!("No client connected, dropping {} bytes", data.len());
                false
            }
        }
    }

    /// Handle a completion posted by the client endpoint
    pub fn on_completion(&mut self, completion: Completion, handler: &mut dyn LinkHandler) {
        let Some(endpoint) = self.endpoint.as_mut() else {
            return;
        };
        if endpoint.session() != completion.session {
            return;
        }

        match endpoint.on_completion(completion.kind) {
            Some(Notice::Received(data)) => handler.on_read_complete(Link::Network, &data),
            Some(Notice::Sent(n)) => handler.on_write_complete(Link::Network, n),
            Some(Notice::Disconnected(reason)) => {
                if let Some(peer) = self.peer.take() {
                    log::info!("Client {} disconnected: {}", peer, reason);
                }
                self.endpoint = None;
                self.state = ConnectionState::Disconnected;
                handler.on_disconnect(Link::Network);
            }
            None => {}
        }
    }

    /// Drop the client and stop accepting
    pub fn close(&mut self) {
        self.acceptor.abort();
        if let Some(mut endpoint) = self.endpoint.take() {
            endpoint.shutdown();
        }
        self.peer = None;
        self.state = ConnectionState::Closed;
    }
}

impl Drop for NetworkLifecycle {
    fn drop(&mut self) {
        self.acceptor.abort();
    }
}

async fn accept_loop(listener: TcpListener, reactor: ReactorHandle) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if !reactor.post(Task::Accepted { stream, peer }) {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Accept failed: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    use super::*;
    use crate::lifecycle::testing::{Recorder, Seen};
    use crate::reactor::Reactor;

    async fn listener(reactor: &Reactor) -> NetworkLifecycle {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        NetworkLifecycle::bind(addr, &reactor.handle()).await.unwrap()
    }

    async fn dispatch_until(
        reactor: &mut Reactor,
        network: &mut NetworkLifecycle,
        recorder: &mut Recorder,
        until: impl Fn(&NetworkLifecycle, &Recorder) -> bool,
    ) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while !until(&*network, &*recorder) {
                match reactor.next().await {
                    Some(Task::Accepted { stream, peer }) => {
                        network.on_accept(stream, peer, &mut *recorder)
                    }
                    Some(Task::Io { link: Link::Network, completion }) => {
                        network.on_completion(completion, &mut *recorder)
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn client_bytes_are_reported_and_echo_goes_back() {
        let mut reactor = Reactor::new();
        let mut network = listener(&reactor).await;
        let mut recorder = Recorder::default();

        let mut client = TcpStream::connect(network.local_addr()).await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |n, _| n.is_connected()).await;
        assert_eq!(recorder.seen, vec![Seen::Connected(Link::Network)]);
        assert!(network.peer().is_some());

        client.write_all(b"ping").await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |_, r| {
            r.bytes_read(Link::Network) == b"ping"
        })
        .await;

        assert!(network.send(b"pong"));
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"pong");
    }

    #[tokio::test]
    async fn disconnect_returns_to_listening() {
        let mut reactor = Reactor::new();
        let mut network = listener(&reactor).await;
        let mut recorder = Recorder::default();

        let client = TcpStream::connect(network.local_addr()).await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |n, _| n.is_connected()).await;

        drop(client);
        dispatch_until(&mut reactor, &mut network, &mut recorder, |n, _| {
            n.state() == ConnectionState::Disconnected
        })
        .await;
        assert_eq!(recorder.count(&Seen::Disconnected(Link::Network)), 1);
        assert!(!network.send(b"nobody"));

        let _again = TcpStream::connect(network.local_addr()).await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |n, _| n.is_connected()).await;
        assert_eq!(recorder.count(&Seen::Connected(Link::Network)), 2);
    }

    #[tokio::test]
    async fn second_client_replaces_the_first() {
        let mut reactor = Reactor::new();
        let mut network = listener(&reactor).await;
        let mut recorder = Recorder::default();

        let mut first = TcpStream::connect(network.local_addr()).await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |_, r| {
            r.count(&Seen::Connected(Link::Network)) == 1
        })
        .await;

        let mut second = TcpStream::connect(network.local_addr()).await.unwrap();
        dispatch_until(&mut reactor, &mut network, &mut recorder, |_, r| {
            r.count(&Seen::Connected(Link::Network)) == 2
        })
        .await;

        assert_eq!(
            recorder.seen,
            vec![
                Seen::Connected(Link::Network),
                Seen::Disconnected(Link::Network),
                Seen::Connected(Link::Network),
            ]
        );

        // the old socket is shut down
        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(2), first.read(&mut buf))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);

        assert!(network.send(b"new"));
        let mut reply = [0u8; 3];
        second.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"new");
    }
}
