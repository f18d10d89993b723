pub mod bridge;
pub mod config;
pub mod endpoint;
pub mod lifecycle;
pub mod reactor;
pub mod serial;

pub use bridge::{Bridge, BridgeError, GREETING};
pub use config::{Arguments, BridgeConfig};
pub use reactor::{Reactor, ReactorHandle, Task};

/// Wait for the device, then relay until Ctrl-C.
///
/// Must run on a current-thread runtime: every state change happens on the
/// bridge loop, the I/O tasks only post completions to it.
pub async fn run(config: BridgeConfig) -> bridge::Result<()> {
    if config.ssl_cert.is_some() {
        log::warn!("SSL certificates are not supported, serving plain TCP");
    }

    let reactor = Reactor::new();
    let mut bridge = Bridge::open(&config, &reactor).await?;

    while !bridge.is_serial_available() {
        bridge.wait_for_serial(config.poll_interval).await?;
    }

    let handle = reactor.handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                log::info!("Interrupted, shutting down");
                handle.shutdown();
            }
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    bridge.run(reactor).await;
    Ok(())
}
