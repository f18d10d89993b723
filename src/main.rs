//! Entry point for `serialbridge`.
//!
//! Owns process setup only: logging, argument parsing, the runtime. Startup
//! failures are printed together with the configuration and reflected in the
//! exit status.
use anyhow::Context;
use clap::Parser;

use serialbridge::{Arguments, BridgeConfig};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Arguments::parse();

    if args.version {
        println!("serialbridge {}", env!("CARGO_PKG_VERSION"));
        println!("License GPLv3+: GNU GPL Version 3 or higher <http://gnu.org/licenses/gpl.html>");
        return Ok(());
    }

    let config = BridgeConfig::try_from(&args).context("Invalid configuration")?;

    if args.config {
        print!("{}", config);
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start the runtime")?;

    if let Err(e) = runtime.block_on(serialbridge::run(config.clone())) {
        log::error!(">>> FATAL: {}", e);
        eprintln!("================================");
        eprintln!("{}", config);
        return Err(e.into());
    }

    Ok(())
}
