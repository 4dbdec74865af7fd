//! ads-relay daemon entry point.
//!
//! Logging is configured through `RUST_LOG` and defaults to `info`.

use std::process;

use ads_relay::app;
use ads_relay::config::{Cli, RelayConfig};
use clap::Parser;
use log::{debug, error, info};
use tokio::task::LocalSet;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting ads-relay {}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = match RelayConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };
    debug!("Effective configuration: {:#?}", config.redacted());

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Could not start runtime: {}", e);
            process::exit(1);
        }
    };

    let local = LocalSet::new();
    if let Err(e) = local.block_on(&runtime, app::run(config)) {
        error!("{}", e);
        process::exit(1);
    }
}
