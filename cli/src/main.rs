mod cli;

use crate::cli::RedgateArguments;
use anyhow::Result;
use clap::{CommandFactory, Parser};
use log::{LevelFilter, info, trace};
use redgate::{Gateway, GatewayConfig, Iptables, ShutdownSignal};

#[tokio::main]
async fn main() -> Result<()> {
    let args = RedgateArguments::parse();
    pretty_env_logger::env_logger::builder()
        .format_timestamp(None)
        .filter_level(if args.verbose { LevelFilter::Trace } else { LevelFilter::Warn })
        .init();

    if args.man {
        RedgateArguments::command().print_long_help()?;
        return Ok(());
    }

    let config = GatewayConfig::assemble(args.config_path.as_deref(), (&args).into()).await?;
    if let Err(e) = RedgateArguments::ensure_proxy_configured(&config) {
        e.exit();
    }
    trace!("Configuration: {}", config);

    // Installed before any firewall change so an early interrupt still goes through teardown.
    let shutdown = ShutdownSignal::install()?;
    let firewall = Iptables::new(config.get_firewall_binary());

    info!("Starting redgate");
    Gateway::new(config, firewall)?.run(shutdown.recv()).await?;
    Ok(())
}
