//! floatterm - A shared, fading drawing canvas for remote terminals
//!
//! Serves the canvas over SSH until interrupted.

use anyhow::{Context, Result};
use clap::{Arg, Command};
use floatterm::{CanvasServer, ServerConfig, SharedCanvas};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("floatterm")
        .version(floatterm::VERSION)
        .about("A shared, fading drawing canvas served to remote terminals")
        .long_about(
            "floatterm serves one shared canvas over SSH. Every connected viewer \
             draws with the mouse and watches everyone's strokes glow and fade.",
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .short('l')
                .value_name("ADDR")
                .help("Address to listen on (default 0.0.0.0:2222)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file"),
        )
        .arg(
            Arg::new("host-key")
                .long("host-key")
                .short('k')
                .value_name("FILE")
                .help("SSH host key (generated at startup when omitted)"),
        )
        .arg(
            Arg::new("gradients")
                .long("gradients")
                .short('g')
                .value_name("FILE")
                .help("Gradient table replacing the built-in one"),
        )
        .get_matches();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => ServerConfig::load(&PathBuf::from(path))
            .with_context(|| format!("loading configuration from {path}"))?,
        None => ServerConfig::discover().context("loading configuration")?,
    };

    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen = listen
            .parse()
            .with_context(|| format!("invalid listen address: {listen}"))?;
    }
    if let Some(host_key) = matches.get_one::<String>("host-key") {
        config.host_key = Some(PathBuf::from(host_key));
    }
    if let Some(gradients) = matches.get_one::<String>("gradients") {
        config.gradients = Some(PathBuf::from(gradients));
    }

    let gradients = config.gradient_table().context("loading gradients")?;
    log::info!("loaded {} gradients", gradients.len());

    let server = CanvasServer::bind(config, SharedCanvas::new(gradients)).await?;

    let shutdown = CancellationToken::new();
    let on_interrupt = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, closing sessions");
            on_interrupt.cancel();
        }
    });

    server.run(shutdown).await?;
    Ok(())
}
