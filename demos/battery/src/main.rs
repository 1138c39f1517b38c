//! Battery platform-channel demo.
//!
//! A UI end and a native end talk over three channels:
//! - `<domain>/battery`: the UI asks for the battery level
//! - `<domain>/charging`: the native end pushes charging status changes
//! - `<domain>/intent`: the UI opens a second native screen, whose result
//!   comes back through `onResult`
//!
//! Run both ends in one process:
//!   cargo run -p platform-channel-example-battery
//!
//! Or in two:
//!   cargo run -p platform-channel-example-battery -- --mode host --listen 127.0.0.1:8001
//!   cargo run -p platform-channel-example-battery -- --mode ui --connect ws://127.0.0.1:8001

mod config;
mod device;
mod native;
mod protocol;
mod screen;
mod server;
mod ui;

use clap::{Parser, ValueEnum};
use config::DemoConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Both ends in this process.
    Local,
    /// Native end, serving WebSocket connections.
    Host,
    /// UI end, connecting to a host.
    Ui,
}

#[derive(Debug, Parser)]
#[command(name = "battery-demo", about = "Platform channel battery demo")]
struct Cli {
    /// TOML configuration file.
    #[arg(long, env = "BATTERY_DEMO_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Mode::Local)]
    mode: Mode,

    /// Address the host listens on.
    #[arg(long, default_value = "127.0.0.1:8001")]
    listen: SocketAddr,

    /// Host URL the UI connects to.
    #[arg(long, default_value = "ws://127.0.0.1:8001")]
    connect: String,

    /// Channel name domain, overriding the config file.
    #[arg(long)]
    domain: Option<String>,
}

/// `RUST_LOG` plus info for the demo and the channel crates.
fn log_filter() -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("battery_demo=info".parse()?)
        .add_directive("platform_channel_core=info".parse()?)
        .add_directive("platform_channel_ws=info".parse()?)
        .add_directive("toast=info".parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(log_filter()?).init();

    let cli = Cli::parse();
    let mut config = DemoConfig::load(cli.config.as_deref())?;
    if let Some(domain) = cli.domain {
        config.bridge.domain = domain;
    }

    tracing::info!("Running {:?} on domain {}", cli.mode, config.bridge.domain);
    match cli.mode {
        Mode::Local => server::run_local(config).await,
        Mode::Host => server::run_host(cli.listen, config).await,
        Mode::Ui => server::run_ui(&cli.connect, config).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_and_overrides() {
        let cli = Cli::parse_from(["battery-demo"]);
        assert_eq!(cli.mode, Mode::Local);
        assert_eq!(cli.listen, "127.0.0.1:8001".parse::<SocketAddr>().unwrap());
        assert!(cli.domain.is_none());

        let cli = Cli::parse_from(["battery-demo", "--mode", "ui", "--domain", "example.org"]);
        assert_eq!(cli.mode, Mode::Ui);
        assert_eq!(cli.domain.as_deref(), Some("example.org"));
        assert!(Cli::try_parse_from(["battery-demo", "--mode", "desktop"]).is_err());
    }

    #[test]
    fn channel_crates_log_by_default() {
        let filter = log_filter().unwrap().to_string();
        for target in ["battery_demo", "platform_channel_core", "platform_channel_ws", "toast"] {
            assert!(filter.contains(&format!("{target}=info")), "{filter}");
        }
    }
}
