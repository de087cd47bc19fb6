use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iptv-relay")]
#[command(version = concat!("Ver:", env!("CARGO_PKG_VERSION")))]
#[command(about = "IPTV playlist relay with VPN-routed streaming and rolling health checks")]
pub struct Cli {
    /// Path to config.toml (defaults to the user config directory)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Write a default configuration file and exit
    #[arg(long = "init")]
    pub init: bool,

    /// Print the effective configuration and exit
    #[arg(short = 'p', long = "print")]
    pub print: bool,

    /// Validate the configuration and exit
    #[arg(long = "check")]
    pub check: bool,

    /// Refresh the playlist, run one health batch, print the report
    #[arg(long = "once")]
    pub once: bool,

    /// Print the stored health report
    #[arg(long = "report")]
    pub report: bool,

    /// Look up the current egress location
    #[arg(long = "vpn-status")]
    pub vpn_status: bool,

    /// Relay one channel's stream to stdout
    #[arg(long = "stream", value_name = "CHANNEL_ID")]
    pub stream: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
