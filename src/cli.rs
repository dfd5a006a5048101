use std::path::PathBuf;

use clap::Parser;

const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";

#[derive(Parser, Debug)]
#[command(name = "ups-imitator", version, about = "Modbus UPS imitator")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "UPS_IMITATOR_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    pub check: bool,
}
