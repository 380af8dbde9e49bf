use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "devlink")]
#[command(about = "Link a remote messaging client to this device", long_about = None)]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true, env = "DEVLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show a pairing code and wait for the remote client to scan it
    Pair(PairArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub struct PairArgs {
    /// Re-link an already known device instead of adding a new one
    #[arg(long, value_name = "DEVICE_ID")]
    pub renew: Option<String>,

    /// Do not show the privacy policy step
    #[arg(long)]
    pub skip_policy: bool,

    /// Accept the privacy policy without prompting
    #[arg(short, long)]
    pub yes: bool,
}
