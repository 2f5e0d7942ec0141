//! Command-line argument parsing

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[clap(name = "portal-autologin", version, author)]
#[clap(about = "Keeps a captive portal session logged in")]
pub struct CliArgs {
    /// Path of the JSON settings file (defaults to the user config directory)
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for a daily rotated log file, in addition to stdout
    #[clap(long)]
    pub log_dir: Option<PathBuf>,

    /// Disable the platform network-change watcher and rely on polling only
    #[clap(long)]
    pub no_watcher: bool,

    /// Attempt a single login and exit
    #[clap(long, conflicts_with_all = ["set_password", "write_default_config"])]
    pub login_once: bool,

    /// Store the password for the configured username in the OS keyring and exit
    #[clap(long, conflicts_with = "write_default_config")]
    pub set_password: bool,

    /// Password used by --set-password
    #[clap(long, env = "PORTAL_AUTOLOGIN_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Write the default settings file if none exists and exit
    #[clap(long)]
    pub write_default_config: bool,
}
