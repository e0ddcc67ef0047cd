use clap::builder::styling::AnsiColor;
use clap::builder::{PossibleValue, Styles};
use clap::{Parser, Subcommand};

fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::BrightGreen.on_default())
        .placeholder(AnsiColor::Cyan.on_default())
}

/// Command-line interface definition for the IP watcher.
#[derive(Parser, Debug, Clone)]
#[command(
    about = "Watches the public IP address and country of this machine",
    styles=get_styles()
)]
pub struct Cli {
    /// Log level for application output.
    #[arg(
        long = "log",
        default_value = "off",
        value_parser([
            PossibleValue::new("debug"),
            PossibleValue::new("info"),
            PossibleValue::new("warn"),
            PossibleValue::new("error"),
            PossibleValue::new("trace"),
            PossibleValue::new("off"),
        ])
    )]
    pub log_level: String,

    /// Directory holding settings and recorded data. Defaults to the
    /// platform data directory.
    #[arg(long)]
    pub data_dir: Option<std::path::PathBuf>,

    /// Channel for change and error notifications.
    #[arg(
        long,
        default_value = "console",
        value_parser([
            PossibleValue::new("console"),
            PossibleValue::new("desktop"),
        ])
    )]
    pub notifier: String,

    #[command(subcommand)]
    pub action: Option<Action>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Action {
    /// Watch for address changes until interrupted. This is the default.
    Run {
        /// Refresh once and exit instead of staying resident.
        #[arg(long)]
        once: bool,
    },
    /// Inspect or change the stored settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Print the last recorded IP and country.
    Last,
    /// Print the recorded change log.
    Log {
        /// Number of newest entries to print. 0 prints everything.
        #[arg(long, default_value = "0")]
        limit: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    /// Print the stored settings after repair.
    Show,
    /// Change one settings field, e.g. `settings set refresh_rate 5m`.
    Set { field: String, value: String },
    /// Repair the stored settings files and report what was done.
    Check,
}
