pub mod bus;
pub mod control;
pub mod ipdata;
pub mod providers;
pub mod refresh;
pub mod settings;
pub mod timing;
pub mod ui;

mod utils;

pub use refresh::{refresh_data_on_triggers, Collaborators, RefreshFlow};
pub use utils::data_dir;

/// Initializes the logging system for the application.
///
/// This function configures the logging system with the specified verbosity level.
///
/// # Arguments
///
/// * `log_level`: The desired verbosity level for logging. Determines which log messages will be displayed.
///
/// # Returns
///
/// A result indicating the success or failure of the logging setup.
#[cfg(feature = "log")]
pub fn initialize_logging(log_level: log::LevelFilter) -> anyhow::Result<()> {
    stderrlog::new()
        .module(module_path!())
        .show_module_names(true)
        .verbosity(log_level)
        .init()?;
    Ok(())
}
