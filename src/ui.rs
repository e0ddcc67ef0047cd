use std::path::PathBuf;
use std::process::Command;

#[cfg(feature = "toolbar")]
use std::{fmt::Display, sync::Mutex};

#[cfg(feature = "toolbar")]
use colored::Colorize;
#[cfg(feature = "toolbar")]
use status_line::StatusLine;

use crate::settings::OptionsPage;

/// Shows notifications to the user.
pub trait Notifier: Send + Sync {
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()>;

    fn error(&self, title: &str, body: &str) -> anyhow::Result<()>;
}

/// Notifier that writes to stderr.
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        #[cfg(feature = "toolbar")]
        eprintln!("{} {}", title.bright_green().bold(), body);
        #[cfg(not(feature = "toolbar"))]
        eprintln!("{} {}", title, body);
        Ok(())
    }

    fn error(&self, title: &str, body: &str) -> anyhow::Result<()> {
        #[cfg(feature = "toolbar")]
        eprintln!("{} {}", title.bright_red().bold(), body);
        #[cfg(not(feature = "toolbar"))]
        eprintln!("{} {}", title, body);
        Ok(())
    }
}

/// Notifier that goes through `notify-send`, falling back to the console
/// when the tool is unavailable or reports failure.
pub struct DesktopNotifier {
    fallback: ConsoleNotifier,
}

impl DesktopNotifier {
    pub fn new() -> Self {
        Self {
            fallback: ConsoleNotifier,
        }
    }

    fn send(&self, urgency: &str, title: &str, body: &str) -> bool {
        Command::new("notify-send")
            .arg("--urgency")
            .arg(urgency)
            .arg("--app-name")
            .arg(env!("CARGO_PKG_NAME"))
            .arg(title)
            .arg(body)
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for DesktopNotifier {
    fn notify(&self, title: &str, body: &str) -> anyhow::Result<()> {
        if self.send("normal", title, body) {
            return Ok(());
        }
        self.fallback.notify(title, body)
    }

    fn error(&self, title: &str, body: &str) -> anyhow::Result<()> {
        if self.send("critical", title, body) {
            return Ok(());
        }
        self.fallback.error(title, body)
    }
}

/// The persistent spot showing the current network identity.
pub trait ToolbarControl: Send + Sync {
    /// Replaces the hover text.
    fn set_tooltip(&self, text: &str) -> anyhow::Result<()>;

    /// Sets the icon to the given country, or clears it back to neutral.
    fn set_icon(&self, country: Option<&str>) -> anyhow::Result<()>;
}

/// Builds the flag emoji for an ISO 3166 alpha-2 code.
///
/// Codes that do not map onto regional indicator symbols come back
/// unchanged.
#[cfg(feature = "toolbar")]
fn flag(code: &str) -> String {
    let mut symbols = String::new();
    for letter in code.chars() {
        let letter = letter.to_ascii_uppercase();
        if !letter.is_ascii_uppercase() {
            return code.to_string();
        }
        // 'A' maps to REGIONAL INDICATOR SYMBOL LETTER A (U+1F1E6).
        match char::from_u32(0x1F1E6 + (letter as u32 - 'A' as u32)) {
            Some(symbol) => symbols.push(symbol),
            None => return code.to_string(),
        }
    }
    symbols
}

#[cfg(feature = "toolbar")]
#[derive(Default)]
struct ToolbarState {
    tooltip: Mutex<String>, // Hover text, empty until the first cycle.
    icon: Mutex<Option<String>>, // ISO code shown as a flag.
}

#[cfg(feature = "toolbar")]
impl Display for ToolbarState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tooltip = self.tooltip.lock().unwrap();
        let icon = self.icon.lock().unwrap();

        if tooltip.is_empty() {
            return write!(f, "{}", "waiting for data".dimmed());
        }
        match icon.as_deref() {
            Some(code) => write!(f, "{} {}", flag(code), tooltip.bright_green()),
            None => write!(f, "{}", tooltip.bright_green()),
        }
    }
}

/// Toolbar rendered as a persistent terminal status line.
#[cfg(feature = "toolbar")]
pub struct StatusToolbar {
    line: StatusLine<ToolbarState>,
}

#[cfg(feature = "toolbar")]
impl StatusToolbar {
    pub fn new() -> Self {
        Self {
            line: StatusLine::new(ToolbarState::default()),
        }
    }
}

#[cfg(feature = "toolbar")]
impl Default for StatusToolbar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "toolbar")]
impl ToolbarControl for StatusToolbar {
    fn set_tooltip(&self, text: &str) -> anyhow::Result<()> {
        *self.line.tooltip.lock().unwrap() = text.to_string();
        Ok(())
    }

    fn set_icon(&self, country: Option<&str>) -> anyhow::Result<()> {
        *self.line.icon.lock().unwrap() = country.map(str::to_string);
        Ok(())
    }
}

/// Toolbar stand-in that only reports changes to the log.
pub struct QuietToolbar;

impl ToolbarControl for QuietToolbar {
    fn set_tooltip(&self, _text: &str) -> anyhow::Result<()> {
        #[cfg(feature = "log")]
        log::info!("toolbar tooltip: {}", _text);
        Ok(())
    }

    fn set_icon(&self, _country: Option<&str>) -> anyhow::Result<()> {
        #[cfg(feature = "log")]
        match _country {
            Some(code) => log::info!("toolbar icon: {}", code),
            None => log::info!("toolbar icon cleared"),
        }
        Ok(())
    }
}

/// Options surface for a terminal: points at the settings file and the
/// subcommand that edits it.
pub struct ConsoleOptions {
    settings_path: PathBuf,
}

impl ConsoleOptions {
    pub fn new(settings_path: PathBuf) -> Self {
        Self { settings_path }
    }
}

impl OptionsPage for ConsoleOptions {
    fn open(&self) -> anyhow::Result<()> {
        eprintln!(
            "Settings were repaired. Review {} or run `{} settings show`.",
            self.settings_path.display(),
            env!("CARGO_PKG_NAME"),
        );
        Ok(())
    }
}
