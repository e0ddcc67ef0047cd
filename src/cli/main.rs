use std::{path::Path, sync::Arc, time::Duration};

use argument::{Action, Cli, SettingsAction};
use clap::Parser;
#[cfg(feature = "log")]
use ipwatch::initialize_logging;
use ipwatch::{
    bus::TriggerBus,
    control::{self, Command},
    ipdata::{FileIpDataStore, IpDataStore},
    providers::{GeoLiteProvider, ProviderRegistry},
    refresh::{refresh_data_on_triggers, Collaborators, RefreshFlow},
    settings::{
        self, fix_settings_on_update, CountryCodeService, FileArea, LocalSettings, SettingsArea,
        SyncSettings, LOCAL_SETTINGS_FILE, SYNC_SETTINGS_FILE,
    },
    timing::{TimerControl, TokioTimer},
    ui::{ConsoleNotifier, ConsoleOptions, DesktopNotifier, Notifier, ToolbarControl},
};
use serde_json::Value;
use tokio::runtime;

mod argument;

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(2);

const SYNC_FIELDS: [&str; 6] = [
    "ip_echo_service",
    "country_code_service",
    "look_up_country",
    "refresh_rate",
    "notify",
    "display_flag",
];

fn main() {
    if let Err(e) = run_application() {
        eprintln!("Error: {:?}", e);
    }
}

fn run_application() -> anyhow::Result<()> {
    let options = Cli::parse();

    #[cfg(feature = "log")]
    {
        let log_level = match options.log_level.as_str() {
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            "trace" => log::LevelFilter::Trace,
            _ => log::LevelFilter::Off,
        };
        initialize_logging(log_level)?;
    }

    let data_dir = match options.data_dir.clone() {
        Some(dir) => dir,
        None => ipwatch::data_dir()?,
    };
    let action = options.action.clone().unwrap_or(Action::Run { once: false });

    let runtime = runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        match action {
            Action::Run { once } => watch(&options, &data_dir, once).await,
            Action::Settings { action } => match action {
                SettingsAction::Show => show_settings(&data_dir).await,
                SettingsAction::Set { field, value } => {
                    set_setting(&data_dir, &field, &value).await
                }
                SettingsAction::Check => check_settings(&data_dir).await,
            },
            Action::Last => show_last(&data_dir).await,
            Action::Log { limit } => show_log(&data_dir, limit).await,
        }
    })
}

/// Wires the full application together and runs until interrupted.
async fn watch(options: &Cli, data_dir: &Path, once: bool) -> anyhow::Result<()> {
    let sync_area: Arc<dyn SettingsArea> =
        Arc::new(FileArea::new(data_dir.join(SYNC_SETTINGS_FILE)));
    let local_area: Arc<dyn SettingsArea> =
        Arc::new(FileArea::new(data_dir.join(LOCAL_SETTINGS_FILE)));
    let store: Arc<dyn IpDataStore> = Arc::new(FileIpDataStore::new(data_dir));

    let mut providers = ProviderRegistry::default();
    providers.register_country(
        CountryCodeService::GeoLite2,
        Arc::new(GeoLiteProvider::with_database_dir(data_dir)),
    );

    let notifier: Arc<dyn Notifier> = match options.notifier.as_str() {
        "desktop" => Arc::new(DesktopNotifier::new()),
        _ => Arc::new(ConsoleNotifier),
    };

    #[cfg(feature = "toolbar")]
    let toolbar: Arc<dyn ToolbarControl> = Arc::new(ipwatch::ui::StatusToolbar::new());
    #[cfg(not(feature = "toolbar"))]
    let toolbar: Arc<dyn ToolbarControl> = Arc::new(ipwatch::ui::QuietToolbar);

    let bus = Arc::new(TriggerBus::new());
    let timer: Arc<dyn TimerControl> = Arc::new(TokioTimer::new(Arc::clone(&bus)));

    let flow = Arc::new(RefreshFlow::new(Collaborators {
        sync_settings: Arc::clone(&sync_area),
        local_settings: Arc::clone(&local_area),
        providers: Arc::new(providers),
        store,
        notifier,
        toolbar,
        timer,
    }));

    if once {
        flow.run().await;
        return Ok(());
    }

    fix_settings_on_update(
        &bus.installed,
        Arc::clone(&sync_area),
        Arc::clone(&local_area),
        Arc::new(ConsoleOptions::new(data_dir.join(SYNC_SETTINGS_FILE))),
    );
    refresh_data_on_triggers(Arc::clone(&flow), &bus);

    // Settings repair finishes before the first refresh can observe them.
    if let Some(kind) = control::detect_install(data_dir).await? {
        #[cfg(feature = "log")]
        log::info!("detected an application {}", kind);
        for handle in bus.installed.fire(kind) {
            let _ = handle.await;
        }
    }
    bus.startup.fire(());

    let (sender, receiver) = kanal::unbounded_async();
    tokio::spawn(control::watch_console(tokio::io::stdin(), sender));
    tokio::spawn(control::watch_essential_config(
        Arc::clone(&sync_area),
        Arc::clone(&bus),
        CONFIG_POLL_INTERVAL,
    ));

    loop {
        tokio::select! {
            command = receiver.recv() => match command {
                Ok(Command::Refresh) => {
                    bus.refresh_ordered.fire(());
                }
                Ok(Command::Quit) | Err(_) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    #[cfg(feature = "log")]
    log::info!("shutting down");
    Ok(())
}

async fn show_settings(data_dir: &Path) -> anyhow::Result<()> {
    let sync_area = FileArea::new(data_dir.join(SYNC_SETTINGS_FILE));
    let local_area = FileArea::new(data_dir.join(LOCAL_SETTINGS_FILE));

    let sync: SyncSettings = settings::load(&sync_area).await?;
    let local: LocalSettings = settings::load(&local_area).await?;

    println!("{}", serde_json::to_string_pretty(&sync)?);
    println!("{}", serde_json::to_string_pretty(&local)?);
    Ok(())
}

async fn set_setting(data_dir: &Path, field: &str, value: &str) -> anyhow::Result<()> {
    let local = field == "log_lifetime";
    if !local && !SYNC_FIELDS.contains(&field) {
        anyhow::bail!("unknown settings field: {}", field);
    }

    let file = if local {
        LOCAL_SETTINGS_FILE
    } else {
        SYNC_SETTINGS_FILE
    };
    let area = FileArea::new(data_dir.join(file));

    let parsed = match value {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        other => Value::String(other.to_string()),
    };

    let mut fields = area.read().await?;
    fields.insert(field.to_string(), parsed.clone());
    area.write(&fields).await?;

    // Repair completes missing fields and reverts a rejected value.
    if local {
        settings::validate::<LocalSettings>(&area).await?;
    } else {
        settings::validate::<SyncSettings>(&area).await?;
    }

    let stored = area.read().await?;
    if stored.get(field) != Some(&parsed) {
        anyhow::bail!("{} does not accept {:?}", field, value);
    }
    println!("{} = {}", field, value);
    Ok(())
}

async fn check_settings(data_dir: &Path) -> anyhow::Result<()> {
    let sync_area = FileArea::new(data_dir.join(SYNC_SETTINGS_FILE));
    let local_area = FileArea::new(data_dir.join(LOCAL_SETTINGS_FILE));

    let sync_ok = settings::validate::<SyncSettings>(&sync_area).await?;
    let local_ok = settings::validate::<LocalSettings>(&local_area).await?;

    for (file, valid) in [(SYNC_SETTINGS_FILE, sync_ok), (LOCAL_SETTINGS_FILE, local_ok)] {
        if valid {
            println!("{}: valid", file);
        } else {
            println!("{}: repaired", file);
        }
    }
    Ok(())
}

async fn show_last(data_dir: &Path) -> anyhow::Result<()> {
    let store = FileIpDataStore::new(data_dir);
    match store.load_last().await? {
        Some(data) => println!("{}", serde_json::to_string_pretty(&data)?),
        None => println!("no data recorded yet"),
    }
    Ok(())
}

async fn show_log(data_dir: &Path, limit: usize) -> anyhow::Result<()> {
    let store = FileIpDataStore::new(data_dir);
    let log = store.load_log().await?;
    if log.is_empty() {
        println!("the log is empty");
        return Ok(());
    }

    let skipped = if limit > 0 {
        log.len().saturating_sub(limit)
    } else {
        0
    };
    for entry in &log[skipped..] {
        println!("{}", serde_json::to_string(entry)?);
    }
    Ok(())
}
