use std::{sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    bus::TriggerBus,
    ipdata::{IpCountryData, IpDataStore, LogEntry},
    providers::ProviderRegistry,
    settings::{self, LocalSettings, SettingsArea, SyncSettings},
    timing::TimerControl,
    ui::{Notifier, ToolbarControl},
};

const NOTIFY_TITLE: &str = "Data has changed!";
const ERROR_TITLE: &str = "Error!";

/// Everything one refresh run talks to.
pub struct Collaborators {
    pub sync_settings: Arc<dyn SettingsArea>,
    pub local_settings: Arc<dyn SettingsArea>,
    pub providers: Arc<ProviderRegistry>,
    pub store: Arc<dyn IpDataStore>,
    pub notifier: Arc<dyn Notifier>,
    pub toolbar: Arc<dyn ToolbarControl>,
    pub timer: Arc<dyn TimerControl>,
}

/// Re-arms the timer when the lookup scope exits, whichever way it exits.
struct RearmGuard {
    timer: Arc<dyn TimerControl>,
    interval: Duration,
}

impl Drop for RearmGuard {
    fn drop(&mut self) {
        self.timer.set(self.interval);
    }
}

/// Turns triggers into complete refresh cycles.
///
/// Each run is a fresh pass: load settings, call the configured services,
/// reconcile against the last persisted observation, then log, notify and
/// update the toolbar as the comparison dictates.
pub struct RefreshFlow {
    deps: Collaborators,
    run_lock: Mutex<()>, // Overlapping triggers run one after the other.
}

impl RefreshFlow {
    pub fn new(deps: Collaborators) -> Self {
        Self {
            deps,
            run_lock: Mutex::new(()),
        }
    }

    /// Executes one refresh cycle.
    ///
    /// Never fails from the caller's point of view: any error inside the
    /// cycle is logged and surfaced once as an error notification, and the
    /// run ends there. The next trigger starts over.
    pub async fn run(&self) {
        let _running = self.run_lock.lock().await;

        if let Err(error) = self.cycle().await {
            #[cfg(feature = "log")]
            log::error!("failed to refresh IP data: {:?}", error);

            if let Err(_nested) = self.deps.notifier.error(ERROR_TITLE, &error.to_string()) {
                #[cfg(feature = "log")]
                log::error!("error notification failed as well: {:?}", _nested);
            }
        }
    }

    async fn cycle(&self) -> anyhow::Result<()> {
        let options: SyncSettings = settings::load(&*self.deps.sync_settings).await?;

        let current = self.call_services(&options).await?;
        let previous = self.overwrite_last(&current).await?;

        self.append_log(&current, previous.as_ref()).await?;

        if options.notify {
            self.notify_change(&current, previous.as_ref())?;
        }

        let tooltip = match &current.country {
            Some(country) => format!("{} — {}", country, current.ip),
            None => current.ip.clone(),
        };
        self.deps.toolbar.set_tooltip(&tooltip)?;

        let icon = if options.display_flag {
            current.country.as_deref()
        } else {
            None
        };
        self.deps.toolbar.set_icon(icon)?;

        Ok(())
    }

    /// Runs the configured lookups and produces the new observation.
    ///
    /// The timer is re-armed with `max(refresh rate, longest cooldown)` no
    /// matter how the lookups end. A disabled country lookup contributes a
    /// zero cooldown and is skipped outright, not deferred.
    async fn call_services(&self, options: &SyncSettings) -> anyhow::Result<IpCountryData> {
        let ip_echo = self.deps.providers.ip_getter(options.ip_echo_service)?;
        let country_code = if options.look_up_country {
            Some(
                self.deps
                    .providers
                    .country_getter(options.country_code_service)?,
            )
        } else {
            None
        };

        let country_cooldown = country_code
            .as_ref()
            .map(|provider| provider.cooldown())
            .unwrap_or(Duration::from_secs(0));
        let longest_cooldown = ip_echo.cooldown().max(country_cooldown);

        let _rearm = RearmGuard {
            timer: Arc::clone(&self.deps.timer),
            interval: options.refresh_rate.interval().max(longest_cooldown),
        };

        let ip = ip_echo.fetch().await?;
        let (country, country_service) = match &country_code {
            Some(provider) => (
                Some(provider.fetch(&ip).await?),
                Some(provider.name().to_string()),
            ),
            None => (None, None),
        };

        Ok(IpCountryData {
            ip,
            ip_service: ip_echo.name().to_string(),
            country,
            country_service,
        })
    }

    async fn overwrite_last(
        &self,
        current: &IpCountryData,
    ) -> anyhow::Result<Option<IpCountryData>> {
        let previous = self.deps.store.load_last().await?;
        self.deps.store.save_as_last(current).await?;
        Ok(previous)
    }

    /// Appends to the log when something actually changed.
    ///
    /// The first observation always lands; afterwards only a differing ip
    /// or country does. With retention off the log is not even read.
    async fn append_log(
        &self,
        current: &IpCountryData,
        previous: Option<&IpCountryData>,
    ) -> anyhow::Result<()> {
        let settings: LocalSettings = settings::load(&*self.deps.local_settings).await?;
        let retention = match settings.log_lifetime.retention() {
            Some(retention) => retention,
            None => return Ok(()),
        };

        let log = self.deps.store.load_log().await?;
        let changed = match previous {
            Some(previous) => current.ip != previous.ip || current.country != previous.country,
            None => true,
        };

        if log.is_empty() || changed {
            self.deps
                .store
                .record(log, LogEntry::now(current.clone()), retention)
                .await?;
        }
        Ok(())
    }

    fn notify_change(
        &self,
        current: &IpCountryData,
        previous: Option<&IpCountryData>,
    ) -> anyhow::Result<()> {
        let mut message_lines = Vec::new();

        let ip_changed = previous
            .map(|previous| previous.ip != current.ip)
            .unwrap_or(true);
        if ip_changed {
            message_lines.push(format!("IP: {} ({})", current.ip, current.ip_service));
        }

        if let (Some(country), Some(service)) = (&current.country, &current.country_service) {
            let country_changed = previous
                .map(|previous| previous.country.as_ref() != Some(country))
                .unwrap_or(true);
            if country_changed {
                message_lines.push(format!("Country: {} ({})", country, service));
            }
        }

        if !message_lines.is_empty() {
            self.deps
                .notifier
                .notify(NOTIFY_TITLE, &message_lines.join("\n"))?;
        }
        Ok(())
    }
}

/// Points all five triggers at the shared flow. Call once at startup.
pub fn refresh_data_on_triggers(flow: Arc<RefreshFlow>, bus: &TriggerBus) {
    const DESCRIPTION: &str = "refresh IP and country data";

    let on_installed = Arc::clone(&flow);
    bus.installed.subscribe(
        move |_kind| {
            let flow = Arc::clone(&on_installed);
            Box::pin(async move { flow.run().await })
        },
        DESCRIPTION,
    );

    for trigger in [
        &bus.startup,
        &bus.refresh_ordered,
        &bus.essential_config_changed,
        &bus.timer_elapsed,
    ] {
        let flow = Arc::clone(&flow);
        trigger.subscribe(
            move |_| {
                let flow = Arc::clone(&flow);
                Box::pin(async move { flow.run().await })
            },
            DESCRIPTION,
        );
    }
}
