use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::{LocalSettings, SettingsArea, SyncSettings, ValidatorSpec};
use crate::bus::{InstallKind, Trigger};

/// Surfaces the settings to the user when they need attention.
pub trait OptionsPage: Send + Sync {
    fn open(&self) -> anyhow::Result<()>;
}

/// Reads and sanitizes the settings record stored in `area`.
///
/// Never writes. Callers always get fully valid values no matter what is
/// on disk, so this is safe on every hot path.
pub async fn load<T>(area: &dyn SettingsArea) -> anyhow::Result<T>
where
    T: ValidatorSpec,
{
    let raw = area.read().await?;
    Ok(T::sanitize(&raw))
}

/// Checks the stored record and repairs storage when needed.
///
/// # Returns
///
/// `true` when storage already held exactly the sanitized record. `false`
/// when it differed; the sanitized fields have then been written back in a
/// single write, which also drops keys no field claims.
pub async fn validate<T>(area: &dyn SettingsArea) -> anyhow::Result<bool>
where
    T: ValidatorSpec + Serialize,
{
    let raw = area.read().await?;
    let repaired = record_fields(&T::sanitize(&raw))?;
    if raw == repaired {
        return Ok(true);
    }
    area.write(&repaired).await?;
    Ok(false)
}

fn record_fields<T: Serialize>(record: &T) -> anyhow::Result<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => anyhow::bail!("settings record serialized to {:?}, not an object", other),
    }
}

/// Registers the settings repair hook on the installed trigger.
///
/// Settings written by an older version may predate the current layout, so
/// after an install or a version update both storage areas are validated.
/// If either one had to be repaired the options surface is opened so the
/// user can review what the repair chose. Errors are logged and stay inside
/// the subscriber.
pub fn fix_settings_on_update(
    installed: &Trigger<InstallKind>,
    sync_area: Arc<dyn SettingsArea>,
    local_area: Arc<dyn SettingsArea>,
    options: Arc<dyn OptionsPage>,
) {
    installed.subscribe(
        move |kind| {
            let sync_area = Arc::clone(&sync_area);
            let local_area = Arc::clone(&local_area);
            let options = Arc::clone(&options);
            Box::pin(async move {
                let outcome =
                    check_stored_settings(kind, &*sync_area, &*local_area, &*options).await;
                if let Err(_error) = outcome {
                    #[cfg(feature = "log")]
                    log::error!("settings check after {} failed: {:?}", kind, _error);
                }
            })
        },
        "check and repair persisted settings",
    );
}

async fn check_stored_settings(
    kind: InstallKind,
    sync_area: &dyn SettingsArea,
    local_area: &dyn SettingsArea,
    options: &dyn OptionsPage,
) -> anyhow::Result<()> {
    let sync_valid = validate::<SyncSettings>(sync_area).await?;
    let local_valid = validate::<LocalSettings>(local_area).await?;

    #[cfg(feature = "log")]
    log::info!(
        "settings check after {}: sync {}, local {}",
        kind,
        if sync_valid { "valid" } else { "repaired" },
        if local_valid { "valid" } else { "repaired" },
    );

    if !sync_valid || !local_valid {
        options.open()?;
    }
    Ok(())
}
