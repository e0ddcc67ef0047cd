use std::{path::Path, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::{
    bus::{InstallKind, TriggerBus},
    settings::{self, EssentialConfig, SettingsArea, SyncSettings},
    utils,
};

const META_FILE: &str = "meta.json";

/// An order typed on the interactive console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Refresh,
    Quit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_lowercase().as_str() {
        "r" | "refresh" => Some(Command::Refresh),
        "q" | "quit" | "exit" => Some(Command::Quit),
        _ => None,
    }
}

/// Forwards console commands into the channel until the input closes.
pub async fn watch_console<R>(input: R, sender: kanal::AsyncSender<Command>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        match parse_command(&line) {
            Some(command) => {
                if sender.send(command).await.is_err() {
                    break;
                }
            }
            None if line.trim().is_empty() => {}
            None => {
                #[cfg(feature = "log")]
                log::warn!("unknown command: {:?}", line.trim());
            }
        }
    }
}

/// Polls the stored settings and fires the config-changed trigger whenever
/// a lookup-relevant field takes a new value.
///
/// The first poll only establishes the baseline. Cosmetic fields such as
/// the notification toggle never cause a firing.
pub async fn watch_essential_config(
    area: Arc<dyn SettingsArea>,
    bus: Arc<TriggerBus>,
    poll_every: Duration,
) {
    let mut interval = tokio::time::interval(poll_every);
    let mut known: Option<EssentialConfig> = None;

    loop {
        interval.tick().await;

        let options: SyncSettings = match settings::load(&*area).await {
            Ok(options) => options,
            Err(_error) => {
                #[cfg(feature = "log")]
                log::warn!("could not read settings while watching them: {:?}", _error);
                continue;
            }
        };

        let essentials = options.essentials();
        if let Some(previous) = known {
            if previous != essentials {
                #[cfg(feature = "log")]
                log::info!("lookup configuration changed, ordering a refresh");
                bus.essential_config_changed.fire(());
            }
        }
        known = Some(essentials);
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    last_version: Option<String>,
}

/// Compares the persisted version marker against the running build and
/// stamps the current version for the next start.
///
/// # Returns
///
/// The kind of installation this start represents, or `None` when the
/// version has not changed.
pub async fn detect_install(data_dir: &Path) -> anyhow::Result<Option<InstallKind>> {
    let path = data_dir.join(META_FILE);
    let meta: Meta = utils::read_json_or_default(&path).await?;
    let current = env!("CARGO_PKG_VERSION");

    let kind = match meta.last_version.as_deref() {
        None => Some(InstallKind::Install),
        Some(version) if version != current => Some(InstallKind::Update),
        Some(_) => None,
    };

    if kind.is_some() {
        let stamped = Meta {
            last_version: Some(current.to_string()),
        };
        utils::write_json(&path, &stamped).await?;
    }
    Ok(kind)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    };

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Map, Value};

    use super::*;

    #[test]
    fn console_commands_parse_loosely() {
        assert_eq!(parse_command("r"), Some(Command::Refresh));
        assert_eq!(parse_command(" REFRESH "), Some(Command::Refresh));
        assert_eq!(parse_command("q"), Some(Command::Quit));
        assert_eq!(parse_command("quit"), Some(Command::Quit));
        assert_eq!(parse_command("exit"), Some(Command::Quit));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("bogus"), None);
    }

    #[tokio::test]
    async fn console_watcher_forwards_commands_until_the_input_ends() {
        let (sender, receiver) = kanal::unbounded_async();
        watch_console(&b"refresh\nnonsense\n\nr\nq\n"[..], sender).await;

        assert_eq!(receiver.recv().await.unwrap(), Command::Refresh);
        assert_eq!(receiver.recv().await.unwrap(), Command::Refresh);
        assert_eq!(receiver.recv().await.unwrap(), Command::Quit);
        assert!(receiver.recv().await.is_err());
    }

    #[tokio::test]
    async fn console_watcher_accepts_the_process_stdin_handle() {
        let (sender, receiver) = kanal::unbounded_async();
        let watcher = watch_console(tokio::io::stdin(), sender);

        // Never polled: reading would block on the test runner's terminal.
        drop(watcher);
        drop(receiver);
    }

    struct MemoryArea(Mutex<Map<String, Value>>);

    impl MemoryArea {
        fn empty() -> Self {
            Self(Mutex::new(Map::new()))
        }

        fn set(&self, key: &str, value: Value) {
            self.0.lock().unwrap().insert(key.to_string(), value);
        }
    }

    #[async_trait]
    impl SettingsArea for MemoryArea {
        async fn read(&self) -> anyhow::Result<Map<String, Value>> {
            Ok(self.0.lock().unwrap().clone())
        }

        async fn write(&self, fields: &Map<String, Value>) -> anyhow::Result<()> {
            *self.0.lock().unwrap() = fields.clone();
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn config_watcher_fires_only_on_essential_changes() {
        let area = Arc::new(MemoryArea::empty());
        let bus = Arc::new(TriggerBus::new());
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        bus.essential_config_changed.subscribe(
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Box::pin(async {})
            },
            "count firings",
        );

        let watcher = tokio::spawn(watch_essential_config(
            Arc::clone(&area) as Arc<dyn SettingsArea>,
            Arc::clone(&bus),
            Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        area.set("notify", json!(false));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        area.set("ip_echo_service", json!("opendns"));
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        watcher.abort();
    }

    #[tokio::test]
    async fn fresh_data_dir_counts_as_install() {
        let dir = tempfile::tempdir().unwrap();

        let first = detect_install(dir.path()).await.unwrap();
        assert_eq!(first, Some(InstallKind::Install));

        let second = detect_install(dir.path()).await.unwrap();
        assert_eq!(second, None);
    }

    #[tokio::test]
    async fn version_bump_counts_as_update() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(META_FILE);
        tokio::fs::write(&path, r#"{"last_version":"0.0.1"}"#)
            .await
            .unwrap();

        let detected = detect_install(dir.path()).await.unwrap();
        assert_eq!(detected, Some(InstallKind::Update));

        let stamped = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(stamped.contains(env!("CARGO_PKG_VERSION")));
    }
}
