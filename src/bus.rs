use std::{fmt::Display, future::Future, pin::Pin, sync::Mutex};

use tokio::task::JoinHandle;

/// Future type returned by trigger callbacks.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

type Callback<T> = Box<dyn Fn(T) -> BoxFuture + Send + Sync>;

/// Why the installed trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallKind {
    /// No earlier version marker was found.
    Install,
    /// The version marker belongs to a different version.
    Update,
}

impl Display for InstallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Update => write!(f, "update"),
        }
    }
}

struct Subscriber<T> {
    description: &'static str, // What the callback does, for diagnostics.
    callback: Callback<T>,
}

/// A named event source with any number of subscribed callbacks.
///
/// Firing hands every subscriber its own spawned task, so a slow or
/// panicking callback cannot hold up the rest. Subscribers registered later
/// only see later firings; there is no replay.
pub struct Trigger<T = ()> {
    name: &'static str,
    subscribers: Mutex<Vec<Subscriber<T>>>,
}

impl<T> Trigger<T>
where
    T: Clone + Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Registers a callback to run on every future firing.
    ///
    /// # Arguments
    ///
    /// * `callback`: Builds the future to run; receives the fire payload.
    /// * `description`: What the callback does, used in diagnostics only.
    pub fn subscribe<F>(&self, callback: F, description: &'static str)
    where
        F: Fn(T) -> BoxFuture + Send + Sync + 'static,
    {
        self.subscribers.lock().unwrap().push(Subscriber {
            description,
            callback: Box::new(callback),
        });
    }

    /// Fires the trigger, spawning one task per subscriber.
    ///
    /// # Returns
    ///
    /// The spawned task handles, in subscription order. Callers that need
    /// completion can await them; everyone else ignores the handles.
    pub fn fire(&self, payload: T) -> Vec<JoinHandle<()>> {
        let subscribers = self.subscribers.lock().unwrap();

        #[cfg(feature = "log")]
        log::debug!(
            "trigger {:?} fired, notifying {} subscriber(s)",
            self.name,
            subscribers.len()
        );

        subscribers
            .iter()
            .map(|subscriber| {
                #[cfg(feature = "log")]
                log::debug!("trigger {:?}: {}", self.name, subscriber.description);
                tokio::spawn((subscriber.callback)(payload.clone()))
            })
            .collect()
    }

    /// Lists the descriptions of the registered callbacks.
    pub fn subscriptions(&self) -> Vec<&'static str> {
        self.subscribers
            .lock()
            .unwrap()
            .iter()
            .map(|subscriber| subscriber.description)
            .collect()
    }
}

/// The five event sources the application reacts to.
pub struct TriggerBus {
    /// First run, or first run after a version change.
    pub installed: Trigger<InstallKind>,
    /// Process start.
    pub startup: Trigger,
    /// Somebody explicitly asked for fresh data.
    pub refresh_ordered: Trigger,
    /// A stored setting that affects what is fetched changed.
    pub essential_config_changed: Trigger,
    /// The armed refresh timer ran out.
    pub timer_elapsed: Trigger,
}

impl TriggerBus {
    pub fn new() -> Self {
        Self {
            installed: Trigger::new("installed"),
            startup: Trigger::new("startup"),
            refresh_ordered: Trigger::new("refresh ordered"),
            essential_config_changed: Trigger::new("essential config changed"),
            timer_elapsed: Trigger::new("timer elapsed"),
        }
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn every_subscriber_runs_on_fire() {
        let trigger: Trigger = Trigger::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let count = Arc::clone(&count);
            trigger.subscribe(
                move |_| {
                    let count = Arc::clone(&count);
                    Box::pin(async move {
                        count.fetch_add(1, Ordering::SeqCst);
                    })
                },
                "count firings",
            );
        }

        for handle in trigger.fire(()) {
            handle.await.unwrap();
        }
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn panicking_subscriber_does_not_stop_the_others() {
        let trigger: Trigger = Trigger::new("test");
        let count = Arc::new(AtomicUsize::new(0));

        trigger.subscribe(
            |_| {
                Box::pin(async {
                    panic!("subscriber blew up");
                })
            },
            "always panic",
        );
        let survivor = Arc::clone(&count);
        trigger.subscribe(
            move |_| {
                let survivor = Arc::clone(&survivor);
                Box::pin(async move {
                    survivor.fetch_add(1, Ordering::SeqCst);
                })
            },
            "count firings",
        );

        let mut results = Vec::new();
        for handle in trigger.fire(()) {
            results.push(handle.await);
        }
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn payload_reaches_every_subscriber() {
        let trigger: Trigger<InstallKind> = Trigger::new("installed");
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        trigger.subscribe(
            move |kind| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    *sink.lock().unwrap() = Some(kind);
                })
            },
            "record payload",
        );

        for handle in trigger.fire(InstallKind::Update) {
            handle.await.unwrap();
        }
        assert_eq!(*seen.lock().unwrap(), Some(InstallKind::Update));
    }

    #[tokio::test]
    async fn firing_without_subscribers_is_a_no_op() {
        let trigger: Trigger = Trigger::new("idle");
        assert!(trigger.fire(()).is_empty());
    }

    #[test]
    fn subscriptions_report_descriptions() {
        let trigger: Trigger = Trigger::new("test");
        assert!(trigger.subscriptions().is_empty());

        trigger.subscribe(|_| Box::pin(async {}), "do nothing");
        assert_eq!(trigger.subscriptions(), vec!["do nothing"]);
    }
}
