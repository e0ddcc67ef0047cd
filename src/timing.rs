use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::bus::TriggerBus;

/// Arms the refresh timer.
///
/// There is exactly one armed timer at a time; arming again replaces the
/// pending one instead of stacking a second firing.
pub trait TimerControl: Send + Sync {
    fn set(&self, interval: Duration);
}

/// Timer backed by a spawned sleep task that fires the timer trigger.
pub struct TokioTimer {
    bus: Arc<TriggerBus>,
    armed: Mutex<Option<JoinHandle<()>>>,
}

impl TokioTimer {
    pub fn new(bus: Arc<TriggerBus>) -> Self {
        Self {
            bus,
            armed: Mutex::new(None),
        }
    }
}

impl TimerControl for TokioTimer {
    fn set(&self, interval: Duration) {
        #[cfg(feature = "log")]
        log::debug!("arming the refresh timer for {:?}", interval);

        let bus = Arc::clone(&self.bus);
        let task = tokio::spawn(async move {
            tokio::time::sleep(interval).await;
            bus.timer_elapsed.fire(());
        });

        if let Some(previous) = self.armed.lock().unwrap().replace(task) {
            previous.abort();
        }
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        if let Some(armed) = self.armed.lock().unwrap().take() {
            armed.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counting_bus() -> (Arc<TriggerBus>, Arc<AtomicUsize>) {
        let bus = Arc::new(TriggerBus::new());
        let count = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&count);
        bus.timer_elapsed.subscribe(
            move |_| {
                let sink = Arc::clone(&sink);
                Box::pin(async move {
                    sink.fetch_add(1, Ordering::SeqCst);
                })
            },
            "count timer firings",
        );
        (bus, count)
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_timer_fires_the_trigger_once() {
        let (bus, count) = counting_bus();
        let timer = TokioTimer::new(bus);
        timer.set(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_the_pending_firing() {
        let (bus, count) = counting_bus();
        let timer = TokioTimer::new(bus);
        timer.set(Duration::from_secs(60));
        timer.set(Duration::from_secs(600));

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(500)).await;
        tokio::task::yield_now().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_timer_disarms_it() {
        let (bus, count) = counting_bus();
        let timer = TokioTimer::new(bus);
        timer.set(Duration::from_secs(60));
        drop(timer);

        tokio::time::sleep(Duration::from_secs(120)).await;
        tokio::task::yield_now().await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
