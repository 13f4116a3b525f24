//! Periodic trigger for sync cycles.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Owns at most one repeating task.
///
/// The first tick fires immediately. Starting again replaces the running
/// task; dropping the scheduler stops it.
#[derive(Debug, Default)]
pub struct AutoSyncScheduler {
    task: Option<JoinHandle<()>>,
}

impl AutoSyncScheduler {
    #[must_use]
    pub const fn new() -> Self {
        Self { task: None }
    }

    /// Run `tick` now and then every `period`. Must be called inside a
    /// tokio runtime; `period` must be non-zero.
    pub fn start<F, Fut>(&mut self, period: Duration, tick: F)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.stop() {
            tracing::debug!("Replacing running auto-sync task");
        }

        self.task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        }));
        tracing::info!("Auto-sync started, every {}s", period.as_secs());
    }

    /// Abort the running task. Returns whether one was running.
    pub fn stop(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for AutoSyncScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tick(counter: &Arc<AtomicUsize>) -> impl Fn() -> std::future::Ready<()> {
        let counter = Arc::clone(counter);
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_immediate_then_periodic() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AutoSyncScheduler::new();

        scheduler.start(Duration::from_secs(60), counting_tick(&ticks));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AutoSyncScheduler::new();

        scheduler.start(Duration::from_secs(60), counting_tick(&ticks));
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.start(Duration::from_secs(60), counting_tick(&ticks));

        // One timer: first start's tick, second start's tick, then t=61..541
        tokio::time::sleep(Duration::from_secs(570)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_drop_abort_the_task() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut scheduler = AutoSyncScheduler::new();

        scheduler.start(Duration::from_secs(60), counting_tick(&ticks));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.stop());
        assert!(!scheduler.is_running());
        assert!(!scheduler.stop());

        scheduler.start(Duration::from_secs(60), counting_tick(&ticks));
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(scheduler);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
    }
}
