//! Background sweep task shared by backends with an in-progress registry

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Handle to a periodic sweep task.
///
/// One pruner runs per backend instance between construction and `close`;
/// `stop` signals shutdown and joins the task.
#[derive(Debug)]
pub struct PrunerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PrunerHandle {
    /// Spawns a sweep running on the given interval until stopped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(sweep_interval: Duration, mut sweep: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut tick = interval(sweep_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    _ = tick.tick() => {
                        sweep().await;
                    }
                }
            }
        });
        Self { shutdown, task }
    }

    /// Signals shutdown and waits for the task to drain
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_pruner_sweeps_until_stopped() {
        let sweeps = Arc::new(AtomicUsize::new(0));
        let counter = sweeps.clone();

        let pruner = PrunerHandle::spawn(Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        pruner.stop().await;

        let after_stop = sweeps.load(Ordering::SeqCst);
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(sweeps.load(Ordering::SeqCst), after_stop);
    }
}
