//! Per-camera command serialization.
//!
//! Two concurrent gphoto2 invocations against the same port corrupt the
//! camera's protocol state, so every command runs through a per-partition
//! queue: at most one in-flight command per partition key, FIFO submission
//! order, and a configurable settling pause between completions. Commands
//! for different partitions run concurrently without mutual delay.
//!
//! The queue also coordinates with an active liveview stream: issuing
//! configuration or capture commands while the movie-stream subprocess holds
//! the camera open reliably fails, so the managed entry point stops a
//! running session around the command's queue slot and restarts it after.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::error::Result;
use crate::liveview::LiveviewStore;

/// Default settling pause between consecutive commands in one partition.
pub(crate) const DEFAULT_PAUSE: Duration = Duration::from_millis(100);

#[derive(Default)]
struct Partition {
    last_finished: Option<Instant>,
}

/// Serializes command execution per camera partition key.
pub(crate) struct CommandQueue {
    enabled: AtomicBool,
    liveview_management: AtomicBool,
    pause_millis: AtomicU64,
    // tokio's Mutex hands the lock out in FIFO order, which is exactly the
    // submission-order guarantee the queue needs.
    partitions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<Partition>>>>,
}

impl CommandQueue {
    pub(crate) fn new(pause: Duration, enabled: bool, liveview_management: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            liveview_management: AtomicBool::new(liveview_management),
            pause_millis: AtomicU64::new(pause.as_millis() as u64),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_liveview_management(&self, enabled: bool) {
        self.liveview_management.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn is_liveview_management_enabled(&self) -> bool {
        self.liveview_management.load(Ordering::Relaxed)
    }

    pub(crate) fn set_pause(&self, pause: Duration) {
        self.pause_millis.store(pause.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_millis.load(Ordering::Relaxed))
    }

    fn partition(&self, key: &str) -> Arc<tokio::sync::Mutex<Partition>> {
        let mut partitions = self.partitions.lock().expect("partition map lock poisoned");
        Arc::clone(partitions.entry(key.to_string()).or_default())
    }

    /// Run a task in its partition's queue slot.
    ///
    /// When queuing is globally disabled the task runs immediately. A task's
    /// error propagates to its caller and does not poison the partition;
    /// subsequent queued tasks still run.
    pub(crate) async fn run<T, F, Fut>(&self, key: &str, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_enabled() {
            return task().await;
        }

        let partition = self.partition(key);
        let mut state = partition.lock().await;

        if let Some(last) = state.last_finished {
            let pause = self.pause();
            let since = last.elapsed();
            if since < pause {
                trace!(partition = key, "pausing before next queued command");
                tokio::time::sleep(pause - since).await;
            }
        }

        let result = task().await;
        state.last_finished = Some(Instant::now());
        result
    }

    /// Stop a running liveview session for this partition, run the task,
    /// then restart the session. Used directly by operations that must not
    /// race the open video stream but manage their own queueing.
    ///
    /// A task error propagates without restarting the session, mirroring the
    /// plain-queue failure semantics.
    pub(crate) async fn with_liveview_paused<T, F, Fut>(
        &self,
        key: &str,
        store: &LiveviewStore,
        task: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_liveview_management_enabled() {
            return task().await;
        }

        let session = store.get(key).await;
        let was_running = match &session {
            Some(session) => session.is_running().await,
            None => false,
        };

        if was_running {
            if let Some(session) = &session {
                session.stop().await?;
            }
        }

        let result = task().await?;

        if was_running {
            if let Some(session) = &session {
                session.start().await?;
            }
        }

        Ok(result)
    }

    /// Queue a task for its partition, pausing any running liveview session
    /// around the queue slot. The standard entry point for camera commands.
    pub(crate) async fn run_managed<T, F, Fut>(
        &self,
        key: &str,
        store: &LiveviewStore,
        task: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.is_liveview_management_enabled() {
            return self.run(key, task).await;
        }
        if !self.is_enabled() {
            return task().await;
        }
        self.run(key, || self.with_liveview_paused(key, store, task)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GPhotoError;
    use std::sync::Mutex as StdMutex;

    fn test_queue(pause_ms: u64) -> CommandQueue {
        CommandQueue::new(Duration::from_millis(pause_ms), true, true)
    }

    #[tokio::test(start_paused = true)]
    async fn same_partition_is_serialized_with_pause() {
        let queue = Arc::new(test_queue(100));
        let log: Arc<StdMutex<Vec<(&'static str, Instant)>>> = Arc::default();

        let q1 = Arc::clone(&queue);
        let l1 = Arc::clone(&log);
        let first = tokio::spawn(async move {
            q1.run("usb:001,002", || async {
                l1.lock().unwrap().push(("start-a", Instant::now()));
                tokio::time::sleep(Duration::from_millis(50)).await;
                l1.lock().unwrap().push(("end-a", Instant::now()));
                Ok(())
            })
            .await
        });

        // Give the first task its queue slot before enqueuing the second.
        tokio::time::sleep(Duration::from_millis(1)).await;

        let q2 = Arc::clone(&queue);
        let l2 = Arc::clone(&log);
        let second = tokio::spawn(async move {
            q2.run("usb:001,002", || async {
                l2.lock().unwrap().push(("start-b", Instant::now()));
                Ok(())
            })
            .await
        });

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let log = log.lock().unwrap();
        let end_a = log.iter().find(|(n, _)| *n == "end-a").unwrap().1;
        let start_b = log.iter().find(|(n, _)| *n == "start-b").unwrap().1;
        assert!(start_b >= end_a + Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn different_partitions_overlap() {
        let queue = Arc::new(test_queue(100));
        let log: Arc<StdMutex<Vec<&'static str>>> = Arc::default();

        let q1 = Arc::clone(&queue);
        let l1 = Arc::clone(&log);
        let a = tokio::spawn(async move {
            q1.run("usb:001,002", || async {
                l1.lock().unwrap().push("start-a");
                tokio::time::sleep(Duration::from_millis(50)).await;
                l1.lock().unwrap().push("end-a");
                Ok(())
            })
            .await
        });

        let q2 = Arc::clone(&queue);
        let l2 = Arc::clone(&log);
        let b = tokio::spawn(async move {
            q2.run("usb:009,001", || async {
                l2.lock().unwrap().push("start-b");
                tokio::time::sleep(Duration::from_millis(50)).await;
                l2.lock().unwrap().push("end-b");
                Ok(())
            })
            .await
        });

        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        // Both tasks started before either finished.
        let log = log.lock().unwrap();
        let first_end = log.iter().position(|n| n.starts_with("end")).unwrap();
        assert!(log[..first_end].contains(&"start-a"));
        assert!(log[..first_end].contains(&"start-b"));
    }

    #[tokio::test]
    async fn task_error_does_not_poison_partition() {
        let queue = test_queue(0);

        let failed: Result<()> = queue
            .run("auto", || async { Err(GPhotoError::command_failed("boom", "boom")) })
            .await;
        assert!(failed.is_err());

        let ok = queue.run("auto", || async { Ok(42) }).await.unwrap();
        assert_eq!(ok, 42);
    }

    #[tokio::test]
    async fn disabled_queue_runs_immediately() {
        let queue = test_queue(10_000);
        queue.set_enabled(false);
        // With a 10s pause this would stall if the queue were consulted.
        let start = Instant::now();
        queue.run("auto", || async { Ok(()) }).await.unwrap();
        queue.run("auto", || async { Ok(()) }).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn pause_duration_is_adjustable() {
        let queue = test_queue(100);
        queue.set_pause(Duration::from_millis(5));
        assert_eq!(queue.pause(), Duration::from_millis(5));
    }
}
