//! Client handles and shared runtime state.
//!
//! [`GPhoto`] is the entry point: it owns the runner, the command queue, the
//! per-camera config cache and the liveview session registry, all behind one
//! `Arc` so handles are cheap to clone and share across tasks. [`Camera`]
//! binds that shared state to one (optional) camera identifier; every camera
//! operation elsewhere in the crate builds on its `command`/`run_queued`
//! primitives.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::config::ConfigCache;
use crate::error::Result;
use crate::identifier::{self, CameraIdentifier};
use crate::liveview::{Liveview, LiveviewStore};
use crate::process::{ErrorPolicy, PolicyCell, Runner};
use crate::queue::{CommandQueue, DEFAULT_PAUSE};

/// Construction-time settings for a [`GPhoto`] client.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Executable name or path of the gphoto2 binary.
    pub binary: String,
    /// Settling pause between consecutive commands on one camera.
    pub pause: Duration,
    /// Whether per-camera command queueing starts enabled.
    pub queue_enabled: bool,
    /// Whether running liveview sessions are paused around queued commands.
    pub liveview_management: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            binary: "gphoto2".to_string(),
            pause: DEFAULT_PAUSE,
            queue_enabled: true,
            liveview_management: true,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) runner: Runner,
    pub(crate) queue: CommandQueue,
    pub(crate) cache: ConfigCache,
    pub(crate) liveview: LiveviewStore,
    pub(crate) http: reqwest::Client,
}

/// Handle to a gphoto2 installation.
///
/// Cloning is cheap and all clones share the same queue, cache, error policy
/// and liveview registry.
#[derive(Clone)]
pub struct GPhoto {
    shared: Arc<Shared>,
}

impl Default for GPhoto {
    fn default() -> Self {
        Self::new()
    }
}

impl GPhoto {
    /// Client with default [`Settings`].
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let policy = PolicyCell::default();
        Self {
            shared: Arc::new(Shared {
                runner: Runner::new(settings.binary, policy),
                queue: CommandQueue::new(
                    settings.pause,
                    settings.queue_enabled,
                    settings.liveview_management,
                ),
                cache: ConfigCache::default(),
                liveview: LiveviewStore::default(),
                http: reqwest::Client::new(),
            }),
        }
    }

    /// Handle for one camera, or for "whatever gphoto2 picks" with `None`.
    pub fn camera(&self, identifier: impl Into<Option<CameraIdentifier>>) -> Camera {
        Camera { shared: Arc::clone(&self.shared), identifier: identifier.into() }
    }

    /// Run a command line that addresses no particular camera. These share
    /// the `"auto"` queue partition with identifier-less camera commands, so
    /// a detection sweep never touches USB devices while such a command is
    /// mid-flight. No liveview pause: none of them touch a streaming camera.
    pub(crate) async fn run_global(&self, args: &str) -> Result<String> {
        let cmd = format!("{} {args}", self.shared.runner.binary());
        self.shared.queue.run("auto", || self.shared.runner.run(&cmd, None, true)).await
    }

    pub fn enable_queue(&self) {
        self.shared.queue.set_enabled(true);
    }

    pub fn disable_queue(&self) {
        self.shared.queue.set_enabled(false);
    }

    pub fn is_queue_enabled(&self) -> bool {
        self.shared.queue.is_enabled()
    }

    pub fn enable_liveview_management(&self) {
        self.shared.queue.set_liveview_management(true);
    }

    pub fn disable_liveview_management(&self) {
        self.shared.queue.set_liveview_management(false);
    }

    pub fn is_liveview_management_enabled(&self) -> bool {
        self.shared.queue.is_liveview_management_enabled()
    }

    pub fn set_pause_duration(&self, pause: Duration) {
        self.shared.queue.set_pause(pause);
    }

    pub fn pause_duration(&self) -> Duration {
        self.shared.queue.pause()
    }

    /// Register a policy consulted whenever a command fails. Replaces any
    /// previously registered policy.
    pub fn set_error_policy(&self, policy: Arc<dyn ErrorPolicy>) {
        *self.shared.runner.policy_cell().write().expect("policy lock poisoned") = Some(policy);
    }

    pub fn clear_error_policy(&self) {
        *self.shared.runner.policy_cell().write().expect("policy lock poisoned") = None;
    }
}

/// Handle to one camera (or the tool's default camera).
#[derive(Clone)]
pub struct Camera {
    shared: Arc<Shared>,
    identifier: Option<CameraIdentifier>,
}

impl Camera {
    pub fn identifier(&self) -> Option<&CameraIdentifier> {
        self.identifier.as_ref()
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    /// A client handle over the same shared state.
    pub(crate) fn client(&self) -> GPhoto {
        GPhoto { shared: Arc::clone(&self.shared) }
    }

    pub(crate) fn partition_key(&self) -> String {
        identifier::partition_key(self.identifier.as_ref())
    }

    /// Build a full command line: binary, identifier flags, then `args`,
    /// single-space joined with empty parts skipped.
    pub(crate) fn command(&self, args: &str) -> String {
        let flags = identifier::flags(self.identifier.as_ref());
        [self.shared.runner.binary(), flags.as_str(), args]
            .iter()
            .filter(|part| !part.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run a command line through this camera's queue partition, pausing a
    /// running liveview session around it.
    pub(crate) async fn run_queued(&self, cmd: &str, cwd: Option<&Path>) -> Result<String> {
        let key = self.partition_key();
        self.shared
            .queue
            .run_managed(&key, &self.shared.liveview, || self.shared.runner.run(cmd, cwd, true))
            .await
    }

    /// Create a liveview session for this camera, delivering raw MJPEG
    /// chunks to `sink`. Replaces (and stops) any session previously
    /// registered for the same camera. With `auto_start` the pipeline is
    /// started before returning.
    pub async fn liveview<F>(&self, sink: F, auto_start: bool) -> Result<Arc<Liveview>>
    where
        F: Fn(Bytes) + Send + Sync + 'static,
    {
        let sink: Arc<dyn Fn(Bytes) + Send + Sync> = Arc::new(sink);
        let session = Arc::new(Liveview::new(
            self.command(""),
            self.shared.runner.policy_cell(),
            self.shared.http.clone(),
            sink,
        ));
        self.shared.liveview.register(&self.partition_key(), Arc::clone(&session)).await?;
        if auto_start {
            session.start().await?;
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_includes_identifier_flags() {
        let client = GPhoto::new();
        let camera = client.camera(CameraIdentifier::for_port("usb:001,002"));
        assert_eq!(
            camera.command("--capture-image --force-overwrite"),
            "gphoto2 --port \"usb:001,002\" --capture-image --force-overwrite"
        );
    }

    #[test]
    fn command_without_identifier_has_no_flags() {
        let client = GPhoto::new();
        let camera = client.camera(None);
        assert_eq!(camera.command("--abilities"), "gphoto2 --abilities");
        assert_eq!(camera.partition_key(), "auto");
    }

    #[test]
    fn custom_binary_heads_the_command_line() {
        let client = GPhoto::with_settings(Settings {
            binary: "/opt/gphoto2/bin/gphoto2".into(),
            ..Settings::default()
        });
        let cmd = client.camera(None).command("--auto-detect");
        assert!(cmd.starts_with("/opt/gphoto2/bin/gphoto2 "));
    }

    #[tokio::test]
    async fn global_commands_queue_behind_the_auto_partition() {
        let dir = std::env::temp_dir()
            .join(format!("tether-global-queue-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let log = dir.join("order.log");

        // The comment marker swallows whatever flags get appended, so the
        // "binary" just records that it ran.
        let client = GPhoto::with_settings(Settings {
            binary: format!("printf 'detect\\n' >> {} #", log.display()),
            pause: Duration::ZERO,
            ..Settings::default()
        });

        let camera = client.camera(None);
        let slow = format!(
            "printf 'slow-start\\n' >> {log}; sleep 0.3; printf 'slow-end\\n' >> {log}",
            log = log.display()
        );
        let holder = tokio::spawn(async move { camera.run_queued(&slow, None).await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        // A detection sweep must wait for the in-flight command to finish.
        client.run_global("--auto-detect").await.unwrap();
        holder.await.unwrap().unwrap();

        let order = std::fs::read_to_string(&log).unwrap();
        assert_eq!(order.lines().collect::<Vec<_>>(), ["slow-start", "slow-end", "detect"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn queue_knobs_are_shared_across_clones() {
        let client = GPhoto::new();
        let other = client.clone();
        assert!(client.is_queue_enabled());
        other.disable_queue();
        assert!(!client.is_queue_enabled());

        client.set_pause_duration(Duration::from_millis(5));
        assert_eq!(other.pause_duration(), Duration::from_millis(5));

        other.disable_liveview_management();
        assert!(!client.is_liveview_management_enabled());
    }
}
