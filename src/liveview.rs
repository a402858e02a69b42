//! Liveview movie streaming.
//!
//! gphoto2's `--capture-movie --stdout` emits a raw MJPEG stream while it
//! holds the camera open. The controller pipes that stream through ffmpeg,
//! which re-serves it as an HTTP MJPEG endpoint on a locally allocated port,
//! and a fetch task forwards the HTTP body chunks to the caller's frame sink.
//!
//! A session owns its subprocess pipeline: `stop()` kills it and waits for
//! cleanup, and an unexpected pipeline death is classified through the same
//! error policy as ordinary commands. The command queue pauses a running
//! session around queued commands, since the pipeline and any other gphoto2
//! invocation cannot share the camera.

use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::io::AsyncReadExt;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::{GPhotoError, Result};
use crate::process::{parse_short_error, spawn_shell, Outcome, PolicyCell};

/// Local ports are tried in this range.
const PORT_RANGE_START: u16 = 50000;
const PORT_RANGE_END: u16 = 65535;
const MAX_PORT_ATTEMPTS: u32 = 64;

/// Delay before the first HTTP fetch attempt, giving ffmpeg time to bind.
const FETCH_WARMUP: Duration = Duration::from_millis(500);
const FETCH_RETRY: Duration = Duration::from_millis(250);

/// Pipeline stderr fragments that are expected when the stream is torn down
/// and never worth reporting.
const QUIET_EXIT_FRAGMENTS: &[&str] = &["connection reset", "broken pipe"];

type FrameSink = Arc<dyn Fn(Bytes) + Send + Sync>;

enum State {
    Idle,
    Starting(SessionTasks),
    Streaming(SessionTasks),
    Stopping,
}

struct SessionTasks {
    cancel: CancellationToken,
    monitor: JoinHandle<()>,
    fetch: JoinHandle<()>,
}

/// A controllable liveview session for one camera.
///
/// Obtained from [`Camera::liveview`](crate::Camera::liveview). Restartable:
/// `start()` on a running session replaces the pipeline.
pub struct Liveview {
    base_command: String,
    policy: PolicyCell,
    http: reqwest::Client,
    sink: FrameSink,
    state: Mutex<State>,
}

impl Liveview {
    pub(crate) fn new(
        base_command: String,
        policy: PolicyCell,
        http: reqwest::Client,
        sink: FrameSink,
    ) -> Self {
        Self { base_command, policy, http, sink, state: Mutex::new(State::Idle) }
    }

    /// Whether the session currently has a live pipeline.
    pub async fn is_running(&self) -> bool {
        matches!(*self.state.lock().await, State::Starting(_) | State::Streaming(_))
    }

    /// Start (or restart) the stream pipeline.
    ///
    /// Resolves once the first frame chunk has arrived at the sink. Fails if
    /// the pipeline dies before producing a frame, with the short stderr
    /// message when one can be extracted, or if `stop()` interrupts the
    /// startup wait.
    pub async fn start(&self) -> Result<()> {
        // Phase 1, under the lock: replace any existing pipeline and install
        // the Starting state. The lock is NOT held while waiting for the
        // first frame, so stop() and is_running() stay responsive during a
        // slow startup.
        let (cancel, mut exited_rx, first_frame_rx) = {
            let mut state = self.state.lock().await;
            stop_locked(&mut state).await;

            let port = allocate_port()?;
            let stream_id: String = rand::thread_rng()
                .sample_iter(&Alphanumeric)
                .take(10)
                .map(char::from)
                .collect();
            let url = format!("http://localhost:{port}/{stream_id}.jpg");
            let cmd = format!(
                "{} --capture-movie --stdout | ffmpeg -re -i pipe:0 -listen 1 -f mjpeg {url}",
                self.base_command
            );
            debug!(%url, "starting liveview pipeline");

            let child = spawn_shell(&cmd)?;
            let cancel = CancellationToken::new();
            let (first_frame_tx, first_frame_rx) = oneshot::channel();
            let (exited_tx, exited_rx) = watch::channel(None::<String>);

            let monitor = tokio::spawn(monitor_pipeline(
                child,
                cancel.clone(),
                self.policy.clone(),
                exited_tx,
            ));
            let fetch = tokio::spawn(fetch_frames(
                self.http.clone(),
                url,
                Arc::clone(&self.sink),
                cancel.clone(),
                first_frame_tx,
            ));

            *state = State::Starting(SessionTasks { cancel: cancel.clone(), monitor, fetch });
            (cancel, exited_rx, first_frame_rx)
        };

        // Phase 2, lock released: wait for the first frame, the pipeline's
        // death, or a concurrent stop()/start() cancelling this attempt.
        let started = tokio::select! {
            first = first_frame_rx => first.is_ok(),
            _ = exited_rx.changed() => false,
            _ = cancel.cancelled() => false,
        };

        // Phase 3, re-acquired: transition. When this attempt's token was
        // cancelled, whoever cancelled it already tore the tasks down.
        let mut state = self.state.lock().await;
        if cancel.is_cancelled() {
            return Err(GPhotoError::liveview_error("liveview stopped during startup"));
        }

        if started {
            return match std::mem::replace(&mut *state, State::Stopping) {
                State::Starting(tasks) => {
                    *state = State::Streaming(tasks);
                    Ok(())
                }
                other => {
                    *state = other;
                    Err(GPhotoError::liveview_error("liveview state changed during startup"))
                }
            };
        }

        let short = exited_rx.borrow().clone().unwrap_or_default();
        stop_locked(&mut state).await;
        let reason = if short.is_empty() {
            "stream process exited before the first frame".to_string()
        } else {
            short
        };
        Err(GPhotoError::liveview_error(reason))
    }

    /// Stop the stream pipeline and wait for its subprocesses to be reaped.
    /// A no-op when the session is idle.
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        stop_locked(&mut state).await;
        Ok(())
    }
}

async fn stop_locked(state: &mut State) {
    let previous = std::mem::replace(state, State::Stopping);
    if let State::Starting(tasks) | State::Streaming(tasks) = previous {
        tasks.cancel.cancel();
        let _ = tasks.monitor.await;
        tasks.fetch.abort();
        let _ = tasks.fetch.await;
    }
    *state = State::Idle;
}

/// Find a free local TCP port for ffmpeg's HTTP listener. Picks a random
/// starting point and walks forward, wrapping within the range.
fn allocate_port() -> Result<u16> {
    let span = (PORT_RANGE_END - PORT_RANGE_START) as u32;
    let offset = rand::thread_rng().gen_range(0..span);
    for attempt in 0..MAX_PORT_ATTEMPTS {
        let port = PORT_RANGE_START + ((offset + attempt) % span) as u16;
        if TcpListener::bind(("127.0.0.1", port)).is_ok() {
            return Ok(port);
        }
    }
    Err(GPhotoError::PortAllocation { attempts: MAX_PORT_ATTEMPTS })
}

/// Owns the pipeline child. Waits for either an intentional cancellation
/// (kill and reap) or an unexpected exit, in which case the stderr is
/// classified and reported through the registered error policy.
async fn monitor_pipeline(
    mut child: tokio::process::Child,
    cancel: CancellationToken,
    policy: PolicyCell,
    exited: watch::Sender<Option<String>>,
) {
    let stderr_pipe = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut pipe) = stderr_pipe {
            let _ = pipe.read_to_string(&mut buf).await;
        }
        buf
    });

    tokio::select! {
        status = child.wait() => {
            let stderr = stderr_task.await.unwrap_or_default();
            let short = parse_short_error(&stderr);
            let _ = exited.send(Some(short.clone()));
            debug!(?status, "liveview pipeline exited");
            report_unexpected_exit(&short, &stderr, &policy).await;
        }
        _ = cancel.cancelled() => {
            // The shell wrapper runs in its own process group; kill the
            // group so gphoto2 and ffmpeg die with it and release the
            // camera and the listen port.
            if let Some(pid) = child.id() {
                unsafe { libc::kill(-(pid as i32), libc::SIGKILL) };
            }
            let _ = child.start_kill();
            let _ = child.wait().await;
            stderr_task.abort();
        }
    }
}

async fn report_unexpected_exit(short: &str, stderr: &str, policy: &PolicyCell) {
    let lowered = if short.is_empty() { stderr.to_lowercase() } else { short.to_lowercase() };
    if QUIET_EXIT_FRAGMENTS.iter().any(|fragment| lowered.contains(fragment)) {
        debug!(short, "liveview pipeline closed by stream teardown");
        return;
    }

    let registered = policy.read().expect("policy lock poisoned").clone();
    if let Some(policy) = registered {
        if policy.classify(short, stderr).await == Outcome::Resolve {
            return;
        }
    }
    error!(short, "liveview pipeline exited unexpectedly");
}

/// Fetch the HTTP MJPEG stream and forward body chunks to the sink. Retries
/// the connection until ffmpeg's listener is up; the first delivered chunk
/// also signals session startup.
async fn fetch_frames(
    http: reqwest::Client,
    url: String,
    sink: FrameSink,
    cancel: CancellationToken,
    first_frame: oneshot::Sender<()>,
) {
    let work = async {
        tokio::time::sleep(FETCH_WARMUP).await;
        let mut first_frame = Some(first_frame);

        loop {
            let response = match http.get(&url).send().await {
                Ok(response) => response,
                Err(err) => {
                    debug!(%err, "liveview fetch not ready, retrying");
                    tokio::time::sleep(FETCH_RETRY).await;
                    continue;
                }
            };

            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(bytes) => {
                        if let Some(tx) = first_frame.take() {
                            let _ = tx.send(());
                        }
                        sink(bytes);
                    }
                    Err(err) => {
                        warn!(%err, "liveview stream read failed");
                        break;
                    }
                }
            }

            // ffmpeg serves one client per listen cycle; a closed body
            // means the pipeline is going away.
            debug!("liveview stream ended");
            return;
        }
    };

    tokio::select! {
        _ = work => {}
        _ = cancel.cancelled() => {}
    }
}

/// Per-client registry of liveview sessions, keyed by camera partition.
#[derive(Default)]
pub(crate) struct LiveviewStore {
    sessions: Mutex<std::collections::HashMap<String, Arc<Liveview>>>,
}

impl LiveviewStore {
    pub(crate) async fn get(&self, key: &str) -> Option<Arc<Liveview>> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Register a session for a partition, stopping any running predecessor.
    pub(crate) async fn register(&self, key: &str, session: Arc<Liveview>) -> Result<()> {
        let previous = self.sessions.lock().await.insert(key.to_string(), Arc::clone(&session));
        if let Some(previous) = previous {
            if previous.is_running().await {
                previous.stop().await?;
            }
        }
        Ok(())
    }
}
