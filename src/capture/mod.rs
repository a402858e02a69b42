//! Still capture and quick preview.

mod output;

pub use output::{SaveKind, SaveLocation};
pub(crate) use output::parse_capture_stdout;

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::Camera;
use crate::error::Result;
use crate::shell::quote;

/// What to do with images on the camera's memory card after download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keep {
    /// Keep the images on the memory card.
    On,
    /// Remove them after downloading (gphoto2's default).
    Off,
    /// Keep only the RAW images on the card, still downloading the JPEGs.
    RawOnly,
}

/// Optional delay before a capture command is issued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CaptureWait {
    /// Wait for a fixed duration.
    For(Duration),
    /// Wait until a point in time. Already-past instants don't wait.
    Until(DateTime<Utc>),
}

/// Options for capture commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOptions {
    /// Download the file after capturing it. Default `true`.
    pub download: bool,
    /// Where to download files. The command runs from this directory, and
    /// local [`SaveLocation`]s report it. Default: the process working
    /// directory.
    pub directory: Option<PathBuf>,
    /// Filename or filename pattern for downloaded files. Supports
    /// gphoto2's `%n` (shot number, `%03n` zero-padded), `%C` (native file
    /// extension) and strftime-style date tokens.
    pub filename: Option<String>,
    /// Starting number for the `%n` filename pattern.
    pub filenumber: Option<u32>,
    /// Memory-card retention policy. Only emitted when downloading.
    pub keep: Option<Keep>,
    /// Bulb-mode long exposure length. Not supported by all cameras or all
    /// gphoto2 versions.
    pub bulb: Option<Duration>,
    /// Number of frames to capture in one run. Default: unlimited.
    pub frames: Option<u32>,
    /// Time between frames of a multi-frame run.
    pub interval: Option<Duration>,
    /// Only download files not already flagged as downloaded. Depends on
    /// driver support.
    pub only_new: bool,
    /// Skip files that already exist in the local directory.
    pub skip_existing: bool,
    /// Delay before the capture command is issued.
    pub wait: Option<CaptureWait>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            download: true,
            directory: None,
            filename: None,
            filenumber: None,
            keep: None,
            bulb: None,
            frames: None,
            interval: None,
            only_new: false,
            skip_existing: false,
            wait: None,
        }
    }
}

impl CaptureOptions {
    /// Render the option flags (everything but the main capture flag).
    pub(crate) fn flags(&self) -> String {
        let mut flags: Vec<String> = Vec::new();

        if let Some(filename) = &self.filename {
            flags.push(format!("--filename={}", quote(filename)));
        }
        if let Some(filenumber) = self.filenumber {
            flags.push(format!("--filenumber={filenumber}"));
        }
        if self.download {
            match self.keep {
                Some(Keep::On) => flags.push("--keep".to_string()),
                Some(Keep::Off) => flags.push("--no-keep".to_string()),
                Some(Keep::RawOnly) => flags.push("--keep-raw".to_string()),
                None => {}
            }
        }
        if let Some(bulb) = self.bulb {
            flags.push(format!("--bulb={}", format_seconds(bulb)));
        }
        if let Some(frames) = self.frames {
            flags.push(format!("--frames={frames}"));
        }
        if let Some(interval) = self.interval {
            flags.push(format!("--interval={}", format_seconds(interval)));
        }
        if self.only_new {
            flags.push("--new".to_string());
        }
        if self.skip_existing {
            flags.push("--skip-existing".to_string());
        }

        flags.join(" ")
    }

    pub(crate) async fn apply_wait(&self) {
        match self.wait {
            Some(CaptureWait::For(duration)) => tokio::time::sleep(duration).await,
            Some(CaptureWait::Until(deadline)) => {
                let now = Utc::now();
                if let Ok(remaining) = (deadline - now).to_std() {
                    tokio::time::sleep(remaining).await;
                }
            }
            None => {}
        }
    }
}

/// Durations render as plain decimal seconds, e.g. `1.5`, not `1.500`.
fn format_seconds(duration: Duration) -> String {
    format!("{}", duration.as_secs_f64())
}

impl Camera {
    /// Capture a full-resolution image.
    ///
    /// Returns one [`SaveLocation`] per file the camera produced, whether
    /// downloaded locally or left on the camera's storage.
    pub async fn capture_image(&self, options: &CaptureOptions) -> Result<Vec<SaveLocation>> {
        let main_flag =
            if options.download { "--capture-image-and-download" } else { "--capture-image" };
        self.run_capture(main_flag, options).await
    }

    /// Capture a quick low-resolution preview frame (no mirror movement on
    /// most cameras). Preview files are always JPEG, so a `%C` token in the
    /// filename pattern is substituted with `jpg`.
    pub async fn capture_preview(&self, options: &CaptureOptions) -> Result<Vec<SaveLocation>> {
        let mut options = options.clone();
        if let Some(filename) = &options.filename {
            options.filename = Some(filename.replace("%C", "jpg"));
        }
        self.run_capture("--capture-preview", &options).await
    }

    async fn run_capture(
        &self,
        main_flag: &str,
        options: &CaptureOptions,
    ) -> Result<Vec<SaveLocation>> {
        let args = [main_flag, &options.flags(), "--force-overwrite"]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        let cmd = self.command(&args);

        options.apply_wait().await;

        let local_dir = match &options.directory {
            Some(dir) => dir.clone(),
            None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        };
        debug!(local_dir = %local_dir.display(), "running capture command");

        let out = self.run_queued(&cmd, options.directory.as_deref()).await?;
        Ok(parse_capture_stdout(&out, &local_dir))
    }
}
