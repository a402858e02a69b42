//! Camera discovery and global tool queries.
//!
//! Discovery commands (`--auto-detect`, `--list-ports`, `--list-cameras`)
//! address no particular camera; they queue under the shared `"auto"`
//! partition so they never overlap an in-flight identifier-less command.

use std::time::Duration;

use futures::stream::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::{Camera, GPhoto};
use crate::error::{GPhotoError, Result};
use crate::identifier::CameraIdentifier;
use crate::table::read_table;

/// How many cameras to query concurrently when annotating serials.
const SERIAL_CONCURRENCY: usize = 4;

/// Delay after a USB reset before re-detecting the camera, which typically
/// re-enumerates on a new port.
const RESET_SETTLE: Duration = Duration::from_millis(50);

/// A camera model the installed gphoto2 build has a driver for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedCamera {
    pub model: String,
    /// Driver qualifier printed in parentheses, e.g. `PTP mode`.
    pub flag: Option<String>,
}

/// One row of `--list-ports`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub path: String,
    pub description: String,
}

impl GPhoto {
    /// Detect currently connected cameras.
    pub async fn auto_detect(&self) -> Result<Vec<CameraIdentifier>> {
        let out = self.run_global("--auto-detect").await?;
        let rows = read_table(&out, Some(&["model", "port"]))?;
        let cameras = rows
            .into_iter()
            .map(|mut row| CameraIdentifier {
                model: row.remove("model"),
                port: row.remove("port"),
                serial: None,
            })
            .collect::<Vec<_>>();
        debug!(count = cameras.len(), "auto-detected cameras");
        Ok(cameras)
    }

    /// Detect connected cameras and annotate each with its serial number.
    ///
    /// Serials are queried per camera (a config read), a few cameras at a
    /// time. The commands still serialize per port through the queue.
    pub async fn auto_detect_with_serials(&self) -> Result<Vec<CameraIdentifier>> {
        let detected = self.auto_detect().await?;
        futures::stream::iter(detected)
            .map(|identifier| async move {
                let serial = self.camera(identifier.clone()).serial().await?;
                Ok::<_, GPhotoError>(CameraIdentifier { serial, ..identifier })
            })
            .buffered(SERIAL_CONCURRENCY)
            .try_collect()
            .await
    }

    /// Find the connected camera with the given serial number, if any.
    pub async fn camera_for_serial(&self, serial: &str) -> Result<Option<Camera>> {
        let detected = self.auto_detect_with_serials().await?;
        Ok(detected
            .into_iter()
            .find(|identifier| identifier.serial.as_deref() == Some(serial))
            .map(|identifier| self.camera(identifier)))
    }

    /// All camera models the installed gphoto2 build supports.
    pub async fn list_cameras(&self) -> Result<Vec<SupportedCamera>> {
        let out = self.run_global("--list-cameras").await?;
        Ok(parse_supported_cameras(&out))
    }

    /// Reset the USB connection of every detected camera, one at a time.
    /// For a targeted reset that returns a fresh handle, use
    /// [`Camera::reset`].
    pub async fn reset_all(&self) -> Result<()> {
        for identifier in self.auto_detect().await? {
            let camera = self.camera(identifier);
            let cmd = camera.command("--reset");
            camera.run_queued(&cmd, None).await?;
        }
        Ok(())
    }

    /// All port paths gphoto2 can address.
    pub async fn list_ports(&self) -> Result<Vec<PortInfo>> {
        let out = self.run_global("--list-ports").await?;
        let rows = read_table(&out, Some(&["path", "description"]))?;
        Ok(rows
            .into_iter()
            .map(|mut row| PortInfo {
                path: row.remove("path").unwrap_or_default(),
                description: row.remove("description").unwrap_or_default(),
            })
            .collect())
    }
}

impl Camera {
    /// The camera's serial number, read from its config.
    pub async fn serial(&self) -> Result<Option<String>> {
        let values = self.config().values(&["serialnumber"], false).await?;
        Ok(values.into_iter().flatten().next().map(|value| value.display_string()))
    }

    /// Reset the camera's USB connection.
    ///
    /// A reset usually re-enumerates the device on a different port, so the
    /// old identifier goes stale. Consumes this handle and returns a fresh
    /// one found by serial number after the reset.
    pub async fn reset(self) -> Result<Camera> {
        let serial = self
            .serial()
            .await?
            .ok_or_else(|| GPhotoError::parse_error("reset", "camera reports no serial number"))?;

        let cmd = self.command("--reset");
        self.run_queued(&cmd, None).await?;
        tokio::time::sleep(RESET_SETTLE).await;

        self.client()
            .camera_for_serial(&serial)
            .await?
            .ok_or(GPhotoError::CameraNotFound { serial })
    }
}

/// Parse `--list-cameras` output: after the `Supported cameras:` banner,
/// one quoted model per line with an optional parenthesized driver flag.
fn parse_supported_cameras(out: &str) -> Vec<SupportedCamera> {
    out.lines()
        .skip_while(|line| !line.trim_end().ends_with("cameras:"))
        .skip(1)
        .filter_map(|line| {
            let line = line.trim();
            let rest = line.strip_prefix('"')?;
            let (model, tail) = rest.split_once('"')?;
            let flag = tail
                .find('(')
                .and_then(|open| tail[open + 1..].find(')').map(|close| (open, close)))
                .map(|(open, close)| tail[open + 1..open + 1 + close].to_string());
            Some(SupportedCamera { model: model.to_string(), flag })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_cameras_are_parsed_with_flags() {
        let out = "\
Supported cameras:
\t\"Canon EOS 5D\" (PTP mode)
\t\"Nikon DSC D5200\"
\t\"AEG Snap 300\"
";
        let cameras = parse_supported_cameras(out);
        assert_eq!(cameras.len(), 3);
        assert_eq!(cameras[0].model, "Canon EOS 5D");
        assert_eq!(cameras[0].flag.as_deref(), Some("PTP mode"));
        assert_eq!(cameras[1].model, "Nikon DSC D5200");
        assert_eq!(cameras[1].flag, None);
    }

    #[test]
    fn banner_and_noise_lines_are_ignored() {
        let out = "Loading driver list...\nSupported cameras:\nnot a model line\n\t\"X\"\n";
        let cameras = parse_supported_cameras(out);
        assert_eq!(cameras.len(), 1);
        assert_eq!(cameras[0].model, "X");
    }

    #[test]
    fn missing_banner_yields_empty() {
        assert!(parse_supported_cameras("no banner here\n").is_empty());
    }
}
