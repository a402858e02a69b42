//! Async client for the `gphoto2` command-line tool.
//!
//! Wraps the CLI rather than libgphoto2: every operation builds a command
//! line, runs it through a per-camera FIFO queue, and parses the tool's
//! text output into typed values. The queue serializes commands per camera
//! port, inserts a settling pause between them, and pauses a running
//! liveview stream around commands that would otherwise fight the stream
//! for the camera.
//!
//! ```no_run
//! use tether::{CaptureOptions, GPhoto};
//!
//! # async fn demo() -> tether::Result<()> {
//! let client = GPhoto::new();
//!
//! let detected = client.auto_detect().await?;
//! let camera = client.camera(detected.into_iter().next());
//!
//! let iso = camera.config().values(&["iso"], true).await?;
//! println!("iso: {iso:?}");
//!
//! let saved = camera.capture_image(&CaptureOptions::default()).await?;
//! for location in saved {
//!     println!("captured {}", location.full.display());
//! }
//! # Ok(())
//! # }
//! ```

mod abilities;
mod autofocus;
mod capture;
mod client;
mod config;
mod detect;
mod error;
mod identifier;
mod liveview;
mod process;
mod queue;
mod shell;
mod table;

pub use abilities::{AbilityValue, CameraAbilities};
pub use capture::{CaptureOptions, CaptureWait, Keep, SaveKind, SaveLocation};
pub use client::{Camera, GPhoto, Settings};
pub use config::{ConfigApi, ConfigInfo, ConfigSnapshot, ConfigType, ConfigValue};
pub use detect::{PortInfo, SupportedCamera};
pub use error::{GPhotoError, Result};
pub use identifier::CameraIdentifier;
pub use liveview::Liveview;
pub use process::{ErrorPolicy, Outcome};
