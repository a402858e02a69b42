//! Camera identification and command-line flag rendering.

use serde::{Deserialize, Serialize};

use crate::shell::quote;

/// Identifies zero, one, or a specific connected camera.
///
/// Per the gphoto2 documentation: if you specify `model`, you must also
/// specify `port`, otherwise the `model` option is silently ignored. That
/// rule is preserved here faithfully; [`CameraIdentifier::flags`] emits no
/// `--camera` flag when `port` is absent.
///
/// An identifier is an immutable value object. Operations that can change a
/// camera's port (USB reset) return a *new* identifier instead of mutating
/// the old one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraIdentifier {
    /// The `--port` value of the camera (e.g. `usb:001,004`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// The `--camera` model name. Ignored by gphoto2 unless `port` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// The camera's serial number. A derived, read-only annotation populated
    /// by [`GPhoto::auto_detect_with_serials`](crate::GPhoto::auto_detect_with_serials);
    /// never rendered as a flag and never used for queue partitioning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl CameraIdentifier {
    /// Identifier for a specific port.
    pub fn for_port(port: impl Into<String>) -> Self {
        Self { port: Some(port.into()), model: None, serial: None }
    }

    /// Render this identifier as gphoto2 command-line flags.
    ///
    /// Emits `--port <quoted>` then `--camera <quoted>`, space-joined and
    /// trimmed, omitting absent fields.
    pub fn flags(&self) -> String {
        let mut out = String::new();
        if let Some(port) = &self.port {
            out.push_str(" --port ");
            out.push_str(&quote(port));
        }
        // gphoto2 silently ignores --camera without --port; don't emit it.
        if self.port.is_some() {
            if let Some(model) = &self.model {
                out.push_str(" --camera ");
                out.push_str(&quote(model));
            }
        }
        out.trim().to_string()
    }

    /// Derive the cache/queue partition key for this identifier.
    ///
    /// `port` if present, else `model`, else the singleton `"auto"` key. Two
    /// identifiers with different serials but the same port intentionally
    /// collide in the same partition.
    pub fn partition_key(&self) -> String {
        self.port
            .clone()
            .or_else(|| self.model.clone())
            .unwrap_or_else(|| "auto".to_string())
    }
}

/// Flags for an optional identifier; the empty string for `None`.
pub(crate) fn flags(identifier: Option<&CameraIdentifier>) -> String {
    identifier.map(CameraIdentifier::flags).unwrap_or_default()
}

/// Partition key for an optional identifier; `"auto"` for `None`.
pub(crate) fn partition_key(identifier: Option<&CameraIdentifier>) -> String {
    identifier.map(CameraIdentifier::partition_key).unwrap_or_else(|| "auto".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_without_port_emits_nothing() {
        // gphoto2 ignores --camera without --port; the flag builder must not
        // pretend otherwise.
        let id = CameraIdentifier { model: Some("Nikon D5200".into()), ..Default::default() };
        assert!(!id.flags().contains("--camera"));
        assert_eq!(id.flags(), "");
    }

    #[test]
    fn port_then_camera_order() {
        let id = CameraIdentifier {
            port: Some("usb:001,002".into()),
            model: Some("Nikon D5200".into()),
            serial: None,
        };
        assert_eq!(id.flags(), "--port \"usb:001,002\" --camera \"Nikon D5200\"");
    }

    #[test]
    fn port_only() {
        assert_eq!(CameraIdentifier::for_port("usb:001,002").flags(), "--port \"usb:001,002\"");
    }

    #[test]
    fn absent_identifier_renders_empty() {
        assert_eq!(flags(None), "");
    }

    #[test]
    fn partition_key_prefers_port_then_model_then_auto() {
        let both = CameraIdentifier {
            port: Some("usb:001,002".into()),
            model: Some("X".into()),
            serial: Some("123".into()),
        };
        assert_eq!(both.partition_key(), "usb:001,002");

        let model_only = CameraIdentifier { model: Some("X".into()), ..Default::default() };
        assert_eq!(model_only.partition_key(), "X");

        assert_eq!(CameraIdentifier::default().partition_key(), "auto");
        assert_eq!(partition_key(None), "auto");
    }

    #[test]
    fn serial_does_not_affect_partition() {
        let a = CameraIdentifier::for_port("usb:001,002");
        let b = CameraIdentifier { serial: Some("999".into()), ..a.clone() };
        assert_eq!(a.partition_key(), b.partition_key());
    }
}
