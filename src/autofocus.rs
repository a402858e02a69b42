//! Autofocus triggering.
//!
//! Driving the focus motor is a config write (`autofocusdrive`), but it only
//! works while the camera's focus mode is an automatic one. When asked to
//! override manual mode, the focus-mode keys are temporarily switched to the
//! best available AF choice and restored afterwards.

use std::collections::BTreeMap;

use tracing::debug;

use crate::client::Camera;
use crate::config::ConfigValue;
use crate::error::Result;

impl Camera {
    /// Trigger a single autofocus drive.
    ///
    /// With `override_manual`, focus-mode keys currently set to a manual mode
    /// are switched to an automatic choice for the duration of the drive and
    /// restored before returning, even when the drive itself fails. A failed
    /// focus hunt ("out of focus") is an expected state and resolves as
    /// success.
    ///
    /// A running liveview session is paused around the whole sequence.
    pub async fn autofocus(&self, override_manual: bool) -> Result<()> {
        let partition = self.partition_key();
        let shared = self.shared();
        shared
            .queue
            .with_liveview_paused(&partition, &shared.liveview, || {
                self.drive_autofocus(override_manual)
            })
            .await
    }

    async fn drive_autofocus(&self, override_manual: bool) -> Result<()> {
        let config = self.config();
        let mut originals: BTreeMap<String, ConfigValue> = BTreeMap::new();

        if override_manual {
            let focus_keys = config.resolve_keys(&["focusmode", "focusmode2"]).await?;
            let refs: Vec<&str> = focus_keys.iter().map(String::as_str).collect();
            let snapshot = config.get(&refs, true).await?;

            let mut overrides: BTreeMap<String, ConfigValue> = BTreeMap::new();
            for (key, value) in &snapshot.values {
                if !value.display_string().to_lowercase().starts_with('m') {
                    continue;
                }
                let choices = snapshot.info.get(key).and_then(|info| info.choices.as_deref());
                if let Some(best) = choices.and_then(best_af_mode) {
                    debug!(key = %key, mode = %best, "overriding manual focus mode");
                    originals.insert(key.clone(), value.clone());
                    overrides.insert(key.clone(), ConfigValue::from(best));
                }
            }
            if !overrides.is_empty() {
                config.set(&overrides, true).await?;
            }
        }

        // The drive key must be resolved to its full path; the bare name
        // would fail the key-list check inside `set` and silently no-op.
        let drive_key = config
            .resolve_keys(&["autofocusdrive"])
            .await?
            .into_iter()
            .next()
            .unwrap_or_else(|| "autofocusdrive".to_string());
        let drive: BTreeMap<String, ConfigValue> =
            BTreeMap::from([(drive_key, ConfigValue::Toggle(true))]);
        let drive_result = config.set(&drive, true).await;

        // Restore the original focus modes whether or not the drive worked.
        if !originals.is_empty() {
            config.set(&originals, true).await?;
        }

        drive_result
    }
}

/// Pick the most single-shot-like AF choice: `AF-S` first, then any `AF`
/// variant, then anything starting with `A`.
fn best_af_mode(choices: &[String]) -> Option<&str> {
    for prefix in ["af-s", "af", "a"] {
        if let Some(choice) = choices.iter().find(|c| c.to_lowercase().starts_with(prefix)) {
            return Some(choice.as_str());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn best_af_mode_prefers_single_servo() {
        let choices: Vec<String> =
            ["Manual", "AF-C", "AF-S", "AF-A"].iter().map(|s| s.to_string()).collect();
        assert_eq!(best_af_mode(&choices), Some("AF-S"));
    }

    #[test]
    fn best_af_mode_falls_back_through_prefixes() {
        let af_only: Vec<String> = vec!["Manual".into(), "AF-C".into()];
        assert_eq!(best_af_mode(&af_only), Some("AF-C"));

        let auto_only: Vec<String> = vec!["Manual".into(), "Automatic".into()];
        assert_eq!(best_af_mode(&auto_only), Some("Automatic"));

        let manual_only: Vec<String> = vec!["Manual".into()];
        assert_eq!(best_af_mode(&manual_only), None);
    }
}
