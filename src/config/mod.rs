//! Camera configuration: schema discovery, typed get/set, key resolution.
//!
//! All operations run through the per-camera command queue and pause a
//! running liveview stream for their duration. Schemas and the key list are
//! cached per camera partition for the life of the client.

mod cache;
mod parse;
mod value;

pub(crate) use cache::ConfigCache;
pub use value::{ConfigInfo, ConfigType, ConfigValue};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::Camera;
use crate::error::{GPhotoError, Result};
use crate::shell::quote;

/// Config schemas and current values for a set of keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub info: BTreeMap<String, ConfigInfo>,
    pub values: BTreeMap<String, ConfigValue>,
}

impl Camera {
    /// Configuration operations for this camera.
    pub fn config(&self) -> ConfigApi<'_> {
        ConfigApi { camera: self }
    }
}

/// Handle for configuration operations on one camera.
pub struct ConfigApi<'a> {
    camera: &'a Camera,
}

impl ConfigApi<'_> {
    /// All valid config key paths for the camera, cached per partition;
    /// the key namespace does not change within a session.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let partition = self.camera.partition_key();
        if let Some(cached) = self.camera.shared().cache.key_list(&partition) {
            return Ok(cached);
        }

        let cmd = self.camera.command("--list-config");
        let out = self.camera.run_queued(&cmd, None).await?;
        let keys: Vec<String> =
            out.lines().map(str::trim).filter(|l| !l.is_empty()).map(String::from).collect();
        self.camera.shared().cache.set_key_list(&partition, keys.clone());
        Ok(keys)
    }

    /// Resolve partial key names to full key paths.
    ///
    /// For each name: an exact match wins, then a key ending with the name,
    /// then a key containing `/name`, otherwise the name passes through
    /// unchanged.
    pub async fn resolve_keys(&self, names: &[&str]) -> Result<Vec<String>> {
        let all = self.keys().await?;
        Ok(names
            .iter()
            .map(|name| {
                if all.iter().any(|k| k == name) {
                    return (*name).to_string();
                }
                if let Some(found) = all.iter().find(|k| k.ends_with(name)) {
                    return found.clone();
                }
                let nested = format!("/{name}");
                if let Some(found) = all.iter().find(|k| k.contains(&nested)) {
                    return found.clone();
                }
                (*name).to_string()
            })
            .collect())
    }

    /// Schemas and values for every config item the camera exposes.
    pub async fn all(&self) -> Result<ConfigSnapshot> {
        let pairs = self.fetch_all().await?;
        Ok(snapshot_from_pairs(pairs))
    }

    /// Schemas for every config item the camera exposes.
    pub async fn all_info(&self) -> Result<BTreeMap<String, ConfigInfo>> {
        Ok(self.all().await?.info)
    }

    /// Current values for every config item the camera exposes.
    pub async fn all_values(&self) -> Result<BTreeMap<String, ConfigValue>> {
        Ok(self.all().await?.values)
    }

    /// Schemas and values for a set of keys. With `check_missing`, keys not
    /// present in the camera's key list are silently dropped first.
    pub async fn get(&self, keys: &[&str], check_missing: bool) -> Result<ConfigSnapshot> {
        let checked = self.filter_missing(keys, check_missing).await?;
        let pairs = self.fetch_keyed(&checked).await?;
        Ok(snapshot_from_pairs(pairs))
    }

    /// Schemas for a set of keys.
    pub async fn info(&self, keys: &[&str], check_missing: bool) -> Result<BTreeMap<String, ConfigInfo>> {
        Ok(self.get(keys, check_missing).await?.info)
    }

    /// Values for a set of keys, keyed by full key path.
    pub async fn values_map(
        &self,
        keys: &[&str],
        check_missing: bool,
    ) -> Result<BTreeMap<String, ConfigValue>> {
        Ok(self.get(keys, check_missing).await?.values)
    }

    /// Values in the same order as the requested keys; `None` where a key
    /// was filtered out or yielded no record.
    pub async fn values(&self, keys: &[&str], check_missing: bool) -> Result<Vec<Option<ConfigValue>>> {
        let map = self.values_map(keys, check_missing).await?;
        Ok(keys.iter().map(|key| map.get(*key).cloned()).collect())
    }

    /// Set multiple config values in a single gphoto2 invocation.
    ///
    /// Each value is converted to its wire string using the key's cached
    /// schema (fetching any schemas not yet cached), then all assignments
    /// are batched into one `--set-config-value` command: one subprocess
    /// and one camera round-trip regardless of how many keys change.
    pub async fn set(
        &self,
        values: &BTreeMap<String, ConfigValue>,
        check_missing: bool,
    ) -> Result<()> {
        let keys: Vec<&str> = values.keys().map(String::as_str).collect();
        let checked = self.filter_missing(&keys, check_missing).await?;
        if checked.is_empty() {
            return Ok(());
        }

        let partition = self.camera.partition_key();
        let mut infos = self.camera.shared().cache.info_for_keys(&partition, &checked);

        let missing: Vec<&str> = checked
            .iter()
            .filter(|key| !infos.contains_key(*key))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            // Fetching warms the cache, but use the returned records
            // directly rather than re-reading it.
            let fetched = self.info(&missing, false).await?;
            infos.extend(fetched);
        }

        let mut flags = Vec::with_capacity(checked.len());
        for key in &checked {
            let info = infos
                .get(key)
                .ok_or_else(|| GPhotoError::UnknownKey { key: key.clone() })?;
            let value = values.get(key).expect("checked keys derive from the value map");
            let wire = value.to_wire(info.config_type);
            flags.push(format!("--set-config-value {}={}", quote(key), quote(&wire)));
        }

        let cmd = self.camera.command(&flags.join(" "));
        self.camera.run_queued(&cmd, None).await?;
        Ok(())
    }

    async fn filter_missing(&self, keys: &[&str], check_missing: bool) -> Result<Vec<String>> {
        if !check_missing {
            return Ok(keys.iter().map(|k| (*k).to_string()).collect());
        }
        let all = self.keys().await?;
        Ok(keys
            .iter()
            .filter(|key| all.iter().any(|k| k == *key))
            .map(|k| (*k).to_string())
            .collect())
    }

    async fn fetch_all(&self) -> Result<Vec<(ConfigValue, ConfigInfo)>> {
        let cmd = self.camera.command("--list-all-config");
        let out = self.camera.run_queued(&cmd, None).await?;
        parse::parse_all(&out, &self.camera.shared().cache, &self.camera.partition_key())
    }

    async fn fetch_keyed(&self, keys: &[String]) -> Result<Vec<(ConfigValue, ConfigInfo)>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let flags: Vec<String> =
            keys.iter().map(|key| format!("--get-config {}", quote(key))).collect();
        let cmd = self.camera.command(&flags.join(" "));
        let out = self.camera.run_queued(&cmd, None).await?;
        parse::parse_keyed(&out, keys, &self.camera.shared().cache, &self.camera.partition_key())
    }
}

fn snapshot_from_pairs(pairs: Vec<(ConfigValue, ConfigInfo)>) -> ConfigSnapshot {
    let mut snapshot = ConfigSnapshot::default();
    for (value, info) in pairs {
        snapshot.values.insert(info.key.clone(), value);
        snapshot.info.insert(info.key.clone(), info);
    }
    snapshot
}
