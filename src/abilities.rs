//! Static per-model capability report (`gphoto2 --abilities`).
//!
//! The report is a colon-aligned key/value listing where some keys repeat
//! their value across several rows (e.g. capture choices), shown as rows
//! with an empty key. Keys are normalized to snake_case; values are coerced
//! to booleans and numbers where they read as such.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::client::Camera;
use crate::error::Result;

/// One coerced value from the abilities report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AbilityValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<AbilityValue>),
}

/// Capability flags for a camera model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraAbilities(BTreeMap<String, AbilityValue>);

impl CameraAbilities {
    pub fn get(&self, key: &str) -> Option<&AbilityValue> {
        self.0.get(key)
    }

    /// The camera model the report describes.
    pub fn model(&self) -> Option<&str> {
        match self.0.get("model") {
            Some(AbilityValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AbilityValue)> {
        self.0.iter()
    }
}

impl Camera {
    /// Query the static capability flags for this camera's model.
    pub async fn abilities(&self) -> Result<CameraAbilities> {
        let cmd = self.command("--abilities");
        let out = self.run_queued(&cmd, None).await?;
        Ok(parse_abilities(&out))
    }
}

/// `Abilities for camera` reads better as just `model`.
fn alias_key(key: &str) -> &str {
    match key {
        "abilities_for_camera" => "model",
        other => other,
    }
}

fn normalize_key(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
        .collect();
    let snake = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    alias_key(&snake).to_string()
}

fn parse_value(raw: &str) -> Option<AbilityValue> {
    if raw.is_empty() {
        return None;
    }
    match raw {
        "yes" => Some(AbilityValue::Bool(true)),
        "no" => Some(AbilityValue::Bool(false)),
        other => match other.parse::<f64>() {
            Ok(n) => Some(AbilityValue::Number(n)),
            Err(_) => Some(AbilityValue::Text(other.to_string())),
        },
    }
}

pub(crate) fn parse_abilities(out: &str) -> CameraAbilities {
    let mut map: BTreeMap<String, AbilityValue> = BTreeMap::new();
    let mut last_key = String::new();

    for line in out.lines().filter(|l| !l.trim().is_empty()) {
        let parts: Vec<&str> = line.split(':').map(str::trim).collect();
        // Rows with extra colons (URLs, timestamps) carry no abilities.
        let [raw_key, raw_value] = parts[..] else {
            continue;
        };

        let key = normalize_key(raw_key);
        let value = parse_value(raw_value);

        if key.is_empty() {
            // Continuation row: accumulate under the previous key.
            if last_key.is_empty() {
                continue;
            }
            let Some(value) = value else { continue };
            match map.remove(&last_key) {
                Some(AbilityValue::List(mut list)) => {
                    list.push(value);
                    map.insert(last_key.clone(), AbilityValue::List(list));
                }
                Some(existing) => {
                    map.insert(last_key.clone(), AbilityValue::List(vec![existing, value]));
                }
                None => {
                    map.insert(last_key.clone(), AbilityValue::List(vec![value]));
                }
            }
        } else {
            last_key = key.clone();
            if let Some(value) = value {
                map.insert(key, value);
            }
        }
    }

    CameraAbilities(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPORT: &str = "\
Abilities for camera             : Nikon DSC D5200
Serial port support              : no
USB support                      : yes
Capture choices                  :
                                 : Image
                                 : Preview
Configuration support            : yes
Delete selected files on camera  : yes
";

    #[test]
    fn parses_scalars_and_aliases_model() {
        let abilities = parse_abilities(REPORT);
        assert_eq!(abilities.model(), Some("Nikon DSC D5200"));
        assert_eq!(abilities.get("usb_support"), Some(&AbilityValue::Bool(true)));
        assert_eq!(abilities.get("serial_port_support"), Some(&AbilityValue::Bool(false)));
        assert_eq!(
            abilities.get("delete_selected_files_on_camera"),
            Some(&AbilityValue::Bool(true))
        );
    }

    #[test]
    fn continuation_rows_accumulate_into_a_list() {
        let abilities = parse_abilities(REPORT);
        assert_eq!(
            abilities.get("capture_choices"),
            Some(&AbilityValue::List(vec![
                AbilityValue::Text("Image".into()),
                AbilityValue::Text("Preview".into()),
            ]))
        );
    }

    #[test]
    fn numeric_values_are_coerced() {
        let abilities = parse_abilities("USB vendor id                    : 1200\n");
        assert_eq!(abilities.get("usb_vendor_id"), Some(&AbilityValue::Number(1200.0)));
    }

    #[test]
    fn rows_with_extra_colons_are_skipped() {
        let abilities = parse_abilities("Driver page : http://example.com/x\nUSB support : yes\n");
        assert!(abilities.get("driver_page").is_none());
        assert_eq!(abilities.get("usb_support"), Some(&AbilityValue::Bool(true)));
    }

    #[test]
    fn empty_report_parses_to_empty() {
        assert_eq!(parse_abilities(""), CameraAbilities::default());
    }
}
