//! Typed camera configuration schema and values.
//!
//! gphoto2 describes every config item with a widget type; the type decides
//! how the camera's wire string maps to a typed value and back. The mapping
//! must be stable through a round trip for every type except DATE, whose
//! sub-second truncation is accepted.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GPhotoError, Result};

/// Widget type of one camera configuration item, as declared by gphoto2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConfigType {
    Date,
    Menu,
    Radio,
    Range,
    Text,
    Toggle,
}

impl ConfigType {
    /// Parse the verbatim `Type:` field value. Unrecognized types degrade to
    /// TEXT so one exotic widget doesn't fail a whole config listing.
    pub(crate) fn from_wire(raw: &str) -> Self {
        match raw {
            "DATE" => ConfigType::Date,
            "MENU" => ConfigType::Menu,
            "RADIO" => ConfigType::Radio,
            "RANGE" => ConfigType::Range,
            "TEXT" => ConfigType::Text,
            "TOGGLE" => ConfigType::Toggle,
            other => {
                warn!(config_type = other, "unrecognized config type, treating as TEXT");
                ConfigType::Text
            }
        }
    }
}

/// Camera-declared schema for one configuration item (e.g. ISO).
///
/// `choices` is populated only when the source declares one or more `Choice`
/// lines (typically MENU/RADIO); `min`/`max`/`step` only for RANGE. Schemas
/// are assumed immutable for a camera session and are cached indefinitely;
/// only values change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigInfo {
    /// Full key path, e.g. `/main/imgsettings/iso`.
    pub key: String,
    pub label: String,
    pub readonly: bool,
    #[serde(rename = "type")]
    pub config_type: ConfigType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,
}

impl ConfigInfo {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: String::new(),
            readonly: true,
            config_type: ConfigType::Text,
            choices: None,
            min: None,
            max: None,
            step: None,
            help: None,
        }
    }
}

/// A typed configuration value, paired with a [`ConfigType`] for conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfigValue {
    /// MENU/RADIO/TEXT passthrough string.
    Text(String),
    /// RANGE value.
    Number(f64),
    /// TOGGLE on/off.
    Toggle(bool),
    /// TOGGLE "not set" (wire `"2"`).
    Unset,
    /// DATE value.
    Timestamp(DateTime<Utc>),
    /// DATE literal `"now"` passthrough: the camera substitutes its own
    /// clock at write time.
    Now,
}

impl ConfigValue {
    /// Convert a camera wire string into a typed value, per the item's type.
    pub fn from_wire(raw: &str, config_type: ConfigType) -> Result<Self> {
        let raw = raw.trim();
        match config_type {
            ConfigType::Toggle => {
                // Anything non-numeric coerces to off, matching the tool's
                // own loose numeric handling.
                let n = raw.parse::<f64>().unwrap_or(0.0);
                if n == 2.0 {
                    Ok(ConfigValue::Unset)
                } else {
                    Ok(ConfigValue::Toggle(n != 0.0))
                }
            }
            ConfigType::Range => {
                if raw.is_empty() {
                    return Ok(ConfigValue::Number(0.0));
                }
                raw.parse::<f64>().map(ConfigValue::Number).map_err(|_| {
                    GPhotoError::parse_error("RANGE value", format!("not a number: '{raw}'"))
                })
            }
            ConfigType::Date => {
                if raw == "now" {
                    return Ok(ConfigValue::Now);
                }
                let secs = if raw.is_empty() { 0 } else {
                    raw.parse::<i64>().map_err(|_| {
                        GPhotoError::parse_error(
                            "DATE value",
                            format!("not unix seconds or 'now': '{raw}'"),
                        )
                    })?
                };
                match Utc.timestamp_opt(secs, 0) {
                    chrono::LocalResult::Single(ts) => Ok(ConfigValue::Timestamp(ts)),
                    _ => Err(GPhotoError::parse_error(
                        "DATE value",
                        format!("out-of-range unix seconds: {secs}"),
                    )),
                }
            }
            ConfigType::Menu | ConfigType::Radio | ConfigType::Text => {
                Ok(ConfigValue::Text(raw.to_string()))
            }
        }
    }

    /// Convert a typed value into the camera wire string, per the item's
    /// type. DATE timestamps are ceil-rounded from milliseconds to whole
    /// seconds.
    pub fn to_wire(&self, config_type: ConfigType) -> String {
        match config_type {
            ConfigType::Toggle => match self {
                ConfigValue::Unset => "2".to_string(),
                ConfigValue::Toggle(true) => "1".to_string(),
                ConfigValue::Toggle(false) => "0".to_string(),
                ConfigValue::Number(n) => if *n != 0.0 { "1" } else { "0" }.to_string(),
                ConfigValue::Text(s) => if s.is_empty() { "0" } else { "1" }.to_string(),
                ConfigValue::Timestamp(_) | ConfigValue::Now => "1".to_string(),
            },
            ConfigType::Range => match self {
                // f64 Display drops a trailing ".0", so 100.0 renders "100".
                ConfigValue::Number(n) => format!("{n}"),
                other => other.display_string(),
            },
            ConfigType::Date => match self {
                ConfigValue::Now => "now".to_string(),
                ConfigValue::Timestamp(ts) => {
                    let millis = ts.timestamp_millis();
                    format!("{}", (millis as f64 / 1000.0).ceil() as i64)
                }
                other => other.display_string(),
            },
            ConfigType::Menu | ConfigType::Radio | ConfigType::Text => self.display_string(),
        }
    }

    /// Plain display form, used for passthrough types and for surfacing
    /// values like serial numbers as strings.
    pub(crate) fn display_string(&self) -> String {
        match self {
            ConfigValue::Text(s) => s.clone(),
            ConfigValue::Number(n) => format!("{n}"),
            ConfigValue::Toggle(b) => b.to_string(),
            ConfigValue::Unset => String::new(),
            ConfigValue::Timestamp(ts) => ts.to_rfc3339(),
            ConfigValue::Now => "now".to_string(),
        }
    }

    /// The value as a string slice when it is a passthrough string.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Text(s)
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        ConfigValue::Number(n)
    }
}

impl From<i32> for ConfigValue {
    fn from(n: i32) -> Self {
        ConfigValue::Number(n.into())
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Toggle(b)
    }
}

impl From<DateTime<Utc>> for ConfigValue {
    fn from(ts: DateTime<Utc>) -> Self {
        ConfigValue::Timestamp(ts)
    }
}
