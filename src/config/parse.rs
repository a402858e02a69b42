//! Parser for gphoto2's config listing format.
//!
//! Output is a sequence of blocks separated by a line containing exactly
//! `END`. In `--list-all-config` output every block starts with its key
//! path; in `--get-config` output the key line is absent and the caller
//! supplies the requested keys, matched positionally. The parser trusts
//! that order: gphoto2 echoes multi-key results in request order, and a
//! caller that requests keys out of order relative to the tool's output
//! would get silently mismatched records.
//!
//! Parsing is deliberately not side-effect-free: every successfully parsed
//! schema is written into the per-partition cache, warming the lookups that
//! `set` performs later.

use crate::error::{GPhotoError, Result};

use super::cache::ConfigCache;
use super::value::{ConfigInfo, ConfigType, ConfigValue};

/// Parse `--list-all-config` style output: each block carries its own key.
pub(crate) fn parse_all(
    out: &str,
    cache: &ConfigCache,
    partition: &str,
) -> Result<Vec<(ConfigValue, ConfigInfo)>> {
    blocks(out)
        .into_iter()
        .map(|block| parse_block(&block, None, cache, partition))
        .collect()
}

/// Parse `--get-config` style output: blocks carry no key line, and the
/// caller's requested keys are zipped against the blocks positionally.
pub(crate) fn parse_keyed(
    out: &str,
    keys: &[String],
    cache: &ConfigCache,
    partition: &str,
) -> Result<Vec<(ConfigValue, ConfigInfo)>> {
    let blocks = blocks(out);
    if blocks.len() > keys.len() {
        return Err(GPhotoError::parse_error(
            "config listing",
            format!("{} blocks for {} requested keys", blocks.len(), keys.len()),
        ));
    }
    blocks
        .into_iter()
        .zip(keys)
        .map(|(block, key)| parse_block(&block, Some(key.as_str()), cache, partition))
        .collect()
}

/// Split output into blocks of non-empty lines, delimited by `END` lines.
fn blocks(out: &str) -> Vec<Vec<String>> {
    let mut all = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in out.lines() {
        let trimmed = line.trim();
        if trimmed == "END" {
            if !current.is_empty() {
                all.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !trimmed.is_empty() {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        all.push(current);
    }
    all
}

/// Strip the leading ordinal from a `Choice` value: `"0 Auto"` → `"Auto"`.
fn strip_choice_ordinal(value: &str) -> &str {
    let digits = value.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return value;
    }
    let rest = &value[digits..];
    match rest.chars().next() {
        Some(c) if c.is_whitespace() => &rest[c.len_utf8()..],
        _ => rest,
    }
}

fn parse_block(
    lines: &[String],
    known_key: Option<&str>,
    cache: &ConfigCache,
    partition: &str,
) -> Result<(ConfigValue, ConfigInfo)> {
    let (key, fields): (&str, &[String]) = match known_key {
        Some(key) => (key, lines),
        None => {
            let first = lines.first().map(|s| s.trim()).ok_or_else(|| {
                GPhotoError::parse_error("config block", "empty block".to_string())
            })?;
            (first, &lines[1..])
        }
    };

    let mut info = ConfigInfo::new(key.trim());
    let mut current_raw = String::new();

    for line in fields {
        let Some((prop, value)) = line.split_once(": ") else {
            continue;
        };
        let value = value.trim();
        match prop.trim().to_lowercase().as_str() {
            "label" => info.label = value.to_string(),
            "readonly" => info.readonly = value.parse::<f64>().map(|n| n != 0.0).unwrap_or(false),
            "type" => info.config_type = ConfigType::from_wire(value),
            "current" => current_raw = value.to_string(),
            "choice" => {
                info.choices
                    .get_or_insert_with(Vec::new)
                    .push(strip_choice_ordinal(value).to_string());
            }
            "bottom" => info.min = value.parse().ok(),
            "top" => info.max = value.parse().ok(),
            "step" => info.step = value.parse().ok(),
            "help" => info.help = Some(value.to_string()),
            // Unrecognized field names ("Printable", driver extras) ignored.
            _ => {}
        }
    }

    cache.insert_info(partition, info.clone());
    let current = ConfigValue::from_wire(&current_raw, info.config_type)?;
    Ok((current, info))
}
