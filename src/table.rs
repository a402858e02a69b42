//! Generic parser for gphoto2's banner-style tables.
//!
//! `--auto-detect` and `--list-ports` print a header row, a separator row of
//! hyphens, then data rows with columns separated by runs of three or more
//! spaces (column values themselves may contain single spaces).

use std::collections::BTreeMap;

use crate::error::{GPhotoError, Result};

/// Parse a banner table into one map per row.
///
/// The separator row is the first row whose trimmed content starts with five
/// or more hyphens; the row immediately above it is the header, unless
/// explicit property names are supplied. Header-derived property names are
/// lowercased with non-alphanumerics replaced by `-`.
pub(crate) fn read_table(
    out: &str,
    property_names: Option<&[&str]>,
) -> Result<Vec<BTreeMap<String, String>>> {
    let lines: Vec<&str> = out.lines().collect();

    let sep_index = lines
        .iter()
        .position(|line| line.trim().chars().take_while(|c| *c == '-').count() >= 5)
        .ok_or_else(|| GPhotoError::parse_error("table", "no separator row found"))?;

    let properties: Vec<String> = match property_names {
        Some(names) => names.iter().map(|n| (*n).to_string()).collect(),
        None => {
            let header = sep_index
                .checked_sub(1)
                .map(|i| lines[i])
                .ok_or_else(|| GPhotoError::parse_error("table", "separator row has no header"))?;
            split_columns(header).into_iter().map(|name| normalize_property(&name)).collect()
        }
    };

    let rows = lines[sep_index + 1..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            properties.iter().cloned().zip(split_columns(line)).collect::<BTreeMap<_, _>>()
        })
        .collect();

    Ok(rows)
}

/// Split a row on runs of 3+ whitespace characters; values are trimmed.
fn split_columns(line: &str) -> Vec<String> {
    let mut columns = Vec::new();
    let mut current = String::new();
    let mut whitespace_run = String::new();

    for ch in line.trim().chars() {
        if ch.is_whitespace() {
            whitespace_run.push(ch);
            continue;
        }
        if whitespace_run.chars().count() >= 3 {
            if !current.is_empty() {
                columns.push(std::mem::take(&mut current));
            }
        } else {
            current.push_str(&whitespace_run);
        }
        whitespace_run.clear();
        current.push(ch);
    }
    if !current.is_empty() {
        columns.push(current);
    }
    columns
}

fn normalize_property(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}
