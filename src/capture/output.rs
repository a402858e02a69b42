//! Parser for capture/preview command stdout.
//!
//! gphoto2 narrates where each captured file went, one line per file, with
//! phrasing that varies by driver. Lines ending "on the camera" describe
//! files left on the camera's storage; everything else is a local download.
//! Drivers are inconsistent about relative-vs-absolute local paths, so the
//! caller-supplied download directory is authoritative for local saves.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a captured file ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveKind {
    /// Left on the camera's storage.
    Camera,
    /// Downloaded to the local machine.
    Local,
}

/// One file produced by a capture command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveLocation {
    pub kind: SaveKind,
    pub dir: PathBuf,
    pub filename: String,
    pub full: PathBuf,
}

/// Message prefixes/suffixes stripped from a line to recover the bare path.
const MESSAGE_PHRASES: &[&str] = &[
    "New file is in location",
    "Saving file as",
    "Deleting file",
    "Keeping file",
    "on the camera",
];

/// Split a narration line into (dir, filename): everything up to and
/// including the last path separator is the directory.
fn dir_and_file(line: &str) -> (String, String) {
    let mut path = line.to_string();
    for phrase in MESSAGE_PHRASES {
        path = path.replace(phrase, "");
    }
    let path = path.trim();

    match path.rfind(['/', '\\']) {
        Some(idx) => (path[..idx].to_string(), path[idx + 1..].to_string()),
        None => (String::new(), path.to_string()),
    }
}

/// Parse capture stdout into save-location records.
///
/// "New file is in location" and "Saving file as" lines append a record;
/// "Deleting file" lines remove any previously recorded entry matching
/// filename, kind and directory (camera auto-delete-after-download).
pub(crate) fn parse_capture_stdout(stdout: &str, local_dir: &Path) -> Vec<SaveLocation> {
    let mut saved: Vec<SaveLocation> = Vec::new();

    for line in stdout.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let kind = if line.ends_with("on the camera") { SaveKind::Camera } else { SaveKind::Local };
        let (parsed_dir, filename) = dir_and_file(line);
        let dir = match kind {
            SaveKind::Camera => PathBuf::from(parsed_dir),
            SaveKind::Local => local_dir.to_path_buf(),
        };
        let full = dir.join(&filename);

        if line.starts_with("New file is in location") || line.starts_with("Saving file as") {
            saved.push(SaveLocation { kind, dir, filename, full });
        } else if line.starts_with("Deleting file") {
            saved.retain(|s| !(s.filename == filename && s.kind == kind && s.dir == dir));
        }
    }

    saved
}
