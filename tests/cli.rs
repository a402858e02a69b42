//! End-to-end tests against a stub gphoto2 binary.
//!
//! The client runs whatever executable [`Settings::binary`] names through
//! the shell, so a small dispatch script standing in for gphoto2 exercises
//! the full path: command assembly, queueing, subprocess execution, stderr
//! classification and output parsing. Every invocation is appended to a log
//! file next to the script, so tests can also assert which commands ran.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tether::{
    CameraIdentifier, CaptureOptions, ConfigValue, GPhoto, GPhotoError, SaveKind, Settings,
};

const DISPATCH: &str = r#"
printf '%s\n' "$*" >> "$(dirname "$0")/invocations.log"
case "$*" in
*--auto-detect*)
    printf 'Model                          Port\n'
    printf -- '----------------------------------------------------------\n'
    printf 'Nikon DSC D5200                usb:001,004\n'
    printf 'Canon EOS 5D                   usb:001,007\n'
    ;;
*--list-config*)
    printf '/main/actions/autofocusdrive\n'
    printf '/main/capturesettings/focusmode\n'
    printf '/main/imgsettings/iso\n'
    ;;
*--set-config-value*)
    ;;
*--get-config*/main/actions/autofocusdrive*)
    printf 'Label: Drive Nikon DSLR Autofocus\n'
    printf 'Readonly: 0\n'
    printf 'Type: TOGGLE\n'
    printf 'Current: 0\n'
    printf 'END\n'
    ;;
*--get-config*)
    printf 'Label: ISO Speed\n'
    printf 'Readonly: 0\n'
    printf 'Type: MENU\n'
    printf 'Current: 100\n'
    printf 'Choice: 0 100\n'
    printf 'Choice: 1 200\n'
    printf 'END\n'
    ;;
*--capture-image-and-download*)
    printf 'Saving file as capt0000.jpg\n'
    ;;
*)
    printf '*** Error ***\nCould not claim the USB device\n' >&2
    exit 1
    ;;
esac
"#;

/// Temp directory holding the stub script; removed again on drop.
struct FixtureDir(PathBuf);

impl FixtureDir {
    fn path(&self) -> &Path {
        &self.0
    }

    fn invocations(&self) -> String {
        fs::read_to_string(self.0.join("invocations.log")).unwrap_or_default()
    }
}

impl Drop for FixtureDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

fn fixture(name: &str) -> (GPhoto, FixtureDir) {
    let dir = std::env::temp_dir().join(format!("tether-cli-{name}-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let script = dir.join("gphoto2-stub.sh");
    fs::write(&script, format!("#!/bin/sh{DISPATCH}")).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let client = GPhoto::with_settings(Settings {
        binary: script.display().to_string(),
        pause: Duration::ZERO,
        ..Settings::default()
    });
    (client, FixtureDir(dir))
}

#[tokio::test]
async fn auto_detect_parses_the_camera_table() {
    let (client, _dir) = fixture("detect");
    let detected = client.auto_detect().await.unwrap();

    assert_eq!(detected.len(), 2);
    assert_eq!(detected[0].model.as_deref(), Some("Nikon DSC D5200"));
    assert_eq!(detected[0].port.as_deref(), Some("usb:001,004"));
    assert_eq!(detected[1].port.as_deref(), Some("usb:001,007"));
}

#[tokio::test]
async fn get_config_returns_typed_values() {
    let (client, _dir) = fixture("config");
    let camera = client.camera(CameraIdentifier::for_port("usb:001,004"));

    let values = camera.config().values(&["iso"], false).await.unwrap();
    assert_eq!(values, vec![Some(ConfigValue::Text("100".into()))]);

    let info = camera.config().info(&["iso"], false).await.unwrap();
    let iso = &info["iso"];
    assert_eq!(iso.label, "ISO Speed");
    assert!(!iso.readonly);
    assert_eq!(iso.choices.as_deref(), Some(&["100".to_string(), "200".to_string()][..]));
}

#[tokio::test]
async fn capture_image_reports_saved_files() {
    let (client, dir) = fixture("capture");
    let camera = client.camera(None);

    let options =
        CaptureOptions { directory: Some(dir.path().to_path_buf()), ..Default::default() };
    let saved = camera.capture_image(&options).await.unwrap();

    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].kind, SaveKind::Local);
    assert_eq!(saved[0].filename, "capt0000.jpg");
    assert_eq!(saved[0].full, dir.path().join("capt0000.jpg"));
}

#[tokio::test]
async fn autofocus_drives_the_resolved_config_key() {
    let (client, dir) = fixture("autofocus");
    let camera = client.camera(None);

    camera.autofocus(false).await.unwrap();

    // The bare "autofocusdrive" name must be resolved to its full key path
    // and actually written; a filtered-out set would leave no trace here.
    let log = dir.invocations();
    let set_line = log
        .lines()
        .find(|line| line.contains("--set-config-value"))
        .expect("no --set-config-value command was issued");
    assert!(set_line.contains("/main/actions/autofocusdrive=1"), "unexpected set: {set_line}");
}

#[tokio::test]
async fn stderr_banner_becomes_a_short_error() {
    let (client, _dir) = fixture("fail");
    let camera = client.camera(None);

    // The stub's fallthrough branch fails with a boxed error banner.
    match camera.abilities().await {
        Err(GPhotoError::Command { short, stderr }) => {
            assert_eq!(short, "Could not claim the USB device");
            assert!(stderr.contains("*** Error ***"));
        }
        other => panic!("expected Command error, got {other:?}"),
    }
}
