//! End-to-end runs of the `pylon-view` binary against the simulated camera.

use std::process::Command;

fn pylon_view() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_pylon-view"));
    cmd.env("RUST_LOG", "warn");
    cmd
}

#[test]
fn list_prints_json_device_entries() {
    let out = pylon_view().args(["--sim", "--json", "list"]).output().unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let devices: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(devices.as_array().map(Vec::len), Some(1));
    assert_eq!(devices[0]["model_name"], "acA1300-30uc");
}

#[test]
fn info_reports_auto_gain_for_the_zero_default() {
    let out = pylon_view()
        .args(["--sim", "--json", "--exposure-us", "20000", "info"])
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let settings: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(settings["exposure_auto"], "Off");
    assert_eq!(settings["exposure_us"], 20000.0);
    assert_eq!(settings["gain_auto"], "Continuous");
}

#[test]
fn grab_writes_a_png_of_the_sensor_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    let out = pylon_view()
        .args(["--sim", "grab", "--output"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "640x480 BGR8");

    let png = image::open(&path).unwrap();
    assert_eq!((png.width(), png.height()), (640, 480));
}

#[test]
fn out_of_range_index_fails_with_a_message() {
    let out = pylon_view().args(["--sim", "--index", "4", "info"]).output().unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("camera index 4 out of range"));
}
