//! Behaviour of the camera wrapper against the simulated transport.

use std::time::Duration;

use pylon_camera::sim::{SimCamera, SimFault, SimTransport};
use pylon_camera::{
    AutoMode, Camera, CameraConfig, CameraError, Exposure, Gain, GainNode, PixelFormat,
    PreviewOptions, ScriptedDisplay, run_preview,
};

fn closed_camera(transport: &SimTransport) -> Camera<'_> {
    Camera::new(transport, &CameraConfig::default()).expect("camera should construct")
}

#[test]
fn closed_camera_rejects_every_guarded_operation() {
    let transport = SimTransport::single();
    let mut camera = closed_camera(&transport);
    assert!(!camera.is_open().unwrap());

    assert_eq!(camera.set_exposure_us(1000.0).unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.set_exposure(Exposure::Auto).unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.set_gain_db(3.0).unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.set_gain(Gain::Auto).unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.grab(Duration::from_millis(10)).unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.exposure_us().unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.gain_auto().unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.width().unwrap_err(), CameraError::NotOpen);
    assert_eq!(camera.settings().unwrap_err(), CameraError::NotOpen);

    let mut display = ScriptedDisplay::new([]);
    assert_eq!(
        run_preview(&mut camera, &mut display, &PreviewOptions::default()).unwrap_err(),
        CameraError::NotOpen
    );
}

#[test]
fn guarded_operations_work_again_after_reopening() {
    let transport = SimTransport::single();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    camera.close().unwrap();
    camera.close().unwrap();
    assert_eq!(camera.grab_default().unwrap_err(), CameraError::NotOpen);
    camera.open().unwrap();
    camera.open().unwrap();
    assert!(camera.grab_default().is_ok());
    assert_eq!(transport.handle(0).unwrap().open_count(), 3);
}

#[test]
fn zero_sentinel_switches_to_auto_without_writing_a_value() {
    let transport = SimTransport::single();
    let handle = transport.handle(0).unwrap();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    handle.clear_writes();

    camera.set_exposure_us(0.0).unwrap();
    camera.set_gain_db(0.0).unwrap();

    assert_eq!(camera.exposure_auto().unwrap(), AutoMode::Continuous);
    assert_eq!(camera.gain_auto().unwrap(), AutoMode::Continuous);
    let features: Vec<String> = handle.writes().into_iter().map(|w| w.feature).collect();
    assert_eq!(features, ["ExposureAuto", "GainAuto"]);
}

#[test]
fn non_zero_value_switches_to_manual_and_applies_exactly_that_value() {
    let transport = SimTransport::single();
    let handle = transport.handle(0).unwrap();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    camera.set_exposure(Exposure::Auto).unwrap();
    camera.set_gain(Gain::Auto).unwrap();
    handle.clear_writes();

    camera.set_exposure_us(12_345.5).unwrap();
    camera.set_gain_db(7.25).unwrap();

    assert_eq!(camera.exposure_auto().unwrap(), AutoMode::Off);
    assert_eq!(camera.exposure_us().unwrap(), 12_345.5);
    assert_eq!(camera.gain_auto().unwrap(), AutoMode::Off);
    assert_eq!(camera.gain_db().unwrap(), 7.25);

    let writes: Vec<(String, String)> =
        handle.writes().into_iter().map(|w| (w.feature, w.value)).collect();
    assert_eq!(
        writes,
        [
            ("ExposureAuto".to_string(), "Off".to_string()),
            ("ExposureTime".to_string(), "12345.5".to_string()),
            ("GainAuto".to_string(), "Off".to_string()),
            ("Gain".to_string(), "7.25".to_string()),
        ]
    );
}

#[test]
fn explicit_manual_zero_gain_is_still_possible() {
    let transport = SimTransport::single();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    camera.set_gain(Gain::Manual(0.0)).unwrap();
    assert_eq!(camera.gain().unwrap(), Gain::Manual(0.0));
}

#[test]
fn negative_values_never_reach_the_device() {
    let transport = SimTransport::single();
    let handle = transport.handle(0).unwrap();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    handle.clear_writes();
    assert!(matches!(camera.set_exposure_us(-5.0), Err(CameraError::InvalidValue { .. })));
    assert!(matches!(camera.set_gain_db(-1.0), Err(CameraError::InvalidValue { .. })));
    assert!(handle.writes().is_empty());
}

#[test]
fn vendor_range_errors_propagate_unchanged() {
    let transport = SimTransport::single();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    let err = camera.set_gain_db(99.0).unwrap_err();
    assert!(matches!(err, CameraError::Feature { ref name, .. } if name == "Gain"), "{err}");
}

#[test]
fn every_pixel_format_grabs_as_bgr8() {
    for format in [
        PixelFormat::Mono8,
        PixelFormat::Mono12,
        PixelFormat::Rgb8,
        PixelFormat::Bgr8,
        PixelFormat::BayerRg8,
        PixelFormat::BayerGb8,
        PixelFormat::YCbCr422_8,
    ] {
        let transport = SimTransport::new(vec![
            SimCamera::new("a2A1920-160ucBAS", "40000001")
                .with_resolution(97, 61)
                .with_pixel_format(format),
        ]);
        let mut camera = closed_camera(&transport);
        camera.open().unwrap();
        let image = camera.grab(Duration::from_millis(100)).unwrap();
        assert_eq!(image.pixel_format(), PixelFormat::Bgr8, "{format}");
        assert_eq!(image.as_array().dim(), (61, 97, 3), "{format}");
        assert_eq!(image.as_raw().len(), 97 * 61 * 3, "{format}");
    }
}

#[test]
fn color_bars_come_out_in_bgr_order() {
    let transport = SimTransport::new(vec![
        SimCamera::default().with_resolution(80, 8).with_pixel_format(PixelFormat::Rgb8),
    ]);
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    let image = camera.grab_default().unwrap();
    // Bars: white, yellow, cyan, green, magenta, red, blue, black; 10 px each.
    assert_eq!(image.pixel(15, 0), Some([0, 255, 255]));
    assert_eq!(image.pixel(55, 0), Some([0, 0, 255]));
    assert_eq!(image.pixel(65, 0), Some([255, 0, 0]));
}

#[test]
fn failed_grab_surfaces_vendor_code_and_stops_grabbing() {
    let transport = SimTransport::single();
    let handle = transport.handle(0).unwrap();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    let description = "buffer incomplete".to_string();
    handle.push_fault(SimFault::GrabFailed { code: 0xe1000014, description: description.clone() });
    let failure = CameraError::GrabFailed { code: 0xe1000014, description };

    let err = camera.grab_default().unwrap_err();
    assert_eq!(err, failure);
    assert!(!handle.is_grabbing());
    assert!(camera.grab_default().is_ok());
}

#[test]
fn second_device_is_selected_by_index() {
    let transport = SimTransport::new(vec![
        SimCamera::new("acA1300-30uc", "1"),
        SimCamera::new("acA640-90gm", "2").legacy(),
    ]);
    let camera = Camera::new(&transport, &CameraConfig::default().with_index(1)).unwrap();
    assert_eq!(camera.device_info().serial_number, "2");
    assert_eq!(transport.handle(0).unwrap().open_count(), 0);
    assert_eq!(transport.handle(1).unwrap().open_count(), 1);
}

#[test]
fn legacy_exposure_names_keep_exact_db_gain() {
    let transport = SimTransport::new(vec![
        SimCamera::new("acA1300-60gc", "22000042").legacy().with_gain_node(GainNode::Db),
    ]);
    let handle = transport.handle(0).unwrap();
    let mut camera = closed_camera(&transport);
    camera.open().unwrap();
    handle.clear_writes();

    camera.set_gain_db(2.5).unwrap();

    assert_eq!(camera.gain().unwrap(), Gain::Manual(2.5));
    assert_eq!(camera.settings().unwrap().gain_node, GainNode::Db);
    let features: Vec<String> = handle.writes().into_iter().map(|w| w.feature).collect();
    assert_eq!(features, ["GainAuto", "Gain"]);
}
