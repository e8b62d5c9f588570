use std::time::Duration;

use pylon_camera::sim::{SimCamera, SimTransport};
use pylon_camera::{Camera, CameraConfig, Exposure, Gain, PixelFormat, Result};

fn main() -> Result<()> {
    env_logger::init();

    let transport = SimTransport::new(vec![
        SimCamera::new("acA1920-40uc", "22334455")
            .with_resolution(1920, 1200)
            .with_pixel_format(PixelFormat::BayerRg8),
    ]);
    let config = CameraConfig::default()
        .with_exposure(Exposure::Manual(15_000.0))
        .with_gain(Gain::Auto);

    let mut camera = Camera::new(&transport, &config)?;
    println!("Using device {}", camera.device_info());

    camera.open()?;
    for _ in 0..3 {
        let image = camera.grab(Duration::from_millis(500))?;
        let centre = image.pixel(image.width() / 2, image.height() / 2).unwrap_or_default();
        println!(
            "Got frame: {}x{} {} centre BGR {:?}",
            image.width(),
            image.height(),
            image.pixel_format(),
            centre
        );
    }
    camera.set_gain_db(0.0)?;
    println!("GainAuto = {}", camera.gain_auto()?);
    camera.close()?;

    Ok(())
}
