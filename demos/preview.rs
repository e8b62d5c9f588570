use pylon_camera::{Camera, CameraConfig, HighGui, PreviewOptions, Result, run_preview};

fn main() -> Result<()> {
    env_logger::init();

    #[cfg(feature = "pylon")]
    let transport = pylon_camera::PylonTransport::new();
    #[cfg(not(feature = "pylon"))]
    let transport = pylon_camera::sim::SimTransport::single();

    let mut camera = Camera::new(&transport, &CameraConfig::default())?;
    camera.open()?;

    let mut display = HighGui::new();
    let summary = run_preview(&mut camera, &mut display, &PreviewOptions::default())?;
    println!("Showed {} frame(s)", summary.frames);

    camera.close()?;
    Ok(())
}
