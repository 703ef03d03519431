//! Drives the headset renderer against a simulated session, including a
//! stretch of lost tracking.
//!
//! Run with: cargo run --example simulated_session
//! With `--features render-wgpu` the frames are drawn on the GPU instead of
//! the software rasterizer.

use std::rc::Rc;

use vr_viewer::render::GraphicsContext;
use vr_viewer::video::{SharedFrame, VideoFrame};
use vr_viewer::vr::{ImmersiveSession, SimulatedSession};
use vr_viewer::{Format, Layout, PlayerConfig, Renderer, play};

const FRAME_MS: f64 = 1000.0 / 72.0;

fn run<G: GraphicsContext + 'static>(graphics: G) -> Result<(), Box<dyn std::error::Error>> {
    let session = Rc::new(SimulatedSession::new([320, 360]));
    let video = SharedFrame::new();
    video.publish(VideoFrame::from_fn(3840, 1920, |x, y| {
        [(x % 256) as u8, (y % 256) as u8, 128, 255]
    })?);

    let config = PlayerConfig::new(Layout::StereoTopBottom, false, Format::Full);
    let mut renderer = pollster::block_on(play(Rc::clone(&session), graphics, video.clone(), config))?;
    println!(
        "Rendering into {} with {}",
        session.label(),
        renderer.with_graphics(|g| g.label()).unwrap_or("released context")
    );

    // a playback thread would keep publishing; here the picture stays put
    for frame in 0..120u32 {
        if frame == 60 {
            println!("Tracking lost");
            session.set_tracking(false);
        }
        if frame == 90 {
            println!("Tracking restored");
            session.set_tracking(true);
        }
        session.advance(f64::from(frame) * FRAME_MS);
    }

    println!("Loop ran {} frames", renderer.frames_drawn());
    renderer.stop();
    Ok(())
}

#[cfg(feature = "render-wgpu")]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    run(vr_viewer::render::wgpu_backend::WgpuContext::new(1280, 720)?)
}

#[cfg(not(feature = "render-wgpu"))]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    run(vr_viewer::render::SoftwareContext::new(1280, 720))
}
