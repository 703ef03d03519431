//! Flat preview of one eye, rasterized on the CPU.
//!
//! Run with: cargo run --example debug_preview -- [player.json]
//! Prints the preview as coarse ASCII so the layout and eye selection can be
//! checked without a window.

use std::rc::Rc;

use vr_viewer::driver::ManualScheduler;
use vr_viewer::render::{RenderTarget, SoftwareContext};
use vr_viewer::video::{StillFrame, VideoFrame};
use vr_viewer::{DebugRenderer, Layout, PlayerConfig, Renderer};

const CANVAS: [u32; 2] = [64, 36];

/// Colour bars: the left eye image is dark, the right one bright, so the
/// preview shows which half was picked.
fn test_pattern(layout: Layout) -> Result<VideoFrame, Box<dyn std::error::Error>> {
    let (width, height) = match layout {
        Layout::Mono => (640, 360),
        Layout::StereoLeftRight => (1280, 360),
        Layout::StereoTopBottom => (640, 720),
    };
    Ok(VideoFrame::from_fn(width, height, |x, y| {
        let right_eye = match layout {
            Layout::Mono => false,
            Layout::StereoLeftRight => x >= width / 2,
            Layout::StereoTopBottom => y >= height / 2,
        };
        let base = if right_eye { 160 } else { 40 };
        let bar = ((x * 8 / width) * 12) as u8;
        [base + bar, base, base + (y * 60 / height) as u8, 255]
    })?)
}

fn shade([r, g, b, _]: [u8; 4]) -> char {
    let luma = (u32::from(r) * 3 + u32::from(g) * 6 + u32::from(b)) / 10;
    const RAMP: &[u8] = b" .:-=+*#%@";
    RAMP[(luma as usize * (RAMP.len() - 1)) / 255] as char
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = match std::env::args().nth(1) {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    println!(
        "Previewing {} eye of {} {} video (flip: {})",
        config.debug_view, config.layout, config.format, config.flip_layout
    );

    let scheduler = Rc::new(ManualScheduler::new());
    let video = StillFrame::new(test_pattern(config.layout)?);
    let mut renderer = DebugRenderer::new(
        Rc::clone(&scheduler),
        SoftwareContext::new(CANVAS[0], CANVAS[1]),
        video,
        config,
    )?;

    pollster::block_on(renderer.start())?;
    for frame in 0..3 {
        scheduler.advance(frame as f64 * 16.7);
    }

    let rows = renderer
        .with_graphics(|graphics| {
            (0..CANVAS[1])
                .step_by(2)
                .map(|y| {
                    (0..CANVAS[0])
                        .filter_map(|x| graphics.pixel(RenderTarget::Canvas, x, y))
                        .map(shade)
                        .collect::<String>()
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    for row in rows {
        println!("{row}");
    }

    println!("Drew {} frames", renderer.frames_drawn());
    renderer.stop();
    Ok(())
}
