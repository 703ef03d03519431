//! The live video frame seam.
//!
//! Decoding happens elsewhere; the renderer only asks for whatever frame is
//! current each time it draws.

use glam::Vec2;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum VideoError {
    #[error("video frame must have non-zero size, got {width}x{height}")]
    Empty { width: u32, height: u32 },
    #[error("expected {expected} bytes of RGBA8 pixels but received {actual}")]
    PixelBufferSize { expected: usize, actual: usize },
}

/// One decoded RGBA8 frame, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, VideoError> {
        if width == 0 || height == 0 {
            return Err(VideoError::Empty { width, height });
        }
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(VideoError::PixelBufferSize {
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
        })
    }

    pub fn from_fn(
        width: u32,
        height: u32,
        mut pixel: impl FnMut(u32, u32) -> [u8; 4],
    ) -> Result<Self, VideoError> {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                pixels.extend_from_slice(&pixel(x, y));
            }
        }
        Self::new(width, height, pixels)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let index = (y as usize * self.width as usize + x as usize) * 4;
        let mut out = [0; 4];
        out.copy_from_slice(&self.pixels[index..index + 4]);
        out
    }

    /// Nearest texel at `uv`, clamped to the edges.
    pub fn sample_nearest(&self, uv: Vec2) -> [u8; 4] {
        let x = (uv.x * self.width as f32).floor().clamp(0.0, (self.width - 1) as f32);
        let y = (uv.y * self.height as f32).floor().clamp(0.0, (self.height - 1) as f32);
        self.pixel(x as u32, y as u32)
    }
}

pub trait VideoSource {
    /// Decoded size of the current frame, if any frame is available yet.
    fn dimensions(&self) -> Option<(u32, u32)>;

    fn current_frame(&self) -> Option<VideoFrame>;
}

/// A single frame that never changes. Useful for stills and previews.
#[derive(Debug, Clone)]
pub struct StillFrame {
    frame: VideoFrame,
}

impl StillFrame {
    pub fn new(frame: VideoFrame) -> Self {
        Self { frame }
    }
}

impl VideoSource for StillFrame {
    fn dimensions(&self) -> Option<(u32, u32)> {
        Some((self.frame.width, self.frame.height))
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        Some(self.frame.clone())
    }
}

/// Latest-frame slot shared with a playback component that runs on its own
/// thread. Readers get whatever was published last.
#[derive(Debug, Clone, Default)]
pub struct SharedFrame {
    slot: Arc<RwLock<Option<VideoFrame>>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: VideoFrame) {
        match self.slot.write() {
            Ok(mut slot) => *slot = Some(frame),
            Err(poisoned) => *poisoned.into_inner() = Some(frame),
        }
    }

    pub fn clear(&self) {
        match self.slot.write() {
            Ok(mut slot) => *slot = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }
}

impl VideoSource for SharedFrame {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.current_frame()
            .map(|frame| (frame.width(), frame.height()))
    }

    fn current_frame(&self) -> Option<VideoFrame> {
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_buffers() {
        assert_eq!(
            VideoFrame::new(2, 2, vec![0; 15]),
            Err(VideoError::PixelBufferSize {
                expected: 16,
                actual: 15
            })
        );
        assert!(matches!(
            VideoFrame::new(0, 4, Vec::new()),
            Err(VideoError::Empty { .. })
        ));
    }

    #[test]
    fn nearest_sampling_clamps_to_edges() {
        let frame = VideoFrame::from_fn(4, 2, |x, y| [x as u8, y as u8, 0, 255]).unwrap();
        assert_eq!(frame.sample_nearest(Vec2::new(0.0, 0.0)), [0, 0, 0, 255]);
        assert_eq!(frame.sample_nearest(Vec2::new(0.5, 0.5)), [2, 1, 0, 255]);
        assert_eq!(frame.sample_nearest(Vec2::new(1.0, 1.0)), [3, 1, 0, 255]);
        assert_eq!(frame.sample_nearest(Vec2::new(-0.2, 7.0)), [0, 1, 0, 255]);
    }

    #[test]
    fn shared_frame_hands_out_latest_publication() {
        let shared = SharedFrame::new();
        assert!(shared.dimensions().is_none());

        let playback = shared.clone();
        std::thread::spawn(move || {
            playback.publish(VideoFrame::from_fn(8, 4, |_, _| [1, 2, 3, 4]).unwrap());
        })
        .join()
        .unwrap();

        assert_eq!(shared.dimensions(), Some((8, 4)));
        assert_eq!(shared.current_frame().unwrap().pixel(7, 3), [1, 2, 3, 4]);

        shared.clear();
        assert!(shared.current_frame().is_none());
    }
}
