//! Flat preview of one eye on the page canvas, without a headset.

use super::{
    GraphicsContext, Lifecycle, RenderError, RenderResult, RenderTarget, Renderer, RendererState,
    VideoScene, warn_frame_error,
};
use crate::config::{Eye, PlayerConfig};
use crate::driver::{DrawLoop, FrameScheduler};
use crate::video::VideoSource;
use crate::vr::{EyeView, Viewport};
use glam::Mat4;
use std::cell::RefCell;
use std::f32::consts::FRAC_PI_2;
use std::rc::Rc;

pub const DEBUG_NEAR: f32 = 0.01;

/// Camera at the origin looking down −Z with a 90° vertical field of view
/// over the whole canvas.
pub fn debug_view(eye: Eye, canvas_size: [u32; 2]) -> EyeView {
    let viewport = Viewport::full(canvas_size);
    EyeView {
        eye,
        view: Mat4::IDENTITY,
        projection: Mat4::perspective_infinite_rh(FRAC_PI_2, viewport.aspect_ratio(), DEBUG_NEAR),
        viewport,
    }
}

pub struct DebugRenderer<G, V, S>
where
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
    S: FrameScheduler<Frame = ()> + 'static,
{
    scheduler: Rc<S>,
    eye: Eye,
    lifecycle: Lifecycle<G, V, S>,
}

impl<G, V, S> DebugRenderer<G, V, S>
where
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
    S: FrameScheduler<Frame = ()> + 'static,
{
    /// Draws `config.debug_view` each animation frame of `scheduler`.
    pub fn new(scheduler: Rc<S>, graphics: G, video: V, config: PlayerConfig) -> RenderResult<Self> {
        let scene = VideoScene::new(graphics, video, config)?;
        Ok(Self {
            scheduler,
            eye: config.debug_view,
            lifecycle: Lifecycle::Constructed(scene),
        })
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    /// Runs `f` against the graphics context while the renderer still holds it.
    pub fn with_graphics<R>(&self, f: impl FnOnce(&G) -> R) -> Option<R> {
        match &self.lifecycle {
            Lifecycle::Constructed(scene) => Some(f(scene.graphics())),
            Lifecycle::Running { scene, .. } => scene.try_borrow().ok().map(|scene| f(scene.graphics())),
            Lifecycle::Stopped => None,
        }
    }

    pub fn frames_drawn(&self) -> u64 {
        match &self.lifecycle {
            Lifecycle::Running { draw_loop, .. } => draw_loop.frames_drawn(),
            _ => 0,
        }
    }
}

impl<G, V, S> Renderer for DebugRenderer<G, V, S>
where
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
    S: FrameScheduler<Frame = ()> + 'static,
{
    async fn start(&mut self) -> RenderResult<()> {
        let Some(mut scene) = self.lifecycle.begin_start()? else {
            return Ok(());
        };
        if let Err(err) = scene.place() {
            log::error!("[render] debug preview failed to start: {err}");
            scene.release();
            return Err(err);
        }

        let eye = self.eye;
        let scene = Rc::new(RefCell::new(scene));
        let frame_scene = Rc::clone(&scene);
        let draw_loop = DrawLoop::start(Rc::clone(&self.scheduler), move |timestamp, _| {
            let Ok(mut scene) = frame_scene.try_borrow_mut() else {
                return;
            };
            let view = debug_view(eye, scene.graphics().canvas_size());
            match scene.render_views(RenderTarget::Canvas, &[view]) {
                Ok(_) => {}
                Err(RenderError::Released) => {}
                Err(err) => warn_frame_error("debug", timestamp, &err),
            }
        });

        self.lifecycle = Lifecycle::Running { scene, draw_loop };
        log::info!("[render] debug preview started ({} eye)", self.eye);
        Ok(())
    }

    fn stop(&mut self) {
        self.lifecycle.stop();
    }

    fn state(&self) -> RendererState {
        self.lifecycle.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::software::SoftwareContext;
    use crate::video::{SharedFrame, StillFrame, VideoFrame};
    use crate::driver::ManualScheduler;
    use glam::Vec3;
    use pollster::block_on;

    #[test]
    fn debug_view_frames_unit_plane_at_unit_distance() {
        let view = debug_view(Eye::Left, [200, 100]);
        assert_eq!(view.viewport, Viewport::new(0, 0, 200, 100));
        let corner = view.projection.project_point3(Vec3::new(2.0, 1.0, -1.0));
        assert!((corner.x - 1.0).abs() < 1e-5);
        assert!((corner.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn start_without_video_fails_and_stops() {
        let scheduler = Rc::new(ManualScheduler::new());
        let mut renderer = DebugRenderer::new(
            Rc::clone(&scheduler),
            SoftwareContext::new(8, 8),
            SharedFrame::new(),
            PlayerConfig::default(),
        )
        .unwrap();

        let err = block_on(renderer.start()).unwrap_err();
        assert!(matches!(err, RenderError::VideoNotReady));
        assert_eq!(renderer.state(), RendererState::Stopped);
        assert_eq!(scheduler.pending_requests(), 0);
        assert!(matches!(block_on(renderer.start()), Err(RenderError::Stopped)));
    }

    #[test]
    fn lifecycle_transitions() {
        let scheduler = Rc::new(ManualScheduler::new());
        let video = StillFrame::new(VideoFrame::from_fn(4, 4, |_, _| [9, 9, 9, 255]).unwrap());
        let mut renderer =
            DebugRenderer::new(Rc::clone(&scheduler), SoftwareContext::new(8, 8), video, PlayerConfig::default())
                .unwrap();

        assert_eq!(renderer.eye(), Eye::Left);
        renderer.stop();
        assert_eq!(renderer.state(), RendererState::Constructed);

        block_on(renderer.start()).unwrap();
        block_on(renderer.start()).unwrap();
        assert_eq!(renderer.state(), RendererState::Running);
        assert_eq!(scheduler.pending_requests(), 1);

        scheduler.advance(16.0);
        assert_eq!(renderer.frames_drawn(), 1);
        assert_eq!(renderer.with_graphics(|g| g.draw_calls()), Some(1));

        renderer.stop();
        renderer.stop();
        assert_eq!(renderer.state(), RendererState::Stopped);
        assert_eq!(scheduler.pending_requests(), 0);
        assert!(renderer.with_graphics(|g| g.is_released()).is_none());
    }
}
