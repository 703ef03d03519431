//! Headset rendering driven by an immersive session's frame loop.

use super::{
    GraphicsContext, Lifecycle, RenderError, RenderResult, RenderTarget, Renderer, RendererState,
    VideoScene, warn_frame_error,
};
use crate::config::PlayerConfig;
use crate::driver::{DrawLoop, FrameScheduler};
use crate::video::VideoSource;
use crate::vr::{ImmersiveSession, PoseSource, ReferenceSpace, ReferenceSpaceKind, RenderStateUpdate};
use std::cell::RefCell;
use std::rc::Rc;

pub struct VrRenderer<S, G, V>
where
    S: ImmersiveSession + 'static,
    <S as FrameScheduler>::Frame: 'static,
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
{
    session: Rc<S>,
    lifecycle: Lifecycle<G, V, S>,
    space: Option<ReferenceSpace>,
}

impl<S, G, V> VrRenderer<S, G, V>
where
    S: ImmersiveSession + 'static,
    <S as FrameScheduler>::Frame: 'static,
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
{
    pub fn new(session: Rc<S>, graphics: G, video: V, config: PlayerConfig) -> RenderResult<Self> {
        let scene = VideoScene::new(graphics, video, config)?;
        Ok(Self {
            session,
            lifecycle: Lifecycle::Constructed(scene),
            space: None,
        })
    }

    pub fn session(&self) -> &Rc<S> {
        &self.session
    }

    /// The reference space poses are requested in, once started.
    pub fn reference_space(&self) -> Option<ReferenceSpace> {
        self.space
    }

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

    async fn prepare(&self, scene: &mut VideoScene<G, V>) -> RenderResult<ReferenceSpace> {
        scene.graphics_mut().make_xr_compatible().await?;

        let layer = self.session.create_layer()?;
        self.session
            .update_render_state(RenderStateUpdate {
                base_layer: Some(layer),
                ..Default::default()
            })
            .await?;
        log::debug!(
            "[vr] {} base layer {} ({}x{})",
            self.session.label(),
            layer.id,
            layer.width,
            layer.height
        );

        scene.place()?;
        let space = self
            .session
            .request_reference_space(ReferenceSpaceKind::Local)
            .await?;
        Ok(space)
    }
}

impl<S, G, V> Renderer for VrRenderer<S, G, V>
where
    S: ImmersiveSession + 'static,
    <S as FrameScheduler>::Frame: 'static,
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
{
    async fn start(&mut self) -> RenderResult<()> {
        let Some(mut scene) = self.lifecycle.begin_start()? else {
            return Ok(());
        };
        let space = match self.prepare(&mut scene).await {
            Ok(space) => space,
            Err(err) => {
                log::error!("[vr] {} failed to start: {err}", self.session.label());
                scene.release();
                return Err(err);
            }
        };

        let scene = Rc::new(RefCell::new(scene));
        let frame_scene = Rc::clone(&scene);
        let session = Rc::clone(&self.session);
        let draw_loop = DrawLoop::start(Rc::clone(&self.session), move |timestamp, frame: &S::Frame| {
            let Some(layer) = session.render_state().base_layer else {
                log::trace!("[vr] no base layer at {timestamp:.1}ms; skipping frame");
                return;
            };
            let Some(pose) = frame.viewer_pose(&space) else {
                log::trace!("[vr] no viewer pose at {timestamp:.1}ms; skipping frame");
                return;
            };
            let Ok(mut scene) = frame_scene.try_borrow_mut() else {
                return;
            };
            match scene.render_views(RenderTarget::Layer(layer), &pose.views) {
                Ok(_) | Err(RenderError::Released) => {}
                Err(err) => warn_frame_error("vr", timestamp, &err),
            }
        });

        self.space = Some(space);
        self.lifecycle = Lifecycle::Running { scene, draw_loop };
        log::info!("[vr] rendering into {}", self.session.label());
        Ok(())
    }

    fn stop(&mut self) {
        self.lifecycle.stop();
    }

    fn state(&self) -> RendererState {
        self.lifecycle.state()
    }
}

/// Builds a headset renderer for an established session and starts it.
pub async fn play<S, G, V>(
    session: Rc<S>,
    graphics: G,
    video: V,
    config: PlayerConfig,
) -> RenderResult<VrRenderer<S, G, V>>
where
    S: ImmersiveSession + 'static,
    <S as FrameScheduler>::Frame: 'static,
    G: GraphicsContext + 'static,
    V: VideoSource + 'static,
{
    let mut renderer = VrRenderer::new(session, graphics, video, config)?;
    renderer.start().await?;
    Ok(renderer)
}
