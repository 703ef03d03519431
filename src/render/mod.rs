//! Frame rendering shared by the debug preview and the headset renderer.
//!
//! Both renderers hold a [`VideoScene`]: the compiled program, the uploaded
//! mesh, the per-eye texture transforms and (once started) the model matrix.
//! They differ only in where views come from and which target they draw to.

pub mod debug;
pub mod software;
pub mod vr;
#[cfg(feature = "render-wgpu")]
pub mod wgpu_backend;

pub use debug::DebugRenderer;
pub use software::SoftwareContext;
pub use vr::{VrRenderer, play};

use crate::config::PlayerConfig;
use crate::driver::{DrawLoop, FrameScheduler};
use crate::layout::{self, EyeTransforms, TexCoordTransform};
use crate::primitive::{self, Mesh, MeshError};
use crate::projection;
use crate::video::{VideoFrame, VideoSource};
use crate::vr::{EyeView, Viewport, VrError, XrLayer};
use glam::Mat4;
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("graphics backend failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Mesh(#[from] MeshError),
    #[error("immersive session error: {0}")]
    Vr(#[from] VrError),
    #[error("video has no decoded frame yet")]
    VideoNotReady,
    #[error("graphics context cannot render for the headset: {0}")]
    XrIncompatible(String),
    #[error("renderer was stopped; construct a new one to play again")]
    Stopped,
    #[error("graphics resources were already released")]
    Released,
    #[error("scene was drawn before its model matrix was placed")]
    NotPlaced,
}

pub type RenderResult<T> = Result<T, RenderError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The window or canvas the context was created for.
    Canvas,
    /// A headset layer's framebuffer.
    Layer(XrLayer),
}

/// Everything the video program reads for one draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawUniforms {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub tex_transform: TexCoordTransform,
}

impl DrawUniforms {
    pub fn model_view_projection(&self) -> Mat4 {
        self.projection * self.view * self.model
    }
}

/// The graphics operations the renderers need and nothing more.
///
/// Implementations: [`SoftwareContext`] rasterizes on the CPU, and
/// `wgpu_backend::WgpuContext` (feature `render-wgpu`) draws offscreen on a GPU.
#[allow(async_fn_in_trait)]
pub trait GraphicsContext {
    fn label(&self) -> &'static str;

    fn canvas_size(&self) -> [u32; 2];

    /// Builds the single video program shared by every format.
    fn compile_program(&mut self) -> RenderResult<()>;

    fn upload_mesh(&mut self, mesh: &Mesh) -> RenderResult<MeshHandle>;

    /// Fails with [`RenderError::XrIncompatible`] when the context cannot feed
    /// a headset.
    async fn make_xr_compatible(&mut self) -> RenderResult<()>;

    fn bind_target(&mut self, target: RenderTarget) -> RenderResult<()>;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Clears colour and depth inside the current viewport only.
    fn clear(&mut self, color: [f32; 4]) -> RenderResult<()>;

    fn update_texture(&mut self, frame: &VideoFrame) -> RenderResult<()>;

    fn draw(&mut self, mesh: MeshHandle, uniforms: &DrawUniforms) -> RenderResult<()>;

    /// Frees every resource. Calling it again does nothing.
    fn release(&mut self);
}

/// Scene state shared by both renderers.
pub struct VideoScene<G: GraphicsContext, V: VideoSource> {
    graphics: G,
    video: V,
    config: PlayerConfig,
    mesh: MeshHandle,
    eyes: EyeTransforms,
    model: Option<Mat4>,
    released: bool,
}

impl<G: GraphicsContext, V: VideoSource> VideoScene<G, V> {
    /// Compiles the program and uploads the mesh for `config.format`. On
    /// failure the context is released before the error is returned.
    pub fn new(mut graphics: G, video: V, config: PlayerConfig) -> RenderResult<Self> {
        let mesh = match Self::prepare(&mut graphics, &config) {
            Ok(mesh) => mesh,
            Err(err) => {
                log::error!("[render] scene setup on {} failed: {err}", graphics.label());
                graphics.release();
                return Err(err);
            }
        };

        Ok(Self {
            graphics,
            video,
            eyes: layout::tex_coord_transforms(config.layout, config.flip_layout),
            config,
            mesh,
            model: None,
            released: false,
        })
    }

    fn prepare(graphics: &mut G, config: &PlayerConfig) -> RenderResult<MeshHandle> {
        graphics.compile_program()?;
        let mesh = primitive::generate(config.format, config.segments)?;
        graphics.upload_mesh(&mesh)
    }

    /// Computes the model matrix from the video's current dimensions. A
    /// source reporting a zero extent has no metadata yet.
    pub fn place(&mut self) -> RenderResult<Mat4> {
        let (width, height) = self
            .video
            .dimensions()
            .filter(|&(width, height)| width > 0 && height > 0)
            .ok_or(RenderError::VideoNotReady)?;
        let aspect = layout::aspect_ratio(self.config.layout, width, height);
        let model = projection::model_matrix_with(self.config.format, aspect, &self.config.screen);
        log::debug!(
            "[render] placed {} geometry for {width}x{height} {} video (aspect {aspect:.3})",
            self.config.format,
            self.config.layout
        );
        self.model = Some(model);
        Ok(model)
    }

    /// Draws every view into `target`. Returns `Ok(false)` without touching
    /// the target when no video frame is available yet.
    pub fn render_views(&mut self, target: RenderTarget, views: &[EyeView]) -> RenderResult<bool> {
        if self.released {
            return Err(RenderError::Released);
        }
        let model = self.model.ok_or(RenderError::NotPlaced)?;
        let Some(frame) = self.video.current_frame() else {
            log::trace!("[render] no video frame yet; skipping draw");
            return Ok(false);
        };

        self.graphics.bind_target(target)?;
        self.graphics.update_texture(&frame)?;
        for view in views {
            self.graphics.set_viewport(view.viewport);
            self.graphics.clear(self.config.clear_color)?;
            let uniforms = DrawUniforms {
                model,
                view: view.view,
                projection: view.projection,
                tex_transform: self.eyes.for_eye(view.eye),
            };
            self.graphics.draw(self.mesh, &uniforms)?;
        }
        Ok(true)
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.graphics.release();
        log::debug!("[render] released {} resources", self.graphics.label());
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn graphics(&self) -> &G {
        &self.graphics
    }

    pub fn graphics_mut(&mut self) -> &mut G {
        &mut self.graphics
    }

}

impl<G: GraphicsContext, V: VideoSource> Drop for VideoScene<G, V> {
    fn drop(&mut self) {
        self.release();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Constructed,
    Running,
    Stopped,
}

/// The start/stop contract both renderers implement.
#[allow(async_fn_in_trait)]
pub trait Renderer {
    /// Acquires resources and enters the draw loop. Calling it while running
    /// does nothing; calling it after `stop` fails with [`RenderError::Stopped`].
    async fn start(&mut self) -> RenderResult<()>;

    /// Cancels the draw loop and releases resources. Safe to call repeatedly
    /// and before `start`.
    fn stop(&mut self);

    fn state(&self) -> RendererState;
}

pub(crate) type SharedScene<G, V> = Rc<RefCell<VideoScene<G, V>>>;

pub(crate) enum Lifecycle<G, V, S>
where
    G: GraphicsContext,
    V: VideoSource,
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    Constructed(VideoScene<G, V>),
    Running {
        scene: SharedScene<G, V>,
        draw_loop: DrawLoop<S>,
    },
    Stopped,
}

impl<G, V, S> Lifecycle<G, V, S>
where
    G: GraphicsContext,
    V: VideoSource,
    S: FrameScheduler + 'static,
    S::Frame: 'static,
{
    pub(crate) fn state(&self) -> RendererState {
        match self {
            Lifecycle::Constructed(_) => RendererState::Constructed,
            Lifecycle::Running { .. } => RendererState::Running,
            Lifecycle::Stopped => RendererState::Stopped,
        }
    }

    /// Hands out the scene for a fresh start, leaving `Stopped` behind so a
    /// failed setup cannot be retried. `Ok(None)` means already running.
    pub(crate) fn begin_start(&mut self) -> RenderResult<Option<VideoScene<G, V>>> {
        match std::mem::replace(self, Lifecycle::Stopped) {
            Lifecycle::Constructed(scene) => Ok(Some(scene)),
            running @ Lifecycle::Running { .. } => {
                *self = running;
                Ok(None)
            }
            Lifecycle::Stopped => Err(RenderError::Stopped),
        }
    }

    pub(crate) fn stop(&mut self) {
        match std::mem::replace(self, Lifecycle::Stopped) {
            constructed @ Lifecycle::Constructed(_) => *self = constructed,
            Lifecycle::Running { scene, draw_loop } => {
                draw_loop.stop();
                drop(draw_loop);
                match scene.try_borrow_mut() {
                    Ok(mut scene) => scene.release(),
                    // mid-frame: the scene releases itself once the frame lets go
                    Err(_) => log::warn!("[render] stop requested during a frame; deferring release"),
                }
                log::info!("[render] renderer stopped");
            }
            Lifecycle::Stopped => {}
        }
    }
}

/// Rejects meshes a backend cannot index safely.
pub(crate) fn check_mesh(mesh: &Mesh) -> RenderResult<()> {
    let count = mesh.vertex_count();
    if mesh.uvs.len() != count {
        return Err(RenderError::Backend(format!(
            "mesh has {count} positions but {} texture coordinates",
            mesh.uvs.len()
        )));
    }
    if let Some(index) = mesh.indices().find(|&index| index as usize >= count) {
        return Err(RenderError::Backend(format!(
            "mesh index {index} out of range for {count} vertices"
        )));
    }
    Ok(())
}

pub(crate) fn warn_frame_error(renderer: &str, timestamp: f64, err: &RenderError) {
    log::warn!("[render] {renderer} frame at {timestamp:.1}ms failed: {err}");
}
