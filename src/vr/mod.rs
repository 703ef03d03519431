pub mod simulated;

pub use simulated::SimulatedSession;

use crate::config::Eye;
use crate::driver::FrameScheduler;
use glam::Mat4;
use std::fmt;

/// Pixel rectangle inside a render target, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn full(size: [u32; 2]) -> Self {
        Self::new(0, 0, size[0], size[1])
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

/// One eye's camera for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub eye: Eye,
    /// Inverse of the eye's transform in the reference space.
    pub view: Mat4,
    pub projection: Mat4,
    pub viewport: Viewport,
}

/// Host-reported pose for one presented frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewerPose {
    pub transform: Mat4,
    pub views: Vec<EyeView>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceSpaceKind {
    Viewer,
    Local,
    LocalFloor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceSpace {
    pub id: u64,
    pub kind: ReferenceSpaceKind,
}

/// The session's drawable layer, created against the graphics context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XrLayer {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

impl XrLayer {
    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub base_layer: Option<XrLayer>,
    pub depth_near: f32,
    pub depth_far: f32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            base_layer: None,
            depth_near: 0.1,
            depth_far: 1000.0,
        }
    }
}

/// Fields left as `None` keep their current value.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderStateUpdate {
    pub base_layer: Option<XrLayer>,
    pub depth_near: Option<f32>,
    pub depth_far: Option<f32>,
}

/// What the host hands to a session frame callback.
pub trait PoseSource {
    /// `None` while tracking is lost or the space is unknown to this frame.
    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose>;
}

/// An already-established immersive session. Its `FrameScheduler` side is
/// the session's own frame request mechanism.
#[allow(async_fn_in_trait)]
pub trait ImmersiveSession: FrameScheduler<Frame: PoseSource> {
    fn label(&self) -> &'static str;

    fn render_state(&self) -> RenderState;

    fn create_layer(&self) -> VrResult<XrLayer>;

    async fn update_render_state(&self, update: RenderStateUpdate) -> VrResult<()>;

    async fn request_reference_space(&self, kind: ReferenceSpaceKind) -> VrResult<ReferenceSpace>;
}

#[derive(Debug)]
pub struct VrError {
    reason: String,
}

impl VrError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for VrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

impl std::error::Error for VrError {}

pub type VrResult<T> = Result<T, VrError>;
