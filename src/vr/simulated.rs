//! In-process stand-in for a headset runtime.
//!
//! Frames are dispatched by hand with [`SimulatedSession::advance`]. Tracking
//! loss, layer removal and unsupported reference spaces can be switched on
//! to exercise the renderer's recovery paths.

use super::{
    EyeView, ImmersiveSession, PoseSource, ReferenceSpace, ReferenceSpaceKind, RenderState,
    RenderStateUpdate, Viewport, ViewerPose, VrError, VrResult, XrLayer,
};
use crate::config::Eye;
use crate::driver::{FrameCallback, FrameQueue, FrameRequestId, FrameScheduler};
use glam::{Mat4, Vec3};
use std::cell::{Cell, RefCell};

/// Average human inter-pupillary distance in metres.
pub const DEFAULT_IPD: f32 = 0.063;

const DEFAULT_FOV_Y: f32 = std::f32::consts::FRAC_PI_2;

#[derive(Debug, Clone)]
pub struct SimulatedFrame {
    pose: Option<ViewerPose>,
    spaces: Vec<ReferenceSpace>,
}

impl PoseSource for SimulatedFrame {
    fn viewer_pose(&self, space: &ReferenceSpace) -> Option<ViewerPose> {
        if !self.spaces.contains(space) {
            return None;
        }
        self.pose.clone()
    }
}

pub struct SimulatedSession {
    queue: FrameQueue<SimulatedFrame>,
    eye_resolution: [u32; 2],
    ipd: f32,
    render_state: Cell<RenderState>,
    head: Cell<Mat4>,
    tracking: Cell<bool>,
    custom_views: RefCell<Option<Vec<EyeView>>>,
    supported_spaces: Vec<ReferenceSpaceKind>,
    granted_spaces: RefCell<Vec<ReferenceSpace>>,
    next_handle: Cell<u64>,
    cancelled: Cell<u64>,
}

impl SimulatedSession {
    pub fn new(eye_resolution: [u32; 2]) -> Self {
        Self {
            queue: FrameQueue::new(),
            eye_resolution,
            ipd: DEFAULT_IPD,
            render_state: Cell::new(RenderState::default()),
            head: Cell::new(Mat4::IDENTITY),
            tracking: Cell::new(true),
            custom_views: RefCell::new(None),
            supported_spaces: vec![
                ReferenceSpaceKind::Viewer,
                ReferenceSpaceKind::Local,
                ReferenceSpaceKind::LocalFloor,
            ],
            granted_spaces: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
            cancelled: Cell::new(0),
        }
    }

    pub fn with_ipd(mut self, ipd: f32) -> Self {
        self.ipd = ipd;
        self
    }

    pub fn with_supported_spaces(mut self, kinds: &[ReferenceSpaceKind]) -> Self {
        self.supported_spaces = kinds.to_vec();
        self
    }

    pub fn eye_resolution(&self) -> [u32; 2] {
        self.eye_resolution
    }

    /// Dispatches one presented frame to every pending callback.
    pub fn advance(&self, timestamp: f64) -> usize {
        self.queue.dispatch(timestamp, || self.snapshot())
    }

    pub fn pending_requests(&self) -> usize {
        self.queue.len()
    }

    pub fn cancelled_requests(&self) -> u64 {
        self.cancelled.get()
    }

    pub fn set_tracking(&self, tracking: bool) {
        self.tracking.set(tracking);
    }

    pub fn set_head_transform(&self, transform: Mat4) {
        self.head.set(transform);
    }

    /// Replaces the default stereo pair with an arbitrary set of views.
    pub fn set_views(&self, views: Vec<EyeView>) {
        *self.custom_views.borrow_mut() = Some(views);
    }

    pub fn detach_layer(&self) {
        let mut state = self.render_state.get();
        state.base_layer = None;
        self.render_state.set(state);
    }

    pub fn stereo_views(&self) -> Vec<EyeView> {
        let [width, height] = self.eye_resolution;
        let state = self.render_state.get();
        let projection = Mat4::perspective_rh(
            DEFAULT_FOV_Y,
            width as f32 / height.max(1) as f32,
            state.depth_near,
            state.depth_far,
        );
        let head = self.head.get();

        [(Eye::Left, -0.5, 0), (Eye::Right, 0.5, 1)]
            .into_iter()
            .map(|(eye, side, column)| {
                let eye_transform = head * Mat4::from_translation(Vec3::new(side * self.ipd, 0.0, 0.0));
                EyeView {
                    eye,
                    view: eye_transform.inverse(),
                    projection,
                    viewport: Viewport::new(column * width as i32, 0, width, height),
                }
            })
            .collect()
    }

    fn snapshot(&self) -> SimulatedFrame {
        let pose = self.tracking.get().then(|| ViewerPose {
            transform: self.head.get(),
            views: self
                .custom_views
                .borrow()
                .clone()
                .unwrap_or_else(|| self.stereo_views()),
        });
        SimulatedFrame {
            pose,
            spaces: self.granted_spaces.borrow().clone(),
        }
    }

    fn next_handle(&self) -> u64 {
        let handle = self.next_handle.get();
        self.next_handle.set(handle + 1);
        handle
    }
}

impl Default for SimulatedSession {
    fn default() -> Self {
        Self::new([1440, 1600])
    }
}

impl FrameScheduler for SimulatedSession {
    type Frame = SimulatedFrame;

    fn request_frame(&self, callback: FrameCallback<SimulatedFrame>) -> FrameRequestId {
        self.queue.push(callback)
    }

    fn cancel_frame(&self, request: FrameRequestId) {
        if self.queue.cancel(request) {
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

impl ImmersiveSession for SimulatedSession {
    fn label(&self) -> &'static str {
        "Simulated Session"
    }

    fn render_state(&self) -> RenderState {
        self.render_state.get()
    }

    fn create_layer(&self) -> VrResult<XrLayer> {
        let [width, height] = self.eye_resolution;
        if width == 0 || height == 0 {
            return Err(VrError::new(format!(
                "cannot create a layer for eye resolution {width}x{height}"
            )));
        }
        Ok(XrLayer {
            id: self.next_handle(),
            width: width * 2,
            height,
        })
    }

    async fn update_render_state(&self, update: RenderStateUpdate) -> VrResult<()> {
        let mut state = self.render_state.get();
        if let Some(layer) = update.base_layer {
            state.base_layer = Some(layer);
        }
        if let Some(near) = update.depth_near {
            state.depth_near = near;
        }
        if let Some(far) = update.depth_far {
            state.depth_far = far;
        }
        if state.depth_near <= 0.0 || state.depth_far <= state.depth_near {
            return Err(VrError::new(format!(
                "invalid depth range {}..{}",
                state.depth_near, state.depth_far
            )));
        }
        self.render_state.set(state);
        Ok(())
    }

    async fn request_reference_space(&self, kind: ReferenceSpaceKind) -> VrResult<ReferenceSpace> {
        if !self.supported_spaces.contains(&kind) {
            return Err(VrError::new(format!("reference space {kind:?} is not supported")));
        }
        let space = ReferenceSpace {
            id: self.next_handle(),
            kind,
        };
        self.granted_spaces.borrow_mut().push(space);
        Ok(space)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollster::block_on;

    #[test]
    fn stereo_views_split_the_layer() {
        let session = SimulatedSession::new([800, 900]);
        let layer = session.create_layer().unwrap();
        assert_eq!(layer.size(), [1600, 900]);

        let views = session.stereo_views();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].viewport, Viewport::new(0, 0, 800, 900));
        assert_eq!(views[1].viewport, Viewport::new(800, 0, 800, 900));

        // the left eye sits left of the head, so the world shifts right in its view
        let left_origin = views[0].view.transform_point3(Vec3::ZERO);
        assert!((left_origin.x - DEFAULT_IPD * 0.5).abs() < 1e-6);
    }

    #[test]
    fn zero_ipd_puts_both_eyes_at_the_head() {
        let session = SimulatedSession::new([64, 64]).with_ipd(0.0);
        let head = Mat4::from_translation(Vec3::new(0.0, 1.6, 0.0));
        session.set_head_transform(head);

        let views = session.stereo_views();
        assert_eq!(views[0].view, views[1].view);
        assert!(views[0].view.abs_diff_eq(head.inverse(), 1e-6));
        assert_eq!(session.snapshot().pose.map(|pose| pose.transform), Some(head));
    }

    #[test]
    fn poses_are_scoped_to_granted_spaces() {
        let session = SimulatedSession::default();
        let space = block_on(session.request_reference_space(ReferenceSpaceKind::Local)).unwrap();
        let frame = session.snapshot();
        assert!(frame.viewer_pose(&space).is_some());

        let stranger = ReferenceSpace {
            id: 999,
            kind: ReferenceSpaceKind::Local,
        };
        assert!(frame.viewer_pose(&stranger).is_none());

        session.set_tracking(false);
        assert!(session.snapshot().viewer_pose(&space).is_none());
    }

    #[test]
    fn rejects_unsupported_reference_space() {
        let session = SimulatedSession::default().with_supported_spaces(&[ReferenceSpaceKind::Viewer]);
        let err = block_on(session.request_reference_space(ReferenceSpaceKind::Local)).unwrap_err();
        assert!(err.to_string().contains("not supported"));
    }

    #[test]
    fn render_state_update_keeps_unspecified_fields() {
        let session = SimulatedSession::default();
        let layer = session.create_layer().unwrap();
        block_on(session.update_render_state(RenderStateUpdate {
            base_layer: Some(layer),
            ..Default::default()
        }))
        .unwrap();

        let state = session.render_state();
        assert_eq!(state.base_layer, Some(layer));
        assert_eq!(state.depth_near, RenderState::default().depth_near);

        session.detach_layer();
        assert!(session.render_state().base_layer.is_none());
    }
}
