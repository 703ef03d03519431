//! CPU rasterizer behind [`GraphicsContext`].
//!
//! Small and exact rather than fast: nearest-texel sampling, perspective
//! correct texture coordinates, back-face culling and a `less` depth test,
//! which is enough to check what the renderers put on screen pixel by pixel.

use super::{DrawUniforms, GraphicsContext, MeshHandle, RenderError, RenderResult, RenderTarget, check_mesh};
use crate::primitive::Mesh;
use crate::video::VideoFrame;
use crate::vr::Viewport;
use glam::{Vec2, Vec3, Vec4};
use std::collections::HashMap;

const MIN_CLIP_W: f32 = 1e-5;

struct Surface {
    width: u32,
    height: u32,
    color: Vec<[u8; 4]>,
    depth: Vec<f32>,
}

impl Surface {
    fn new([width, height]: [u32; 2]) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            color: vec![[0, 0, 0, 0]; len],
            depth: vec![f32::INFINITY; len],
        }
    }

    fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// `viewport` intersected with the surface, as half-open pixel ranges.
    fn bounds(&self, viewport: Viewport) -> (i64, i64, i64, i64) {
        let x0 = i64::from(viewport.x).max(0);
        let y0 = i64::from(viewport.y).max(0);
        let x1 = (i64::from(viewport.x) + i64::from(viewport.width)).min(i64::from(self.width));
        let y1 = (i64::from(viewport.y) + i64::from(viewport.height)).min(i64::from(self.height));
        (x0, y0, x1, y1)
    }

    fn clear(&mut self, viewport: Viewport, color: [u8; 4]) {
        let (x0, y0, x1, y1) = self.bounds(viewport);
        for y in y0..y1 {
            for x in x0..x1 {
                let index = self.index(x as u32, y as u32);
                self.color[index] = color;
                self.depth[index] = f32::INFINITY;
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ClipVertex {
    position: Vec4,
    uv: Vec2,
}

impl ClipVertex {
    fn lerp(self, other: Self, t: f32) -> Self {
        Self {
            position: self.position.lerp(other.position, t),
            uv: self.uv.lerp(other.uv, t),
        }
    }
}

struct ScreenVertex {
    position: Vec2,
    depth: f32,
    inv_w: f32,
    uv_over_w: Vec2,
}

pub struct SoftwareContext {
    canvas: Surface,
    layers: HashMap<u64, Surface>,
    target: RenderTarget,
    viewport: Viewport,
    meshes: Vec<Mesh>,
    texture: Option<VideoFrame>,
    program_ready: bool,
    xr_supported: bool,
    xr_compatible: bool,
    released: bool,
    release_calls: u32,
    draw_calls: u64,
}

impl SoftwareContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Surface::new([width, height]),
            layers: HashMap::new(),
            target: RenderTarget::Canvas,
            viewport: Viewport::full([width, height]),
            meshes: Vec::new(),
            texture: None,
            program_ready: false,
            xr_supported: true,
            xr_compatible: false,
            released: false,
            release_calls: 0,
            draw_calls: 0,
        }
    }

    /// A context that refuses to become headset compatible.
    pub fn without_xr_support(mut self) -> Self {
        self.xr_supported = false;
        self
    }

    pub fn pixel(&self, target: RenderTarget, x: u32, y: u32) -> Option<[u8; 4]> {
        let surface = self.surface(target)?;
        (x < surface.width && y < surface.height).then(|| surface.color[surface.index(x, y)])
    }

    pub fn target_size(&self, target: RenderTarget) -> Option<[u32; 2]> {
        self.surface(target).map(Surface::size)
    }

    pub fn is_xr_compatible(&self) -> bool {
        self.xr_compatible
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// How many times `release` was called, including no-op repeats.
    pub fn release_calls(&self) -> u32 {
        self.release_calls
    }

    pub fn draw_calls(&self) -> u64 {
        self.draw_calls
    }

    fn surface(&self, target: RenderTarget) -> Option<&Surface> {
        match target {
            RenderTarget::Canvas => Some(&self.canvas),
            RenderTarget::Layer(layer) => self.layers.get(&layer.id),
        }
    }

    fn bound_surface(&mut self) -> RenderResult<&mut Surface> {
        match self.target {
            RenderTarget::Canvas => Ok(&mut self.canvas),
            RenderTarget::Layer(layer) => self
                .layers
                .get_mut(&layer.id)
                .ok_or_else(|| RenderError::Backend(format!("layer {} has no framebuffer", layer.id))),
        }
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.released {
            Err(RenderError::Released)
        } else {
            Ok(())
        }
    }
}

impl GraphicsContext for SoftwareContext {
    fn label(&self) -> &'static str {
        "Software Context"
    }

    fn canvas_size(&self) -> [u32; 2] {
        self.canvas.size()
    }

    fn compile_program(&mut self) -> RenderResult<()> {
        self.ensure_live()?;
        self.program_ready = true;
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> RenderResult<MeshHandle> {
        self.ensure_live()?;
        check_mesh(mesh)?;
        self.meshes.push(mesh.clone());
        Ok(MeshHandle(self.meshes.len() as u64 - 1))
    }

    async fn make_xr_compatible(&mut self) -> RenderResult<()> {
        self.ensure_live()?;
        if !self.xr_supported {
            return Err(RenderError::XrIncompatible(
                "software context was created without headset support".into(),
            ));
        }
        self.xr_compatible = true;
        Ok(())
    }

    fn bind_target(&mut self, target: RenderTarget) -> RenderResult<()> {
        self.ensure_live()?;
        if let RenderTarget::Layer(layer) = target {
            if !self.xr_compatible {
                return Err(RenderError::XrIncompatible(
                    "layer bound before the context was made compatible".into(),
                ));
            }
            let stale = self
                .layers
                .get(&layer.id)
                .is_none_or(|surface| surface.size() != layer.size());
            if stale {
                self.layers.insert(layer.id, Surface::new(layer.size()));
            }
        }
        self.target = target;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn clear(&mut self, color: [f32; 4]) -> RenderResult<()> {
        self.ensure_live()?;
        let color = color.map(|channel| (channel.clamp(0.0, 1.0) * 255.0).round() as u8);
        let viewport = self.viewport;
        self.bound_surface()?.clear(viewport, color);
        Ok(())
    }

    fn update_texture(&mut self, frame: &VideoFrame) -> RenderResult<()> {
        self.ensure_live()?;
        self.texture = Some(frame.clone());
        Ok(())
    }

    fn draw(&mut self, mesh: MeshHandle, uniforms: &DrawUniforms) -> RenderResult<()> {
        self.ensure_live()?;
        if !self.program_ready {
            return Err(RenderError::Backend("draw issued before the program was compiled".into()));
        }
        let texture = self
            .texture
            .clone()
            .ok_or_else(|| RenderError::Backend("draw issued without a video texture".into()))?;
        let mesh_index = mesh.0 as usize;
        if mesh_index >= self.meshes.len() {
            return Err(RenderError::Backend(format!("unknown mesh handle {}", mesh.0)));
        }

        let mvp = uniforms.model_view_projection();
        let viewport = self.viewport;
        let vertices: Vec<ClipVertex> = {
            let mesh = &self.meshes[mesh_index];
            mesh.positions
                .iter()
                .zip(&mesh.uvs)
                .map(|(position, uv)| ClipVertex {
                    position: mvp * Vec3::from(*position).extend(1.0),
                    uv: uniforms.tex_transform.apply(Vec2::from(*uv)),
                })
                .collect()
        };
        let triangles = self.meshes[mesh_index].triangles.clone();

        let surface = self.bound_surface()?;
        for triangle in triangles {
            let polygon = triangle.map(|index| vertices[index as usize]).to_vec();
            let polygon = clip_polygon(polygon, |v| v.position.w - MIN_CLIP_W);
            // depth range [0, 1]
            let polygon = clip_polygon(polygon, |v| v.position.z);
            let polygon = clip_polygon(polygon, |v| v.position.w - v.position.z);
            if polygon.len() < 3 {
                continue;
            }

            let screen: Vec<ScreenVertex> = polygon
                .iter()
                .map(|vertex| to_screen(vertex, viewport))
                .collect();
            for i in 1..screen.len() - 1 {
                rasterize(surface, viewport, &texture, [&screen[0], &screen[i], &screen[i + 1]]);
            }
        }

        self.draw_calls += 1;
        Ok(())
    }

    fn release(&mut self) {
        self.release_calls += 1;
        if self.released {
            return;
        }
        self.released = true;
        self.meshes.clear();
        self.texture = None;
        self.layers.clear();
        self.program_ready = false;
    }
}

/// Sutherland–Hodgman against one plane; keeps the side where `distance >= 0`.
fn clip_polygon(polygon: Vec<ClipVertex>, distance: impl Fn(&ClipVertex) -> f32) -> Vec<ClipVertex> {
    if polygon.is_empty() {
        return polygon;
    }
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for (i, &current) in polygon.iter().enumerate() {
        let next = polygon[(i + 1) % polygon.len()];
        let d_current = distance(&current);
        let d_next = distance(&next);
        if d_current >= 0.0 {
            out.push(current);
        }
        if (d_current >= 0.0) != (d_next >= 0.0) {
            let t = d_current / (d_current - d_next);
            out.push(current.lerp(next, t));
        }
    }
    out
}

fn to_screen(vertex: &ClipVertex, viewport: Viewport) -> ScreenVertex {
    let inv_w = 1.0 / vertex.position.w;
    let ndc = vertex.position.truncate() * inv_w;
    ScreenVertex {
        position: Vec2::new(
            viewport.x as f32 + (ndc.x + 1.0) * 0.5 * viewport.width as f32,
            viewport.y as f32 + (1.0 - ndc.y) * 0.5 * viewport.height as f32,
        ),
        depth: ndc.z,
        inv_w,
        uv_over_w: vertex.uv * inv_w,
    }
}

fn edge(a: Vec2, b: Vec2, p: Vec2) -> f32 {
    (b - a).perp_dot(p - a)
}

fn rasterize(surface: &mut Surface, viewport: Viewport, texture: &VideoFrame, [a, b, c]: [&ScreenVertex; 3]) {
    let area = edge(a.position, b.position, c.position);
    // counter-clockwise in NDC is clockwise once y points down
    if area >= 0.0 {
        return;
    }

    let (x0, y0, x1, y1) = surface.bounds(viewport);
    let min = a.position.min(b.position).min(c.position);
    let max = a.position.max(b.position).max(c.position);
    let x_start = (min.x.floor() as i64).max(x0);
    let x_end = (max.x.ceil() as i64).min(x1);
    let y_start = (min.y.floor() as i64).max(y0);
    let y_end = (max.y.ceil() as i64).min(y1);

    for y in y_start..y_end {
        for x in x_start..x_end {
            let p = Vec2::new(x as f32 + 0.5, y as f32 + 0.5);
            let wa = edge(b.position, c.position, p) / area;
            let wb = edge(c.position, a.position, p) / area;
            let wc = edge(a.position, b.position, p) / area;
            if wa < 0.0 || wb < 0.0 || wc < 0.0 {
                continue;
            }

            let depth = wa * a.depth + wb * b.depth + wc * c.depth;
            let index = surface.index(x as u32, y as u32);
            if depth >= surface.depth[index] {
                continue;
            }

            let inv_w = wa * a.inv_w + wb * b.inv_w + wc * c.inv_w;
            let uv = (a.uv_over_w * wa + b.uv_over_w * wb + c.uv_over_w * wc) / inv_w;
            surface.depth[index] = depth;
            surface.color[index] = texture.sample_nearest(uv);
        }
    }
}
