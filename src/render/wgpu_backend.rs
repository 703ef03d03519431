//! Offscreen GPU implementation of [`GraphicsContext`].
//!
//! The canvas and every headset layer are plain RGBA8 textures with a depth
//! attachment. Each clear and draw is encoded and submitted on its own so
//! uniform writes stay ordered with the passes that read them.

use super::{DrawUniforms, GraphicsContext, MeshHandle, RenderError, RenderResult, RenderTarget, check_mesh};
use crate::primitive::Mesh;
use crate::video::VideoFrame;
use crate::vr::Viewport;
use pollster::block_on;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Vertex {
    position: [f32; 3],
    uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2];

    fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Uniforms {
    model_view_projection: [[f32; 4]; 4],
    tex_transform: [f32; 4],
}

struct OffscreenTarget {
    size: [u32; 2],
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: wgpu::TextureView,
}

impl OffscreenTarget {
    fn new(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let extent = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Video Depth Buffer"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        Self {
            size,
            color_view: color.create_view(&wgpu::TextureViewDescriptor::default()),
            depth_view: depth.create_view(&wgpu::TextureViewDescriptor::default()),
            color,
        }
    }

    fn contains(&self, viewport: Viewport) -> bool {
        viewport.x >= 0
            && viewport.y >= 0
            && viewport.x as u64 + u64::from(viewport.width) <= u64::from(self.size[0])
            && viewport.y as u64 + u64::from(viewport.height) <= u64::from(self.size[1])
    }

    fn covers(&self, viewport: Viewport) -> bool {
        viewport.x == 0 && viewport.y == 0 && [viewport.width, viewport.height] == self.size
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

struct VideoTexture {
    size: [u32; 2],
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

struct VideoPipeline {
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
}

struct ClearPipeline {
    pipeline: wgpu::RenderPipeline,
    color_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

pub struct WgpuContext {
    _instance: wgpu::Instance,
    _adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    canvas: OffscreenTarget,
    layers: HashMap<u64, OffscreenTarget>,
    target: RenderTarget,
    viewport: Viewport,
    video: Option<VideoPipeline>,
    clear: Option<ClearPipeline>,
    meshes: Vec<GpuMesh>,
    texture: Option<VideoTexture>,
    xr_compatible: bool,
    released: bool,
}

impl WgpuContext {
    /// Creates a device and an offscreen canvas of `width` x `height`.
    pub fn new(width: u32, height: u32) -> RenderResult<Self> {
        block_on(Self::initialize_async(width, height))
    }

    async fn initialize_async(width: u32, height: u32) -> RenderResult<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| RenderError::Backend("failed to find a compatible GPU adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Video Renderer Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                },
                None,
            )
            .await
            .map_err(|err| RenderError::Backend(format!("failed to create wgpu device: {err}")))?;

        log::info!("[render] wgpu adapter: {}", adapter.get_info().name);
        let canvas = OffscreenTarget::new(&device, [width, height], "Video Canvas");

        Ok(Self {
            _instance: instance,
            _adapter: adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            canvas,
            layers: HashMap::new(),
            target: RenderTarget::Canvas,
            viewport: Viewport::full([width, height]),
            video: None,
            clear: None,
            meshes: Vec::new(),
            texture: None,
            xr_compatible: false,
            released: false,
        })
    }

    /// Reads back `target` as tightly packed RGBA8 rows.
    pub fn capture(&self, target: RenderTarget) -> RenderResult<Vec<u8>> {
        self.ensure_live()?;
        let surface = self.surface(target)?;
        let [width, height] = surface.size;
        let unpadded = width as usize * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Video Capture Buffer"),
            size: (padded * height as usize) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Video Capture Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &surface.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| RenderError::Backend("capture buffer was never mapped".into()))?
            .map_err(|err| RenderError::Backend(format!("failed to map capture buffer: {err}")))?;

        let mut pixels = Vec::with_capacity(unpadded * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for row in mapped.chunks(padded) {
                pixels.extend_from_slice(&row[..unpadded]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }

    fn ensure_live(&self) -> RenderResult<()> {
        if self.released {
            Err(RenderError::Released)
        } else {
            Ok(())
        }
    }

    fn surface(&self, target: RenderTarget) -> RenderResult<&OffscreenTarget> {
        match target {
            RenderTarget::Canvas => Ok(&self.canvas),
            RenderTarget::Layer(layer) => self
                .layers
                .get(&layer.id)
                .ok_or_else(|| RenderError::Backend(format!("layer {} has no framebuffer", layer.id))),
        }
    }

    fn color_target() -> [Option<wgpu::ColorTargetState>; 1] {
        [Some(wgpu::ColorTargetState {
            format: COLOR_FORMAT,
            blend: Some(wgpu::BlendState::REPLACE),
            write_mask: wgpu::ColorWrites::ALL,
        })]
    }

    fn create_video_pipeline(&self) -> VideoPipeline {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Video Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/video.wgsl").into()),
        });

        let uniform_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Video Uniform Buffer"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let uniform_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Uniform Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Video Uniform Bind Group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let texture_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Video Texture Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Video Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Video Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Video Render Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[Vertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &Self::color_target(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        VideoPipeline {
            pipeline,
            uniform_buffer,
            uniform_bind_group,
            texture_layout,
            sampler,
        }
    }

    fn create_clear_pipeline(&self) -> ClearPipeline {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Viewport Clear Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/clear.wgsl").into()),
        });

        let color_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Viewport Clear Color"),
            size: std::mem::size_of::<[f32; 4]>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Viewport Clear Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Viewport Clear Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: color_buffer.as_entire_binding(),
            }],
        });

        let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Viewport Clear Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Viewport Clear Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &Self::color_target(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        ClearPipeline {
            pipeline,
            color_buffer,
            bind_group,
        }
    }

    fn begin_pass<'a>(
        encoder: &'a mut wgpu::CommandEncoder,
        surface: &'a OffscreenTarget,
        color: wgpu::LoadOp<wgpu::Color>,
        depth: wgpu::LoadOp<f32>,
    ) -> wgpu::RenderPass<'a> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Video Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &surface.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &surface.depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        })
    }

    fn apply_viewport(pass: &mut wgpu::RenderPass<'_>, viewport: Viewport) {
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_scissor_rect(viewport.x as u32, viewport.y as u32, viewport.width, viewport.height);
    }

    fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }

    fn checked_viewport(&self) -> RenderResult<Viewport> {
        let surface = self.surface(self.target)?;
        if !surface.contains(self.viewport) {
            return Err(RenderError::Backend(format!(
                "viewport {:?} lies outside the {}x{} target",
                self.viewport, surface.size[0], surface.size[1]
            )));
        }
        Ok(self.viewport)
    }
}

impl GraphicsContext for WgpuContext {
    fn label(&self) -> &'static str {
        "WGPU Context"
    }

    fn canvas_size(&self) -> [u32; 2] {
        self.canvas.size
    }

    fn compile_program(&mut self) -> RenderResult<()> {
        self.ensure_live()?;
        if self.video.is_none() {
            self.video = Some(self.create_video_pipeline());
            self.clear = Some(self.create_clear_pipeline());
            log::debug!("[render] compiled video and viewport clear pipelines");
        }
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: &Mesh) -> RenderResult<MeshHandle> {
        self.ensure_live()?;
        check_mesh(mesh)?;
        let vertices: Vec<Vertex> = mesh
            .positions
            .iter()
            .zip(&mesh.uvs)
            .map(|(&position, &uv)| Vertex { position, uv })
            .collect();
        let indices: Vec<u32> = mesh.indices().collect();

        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Video Mesh Vertices"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Video Mesh Indices"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });

        self.meshes.push(GpuMesh {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        });
        Ok(MeshHandle(self.meshes.len() as u64 - 1))
    }

    async fn make_xr_compatible(&mut self) -> RenderResult<()> {
        self.ensure_live()?;
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
                .is_none_or(|surface| surface.size != layer.size());
            if stale {
                let surface = OffscreenTarget::new(&self.device, layer.size(), "Headset Layer");
                self.layers.insert(layer.id, surface);
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
        let viewport = self.checked_viewport()?;
        let surface = self.surface(self.target)?;
        let mut encoder = self.encoder("Viewport Clear Encoder");

        if surface.covers(viewport) {
            let [r, g, b, a] = color.map(f64::from);
            let _pass = Self::begin_pass(
                &mut encoder,
                surface,
                wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                wgpu::LoadOp::Clear(1.0),
            );
        } else {
            let clear = self
                .clear
                .as_ref()
                .ok_or_else(|| RenderError::Backend("clear issued before the program was compiled".into()))?;
            self.queue.write_buffer(&clear.color_buffer, 0, bytemuck::bytes_of(&color));
            let mut pass = Self::begin_pass(&mut encoder, surface, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            Self::apply_viewport(&mut pass, viewport);
            pass.set_pipeline(&clear.pipeline);
            pass.set_bind_group(0, &clear.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn update_texture(&mut self, frame: &VideoFrame) -> RenderResult<()> {
        self.ensure_live()?;
        let video = self
            .video
            .as_ref()
            .ok_or_else(|| RenderError::Backend("texture uploaded before the program was compiled".into()))?;
        let size = [frame.width(), frame.height()];
        let extent = wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        };

        if self.texture.as_ref().is_none_or(|texture| texture.size != size) {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Video Texture"),
                size: extent,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: COLOR_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Video Texture Bind Group"),
                layout: &video.texture_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::Sampler(&video.sampler),
                    },
                ],
            });
            log::debug!("[render] allocated {}x{} video texture", size[0], size[1]);
            self.texture = Some(VideoTexture {
                size,
                texture,
                bind_group,
            });
        }

        if let Some(texture) = &self.texture {
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                frame.pixels(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * size[0]),
                    rows_per_image: Some(size[1]),
                },
                extent,
            );
        }
        Ok(())
    }

    fn draw(&mut self, mesh: MeshHandle, uniforms: &DrawUniforms) -> RenderResult<()> {
        self.ensure_live()?;
        let viewport = self.checked_viewport()?;
        let video = self
            .video
            .as_ref()
            .ok_or_else(|| RenderError::Backend("draw issued before the program was compiled".into()))?;
        let texture = self
            .texture
            .as_ref()
            .ok_or_else(|| RenderError::Backend("draw issued without a video texture".into()))?;
        let gpu_mesh = self
            .meshes
            .get(mesh.0 as usize)
            .ok_or_else(|| RenderError::Backend(format!("unknown mesh handle {}", mesh.0)))?;
        let surface = self.surface(self.target)?;

        let data = Uniforms {
            model_view_projection: uniforms.model_view_projection().to_cols_array_2d(),
            tex_transform: uniforms.tex_transform.to_array(),
        };
        self.queue.write_buffer(&video.uniform_buffer, 0, bytemuck::bytes_of(&data));

        let mut encoder = self.encoder("Video Draw Encoder");
        {
            let mut pass = Self::begin_pass(&mut encoder, surface, wgpu::LoadOp::Load, wgpu::LoadOp::Load);
            Self::apply_viewport(&mut pass, viewport);
            pass.set_pipeline(&video.pipeline);
            pass.set_bind_group(0, &video.uniform_bind_group, &[]);
            pass.set_bind_group(1, &texture.bind_group, &[]);
            pass.set_vertex_buffer(0, gpu_mesh.vertex_buffer.slice(..));
            pass.set_index_buffer(gpu_mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..gpu_mesh.index_count, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.meshes.clear();
        self.layers.clear();
        self.texture = None;
        self.video = None;
        self.clear = None;
    }
}
