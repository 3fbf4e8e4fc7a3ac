// SPDX-License-Identifier: GPL-3.0-only

//! GPU filter renderer for the virtual camera
//!
//! Draws the latest frame through the color filter shader:
//!
//! 1. Upload the RGBA frame as a texture (vertically flipped)
//! 2. If a capture is pending, render into an off-screen target of the frame
//!    size and read it back as packed RGB for the device sink
//! 3. Render to the visible surface, letterboxed to its aspect ratio
//!
//! All GPU objects live in a resource set tagged with the epoch of the
//! context they were created on. `ensure_*` calls rebuild whatever is missing
//! or stale, so a context can be destroyed and recreated at any time.

use crate::backends::camera::types::CameraFrame;
use crate::diagnostics::Diagnostics;
use crate::errors::{VcamError, VcamResult};
use crate::gpu::GpuContext;
use crate::shaders::{FILTER_RENDER_SHADER, FilterParams, QUAD_VERTICES, QuadVertex};
use image::{RgbImage, RgbaImage};
use std::borrow::Cow;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

use super::filters::{FilterSelection, FilterType, STRENGTH_EPSILON, clamp_strength};

/// Format of the input texture and the off-screen capture target
const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Letterbox scale for drawing a `frame` sized image into a `target`
///
/// The quad position is divided by the returned factors, so the larger
/// factor shrinks that axis and leaves black bars. Degenerate sizes map
/// to no scaling.
pub fn aspect_scale(frame: (u32, u32), target: (u32, u32)) -> [f32; 2] {
    if frame.0 == 0 || frame.1 == 0 || target.0 == 0 || target.1 == 0 {
        return [1.0, 1.0];
    }

    let frame_aspect = frame.0 as f32 / frame.1 as f32;
    let target_aspect = target.0 as f32 / target.1 as f32;

    if frame_aspect > target_aspect {
        [1.0, frame_aspect / target_aspect]
    } else {
        [target_aspect / frame_aspect, 1.0]
    }
}

/// A texture view the renderer draws the visible output into
pub struct RenderSurface<'a> {
    pub view: &'a wgpu::TextureView,
    pub format: wgpu::TextureFormat,
    pub width: u32,
    pub height: u32,
}

/// Off-screen texture used as the visible surface when there is no window
pub struct PreviewSurface {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    epoch: u64,
}

impl PreviewSurface {
    pub fn new(context: &GpuContext, width: u32, height: u32) -> Self {
        let texture = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("filtercam_preview_surface"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: FRAME_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            epoch: context.epoch(),
        }
    }

    /// Epoch of the context this surface was created on
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn surface(&self) -> RenderSurface<'_> {
        RenderSurface {
            view: &self.view,
            format: FRAME_FORMAT,
            width: self.texture.width(),
            height: self.texture.height(),
        }
    }
}

/// Shader module, pipelines and uniforms
struct Program {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    module: wgpu::ShaderModule,
    sampler: wgpu::Sampler,
    capture_pipeline: wgpu::RenderPipeline,
    surface_pipeline: Option<(wgpu::TextureFormat, wgpu::RenderPipeline)>,
    capture_uniforms: wgpu::Buffer,
    surface_uniforms: wgpu::Buffer,
}

/// Uploaded frame plus the bind groups sampling it
struct FrameTexture {
    texture: wgpu::Texture,
    capture_bind_group: wgpu::BindGroup,
    surface_bind_group: wgpu::BindGroup,
}

/// Capture render target and its readback buffer
struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    staging: wgpu::Buffer,
    padded_bytes_per_row: u32,
}

/// Every GPU object the renderer owns, all from the same context
#[derive(Default)]
struct GpuResources {
    epoch: Option<u64>,
    program: Option<Program>,
    vertex_buffer: Option<wgpu::Buffer>,
    texture: Option<FrameTexture>,
    offscreen: Option<OffscreenTarget>,
    /// Capture target size that could not be allocated on this context
    target_failed: Option<(u32, u32)>,
    /// Surface format whose pipeline could not be built on this context
    surface_failed: Option<wgpu::TextureFormat>,
}

impl GpuResources {
    fn is_empty(&self) -> bool {
        self.program.is_none()
            && self.vertex_buffer.is_none()
            && self.texture.is_none()
            && self.offscreen.is_none()
    }
}

/// Run `build` inside a validation error scope
fn scoped<T>(device: &wgpu::Device, build: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(error.to_string()),
        None => Ok(value),
    }
}

fn create_render_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("filtercam_filter_pipeline"),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &[QuadVertex::layout()],
            compilation_options: Default::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleStrip,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: Default::default(),
        }),
        multiview: None,
        cache: None,
    })
}

/// Renders filtered frames to a surface and captures them for the sink
pub struct GpuFilterRenderer {
    context: Option<GpuContext>,
    resources: GpuResources,
    shader_source: Cow<'static, str>,
    /// Program build failed on the current context; retried after recreation
    program_failed: bool,
    selection: FilterSelection,
    frame: Option<RgbaImage>,
    texture_dirty: bool,
    capture_pending: bool,
    needs_redraw: bool,
    diagnostics: Diagnostics,
}

impl GpuFilterRenderer {
    /// Renderer without a context; nothing is drawn until one is attached
    pub fn new(diagnostics: Diagnostics) -> Self {
        Self::with_shader_source(FILTER_RENDER_SHADER, diagnostics)
    }

    pub(crate) fn with_shader_source(
        source: impl Into<Cow<'static, str>>,
        diagnostics: Diagnostics,
    ) -> Self {
        Self {
            context: None,
            resources: GpuResources::default(),
            shader_source: source.into(),
            program_failed: false,
            selection: FilterSelection::default(),
            frame: None,
            texture_dirty: false,
            capture_pending: false,
            needs_redraw: false,
            diagnostics,
        }
    }

    pub fn selection(&self) -> FilterSelection {
        self.selection
    }

    pub fn needs_redraw(&self) -> bool {
        self.needs_redraw
    }

    pub fn capture_pending(&self) -> bool {
        self.capture_pending
    }

    pub fn has_context(&self) -> bool {
        self.context.is_some()
    }

    pub fn context(&self) -> Option<&GpuContext> {
        self.context.as_ref()
    }

    /// Any GPU object is currently alive
    pub fn has_gpu_resources(&self) -> bool {
        !self.resources.is_empty()
    }

    /// Size of the latest submitted frame
    pub fn frame_size(&self) -> Option<(u32, u32)> {
        self.frame.as_ref().map(|frame| frame.dimensions())
    }

    pub fn set_filter(&mut self, filter: FilterType) {
        if self.selection.filter == filter {
            return;
        }
        debug!(%filter, "Filter changed");
        self.selection.filter = filter;
        self.needs_redraw = true;
    }

    pub fn set_strength(&mut self, strength: f32) {
        let strength = clamp_strength(strength);
        if (strength - self.selection.strength).abs() <= STRENGTH_EPSILON {
            return;
        }
        self.selection.strength = strength;
        self.needs_redraw = true;
    }

    /// Queue a frame for upload and capture; replaces any frame still pending
    ///
    /// Frames that fail validation are dropped without touching any state.
    pub fn submit_frame(&mut self, frame: &CameraFrame) {
        let Ok(rgba) = frame.to_rgba() else {
            return;
        };
        self.submit_rgba(rgba);
    }

    /// Same as [`Self::submit_frame`] for an already normalized image
    pub fn submit_rgba(&mut self, image: RgbaImage) {
        if image.width() == 0 || image.height() == 0 {
            return;
        }
        self.frame = Some(image);
        self.texture_dirty = true;
        self.capture_pending = true;
        self.needs_redraw = true;
    }

    /// Attach a freshly created context and build the static resources
    pub fn on_context_created(&mut self, context: GpuContext) {
        info!(
            epoch = context.epoch(),
            adapter = %context.info.adapter_name,
            "Filter renderer attached to GPU context"
        );

        self.resources = GpuResources::default();
        self.context = Some(context.clone());
        self.program_failed = false;
        self.texture_dirty = self.frame.is_some();
        self.needs_redraw = true;

        self.sync_epoch(&context);
        if self.ensure_program(&context) {
            self.ensure_geometry(&context);
        }
    }

    /// Release every GPU object; the context must not be used afterwards
    pub fn on_context_destroyed(&mut self) {
        if let Some(context) = self.context.take() {
            debug!(epoch = context.epoch(), "Releasing filter renderer GPU resources");
        }
        self.resources = GpuResources::default();
        self.texture_dirty = self.frame.is_some();
    }

    /// Run one render cycle
    ///
    /// Returns the filtered frame as RGB when a capture completed in this
    /// cycle. The surface is redrawn every cycle (cleared to black when there
    /// is nothing to show) unless no pipeline can target its format.
    pub fn render(&mut self, surface: &RenderSurface<'_>) -> Option<RgbImage> {
        self.needs_redraw = false;
        let context = self.context.clone()?;
        self.sync_epoch(&context);

        let Some((width, height)) = self.frame_size() else {
            Self::clear_surface(&context, surface);
            return None;
        };

        if !self.ensure_program(&context)
            || !self.ensure_geometry(&context)
            || !self.upload_texture_if_needed(&context)
        {
            Self::clear_surface(&context, surface);
            return None;
        }

        let capture = self.capture_pending && self.ensure_offscreen_target(&context, width, height);
        let draw_surface = self.ensure_surface_pipeline(&context, surface.format);

        let result = self.draw(&context, surface, capture, draw_surface);
        match result {
            Ok(image) => image,
            Err(error) => {
                self.capture_pending = false;
                self.diagnostics.report(error);
                None
            }
        }
    }

    /// Create, resize or (for a zero size) release the off-screen target
    ///
    /// A size that failed once is not retried (or reported again) until the
    /// context is recreated.
    pub fn ensure_offscreen_target(&mut self, context: &GpuContext, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            self.resources.offscreen = None;
            return false;
        }
        if self.resources.target_failed == Some((width, height)) {
            return false;
        }

        if let Some(target) = &self.resources.offscreen
            && target.texture.width() == width
            && target.texture.height() == height
        {
            return true;
        }
        self.resources.offscreen = None;

        let max = context.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            self.fail_offscreen_target(
                width,
                height,
                format!("{}x{} exceeds the maximum texture size {}", width, height, max),
            );
            return false;
        }

        let padded_bytes_per_row =
            (width * 4).div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let device = &context.device;

        let created = scoped(device, || {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("filtercam_capture_target"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FRAME_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            let staging = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("filtercam_capture_staging"),
                size: padded_bytes_per_row as u64 * height as u64,
                usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                mapped_at_creation: false,
            });
            OffscreenTarget {
                texture,
                view,
                staging,
                padded_bytes_per_row,
            }
        });

        match created {
            Ok(target) => {
                debug!(width, height, "Allocated off-screen capture target");
                self.resources.offscreen = Some(target);
                true
            }
            Err(reason) => {
                self.fail_offscreen_target(width, height, reason);
                false
            }
        }
    }

    fn fail_offscreen_target(&mut self, width: u32, height: u32, reason: String) {
        self.resources.target_failed = Some((width, height));
        self.diagnostics.report(VcamError::RenderTarget(reason));
    }

    /// Drop resources left over from another context
    fn sync_epoch(&mut self, context: &GpuContext) {
        if self.resources.epoch != Some(context.epoch()) {
            if self.resources.epoch.is_some() {
                debug!(epoch = context.epoch(), "Discarding GPU resources from a stale context");
                self.texture_dirty = self.frame.is_some();
            }
            self.resources = GpuResources {
                epoch: Some(context.epoch()),
                ..Default::default()
            };
        }
    }

    fn ensure_program(&mut self, context: &GpuContext) -> bool {
        if self.resources.program.is_some() {
            return true;
        }
        if self.program_failed {
            return false;
        }

        let device = &context.device;
        let source = self.shader_source.clone();
        let built = scoped(device, || {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("filtercam_filter_shader"),
                source: wgpu::ShaderSource::Wgsl(source),
            });

            let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("filtercam_filter_bind_group_layout"),
                entries: &[
                    // Frame texture
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
                    // Sampler
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    // Filter parameters
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                ],
            });

            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("filtercam_filter_pipeline_layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

            let capture_pipeline =
                create_render_pipeline(device, &pipeline_layout, &module, FRAME_FORMAT);

            let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("filtercam_frame_sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                ..Default::default()
            });

            let uniform_buffer = |label: &str| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(label),
                    size: std::mem::size_of::<FilterParams>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            };

            Program {
                bind_group_layout,
                pipeline_layout,
                module,
                sampler,
                capture_pipeline,
                surface_pipeline: None,
                capture_uniforms: uniform_buffer("filtercam_capture_uniforms"),
                surface_uniforms: uniform_buffer("filtercam_surface_uniforms"),
            }
        });

        match built {
            Ok(program) => {
                debug!(epoch = context.epoch(), "Filter shader program built");
                self.resources.program = Some(program);
                true
            }
            Err(reason) => {
                self.program_failed = true;
                self.diagnostics.report(VcamError::ShaderCompilation(reason));
                false
            }
        }
    }

    fn ensure_surface_pipeline(&mut self, context: &GpuContext, format: wgpu::TextureFormat) -> bool {
        let Some(program) = self.resources.program.as_mut() else {
            return false;
        };
        if format == FRAME_FORMAT {
            return true;
        }
        if matches!(&program.surface_pipeline, Some((built, _)) if *built == format) {
            return true;
        }
        if self.resources.surface_failed == Some(format) {
            return false;
        }

        let device = &context.device;
        let built = scoped(device, || {
            create_render_pipeline(device, &program.pipeline_layout, &program.module, format)
        });
        match built {
            Ok(pipeline) => {
                debug!(?format, "Built surface pipeline");
                program.surface_pipeline = Some((format, pipeline));
                true
            }
            Err(reason) => {
                program.surface_pipeline = None;
                self.resources.surface_failed = Some(format);
                self.diagnostics.report(VcamError::ShaderCompilation(reason));
                false
            }
        }
    }

    fn ensure_geometry(&mut self, context: &GpuContext) -> bool {
        if self.resources.vertex_buffer.is_none() {
            let buffer = context
                .device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("filtercam_quad_vertices"),
                    contents: bytemuck::cast_slice(&QUAD_VERTICES),
                    usage: wgpu::BufferUsages::VERTEX,
                });
            self.resources.vertex_buffer = Some(buffer);
        }
        true
    }

    fn upload_texture_if_needed(&mut self, context: &GpuContext) -> bool {
        let Some(frame) = self.frame.as_ref() else {
            return false;
        };
        let Some(program) = self.resources.program.as_ref() else {
            return false;
        };
        let (width, height) = frame.dimensions();

        let reusable = self
            .resources
            .texture
            .as_ref()
            .is_some_and(|t| t.texture.width() == width && t.texture.height() == height);

        if !reusable {
            let max = context.device.limits().max_texture_dimension_2d;
            if width > max || height > max {
                warn!(width, height, max, "Frame exceeds maximum texture size, dropping");
                self.frame = None;
                self.resources.texture = None;
                return false;
            }

            let device = &context.device;
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("filtercam_frame_texture"),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: FRAME_FORMAT,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let bind_group = |label: &str, uniforms: &wgpu::Buffer| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(label),
                    layout: &program.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::TextureView(&view),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::Sampler(&program.sampler),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: uniforms.as_entire_binding(),
                        },
                    ],
                })
            };

            let capture_bind_group = bind_group("filtercam_capture_bind_group", &program.capture_uniforms);
            let surface_bind_group = bind_group("filtercam_surface_bind_group", &program.surface_uniforms);

            debug!(width, height, "Allocated frame texture");
            self.resources.texture = Some(FrameTexture {
                texture,
                capture_bind_group,
                surface_bind_group,
            });
            self.texture_dirty = true;
        }

        if self.texture_dirty
            && let Some(target) = self.resources.texture.as_ref()
        {
            // Sampling flips v, so rows go up bottom-first
            let flipped = image::imageops::flip_vertical(frame);
            context.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                flipped.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width * 4),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            self.texture_dirty = false;
        }

        true
    }

    fn clear_surface(context: &GpuContext, surface: &RenderSurface<'_>) {
        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filtercam_clear_encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("filtercam_clear_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: surface.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        context.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Record the capture and surface passes (each optional) in one submission
    ///
    /// Without a surface pipeline the surface is left untouched; its format
    /// may not be renderable at all.
    fn draw(
        &mut self,
        context: &GpuContext,
        surface: &RenderSurface<'_>,
        capture: bool,
        draw_surface: bool,
    ) -> VcamResult<Option<RgbImage>> {
        let resources = &self.resources;
        let (Some(program), Some(vertex_buffer), Some(texture)) = (
            resources.program.as_ref(),
            resources.vertex_buffer.as_ref(),
            resources.texture.as_ref(),
        ) else {
            return Ok(None);
        };
        let frame_size = (texture.texture.width(), texture.texture.height());
        let offscreen = resources.offscreen.as_ref().filter(|_| capture);

        context.queue.write_buffer(
            &program.capture_uniforms,
            0,
            bytemuck::bytes_of(&FilterParams::new([1.0, 1.0], self.selection)),
        );
        context.queue.write_buffer(
            &program.surface_uniforms,
            0,
            bytemuck::bytes_of(&FilterParams::new(
                aspect_scale(frame_size, (surface.width, surface.height)),
                self.selection,
            )),
        );

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filtercam_render_encoder"),
            });

        let draw_pass = |encoder: &mut wgpu::CommandEncoder,
                         label: &str,
                         view: &wgpu::TextureView,
                         pipeline: &wgpu::RenderPipeline,
                         bind_group: &wgpu::BindGroup| {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..QUAD_VERTICES.len() as u32, 0..1);
        };

        if let Some(target) = offscreen {
            draw_pass(
                &mut encoder,
                "filtercam_capture_pass",
                &target.view,
                &program.capture_pipeline,
                &texture.capture_bind_group,
            );
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &target.staging,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(target.padded_bytes_per_row),
                        rows_per_image: Some(frame_size.1),
                    },
                },
                wgpu::Extent3d {
                    width: frame_size.0,
                    height: frame_size.1,
                    depth_or_array_layers: 1,
                },
            );
        }

        if draw_surface {
            let surface_pipeline = match &program.surface_pipeline {
                Some((format, pipeline)) if *format == surface.format => pipeline,
                _ => &program.capture_pipeline,
            };
            draw_pass(
                &mut encoder,
                "filtercam_surface_pass",
                surface.view,
                surface_pipeline,
                &texture.surface_bind_group,
            );
        }

        context.queue.submit(std::iter::once(encoder.finish()));

        let Some(target) = offscreen else {
            return Ok(None);
        };
        let image = read_back_rgb(context, target, frame_size)?;
        self.capture_pending = false;
        Ok(Some(image))
    }
}

/// Map the staging buffer and strip row padding and alpha
fn read_back_rgb(
    context: &GpuContext,
    target: &OffscreenTarget,
    (width, height): (u32, u32),
) -> VcamResult<RgbImage> {
    let slice = target.staging.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    let _ = context.device.poll(wgpu::PollType::wait_indefinitely());

    pollster::block_on(receiver)
        .map_err(|_| VcamError::Readback("map callback was dropped".into()))?
        .map_err(|e| VcamError::Readback(e.to_string()))?;

    let row_bytes = width as usize * 4;
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    {
        let data = slice.get_mapped_range();
        for row in data
            .chunks(target.padded_bytes_per_row as usize)
            .take(height as usize)
        {
            for px in row[..row_bytes].chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
            }
        }
    }
    target.staging.unmap();

    RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| VcamError::Readback("readback size mismatch".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::filters::apply_filter_cpu;
    use crate::diagnostics::drain;

    fn try_context() -> Option<GpuContext> {
        match GpuContext::new("filter_renderer_test") {
            Ok(context) => Some(context),
            Err(e) => {
                println!("Skipping test (no GPU): {}", e);
                None
            }
        }
    }

    fn gradient(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x * 255 / width.max(1)) as u8, (y * 255 / height.max(1)) as u8, 90, 255])
        })
    }

    fn assert_close(a: &RgbImage, b: &RgbImage) {
        assert_eq!(a.dimensions(), b.dimensions());
        for (pa, pb) in a.pixels().zip(b.pixels()) {
            for c in 0..3 {
                assert!(
                    (pa.0[c] as i32 - pb.0[c] as i32).abs() <= 1,
                    "{:?} vs {:?}",
                    pa,
                    pb
                );
            }
        }
    }

    fn rgb_of(image: &RgbaImage) -> RgbImage {
        image::DynamicImage::ImageRgba8(image.clone()).to_rgb8()
    }

    #[test]
    fn test_aspect_scale_letterbox() {
        // Wide frame in a square target: shrink vertically
        assert_eq!(aspect_scale((200, 100), (100, 100)), [1.0, 2.0]);
        // Tall frame in a wide target: shrink horizontally
        assert_eq!(aspect_scale((100, 100), (200, 100)), [2.0, 1.0]);
        assert_eq!(aspect_scale((1280, 720), (640, 360)), [1.0, 1.0]);
        assert_eq!(aspect_scale((0, 720), (640, 360)), [1.0, 1.0]);
    }

    #[test]
    fn test_filter_and_strength_redraw_only_on_change() {
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.set_filter(FilterType::None);
        assert!(!renderer.needs_redraw());

        renderer.set_filter(FilterType::Sepia);
        assert!(renderer.needs_redraw());

        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.set_strength(1.0 + STRENGTH_EPSILON / 2.0);
        assert!(!renderer.needs_redraw());
        renderer.set_strength(-3.0);
        assert!(renderer.needs_redraw());
        assert_eq!(renderer.selection().strength, 0.0);
    }

    #[test]
    fn test_invalid_frame_ignored() {
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        let short = CameraFrame::new(8, 8, crate::backends::camera::types::PixelFormat::RGBA, vec![0u8; 3]);
        renderer.submit_frame(&short);
        assert!(!renderer.needs_redraw());
        assert!(!renderer.capture_pending());
        assert_eq!(renderer.frame_size(), None);
    }

    #[test]
    fn test_newer_frame_replaces_pending() {
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.submit_rgba(gradient(4, 4));
        renderer.submit_rgba(gradient(6, 2));
        assert_eq!(renderer.frame_size(), Some((6, 2)));
        assert!(renderer.capture_pending());
    }

    #[test]
    fn test_render_without_context_is_noop() {
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.submit_rgba(gradient(4, 4));
        assert!(!renderer.has_context());

        // Surface from a context the renderer was never attached to
        let Some(context) = try_context() else { return };
        let preview = PreviewSurface::new(&context, 16, 16);
        assert!(renderer.render(&preview.surface()).is_none());
        assert!(!renderer.has_gpu_resources());
        assert!(renderer.capture_pending());
    }

    #[test]
    fn test_capture_matches_cpu_reference() {
        let Some(context) = try_context() else { return };
        let preview = PreviewSurface::new(&context, 320, 240);
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.on_context_created(context);

        let frame = gradient(37, 21);
        for filter in FilterType::ALL {
            for strength in [0.0, 0.5, 1.0] {
                renderer.set_filter(filter);
                renderer.set_strength(strength);
                renderer.submit_rgba(frame.clone());
                let captured = renderer
                    .render(&preview.surface())
                    .expect("capture after submit");
                let expected = apply_filter_cpu(&frame, FilterSelection::new(filter, strength));
                assert_close(&captured, &rgb_of(&expected));
            }
        }
    }

    #[test]
    fn test_capture_only_once_per_frame_and_idempotent() {
        let Some(context) = try_context() else { return };
        let preview = PreviewSurface::new(&context, 64, 64);
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.on_context_created(context);
        renderer.set_filter(FilterType::Sepia);

        let frame = gradient(16, 9);
        renderer.submit_rgba(frame.clone());
        let first = renderer.render(&preview.surface());
        assert!(first.is_some());
        assert!(renderer.render(&preview.surface()).is_none());

        renderer.submit_rgba(frame);
        let second = renderer.render(&preview.surface());
        assert_eq!(first, second);
    }

    #[test]
    fn test_context_loss_releases_and_rebuilds() {
        let Some(context) = try_context() else { return };
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.on_context_created(context.clone());
        renderer.submit_rgba(gradient(8, 8));
        let preview = PreviewSurface::new(&context, 32, 32);
        assert!(renderer.render(&preview.surface()).is_some());
        assert!(renderer.has_gpu_resources());

        renderer.on_context_destroyed();
        assert!(!renderer.has_gpu_resources());
        assert!(!renderer.has_context());
        drop(preview);

        let Some(recreated) = try_context() else { return };
        assert!(recreated.epoch() > context.epoch());
        let preview = PreviewSurface::new(&recreated, 32, 32);
        renderer.on_context_created(recreated);
        renderer.submit_rgba(gradient(8, 8));
        assert!(renderer.render(&preview.surface()).is_some());
        assert!(renderer.has_gpu_resources());
    }

    #[test]
    fn test_shader_failure_is_reported_not_fatal() {
        let Some(context) = try_context() else { return };
        let (diagnostics, mut receiver) = Diagnostics::channel();
        let mut renderer =
            GpuFilterRenderer::with_shader_source("this is not wgsl", diagnostics);
        let preview = PreviewSurface::new(&context, 16, 16);
        renderer.on_context_created(context);
        renderer.submit_rgba(gradient(4, 4));

        assert!(renderer.render(&preview.surface()).is_none());
        assert!(renderer.render(&preview.surface()).is_none());

        let errors = drain(&mut receiver);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], VcamError::ShaderCompilation(_)));
    }

    #[test]
    fn test_capture_target_failure_reported_once_per_context() {
        let Some(context) = try_context() else { return };
        let (diagnostics, mut receiver) = Diagnostics::channel();
        let mut renderer = GpuFilterRenderer::new(diagnostics);
        renderer.on_context_created(context.clone());

        let too_wide = context.device.limits().max_texture_dimension_2d + 1;
        for _ in 0..3 {
            assert!(!renderer.ensure_offscreen_target(&context, too_wide, 4));
        }
        let errors = drain(&mut receiver);
        assert!(matches!(errors.as_slice(), [VcamError::RenderTarget(_)]));

        // Other sizes still allocate
        assert!(renderer.ensure_offscreen_target(&context, 8, 8));

        let Some(recreated) = try_context() else { return };
        renderer.on_context_destroyed();
        renderer.on_context_created(recreated.clone());
        let too_wide = recreated.device.limits().max_texture_dimension_2d + 1;
        assert!(!renderer.ensure_offscreen_target(&recreated, too_wide, 4));
        assert_eq!(drain(&mut receiver).len(), 1);
    }

    #[test]
    fn test_surface_pipeline_failure_still_captures() {
        let Some(context) = try_context() else { return };
        let (diagnostics, mut receiver) = Diagnostics::channel();
        let mut renderer = GpuFilterRenderer::new(diagnostics);
        renderer.on_context_created(context.clone());

        // Depth formats cannot be a color target
        let depth = context.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_surface"),
            size: wgpu::Extent3d {
                width: 16,
                height: 16,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let surface = RenderSurface {
            view: &view,
            format: wgpu::TextureFormat::Depth32Float,
            width: 16,
            height: 16,
        };

        let frame = gradient(8, 8);
        for _ in 0..3 {
            renderer.submit_rgba(frame.clone());
            let captured = renderer
                .render(&surface)
                .expect("capture without a surface pipeline");
            assert_close(&captured, &rgb_of(&frame));
        }

        let errors = drain(&mut receiver);
        assert!(matches!(errors.as_slice(), [VcamError::ShaderCompilation(_)]));
    }

    #[test]
    fn test_zero_size_releases_offscreen_target() {
        let Some(context) = try_context() else { return };
        let mut renderer = GpuFilterRenderer::new(Diagnostics::log_only());
        renderer.on_context_created(context.clone());
        assert!(renderer.ensure_offscreen_target(&context, 8, 8));
        assert!(renderer.resources.offscreen.is_some());
        assert!(!renderer.ensure_offscreen_target(&context, 0, 8));
        assert!(renderer.resources.offscreen.is_none());
    }
}
