// SPDX-License-Identifier: GPL-3.0-only

//! Virtual camera pipeline: frame cell → filter → device sink
//!
//! Runs one render cycle per [`VirtualCameraPipeline::tick`]. All work happens
//! on the caller's thread; producers only touch the [`LatestFrame`] cell.

use super::filters::{FilterSelection, FilterType, apply_filter_cpu};
use super::gpu_filter::{GpuFilterRenderer, PreviewSurface};
use super::v4l2_output::{DeviceOpener, V4l2Opener};
use super::v4l2_sink::VirtualCameraSink;
use super::LatestFrame;
use crate::config::Config;
use crate::constants::{timing, virtual_camera};
use crate::diagnostics::Diagnostics;
use crate::gpu::GpuContext;
use image::RgbImage;
use tracing::{debug, info, warn};

/// Where filtering happens
pub enum FilterBackend {
    Gpu(Box<GpuFilterRenderer>),
    /// Software fallback when no GPU adapter is available
    Cpu(FilterSelection),
}

impl FilterBackend {
    /// GPU renderer attached to a new context, or the CPU path if that fails
    pub fn detect(diagnostics: &Diagnostics) -> Self {
        match GpuContext::new("filtercam") {
            Ok(context) => {
                let mut renderer = GpuFilterRenderer::new(diagnostics.clone());
                renderer.on_context_created(context);
                FilterBackend::Gpu(Box::new(renderer))
            }
            Err(e) => {
                warn!(error = %e, "GPU unavailable, using CPU filtering");
                FilterBackend::Cpu(FilterSelection::default())
            }
        }
    }
}

/// Owns the frame cell, the filter backend and the device sink
pub struct VirtualCameraPipeline<O: DeviceOpener = V4l2Opener> {
    frames: LatestFrame,
    backend: FilterBackend,
    preview: Option<PreviewSurface>,
    preview_size: (u32, u32),
    sink: VirtualCameraSink<O>,
    frames_processed: u64,
}

impl VirtualCameraPipeline<V4l2Opener> {
    /// Pipeline writing to a real device, configured from `config`
    pub fn from_config(config: &Config, use_gpu: bool, diagnostics: Diagnostics) -> Self {
        let backend = if use_gpu {
            FilterBackend::detect(&diagnostics)
        } else {
            FilterBackend::Cpu(FilterSelection::default())
        };

        let mut sink = VirtualCameraSink::new(diagnostics);
        sink.set_device_path(&config.device_path);
        sink.set_forced_resolution(config.forced_resolution);
        sink.set_enabled(config.enabled);

        let mut pipeline = Self::new(backend, sink);
        pipeline.set_filter(config.filter);
        pipeline.set_strength(config.filter_strength);
        pipeline
    }
}

impl<O: DeviceOpener> VirtualCameraPipeline<O> {
    pub fn new(backend: FilterBackend, sink: VirtualCameraSink<O>) -> Self {
        info!(
            gpu = matches!(backend, FilterBackend::Gpu(_)),
            device_path = %sink.device_path(),
            "Virtual camera pipeline created"
        );
        Self {
            frames: LatestFrame::new(),
            backend,
            preview: None,
            preview_size: (virtual_camera::PREVIEW_WIDTH, virtual_camera::PREVIEW_HEIGHT),
            sink,
            frames_processed: 0,
        }
    }

    /// Handle for frame producers
    pub fn frame_cell(&self) -> LatestFrame {
        self.frames.clone()
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.backend, FilterBackend::Gpu(_))
    }

    pub fn selection(&self) -> FilterSelection {
        match &self.backend {
            FilterBackend::Gpu(renderer) => renderer.selection(),
            FilterBackend::Cpu(selection) => *selection,
        }
    }

    pub fn set_filter(&mut self, filter: FilterType) {
        match &mut self.backend {
            FilterBackend::Gpu(renderer) => renderer.set_filter(filter),
            FilterBackend::Cpu(selection) => selection.filter = filter,
        }
    }

    pub fn set_strength(&mut self, strength: f32) {
        match &mut self.backend {
            FilterBackend::Gpu(renderer) => renderer.set_strength(strength),
            FilterBackend::Cpu(selection) => {
                *selection = FilterSelection::new(selection.filter, strength)
            }
        }
    }

    /// Resize the headless preview surface (recreated on the next tick)
    pub fn set_preview_size(&mut self, width: u32, height: u32) {
        self.preview_size = (width.max(1), height.max(1));
    }

    pub fn sink(&self) -> &VirtualCameraSink<O> {
        &self.sink
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    /// The GPU context is about to go away: release everything built on it
    pub fn on_context_lost(&mut self) {
        self.preview = None;
        if let FilterBackend::Gpu(renderer) = &mut self.backend {
            renderer.on_context_destroyed();
        }
    }

    pub fn on_context_restored(&mut self, context: GpuContext) {
        if let FilterBackend::Gpu(renderer) = &mut self.backend {
            renderer.on_context_created(context);
        }
    }

    /// Run one render cycle; returns true if a frame reached the device
    pub fn tick(&mut self) -> bool {
        let frame = self.frames.take();

        let processed: Option<RgbImage> = match &mut self.backend {
            FilterBackend::Gpu(renderer) => {
                if let Some(frame) = &frame {
                    renderer.submit_frame(frame);
                }
                if !renderer.needs_redraw() {
                    return false;
                }
                let Some(context) = renderer.context().cloned() else {
                    return false;
                };

                let (width, height) = self.preview_size;
                let preview = match self.preview.take() {
                    Some(preview)
                        if preview.epoch() == context.epoch()
                            && (preview.surface().width, preview.surface().height)
                                == (width, height) =>
                    {
                        preview
                    }
                    _ => PreviewSurface::new(&context, width, height),
                };
                let captured = renderer.render(&preview.surface());
                self.preview = Some(preview);
                captured
            }
            FilterBackend::Cpu(selection) => frame
                .and_then(|frame| frame.to_rgba().ok())
                .map(|rgba| {
                    let filtered = apply_filter_cpu(&rgba, *selection);
                    image::DynamicImage::ImageRgba8(filtered).to_rgb8()
                }),
        };

        let Some(image) = processed else {
            return false;
        };

        self.frames_processed += 1;
        if self.frames_processed % timing::FRAME_LOG_INTERVAL == 0 {
            debug!(
                frames = self.frames_processed,
                written = self.sink.frames_written(),
                width = image.width(),
                height = image.height(),
                "Virtual camera pipeline progress"
            );
        }

        self.sink.on_processed_frame(image)
    }
}
