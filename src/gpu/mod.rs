// SPDX-License-Identifier: GPL-3.0-only

//! GPU device creation and context lifetime
//!
//! A [`GpuContext`] stands for one device/queue pair. Each one gets a fresh
//! epoch number, so resources built against an older context can be detected
//! and rebuilt instead of being used after the context went away.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::errors::{VcamError, VcamResult};

static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, GL, ...)
    pub backend: wgpu::Backend,
}

/// Device and queue of one live GPU context
#[derive(Debug, Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub info: GpuDeviceInfo,
    epoch: u64,
}

impl GpuContext {
    /// Wrap an existing device/queue; every call yields a new epoch
    pub fn from_parts(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        info: GpuDeviceInfo,
    ) -> Self {
        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        debug!(epoch, adapter = %info.adapter_name, "GPU context created");
        Self {
            device,
            queue,
            info,
            epoch,
        }
    }

    /// Create a context on the default adapter, blocking until it is ready
    pub fn new(label: &str) -> VcamResult<Self> {
        let (device, queue, info) = pollster::block_on(create_device(label))?;
        Ok(Self::from_parts(device, queue, info))
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Create a wgpu device and queue for rendering
///
/// # Arguments
///
/// * `label` - A label for the device (for debugging)
pub async fn create_device(
    label: &str,
) -> VcamResult<(Arc<wgpu::Device>, Arc<wgpu::Queue>, GpuDeviceInfo)> {
    info!(label = label, "Creating GPU device for filter rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::VULKAN | wgpu::Backends::GL,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| VcamError::GpuInit(format!("no suitable GPU adapter: {}", e)))?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected for filter rendering"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                .using_resolution(adapter.limits()),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| VcamError::GpuInit(format!("failed to create GPU device: {}", e)))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((Arc::new(device), Arc::new(queue), info))
}
