// SPDX-License-Identifier: GPL-3.0-only
//! Shader sources and their uniform layouts
//!
//! The GPU renderer and the CPU fallback implement the same filter math;
//! [`crate::backends::virtual_camera::filters`] is the CPU reference.

use crate::backends::virtual_camera::filters::FilterSelection;

/// Filter render pass (WGSL)
/// Entry points: vs_main, fs_main
pub const FILTER_RENDER_SHADER: &str = include_str!("filter_render.wgsl");

/// Uniform block of the filter render pass, mirrors `FilterParams` in WGSL
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FilterParams {
    pub scale: [f32; 2],
    pub filter_mode: u32,
    pub strength: f32,
}

impl FilterParams {
    pub fn new(scale: [f32; 2], selection: FilterSelection) -> Self {
        Self {
            scale,
            filter_mode: selection.filter.code(),
            strength: selection.strength,
        }
    }
}

/// One corner of the unit quad: clip-space position plus texture coordinate
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// Triangle strip covering clip space; bottom-left maps to texcoord (0, 1)
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [-1.0, -1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        tex_coord: [1.0, 1.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 0.0],
    },
];

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::virtual_camera::filters::FilterType;

    /// Validate that a WGSL shader compiles successfully using naga
    fn validate_shader(name: &str, source: &str) {
        let result = naga::front::wgsl::parse_str(source);
        match result {
            Ok(module) => {
                let info = naga::valid::Validator::new(
                    naga::valid::ValidationFlags::all(),
                    naga::valid::Capabilities::all(),
                )
                .validate(&module);

                if let Err(e) = info {
                    panic!("Shader '{}' validation failed: {:?}", name, e);
                }
            }
            Err(e) => {
                panic!("Shader '{}' parse failed: {:?}", name, e);
            }
        }
    }

    #[test]
    fn test_filter_render_shader_validates() {
        validate_shader("filter_render", FILTER_RENDER_SHADER);
    }

    #[test]
    fn test_filter_params_layout() {
        // vec2<f32> + u32 + f32
        assert_eq!(std::mem::size_of::<FilterParams>(), 16);
        let params = FilterParams::new([1.0, 2.0], FilterSelection::new(FilterType::Warm, 0.25));
        assert_eq!(params.filter_mode, 4);
        assert_eq!(params.strength, 0.25);
    }

    #[test]
    fn test_quad_vertex_stride() {
        assert_eq!(QuadVertex::layout().array_stride, 16);
    }
}
