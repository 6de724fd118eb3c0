//! Pipeline construction shared by every draw the wgpu backend issues.

use super::{BlendMode, DrawUniforms, Primitive};

// ── blend ─────────────────────────────────────────────────────────────────

pub(super) fn premul_alpha_blend() -> wgpu::BlendState {
    wgpu::BlendState {
        color: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    }
}

pub(super) fn additive_blend() -> wgpu::BlendState {
    let add = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState { color: add, alpha: add }
}

fn blend_state(mode: BlendMode) -> wgpu::BlendState {
    match mode {
        BlendMode::Alpha => premul_alpha_blend(),
        BlendMode::Additive => additive_blend(),
    }
}

// ── vertex layouts ────────────────────────────────────────────────────────

const TRIANGLE_ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
    0 => Float32x2, // position
    1 => Float32x4  // color
];

const SEGMENT_ATTRS: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    0 => Float32x2, // start position
    1 => Float32x4, // start color
    2 => Float32x2, // end position
    3 => Float32x4  // end color
];

const POINT_ATTRS: [wgpu::VertexAttribute; 3] = wgpu::vertex_attr_array![
    0 => Float32x2, // position
    1 => Float32x4, // color
    2 => Float32    // size
];

fn vertex_layout(primitive: Primitive) -> wgpu::VertexBufferLayout<'static> {
    let vertex_bytes = (primitive.vertex_stride() * std::mem::size_of::<f32>()) as u64;
    match primitive {
        Primitive::Triangles => wgpu::VertexBufferLayout {
            array_stride: vertex_bytes,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &TRIANGLE_ATTRS,
        },
        // One instance per segment: both endpoints in a single stride.
        Primitive::Segments => wgpu::VertexBufferLayout {
            array_stride: vertex_bytes * 2,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &SEGMENT_ATTRS,
        },
        Primitive::Points => wgpu::VertexBufferLayout {
            array_stride: vertex_bytes,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &POINT_ATTRS,
        },
    }
}

fn vertex_entry_point(primitive: Primitive) -> &'static str {
    match primitive {
        Primitive::Triangles => "vs_triangles",
        Primitive::Segments => "vs_segments",
        Primitive::Points => "vs_points",
    }
}

// ── uniforms ──────────────────────────────────────────────────────────────

/// Returns the `wgpu` minimum binding size for the per-draw uniform block.
///
/// `DrawUniforms` is 96 bytes so its size is always non-zero.
pub(super) fn uniforms_min_binding_size() -> std::num::NonZeroU64 {
    std::num::NonZeroU64::new(std::mem::size_of::<DrawUniforms>() as u64)
        .expect("DrawUniforms has non-zero size by construction")
}

pub(super) fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("strata vector bgl"),
        entries: &[wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: true,
                min_binding_size: Some(uniforms_min_binding_size()),
            },
            count: None,
        }],
    })
}

// ── pipeline ──────────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub(super) struct PipelineKey {
    pub primitive: Primitive,
    pub blend: BlendMode,
    pub format: wgpu::TextureFormat,
}

pub(super) fn create_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    bind_group_layout: &wgpu::BindGroupLayout,
    key: PipelineKey,
) -> wgpu::RenderPipeline {
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("strata vector pipeline layout"),
        bind_group_layouts: &[bind_group_layout],
        immediate_size: 0,
    });

    let label = format!("strata {:?} {:?} pipeline", key.primitive, key.blend);

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&label),
        layout: Some(&pipeline_layout),

        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some(vertex_entry_point(key.primitive)),
            compilation_options: Default::default(),
            buffers: &[vertex_layout(key.primitive)],
        },

        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.format,
                blend: Some(blend_state(key.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),

        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            // Ring orientation and quad winding vary; never cull.
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },

        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview_mask: None,
        cache: None,
    })
}
