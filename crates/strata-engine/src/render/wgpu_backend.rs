use std::collections::HashMap;

use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::device::{Gpu, GpuInit};

use super::pipeline::{create_bind_group_layout, create_pipeline, uniforms_min_binding_size, PipelineKey};
use super::{
    BufferId, DrawCall, DrawUniforms, GpuError, IndexData, Primitive, RenderBackend, RenderCtx,
    RenderTarget, ScissorRect,
};

/// Hit target pixel format; readback interprets the first four bytes as RGBA.
const HIT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// `bytes_per_row` for texture-to-buffer copies must be 256-aligned.
const HIT_READBACK_BYTES: u64 = 256;

/// wgpu implementation of [`RenderBackend`].
///
/// Frame draws are queued and encoded into a single pass by
/// [`WgpuBackend::encode_frame`]. Hit-target draws are encoded and submitted
/// when the pixel is read back, which blocks until the copy is mapped.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    wide_indices: bool,
    max_buffer_size: u64,
    uniform_stride: u64,

    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,

    buffers: SlotMap<BufferId, wgpu::Buffer>,

    frame: PendingPass,
    frame_uniforms: UniformRing,

    hit: Option<HitTarget>,
    hit_bound: bool,
    hit_pass: PendingPass,
    hit_uniforms: UniformRing,
}

#[derive(Default)]
struct PendingPass {
    clear: bool,
    draws: Vec<DrawCall>,
}

struct HitTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback: wgpu::Buffer,
}

/// Dynamic-offset uniform buffer holding one `DrawUniforms` slot per draw.
struct UniformRing {
    label: &'static str,
    buffer: Option<wgpu::Buffer>,
    bind_group: Option<wgpu::BindGroup>,
    capacity: usize,
}

impl UniformRing {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            buffer: None,
            bind_group: None,
            capacity: 0,
        }
    }

    fn ensure_capacity(
        &mut self,
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: u64,
        required: usize,
    ) {
        if required <= self.capacity && self.buffer.is_some() {
            return;
        }

        let new_cap = required.next_power_of_two().max(64);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: new_cap as u64 * stride,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(self.label),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: Some(uniforms_min_binding_size()),
                }),
            }],
        });

        self.buffer = Some(buffer);
        self.bind_group = Some(bind_group);
        self.capacity = new_cap;
    }

    fn upload(&self, queue: &wgpu::Queue, stride: u64, draws: &[DrawCall]) {
        let Some(buffer) = self.buffer.as_ref() else { return };
        if draws.is_empty() {
            return;
        }
        let mut bytes = vec![0u8; draws.len() * stride as usize];
        for (i, draw) in draws.iter().enumerate() {
            let start = i * stride as usize;
            let raw = bytemuck::bytes_of(&draw.uniforms);
            bytes[start..start + raw.len()].copy_from_slice(raw);
        }
        queue.write_buffer(buffer, 0, &bytes);
    }
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, init: &GpuInit) -> Self {
        let limits = device.limits();
        let size = std::mem::size_of::<DrawUniforms>() as u64;
        let align = limits.min_uniform_buffer_offset_alignment.max(1) as u64;
        let uniform_stride = size.div_ceil(align) * align;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("strata vector shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/vector.wgsl").into()),
        });
        let bind_group_layout = create_bind_group_layout(&device);

        Self {
            device,
            queue,
            wide_indices: init.wide_indices,
            max_buffer_size: limits.max_buffer_size,
            uniform_stride,
            shader,
            bind_group_layout,
            pipelines: HashMap::new(),
            buffers: SlotMap::with_key(),
            frame: PendingPass::default(),
            frame_uniforms: UniformRing::new("strata frame uniforms"),
            hit: None,
            hit_bound: false,
            hit_pass: PendingPass::default(),
            hit_uniforms: UniformRing::new("strata hit uniforms"),
        }
    }

    /// Builds a backend sharing the device and queue of `gpu`.
    pub fn from_gpu(gpu: &Gpu) -> Self {
        Self::new(gpu.device().clone(), gpu.queue().clone(), gpu.init())
    }

    /// Number of live buffers in the arena.
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Encodes every queued frame draw into one render pass on `target`.
    pub fn encode_frame(&mut self, ctx: &RenderCtx, target: &mut RenderTarget<'_>) {
        let pass = std::mem::take(&mut self.frame);
        if pass.draws.is_empty() && !pass.clear {
            return;
        }
        if !ctx.viewport.is_valid() {
            log::warn!("dropping frame pass for invalid viewport {:?}", ctx.viewport);
            return;
        }

        // Mutating setup must happen before borrowing pipelines/buffers immutably.
        self.ensure_pipelines(&pass.draws, ctx.target_format);
        self.frame_uniforms.ensure_capacity(
            &self.device,
            &self.bind_group_layout,
            self.uniform_stride,
            pass.draws.len(),
        );
        self.frame_uniforms.upload(&self.queue, self.uniform_stride, &pass.draws);

        let size = (
            ctx.viewport.width.max(1.0) as u32,
            ctx.viewport.height.max(1.0) as u32,
        );
        let mut rpass = target.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("strata frame pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: load_op(pass.clear),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        record_draws(
            &mut rpass,
            &pass.draws,
            &self.pipelines,
            &self.buffers,
            &self.frame_uniforms,
            self.uniform_stride,
            ctx.target_format,
            size,
        );
    }

    fn ensure_pipelines(&mut self, draws: &[DrawCall], format: wgpu::TextureFormat) {
        for draw in draws {
            let key = PipelineKey {
                primitive: draw.primitive,
                blend: draw.blend,
                format,
            };
            if self.pipelines.contains_key(&key) {
                continue;
            }
            log::debug!("creating pipeline {key:?}");
            let pipeline = create_pipeline(&self.device, &self.shader, &self.bind_group_layout, key);
            self.pipelines.insert(key, pipeline);
        }
    }

    fn ensure_hit_target(&mut self) {
        if self.hit.is_some() {
            return;
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("strata hit target"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: HIT_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("strata hit readback"),
            size: HIT_READBACK_BYTES,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        self.hit = Some(HitTarget {
            texture,
            view,
            readback,
        });
    }

    fn check_size(&self, size: u64) -> Result<(), GpuError> {
        if size > self.max_buffer_size {
            return Err(GpuError::BufferTooLarge {
                size,
                max: self.max_buffer_size,
            });
        }
        Ok(())
    }
}

fn load_op(clear: bool) -> wgpu::LoadOp<wgpu::Color> {
    if clear {
        wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT)
    } else {
        wgpu::LoadOp::Load
    }
}

/// Clamps a scissor rect to the target. `None` if nothing remains to draw.
fn clamp_scissor(scissor: Option<ScissorRect>, size: (u32, u32)) -> Option<(u32, u32, u32, u32)> {
    let (tw, th) = size;
    let (x, y, w, h) = match scissor {
        None => (0, 0, tw, th),
        Some(r) => {
            let x = r.x.min(tw);
            let y = r.y.min(th);
            let x2 = r.x.saturating_add(r.width).min(tw);
            let y2 = r.y.saturating_add(r.height).min(th);
            (x, y, x2.saturating_sub(x), y2.saturating_sub(y))
        }
    };

    if w == 0 || h == 0 { None } else { Some((x, y, w, h)) }
}

#[allow(clippy::too_many_arguments)]
fn record_draws(
    rpass: &mut wgpu::RenderPass<'_>,
    draws: &[DrawCall],
    pipelines: &HashMap<PipelineKey, wgpu::RenderPipeline>,
    buffers: &SlotMap<BufferId, wgpu::Buffer>,
    uniforms: &UniformRing,
    uniform_stride: u64,
    format: wgpu::TextureFormat,
    size: (u32, u32),
) {
    let Some(bind_group) = uniforms.bind_group.as_ref() else { return };

    for (i, draw) in draws.iter().enumerate() {
        let key = PipelineKey {
            primitive: draw.primitive,
            blend: draw.blend,
            format,
        };
        let Some(pipeline) = pipelines.get(&key) else { continue };
        let Some(vertex_buffer) = buffers.get(draw.vertex_buffer) else {
            log::debug!("draw references a released vertex buffer; skipped");
            continue;
        };
        let Some((sx, sy, sw, sh)) = clamp_scissor(draw.scissor, size) else { continue };

        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, bind_group, &[(i as u64 * uniform_stride) as u32]);
        rpass.set_vertex_buffer(0, vertex_buffer.slice(..));
        rpass.set_scissor_rect(sx, sy, sw, sh);

        match draw.primitive {
            Primitive::Triangles => {
                let Some((index_id, width)) = draw.index_buffer else { continue };
                let Some(index_buffer) = buffers.get(index_id) else { continue };
                rpass.set_index_buffer(index_buffer.slice(..), width.wgpu_format());
                rpass.draw_indexed(draw.elements.clone(), 0, 0..1);
            }
            Primitive::Segments => {
                rpass.draw(0..6, draw.elements.start / 2..draw.elements.end / 2);
            }
            Primitive::Points => {
                rpass.draw(0..6, draw.elements.clone());
            }
        }
    }
}

impl RenderBackend for WgpuBackend {
    fn supports_wide_indices(&self) -> bool {
        self.wide_indices
    }

    fn create_vertex_buffer(&mut self, label: &str, data: &[f32]) -> Result<BufferId, GpuError> {
        let contents: &[u8] = bytemuck::cast_slice(data);
        self.check_size(contents.len() as u64)?;
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::VERTEX,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        data: IndexData<'_>,
    ) -> Result<BufferId, GpuError> {
        if matches!(data, IndexData::U32(_)) && !self.wide_indices {
            return Err(GpuError::WideIndicesUnsupported);
        }
        let contents = data.as_bytes();
        self.check_size(contents.len() as u64)?;
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents,
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(self.buffers.insert(buffer))
    }

    fn release_buffer(&mut self, id: BufferId) {
        if let Some(buffer) = self.buffers.remove(id) {
            buffer.destroy();
        }
    }

    fn bind_hit_target(&mut self) -> Result<(), GpuError> {
        self.ensure_hit_target();
        self.hit_bound = true;
        self.hit_pass = PendingPass::default();
        Ok(())
    }

    fn unbind_hit_target(&mut self) {
        self.hit_bound = false;
        self.hit_pass = PendingPass::default();
    }

    fn clear_target(&mut self) {
        let pass = if self.hit_bound { &mut self.hit_pass } else { &mut self.frame };
        pass.draws.clear();
        pass.clear = true;
    }

    fn draw(&mut self, call: &DrawCall) {
        let pass = if self.hit_bound { &mut self.hit_pass } else { &mut self.frame };
        pass.draws.push(call.clone());
    }

    fn read_pixel(&mut self) -> Result<[u8; 4], GpuError> {
        if !self.hit_bound {
            return Err(GpuError::HitTargetNotBound);
        }
        let pass = std::mem::take(&mut self.hit_pass);

        self.ensure_pipelines(&pass.draws, HIT_FORMAT);
        self.hit_uniforms.ensure_capacity(
            &self.device,
            &self.bind_group_layout,
            self.uniform_stride,
            pass.draws.len(),
        );
        self.hit_uniforms.upload(&self.queue, self.uniform_stride, &pass.draws);

        let Some(hit) = self.hit.as_ref() else {
            return Err(GpuError::HitTargetNotBound);
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("strata hit encoder"),
            });
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("strata hit pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &hit.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: load_op(pass.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            record_draws(
                &mut rpass,
                &pass.draws,
                &self.pipelines,
                &self.buffers,
                &self.hit_uniforms,
                self.uniform_stride,
                HIT_FORMAT,
                (1, 1),
            );
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &hit.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &hit.readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(HIT_READBACK_BYTES as u32),
                    rows_per_image: Some(1),
                },
            },
            wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(Some(encoder.finish()));

        let (sender, receiver) = std::sync::mpsc::channel();
        hit.readback
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| {
                // The receiver outlives the poll below; a failed send only means
                // read_pixel already returned.
                let _ = sender.send(result);
            });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| GpuError::Readback(e.to_string()))?;
        receiver
            .recv()
            .map_err(|e| GpuError::Readback(e.to_string()))?
            .map_err(|e| GpuError::Readback(e.to_string()))?;

        let mut pixel = [0u8; 4];
        {
            let mapped = hit.readback.slice(..).get_mapped_range();
            pixel.copy_from_slice(&mapped[..4]);
        }
        hit.readback.unmap();

        Ok(pixel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scissor_none_covers_target() {
        assert_eq!(clamp_scissor(None, (800, 600)), Some((0, 0, 800, 600)));
    }

    #[test]
    fn scissor_is_clamped_to_target() {
        let r = ScissorRect { x: 700, y: 500, width: 200, height: 200 };
        assert_eq!(clamp_scissor(Some(r), (800, 600)), Some((700, 500, 100, 100)));
    }

    #[test]
    fn scissor_outside_target_is_skipped() {
        let r = ScissorRect { x: 900, y: 0, width: 10, height: 10 };
        assert_eq!(clamp_scissor(Some(r), (800, 600)), None);
    }
}
