use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::events::PreparedImageCpu;

/// Shown for slides whose image is still loading or failed to load.
const FALLBACK_RGBA: [u8; 4] = [0x4b, 0x55, 0x63, 0xff];

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct SlideRectUniform {
    bounds: [f32; 4],
}

struct SlideTexture {
    bind_group: wgpu::BindGroup,
}

struct RectSlot {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

struct SlideDraw {
    slot: usize,
    reference: Option<String>,
}

/// Draws slide images as textured quads, one uniform slot per visible slide.
pub(super) struct SlideRenderer {
    pipeline: wgpu::RenderPipeline,
    texture_layout: wgpu::BindGroupLayout,
    rect_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: HashMap<String, SlideTexture>,
    fallback: SlideTexture,
    slots: Vec<RectSlot>,
    draws: Vec<SlideDraw>,
}

impl SlideRenderer {
    pub(super) fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("slide-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("slide.wgsl").into()),
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("slide-texture-bgl"),
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

        let rect_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("slide-rect-bgl"),
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

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("slide-pipeline-layout"),
            bind_group_layouts: &[&texture_layout, &rect_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("slide-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("slide-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let fallback = upload(
            device,
            queue,
            &texture_layout,
            &sampler,
            "slide-fallback",
            1,
            1,
            &FALLBACK_RGBA,
        );

        Self {
            pipeline,
            texture_layout,
            rect_layout,
            sampler,
            textures: HashMap::new(),
            fallback,
            slots: Vec::new(),
            draws: Vec::new(),
        }
    }

    /// Uploads a decoded image for `reference`, replacing any earlier one.
    pub(super) fn insert(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        reference: &str,
        image: &PreparedImageCpu,
    ) {
        if image.width == 0 || image.height == 0 {
            return;
        }
        let texture = upload(
            device,
            queue,
            &self.texture_layout,
            &self.sampler,
            "slide-image",
            image.width,
            image.height,
            &image.pixels,
        );
        debug!(reference, width = image.width, height = image.height, "slide texture uploaded");
        self.textures.insert(reference.to_string(), texture);
    }

    /// Records the quads for this frame. `quads` holds an image reference and
    /// clip-space bounds (left, top, right, bottom) per visible slide.
    pub(super) fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        quads: &[(&str, [f32; 4])],
    ) {
        while self.slots.len() < quads.len() {
            let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("slide-rect-uniform"),
                contents: bytemuck::bytes_of(&SlideRectUniform { bounds: [0.0; 4] }),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("slide-rect-bind-group"),
                layout: &self.rect_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            self.slots.push(RectSlot { buffer, bind_group });
        }

        self.draws.clear();
        for (slot, (reference, bounds)) in quads.iter().enumerate() {
            queue.write_buffer(
                &self.slots[slot].buffer,
                0,
                bytemuck::bytes_of(&SlideRectUniform { bounds: *bounds }),
            );
            let reference = self
                .textures
                .contains_key(*reference)
                .then(|| reference.to_string());
            self.draws.push(SlideDraw { slot, reference });
        }
    }

    pub(super) fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.draws.is_empty() {
            return;
        }
        pass.set_pipeline(&self.pipeline);
        for draw in &self.draws {
            let texture = draw
                .reference
                .as_ref()
                .and_then(|r| self.textures.get(r))
                .unwrap_or(&self.fallback);
            pass.set_bind_group(0, &texture.bind_group, &[]);
            pass.set_bind_group(1, &self.slots[draw.slot].bind_group, &[]);
            pass.draw(0..6, 0..1);
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn upload(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    label: &str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> SlideTexture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        texture.as_image_copy(),
        pixels,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });
    SlideTexture { bind_group }
}
