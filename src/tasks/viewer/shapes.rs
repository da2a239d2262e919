use bytemuck::{Pod, Zeroable};
use lyon::math::{Box2D, point};
use lyon::path::Path;
use lyon::tessellation::{BuffersBuilder, FillOptions, FillTessellator, FillVertex, VertexBuffers};
use palette::LinSrgba;
use tracing::warn;
use wgpu::util::DeviceExt;

use crate::config::{Theme, parse_hex_color};
use crate::deck::Deck;
use crate::layout::{Button, Control, Rect, Scene, StripScene};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(super) struct ShapeVertex {
    position: [f32; 2],
    color: [f32; 4],
}

impl ShapeVertex {
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x4];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<ShapeVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRIBUTES,
        }
    }
}

pub(super) type ShapeGeometry = VertexBuffers<ShapeVertex, u32>;

/// Fixed control colours; the theme only covers the dots and backgrounds.
struct ControlPalette {
    nav_fill: [f32; 4],
    nav_icon: [f32; 4],
    play_fill: [f32; 4],
    play_icon: [f32; 4],
    caption_shade: [f32; 4],
}

impl ControlPalette {
    fn new() -> Self {
        let nav_icon = parse_hex_color("#333333").map_or([0.033, 0.033, 0.033, 1.0], to_array);
        Self {
            nav_fill: [1.0, 1.0, 1.0, 0.9],
            nav_icon,
            play_fill: [0.0, 0.0, 0.0, 0.6],
            play_icon: [1.0, 1.0, 1.0, 1.0],
            caption_shade: [0.0, 0.0, 0.0, 0.8],
        }
    }
}

fn to_array(color: LinSrgba<f32>) -> [f32; 4] {
    [color.red, color.green, color.blue, color.alpha]
}

/// Tessellates the non-image parts of a strip scene: caption shading,
/// buttons and pagination dots. Positions come out in clip space.
pub(super) fn build_geometry(scene: &Scene, deck: &Deck, theme: &Theme, window: (f32, f32)) -> ShapeGeometry {
    let mut geometry = ShapeGeometry::new();
    let Scene::Strip(strip) = scene else {
        return geometry;
    };
    let (width, height) = window;
    if width <= 0.0 || height <= 0.0 {
        return geometry;
    }

    let palette = ControlPalette::new();
    let mut tessellator = FillTessellator::new();

    add_caption_shading(&mut geometry, strip, deck, palette.caption_shade);

    if let Some(bar) = strip.dots_bar {
        add_rect(&mut geometry, bar, to_array(theme.background));
    }
    for dot in &strip.dots {
        let color = if dot.active { theme.accent } else { theme.dot };
        add_circle(&mut tessellator, &mut geometry, dot.bounds, to_array(color));
    }

    for button in &strip.buttons {
        add_button(&mut tessellator, &mut geometry, button, &palette);
    }

    for vertex in &mut geometry.vertices {
        let [x, y] = vertex.position;
        vertex.position = [(x / width) * 2.0 - 1.0, 1.0 - (y / height) * 2.0];
    }
    geometry
}

fn add_caption_shading(geometry: &mut ShapeGeometry, strip: &StripScene, deck: &Deck, shade: [f32; 4]) {
    let clear = [shade[0], shade[1], shade[2], 0.0];
    for placement in &strip.slides {
        let Some(slide) = deck.get(placement.index) else {
            continue;
        };
        if slide.title.is_empty() && slide.description.is_empty() {
            continue;
        }
        let r = placement.caption;
        add_quad(
            geometry,
            [
                ([r.x, r.y], clear),
                ([r.right(), r.y], clear),
                ([r.right(), r.bottom()], shade),
                ([r.x, r.bottom()], shade),
            ],
        );
    }
}

fn add_rect(geometry: &mut ShapeGeometry, r: Rect, color: [f32; 4]) {
    add_quad(
        geometry,
        [
            ([r.x, r.y], color),
            ([r.right(), r.y], color),
            ([r.right(), r.bottom()], color),
            ([r.x, r.bottom()], color),
        ],
    );
}

/// Corners in clockwise order starting top-left.
fn add_quad(geometry: &mut ShapeGeometry, corners: [([f32; 2], [f32; 4]); 4]) {
    let base = geometry.vertices.len() as u32;
    geometry.vertices.extend(
        corners
            .iter()
            .map(|&(position, color)| ShapeVertex { position, color }),
    );
    geometry
        .indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

fn add_circle(tessellator: &mut FillTessellator, geometry: &mut ShapeGeometry, bounds: Rect, color: [f32; 4]) {
    let (cx, cy) = bounds.center();
    let radius = bounds.width.min(bounds.height) * 0.5;
    if let Err(err) = tessellator.tessellate_circle(
        point(cx, cy),
        radius,
        &FillOptions::default(),
        &mut BuffersBuilder::new(geometry, |vertex: FillVertex| ShapeVertex {
            position: vertex.position().to_array(),
            color,
        }),
    ) {
        warn!(error = %err, "circle tessellation failed");
    }
}

fn add_path(tessellator: &mut FillTessellator, geometry: &mut ShapeGeometry, path: &Path, color: [f32; 4]) {
    if let Err(err) = tessellator.tessellate_path(
        path,
        &FillOptions::default(),
        &mut BuffersBuilder::new(geometry, |vertex: FillVertex| ShapeVertex {
            position: vertex.position().to_array(),
            color,
        }),
    ) {
        warn!(error = %err, "icon tessellation failed");
    }
}

fn add_button(
    tessellator: &mut FillTessellator,
    geometry: &mut ShapeGeometry,
    button: &Button,
    palette: &ControlPalette,
) {
    let b = button.bounds;
    let (cx, cy) = b.center();
    let unit = b.width.min(b.height);
    match button.control {
        Control::Previous | Control::Next => {
            add_circle(tessellator, geometry, b, palette.nav_fill);
            let facing = if button.control == Control::Previous { -1.0 } else { 1.0 };
            add_path(tessellator, geometry, &chevron(cx, cy, unit * 0.18, facing), palette.nav_icon);
        }
        Control::PlayPause { playing } => {
            add_circle(tessellator, geometry, b, palette.play_fill);
            let icon = if playing {
                pause_bars(cx, cy, unit * 0.2)
            } else {
                play_triangle(cx, cy, unit * 0.22)
            };
            add_path(tessellator, geometry, &icon, palette.play_icon);
        }
        Control::Dot(_) => {}
    }
}

/// A filled chevron pointing right for `facing = 1` and left for `-1`.
fn chevron(cx: f32, cy: f32, size: f32, facing: f32) -> Path {
    let thickness = size * 0.55;
    let tip = cx + facing * size * 0.5;
    let back = cx - facing * size * 0.5;
    let mut builder = Path::builder();
    builder.begin(point(back, cy - size));
    builder.line_to(point(back + facing * thickness, cy - size));
    builder.line_to(point(tip + facing * thickness, cy));
    builder.line_to(point(back + facing * thickness, cy + size));
    builder.line_to(point(back, cy + size));
    builder.line_to(point(tip, cy));
    builder.close();
    builder.build()
}

fn play_triangle(cx: f32, cy: f32, size: f32) -> Path {
    // Nudged right so the triangle looks centred in the circle.
    let offset = size * 0.15;
    let mut builder = Path::builder();
    builder.begin(point(cx - size * 0.8 + offset, cy - size));
    builder.line_to(point(cx + size + offset, cy));
    builder.line_to(point(cx - size * 0.8 + offset, cy + size));
    builder.close();
    builder.build()
}

fn pause_bars(cx: f32, cy: f32, size: f32) -> Path {
    let bar = size * 0.6;
    let gap = size * 0.4;
    let mut builder = Path::builder();
    for left in [cx - gap - bar, cx + gap] {
        builder.add_rectangle(
            &Box2D::new(point(left, cy - size), point(left + bar, cy + size)),
            lyon::path::Winding::Positive,
        );
    }
    builder.build()
}

pub(super) struct ShapeRenderer {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,
}

impl ShapeRenderer {
    pub(super) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("shape-shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shape.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shape-pipeline-layout"),
            bind_group_layouts: &[],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("shape-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[ShapeVertex::layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
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

        Self {
            pipeline,
            vertex_buffer: None,
            index_buffer: None,
            index_count: 0,
        }
    }

    pub(super) fn update(&mut self, device: &wgpu::Device, geometry: &ShapeGeometry) {
        if geometry.vertices.is_empty() || geometry.indices.is_empty() {
            self.vertex_buffer = None;
            self.index_buffer = None;
            self.index_count = 0;
            return;
        }
        self.vertex_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shape-vertices"),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        self.index_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shape-indices"),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        }));
        self.index_count = geometry.indices.len() as u32;
    }

    pub(super) fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if self.index_count == 0 {
            return;
        }
        if let (Some(vertex_buffer), Some(index_buffer)) = (&self.vertex_buffer, &self.index_buffer) {
            pass.set_pipeline(&self.pipeline);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.set_index_buffer(index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..self.index_count, 0, 0..1);
        }
    }
}
