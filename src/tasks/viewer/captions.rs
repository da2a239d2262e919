use std::path::PathBuf;

use fontdb::{Database, Family, Query};
use glyphon::cosmic_text::{Align, Weight};
use glyphon::{
    Attrs, Buffer, Cache, Color, FamilyOwned, FontSystem, Metrics, Resolution, Shaping, SwashCache,
    TextArea, TextAtlas, TextBounds, TextRenderer, Viewport, Wrap,
};
use palette::{LinSrgba, Srgba};
use tracing::warn;
use winit::dpi::PhysicalSize;

use crate::config::Theme;
use crate::deck::Deck;
use crate::layout::{CAPTION_PADDING, Rect, Scene};

const PLACEHOLDER_MESSAGE: &str = "No items to display";
const TITLE_SIZE: f32 = 28.8;
const TITLE_LINE_HEIGHT: f32 = 1.2;
const DESCRIPTION_SIZE: f32 = 16.0;
const DESCRIPTION_LINE_HEIGHT: f32 = 1.4;
const PLACEHOLDER_SIZE: f32 = 18.0;
/// Space between the title and the description.
const CAPTION_GAP: f32 = 8.0;

struct SlideCaption {
    title: Option<Buffer>,
    description: Option<Buffer>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct CaptionKey {
    deck_revision: u64,
    slide_width_px: u32,
    scale: f32,
}

/// Renders slide titles, descriptions and the empty-deck placeholder.
pub(super) struct CaptionRenderer {
    viewport: Viewport,
    atlas: TextAtlas,
    text_renderer: TextRenderer,
    font_system: FontSystem,
    swash_cache: SwashCache,
    font_family: FamilyOwned,
    captions: Vec<SlideCaption>,
    placeholder: Buffer,
    placeholder_key: Option<(u32, f32)>,
    key: Option<CaptionKey>,
}

impl CaptionRenderer {
    pub(super) fn new(device: &wgpu::Device, queue: &wgpu::Queue, format: wgpu::TextureFormat) -> Self {
        let mut font_system = FontSystem::new();
        initialize_font_database(font_system.db_mut());
        let font_family = resolve_font_family(&font_system);
        let mut placeholder = Buffer::new(
            &mut font_system,
            Metrics::new(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE * 1.2),
        );
        placeholder.set_wrap(&mut font_system, Wrap::WordOrGlyph);

        let cache = Cache::new(device);
        let viewport = Viewport::new(device, &cache);
        let mut atlas = TextAtlas::new(device, queue, &cache, format);
        let text_renderer =
            TextRenderer::new(&mut atlas, device, wgpu::MultisampleState::default(), None);

        Self {
            viewport,
            atlas,
            text_renderer,
            font_system,
            swash_cache: SwashCache::new(),
            font_family,
            captions: Vec::new(),
            placeholder,
            placeholder_key: None,
            key: None,
        }
    }

    /// Shapes and queues the text visible in `scene` for the next draw.
    #[allow(clippy::too_many_arguments)]
    pub(super) fn prepare(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &Scene,
        deck: &Deck,
        deck_revision: u64,
        theme: &Theme,
        size: PhysicalSize<u32>,
        scale: f32,
    ) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.viewport.update(
            queue,
            Resolution {
                width: size.width,
                height: size.height,
            },
        );

        let mut areas: Vec<TextArea<'_>> = Vec::new();
        match scene {
            Scene::Placeholder { bounds } => {
                self.shape_placeholder(size.width, scale);
                let text_height = buffer_height(&self.placeholder);
                let bounds = to_physical(*bounds, scale);
                areas.push(TextArea {
                    buffer: &self.placeholder,
                    left: bounds.x,
                    top: bounds.y + ((bounds.height - text_height) * 0.5).max(0.0),
                    scale: 1.0,
                    bounds: clip_bounds(bounds, size),
                    default_color: to_text_color(theme.placeholder_text),
                    custom_glyphs: &[],
                });
            }
            Scene::Strip(strip) => {
                let slide_width_px = (strip.viewport.width * scale).round() as u32;
                self.shape_captions(deck, deck_revision, slide_width_px, scale);
                let color = to_text_color(theme.caption_text);
                let padding = CAPTION_PADDING * scale;
                for placement in &strip.slides {
                    let Some(caption) = self.captions.get(placement.index) else {
                        continue;
                    };
                    let slide = to_physical(placement.bounds, scale);
                    let clip = clip_bounds(slide, size);
                    let left = slide.x + padding;
                    let mut bottom = slide.bottom() - padding;

                    if let Some(description) = &caption.description {
                        bottom -= buffer_height(description);
                        areas.push(TextArea {
                            buffer: description,
                            left,
                            top: bottom,
                            scale: 1.0,
                            bounds: clip,
                            default_color: color,
                            custom_glyphs: &[],
                        });
                        bottom -= CAPTION_GAP * scale;
                    }
                    if let Some(title) = &caption.title {
                        bottom -= buffer_height(title);
                        areas.push(TextArea {
                            buffer: title,
                            left,
                            top: bottom,
                            scale: 1.0,
                            bounds: clip,
                            default_color: color,
                            custom_glyphs: &[],
                        });
                    }
                }
            }
        }

        if let Err(err) = self.text_renderer.prepare(
            device,
            queue,
            &mut self.font_system,
            &mut self.atlas,
            &self.viewport,
            areas,
            &mut self.swash_cache,
        ) {
            warn!(error = %err, "caption prepare failed");
        }
    }

    pub(super) fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        if let Err(err) = self.text_renderer.render(&self.atlas, &self.viewport, pass) {
            warn!(error = %err, "caption draw failed");
        }
    }

    pub(super) fn trim(&mut self) {
        self.atlas.trim();
    }

    fn shape_placeholder(&mut self, width_px: u32, scale: f32) {
        if self.placeholder_key == Some((width_px, scale)) {
            return;
        }
        let size = PLACEHOLDER_SIZE * scale;
        self.placeholder.set_metrics_and_size(
            &mut self.font_system,
            Metrics::new(size, size * 1.2),
            Some(width_px as f32),
            None,
        );
        let attrs = Attrs::new().family(self.font_family.as_family());
        self.placeholder.set_text(
            &mut self.font_system,
            PLACEHOLDER_MESSAGE,
            &attrs,
            Shaping::Advanced,
            None,
        );
        for line in &mut self.placeholder.lines {
            line.set_align(Some(Align::Center));
        }
        self.placeholder.shape_until_scroll(&mut self.font_system, false);
        self.placeholder_key = Some((width_px, scale));
    }

    fn shape_captions(&mut self, deck: &Deck, deck_revision: u64, slide_width_px: u32, scale: f32) {
        let key = CaptionKey {
            deck_revision,
            slide_width_px,
            scale,
        };
        if self.key == Some(key) {
            return;
        }
        let text_width = (slide_width_px as f32 - 2.0 * CAPTION_PADDING * scale).max(1.0);
        let family = self.font_family.clone();
        let title_attrs = Attrs::new().family(family.as_family()).weight(Weight::BOLD);
        let body_attrs = Attrs::new().family(family.as_family());

        self.captions = deck
            .iter()
            .map(|slide| SlideCaption {
                title: shape_text(
                    &mut self.font_system,
                    &slide.title,
                    &title_attrs,
                    TITLE_SIZE * scale,
                    TITLE_LINE_HEIGHT,
                    text_width,
                ),
                description: shape_text(
                    &mut self.font_system,
                    &slide.description,
                    &body_attrs,
                    DESCRIPTION_SIZE * scale,
                    DESCRIPTION_LINE_HEIGHT,
                    text_width,
                ),
            })
            .collect();
        self.key = Some(key);
    }
}

fn shape_text(
    font_system: &mut FontSystem,
    text: &str,
    attrs: &Attrs<'_>,
    font_size: f32,
    line_height: f32,
    width: f32,
) -> Option<Buffer> {
    if text.trim().is_empty() {
        return None;
    }
    let metrics = Metrics::new(font_size, font_size * line_height);
    let mut buffer = Buffer::new(font_system, metrics);
    buffer.set_wrap(font_system, Wrap::WordOrGlyph);
    buffer.set_metrics_and_size(font_system, metrics, Some(width), None);
    buffer.set_text(font_system, text, attrs, Shaping::Advanced, None);
    buffer.shape_until_scroll(font_system, false);
    Some(buffer)
}

fn buffer_height(buffer: &Buffer) -> f32 {
    buffer.layout_runs().map(|run| run.line_height).sum()
}

fn to_physical(rect: Rect, scale: f32) -> Rect {
    Rect::new(
        rect.x * scale,
        rect.y * scale,
        rect.width * scale,
        rect.height * scale,
    )
}

fn clip_bounds(rect: Rect, size: PhysicalSize<u32>) -> TextBounds {
    TextBounds {
        left: rect.x.max(0.0) as i32,
        top: rect.y.max(0.0) as i32,
        right: rect.right().min(size.width as f32) as i32,
        bottom: rect.bottom().min(size.height as f32) as i32,
    }
}

fn initialize_font_database(db: &mut Database) {
    db.load_system_fonts();
    let bundled_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/fonts");
    if bundled_path.exists() {
        db.load_fonts_dir(&bundled_path);
    }
}

fn resolve_font_family(font_system: &FontSystem) -> FamilyOwned {
    let query = Query {
        families: &[Family::Name("DejaVu Sans")],
        ..Default::default()
    };
    if font_system.db().query(&query).is_some() {
        FamilyOwned::Name("DejaVu Sans".into())
    } else {
        FamilyOwned::SansSerif
    }
}

fn to_text_color(color: LinSrgba<f32>) -> Color {
    let srgb: Srgba<f32> = Srgba::from_linear(color);
    let srgb_u8: Srgba<u8> = srgb.into_format();
    Color::rgba(srgb_u8.red, srgb_u8.green, srgb_u8.blue, srgb_u8.alpha)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_bounds_stay_on_the_surface() {
        let size = PhysicalSize::new(800, 452);
        let bounds = clip_bounds(Rect::new(-200.0, 0.0, 800.0, 400.0), size);
        assert_eq!(bounds.left, 0);
        assert_eq!(bounds.right, 600);
        assert_eq!(bounds.bottom, 400);
    }

    #[test]
    fn text_colour_round_trips_to_srgb_bytes() {
        let color = crate::config::parse_hex_color("#333333").unwrap();
        assert_eq!(to_text_color(color), Color::rgba(0x33, 0x33, 0x33, 0xff));
    }
}
