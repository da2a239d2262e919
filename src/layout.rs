//! Render model of the carousel: where slides, controls and dots go, in
//! logical pixels, and which control a pointer position hits.

use crate::config::{CarouselOptions, ViewportSize};
use crate::events::CarouselCommand;

pub const NAV_BUTTON_SIZE: f32 = 50.0;
pub const NAV_BUTTON_MARGIN: f32 = 20.0;
pub const PLAY_BUTTON_SIZE: f32 = 40.0;
pub const PLAY_BUTTON_MARGIN: f32 = 20.0;
pub const DOT_SIZE: f32 = 12.0;
pub const DOT_GAP: f32 = 10.0;
pub const DOTS_BAR_PADDING: f32 = 20.0;
pub const CAPTION_PADDING: f32 = 32.0;
/// Height of the bottom gradient behind a slide caption.
pub const CAPTION_BOX_HEIGHT: f32 = 140.0;

pub fn dots_bar_height() -> f32 {
    DOT_SIZE + DOTS_BAR_PADDING * 2.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Hit test against the circle inscribed in this rect.
    pub fn circle_contains(&self, x: f32, y: f32) -> bool {
        let (cx, cy) = self.center();
        let r = self.width.min(self.height) * 0.5;
        let (dx, dy) = (x - cx, y - cy);
        dx * dx + dy * dy <= r * r
    }
}

/// Which controls the host asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlVisibility {
    pub navigation: bool,
    pub dots: bool,
    pub play_pause: bool,
}

impl From<&CarouselOptions> for ControlVisibility {
    fn from(options: &CarouselOptions) -> Self {
        Self {
            navigation: options.show_navigation,
            dots: options.show_dots,
            play_pause: options.show_play_pause,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Previous,
    Next,
    PlayPause { playing: bool },
    Dot(usize),
}

impl Control {
    pub fn command(&self) -> CarouselCommand {
        match *self {
            Control::Previous => CarouselCommand::Previous,
            Control::Next => CarouselCommand::Next,
            Control::PlayPause { .. } => CarouselCommand::TogglePlayback,
            Control::Dot(index) => CarouselCommand::GoTo(index),
        }
    }

    /// Accessible label of the control.
    pub fn label(&self) -> String {
        match *self {
            Control::Previous => "Previous slide".to_string(),
            Control::Next => "Next slide".to_string(),
            Control::PlayPause { playing: true } => "Pause".to_string(),
            Control::PlayPause { playing: false } => "Play".to_string(),
            Control::Dot(index) => format!("Go to slide {}", index + 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlidePlacement {
    pub index: usize,
    pub bounds: Rect,
    /// Bottom band holding the gradient and the caption text.
    pub caption: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Button {
    pub control: Control,
    pub bounds: Rect,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotMarker {
    pub index: usize,
    pub bounds: Rect,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StripScene {
    pub viewport: Rect,
    pub slides: Vec<SlidePlacement>,
    pub buttons: Vec<Button>,
    pub dots_bar: Option<Rect>,
    pub dots: Vec<DotMarker>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scene {
    /// Empty deck: a neutral "no content" message and nothing else.
    Placeholder { bounds: Rect },
    Strip(StripScene),
}

#[derive(Debug, Clone, Copy)]
pub struct LayoutInput {
    /// Logical window size.
    pub window: (f32, f32),
    pub visibility: ControlVisibility,
    pub deck_len: usize,
    pub current_index: Option<usize>,
    pub is_playing: bool,
    /// Animated strip position, in slides.
    pub strip_position: f32,
}

/// Initial logical window size for a viewport.
pub fn window_size(viewport: ViewportSize, visibility: ControlVisibility) -> (f32, f32) {
    let bar = if visibility.dots { dots_bar_height() } else { 0.0 };
    (viewport.width as f32, viewport.height as f32 + bar)
}

pub fn compose(input: &LayoutInput) -> Scene {
    let (width, height) = input.window;
    let Some(current) = input.current_index.filter(|_| input.deck_len > 0) else {
        return Scene::Placeholder {
            bounds: Rect::new(0.0, 0.0, width, height),
        };
    };

    let bar_height = if input.visibility.dots {
        dots_bar_height().min(height)
    } else {
        0.0
    };
    let viewport = Rect::new(0.0, 0.0, width, (height - bar_height).max(0.0));
    let interactive = input.deck_len > 1;

    let slides = place_slides(viewport, input.deck_len, input.strip_position);

    let mut buttons = Vec::new();
    if interactive && input.visibility.navigation {
        let y = viewport.y + (viewport.height - NAV_BUTTON_SIZE) * 0.5;
        buttons.push(Button {
            control: Control::Previous,
            bounds: Rect::new(NAV_BUTTON_MARGIN, y, NAV_BUTTON_SIZE, NAV_BUTTON_SIZE),
        });
        buttons.push(Button {
            control: Control::Next,
            bounds: Rect::new(
                viewport.right() - NAV_BUTTON_MARGIN - NAV_BUTTON_SIZE,
                y,
                NAV_BUTTON_SIZE,
                NAV_BUTTON_SIZE,
            ),
        });
    }
    if interactive && input.visibility.play_pause {
        buttons.push(Button {
            control: Control::PlayPause {
                playing: input.is_playing,
            },
            bounds: Rect::new(
                viewport.right() - PLAY_BUTTON_MARGIN - PLAY_BUTTON_SIZE,
                viewport.y + PLAY_BUTTON_MARGIN,
                PLAY_BUTTON_SIZE,
                PLAY_BUTTON_SIZE,
            ),
        });
    }

    let dots_bar = (input.visibility.dots && bar_height > 0.0)
        .then(|| Rect::new(0.0, viewport.bottom(), width, bar_height));
    let dots = match dots_bar {
        Some(bar) if interactive => place_dots(bar, input.deck_len, current),
        _ => Vec::new(),
    };

    Scene::Strip(StripScene {
        viewport,
        slides,
        buttons,
        dots_bar,
        dots,
    })
}

fn place_slides(viewport: Rect, len: usize, position: f32) -> Vec<SlidePlacement> {
    let w = viewport.width;
    if w <= 0.0 {
        return Vec::new();
    }
    let n = len as i64;
    // Copies one deck-length either side cover positions left over from a
    // continuing wrap.
    let copies: &[i64] = if len > 1 { &[-1, 0, 1] } else { &[0] };
    let mut placements = Vec::new();
    for index in 0..len {
        for copy in copies {
            let slot = index as i64 + copy * n;
            let x = (slot as f32 - position) * w;
            if x > -w && x < w {
                let bounds = Rect::new(viewport.x + x, viewport.y, w, viewport.height);
                let caption_height = CAPTION_BOX_HEIGHT.min(viewport.height);
                placements.push(SlidePlacement {
                    index,
                    bounds,
                    caption: Rect::new(
                        bounds.x,
                        bounds.bottom() - caption_height,
                        w,
                        caption_height,
                    ),
                });
            }
        }
    }
    placements.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));
    placements
}

fn place_dots(bar: Rect, len: usize, current: usize) -> Vec<DotMarker> {
    let total = len as f32 * DOT_SIZE + (len.saturating_sub(1)) as f32 * DOT_GAP;
    let start_x = bar.x + (bar.width - total) * 0.5;
    let y = bar.y + (bar.height - DOT_SIZE) * 0.5;
    (0..len)
        .map(|index| DotMarker {
            index,
            bounds: Rect::new(
                start_x + index as f32 * (DOT_SIZE + DOT_GAP),
                y,
                DOT_SIZE,
                DOT_SIZE,
            ),
            active: index == current,
        })
        .collect()
}

/// Control under the logical point `(x, y)`, if any. Buttons sit above the
/// strip, so they win over anything below them.
pub fn hit_test(scene: &Scene, x: f32, y: f32) -> Option<Control> {
    let Scene::Strip(strip) = scene else {
        return None;
    };
    if let Some(button) = strip
        .buttons
        .iter()
        .find(|button| button.bounds.circle_contains(x, y))
    {
        return Some(button.control);
    }
    // Dots are small; accept clicks in the gap around them.
    strip
        .dots
        .iter()
        .find(|dot| {
            let slop = DOT_GAP * 0.5;
            Rect::new(
                dot.bounds.x - slop,
                dot.bounds.y - slop,
                dot.bounds.width + slop * 2.0,
                dot.bounds.height + slop * 2.0,
            )
            .contains(x, y)
        })
        .map(|dot| Control::Dot(dot.index))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(len: usize, position: f32) -> LayoutInput {
        LayoutInput {
            window: (800.0, 452.0),
            visibility: ControlVisibility {
                navigation: true,
                dots: true,
                play_pause: true,
            },
            deck_len: len,
            current_index: (len > 0).then_some(position.round() as usize % len.max(1)),
            is_playing: true,
            strip_position: position,
        }
    }

    #[test]
    fn settled_strip_shows_one_slide() {
        let Scene::Strip(strip) = compose(&input(3, 1.0)) else {
            panic!("expected strip");
        };
        assert_eq!(strip.slides.len(), 1);
        assert_eq!(strip.slides[0].index, 1);
        assert_eq!(strip.slides[0].bounds.x, 0.0);
        assert_eq!(strip.viewport.height, 400.0);
    }

    #[test]
    fn moving_strip_shows_neighbours() {
        let Scene::Strip(strip) = compose(&input(3, 0.5)) else {
            panic!("expected strip");
        };
        let indices: Vec<usize> = strip.slides.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(strip.slides[0].bounds.x, -400.0);
        assert_eq!(strip.slides[1].bounds.x, 400.0);
    }

    #[test]
    fn continuing_wrap_draws_first_slide_after_last() {
        let Scene::Strip(strip) = compose(&input(3, 2.5)) else {
            panic!("expected strip");
        };
        let indices: Vec<usize> = strip.slides.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![2, 0]);
    }

    #[test]
    fn controls_follow_visibility() {
        let mut no_nav = input(3, 0.0);
        no_nav.visibility.navigation = false;
        let Scene::Strip(strip) = compose(&no_nav) else {
            panic!("expected strip");
        };
        assert_eq!(strip.buttons.len(), 1);
        assert!(matches!(strip.buttons[0].control, Control::PlayPause { playing: true }));
        assert_eq!(strip.dots.len(), 3);
        assert!(strip.dots[0].active);
    }

    #[test]
    fn single_slide_suppresses_every_control() {
        let Scene::Strip(strip) = compose(&input(1, 0.0)) else {
            panic!("expected strip");
        };
        assert!(strip.buttons.is_empty());
        assert!(strip.dots.is_empty());
        assert_eq!(strip.slides.len(), 1);
        assert_eq!(hit_test(&Scene::Strip(strip), 45.0, 200.0), None);
    }

    #[test]
    fn empty_deck_is_a_placeholder() {
        let scene = compose(&input(0, 0.0));
        let Scene::Placeholder { bounds } = scene else {
            panic!("expected placeholder");
        };
        assert_eq!(bounds, Rect::new(0.0, 0.0, 800.0, 452.0));
        assert_eq!(hit_test(&scene, 400.0, 200.0), None);
    }

    #[test]
    fn dots_are_centred() {
        let Scene::Strip(strip) = compose(&input(5, 0.0)) else {
            panic!("expected strip");
        };
        let first = strip.dots.first().unwrap().bounds;
        let last = strip.dots.last().unwrap().bounds;
        let left_gap = first.x;
        let right_gap = 800.0 - last.right();
        assert!((left_gap - right_gap).abs() < 1e-3);
        assert_eq!(last.x - first.x, 4.0 * (DOT_SIZE + DOT_GAP));
    }

    #[test]
    fn hit_testing_maps_to_commands() {
        let scene = compose(&input(3, 0.0));
        let prev = hit_test(&scene, 45.0, 200.0).unwrap();
        assert_eq!(prev.command(), CarouselCommand::Previous);
        let next = hit_test(&scene, 755.0, 200.0).unwrap();
        assert_eq!(next.command(), CarouselCommand::Next);
        let play = hit_test(&scene, 760.0, 40.0).unwrap();
        assert_eq!(play.label(), "Pause");
        assert_eq!(hit_test(&scene, 400.0, 200.0), None);

        let Scene::Strip(strip) = &scene else {
            unreachable!()
        };
        let (cx, cy) = strip.dots[2].bounds.center();
        let dot = hit_test(&scene, cx, cy).unwrap();
        assert_eq!(dot, Control::Dot(2));
        assert_eq!(dot.label(), "Go to slide 3");
        assert_eq!(dot.command(), CarouselCommand::GoTo(2));
    }

    #[test]
    fn labels() {
        assert_eq!(Control::Previous.label(), "Previous slide");
        assert_eq!(Control::Next.label(), "Next slide");
        assert_eq!(Control::PlayPause { playing: false }.label(), "Play");
    }
}
