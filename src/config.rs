use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use palette::{LinSrgba, Srgb, Srgba};
use serde::Deserialize;

use crate::carousel::GoToPolicy;
use crate::deck::{Deck, Slide};

/// How the strip animates when navigation crosses the end of the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Wraparound {
    /// Slide back across the whole strip to the opposite end.
    #[default]
    Rewind,
    /// Keep moving in the same direction onto a copy of the opposite end.
    Continue,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CarouselOptions {
    /// Whether the autoplay timer starts active.
    pub auto_play: bool,
    /// Delay between automatic advances, in ms.
    pub auto_play_interval_ms: u64,
    /// Show the previous/next buttons.
    pub show_navigation: bool,
    /// Show one pagination dot per slide.
    pub show_dots: bool,
    /// Show the play/pause toggle.
    pub show_play_pause: bool,
    /// Duration of the strip slide animation, in ms. Zero disables easing.
    pub transition_duration_ms: u64,
    pub wraparound: Wraparound,
    /// What `go_to` does with an index outside the deck.
    pub go_to_policy: GoToPolicy,
}

impl Default for CarouselOptions {
    fn default() -> Self {
        Self {
            auto_play: true,
            auto_play_interval_ms: 4000,
            show_navigation: true,
            show_dots: true,
            show_play_pause: true,
            transition_duration_ms: 600,
            wraparound: Wraparound::default(),
            go_to_policy: GoToPolicy::default(),
        }
    }
}

impl CarouselOptions {
    pub fn auto_play_interval(&self) -> Duration {
        Duration::from_millis(self.auto_play_interval_ms)
    }

    pub fn transition_duration(&self) -> Duration {
        Duration::from_millis(self.transition_duration_ms)
    }
}

/// Logical size of the visible slide area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportSize {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ThemeConfig {
    /// Active pagination dot.
    pub accent: Option<String>,
    /// Inactive pagination dots.
    pub dot: Option<String>,
    /// Container, dots bar and placeholder background.
    pub background: Option<String>,
    pub placeholder_text: Option<String>,
    pub caption_text: Option<String>,
}

/// Theme colours resolved to linear RGBA.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Theme {
    pub accent: LinSrgba<f32>,
    pub dot: LinSrgba<f32>,
    pub background: LinSrgba<f32>,
    pub placeholder_text: LinSrgba<f32>,
    pub caption_text: LinSrgba<f32>,
}

impl ThemeConfig {
    pub fn resolve(&self) -> Result<Theme> {
        Ok(Theme {
            accent: resolve_colour("theme.accent", self.accent.as_deref(), "#667eea")?,
            dot: resolve_colour("theme.dot", self.dot.as_deref(), "#dddddd")?,
            background: resolve_colour("theme.background", self.background.as_deref(), "#ffffff")?,
            placeholder_text: resolve_colour(
                "theme.placeholder-text",
                self.placeholder_text.as_deref(),
                "#333333",
            )?,
            caption_text: resolve_colour(
                "theme.caption-text",
                self.caption_text.as_deref(),
                "#ffffff",
            )?,
        })
    }
}

fn resolve_colour(key: &str, value: Option<&str>, fallback: &str) -> Result<LinSrgba<f32>> {
    let source = value.unwrap_or(fallback);
    parse_hex_color(source).with_context(|| format!("{key} must be a #rrggbb or #rrggbbaa colour"))
}

/// Parses `#rgb`, `#rrggbb` or `#rrggbbaa` into linear RGBA.
pub fn parse_hex_color(input: &str) -> Option<LinSrgba<f32>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(rgba) = Srgba::<u8>::from_str(trimmed) {
        let rgba_f32: Srgba<f32> = rgba.into_format();
        return Some(rgba_f32.into_linear());
    }

    let rgb = Srgb::<u8>::from_str(trimmed).ok()?;
    let rgba = Srgba::new(rgb.red, rgb.green, rgb.blue, 255);
    let rgba_f32: Srgba<f32> = rgba.into_format();
    Some(rgba_f32.into_linear())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Carousel behaviour and control visibility.
    pub carousel: CarouselOptions,
    pub viewport: ViewportSize,
    pub theme: ThemeConfig,
    /// Inline deck. Mutually exclusive with `deck-file`.
    pub slides: Option<Vec<Slide>>,
    /// YAML file holding the deck, relative to the configuration file.
    pub deck_file: Option<PathBuf>,
    /// Maximum number of concurrent image decodes in the loader.
    pub loader_max_concurrent_decodes: usize,
    /// Reload the configuration and deck files when they change on disk.
    pub watch_for_changes: bool,
    /// Directory of the file this configuration was read from.
    #[serde(skip)]
    source_dir: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            carousel: CarouselOptions::default(),
            viewport: ViewportSize::default(),
            theme: ThemeConfig::default(),
            slides: None,
            deck_file: None,
            loader_max_concurrent_decodes: 4,
            watch_for_changes: false,
            source_dir: PathBuf::new(),
        }
    }
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_yaml_str(&s, base_dir)
    }

    /// Parses YAML; relative paths inside resolve against `base_dir`.
    pub fn from_yaml_str(s: &str, base_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut cfg: Configuration = serde_yaml::from_str(s)?;
        cfg.source_dir = base_dir.into();
        Ok(cfg)
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.carousel.auto_play_interval_ms > 0,
            "carousel.auto-play-interval-ms must be greater than zero"
        );
        ensure!(
            self.loader_max_concurrent_decodes > 0,
            "loader-max-concurrent-decodes must be greater than zero"
        );
        ensure!(
            self.viewport.width > 0 && self.viewport.height > 0,
            "viewport width and height must be greater than zero"
        );
        if self.slides.is_some() && self.deck_file.is_some() {
            bail!("slides and deck-file are mutually exclusive");
        }
        self.theme.resolve().context("invalid theme")?;
        if let Some(slides) = &self.slides {
            Deck::new(slides.clone(), self.source_dir.clone()).context("invalid slides")?;
        }
        Ok(self)
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// Absolute-or-config-relative path of the external deck file, if any.
    pub fn deck_file_path(&self) -> Option<PathBuf> {
        self.deck_file.as_ref().map(|p| {
            if p.is_absolute() {
                p.clone()
            } else {
                self.source_dir.join(p)
            }
        })
    }

    /// Builds the deck from inline slides or the deck file. No deck at all is
    /// an empty deck.
    pub fn load_deck(&self) -> Result<Deck> {
        if let Some(path) = self.deck_file_path() {
            return Deck::from_yaml_file(&path);
        }
        match &self.slides {
            Some(slides) => Ok(Deck::new(slides.clone(), self.source_dir.clone())?),
            None => Ok(Deck::empty()),
        }
    }
}
