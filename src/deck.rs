//! Slide deck: the ordered, session-immutable list of slides shown by the carousel.

use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use url::Url;

/// Stable identifier of a slide. Decks written by hand use integers, decks
/// generated by other tools often use strings; both are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(untagged)]
pub enum SlideId {
    Number(i64),
    Name(String),
}

impl fmt::Display for SlideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlideId::Number(n) => write!(f, "{n}"),
            SlideId::Name(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Slide {
    pub id: SlideId,
    /// Image reference: a filesystem path or a URL.
    pub image: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Where the pixels of a slide come from once its reference is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageSource {
    File(PathBuf),
    /// Any non-`file` URL. Never fetched.
    Remote(Url),
    /// The reference could not be interpreted at all.
    Invalid(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeckError {
    #[error("slide id {0} appears more than once in the deck")]
    DuplicateId(SlideId),
    #[error("slide {0} has an empty image reference")]
    EmptyImage(SlideId),
}

/// Ordered slides plus the directory relative image paths resolve against.
///
/// Cloning is cheap; the slides are shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deck {
    slides: Arc<[Slide]>,
    base_dir: PathBuf,
}

impl Default for Deck {
    fn default() -> Self {
        Self::empty()
    }
}

impl Deck {
    pub fn empty() -> Self {
        Self {
            slides: Arc::from(Vec::new()),
            base_dir: PathBuf::new(),
        }
    }

    /// Builds a deck, rejecting duplicate ids and blank image references.
    pub fn new(slides: Vec<Slide>, base_dir: impl Into<PathBuf>) -> Result<Self, DeckError> {
        {
            let mut seen = HashSet::with_capacity(slides.len());
            for slide in &slides {
                if slide.image.trim().is_empty() {
                    return Err(DeckError::EmptyImage(slide.id.clone()));
                }
                if !seen.insert(&slide.id) {
                    return Err(DeckError::DuplicateId(slide.id.clone()));
                }
            }
        }
        Ok(Self {
            slides: Arc::from(slides),
            base_dir: base_dir.into(),
        })
    }

    /// Reads a YAML list of slides. Relative image paths resolve against the
    /// file's directory.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read deck file {}", path.display()))?;
        let slides: Vec<Slide> = serde_yaml::from_str(&text)
            .with_context(|| format!("failed to parse deck file {}", path.display()))?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Ok(Self::new(slides, base_dir)?)
    }

    pub fn slides(&self) -> &[Slide] {
        &self.slides
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolves the image reference of `slide` relative to this deck.
    pub fn image_source(&self, slide: &Slide) -> ImageSource {
        resolve_image_reference(&slide.image, &self.base_dir)
    }

    /// Distinct image references in display order.
    pub fn distinct_images(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.slides
            .iter()
            .map(|s| s.image.as_str())
            .filter(|image| seen.insert(*image))
            .collect()
    }
}

impl Deref for Deck {
    type Target = [Slide];

    fn deref(&self) -> &Self::Target {
        &self.slides
    }
}

pub fn resolve_image_reference(reference: &str, base_dir: &Path) -> ImageSource {
    let trimmed = reference.trim();
    if trimmed.is_empty() {
        return ImageSource::Invalid(reference.to_string());
    }

    // Windows drive letters parse as a one-letter scheme; treat them as paths.
    let looks_like_drive = trimmed.len() > 1 && trimmed.as_bytes()[1] == b':';
    if !looks_like_drive {
        if let Ok(url) = Url::parse(trimmed) {
            if url.scheme() == "file" {
                return match url.to_file_path() {
                    Ok(path) => ImageSource::File(path),
                    Err(()) => ImageSource::Invalid(reference.to_string()),
                };
            }
            return ImageSource::Remote(url);
        }
    }

    let path = Path::new(trimmed);
    if path.is_absolute() {
        ImageSource::File(path.to_path_buf())
    } else {
        ImageSource::File(base_dir.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slide(id: i64, image: &str) -> Slide {
        Slide {
            id: SlideId::Number(id),
            image: image.into(),
            title: format!("Slide {id}"),
            description: String::new(),
        }
    }

    #[test]
    fn rejects_duplicate_ids() {
        let err = Deck::new(vec![slide(1, "a.jpg"), slide(1, "b.jpg")], "").unwrap_err();
        assert_eq!(err, DeckError::DuplicateId(SlideId::Number(1)));
    }

    #[test]
    fn numeric_and_string_ids_do_not_collide() {
        let yaml = r#"
- { id: 1, image: a.jpg }
- { id: "1", image: b.jpg }
"#;
        let slides: Vec<Slide> = serde_yaml::from_str(yaml).unwrap();
        let deck = Deck::new(slides, "").unwrap();
        assert_eq!(deck.len(), 2);
        assert_eq!(deck[1].id, SlideId::Name("1".into()));
    }

    #[test]
    fn rejects_blank_image() {
        let err = Deck::new(vec![slide(7, "  ")], "").unwrap_err();
        assert_eq!(err, DeckError::EmptyImage(SlideId::Number(7)));
    }

    #[test]
    fn resolves_references() {
        let base = Path::new("/decks/travel");
        assert_eq!(
            resolve_image_reference("img/a.jpg", base),
            ImageSource::File(PathBuf::from("/decks/travel/img/a.jpg"))
        );
        assert_eq!(
            resolve_image_reference("/abs/b.png", base),
            ImageSource::File(PathBuf::from("/abs/b.png"))
        );
        assert!(matches!(
            resolve_image_reference("https://example.com/c.jpg", base),
            ImageSource::Remote(_)
        ));
        #[cfg(unix)]
        assert_eq!(
            resolve_image_reference("file:///srv/d.jpg", base),
            ImageSource::File(PathBuf::from("/srv/d.jpg"))
        );
    }

    #[test]
    fn distinct_images_keeps_first_occurrence_order() {
        let deck = Deck::new(
            vec![slide(1, "a.jpg"), slide(2, "b.jpg"), slide(3, "a.jpg")],
            "",
        )
        .unwrap();
        assert_eq!(deck.distinct_images(), vec!["a.jpg", "b.jpg"]);
    }
}
