//! Index and playback state of the carousel.
//!
//! `CarouselState` is a plain state machine; the controller task owns one and
//! is the only place it is mutated.

use serde::Deserialize;

/// How the strip moved between two indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
    Jump,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexChange {
    pub from: usize,
    pub to: usize,
    pub direction: Direction,
    /// `true` when the move crossed the end of the deck (last → first or
    /// first → last).
    pub wrapped: bool,
}

/// Policy for `go_to` calls outside `0..len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoToPolicy {
    #[default]
    Reject,
    Clamp,
    Wrap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GoToError {
    #[error("slide index {index} is out of range for a deck of {len} slides")]
    OutOfRange { index: usize, len: usize },
    #[error("cannot navigate an empty deck")]
    EmptyDeck,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarouselState {
    len: usize,
    current: usize,
    playing: bool,
    go_to_policy: GoToPolicy,
}

impl CarouselState {
    pub fn new(len: usize, playing: bool) -> Self {
        Self {
            len,
            current: 0,
            playing,
            go_to_policy: GoToPolicy::default(),
        }
    }

    pub fn with_go_to_policy(mut self, policy: GoToPolicy) -> Self {
        self.go_to_policy = policy;
        self
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `None` while the deck is empty.
    pub fn current_index(&self) -> Option<usize> {
        (self.len > 0).then_some(self.current)
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the autoplay timer should be running.
    pub fn autoplay_active(&self) -> bool {
        self.playing && self.len > 1
    }

    pub fn next(&mut self) -> Option<IndexChange> {
        if self.len <= 1 {
            return None;
        }
        let to = (self.current + 1) % self.len;
        Some(self.move_to(to, Direction::Forward, to == 0))
    }

    pub fn previous(&mut self) -> Option<IndexChange> {
        if self.len <= 1 {
            return None;
        }
        let to = (self.current + self.len - 1) % self.len;
        Some(self.move_to(to, Direction::Backward, to == self.len - 1))
    }

    /// Moves straight to `index`. Returns `Ok(None)` when already there.
    pub fn go_to(&mut self, index: usize) -> Result<Option<IndexChange>, GoToError> {
        if self.len == 0 {
            return Err(GoToError::EmptyDeck);
        }
        let target = if index < self.len {
            index
        } else {
            match self.go_to_policy {
                GoToPolicy::Reject => {
                    return Err(GoToError::OutOfRange {
                        index,
                        len: self.len,
                    });
                }
                GoToPolicy::Clamp => self.len - 1,
                GoToPolicy::Wrap => index % self.len,
            }
        };
        if target == self.current {
            return Ok(None);
        }
        Ok(Some(self.move_to(target, Direction::Jump, false)))
    }

    /// Flips playback and returns the new value.
    pub fn toggle_playback(&mut self) -> bool {
        self.playing = !self.playing;
        self.playing
    }

    /// Returns `true` when the flag actually changed.
    pub fn set_playing(&mut self, playing: bool) -> bool {
        let changed = self.playing != playing;
        self.playing = playing;
        changed
    }

    /// Adopts a new deck length, keeping the index valid.
    pub fn resize(&mut self, len: usize) -> Option<IndexChange> {
        let from = self.current;
        self.len = len;
        if len == 0 {
            self.current = 0;
            return None;
        }
        if self.current >= len {
            self.current = len - 1;
            return Some(IndexChange {
                from,
                to: self.current,
                direction: Direction::Jump,
                wrapped: false,
            });
        }
        None
    }

    fn move_to(&mut self, to: usize, direction: Direction, wrapped: bool) -> IndexChange {
        let change = IndexChange {
            from: self.current,
            to,
            direction,
            wrapped,
        };
        self.current = to;
        change
    }
}
