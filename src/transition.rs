//! Eased strip movement between slide positions.

use std::time::{Duration, Instant};

use crate::carousel::{Direction, IndexChange};
use crate::config::Wraparound;

/// CSS-style cubic Bézier timing curve with fixed end points (0,0) and (1,1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubicBezier {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl CubicBezier {
    /// `cubic-bezier(0.4, 0, 0.2, 1)`, the standard ease-out curve.
    pub const STANDARD: CubicBezier = CubicBezier::new(0.4, 0.0, 0.2, 1.0);

    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Eased progress for linear progress `x` in `[0, 1]`.
    pub fn ease(&self, x: f32) -> f32 {
        if x <= 0.0 {
            return 0.0;
        }
        if x >= 1.0 {
            return 1.0;
        }
        let s = self.solve_param(x);
        bezier(s, self.y1, self.y2)
    }

    fn solve_param(&self, x: f32) -> f32 {
        // Newton first; bisection if the slope gets too flat.
        let mut s = x;
        for _ in 0..8 {
            let err = bezier(s, self.x1, self.x2) - x;
            if err.abs() < 1e-6 {
                return s;
            }
            let slope = bezier_slope(s, self.x1, self.x2);
            if slope.abs() < 1e-6 {
                break;
            }
            s -= err / slope;
        }

        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        s = x;
        for _ in 0..32 {
            let value = bezier(s, self.x1, self.x2);
            if (value - x).abs() < 1e-6 {
                break;
            }
            if value < x {
                lo = s;
            } else {
                hi = s;
            }
            s = (lo + hi) * 0.5;
        }
        s
    }
}

fn bezier(s: f32, p1: f32, p2: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * s * p1 + 3.0 * inv * s * s * p2 + s * s * s
}

fn bezier_slope(s: f32, p1: f32, p2: f32) -> f32 {
    let inv = 1.0 - s;
    3.0 * inv * inv * p1 + 6.0 * inv * s * (p2 - p1) + 3.0 * s * s * (1.0 - p2)
}

/// Animated strip position, in slides. Position `p` means slide `i` sits at
/// `(i - p) * viewport_width`.
#[derive(Debug, Clone)]
pub struct StripAnimator {
    from: f32,
    to: f32,
    /// Where the position rests once the animation finishes; differs from
    /// `to` only after a continuing wrap.
    settled: f32,
    started: Instant,
    duration: Duration,
    curve: CubicBezier,
}

impl StripAnimator {
    pub fn new(index: usize, duration: Duration, now: Instant) -> Self {
        let position = index as f32;
        Self {
            from: position,
            to: position,
            settled: position,
            started: now,
            duration,
            curve: CubicBezier::STANDARD,
        }
    }

    pub fn position(&self, now: Instant) -> f32 {
        if !self.is_animating(now) {
            return self.settled;
        }
        let elapsed = now.saturating_duration_since(self.started).as_secs_f32();
        let progress = elapsed / self.duration.as_secs_f32();
        let eased = self.curve.ease(progress);
        self.from + (self.to - self.from) * eased
    }

    pub fn is_animating(&self, now: Instant) -> bool {
        !self.duration.is_zero()
            && self.from != self.to
            && now.saturating_duration_since(self.started) < self.duration
    }

    /// Starts moving toward `change.to`, continuing from wherever the strip
    /// currently is.
    pub fn animate_to(&mut self, change: IndexChange, len: usize, mode: Wraparound, now: Instant) {
        if len == 0 {
            self.jump_to(0);
            return;
        }
        let n = len as f32;
        let mut current = self.position(now);
        let mut target = change.to as f32;

        if mode == Wraparound::Continue && change.wrapped {
            match change.direction {
                Direction::Forward => {
                    while target <= current {
                        target += n;
                    }
                }
                Direction::Backward => {
                    while target >= current {
                        target -= n;
                    }
                }
                Direction::Jump => {}
            }
        } else if current < 0.0 || current > n - 1.0 {
            // Off-strip position left over from a continuing wrap: use the
            // copy of it closest to the target.
            current -= n * ((current - target) / n).round();
        }

        self.from = current;
        self.to = target;
        self.settled = change.to as f32;
        self.started = now;
    }

    /// Places the strip at `index` without animating.
    pub fn jump_to(&mut self, index: usize) {
        let position = index as f32;
        self.from = position;
        self.to = position;
        self.settled = position;
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }
}
