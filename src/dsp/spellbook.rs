//! Spellbook: a geometric modulator tracing points around parametric curves.
//!
//! Up to sixteen outputs, each with a phase accumulator in [0, 1) advanced at
//! the master rate times its own speed multiplier. Each reports an (x, y)
//! position on the selected curve, scaled into [-1, 1]. Every coordinate is
//! finite.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use super::finite_or_zero;

pub const MAX_SPELLBOOK_OUTPUTS: usize = 16;
/// Inner radius of the star relative to its points.
const STAR_INNER_RADIUS: f64 = 0.4;
/// Turns traced by the spiral per cycle.
const SPIRAL_TURNS: f64 = 3.0;
/// Full-scale speed modulation spans ±2 octaves.
const SPEED_MOD_OCTAVES: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpellShape {
    #[default]
    Circle,
    Polygon,
    Star,
    Spiral,
    Lemniscate,
}

/// An (x, y) position on the curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    fn finite(self) -> Self {
        Point {
            x: finite_or_zero(self.x),
            y: finite_or_zero(self.y),
        }
    }
}

/// Evaluate `shape` at position `t` in [0, 1).
pub fn shape_point(shape: SpellShape, t: f64, sides: usize) -> Point {
    let t = t.rem_euclid(1.0);
    let theta = TAU * t;
    let point = match shape {
        SpellShape::Circle => Point {
            x: theta.cos(),
            y: theta.sin(),
        },
        SpellShape::Polygon => {
            let sides = sides.max(3);
            let vertex = |k: usize| {
                let angle = TAU * k as f64 / sides as f64;
                Point {
                    x: angle.cos(),
                    y: angle.sin(),
                }
            };
            walk_vertices(t, sides, vertex)
        }
        SpellShape::Star => {
            let points = sides.max(3);
            let vertex = |k: usize| {
                let angle = TAU * k as f64 / (2 * points) as f64;
                let r = if k % 2 == 0 { 1.0 } else { STAR_INNER_RADIUS };
                Point {
                    x: r * angle.cos(),
                    y: r * angle.sin(),
                }
            };
            walk_vertices(t, 2 * points, vertex)
        }
        SpellShape::Spiral => {
            // Radius grows out and back in so the path closes on itself.
            let r = 1.0 - (2.0 * t - 1.0).abs();
            let angle = TAU * SPIRAL_TURNS * t;
            Point {
                x: r * angle.cos(),
                y: r * angle.sin(),
            }
        }
        SpellShape::Lemniscate => {
            // Bernoulli lemniscate, parametrised by angle.
            let (s, c) = theta.sin_cos();
            let denom = 1.0 + s * s;
            Point {
                x: c / denom,
                y: s * c / denom,
            }
        }
    };
    point.finite()
}

/// Linear walk around a closed polyline of `count` vertices.
fn walk_vertices(t: f64, count: usize, vertex: impl Fn(usize) -> Point) -> Point {
    let pos = t * count as f64;
    let index = (pos.floor() as usize).min(count - 1);
    let frac = pos - index as f64;
    let a = vertex(index);
    let b = vertex((index + 1) % count);
    Point {
        x: a.x + (b.x - a.x) * frac,
        y: a.y + (b.y - a.y) * frac,
    }
}

#[derive(Debug, Clone)]
pub struct Spellbook {
    pub shape: SpellShape,
    sides: usize,
    size: f64,
    rate: f64,
    speed_mod: f64,
    active_outputs: usize,
    speeds: [f64; MAX_SPELLBOOK_OUTPUTS],
    phases: [f64; MAX_SPELLBOOK_OUTPUTS],
    outputs: [Point; MAX_SPELLBOOK_OUTPUTS],
    sample_rate: f64,
}

impl Spellbook {
    pub fn new(sample_rate: f64) -> Self {
        let mut book = Spellbook {
            shape: SpellShape::Circle,
            sides: 5,
            size: 1.0,
            rate: 0.5,
            speed_mod: 0.0,
            active_outputs: 4,
            speeds: [1.0; MAX_SPELLBOOK_OUTPUTS],
            phases: [0.0; MAX_SPELLBOOK_OUTPUTS],
            outputs: [Point::default(); MAX_SPELLBOOK_OUTPUTS],
            sample_rate,
        };
        book.set_speed_spread(0.5);
        book
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    pub fn set_rate(&mut self, rate: f64) {
        self.rate = if rate.is_finite() { rate.clamp(0.0, 20.0) } else { 0.0 };
    }

    pub fn set_size(&mut self, size: f64) {
        self.size = if size.is_finite() { size.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn set_sides(&mut self, sides: usize) {
        self.sides = sides.clamp(3, 12);
    }

    pub fn set_active_outputs(&mut self, count: usize) {
        self.active_outputs = count.clamp(1, MAX_SPELLBOOK_OUTPUTS);
    }

    /// Output `i` runs at `1 + i * spread` times the master rate.
    pub fn set_speed_spread(&mut self, spread: f64) {
        let spread = if spread.is_finite() { spread.clamp(0.0, 2.0) } else { 0.0 };
        for (i, speed) in self.speeds.iter_mut().enumerate() {
            *speed = 1.0 + i as f64 * spread;
        }
    }

    /// Bipolar modulation amount; ±1 scales the rate by ±2 octaves.
    pub fn set_speed_modulation(&mut self, amount: f64) {
        self.speed_mod = if amount.is_finite() { amount.clamp(-1.0, 1.0) } else { 0.0 };
    }

    /// Advance every active output by one sample.
    pub fn tick(&mut self) {
        let rate = self.rate * (self.speed_mod * SPEED_MOD_OCTAVES).exp2();
        let inc = rate / self.sample_rate;

        for i in 0..MAX_SPELLBOOK_OUTPUTS {
            if i >= self.active_outputs {
                self.outputs[i] = Point::default();
                continue;
            }
            self.phases[i] = finite_or_zero((self.phases[i] + inc * self.speeds[i]).fract());
            // Spread outputs evenly around the curve.
            let offset = i as f64 / self.active_outputs as f64;
            let p = shape_point(self.shape, self.phases[i] + offset, self.sides);
            self.outputs[i] = Point {
                x: finite_or_zero(p.x * self.size),
                y: finite_or_zero(p.y * self.size),
            };
        }
    }

    pub fn output(&self, index: usize) -> Point {
        self.outputs.get(index).copied().unwrap_or_default()
    }

    pub fn outputs(&self) -> &[Point; MAX_SPELLBOOK_OUTPUTS] {
        &self.outputs
    }

    pub fn reset(&mut self) {
        self.phases = [0.0; MAX_SPELLBOOK_OUTPUTS];
        self.outputs = [Point::default(); MAX_SPELLBOOK_OUTPUTS];
        self.speed_mod = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    const SHAPES: [SpellShape; 5] = [
        SpellShape::Circle,
        SpellShape::Polygon,
        SpellShape::Star,
        SpellShape::Spiral,
        SpellShape::Lemniscate,
    ];

    #[test]
    fn circle_starts_on_positive_x() {
        let p = shape_point(SpellShape::Circle, 0.0, 0);
        assert_abs_diff_eq!(p.x, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn polygon_passes_through_vertices() {
        let p = shape_point(SpellShape::Polygon, 0.25, 4);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 1.0, epsilon = 1e-12);
        // Midpoint of an edge sits inside the unit circle.
        let mid = shape_point(SpellShape::Polygon, 0.125, 4);
        assert!((mid.x * mid.x + mid.y * mid.y).sqrt() < 0.99);
    }

    #[test]
    fn lemniscate_crosses_origin() {
        let p = shape_point(SpellShape::Lemniscate, 0.25, 0);
        assert_abs_diff_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(p.y, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn every_shape_is_finite_and_bounded() {
        for shape in SHAPES {
            for sides in [0, 3, 7, 12] {
                for i in 0..=1000 {
                    let p = shape_point(shape, i as f64 / 1000.0, sides);
                    assert!(p.x.is_finite() && p.y.is_finite());
                    let inside = p.x.abs() <= 1.0 + 1e-12 && p.y.abs() <= 1.0 + 1e-12;
                    assert!(inside, "{shape:?} at {i}: {p:?}");
                }
            }
        }
        let p = shape_point(SpellShape::Circle, f64::NAN, 4);
        assert!(p.x.is_finite() && p.y.is_finite());
    }

    #[test]
    fn outputs_run_at_independent_speeds() {
        let mut book = Spellbook::new(1000.0);
        book.set_rate(1.0);
        book.set_active_outputs(2);
        book.set_speed_spread(1.0);
        for _ in 0..250 {
            book.tick();
        }
        // Output 0 at 1x has covered a quarter turn, output 1 at 2x half a turn.
        let a = book.output(0);
        assert_abs_diff_eq!(a.x, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(a.y, 1.0, epsilon = 1e-6);
        let b = book.output(1);
        // Output 1 is also offset by half a turn.
        assert_abs_diff_eq!(b.x, 1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(b.y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn inactive_outputs_are_zero() {
        let mut book = Spellbook::new(44100.0);
        book.set_active_outputs(3);
        for _ in 0..100 {
            book.tick();
        }
        assert_eq!(book.output(3), Point::default());
        assert_eq!(book.output(MAX_SPELLBOOK_OUTPUTS + 5), Point::default());
    }
}
