//! 2D geometry for skill regions
//!
//! Resolved shapes carry concrete numbers only; containment is a pure
//! function of the shape and the point.

use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Vec2) -> f64 {
        (other - self).length()
    }

    /// Heading in radians (0 = +x, counter-clockwise)
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    pub fn rotate(self, radians: f64) -> Vec2 {
        let (sin, cos) = radians.sin_cos();
        Vec2::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Linear interpolation, `t` clamped to [0, 1]
    pub fn lerp(self, to: Vec2, t: f64) -> Vec2 {
        self + (to - self) * t.clamp(0.0, 1.0)
    }
}

impl Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Vec2 {
    type Output = Vec2;

    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;

    fn mul(self, k: f64) -> Vec2 {
        Vec2::new(self.x * k, self.y * k)
    }
}

/// Wrap an angle into (-PI, PI]
fn wrap_angle(a: f64) -> f64 {
    let wrapped = (a + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// A region with every parameter evaluated; angles in radians
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResolvedShape {
    Circle {
        center: Vec2,
        radius: f64,
    },
    Sector {
        center: Vec2,
        radius: f64,
        direction: f64,
        half_angle: f64,
    },
    Rectangle {
        center: Vec2,
        width: f64,
        length: f64,
        rotation: f64,
    },
    Annulus {
        center: Vec2,
        inner_radius: f64,
        outer_radius: f64,
    },
}

impl ResolvedShape {
    pub fn center(&self) -> Vec2 {
        match self {
            ResolvedShape::Circle { center, .. }
            | ResolvedShape::Sector { center, .. }
            | ResolvedShape::Rectangle { center, .. }
            | ResolvedShape::Annulus { center, .. } => *center,
        }
    }

    /// The same shape moved to `center`
    pub fn with_center(mut self, to: Vec2) -> Self {
        match &mut self {
            ResolvedShape::Circle { center, .. }
            | ResolvedShape::Sector { center, .. }
            | ResolvedShape::Rectangle { center, .. }
            | ResolvedShape::Annulus { center, .. } => *center = to,
        }
        self
    }

    /// Whether `point` lies inside the region (boundary inclusive)
    ///
    /// # Example
    /// ```
    /// use battle_sim_core_rs::skill::{ResolvedShape, Vec2};
    ///
    /// let ring = ResolvedShape::Annulus {
    ///     center: Vec2::ZERO,
    ///     inner_radius: 2.0,
    ///     outer_radius: 5.0,
    /// };
    /// assert!(ring.contains(Vec2::new(3.0, 0.0)));
    /// assert!(!ring.contains(Vec2::new(1.0, 0.0)));
    /// assert!(!ring.contains(Vec2::new(0.0, 6.0)));
    /// ```
    pub fn contains(&self, point: Vec2) -> bool {
        match *self {
            ResolvedShape::Circle { center, radius } => center.distance(point) <= radius,
            ResolvedShape::Sector {
                center,
                radius,
                direction,
                half_angle,
            } => {
                let offset = point - center;
                let distance = offset.length();
                if distance > radius {
                    return false;
                }
                if distance == 0.0 || half_angle >= PI {
                    return true;
                }
                wrap_angle(offset.angle() - direction).abs() <= half_angle
            }
            ResolvedShape::Rectangle {
                center,
                width,
                length,
                rotation,
            } => {
                let local = (point - center).rotate(-rotation);
                local.x.abs() <= length / 2.0 && local.y.abs() <= width / 2.0
            }
            ResolvedShape::Annulus {
                center,
                inner_radius,
                outer_radius,
            } => {
                let distance = center.distance(point);
                distance >= inner_radius && distance <= outer_radius
            }
        }
    }
}
