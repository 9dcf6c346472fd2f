//! Ground-plane vector math for hit tests
//!
//! All combat geometry is evaluated on the ground plane. World `(x, y, z)`
//! coordinates project to `Vec2 { x, y: z }`; vertical extent is ignored.

use serde::{Deserialize, Serialize};

/// A point or direction on the ground plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };
    /// Default facing for actors that have never moved
    pub const FORWARD: Self = Self { x: 0.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Project a world-space `[x, y, z]` position onto the ground plane
    pub fn from_world(p: [f32; 3]) -> Self {
        Self { x: p[0], y: p[2] }
    }

    /// Unit vector for a yaw angle in radians (0 = +y, clockwise positive)
    pub fn from_yaw(yaw: f32) -> Self {
        Self {
            x: yaw.sin(),
            y: yaw.cos(),
        }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y
    }

    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    /// Normalized copy, or `None` for a (near) zero vector
    pub fn try_normalize(self) -> Option<Self> {
        let len = self.length();
        if len <= f32::EPSILON {
            None
        } else {
            Some(Self {
                x: self.x / len,
                y: self.y / len,
            })
        }
    }

    /// Normalized copy, falling back to `fallback` for a zero vector
    pub fn normalize_or(self, fallback: Self) -> Self {
        self.try_normalize().unwrap_or(fallback)
    }

    /// Angle in radians between two unit vectors
    pub fn angle_to(self, other: Self) -> f32 {
        self.dot(other).clamp(-1.0, 1.0).acos()
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

/// Check whether `target` lies inside the sector at `origin` opening along
/// the unit vector `facing` with the given radius and half-angle.
pub fn in_sector(origin: Vec2, facing: Vec2, radius: f32, half_angle: f32, target: Vec2) -> bool {
    let to_target = target - origin;
    let dist = to_target.length();
    if dist > radius {
        return false;
    }
    // A target standing on the origin has no direction; treat it as dead ahead.
    match to_target.try_normalize() {
        Some(dir) => facing.angle_to(dir) <= half_angle,
        None => true,
    }
}

/// Circle-vs-circle overlap on the ground plane
pub fn circles_overlap(a: Vec2, radius_a: f32, b: Vec2, radius_b: f32) -> bool {
    let combined = radius_a + radius_b;
    (b - a).length_squared() <= combined * combined
}
