//! Core type definitions used throughout the codebase

use derive_more::{Display, From};
use serde::{Deserialize, Serialize};

/// Simulation tick counter
pub type Tick = u64;

/// Stable identifier for a soldier; doubles as its arena index
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display(fmt = "soldier#{}", _0)]
pub struct SoldierId(pub u32);

impl SoldierId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Command-addressable squad identifier (assigned by the init record)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display(fmt = "squad#{}", _0)]
pub struct SquadId(pub u32);

/// Side of the battle
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, From,
)]
#[display(fmt = "team#{}", _0)]
pub struct TeamId(pub u8);

/// Planar position on the battle plane (height is a rendering concern)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, z: 0.0 };

    pub const fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Unit vector pointing along a heading (0 = +z, clockwise towards +x)
    pub fn from_heading(heading: f32) -> Self {
        Self {
            x: heading.sin(),
            z: heading.cos(),
        }
    }

    /// Heading of this vector (inverse of `from_heading`)
    pub fn heading(&self) -> f32 {
        self.x.atan2(self.z)
    }

    pub fn length(&self) -> f32 {
        self.length_squared().sqrt()
    }

    pub fn length_squared(&self) -> f32 {
        self.x * self.x + self.z * self.z
    }

    pub fn distance(&self, other: &Self) -> f32 {
        (*self - *other).length()
    }

    pub fn distance_squared(&self, other: &Self) -> f32 {
        (*self - *other).length_squared()
    }

    pub fn dot(&self, other: &Self) -> f32 {
        self.x * other.x + self.z * other.z
    }

    pub fn normalize(&self) -> Self {
        let len = self.length();
        if len > 0.0001 {
            Self {
                x: self.x / len,
                z: self.z / len,
            }
        } else {
            Self::ZERO
        }
    }

    /// Clamp length to `max`
    pub fn clamp_length(&self, max: f32) -> Self {
        let len = self.length();
        if len > max && len > 0.0 {
            *self * (max / len)
        } else {
            *self
        }
    }

    /// Rotate clockwise by `angle` radians, matching the heading convention
    pub fn rotate(&self, angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self {
            x: self.x * cos + self.z * sin,
            z: -self.x * sin + self.z * cos,
        }
    }

    pub fn lerp(&self, other: &Self, t: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    /// Unsigned angle in `[0, PI]` between two directions
    pub fn angle_between(&self, other: &Self) -> f32 {
        let a = self.normalize();
        let b = other.normalize();
        if a == Self::ZERO || b == Self::ZERO {
            return 0.0;
        }
        a.dot(&b).clamp(-1.0, 1.0).acos()
    }

    /// Convert a formation-local offset (x = right, z = forward) to world space
    pub fn local_to_world(&self, anchor: Vec2, heading: f32) -> Vec2 {
        anchor + self.rotate(heading)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            z: self.z + rhs.z,
        }
    }
}

impl std::ops::AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.z += rhs.z;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            z: self.z - rhs.z,
        }
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            z: self.z * rhs,
        }
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            z: -self.z,
        }
    }
}

/// Shortest signed difference between two headings, in `(-PI, PI]`
pub fn heading_delta(from: f32, to: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    let mut delta = (to - from) % TAU;
    if delta > PI {
        delta -= TAU;
    } else if delta <= -PI {
        delta += TAU;
    }
    delta
}

/// Turn `from` toward `to` by at most `max_step` radians
pub fn turn_towards(from: f32, to: f32, max_step: f32) -> f32 {
    let delta = heading_delta(from, to);
    if delta.abs() <= max_step {
        to
    } else {
        from + max_step * delta.signum()
    }
}

/// Axis-aligned rectangle on the battle plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub min: Vec2,
    pub max: Vec2,
}

impl Rect {
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self {
            min: Vec2::new(min.x.min(max.x), min.z.min(max.z)),
            max: Vec2::new(min.x.max(max.x), min.z.max(max.z)),
        }
    }

    /// Rectangle centered on the origin
    pub fn centered(half_width: f32, half_depth: f32) -> Self {
        Self::new(
            Vec2::new(-half_width, -half_depth),
            Vec2::new(half_width, half_depth),
        )
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.z >= self.min.z && p.z <= self.max.z
    }

    pub fn center(&self) -> Vec2 {
        self.min.lerp(&self.max, 0.5)
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn depth(&self) -> f32 {
        self.max.z - self.min.z
    }

    /// Squared distance from a point to the rectangle (0 inside)
    pub fn distance_squared_to(&self, p: Vec2) -> f32 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dz * dz
    }

    pub fn intersects_circle(&self, center: Vec2, radius: f32) -> bool {
        self.distance_squared_to(center) <= radius * radius
    }
}
