//! Geometry helpers shared by probes, selection and placement.
//!
//! Probe volumes are stored as center/half-size boxes. Orientation lives on
//! the probe itself, so the box here is always axis-aligned in whatever
//! space the caller puts it in (world space for `area`, probe local space
//! for the containment test).

use glam::{Mat3, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned box stored as center and half-size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub center: Vec3,
    pub half_size: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Aabb {
    /// Degenerate box at the origin.
    pub const ZERO: Self = Self {
        center: Vec3::ZERO,
        half_size: Vec3::ZERO,
    };

    /// Box centered at the origin with unit half-size.
    pub const UNIT: Self = Self {
        center: Vec3::ZERO,
        half_size: Vec3::ONE,
    };

    #[must_use]
    pub const fn new(center: Vec3, half_size: Vec3) -> Self {
        Self { center, half_size }
    }

    /// Builds a box from its minimum and maximum corners.
    #[must_use]
    pub fn from_extents(min: Vec3, max: Vec3) -> Self {
        Self {
            center: (max + min) * 0.5,
            half_size: (max - min) * 0.5,
        }
    }

    #[inline]
    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.center - self.half_size
    }

    #[inline]
    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.center + self.half_size
    }

    pub fn set_extents(&mut self, min: Vec3, max: Vec3) {
        *self = Self::from_extents(min, max);
    }

    /// Inclusive point containment.
    #[inline]
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        let distance = (self.center - point).abs();
        distance.cmple(self.half_size).all()
    }

    /// Returns true if `other` lies entirely inside this box.
    #[must_use]
    pub fn contains(&self, other: &Aabb) -> bool {
        let distance = (self.center - other.center).abs() + other.half_size;
        distance.cmple(self.half_size).all()
    }

    /// Grows this box to enclose `other`.
    pub fn merge(&mut self, other: &Aabb) {
        let min = self.min().min(other.min());
        let max = self.max().max(other.max());
        self.set_extents(min, max);
    }

    /// Largest half-size component.
    #[inline]
    #[must_use]
    pub fn max_half_extent(&self) -> f32 {
        self.half_size.max_element()
    }

    /// The eight corners, min corner first.
    #[must_use]
    pub fn corners(&self) -> [Vec3; 8] {
        let min = self.min();
        let max = self.max();
        [
            Vec3::new(min.x, min.y, min.z),
            Vec3::new(min.x, max.y, min.z),
            Vec3::new(max.x, max.y, min.z),
            Vec3::new(max.x, min.y, min.z),
            Vec3::new(max.x, max.y, max.z),
            Vec3::new(min.x, max.y, max.z),
            Vec3::new(min.x, min.y, max.z),
            Vec3::new(max.x, min.y, max.z),
        ]
    }
}

/// Number of mip levels for a full chain at the given resolution.
#[inline]
#[must_use]
pub fn max_mip_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    (largest as f32).log2().floor() as u32 + 1
}

/// Affine transform with rotation, non-uniform scale and translation.
#[must_use]
pub fn make_transform(position: Vec3, scale: Vec3, orientation: Mat3) -> Mat4 {
    Mat4::from_scale_rotation_translation(scale, Quat::from_mat3(&orientation), position)
}
