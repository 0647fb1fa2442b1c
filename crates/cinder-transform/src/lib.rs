//! Source transform for particles and emitters.
//!
//! Provides [`Transform`], a position / rotation / scale triple. Rotation is
//! stored as Euler angles in degrees (z is roll) because particle roll is
//! authored in degrees by behavior curves; matrix conversion goes through a
//! quaternion.
//!
//! # Example
//!
//! ```
//! use cinder_transform::Transform;
//! use glam::Vec3;
//!
//! let mut source = Transform::from_position(Vec3::new(0.0, 1.0, 0.0));
//! source.rotation.z = 45.0; // roll, degrees
//!
//! // The local origin lands at the transform's position.
//! assert_eq!(source.transform_point(Vec3::ZERO), Vec3::new(0.0, 1.0, 0.0));
//! ```

use glam::{EulerRot, Mat4, Quat, Vec3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A 3D transform (position, Euler rotation in degrees, scale).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Transform {
    /// Position in world space.
    pub position: Vec3,
    /// Euler angles in degrees: x = pitch, y = yaw, z = roll.
    pub rotation: Vec3,
    /// Scale factors per axis.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform (no translation, rotation, or scale).
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Vec3::ZERO,
        scale: Vec3::ONE,
    };

    /// Creates a new transform.
    pub fn new(position: Vec3, rotation: Vec3, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Creates a transform with only position.
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform with only rotation (Euler degrees).
    pub fn from_rotation(rotation: Vec3) -> Self {
        Self {
            rotation,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform with only scale.
    pub fn from_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Self::IDENTITY
        }
    }

    /// Creates a transform with uniform scale.
    pub fn from_uniform_scale(scale: f32) -> Self {
        Self::from_scale(Vec3::splat(scale))
    }

    /// Returns the rotation as a quaternion.
    pub fn rotation_quat(&self) -> Quat {
        Quat::from_euler(
            EulerRot::XYZ,
            self.rotation.x.to_radians(),
            self.rotation.y.to_radians(),
            self.rotation.z.to_radians(),
        )
    }

    /// Converts to a 4x4 matrix (scale, then rotate, then translate).
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation_quat(), self.position)
    }

    /// Transforms a point from local space to world space.
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation_quat() * (self.scale * point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let t = Transform::IDENTITY;
        let p = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(t.transform_point(p), p);
    }

    #[test]
    fn test_position_offset() {
        let t = Transform::from_position(Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(
            t.transform_point(Vec3::new(1.0, 2.0, 3.0)),
            Vec3::new(11.0, 2.0, 3.0)
        );
    }

    #[test]
    fn test_roll_degrees() {
        let t = Transform::from_rotation(Vec3::new(0.0, 0.0, 90.0));
        let result = t.transform_point(Vec3::X);
        assert!(result.x.abs() < 1e-5);
        assert!((result.y - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_scale() {
        let t = Transform::from_scale(Vec3::new(2.0, 3.0, 4.0));
        assert_eq!(t.transform_point(Vec3::ONE), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn test_uniform_scale() {
        let t = Transform::from_uniform_scale(2.5);
        assert_eq!(t.scale, Vec3::splat(2.5));
    }

    #[test]
    fn test_matrix_matches_point_transform() {
        let t = Transform::new(
            Vec3::new(1.0, 2.0, 3.0),
            Vec3::new(15.0, 30.0, 45.0),
            Vec3::new(1.5, 1.5, 1.5),
        );
        let p = Vec3::new(0.3, -0.7, 0.9);

        let by_matrix = t.to_matrix().transform_point3(p);
        let direct = t.transform_point(p);
        assert!((by_matrix - direct).length() < 1e-4);
    }
}
