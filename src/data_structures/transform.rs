//! Local object transformation.
//!
//! A [`Transform`] is edited as translate / Euler rotate / scale and turned
//! into a matrix only when something needs it, it is never cached.

use cgmath::{Deg, Matrix, Matrix4, SquareMatrix, Vector3};

/// Translation, rotation (Euler angles in degrees) and scale of a scene object.
///
/// The composed matrix is `T * Rz * Ry * Rx * S`: scale first, then rotate
/// about x, y and z in that order, then translate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub translate: Vector3<f32>,
    pub rotate: Vector3<f32>,
    pub scale: Vector3<f32>,
}

impl Transform {
    /// Identity transformation (no move, rotate, or scale).
    pub fn new() -> Self {
        Self {
            translate: Vector3::new(0.0, 0.0, 0.0),
            rotate: Vector3::new(0.0, 0.0, 0.0),
            scale: Vector3::new(1.0, 1.0, 1.0),
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f32> {
        Matrix4::from_translation(self.translate)
            * Matrix4::from_angle_z(Deg(self.rotate.z))
            * Matrix4::from_angle_y(Deg(self.rotate.y))
            * Matrix4::from_angle_x(Deg(self.rotate.x))
            * Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    /// Inverse of [`Transform::to_matrix`]. Degenerate (zero) scales yield the identity.
    pub fn to_inverse_matrix(&self) -> Matrix4<f32> {
        self.to_matrix().invert().unwrap_or_else(|| {
            log::warn!("non-invertible transform {:?}", self);
            Matrix4::identity()
        })
    }

    /// Inverse transpose, used to carry normals into world space.
    pub fn to_normal_matrix(&self) -> Matrix4<f32> {
        self.to_inverse_matrix().transpose()
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vector3<f32>> for Transform {
    fn from(translate: Vector3<f32>) -> Self {
        Transform {
            translate,
            ..Default::default()
        }
    }
}
