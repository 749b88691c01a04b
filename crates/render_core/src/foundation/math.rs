//! Math utilities and types
//!
//! Provides the nalgebra aliases used across the transform graph and the
//! instancer, plus the rotation re-orthonormalization that keeps repeated
//! delta composition from drifting.

pub use nalgebra::{
    Vector3, Vector4,
    Matrix3, Matrix4,
    Quaternion,
    Unit,
};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Default tolerance for orthonormality checks on rotation matrices
pub const ORTHONORMAL_EPSILON: f32 = 1e-5;

/// Re-orthonormalize the rotation block of a homogeneous matrix in place.
///
/// Classical Gram–Schmidt over the three basis columns, in column order:
/// column 0 is normalized, column 1 loses its projection on column 0,
/// column 2 loses its projections on columns 0 and 1. The translation
/// column and the bottom row are reset so the result is a pure rotation.
pub fn orthonormalize(target: &mut Mat4) {
    let c0 = target.fixed_view::<3, 1>(0, 0).into_owned();
    let c1 = target.fixed_view::<3, 1>(0, 1).into_owned();
    let c2 = target.fixed_view::<3, 1>(0, 2).into_owned();

    let x = c0.normalize();
    let y = (c1 - x * x.dot(&c1)).normalize();
    let z = (c2 - y * y.dot(&c2) - x * x.dot(&c2)).normalize();

    *target = Mat4::new(
        x.x, y.x, z.x, 0.0,
        x.y, y.y, z.y, 0.0,
        x.z, y.z, z.z, 0.0,
        0.0, 0.0, 0.0, 1.0,
    );
}

/// Check that the three basis columns of the rotation block are unit length
/// and mutually orthogonal within `tolerance`.
pub fn is_orthonormal(matrix: &Mat4, tolerance: f32) -> bool {
    let columns = [
        matrix.fixed_view::<3, 1>(0, 0).into_owned(),
        matrix.fixed_view::<3, 1>(0, 1).into_owned(),
        matrix.fixed_view::<3, 1>(0, 2).into_owned(),
    ];

    let unit = columns.iter().all(|c| (c.norm() - 1.0).abs() <= tolerance);
    let orthogonal = columns[0].dot(&columns[1]).abs() <= tolerance
        && columns[0].dot(&columns[2]).abs() <= tolerance
        && columns[1].dot(&columns[2]).abs() <= tolerance;

    unit && orthogonal
}

/// Homogeneous rotation matrix from a unit quaternion
pub fn rotation_from_quat(rotation: &Quat) -> Mat4 {
    rotation.to_homogeneous()
}

/// Homogeneous rotation matrix about an axis (radians)
pub fn rotation_from_axis_angle(axis: &Vec3, angle: f32) -> Mat4 {
    Mat4::from_axis_angle(&Unit::new_normalize(*axis), angle)
}

/// Transpose of the 3x3 rotation block, embedded back into a homogeneous matrix.
///
/// For an orthonormal rotation this is its inverse.
pub fn rotation_transpose(rotation: &Mat4) -> Mat4 {
    let block: Mat3 = rotation.fixed_view::<3, 3>(0, 0).transpose();
    block.to_homogeneous()
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_orthonormalize_identity_is_stable() {
        let mut m = Mat4::identity();
        orthonormalize(&mut m);
        assert_relative_eq!(m, Mat4::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_orthonormalize_repairs_skewed_basis() {
        let mut m = Mat4::new(
            1.1, 0.2, 0.0, 5.0,
            0.1, 0.9, 0.3, 6.0,
            0.0, 0.1, 1.2, 7.0,
            0.0, 0.0, 0.0, 1.0,
        );
        assert!(!is_orthonormal(&m, ORTHONORMAL_EPSILON));

        orthonormalize(&mut m);

        assert!(is_orthonormal(&m, ORTHONORMAL_EPSILON));
        // Translation column is dropped
        assert_eq!(m.m14, 0.0);
        assert_eq!(m.m44, 1.0);
    }

    #[test]
    fn test_first_column_direction_preserved() {
        let mut m = rotation_from_axis_angle(&Vec3::z(), 0.7) * 1.5;
        m.m44 = 1.0;
        let before = m.fixed_view::<3, 1>(0, 0).normalize();

        orthonormalize(&mut m);

        let after = m.fixed_view::<3, 1>(0, 0).into_owned();
        assert_relative_eq!(before, after, epsilon = 1e-6);
    }

    #[test]
    fn test_quat_and_axis_angle_agree() {
        let axis = Vec3::new(0.0, 1.0, 1.0);
        let q = Quat::from_axis_angle(&Unit::new_normalize(axis), constants::HALF_PI);
        assert_relative_eq!(rotation_from_quat(&q), rotation_from_axis_angle(&axis, constants::HALF_PI), epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_transpose_inverts_rotation() {
        let r = rotation_from_axis_angle(&Vec3::new(1.0, 2.0, 0.5), 1.1);
        let product = r * rotation_transpose(&r);
        assert_relative_eq!(product, Mat4::identity(), epsilon = 1e-5);
    }
}
