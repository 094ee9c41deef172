//! Math primitives for TMS coil modeling.
//!
//! Type aliases over nalgebra plus helpers for working with 4x4 homogeneous
//! affine transforms: applying them to points and free vectors, extracting
//! the rotation block, and building single-parameter rigid motions.

use nalgebra as na;

/// 3D vector alias.
pub type Vec3 = na::Vector3<f64>;
/// 3x3 matrix alias.
pub type Mat3 = na::Matrix3<f64>;
/// 4x4 matrix alias.
pub type Mat4 = na::Matrix4<f64>;

/// Cross-product matrix: [v]× such that [v]× w = v × w.
#[inline]
pub fn skew(v: &Vec3) -> Mat3 {
    Mat3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// Rotation block of a homogeneous affine.
#[inline]
pub fn rotation_part(m: &Mat4) -> Mat3 {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

/// Translation column of a homogeneous affine.
#[inline]
pub fn translation_part(m: &Mat4) -> Vec3 {
    m.fixed_view::<3, 1>(0, 3).into_owned()
}

/// Apply an affine to a point (rotation + translation).
#[inline]
pub fn transform_point(m: &Mat4, p: &Vec3) -> Vec3 {
    rotation_part(m) * p + translation_part(m)
}

/// Apply an affine to a free vector (rotation only; translations do not
/// displace vector quantities).
#[inline]
pub fn transform_vector(m: &Mat4, v: &Vec3) -> Vec3 {
    rotation_part(m) * v
}

/// Apply an affine to every point in a slice.
pub fn transform_points(m: &Mat4, points: &[Vec3]) -> Vec<Vec3> {
    let rot = rotation_part(m);
    let t = translation_part(m);
    points.iter().map(|p| rot * p + t).collect()
}

/// Apply an affine's rotation to every vector in a slice.
pub fn transform_vectors(m: &Mat4, vectors: &[Vec3]) -> Vec<Vec3> {
    let rot = rotation_part(m);
    vectors.iter().map(|v| rot * v).collect()
}

/// Homogeneous translation matrix.
#[inline]
pub fn translation(t: &Vec3) -> Mat4 {
    Mat4::new_translation(t)
}

/// Rotation by `angle_rad` about the line through `origin` with direction
/// `axis` (need not be normalized), as a homogeneous affine.
pub fn rotation_about_line(origin: &Vec3, axis: &Vec3, angle_rad: f64) -> Mat4 {
    let unit = na::Unit::new_normalize(*axis);
    let rot = na::Rotation3::from_axis_angle(&unit, angle_rad);
    translation(origin) * rot.to_homogeneous() * translation(&-origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_point_vs_vector() {
        let m = translation(&Vec3::new(1.0, 2.0, 3.0));
        let p = Vec3::new(1.0, 0.0, 0.0);
        assert_relative_eq!(transform_point(&m, &p), Vec3::new(2.0, 2.0, 3.0));
        // Free vectors ignore the translation.
        assert_relative_eq!(transform_vector(&m, &p), p);
    }

    #[test]
    fn test_rotation_about_line_fixes_the_line() {
        let origin = Vec3::new(0.0, -20.0, 0.0);
        let axis = Vec3::new(1.0, 0.0, 0.0);
        let m = rotation_about_line(&origin, &axis, 1.234);

        // Points on the axis are fixed.
        let on_axis = origin + axis * 7.5;
        assert_relative_eq!(transform_point(&m, &on_axis), on_axis, epsilon = 1e-12);

        // A quarter turn about x through y=-20 sends (0, 0, 0) to (0, -20, 20).
        let q = rotation_about_line(&origin, &axis, std::f64::consts::FRAC_PI_2);
        assert_relative_eq!(
            transform_point(&q, &Vec3::zeros()),
            Vec3::new(0.0, -20.0, 20.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_skew_reproduces_cross_product() {
        let a = Vec3::new(1.0, -2.0, 0.5);
        let b = Vec3::new(0.3, 4.0, -1.0);
        assert_relative_eq!(skew(&a) * b, a.cross(&b), epsilon = 1e-14);
    }
}
