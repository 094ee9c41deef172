//! Coil/element casing: housing geometry plus optimization anchor points.

use tms_math::{transform_points, Mat4, Vec3};
use tms_mesh::CoilMesh;

use crate::tags;

/// Housing geometry attached to a coil or element.
///
/// Carries the casing surface itself plus two anchor-point sets consumed by
/// the position optimizer: minimum-distance points (fit targets) and
/// intersection points (hard no-penetration targets). All three transform
/// under the owner's affine.
#[derive(Debug, Clone, Default)]
pub struct Casing {
    pub mesh: CoilMesh,
    pub min_distance_points: Vec<Vec3>,
    pub intersect_points: Vec<Vec3>,
}

impl Casing {
    pub fn new(
        mesh: CoilMesh,
        min_distance_points: Vec<Vec3>,
        intersect_points: Vec<Vec3>,
    ) -> Self {
        Self {
            mesh,
            min_distance_points,
            intersect_points,
        }
    }

    /// Casing surface nodes under `affine`.
    pub fn get_points(&self, affine: &Mat4) -> Vec<Vec3> {
        transform_points(affine, &self.mesh.nodes)
    }

    /// Minimum-distance anchor points under `affine`.
    pub fn get_min_distance_points(&self, affine: &Mat4) -> Vec<Vec3> {
        transform_points(affine, &self.min_distance_points)
    }

    /// Intersection anchor points under `affine`.
    pub fn get_intersect_points(&self, affine: &Mat4) -> Vec<Vec3> {
        transform_points(affine, &self.intersect_points)
    }

    /// Fit targets for optimization: the min-distance anchors, or the casing
    /// surface nodes when no anchors were declared.
    pub fn fit_points(&self, affine: &Mat4) -> Vec<Vec3> {
        if self.min_distance_points.is_empty() {
            self.get_points(affine)
        } else {
            self.get_min_distance_points(affine)
        }
    }

    /// No-penetration targets for optimization: the intersect anchors, or the
    /// casing surface nodes when no anchors were declared.
    pub fn penetration_points(&self, affine: &Mat4) -> Vec<Vec3> {
        if self.intersect_points.is_empty() {
            self.get_points(affine)
        } else {
            self.get_intersect_points(affine)
        }
    }

    /// Visualization mesh for this casing, tagged within the block starting
    /// at `base_tag`.
    pub fn get_mesh(
        &self,
        affine: &Mat4,
        include_casing: bool,
        include_optimization_points: bool,
        base_tag: i32,
    ) -> CoilMesh {
        let mut out = CoilMesh::new();
        if include_casing && !self.mesh.is_empty() {
            let mut casing = self.mesh.transformed(affine);
            casing.triangle_tags = vec![base_tag + tags::CASING; casing.triangles.len()];
            casing.line_tags = vec![base_tag + tags::CASING; casing.lines.len()];
            casing.point_tags = vec![base_tag + tags::CASING; casing.points.len()];
            out.join(casing);
        }
        if include_optimization_points {
            if !self.min_distance_points.is_empty() {
                out.join(CoilMesh::from_point_markers(
                    self.get_min_distance_points(affine),
                    base_tag + tags::MIN_DISTANCE_POINTS,
                ));
            }
            if !self.intersect_points.is_empty() {
                out.join(CoilMesh::from_point_markers(
                    self.get_intersect_points(affine),
                    base_tag + tags::INTERSECT_POINTS,
                ));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plate() -> Casing {
        let mesh = CoilMesh::from_triangles(
            vec![
                Vec3::new(-20.0, -20.0, 0.0),
                Vec3::new(-20.0, 20.0, 0.0),
                Vec3::new(20.0, -20.0, 0.0),
                Vec3::new(20.0, 20.0, 0.0),
            ],
            vec![[0, 1, 2], [3, 2, 1]],
            0,
        );
        Casing::new(
            mesh,
            vec![Vec3::new(0.0, 0.0, 0.0)],
            vec![Vec3::new(0.0, 0.0, -5.0)],
        )
    }

    #[test]
    fn test_mesh_tags_follow_roles() {
        let casing = plate();
        let mesh = casing.get_mesh(&Mat4::identity(), true, true, 200);
        let tags: Vec<i32> = mesh.unique_tags().into_iter().collect();
        assert_eq!(tags, vec![201, 202, 203]);
    }

    #[test]
    fn test_exclusion_flags() {
        let casing = plate();
        let no_casing = casing.get_mesh(&Mat4::identity(), false, true, 0);
        assert!(no_casing.triangles.is_empty());
        assert_eq!(no_casing.unique_tags().into_iter().collect::<Vec<_>>(), vec![2, 3]);

        let no_points = casing.get_mesh(&Mat4::identity(), true, false, 0);
        assert_eq!(no_points.unique_tags().into_iter().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn test_fit_points_fall_back_to_mesh_nodes() {
        let mut casing = plate();
        casing.min_distance_points.clear();
        assert_eq!(casing.fit_points(&Mat4::identity()).len(), 4);
    }
}
