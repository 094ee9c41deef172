//! Visualization mesh with tagged primitives and per-node vector fields.

use std::collections::BTreeSet;

use tms_math::{transform_point, transform_vector, Mat4, Vec3};

/// A named vector field attached to the mesh nodes, one value per node.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeField {
    pub name: String,
    pub values: Vec<Vec3>,
}

/// Mesh of point, line and triangle primitives over a shared node list.
///
/// Every primitive carries an integer region tag so downstream tools can
/// select sub-meshes by tag range. Node fields are padded with zeros when
/// meshes are joined, so a field only ever covers the nodes it was attached
/// to.
#[derive(Debug, Clone, Default)]
pub struct CoilMesh {
    pub nodes: Vec<Vec3>,
    /// Point markers (node indices) and their region tags.
    pub points: Vec<usize>,
    pub point_tags: Vec<i32>,
    /// Line primitives (node index pairs) and their region tags.
    pub lines: Vec<[usize; 2]>,
    pub line_tags: Vec<i32>,
    /// Triangle primitives (node index triples) and their region tags.
    pub triangles: Vec<[usize; 3]>,
    pub triangle_tags: Vec<i32>,
    pub node_fields: Vec<NodeField>,
}

impl CoilMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mesh consisting of one point marker per node, all sharing a tag.
    pub fn from_point_markers(nodes: Vec<Vec3>, tag: i32) -> Self {
        let n = nodes.len();
        Self {
            nodes,
            points: (0..n).collect(),
            point_tags: vec![tag; n],
            ..Self::default()
        }
    }

    /// A triangle mesh over the given nodes, all triangles sharing a tag.
    pub fn from_triangles(nodes: Vec<Vec3>, triangles: Vec<[usize; 3]>, tag: i32) -> Self {
        let n = triangles.len();
        Self {
            nodes,
            triangles,
            triangle_tags: vec![tag; n],
            ..Self::default()
        }
    }

    /// Attach a vector field covering every current node.
    ///
    /// Panics if `values.len() != nodes.len()`; callers build the field
    /// alongside the nodes it annotates.
    pub fn add_node_field(&mut self, name: impl Into<String>, values: Vec<Vec3>) {
        assert_eq!(
            values.len(),
            self.nodes.len(),
            "node field must cover every node"
        );
        self.node_fields.push(NodeField {
            name: name.into(),
            values,
        });
    }

    /// Merge `other` into `self`, offsetting node indices and zero-padding
    /// node fields on both sides.
    pub fn join(&mut self, other: CoilMesh) {
        let offset = self.nodes.len();
        let added = other.nodes.len();

        for field in &mut self.node_fields {
            field.values.extend(std::iter::repeat(Vec3::zeros()).take(added));
        }
        for field in other.node_fields {
            let mut values = vec![Vec3::zeros(); offset];
            values.extend(field.values);
            self.node_fields.push(NodeField {
                name: field.name,
                values,
            });
        }

        self.nodes.extend(other.nodes);
        self.points.extend(other.points.iter().map(|i| i + offset));
        self.point_tags.extend(other.point_tags);
        self.lines
            .extend(other.lines.iter().map(|[a, b]| [a + offset, b + offset]));
        self.line_tags.extend(other.line_tags);
        self.triangles.extend(
            other
                .triangles
                .iter()
                .map(|[a, b, c]| [a + offset, b + offset, c + offset]),
        );
        self.triangle_tags.extend(other.triangle_tags);
    }

    /// The mesh with every node mapped through `affine` (vector fields are
    /// rotated by the affine's rotation block).
    pub fn transformed(&self, affine: &Mat4) -> CoilMesh {
        let mut out = self.clone();
        out.nodes = self.nodes.iter().map(|p| transform_point(affine, p)).collect();
        for field in &mut out.node_fields {
            for v in &mut field.values {
                *v = transform_vector(affine, v);
            }
        }
        out
    }

    /// The set of distinct region tags across all primitive kinds.
    pub fn unique_tags(&self) -> BTreeSet<i32> {
        self.point_tags
            .iter()
            .chain(&self.line_tags)
            .chain(&self.triangle_tags)
            .copied()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_offsets_indices_and_tags() {
        let mut a = CoilMesh::from_point_markers(vec![Vec3::zeros(), Vec3::x()], 4);
        let b = CoilMesh::from_triangles(
            vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            vec![[0, 1, 2]],
            1,
        );
        a.join(b);

        assert_eq!(a.nodes.len(), 5);
        assert_eq!(a.triangles, vec![[2, 3, 4]]);
        assert_eq!(a.unique_tags().into_iter().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn test_join_pads_node_fields() {
        let mut a = CoilMesh::from_point_markers(vec![Vec3::zeros()], 4);
        a.add_node_field("moment", vec![Vec3::z()]);

        let mut b = CoilMesh::from_point_markers(vec![Vec3::x()], 5);
        b.add_node_field("direction", vec![Vec3::y()]);

        a.join(b);
        assert_eq!(a.node_fields[0].values, vec![Vec3::z(), Vec3::zeros()]);
        assert_eq!(a.node_fields[1].values, vec![Vec3::zeros(), Vec3::y()]);
    }

    #[test]
    fn test_transformed_moves_points_but_only_rotates_fields() {
        let mut m = CoilMesh::from_point_markers(vec![Vec3::zeros()], 4);
        m.add_node_field("moment", vec![Vec3::z()]);

        let t = tms_math::translation(&Vec3::new(1.0, 2.0, 3.0));
        let moved = m.transformed(&t);
        assert_eq!(moved.nodes[0], Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(moved.node_fields[0].values[0], Vec3::z());
    }
}
