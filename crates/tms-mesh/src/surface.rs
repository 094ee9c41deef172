//! Collision-query surface: triangulated surface + AABB tree.
//!
//! The tree answers the two queries the position optimizer needs: nearest
//! point/distance to the surface from an arbitrary point, and whether a point
//! lies inside the (closed) surface.

use crate::CoilMesh;
use tms_math::Vec3;

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    fn empty() -> Self {
        Self {
            min: Vec3::repeat(f64::INFINITY),
            max: Vec3::repeat(f64::NEG_INFINITY),
        }
    }

    fn grow(&mut self, p: &Vec3) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    fn merge(&mut self, other: &Aabb) {
        self.min = self.min.inf(&other.min);
        self.max = self.max.sup(&other.max);
    }

    /// Distance from `p` to the box (zero inside).
    fn distance(&self, p: &Vec3) -> f64 {
        let clamped = p.sup(&self.min).inf(&self.max);
        (p - clamped).norm()
    }

    /// Slab test for a ray `origin + t * dir`, t >= 0.
    fn intersects_ray(&self, origin: &Vec3, inv_dir: &Vec3) -> bool {
        let mut tmin: f64 = 0.0;
        let mut tmax = f64::INFINITY;
        for i in 0..3 {
            let t1 = (self.min[i] - origin[i]) * inv_dir[i];
            let t2 = (self.max[i] - origin[i]) * inv_dir[i];
            tmin = tmin.max(t1.min(t2));
            tmax = tmax.min(t1.max(t2));
        }
        tmin <= tmax
    }
}

/// A triangulated surface (node coordinates + triangle node indices).
#[derive(Debug, Clone)]
pub struct TriangleSurface {
    pub nodes: Vec<Vec3>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleSurface {
    pub fn new(nodes: Vec<Vec3>, triangles: Vec<[usize; 3]>) -> Self {
        Self { nodes, triangles }
    }

    /// Extract the triangle primitives of a mesh as a surface.
    pub fn from_mesh(mesh: &CoilMesh) -> Self {
        Self {
            nodes: mesh.nodes.clone(),
            triangles: mesh.triangles.clone(),
        }
    }

    /// Build the spatial index over this surface.
    pub fn aabb_tree(&self) -> AabbTree {
        AabbTree::build(self)
    }
}

const LEAF_SIZE: usize = 8;

#[derive(Debug, Clone)]
enum Node {
    Leaf { aabb: Aabb, tris: Vec<usize> },
    Branch { aabb: Aabb, left: usize, right: usize },
}

impl Node {
    fn aabb(&self) -> &Aabb {
        match self {
            Node::Leaf { aabb, .. } | Node::Branch { aabb, .. } => aabb,
        }
    }
}

/// AABB tree over a triangulated surface.
#[derive(Debug, Clone)]
pub struct AabbTree {
    vertices: Vec<[Vec3; 3]>,
    nodes: Vec<Node>,
    root: usize,
}

impl AabbTree {
    pub fn build(surface: &TriangleSurface) -> Self {
        let vertices: Vec<[Vec3; 3]> = surface
            .triangles
            .iter()
            .map(|t| [surface.nodes[t[0]], surface.nodes[t[1]], surface.nodes[t[2]]])
            .collect();
        let mut tree = Self {
            vertices,
            nodes: Vec::new(),
            root: 0,
        };
        let all: Vec<usize> = (0..tree.vertices.len()).collect();
        tree.root = tree.build_node(all);
        tree
    }

    fn triangle_aabb(&self, tri: usize) -> Aabb {
        let mut aabb = Aabb::empty();
        for v in &self.vertices[tri] {
            aabb.grow(v);
        }
        aabb
    }

    fn build_node(&mut self, tris: Vec<usize>) -> usize {
        let mut aabb = Aabb::empty();
        for &t in &tris {
            aabb.merge(&self.triangle_aabb(t));
        }

        if tris.len() <= LEAF_SIZE {
            self.nodes.push(Node::Leaf { aabb, tris });
            return self.nodes.len() - 1;
        }

        // Split along the longest axis at the median triangle centroid.
        let extent = aabb.max - aabb.min;
        let axis = extent.imax();
        let mut sorted = tris;
        sorted.sort_by(|&a, &b| {
            let ca = self.centroid(a)[axis];
            let cb = self.centroid(b)[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = sorted.len() / 2;
        let right_tris = sorted.split_off(mid);
        let left = self.build_node(sorted);
        let right = self.build_node(right_tris);
        self.nodes.push(Node::Branch { aabb, left, right });
        self.nodes.len() - 1
    }

    fn centroid(&self, tri: usize) -> Vec3 {
        let [a, b, c] = self.vertices[tri];
        (a + b + c) / 3.0
    }

    /// Nearest point on the surface and its distance from `p`.
    pub fn nearest(&self, p: &Vec3) -> (Vec3, f64) {
        let mut best = (Vec3::zeros(), f64::INFINITY);
        self.nearest_in(self.root, p, &mut best);
        best
    }

    /// Distance from `p` to the surface.
    pub fn distance(&self, p: &Vec3) -> f64 {
        self.nearest(p).1
    }

    fn nearest_in(&self, node: usize, p: &Vec3, best: &mut (Vec3, f64)) {
        match &self.nodes[node] {
            Node::Leaf { tris, .. } => {
                for &t in tris {
                    let q = closest_point_on_triangle(p, &self.vertices[t]);
                    let d = (p - q).norm();
                    if d < best.1 {
                        *best = (q, d);
                    }
                }
            }
            Node::Branch { left, right, .. } => {
                let dl = self.nodes[*left].aabb().distance(p);
                let dr = self.nodes[*right].aabb().distance(p);
                // Visit the nearer child first to tighten the bound early.
                let order = if dl <= dr {
                    [(*left, dl), (*right, dr)]
                } else {
                    [(*right, dr), (*left, dl)]
                };
                for (child, d) in order {
                    if d < best.1 {
                        self.nearest_in(child, p, best);
                    }
                }
            }
        }
    }

    /// Whether `p` lies inside the closed surface (ray-crossing parity).
    pub fn contains(&self, p: &Vec3) -> bool {
        // Irrational direction to avoid grazing shared edges and vertices.
        let dir = Vec3::new(0.577_215_66, 0.301_029_99, 0.761_903_21).normalize();
        let inv_dir = Vec3::new(1.0 / dir.x, 1.0 / dir.y, 1.0 / dir.z);
        let mut crossings = 0usize;
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            match &self.nodes[node] {
                Node::Leaf { aabb, tris } => {
                    if !aabb.intersects_ray(p, &inv_dir) {
                        continue;
                    }
                    for &t in tris {
                        if ray_hits_triangle(p, &dir, &self.vertices[t]) {
                            crossings += 1;
                        }
                    }
                }
                Node::Branch { aabb, left, right } => {
                    if aabb.intersects_ray(p, &inv_dir) {
                        stack.push(*left);
                        stack.push(*right);
                    }
                }
            }
        }
        crossings % 2 == 1
    }
}

/// Closest point on a triangle, after Ericson, Real-Time Collision Detection.
fn closest_point_on_triangle(p: &Vec3, tri: &[Vec3; 3]) -> Vec3 {
    let [a, b, c] = *tri;
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Möller–Trumbore ray/triangle intersection, t > 0 only.
fn ray_hits_triangle(origin: &Vec3, dir: &Vec3, tri: &[Vec3; 3]) -> bool {
    let [a, b, c] = *tri;
    let e1 = b - a;
    let e2 = c - a;
    let pvec = dir.cross(&e2);
    let det = e1.dot(&pvec);
    if det.abs() < 1e-12 {
        return false;
    }
    let inv_det = 1.0 / det;
    let tvec = origin - a;
    let u = tvec.dot(&pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qvec = tvec.cross(&e1);
    let v = dir.dot(&qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let t = e2.dot(&qvec) * inv_det;
    t > 1e-12
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Unit cube surface centered on the origin.
    fn cube() -> TriangleSurface {
        let h = 0.5;
        let nodes = vec![
            Vec3::new(-h, -h, -h),
            Vec3::new(h, -h, -h),
            Vec3::new(h, h, -h),
            Vec3::new(-h, h, -h),
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, h, h),
            Vec3::new(-h, h, h),
        ];
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [2, 3, 7],
            [2, 7, 6],
            [1, 2, 6],
            [1, 6, 5],
            [3, 0, 4],
            [3, 4, 7],
        ];
        TriangleSurface::new(nodes, triangles)
    }

    #[test]
    fn test_distance_to_cube_face() {
        let tree = cube().aabb_tree();
        assert_relative_eq!(
            tree.distance(&Vec3::new(0.0, 0.0, 2.0)),
            1.5,
            epsilon = 1e-12
        );
        // A point on the surface has zero distance.
        assert_relative_eq!(
            tree.distance(&Vec3::new(0.5, 0.0, 0.0)),
            0.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_nearest_point_projects_onto_face() {
        let tree = cube().aabb_tree();
        let (q, d) = tree.nearest(&Vec3::new(0.1, 0.2, 3.0));
        assert_relative_eq!(q, Vec3::new(0.1, 0.2, 0.5), epsilon = 1e-12);
        assert_relative_eq!(d, 2.5, epsilon = 1e-12);
    }

    #[test]
    fn test_containment_parity() {
        let tree = cube().aabb_tree();
        assert!(tree.contains(&Vec3::new(0.0, 0.0, 0.0)));
        assert!(tree.contains(&Vec3::new(0.4, -0.4, 0.3)));
        assert!(!tree.contains(&Vec3::new(0.0, 0.0, 0.9)));
        assert!(!tree.contains(&Vec3::new(2.0, 2.0, 2.0)));
    }
}
