//! Coulomb-kernel N-body evaluation for vector charges.
//!
//! Both element field laws reduce to sums over the kernel 1/|r - r_j| with a
//! 3-component charge per source: line segments need the potential
//! Σ c_j/|r - r_j| itself, dipoles need its gradient (the vector potential is
//! assembled from the curl of the per-component gradients). Below
//! [`DIRECT_EVAL_LIMIT`] sources both are evaluated pairwise; at or above it
//! an octree with a monopole+dipole far-field expansion is used, with the
//! cell-opening criterion chosen so the truncation error stays below the
//! requested `eps`. The two paths implement one contract: "accurate to at
//! least eps, faster for many sources".

use tms_math::{Mat3, Vec3};

/// Source count at which evaluation switches from direct to tree code.
pub const DIRECT_EVAL_LIMIT: usize = 300;

/// Squared distance below which a target is considered coincident with a
/// source and the singular contribution is dropped.
const SINGULAR_R2: f64 = 1e-24;

/// Max sources per tree leaf.
const LEAF_SIZE: usize = 32;

/// Potential Σ_j c_j / |r - r_j| at every target, per charge component.
pub fn potentials(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3], eps: f64) -> Vec<Vec3> {
    if sources.len() < DIRECT_EVAL_LIMIT {
        direct_potentials(sources, charges, targets)
    } else {
        tree_potentials(sources, charges, targets, eps)
    }
}

/// Gradient of the per-component potential at every target; row `d` of the
/// returned matrix is ∇ Σ_j c_j[d] / |r - r_j|.
pub fn gradients(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3], eps: f64) -> Vec<Mat3> {
    if sources.len() < DIRECT_EVAL_LIMIT {
        direct_gradients(sources, charges, targets)
    } else {
        tree_gradients(sources, charges, targets, eps)
    }
}

pub fn direct_potentials(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3]) -> Vec<Vec3> {
    targets
        .iter()
        .map(|r| {
            let mut pot = Vec3::zeros();
            for (s, c) in sources.iter().zip(charges) {
                let d = r - s;
                let r2 = d.norm_squared();
                if r2 < SINGULAR_R2 {
                    continue;
                }
                pot += c / r2.sqrt();
            }
            pot
        })
        .collect()
}

pub fn direct_gradients(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3]) -> Vec<Mat3> {
    targets
        .iter()
        .map(|r| {
            let mut grad = Mat3::zeros();
            for (s, c) in sources.iter().zip(charges) {
                let d = r - s;
                let r2 = d.norm_squared();
                if r2 < SINGULAR_R2 {
                    continue;
                }
                let inv_r3 = 1.0 / (r2 * r2.sqrt());
                grad -= (c * d.transpose()) * inv_r3;
            }
            grad
        })
        .collect()
}

pub fn tree_potentials(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3], eps: f64) -> Vec<Vec3> {
    let tree = SourceTree::build(sources, charges);
    let opening = opening_factor(eps);
    targets.iter().map(|r| tree.potential_at(r, opening)).collect()
}

pub fn tree_gradients(sources: &[Vec3], charges: &[Vec3], targets: &[Vec3], eps: f64) -> Vec<Mat3> {
    let tree = SourceTree::build(sources, charges);
    let opening = opening_factor(eps);
    targets.iter().map(|r| tree.gradient_at(r, opening)).collect()
}

/// A cell is expanded rather than opened when the target is at least
/// `opening_factor * radius` away; the monopole+dipole truncation error then
/// scales as (radius/distance)^2 <= eps / 4.
fn opening_factor(eps: f64) -> f64 {
    (2.0 / eps.max(1e-12).sqrt()).max(4.0)
}

struct TreeNode {
    /// Expansion center (source centroid of the cell).
    center: Vec3,
    /// Max source distance from the center.
    radius: f64,
    /// Monopole: total charge per component.
    charge: Vec3,
    /// Dipole moment: row d = Σ_j c_j[d] (x_j - center).
    dipole: Mat3,
    children: Vec<usize>,
    /// Source indices (leaves only).
    points: Vec<usize>,
}

struct SourceTree<'a> {
    sources: &'a [Vec3],
    charges: &'a [Vec3],
    nodes: Vec<TreeNode>,
    root: usize,
}

impl<'a> SourceTree<'a> {
    fn build(sources: &'a [Vec3], charges: &'a [Vec3]) -> Self {
        let mut min = Vec3::repeat(f64::INFINITY);
        let mut max = Vec3::repeat(f64::NEG_INFINITY);
        for s in sources {
            min = min.inf(s);
            max = max.sup(s);
        }
        let cube_center = (min + max) * 0.5;
        let half = (max - min).amax() * 0.5;

        let mut tree = Self {
            sources,
            charges,
            nodes: Vec::new(),
            root: 0,
        };
        let all: Vec<usize> = (0..sources.len()).collect();
        tree.root = tree.build_node(all, cube_center, half.max(1e-9));
        tree
    }

    fn build_node(&mut self, indices: Vec<usize>, cube_center: Vec3, half: f64) -> usize {
        let mut center = Vec3::zeros();
        for &i in &indices {
            center += self.sources[i];
        }
        center /= indices.len() as f64;

        let mut radius: f64 = 0.0;
        let mut charge = Vec3::zeros();
        let mut dipole = Mat3::zeros();
        for &i in &indices {
            let rel = self.sources[i] - center;
            radius = radius.max(rel.norm());
            charge += self.charges[i];
            dipole += self.charges[i] * rel.transpose();
        }

        // Degenerate clusters (coincident sources) become leaves outright.
        if indices.len() <= LEAF_SIZE || half < 1e-12 {
            self.nodes.push(TreeNode {
                center,
                radius,
                charge,
                dipole,
                children: Vec::new(),
                points: indices,
            });
            return self.nodes.len() - 1;
        }

        let mut buckets: [Vec<usize>; 8] = Default::default();
        for &i in &indices {
            let s = self.sources[i];
            let octant = (s.x > cube_center.x) as usize
                | (((s.y > cube_center.y) as usize) << 1)
                | (((s.z > cube_center.z) as usize) << 2);
            buckets[octant].push(i);
        }

        let quarter = half * 0.5;
        let mut children = Vec::new();
        for (octant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let offset = Vec3::new(
                if octant & 1 != 0 { quarter } else { -quarter },
                if octant & 2 != 0 { quarter } else { -quarter },
                if octant & 4 != 0 { quarter } else { -quarter },
            );
            children.push(self.build_node(bucket, cube_center + offset, quarter));
        }

        self.nodes.push(TreeNode {
            center,
            radius,
            charge,
            dipole,
            children,
            points: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn potential_at(&self, r: &Vec3, opening: f64) -> Vec3 {
        let mut pot = Vec3::zeros();
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let d = r - node.center;
            let dist = d.norm();
            if node.children.is_empty() {
                for &i in &node.points {
                    let rel = r - self.sources[i];
                    let r2 = rel.norm_squared();
                    if r2 < SINGULAR_R2 {
                        continue;
                    }
                    pot += self.charges[i] / r2.sqrt();
                }
            } else if dist >= opening * node.radius {
                let inv_r = 1.0 / dist;
                let inv_r3 = inv_r / (dist * dist);
                pot += node.charge * inv_r + (node.dipole * d) * inv_r3;
            } else {
                stack.extend_from_slice(&node.children);
            }
        }
        pot
    }

    fn gradient_at(&self, r: &Vec3, opening: f64) -> Mat3 {
        let mut grad = Mat3::zeros();
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx];
            let d = r - node.center;
            let dist = d.norm();
            if node.children.is_empty() {
                for &i in &node.points {
                    let rel = r - self.sources[i];
                    let r2 = rel.norm_squared();
                    if r2 < SINGULAR_R2 {
                        continue;
                    }
                    let inv_r3 = 1.0 / (r2 * r2.sqrt());
                    grad -= (self.charges[i] * rel.transpose()) * inv_r3;
                }
            } else if dist >= opening * node.radius {
                let inv_r3 = 1.0 / (dist * dist * dist);
                let inv_r5 = inv_r3 / (dist * dist);
                grad -= (node.charge * d.transpose()) * inv_r3;
                grad += node.dipole * inv_r3 - ((node.dipole * d) * d.transpose()) * (3.0 * inv_r5);
            } else {
                stack.extend_from_slice(&node.children);
            }
        }
        grad
    }
}
