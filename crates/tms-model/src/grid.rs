//! Dense 3D grid of sampled field vectors.

use tms_math::Vec3;

use crate::error::{ModelError, Result};

/// A dense `[nx, ny, nz]` grid holding one 3-vector per cell, stored flat in
/// C order with the vector components innermost.
#[derive(Debug, Clone, PartialEq)]
pub struct GridData {
    shape: [usize; 3],
    data: Vec<f64>,
}

impl GridData {
    pub fn new(shape: [usize; 3], data: Vec<f64>) -> Result<Self> {
        if data.len() != shape[0] * shape[1] * shape[2] * 3 {
            return Err(ModelError::GridShape {
                len: data.len(),
                shape,
            });
        }
        Ok(Self { shape, data })
    }

    /// Build from one vector per cell, in C order.
    pub fn from_vectors(shape: [usize; 3], vectors: &[Vec3]) -> Result<Self> {
        let mut data = Vec::with_capacity(vectors.len() * 3);
        for v in vectors {
            data.extend_from_slice(&[v.x, v.y, v.z]);
        }
        Self::new(shape, data)
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn num_cells(&self) -> usize {
        self.shape[0] * self.shape[1] * self.shape[2]
    }

    pub fn flat(&self) -> &[f64] {
        &self.data
    }

    /// The stored vector at integer cell `(i, j, k)`.
    pub fn get(&self, i: usize, j: usize, k: usize) -> Vec3 {
        let base = ((i * self.shape[1] + j) * self.shape[2] + k) * 3;
        Vec3::new(self.data[base], self.data[base + 1], self.data[base + 2])
    }

    /// All stored vectors in C cell order.
    pub fn vectors(&self) -> Vec<Vec3> {
        self.data
            .chunks_exact(3)
            .map(|c| Vec3::new(c[0], c[1], c[2]))
            .collect()
    }

    /// Iterate cell indices in C order.
    pub fn cell_indices(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        let [nx, ny, nz] = self.shape;
        (0..nx).flat_map(move |i| (0..ny).flat_map(move |j| (0..nz).map(move |k| [i, j, k])))
    }

    /// Tri-linear interpolation at a fractional voxel coordinate,
    /// component-wise; cells outside the grid contribute zero.
    pub fn sample(&self, voxel: &Vec3) -> Vec3 {
        let base = [voxel.x.floor(), voxel.y.floor(), voxel.z.floor()];
        let frac = [voxel.x - base[0], voxel.y - base[1], voxel.z - base[2]];

        let mut out = Vec3::zeros();
        for corner in 0..8 {
            let offs = [corner & 1, (corner >> 1) & 1, (corner >> 2) & 1];
            let mut weight = 1.0;
            let mut idx = [0usize; 3];
            let mut inside = true;
            for d in 0..3 {
                weight *= if offs[d] == 1 { frac[d] } else { 1.0 - frac[d] };
                let c = base[d] + offs[d] as f64;
                if c < 0.0 || c >= self.shape[d] as f64 {
                    inside = false;
                    break;
                }
                idx[d] = c as usize;
            }
            if inside && weight > 0.0 {
                out += self.get(idx[0], idx[1], idx[2]) * weight;
            }
        }
        out
    }
}
