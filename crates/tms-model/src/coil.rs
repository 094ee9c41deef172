//! The coil aggregate: shared-object tables plus the ordered element list.

use tms_math::{translation, translation_part, Mat4, Vec3};
use tms_mesh::CoilMesh;

use crate::casing::Casing;
use crate::deformation::Deformation;
use crate::element::{CoilElement, ElementGeometry};
use crate::error::{ModelError, Result};
use crate::grid::GridData;
use crate::stimulator::Stimulator;
use crate::tags;

/// A TMS coil: optional metadata, an optional coil-level casing, the
/// shared-object tables (stimulators, casings, deformations) and the ordered
/// element list.
///
/// Elements reference the tables by index, so an object referenced from
/// several elements is one logical object — the identity the interchange
/// format de-duplicates by. Topology is fixed after construction; only
/// deformation parameter values change, through their range-checked setters.
#[derive(Debug, Clone, Default)]
pub struct Coil {
    pub name: Option<String>,
    pub brand: Option<String>,
    /// Grid spacing (mm per axis) used when resampling to a grid.
    pub resolution: Option<Vec3>,
    /// Grid extents (mm per axis) used when resampling to a grid.
    pub limits: Option<[[f64; 2]; 3]>,
    /// Coil-level casing (index into `casings`).
    pub casing: Option<usize>,
    pub stimulators: Vec<Stimulator>,
    pub casings: Vec<Casing>,
    pub deformations: Vec<Deformation>,
    pub elements: Vec<CoilElement>,
}

impl Coil {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an already-decoded dense 3-component volume as a single
    /// sampled-grid coil. The sampling metadata is read off the affine:
    /// `resolution` from its diagonal, `limits` from its translation plus
    /// the grid extent.
    pub fn from_volume(data: Vec<f64>, shape: [usize; 3], affine: Mat4) -> Result<Coil> {
        let grid = GridData::new(shape, data)?;
        let resolution = Vec3::new(affine[(0, 0)], affine[(1, 1)], affine[(2, 2)]);
        let origin = translation_part(&affine);
        let mut limits = [[0.0; 2]; 3];
        for d in 0..3 {
            limits[d] = [origin[d], origin[d] + shape[d] as f64 * resolution[d]];
        }

        let mut coil = Coil::new();
        coil.resolution = Some(resolution);
        coil.limits = Some(limits);
        coil.elements.push(CoilElement::sampled_grid(None, grid, affine));
        Ok(coil)
    }

    pub fn add_stimulator(&mut self, stimulator: Stimulator) -> usize {
        self.stimulators.push(stimulator);
        self.stimulators.len() - 1
    }

    pub fn add_casing(&mut self, casing: Casing) -> usize {
        self.casings.push(casing);
        self.casings.len() - 1
    }

    pub fn add_deformation(&mut self, deformation: Deformation) -> usize {
        self.deformations.push(deformation);
        self.deformations.len() - 1
    }

    /// Attach a coil-level casing by table index.
    pub fn set_coil_casing(&mut self, casing: usize) -> Result<()> {
        check_ref("casing", casing, self.casings.len())?;
        self.casing = Some(casing);
        Ok(())
    }

    /// Append an element, validating its table references.
    pub fn add_element(&mut self, element: CoilElement) -> Result<usize> {
        if let Some(s) = element.stimulator {
            check_ref("stimulator", s, self.stimulators.len())?;
        }
        if let Some(c) = element.casing {
            check_ref("casing", c, self.casings.len())?;
        }
        for &d in &element.deformations {
            check_ref("deformation", d, self.deformations.len())?;
        }
        self.elements.push(element);
        Ok(self.elements.len() - 1)
    }

    /// Superposed vector potential of all elements (tesla·meter).
    pub fn a_field(
        &self,
        targets: &[Vec3],
        coil_affine: &Mat4,
        eps: f64,
        apply_deformation: bool,
    ) -> Result<Vec<Vec3>> {
        let mut total = vec![Vec3::zeros(); targets.len()];
        for element in &self.elements {
            let field =
                element.a_field(&self.deformations, targets, coil_affine, eps, apply_deformation)?;
            for (acc, v) in total.iter_mut().zip(field) {
                *acc += v;
            }
        }
        Ok(total)
    }

    /// Superposed dA/dt of all elements (V/m); every element must carry a
    /// stimulator.
    pub fn da_dt(&self, targets: &[Vec3], coil_affine: &Mat4, eps: f64) -> Result<Vec<Vec3>> {
        let mut total = vec![Vec3::zeros(); targets.len()];
        for element in &self.elements {
            let field = element.da_dt(
                &self.deformations,
                &self.stimulators,
                targets,
                coil_affine,
                eps,
            )?;
            for (acc, v) in total.iter_mut().zip(field) {
                *acc += v;
            }
        }
        Ok(total)
    }

    /// Union of all element meshes plus the coil-level casing. The coil
    /// casing is tagged with the block after the last element, so tag ranges
    /// never collide.
    pub fn get_mesh(
        &self,
        coil_affine: &Mat4,
        apply_deformation: bool,
        include_casing: bool,
        include_optimization_points: bool,
        include_coil_elements: bool,
    ) -> CoilMesh {
        let mut mesh = CoilMesh::new();
        for (i, element) in self.elements.iter().enumerate() {
            mesh.join(element.get_mesh(
                &self.deformations,
                &self.casings,
                coil_affine,
                apply_deformation,
                include_casing,
                include_optimization_points,
                include_coil_elements,
                i,
            ));
        }
        if let Some(c) = self.casing {
            mesh.join(self.casings[c].get_mesh(
                coil_affine,
                include_casing,
                include_optimization_points,
                tags::element_base_tag(self.elements.len()),
            ));
        }
        mesh
    }

    /// The sampling grid implied by `limits` and `resolution`: cell shape,
    /// grid-to-world affine, and all cell centers in C order.
    pub fn sample_grid(&self) -> Result<([usize; 3], Mat4, Vec<Vec3>)> {
        let limits = self.limits.ok_or(ModelError::MissingMetadata("limits"))?;
        let resolution = self
            .resolution
            .ok_or(ModelError::MissingMetadata("resolution"))?;

        let mut shape = [0usize; 3];
        for d in 0..3 {
            shape[d] = ((limits[d][1] - limits[d][0]) / resolution[d]).round() as usize;
        }
        let mut affine = translation(&Vec3::new(limits[0][0], limits[1][0], limits[2][0]));
        affine[(0, 0)] = resolution.x;
        affine[(1, 1)] = resolution.y;
        affine[(2, 2)] = resolution.z;

        let mut positions = Vec::with_capacity(shape[0] * shape[1] * shape[2]);
        for i in 0..shape[0] {
            for j in 0..shape[1] {
                for k in 0..shape[2] {
                    positions.push(Vec3::new(
                        limits[0][0] + i as f64 * resolution.x,
                        limits[1][0] + j as f64 * resolution.y,
                        limits[2][0] + k as f64 * resolution.z,
                    ));
                }
            }
        }
        Ok((shape, affine, positions))
    }

    /// Resample every element to a sampled-grid element over the coil's
    /// `limits`/`resolution` grid, baking in current deformations.
    pub fn as_sampled(&self, eps: f64) -> Result<Coil> {
        let (shape, affine, positions) = self.sample_grid()?;

        let mut out = Coil {
            name: self.name.clone(),
            brand: self.brand.clone(),
            resolution: self.resolution,
            limits: self.limits,
            casing: None,
            stimulators: self.stimulators.clone(),
            casings: Vec::new(),
            deformations: Vec::new(),
            elements: Vec::new(),
        };

        for element in &self.elements {
            let field =
                element.a_field(&self.deformations, &positions, &Mat4::identity(), eps, true)?;
            let data = GridData::from_vectors(shape, &field)?;
            let mut sampled =
                CoilElement::sampled_grid(element.name.clone(), data, affine);
            sampled.stimulator = element.stimulator;
            out.elements.push(sampled);
        }
        Ok(out)
    }

    /// Like [`as_sampled`](Self::as_sampled), but elements driven by the same
    /// stimulator are merged into one sampled-grid element before resampling.
    /// Group order follows the first element of each group; unattributed
    /// elements form one group of their own.
    pub fn as_sampled_squashed(&self, eps: f64) -> Result<Coil> {
        let (shape, affine, positions) = self.sample_grid()?;

        let mut out = Coil {
            name: self.name.clone(),
            brand: self.brand.clone(),
            resolution: self.resolution,
            limits: self.limits,
            casing: None,
            stimulators: self.stimulators.clone(),
            casings: Vec::new(),
            deformations: Vec::new(),
            elements: Vec::new(),
        };

        let mut groups: Vec<(Option<usize>, Vec<Vec3>)> = Vec::new();
        for element in &self.elements {
            let field =
                element.a_field(&self.deformations, &positions, &Mat4::identity(), eps, true)?;
            match groups.iter_mut().find(|(s, _)| *s == element.stimulator) {
                Some((_, acc)) => {
                    for (a, v) in acc.iter_mut().zip(field) {
                        *a += v;
                    }
                }
                None => groups.push((element.stimulator, field)),
            }
        }

        for (stimulator, field) in groups {
            let data = GridData::from_vectors(shape, &field)?;
            let name = stimulator.and_then(|s| self.stimulators[s].name.clone());
            let mut sampled = CoilElement::sampled_grid(name, data, affine);
            sampled.stimulator = stimulator;
            out.elements.push(sampled);
        }
        Ok(out)
    }

    /// Whether any element is a sampled grid (useful to callers deciding
    /// whether resampling is lossy).
    pub fn has_sampled_elements(&self) -> bool {
        self.elements
            .iter()
            .any(|e| matches!(e.geometry, ElementGeometry::SampledGrid { .. }))
    }
}

fn check_ref(kind: &'static str, index: usize, len: usize) -> Result<()> {
    if index >= len {
        return Err(ModelError::InvalidReference { kind, index, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_add_element_validates_references() {
        let mut coil = Coil::new();
        let dangling = CoilElement::dipoles(None, vec![Vec3::zeros()], vec![Vec3::z()])
            .unwrap()
            .with_stimulator(0);
        assert!(matches!(
            coil.add_element(dangling),
            Err(ModelError::InvalidReference { kind: "stimulator", .. })
        ));
    }

    #[test]
    fn test_coil_field_is_superposition() {
        let mut coil = Coil::new();
        let points = vec![Vec3::new(-10.0, 0.0, 0.0)];
        let values = vec![Vec3::new(0.0, 0.0, 1e-6)];
        coil.add_element(CoilElement::dipoles(None, points.clone(), values.clone()).unwrap())
            .unwrap();
        coil.add_element(CoilElement::dipoles(None, points.clone(), values.clone()).unwrap())
            .unwrap();

        let targets = vec![Vec3::new(0.0, 0.0, 40.0)];
        let single = coil.elements[0]
            .a_field(&coil.deformations, &targets, &Mat4::identity(), 1e-3, true)
            .unwrap();
        let total = coil
            .a_field(&targets, &Mat4::identity(), 1e-3, true)
            .unwrap();
        assert_relative_eq!(total[0], single[0] * 2.0, epsilon = 1e-20);
    }

    #[test]
    fn test_sample_grid_shape_and_affine() {
        let mut coil = Coil::new();
        coil.resolution = Some(Vec3::new(10.0, 10.0, 10.0));
        coil.limits = Some([[-100.0, 110.0], [-100.0, 110.0], [-100.0, 110.0]]);
        let (shape, affine, positions) = coil.sample_grid().unwrap();
        assert_eq!(shape, [21, 21, 21]);
        assert_relative_eq!(affine[(0, 0)], 10.0);
        assert_relative_eq!(affine[(0, 3)], -100.0);
        assert_eq!(positions.len(), 21 * 21 * 21);
        assert_relative_eq!(positions[0], Vec3::new(-100.0, -100.0, -100.0));
    }

    #[test]
    fn test_as_sampled_matches_at_grid_nodes() {
        let mut coil = Coil::new();
        coil.resolution = Some(Vec3::new(5.0, 5.0, 5.0));
        coil.limits = Some([[20.0, 40.0], [20.0, 40.0], [20.0, 40.0]]);
        coil.add_element(
            CoilElement::dipoles(
                None,
                vec![Vec3::zeros()],
                vec![Vec3::new(0.0, 0.0, 1e-6)],
            )
            .unwrap(),
        )
        .unwrap();

        let sampled = coil.as_sampled(1e-3).unwrap();
        let (_, _, positions) = coil.sample_grid().unwrap();

        let direct = coil
            .a_field(&positions, &Mat4::identity(), 1e-3, true)
            .unwrap();
        let interpolated = sampled
            .a_field(&positions, &Mat4::identity(), 1e-3, true)
            .unwrap();
        // Tri-linear interpolation is exact at the grid nodes themselves.
        for (a, b) in direct.iter().zip(&interpolated) {
            assert_relative_eq!(a, b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_as_sampled_squashed_merges_per_stimulator() {
        let mut coil = Coil::new();
        coil.resolution = Some(Vec3::new(5.0, 5.0, 5.0));
        coil.limits = Some([[20.0, 40.0], [20.0, 40.0], [20.0, 40.0]]);
        let stim_a = coil.add_stimulator(Stimulator::new(Some("a".into())));
        let stim_b = coil.add_stimulator(Stimulator::new(Some("b".into())));
        let moment = vec![Vec3::new(0.0, 0.0, 1e-6)];
        for (position, stimulator) in [
            (Vec3::zeros(), stim_a),
            (Vec3::new(2.0, 0.0, 0.0), stim_a),
            (Vec3::new(0.0, 2.0, 0.0), stim_b),
        ] {
            coil.add_element(
                CoilElement::dipoles(None, vec![position], moment.clone())
                    .unwrap()
                    .with_stimulator(stimulator),
            )
            .unwrap();
        }

        let squashed = coil.as_sampled_squashed(1e-3).unwrap();
        assert_eq!(squashed.elements.len(), 2);
        assert_eq!(squashed.elements[0].stimulator, Some(stim_a));
        assert_eq!(squashed.elements[1].stimulator, Some(stim_b));

        // Merging preserves the total field at the grid nodes.
        let (_, _, positions) = coil.sample_grid().unwrap();
        let direct = coil
            .a_field(&positions, &Mat4::identity(), 1e-3, true)
            .unwrap();
        let merged = squashed
            .a_field(&positions, &Mat4::identity(), 1e-3, true)
            .unwrap();
        for (a, b) in direct.iter().zip(&merged) {
            assert_relative_eq!(a, b, epsilon = 1e-15);
        }

        // The first group carries the field of both of its members.
        let first = squashed.elements[0]
            .a_field(&squashed.deformations, &positions, &Mat4::identity(), 1e-3, true)
            .unwrap();
        let expected: Vec<Vec3> = coil.elements[0]
            .a_field(&coil.deformations, &positions, &Mat4::identity(), 1e-3, true)
            .unwrap()
            .iter()
            .zip(
                coil.elements[1]
                    .a_field(&coil.deformations, &positions, &Mat4::identity(), 1e-3, true)
                    .unwrap(),
            )
            .map(|(a, b)| a + b)
            .collect();
        for (a, b) in first.iter().zip(&expected) {
            assert_relative_eq!(a, b, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_from_volume_derives_sampling_metadata() {
        let mut affine = tms_math::translation(&Vec3::new(-30.0, -30.0, 0.0));
        affine[(0, 0)] = 3.0;
        affine[(1, 1)] = 3.0;
        affine[(2, 2)] = 3.0;
        let coil = Coil::from_volume(vec![0.0; 20 * 20 * 10 * 3], [20, 20, 10], affine).unwrap();

        assert_relative_eq!(coil.resolution.unwrap(), Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(coil.limits.unwrap()[0], [-30.0, 30.0]);
        assert_eq!(coil.limits.unwrap()[2], [0.0, 30.0]);
        assert!(coil.has_sampled_elements());
    }

    #[test]
    fn test_missing_limits_is_an_error() {
        let coil = Coil::new();
        assert!(matches!(
            coil.sample_grid(),
            Err(ModelError::MissingMetadata("limits"))
        ));
    }
}
