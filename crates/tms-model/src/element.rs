//! Coil elements: the physical field sources of a coil.
//!
//! An element is one of a closed set of variants (dipoles, line segments,
//! sampled grid) plus references into the owning coil's shared-object tables
//! (stimulator, casing, deformations). Keeping the variant set closed keeps
//! the serializer's type-tag switch exhaustive.

use tms_math::{
    rotation_part, transform_point, transform_points, transform_vectors, Mat4, Vec3,
};
use tms_mesh::CoilMesh;

use crate::casing::Casing;
use crate::deformation::Deformation;
use crate::error::{ModelError, Result};
use crate::grid::GridData;
use crate::stimulator::Stimulator;
use crate::{nbody, tags};

/// Conversion from the model's millimeters to meters for field evaluation.
pub const MM_TO_M: f64 = 1e-3;

/// mu_0 / 4 pi.
pub const FIELD_SCALE: f64 = 1e-7;

/// The source geometry of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementGeometry {
    /// Magnetic dipoles: positions (mm) and moment vectors (A·m²).
    Dipoles { points: Vec<Vec3>, values: Vec<Vec3> },
    /// Current-carrying segments: positions (mm) and direction/length
    /// vectors (mm).
    LineSegments { points: Vec<Vec3>, values: Vec<Vec3> },
    /// Pre-sampled vector field on a dense grid, positioned by `affine`
    /// (grid cell -> mm).
    SampledGrid { data: GridData, affine: Mat4 },
}

/// One stimulating element of a coil.
#[derive(Debug, Clone, PartialEq)]
pub struct CoilElement {
    pub name: Option<String>,
    /// Index into the coil's casing table.
    pub casing: Option<usize>,
    /// Ordered indices into the coil's deformation table.
    pub deformations: Vec<usize>,
    /// Index into the coil's stimulator table.
    pub stimulator: Option<usize>,
    pub geometry: ElementGeometry,
}

impl CoilElement {
    /// Dipole element; positions and moments must match in length.
    pub fn dipoles(name: Option<String>, points: Vec<Vec3>, values: Vec<Vec3>) -> Result<Self> {
        if points.len() != values.len() {
            return Err(ModelError::ShapeMismatch {
                positions: points.len(),
                values: values.len(),
            });
        }
        Ok(Self {
            name,
            casing: None,
            deformations: Vec::new(),
            stimulator: None,
            geometry: ElementGeometry::Dipoles { points, values },
        })
    }

    /// Line segment element. When `values` is absent the directions are the
    /// forward differences of consecutive points, the last wrapping around to
    /// the first.
    pub fn line_segments(
        name: Option<String>,
        points: Vec<Vec3>,
        values: Option<Vec<Vec3>>,
    ) -> Result<Self> {
        let values = match values {
            Some(values) => {
                if points.len() != values.len() {
                    return Err(ModelError::ShapeMismatch {
                        positions: points.len(),
                        values: values.len(),
                    });
                }
                values
            }
            None => {
                let n = points.len();
                (0..n).map(|i| points[(i + 1) % n] - points[i]).collect()
            }
        };
        Ok(Self {
            name,
            casing: None,
            deformations: Vec::new(),
            stimulator: None,
            geometry: ElementGeometry::LineSegments { points, values },
        })
    }

    /// Sampled grid element.
    pub fn sampled_grid(name: Option<String>, data: GridData, affine: Mat4) -> Self {
        Self {
            name,
            casing: None,
            deformations: Vec::new(),
            stimulator: None,
            geometry: ElementGeometry::SampledGrid { data, affine },
        }
    }

    pub fn with_casing(mut self, casing: usize) -> Self {
        self.casing = Some(casing);
        self
    }

    pub fn with_deformations(mut self, deformations: Vec<usize>) -> Self {
        self.deformations = deformations;
        self
    }

    pub fn with_stimulator(mut self, stimulator: usize) -> Self {
        self.stimulator = Some(stimulator);
        self
    }

    /// Deformation matrices composed in order, then `base` applied last:
    /// deformations act in local coil space, `base` repositions the assembly.
    pub fn combined_transform(&self, deformations: &[Deformation], base: &Mat4) -> Mat4 {
        let mut m = Mat4::identity();
        for &idx in &self.deformations {
            m = deformations[idx].as_matrix() * m;
        }
        base * m
    }

    fn effective_affine(
        &self,
        deformations: &[Deformation],
        affine: &Mat4,
        apply_deformation: bool,
    ) -> Mat4 {
        if apply_deformation {
            self.combined_transform(deformations, affine)
        } else {
            *affine
        }
    }

    /// Source positions under the (optionally deformed) affine. For sampled
    /// grids these are the world-space cell centers.
    pub fn get_points(
        &self,
        deformations: &[Deformation],
        affine: &Mat4,
        apply_deformation: bool,
    ) -> Vec<Vec3> {
        let eff = self.effective_affine(deformations, affine, apply_deformation);
        match &self.geometry {
            ElementGeometry::Dipoles { points, .. }
            | ElementGeometry::LineSegments { points, .. } => transform_points(&eff, points),
            ElementGeometry::SampledGrid { data, affine: grid } => {
                let full = eff * grid;
                data.cell_indices()
                    .map(|[i, j, k]| {
                        transform_point(&full, &Vec3::new(i as f64, j as f64, k as f64))
                    })
                    .collect()
            }
        }
    }

    /// Source vectors (moments, directions or sampled vectors) rotated by the
    /// (optionally deformed) affine.
    pub fn get_values(
        &self,
        deformations: &[Deformation],
        affine: &Mat4,
        apply_deformation: bool,
    ) -> Vec<Vec3> {
        let eff = self.effective_affine(deformations, affine, apply_deformation);
        match &self.geometry {
            ElementGeometry::Dipoles { values, .. }
            | ElementGeometry::LineSegments { values, .. } => transform_vectors(&eff, values),
            ElementGeometry::SampledGrid { data, .. } => {
                let rot = rotation_part(&eff);
                data.vectors().iter().map(|v| rot * v).collect()
            }
        }
    }

    /// The vector potential (tesla·meter) at each target position (mm).
    pub fn a_field(
        &self,
        deformations: &[Deformation],
        targets: &[Vec3],
        coil_affine: &Mat4,
        eps: f64,
        apply_deformation: bool,
    ) -> Result<Vec<Vec3>> {
        match &self.geometry {
            ElementGeometry::Dipoles { .. } => {
                let moments = self.get_values(deformations, coil_affine, apply_deformation);
                let sources_m: Vec<Vec3> = self
                    .get_points(deformations, coil_affine, apply_deformation)
                    .iter()
                    .map(|p| p * MM_TO_M)
                    .collect();
                let targets_m: Vec<Vec3> = targets.iter().map(|p| p * MM_TO_M).collect();

                let grads = nbody::gradients(&sources_m, &moments, &targets_m, eps);
                Ok(grads
                    .iter()
                    .map(|g| {
                        // A = -1e-7 * curl of the per-component potential sums.
                        Vec3::new(
                            g[(1, 2)] - g[(2, 1)],
                            g[(2, 0)] - g[(0, 2)],
                            g[(0, 1)] - g[(1, 0)],
                        ) * -FIELD_SCALE
                    })
                    .collect())
            }
            ElementGeometry::LineSegments { .. } => {
                let directions_m: Vec<Vec3> = self
                    .get_values(deformations, coil_affine, apply_deformation)
                    .iter()
                    .map(|v| v * MM_TO_M)
                    .collect();
                let sources_m: Vec<Vec3> = self
                    .get_points(deformations, coil_affine, apply_deformation)
                    .iter()
                    .map(|p| p * MM_TO_M)
                    .collect();
                let targets_m: Vec<Vec3> = targets.iter().map(|p| p * MM_TO_M).collect();

                let pots = nbody::potentials(&sources_m, &directions_m, &targets_m, eps);
                Ok(pots.iter().map(|p| p * FIELD_SCALE).collect())
            }
            ElementGeometry::SampledGrid { data, affine: grid } => {
                let combined =
                    self.effective_affine(deformations, coil_affine, apply_deformation);
                let inv = (combined * grid)
                    .try_inverse()
                    .ok_or(ModelError::SingularAffine)?;
                // Translation never rotates a vector field: only the coil
                // affine's rotation block is applied to the samples.
                let rot = rotation_part(coil_affine);
                Ok(targets
                    .iter()
                    .map(|t| rot * data.sample(&transform_point(&inv, t)))
                    .collect())
            }
        }
    }

    /// dA/dt (V/m) at each target: the stimulator's di/dt times the vector
    /// potential.
    pub fn da_dt(
        &self,
        deformations: &[Deformation],
        stimulators: &[Stimulator],
        targets: &[Vec3],
        coil_affine: &Mat4,
        eps: f64,
    ) -> Result<Vec<Vec3>> {
        let stim = self
            .stimulator
            .ok_or(ModelError::MissingStimulator)
            .map(|i| &stimulators[i])?;
        let mut field = self.a_field(deformations, targets, coil_affine, eps, true)?;
        for v in &mut field {
            *v *= stim.di_dt;
        }
        Ok(field)
    }

    /// Casing surface points, min-distance anchors and intersect anchors
    /// under the (optionally deformed) affine; empty when the element has no
    /// casing.
    pub fn casing_coordinates(
        &self,
        casings: &[Casing],
        deformations: &[Deformation],
        affine: &Mat4,
        apply_deformation: bool,
    ) -> (Vec<Vec3>, Vec<Vec3>, Vec<Vec3>) {
        let eff = self.effective_affine(deformations, affine, apply_deformation);
        match self.casing {
            Some(c) => {
                let casing = &casings[c];
                (
                    casing.get_points(&eff),
                    casing.get_min_distance_points(&eff),
                    casing.get_intersect_points(&eff),
                )
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        }
    }

    /// Mesh of the stimulating geometry itself (no casing), tagged within the
    /// block owned by `element_index`.
    pub fn element_mesh(
        &self,
        deformations: &[Deformation],
        affine: &Mat4,
        apply_deformation: bool,
        element_index: usize,
    ) -> CoilMesh {
        let base = tags::element_base_tag(element_index);
        let points = self.get_points(deformations, affine, apply_deformation);
        let values = self.get_values(deformations, affine, apply_deformation);
        match &self.geometry {
            ElementGeometry::Dipoles { .. } => {
                let mut mesh = CoilMesh::from_point_markers(points, base + tags::DIPOLES);
                mesh.add_node_field(format!("{element_index}-dipole_moment"), values);
                mesh
            }
            ElementGeometry::LineSegments { .. } => {
                let n = points.len();
                let mut nodes = points.clone();
                nodes.extend(points.iter().zip(&values).map(|(p, v)| p + v));

                let mut mesh = CoilMesh::new();
                mesh.nodes = nodes;
                mesh.lines = (0..n).map(|i| [i, i + n]).collect();
                mesh.line_tags = vec![base + tags::LINE_ELEMENTS; n];

                let mut field = values;
                field.extend(std::iter::repeat(Vec3::zeros()).take(n));
                mesh.add_node_field(format!("{element_index}-line_segment_direction"), field);
                mesh
            }
            ElementGeometry::SampledGrid { .. } => {
                let n = points.len();
                let mut nodes = points.clone();
                nodes.extend(points.iter().zip(&values).map(|(p, v)| p + v));

                let mut mesh = CoilMesh::new();
                mesh.nodes = nodes;
                mesh.points = (0..2 * n).collect();
                mesh.point_tags = vec![base + tags::SAMPLED_GRID_ELEMENTS; 2 * n];

                let mut field = values;
                field.extend(std::iter::repeat(Vec3::zeros()).take(n));
                mesh.add_node_field(format!("{element_index}-sampled_vector"), field);
                mesh
            }
        }
    }

    /// Full element visualization mesh: casing, optimization anchor points
    /// and the stimulating geometry, individually includable.
    #[allow(clippy::too_many_arguments)]
    pub fn get_mesh(
        &self,
        deformations: &[Deformation],
        casings: &[Casing],
        affine: &Mat4,
        apply_deformation: bool,
        include_element_casing: bool,
        include_optimization_points: bool,
        include_coil_element: bool,
        element_index: usize,
    ) -> CoilMesh {
        let mut mesh = CoilMesh::new();
        if let Some(c) = self.casing {
            let eff = self.effective_affine(deformations, affine, apply_deformation);
            mesh.join(casings[c].get_mesh(
                &eff,
                include_element_casing,
                include_optimization_points,
                tags::element_base_tag(element_index),
            ));
        }
        if include_coil_element {
            mesh.join(self.element_mesh(deformations, affine, apply_deformation, element_index));
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tms_math::translation;

    fn figure_eight_dipoles() -> CoilElement {
        let points = vec![
            Vec3::new(-10.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(-20.0, 20.0, -2.0),
        ];
        let values = vec![
            Vec3::new(0.0, 0.0, 1e-6),
            Vec3::new(0.0, 0.0, -1e-6),
            Vec3::new(0.0, 1e-6, 0.0),
        ];
        CoilElement::dipoles(None, points, values).unwrap()
    }

    #[test]
    fn test_mismatched_shapes_rejected() {
        let err = CoilElement::dipoles(None, vec![Vec3::zeros()], vec![]);
        assert!(matches!(err, Err(ModelError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_derived_segment_directions_wrap_around() {
        let elem = CoilElement::line_segments(
            None,
            vec![Vec3::zeros(), Vec3::new(10.0, 0.0, 0.0), Vec3::new(10.0, 10.0, 0.0)],
            None,
        )
        .unwrap();
        match &elem.geometry {
            ElementGeometry::LineSegments { values, .. } => {
                assert_eq!(values[0], Vec3::new(10.0, 0.0, 0.0));
                assert_eq!(values[1], Vec3::new(0.0, 10.0, 0.0));
                // Last direction closes the loop back to the first point.
                assert_eq!(values[2], Vec3::new(-10.0, -10.0, 0.0));
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_single_dipole_a_field_analytic() {
        // One z-directed dipole at the origin; A = 1e-7 * m x r / |r|^3 with
        // everything in meters.
        let elem =
            CoilElement::dipoles(None, vec![Vec3::zeros()], vec![Vec3::new(0.0, 0.0, 1.0)])
                .unwrap();
        let target_mm = Vec3::new(100.0, 0.0, 0.0); // 0.1 m
        let a = elem
            .a_field(&[], &[target_mm], &Mat4::identity(), 1e-3, true)
            .unwrap();

        let r = Vec3::new(0.1, 0.0, 0.0);
        let expected = Vec3::new(0.0, 0.0, 1.0).cross(&r) * 1e-7 / r.norm().powi(3);
        assert_relative_eq!(a[0], expected, epsilon = 1e-12);
    }

    #[test]
    fn test_a_field_linear_in_moments() {
        let elem = figure_eight_dipoles();
        let scaled = match &elem.geometry {
            ElementGeometry::Dipoles { points, values } => CoilElement::dipoles(
                None,
                points.clone(),
                values.iter().map(|v| v * 2.5).collect(),
            )
            .unwrap(),
            _ => unreachable!(),
        };

        let targets = vec![Vec3::new(0.0, 0.0, 30.0), Vec3::new(15.0, -10.0, 40.0)];
        let a = elem
            .a_field(&[], &targets, &Mat4::identity(), 1e-3, true)
            .unwrap();
        let a_scaled = scaled
            .a_field(&[], &targets, &Mat4::identity(), 1e-3, true)
            .unwrap();
        for (x, y) in a.iter().zip(&a_scaled) {
            assert_relative_eq!(x * 2.5, *y, epsilon = 1e-20);
        }
    }

    #[test]
    fn test_grid_field_rotates_with_coil_affine_rotation_only() {
        // Constant x-directed sample field on a small grid.
        let data = GridData::from_vectors([2, 2, 2], &vec![Vec3::x() * 2.0; 8]).unwrap();
        let grid_affine = Mat4::identity();
        let elem = CoilElement::sampled_grid(None, data, grid_affine);

        // Pure translation: samples must come back unrotated.
        let shift = translation(&Vec3::new(0.3, 0.2, 0.1));
        let a = elem
            .a_field(&[], &[Vec3::new(0.8, 0.7, 0.6)], &shift, 1e-3, true)
            .unwrap();
        assert_relative_eq!(a[0], Vec3::x() * 2.0, epsilon = 1e-12);

        // A quarter turn about z rotates the samples into y.
        let rot = tms_math::rotation_about_line(
            &Vec3::zeros(),
            &Vec3::z(),
            std::f64::consts::FRAC_PI_2,
        );
        // The grid cell (0.5, 0.5, 0.5) lands at (-0.5, 0.5, 0.5) in world.
        let a = elem
            .a_field(&[], &[Vec3::new(-0.5, 0.5, 0.5)], &rot, 1e-3, true)
            .unwrap();
        assert_relative_eq!(a[0], Vec3::y() * 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_element_mesh_roles() {
        let elem = figure_eight_dipoles();
        let mesh = elem.element_mesh(&[], &Mat4::identity(), true, 2);
        assert_eq!(
            mesh.unique_tags().into_iter().collect::<Vec<_>>(),
            vec![2 * tags::TAG_BLOCK + tags::DIPOLES]
        );
        assert_eq!(mesh.node_fields[0].name, "2-dipole_moment");
    }
}
