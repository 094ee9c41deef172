//! Constrained coil placement optimization.
//!
//! Adjusts a coil's deformation parameters (and optionally a global
//! translation) so that its casing hugs a target surface without
//! penetrating it. The objective is the mean distance from the casing's
//! fit anchors to the surface, plus a penalty for every intersection
//! anchor that ends up inside the surface. The search is a bounded
//! Nelder–Mead simplex, which needs no gradients of the distance field.

use tms_math::{translation, Mat4, Vec3};
use tms_mesh::AabbTree;
use tms_model::{Coil, Deformation, Result};

/// Configuration for the placement optimizer.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    /// Maximum number of simplex iterations.
    pub max_iterations: usize,
    /// Stop when the simplex score spread falls below this.
    pub tolerance: f64,
    /// Score penalty per penetrating intersection anchor.
    pub penalty_weight: f64,
    /// Print progress every N iterations (0 disables).
    pub print_every: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            tolerance: 1e-6,
            penalty_weight: 1000.0,
            print_every: 0,
        }
    }
}

/// Result of a placement optimization.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    /// Score before optimization, under the initial parameter values.
    pub initial_score: f64,
    /// Score after optimization.
    pub final_score: f64,
    /// Number of simplex iterations performed.
    pub iterations: usize,
    /// Coil placement affine including the optimized global translation.
    pub affine: Mat4,
}

/// Penetration state and mean fit distance of a coil under its current
/// deformation values.
pub fn placement_scores(coil: &Coil, surface: &AabbTree, coil_affine: &Mat4) -> (bool, f64) {
    let (fit, penetration) = placement_points(coil, &coil.deformations, coil_affine);
    let intersecting = penetration.iter().any(|p| surface.contains(p));
    (intersecting, mean_distance(surface, &fit))
}

/// Optimize the coil's deformation parameters, and a global translation when
/// `translation_ranges` is given, against `surface`. The best parameters are
/// written back into the coil; the returned affine folds the optimized
/// translation into `coil_affine`.
///
/// The initial parameter values are a vertex of the starting simplex, so the
/// final score is never worse than the initial one.
pub fn optimize_deformations(
    coil: &mut Coil,
    surface: &AabbTree,
    coil_affine: &Mat4,
    translation_ranges: Option<[[f64; 2]; 3]>,
    config: &OptimizerConfig,
) -> Result<OptimizationResult> {
    let n_deform = coil.deformations.len();

    // Parameter vector: deformation values, then the optional translation.
    let mut x0: Vec<f64> = coil.deformations.iter().map(|d| d.current()).collect();
    let mut bounds: Vec<[f64; 2]> = coil
        .deformations
        .iter()
        .map(|d| [d.range.0, d.range.1])
        .collect();
    if let Some(ranges) = translation_ranges {
        for range in ranges {
            x0.push(0.0);
            bounds.push(range);
        }
    }

    let mut scratch = coil.deformations.clone();
    let mut eval = |params: &[f64]| -> Result<f64> {
        evaluate(coil, &mut scratch, surface, coil_affine, params, n_deform, config)
    };

    let initial_score = eval(&x0)?;
    if x0.is_empty() {
        return Ok(OptimizationResult {
            initial_score,
            final_score: initial_score,
            iterations: 0,
            affine: *coil_affine,
        });
    }

    let (best, final_score, iterations) =
        nelder_mead(&mut eval, x0, &bounds, initial_score, config)?;

    for (d, &v) in coil.deformations.iter_mut().zip(&best) {
        d.set_current(v)?;
    }
    let affine = if translation_ranges.is_some() {
        translation(&Vec3::new(
            best[n_deform],
            best[n_deform + 1],
            best[n_deform + 2],
        )) * coil_affine
    } else {
        *coil_affine
    };

    Ok(OptimizationResult {
        initial_score,
        final_score,
        iterations,
        affine,
    })
}

fn evaluate(
    coil: &Coil,
    scratch: &mut [Deformation],
    surface: &AabbTree,
    coil_affine: &Mat4,
    params: &[f64],
    n_deform: usize,
    config: &OptimizerConfig,
) -> Result<f64> {
    for (d, &v) in scratch.iter_mut().zip(&params[..n_deform]) {
        d.set_current(v)?;
    }
    let affine = if params.len() > n_deform {
        translation(&Vec3::new(
            params[n_deform],
            params[n_deform + 1],
            params[n_deform + 2],
        )) * coil_affine
    } else {
        *coil_affine
    };

    let (fit, penetration) = placement_points(coil, scratch, &affine);
    let penetrating = penetration.iter().filter(|p| surface.contains(p)).count();
    Ok(mean_distance(surface, &fit) + config.penalty_weight * penetrating as f64)
}

/// Fit targets and no-penetration targets of every casing in the coil, in
/// world coordinates: element casings under their combined transforms, the
/// coil-level casing under the plain placement affine.
fn placement_points(
    coil: &Coil,
    deformations: &[Deformation],
    coil_affine: &Mat4,
) -> (Vec<Vec3>, Vec<Vec3>) {
    let mut fit = Vec::new();
    let mut penetration = Vec::new();
    for element in &coil.elements {
        if let Some(c) = element.casing {
            let eff = element.combined_transform(deformations, coil_affine);
            fit.extend(coil.casings[c].fit_points(&eff));
            penetration.extend(coil.casings[c].penetration_points(&eff));
        }
    }
    if let Some(c) = coil.casing {
        fit.extend(coil.casings[c].fit_points(coil_affine));
        penetration.extend(coil.casings[c].penetration_points(coil_affine));
    }
    (fit, penetration)
}

fn mean_distance(surface: &AabbTree, points: &[Vec3]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| surface.distance(p)).sum::<f64>() / points.len() as f64
}

/// Bounded Nelder–Mead minimization. `x0` (already within bounds) becomes a
/// simplex vertex, so the returned score never exceeds `f0`.
fn nelder_mead(
    eval: &mut impl FnMut(&[f64]) -> Result<f64>,
    x0: Vec<f64>,
    bounds: &[[f64; 2]],
    f0: f64,
    config: &OptimizerConfig,
) -> Result<(Vec<f64>, f64, usize)> {
    const ALPHA: f64 = 1.0; // reflection
    const GAMMA: f64 = 2.0; // expansion
    const RHO: f64 = 0.5; // contraction
    const SIGMA: f64 = 0.5; // shrink

    let n = x0.len();
    let clamp = |x: &mut Vec<f64>| {
        for (v, b) in x.iter_mut().zip(bounds) {
            *v = v.clamp(b[0], b[1]);
        }
    };

    let mut simplex: Vec<(Vec<f64>, f64)> = Vec::with_capacity(n + 1);
    simplex.push((x0.clone(), f0));
    for i in 0..n {
        let span = bounds[i][1] - bounds[i][0];
        let mut step = 0.1 * span;
        if x0[i] + step > bounds[i][1] {
            step = -step;
        }
        let mut x = x0.clone();
        x[i] += step;
        clamp(&mut x);
        let f = eval(&x)?;
        simplex.push((x, f));
    }

    let mut iterations = 0;
    for iter in 0..config.max_iterations {
        iterations = iter + 1;
        simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
        if simplex[n].1 - simplex[0].1 < config.tolerance {
            break;
        }
        if config.print_every > 0 && iter % config.print_every == 0 {
            println!("Iteration {}: score = {:.6e}", iter, simplex[0].1);
        }

        // Centroid of all vertices but the worst.
        let mut centroid = vec![0.0; n];
        for (x, _) in &simplex[..n] {
            for (c, v) in centroid.iter_mut().zip(x) {
                *c += v / n as f64;
            }
        }

        let worst = simplex[n].clone();
        let mut reflected: Vec<f64> = centroid
            .iter()
            .zip(&worst.0)
            .map(|(c, w)| c + ALPHA * (c - w))
            .collect();
        clamp(&mut reflected);
        let f_reflected = eval(&reflected)?;

        if f_reflected < simplex[0].1 {
            let mut expanded: Vec<f64> = centroid
                .iter()
                .zip(&reflected)
                .map(|(c, r)| c + GAMMA * (r - c))
                .collect();
            clamp(&mut expanded);
            let f_expanded = eval(&expanded)?;
            simplex[n] = if f_expanded < f_reflected {
                (expanded, f_expanded)
            } else {
                (reflected, f_reflected)
            };
        } else if f_reflected < simplex[n - 1].1 {
            simplex[n] = (reflected, f_reflected);
        } else {
            let mut contracted: Vec<f64> = centroid
                .iter()
                .zip(&worst.0)
                .map(|(c, w)| c + RHO * (w - c))
                .collect();
            clamp(&mut contracted);
            let f_contracted = eval(&contracted)?;
            if f_contracted < worst.1 {
                simplex[n] = (contracted, f_contracted);
            } else {
                // Shrink everything toward the best vertex.
                let best = simplex[0].0.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    for (v, b) in vertex.0.iter_mut().zip(&best) {
                        *v = b + SIGMA * (*v - b);
                    }
                    clamp(&mut vertex.0);
                    vertex.1 = eval(&vertex.0)?;
                }
            }
        }
    }

    simplex.sort_by(|a, b| a.1.total_cmp(&b.1));
    let (best, f_best) = simplex.swap_remove(0);
    Ok((best, f_best, iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tms_mesh::{CoilMesh, TriangleSurface};
    use tms_model::{Casing, CoilElement, TranslationAxis};

    /// Closed axis-aligned cube surface spanning [-h, h]^3.
    fn cube_tree(h: f64) -> AabbTree {
        let s = [-h, h];
        let mut nodes = Vec::new();
        for &z in &s {
            for &y in &s {
                for &x in &s {
                    nodes.push(Vec3::new(x, y, z));
                }
            }
        }
        let triangles = vec![
            [0, 2, 1], [1, 2, 3], // bottom
            [4, 5, 6], [5, 7, 6], // top
            [0, 1, 4], [1, 5, 4], // front
            [2, 6, 3], [3, 6, 7], // back
            [0, 4, 2], [2, 4, 6], // left
            [1, 3, 5], [3, 7, 5], // right
        ];
        AabbTree::build(&TriangleSurface::new(nodes, triangles))
    }

    fn anchored_coil() -> (Coil, usize) {
        let mut coil = Coil::new();
        let casing = coil.add_casing(Casing::new(
            CoilMesh::new(),
            vec![Vec3::new(0.0, 0.0, 60.0)],
            vec![Vec3::new(0.0, 0.0, 55.0)],
        ));
        let deform = coil.add_deformation(
            Deformation::translation(0.0, (-20.0, 20.0), TranslationAxis::Z).unwrap(),
        );
        coil.add_element(
            CoilElement::dipoles(None, vec![Vec3::zeros()], vec![Vec3::z() * 1e-6])
                .unwrap()
                .with_casing(casing)
                .with_deformations(vec![deform]),
        )
        .unwrap();
        (coil, deform)
    }

    #[test]
    fn test_optimization_never_degrades() {
        let (mut coil, _) = anchored_coil();
        let surface = cube_tree(50.0);
        let result = optimize_deformations(
            &mut coil,
            &surface,
            &Mat4::identity(),
            None,
            &OptimizerConfig::default(),
        )
        .unwrap();
        assert!(result.final_score <= result.initial_score);
    }

    #[test]
    fn test_penalty_stops_at_the_surface() {
        // The fit anchor starts 10 above the cube, the intersect anchor 5
        // above. Pushing past z = -5 puts the intersect anchor inside, so the
        // best admissible score is the fit anchor 5 above the surface.
        let (mut coil, deform) = anchored_coil();
        let surface = cube_tree(50.0);
        let result = optimize_deformations(
            &mut coil,
            &surface,
            &Mat4::identity(),
            None,
            &OptimizerConfig::default(),
        )
        .unwrap();

        assert!(result.final_score < result.initial_score);
        assert_relative_eq!(result.final_score, 5.0, epsilon = 0.5);
        assert!(coil.deformations[deform].current() >= -5.0 - 0.5);

        let (intersecting, distance) =
            placement_scores(&coil, &surface, &Mat4::identity());
        assert!(!intersecting);
        assert!(distance < 10.0);
    }

    #[test]
    fn test_global_translation_folds_into_affine() {
        let mut coil = Coil::new();
        let casing = coil.add_casing(Casing::new(
            CoilMesh::new(),
            vec![Vec3::new(0.0, 0.0, 60.0)],
            vec![],
        ));
        coil.set_coil_casing(casing).unwrap();
        let surface = cube_tree(50.0);

        let result = optimize_deformations(
            &mut coil,
            &surface,
            &Mat4::identity(),
            Some([[-5.0, 5.0], [-5.0, 5.0], [-20.0, 20.0]]),
            &OptimizerConfig::default(),
        )
        .unwrap();

        assert!(result.final_score <= result.initial_score);
        // Moving the anchor down to the surface needs z close to -10.
        assert!(result.affine[(2, 3)] < -5.0);
        assert!(result.final_score < 2.0);
    }

    #[test]
    fn test_no_parameters_is_a_no_op() {
        let mut coil = Coil::new();
        let casing = coil.add_casing(Casing::new(
            CoilMesh::new(),
            vec![Vec3::new(0.0, 0.0, 60.0)],
            vec![],
        ));
        coil.set_coil_casing(casing).unwrap();
        let surface = cube_tree(50.0);

        let result = optimize_deformations(
            &mut coil,
            &surface,
            &Mat4::identity(),
            None,
            &OptimizerConfig::default(),
        )
        .unwrap();
        assert_eq!(result.iterations, 0);
        assert_relative_eq!(result.initial_score, result.final_score);
        assert_relative_eq!(result.initial_score, 10.0, epsilon = 1e-9);
    }
}
