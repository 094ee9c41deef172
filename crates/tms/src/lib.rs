//! tms — Magnetic stimulation coil modeling.
//!
//! This is the umbrella crate that re-exports the core types from the
//! sub-crates: the coil model and field evaluator, the mesh and collision
//! surface utilities, the TCD/CCD file formats, and the placement optimizer.

pub use tms_math::{self, Mat3, Mat4, Vec3};
pub use tms_mesh::{self, AabbTree, CoilMesh, NodeField, TriangleSurface};
pub use tms_model::{
    self, Casing, Coil, CoilElement, Deformation, DeformationKind, ElementGeometry, GridData,
    ModelError, Stimulator, TranslationAxis,
};
pub use tms_optim::{self, optimize_deformations, OptimizationResult, OptimizerConfig};
pub use tms_tcd::{self, export_tcd, load_coil, load_tcd, parse_ccd, parse_tcd, save_tcd, TcdError};
