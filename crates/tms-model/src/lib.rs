//! Core model of a TMS stimulation coil.
//!
//! A [`Coil`] holds shared-object tables (stimulators, casings, deformation
//! parameters) and an ordered list of [`CoilElement`]s that reference them by
//! index. Elements come in three geometries — magnetic dipoles, current line
//! segments, and pre-sampled vector grids — and all expose the same field
//! interface: the vector potential `A` and its rate of change `dA/dt` at
//! arbitrary world positions under a coil placement affine and the current
//! deformation state.
//!
//! Field evaluation switches between direct pairwise summation and a
//! tree-code approximation depending on source count; see [`nbody`].

pub mod casing;
pub mod coil;
pub mod deformation;
pub mod element;
pub mod error;
pub mod grid;
pub mod nbody;
pub mod stimulator;
pub mod tags;

pub use casing::Casing;
pub use coil::Coil;
pub use deformation::{Deformation, DeformationKind, TranslationAxis};
pub use element::{CoilElement, ElementGeometry, FIELD_SCALE, MM_TO_M};
pub use error::{ModelError, Result};
pub use grid::GridData;
pub use nbody::DIRECT_EVAL_LIMIT;
pub use stimulator::Stimulator;
