//! Coil definition file formats: the JSON-based TCD format and the legacy
//! CCD dipole text format.

pub mod ccd;
pub mod error;
pub mod schema;

pub use ccd::parse_ccd;
pub use error::{Result, TcdError};
pub use schema::{
    export_tcd, from_tcd, load_coil, load_tcd, parse_tcd, save_tcd, to_tcd, TcdCoilModel,
    TcdDeformation, TcdDocument, TcdElement, TcdStimulator, TYPE_DIPOLES, TYPE_LINE_SEGMENTS,
    TYPE_SAMPLED_GRID,
};
