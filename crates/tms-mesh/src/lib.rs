//! Mesh and spatial-query types for TMS coil modeling.
//!
//! `CoilMesh` is the visualization/export mesh: point, line and triangle
//! primitives over a shared node list, each primitive carrying an integer
//! region tag, plus named per-node vector fields. `TriangleSurface` and
//! `AabbTree` provide the collision-query side: nearest-surface-distance and
//! point-containment queries against a closed triangulated surface.

pub mod mesh;
pub mod surface;

pub use mesh::{CoilMesh, NodeField};
pub use surface::{Aabb, AabbTree, TriangleSurface};
