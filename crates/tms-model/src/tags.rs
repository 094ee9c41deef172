//! Region tags for generated meshes.
//!
//! Each element owns a block of `TAG_BLOCK` tags starting at
//! `element_index * TAG_BLOCK`; within a block the role constants identify
//! what a primitive represents. Blocks never overlap across elements, so
//! downstream tools can select sub-meshes by integer range. The coil-level
//! casing uses the block after the last element.

/// Size of the per-element tag block.
pub const TAG_BLOCK: i32 = 100;

/// Casing surface triangles.
pub const CASING: i32 = 1;
/// Minimum-distance (fit) anchor points.
pub const MIN_DISTANCE_POINTS: i32 = 2;
/// Intersection (no-penetration) anchor points.
pub const INTERSECT_POINTS: i32 = 3;
/// Dipole markers.
pub const DIPOLES: i32 = 4;
/// Line segment primitives.
pub const LINE_ELEMENTS: i32 = 5;
/// Sampled grid cell markers.
pub const SAMPLED_GRID_ELEMENTS: i32 = 6;

/// First tag of the block owned by `element_index`.
#[inline]
pub fn element_base_tag(element_index: usize) -> i32 {
    element_index as i32 * TAG_BLOCK
}
