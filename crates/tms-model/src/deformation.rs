//! Single-parameter coil deformations.

use tms_math::{rotation_about_line, translation, Mat4, Vec3};

use crate::error::{ModelError, Result};

/// Axis selector for translational deformations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationAxis {
    X,
    Y,
    Z,
}

impl TranslationAxis {
    pub fn unit(&self) -> Vec3 {
        match self {
            TranslationAxis::X => Vec3::x(),
            TranslationAxis::Y => Vec3::y(),
            TranslationAxis::Z => Vec3::z(),
        }
    }
}

/// The geometric operation a deformation performs.
#[derive(Debug, Clone, PartialEq)]
pub enum DeformationKind {
    /// Rotation (degrees) about the axis through `point1` and `point2`.
    Rotation2P { point1: Vec3, point2: Vec3 },
    /// Translation (mm) along a coordinate axis.
    Translation { axis: TranslationAxis },
}

/// An invertible rigid motion with one bounded scalar parameter.
///
/// The parameter value is the only mutable state of a constructed coil; the
/// position optimizer adjusts it through [`set_current`](Self::set_current),
/// which enforces the declared range.
#[derive(Debug, Clone, PartialEq)]
pub struct Deformation {
    pub kind: DeformationKind,
    pub initial: f64,
    pub range: (f64, f64),
    current: f64,
}

impl Deformation {
    pub fn new(kind: DeformationKind, initial: f64, range: (f64, f64)) -> Result<Self> {
        if initial < range.0 || initial > range.1 {
            return Err(ModelError::ParameterOutOfRange {
                value: initial,
                min: range.0,
                max: range.1,
            });
        }
        Ok(Self {
            kind,
            initial,
            range,
            current: initial,
        })
    }

    /// Rotation about the line through two anchor points, angle in degrees.
    pub fn rotation_2p(
        initial: f64,
        range: (f64, f64),
        point1: Vec3,
        point2: Vec3,
    ) -> Result<Self> {
        Self::new(DeformationKind::Rotation2P { point1, point2 }, initial, range)
    }

    /// Translation along a coordinate axis, in mm.
    pub fn translation(initial: f64, range: (f64, f64), axis: TranslationAxis) -> Result<Self> {
        Self::new(DeformationKind::Translation { axis }, initial, range)
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    /// Set the parameter value, rejecting values outside the declared range.
    pub fn set_current(&mut self, value: f64) -> Result<()> {
        if value < self.range.0 || value > self.range.1 {
            return Err(ModelError::ParameterOutOfRange {
                value,
                min: self.range.0,
                max: self.range.1,
            });
        }
        self.current = value;
        Ok(())
    }

    /// Restore the construction-time parameter value.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// The homogeneous transform for the current parameter value.
    pub fn as_matrix(&self) -> Mat4 {
        match &self.kind {
            DeformationKind::Rotation2P { point1, point2 } => {
                rotation_about_line(point1, &(point2 - point1), self.current.to_radians())
            }
            DeformationKind::Translation { axis } => translation(&(axis.unit() * self.current)),
        }
    }
}
