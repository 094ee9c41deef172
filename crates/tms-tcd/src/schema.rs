//! TCD coil definition schema and loader.
//!
//! TCD is a JSON format with four top-level collections — stimulators,
//! casing models, deformation parameters, and coil elements — where elements
//! reference the other collections by index. Serializing preserves those
//! indices, so objects shared between elements stay shared across a
//! round-trip, and a load followed by a save reproduces the document
//! byte-for-byte.

use serde::{Deserialize, Serialize};

use tms_math::{Mat4, Vec3};
use tms_mesh::CoilMesh;
use tms_model::{
    Casing, Coil, CoilElement, Deformation, DeformationKind, ElementGeometry, GridData,
    Stimulator, TranslationAxis,
};

use crate::error::{Result, TcdError};

/// Element type tag for magnetic dipoles.
pub const TYPE_DIPOLES: u32 = 1;
/// Element type tag for current line segments.
pub const TYPE_LINE_SEGMENTS: u32 = 2;
/// Element type tag for sampled vector grids.
pub const TYPE_SAMPLED_GRID: u32 = 3;

/// Top-level TCD document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcdDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Sampling grid extents (mm), one `[min, max]` pair per axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<[[f64; 2]; 3]>,
    /// Sampling grid spacing (mm per axis).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<[f64; 3]>,
    /// Coil-level casing, index into `coilModelList`.
    #[serde(rename = "coilCasing", default, skip_serializing_if = "Option::is_none")]
    pub coil_casing: Option<usize>,
    #[serde(rename = "stimulatorList", default, skip_serializing_if = "Vec::is_empty")]
    pub stimulator_list: Vec<TcdStimulator>,
    #[serde(rename = "coilModelList", default, skip_serializing_if = "Vec::is_empty")]
    pub coil_model_list: Vec<TcdCoilModel>,
    #[serde(rename = "deformList", default, skip_serializing_if = "Vec::is_empty")]
    pub deform_list: Vec<TcdDeformation>,
    #[serde(rename = "coilElementList")]
    pub coil_element_list: Vec<TcdElement>,
}

/// Stimulator entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcdStimulator {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(rename = "maxdIdt", default, skip_serializing_if = "Option::is_none")]
    pub max_di_dt: Option<f64>,
    #[serde(rename = "dIdt", default = "default_di_dt")]
    pub di_dt: f64,
}

fn default_di_dt() -> f64 {
    1.0
}

/// Casing model entry: a triangle surface plus optimization anchor points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcdCoilModel {
    pub points: Vec<[f64; 3]>,
    pub faces: Vec<[usize; 3]>,
    #[serde(
        rename = "minDistancePoints",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub min_distance_points: Vec<[f64; 3]>,
    #[serde(
        rename = "intersectPoints",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub intersect_points: Vec<[f64; 3]>,
}

/// Deformation entry. `type` is `"x"`, `"y"` or `"z"` for axis translations
/// and `"rot2p"` for a rotation about the line through `point1` and `point2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcdDeformation {
    #[serde(rename = "type")]
    pub kind: String,
    pub initial: f64,
    #[serde(rename = "deformRange")]
    pub deform_range: [f64; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point1: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub point2: Option<[f64; 3]>,
}

/// Coil element entry. Geometry fields depend on `type`: dipole and line
/// segment elements carry `points`/`values`, sampled grids carry
/// `data`/`shape`/`affine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TcdElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stimulator: Option<usize>,
    #[serde(rename = "elementCasing", default, skip_serializing_if = "Option::is_none")]
    pub element_casing: Option<usize>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deformations: Vec<usize>,
    #[serde(rename = "type")]
    pub element_type: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f64; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<[f64; 3]>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<[usize; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affine: Option<[[f64; 4]; 4]>,
}

fn vec3(v: &[f64; 3]) -> Vec3 {
    Vec3::new(v[0], v[1], v[2])
}

fn arr3(v: &Vec3) -> [f64; 3] {
    [v.x, v.y, v.z]
}

fn vec3s(rows: &[[f64; 3]]) -> Vec<Vec3> {
    rows.iter().map(vec3).collect()
}

fn arr3s(points: &[Vec3]) -> Vec<[f64; 3]> {
    points.iter().map(arr3).collect()
}

fn mat4(rows: &[[f64; 4]; 4]) -> Mat4 {
    Mat4::from_fn(|i, j| rows[i][j])
}

fn rows4(m: &Mat4) -> [[f64; 4]; 4] {
    let mut rows = [[0.0; 4]; 4];
    for i in 0..4 {
        for j in 0..4 {
            rows[i][j] = m[(i, j)];
        }
    }
    rows
}

/// Convert a coil into its TCD document. Deformations are written with
/// their `initial` value; the transient `current` value is not persisted.
pub fn to_tcd(coil: &Coil) -> TcdDocument {
    TcdDocument {
        name: coil.name.clone(),
        brand: coil.brand.clone(),
        limits: coil.limits,
        resolution: coil.resolution.as_ref().map(arr3),
        coil_casing: coil.casing,
        stimulator_list: coil
            .stimulators
            .iter()
            .map(|s| TcdStimulator {
                name: s.name.clone(),
                brand: s.brand.clone(),
                max_di_dt: s.max_di_dt,
                di_dt: s.di_dt,
            })
            .collect(),
        coil_model_list: coil
            .casings
            .iter()
            .map(|c| TcdCoilModel {
                points: arr3s(&c.mesh.nodes),
                faces: c.mesh.triangles.clone(),
                min_distance_points: arr3s(&c.min_distance_points),
                intersect_points: arr3s(&c.intersect_points),
            })
            .collect(),
        deform_list: coil
            .deformations
            .iter()
            .map(|d| match &d.kind {
                DeformationKind::Translation { axis } => TcdDeformation {
                    kind: match axis {
                        TranslationAxis::X => "x",
                        TranslationAxis::Y => "y",
                        TranslationAxis::Z => "z",
                    }
                    .to_string(),
                    initial: d.initial,
                    deform_range: [d.range.0, d.range.1],
                    point1: None,
                    point2: None,
                },
                DeformationKind::Rotation2P { point1, point2 } => TcdDeformation {
                    kind: "rot2p".to_string(),
                    initial: d.initial,
                    deform_range: [d.range.0, d.range.1],
                    point1: Some(arr3(point1)),
                    point2: Some(arr3(point2)),
                },
            })
            .collect(),
        coil_element_list: coil.elements.iter().map(element_to_tcd).collect(),
    }
}

fn element_to_tcd(element: &CoilElement) -> TcdElement {
    let mut entry = TcdElement {
        name: element.name.clone(),
        stimulator: element.stimulator,
        element_casing: element.casing,
        deformations: element.deformations.clone(),
        element_type: 0,
        points: None,
        values: None,
        data: None,
        shape: None,
        affine: None,
    };
    match &element.geometry {
        ElementGeometry::Dipoles { points, values } => {
            entry.element_type = TYPE_DIPOLES;
            entry.points = Some(arr3s(points));
            entry.values = Some(arr3s(values));
        }
        ElementGeometry::LineSegments { points, values } => {
            entry.element_type = TYPE_LINE_SEGMENTS;
            entry.points = Some(arr3s(points));
            entry.values = Some(arr3s(values));
        }
        ElementGeometry::SampledGrid { data, affine } => {
            entry.element_type = TYPE_SAMPLED_GRID;
            entry.data = Some(data.flat().to_vec());
            entry.shape = Some(data.shape());
            entry.affine = Some(rows4(affine));
        }
    }
    entry
}

/// Build a coil from a TCD document, validating every cross-reference.
pub fn from_tcd(doc: &TcdDocument) -> Result<Coil> {
    let mut coil = Coil::new();
    coil.name = doc.name.clone();
    coil.brand = doc.brand.clone();
    coil.limits = doc.limits;
    coil.resolution = doc.resolution.as_ref().map(vec3);

    for s in &doc.stimulator_list {
        coil.add_stimulator(Stimulator {
            name: s.name.clone(),
            brand: s.brand.clone(),
            max_di_dt: s.max_di_dt,
            di_dt: s.di_dt,
        });
    }
    for model in &doc.coil_model_list {
        let mesh = CoilMesh::from_triangles(vec3s(&model.points), model.faces.clone(), 0);
        coil.add_casing(Casing::new(
            mesh,
            vec3s(&model.min_distance_points),
            vec3s(&model.intersect_points),
        ));
    }
    for d in &doc.deform_list {
        let range = (d.deform_range[0], d.deform_range[1]);
        let deformation = match d.kind.as_str() {
            "x" => Deformation::translation(d.initial, range, TranslationAxis::X)?,
            "y" => Deformation::translation(d.initial, range, TranslationAxis::Y)?,
            "z" => Deformation::translation(d.initial, range, TranslationAxis::Z)?,
            "rot2p" => {
                let p1 = d
                    .point1
                    .ok_or_else(|| TcdError::MissingField("point1".to_string()))?;
                let p2 = d
                    .point2
                    .ok_or_else(|| TcdError::MissingField("point2".to_string()))?;
                Deformation::rotation_2p(d.initial, range, vec3(&p1), vec3(&p2))?
            }
            other => return Err(TcdError::UnknownDeformationType(other.to_string())),
        };
        coil.add_deformation(deformation);
    }
    for entry in &doc.coil_element_list {
        let mut element = element_from_tcd(entry)?;
        element.stimulator = entry.stimulator;
        element.casing = entry.element_casing;
        element.deformations = entry.deformations.clone();
        coil.add_element(element)?;
    }
    if let Some(c) = doc.coil_casing {
        coil.set_coil_casing(c)?;
    }
    Ok(coil)
}

fn element_from_tcd(entry: &TcdElement) -> Result<CoilElement> {
    let points = |field: &Option<Vec<[f64; 3]>>, name: &str| -> Result<Vec<Vec3>> {
        field
            .as_ref()
            .map(|rows| vec3s(rows))
            .ok_or_else(|| TcdError::MissingField(name.to_string()))
    };
    match entry.element_type {
        TYPE_DIPOLES => Ok(CoilElement::dipoles(
            entry.name.clone(),
            points(&entry.points, "points")?,
            points(&entry.values, "values")?,
        )?),
        TYPE_LINE_SEGMENTS => Ok(CoilElement::line_segments(
            entry.name.clone(),
            points(&entry.points, "points")?,
            entry.values.as_ref().map(|rows| vec3s(rows)),
        )?),
        TYPE_SAMPLED_GRID => {
            let data = entry
                .data
                .as_ref()
                .ok_or_else(|| TcdError::MissingField("data".to_string()))?;
            let shape = entry
                .shape
                .ok_or_else(|| TcdError::MissingField("shape".to_string()))?;
            let affine = entry
                .affine
                .ok_or_else(|| TcdError::MissingField("affine".to_string()))?;
            let grid = GridData::new(shape, data.clone())?;
            Ok(CoilElement::sampled_grid(
                entry.name.clone(),
                grid,
                mat4(&affine),
            ))
        }
        other => Err(TcdError::UnknownElementType(other)),
    }
}

/// Serialize a coil to a TCD JSON string.
pub fn export_tcd(coil: &Coil) -> Result<String> {
    Ok(serde_json::to_string_pretty(&to_tcd(coil))?)
}

/// Parse a coil from a TCD JSON string.
pub fn parse_tcd(json: &str) -> Result<Coil> {
    let doc: TcdDocument = serde_json::from_str(json)?;
    from_tcd(&doc)
}

/// Load a coil from a .tcd file.
pub fn load_tcd(path: &str) -> Result<Coil> {
    let json = std::fs::read_to_string(path)?;
    parse_tcd(&json)
}

/// Save a coil to a .tcd file.
pub fn save_tcd(path: &str, coil: &Coil) -> Result<()> {
    std::fs::write(path, export_tcd(coil)?)?;
    Ok(())
}

/// Load a coil definition, dispatching on the file extension (`.tcd` or the
/// legacy `.ccd`). With an unrecognized extension, TCD is attempted first,
/// then CCD.
pub fn load_coil(path: &str) -> Result<Coil> {
    if path.ends_with(".tcd") {
        load_tcd(path)
    } else if path.ends_with(".ccd") {
        let text = std::fs::read_to_string(path)?;
        crate::ccd::parse_ccd(&text)
    } else {
        let text = std::fs::read_to_string(path)?;
        parse_tcd(&text).or_else(|_| crate::ccd::parse_ccd(&text))
    }
}
