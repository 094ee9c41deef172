//! Legacy CCD dipole file reader.
//!
//! A CCD file is a text format: comment lines starting with `#`, the first
//! of which carries `name;key=value;...` metadata, then a line with the
//! dipole count, then one row of six floats per dipole (position in meters,
//! dipole moment in A·m²). Positions are converted to millimeters on load.

use tms_math::Vec3;
use tms_model::{Coil, CoilElement, Stimulator};

use crate::error::{Result, TcdError};

/// Parse a CCD file into a single-element dipole coil.
pub fn parse_ccd(text: &str) -> Result<Coil> {
    let mut coil = Coil::new();
    let mut stimulator = Stimulator::default();
    let mut lines = text.lines().enumerate();

    // Header: the first comment line carries the metadata.
    let (header_no, header) = lines
        .next()
        .ok_or_else(|| TcdError::InvalidFormat("empty CCD file".to_string()))?;
    let header = header.trim();
    if !header.starts_with('#') {
        return Err(TcdError::MalformedCcd {
            line: header_no + 1,
            reason: "expected '#' metadata header".to_string(),
        });
    }
    let mut fields = header.trim_start_matches('#').trim().split(';');
    coil.name = fields.next().map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    for field in fields {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = field.split_once('=').ok_or_else(|| TcdError::MalformedCcd {
            line: header_no + 1,
            reason: format!("metadata field without '=': {field}"),
        })?;
        let value = value.trim();
        match key.trim() {
            "brand" => coil.brand = Some(value.to_string()),
            "stimulator" => stimulator.name = Some(value.to_string()),
            "dIdtmax" => {
                // May be a comma list; the first entry is the rated maximum.
                let first = value.split(',').next().unwrap_or(value);
                stimulator.max_di_dt = Some(parse_float(first, header_no)?);
            }
            "resolution" => {
                let vals = parse_float_list(value, header_no)?;
                coil.resolution = Some(match vals.as_slice() {
                    [r] => Vec3::new(*r, *r, *r),
                    [x, y, z] => Vec3::new(*x, *y, *z),
                    _ => {
                        return Err(TcdError::MalformedCcd {
                            line: header_no + 1,
                            reason: format!("resolution needs 1 or 3 values, got {}", vals.len()),
                        })
                    }
                });
            }
            "limits" => {
                let vals = parse_float_list(value, header_no)?;
                if vals.len() != 6 {
                    return Err(TcdError::MalformedCcd {
                        line: header_no + 1,
                        reason: format!("limits needs 6 values, got {}", vals.len()),
                    });
                }
                coil.limits = Some([
                    [vals[0], vals[1]],
                    [vals[2], vals[3]],
                    [vals[4], vals[5]],
                ]);
            }
            // Unknown keys are tolerated for forward compatibility.
            _ => {}
        }
    }

    // Count line, skipping any further comments.
    let (count_no, count_line) = lines
        .by_ref()
        .find(|(_, l)| !l.trim().is_empty() && !l.trim_start().starts_with('#'))
        .ok_or_else(|| TcdError::InvalidFormat("CCD file has no dipole count".to_string()))?;
    let count: usize = count_line
        .trim()
        .split_whitespace()
        .next()
        .unwrap_or("")
        .parse()
        .map_err(|_| TcdError::MalformedCcd {
            line: count_no + 1,
            reason: format!("invalid dipole count: {}", count_line.trim()),
        })?;

    let mut points = Vec::with_capacity(count);
    let mut values = Vec::with_capacity(count);
    for (no, line) in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let row: Vec<f64> = line
            .split_whitespace()
            .map(|t| parse_float(t, no))
            .collect::<Result<_>>()?;
        if row.len() != 6 {
            return Err(TcdError::MalformedCcd {
                line: no + 1,
                reason: format!("expected 6 values per dipole row, got {}", row.len()),
            });
        }
        // CCD positions are in meters; the model works in millimeters.
        points.push(Vec3::new(row[0], row[1], row[2]) * 1e3);
        values.push(Vec3::new(row[3], row[4], row[5]));
    }
    if points.len() != count {
        return Err(TcdError::InvalidFormat(format!(
            "CCD header declares {count} dipoles, found {}",
            points.len()
        )));
    }

    let stim = coil.add_stimulator(stimulator);
    let element = CoilElement::dipoles(coil.name.clone(), points, values)?.with_stimulator(stim);
    coil.add_element(element)?;
    Ok(coil)
}

fn parse_float(token: &str, line_index: usize) -> Result<f64> {
    token.trim().parse().map_err(|_| TcdError::MalformedCcd {
        line: line_index + 1,
        reason: format!("invalid number: {token}"),
    })
}

fn parse_float_list(value: &str, line_index: usize) -> Result<Vec<f64>> {
    value
        .split(',')
        .map(|t| parse_float(t, line_index))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tms_model::ElementGeometry;

    const SAMPLE: &str = "\
# figure8;brand=Acme;stimulator=X100;dIdtmax=162.00,138.00;resolution=3;limits=-100,100,-100,100,-100,100
# comment row
2
1e-3 0 0  0 0 1e-6
-1e-3 0 0  0 0 -1e-6
";

    #[test]
    fn test_parse_ccd_metadata_and_scaling() {
        let coil = parse_ccd(SAMPLE).unwrap();
        assert_eq!(coil.name.as_deref(), Some("figure8"));
        assert_eq!(coil.brand.as_deref(), Some("Acme"));
        assert_relative_eq!(coil.resolution.unwrap(), Vec3::new(3.0, 3.0, 3.0));
        assert_eq!(coil.limits.unwrap()[2], [-100.0, 100.0]);
        assert_relative_eq!(coil.stimulators[0].max_di_dt.unwrap(), 162.0);
        assert_eq!(coil.stimulators[0].name.as_deref(), Some("X100"));

        match &coil.elements[0].geometry {
            ElementGeometry::Dipoles { points, values } => {
                assert_relative_eq!(points[0], Vec3::new(1.0, 0.0, 0.0));
                assert_relative_eq!(values[1], Vec3::new(0.0, 0.0, -1e-6));
            }
            other => panic!("expected dipoles, got {other:?}"),
        }
    }

    #[test]
    fn test_count_mismatch_is_an_error() {
        let text = "# c\n3\n0 0 0 0 0 1\n";
        assert!(matches!(parse_ccd(text), Err(TcdError::InvalidFormat(_))));
    }

    #[test]
    fn test_bad_row_is_an_error() {
        let text = "# c\n1\n0 0 0 0 1\n";
        assert!(matches!(
            parse_ccd(text),
            Err(TcdError::MalformedCcd { line: 3, .. })
        ));
    }
}
