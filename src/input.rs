use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    datatypes::{LoadCase, Point2D, SectionForces, SectionModel},
    engine::CurveCodec,
    error::SectionError,
    geometry::GeometryBuilder,
};

/// Target element size, in cm, when the request does not specify one.
pub const DEFAULT_MESH_SIZE: f64 = 2.0;

/// The request document schema. Curves stay opaque (`Value`) until the
/// external codec decodes them; everything else is typed here so malformed
/// records fail at this boundary instead of deep inside a stage.
#[derive(Debug, Deserialize)]
pub struct RequestDocument {
    perimeter: Option<Value>,
    holes: Option<Vec<Value>>,
    hole_points: Option<Vec<PointRecord>>,
    control_points: Option<Vec<PointRecord>>,
    loadcases: Option<Vec<LoadCaseRecord>>,
    mesh_size: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PointRecord {
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
}

impl PointRecord {
    fn to_point(&self) -> Point2D {
        Point2D {
            x: self.x,
            y: self.y,
        }
    }
}

#[derive(Debug, Deserialize)]
struct LoadCaseRecord {
    /// Case name; the legacy documents carry strings or bare numbers here.
    #[serde(rename = "LC")]
    name: Value,
    #[serde(rename = "N")]
    n: f64,
    #[serde(rename = "Vx")]
    vx: f64,
    #[serde(rename = "Vy")]
    vy: f64,
    #[serde(rename = "Mxx")]
    mxx: f64,
    #[serde(rename = "Myy")]
    myy: f64,
    #[serde(rename = "Mzz")]
    mzz: f64,
}

fn case_name(raw: &Value) -> String {
    match raw {
        Value::String(name) => name.clone(),
        other => other.to_string(),
    }
}

/// Loads the request document from the first line of the input file.
pub fn load_request(input_file: &Path) -> Result<RequestDocument, SectionError> {
    let contents = match std::fs::read_to_string(input_file) {
        Ok(contents) => contents,
        Err(err) => {
            return Err(SectionError::Input(format!(
                "Unable to open input file {}: {}",
                input_file.display(),
                err
            )));
        }
    };

    let line = contents
        .lines()
        .next()
        .filter(|line| !line.trim().is_empty())
        .ok_or_else(|| SectionError::Input("Input file is empty".to_owned()))?;

    parse_request(line)
}

pub fn parse_request(line: &str) -> Result<RequestDocument, SectionError> {
    serde_json::from_str(line)
        .map_err(|err| SectionError::Input(format!("Error in request document: {err}")))
}

/// Normalizes a request into a consistent section model: decodes the
/// perimeter and hole curves through the codec, accumulates all loops in one
/// globally-indexed geometry, and collects control points and load cases.
pub fn normalize<C: CurveCodec>(
    request: &RequestDocument,
    codec: &mut C,
) -> Result<SectionModel, SectionError> {
    let perimeter = request
        .perimeter
        .as_ref()
        .ok_or_else(|| SectionError::Input("Request is missing perimeter field".to_owned()))?;

    let control_points = request.control_points.as_ref().ok_or_else(|| {
        SectionError::Input("Request is missing control_points field".to_owned())
    })?;

    let mesh_size = request.mesh_size.unwrap_or(DEFAULT_MESH_SIZE);
    if !(mesh_size > 0.0) {
        return Err(SectionError::Input(format!(
            "mesh_size must be positive, got {mesh_size}"
        )));
    }

    let perimeter_points = codec.decode_polyline(perimeter)?;
    let mut builder = GeometryBuilder::from_perimeter(&perimeter_points)?;

    // Holes only count when both the curves and their interior markers are
    // present; a one-sided request drops them, as the legacy behavior did.
    match (&request.holes, &request.hole_points) {
        (Some(holes), Some(hole_points)) => {
            if holes.len() != hole_points.len() {
                return Err(SectionError::Input(format!(
                    "Request has {} holes but {} hole_points",
                    holes.len(),
                    hole_points.len()
                )));
            }

            for (hole, marker) in holes.iter().zip(hole_points) {
                let hole_points = codec.decode_polyline(hole)?;
                builder.add_hole(&hole_points, marker.to_point())?;
            }
        }
        (Some(_), None) | (None, Some(_)) => {
            eprintln!("warning: request has only one of holes/hole_points; ignoring holes");
        }
        (None, None) => {}
    }

    for point in control_points {
        builder.add_control_point(point.to_point());
    }

    let mut loadcases: Vec<LoadCase> = Vec::new();
    if let Some(records) = &request.loadcases {
        for record in records {
            let name = case_name(&record.name);

            if loadcases.iter().any(|lc| lc.name == name) {
                eprintln!(
                    "warning: duplicate load case name '{name}'; later case overwrites earlier results"
                );
            }

            loadcases.push(LoadCase {
                name,
                forces: SectionForces {
                    n: record.n,
                    vx: record.vx,
                    vy: record.vy,
                    mxx: record.mxx,
                    myy: record.myy,
                    mzz: record.mzz,
                },
            });
        }
    }

    let geometry = builder.build()?;

    eprintln!(
        "info: normalized geometry with {} points, {} facets, {} holes, {} load cases",
        geometry.points.len(),
        geometry.facets.len(),
        geometry.holes.len(),
        loadcases.len()
    );

    Ok(SectionModel {
        geometry,
        mesh_size,
        loadcases,
    })
}
