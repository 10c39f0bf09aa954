use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A planar point, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

/// One boundary edge between two indices of the shared point array.
/// Serializes as `[a, b]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facet(pub usize, pub usize);

/// A polygon-with-holes section geometry. All loops share one point array;
/// `holes` carries one interior marker per hole loop.
#[derive(Debug, Clone, Serialize)]
pub struct SectionGeometry {
    pub points: Vec<Point2D>,
    pub facets: Vec<Facet>,
    pub holes: Vec<Point2D>,
    pub control_points: Vec<Point2D>,
}

/// Generalized section forces for one stress-recovery pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SectionForces {
    pub n: f64,
    pub vx: f64,
    pub vy: f64,
    pub mxx: f64,
    pub myy: f64,
    pub mzz: f64,
}

impl SectionForces {
    /// A pure torsion load, used by the reference torsion probe.
    pub fn pure_torsion(mzz: f64) -> SectionForces {
        SectionForces {
            n: 0.0,
            vx: 0.0,
            vy: 0.0,
            mxx: 0.0,
            myy: 0.0,
            mzz,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadCase {
    pub name: String,
    pub forces: SectionForces,
}

/// Normalized input: everything the orchestrator needs for one run.
#[derive(Debug)]
pub struct SectionModel {
    pub geometry: SectionGeometry,
    pub mesh_size: f64,
    pub loadcases: Vec<LoadCase>,
}

/// Witness that mesh generation completed. The mesh itself stays on the
/// engine side; the counts are for diagnostics.
#[derive(Debug, Clone, Deserialize)]
pub struct MeshHandle {
    pub nodes: usize,
    pub elements: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeometricProperties {
    pub area: f64,
    pub avx: f64,
    pub avy: f64,
    pub xg: f64,
    pub yg: f64,
    pub rxx: f64,
    pub ryy: f64,
    pub phi: f64,
    pub ixx: f64,
    pub iyy: f64,
    pub welx_top: f64,
    pub welx_bottom: f64,
    pub wely_top: f64,
    pub wely_bottom: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarpingProperties {
    /// St. Venant torsion constant.
    pub j: f64,
    /// Warping constant.
    pub gamma: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlasticProperties {
    pub wplx: f64,
    pub wply: f64,
}

/// Stress fields from one recovery pass, one sub-array per material group.
#[derive(Debug, Clone, Deserialize)]
pub struct StressBundle {
    pub von_mises: Vec<Vec<f64>>,
    pub torsion_shear: Vec<Vec<f64>>,
}

/// Diagram types the engine's plotter can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagramKind {
    Centroids,
    TorsionShear,
    VonMises,
}

/// The `properties` output group. Key spellings match the legacy result
/// document consumed downstream, hence the renames.
#[derive(Debug, Clone, Serialize)]
pub struct SectionProperties {
    pub area: f64,
    #[serde(rename = "Avx")]
    pub avx: f64,
    #[serde(rename = "Avy")]
    pub avy: f64,
    pub xg: f64,
    pub yg: f64,
    pub rxx: f64,
    pub ryy: f64,
    pub phi: f64,
    pub ixx: f64,
    pub iyy: f64,
    pub ipp: f64,
    pub cw: f64,
    #[serde(rename = "welx+")]
    pub welx_top: f64,
    #[serde(rename = "welx-")]
    pub welx_bottom: f64,
    #[serde(rename = "wely+")]
    pub wely_top: f64,
    #[serde(rename = "wely-")]
    pub wely_bottom: f64,
    pub wplx: f64,
    pub wply: f64,
    /// Torque that produces the nominal torsion stress (see the torsion
    /// probe in the analysis pipeline).
    pub wt: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GeometryGroup {
    /// Mesh re-encoded in the curve/mesh interchange format.
    pub mesh: String,
}

/// The single response document: four top-level groups, immutable once
/// assembled.
#[derive(Debug, Serialize)]
pub struct OutputDocument {
    pub properties: SectionProperties,
    pub geometry: GeometryGroup,
    pub images: BTreeMap<String, String>,
    pub stress_results: BTreeMap<String, Vec<Vec<f64>>>,
}
