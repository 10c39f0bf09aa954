use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use indicatif::ProgressBar;

use crate::{
    datatypes::{DiagramKind, SectionForces, SectionModel, SectionProperties, StressBundle},
    engine::SectionEngine,
    error::SectionError,
};

/// Nominal torque applied by the reference torsion pass. `wt` is the torque
/// that produces this nominal stress, recovered by inverse scaling.
pub const TORSION_PROBE_MZZ: f64 = 10.0;

/// Everything the analysis pipeline produces for one section.
#[derive(Debug)]
pub struct AnalysisResults {
    pub properties: SectionProperties,
    /// Mesh re-encoded in the interchange format.
    pub mesh: String,
    /// Diagram name -> base64 png.
    pub images: BTreeMap<String, String>,
    /// Result name -> per-material-group stress arrays.
    pub stress_results: BTreeMap<String, Vec<Vec<f64>>>,
}

fn loadcase_key(name: &str) -> String {
    format!("lc_{name}_vm_stress")
}

/// Calibrates the torsional stress-to-torque ratio from the probe's first
/// material group.
fn torsion_resistance(probe: &StressBundle) -> Result<f64, SectionError> {
    let peak = probe
        .torsion_shear
        .first()
        .and_then(|group| group.iter().copied().reduce(f64::max))
        .ok_or_else(|| {
            SectionError::Analysis("Torsion probe returned no stress samples".to_owned())
        })?;

    if !peak.is_finite() || peak <= 0.0 {
        return Err(SectionError::Analysis(format!(
            "Torsion probe peak stress {peak} cannot calibrate wt"
        )));
    }

    Ok(TORSION_PROBE_MZZ / peak)
}

/// Drives the engine through the full stage sequence. Every stage depends on
/// the previous one, so the first failure aborts the run; there is no partial
/// result to salvage once a stage is lost.
pub fn run<E: SectionEngine>(
    engine: &mut E,
    model: &SectionModel,
) -> Result<AnalysisResults, SectionError> {
    let bar = ProgressBar::new(5 + model.loadcases.len() as u64);

    eprintln!(
        "info: generating mesh at target element size {}",
        model.mesh_size
    );
    let mesh = engine.generate_mesh(&model.geometry, model.mesh_size)?;
    eprintln!(
        "info: meshed {} nodes and {} elements",
        mesh.nodes, mesh.elements
    );
    bar.inc(1);

    eprintln!("info: computing geometric properties");
    let geometric = engine.geometric_properties(&mesh)?;
    bar.inc(1);

    eprintln!("info: computing warping properties");
    let warping = engine.warping_properties(&geometric)?;
    bar.inc(1);

    eprintln!("info: computing plastic properties");
    let plastic = engine.plastic_properties(&geometric)?;
    bar.inc(1);

    let mut images: BTreeMap<String, String> = BTreeMap::new();
    let mut stress_results: BTreeMap<String, Vec<Vec<f64>>> = BTreeMap::new();

    images.insert(
        "centroids".to_owned(),
        BASE64.encode(engine.render(DiagramKind::Centroids)?),
    );

    eprintln!("info: running reference torsion pass");
    let probe = engine.stress(&warping, &SectionForces::pure_torsion(TORSION_PROBE_MZZ))?;
    let wt = torsion_resistance(&probe)?;

    images.insert(
        "unittorsion_vxy_stress".to_owned(),
        BASE64.encode(engine.render(DiagramKind::TorsionShear)?),
    );
    stress_results.insert("unittorsion_vxy_stress".to_owned(), probe.torsion_shear);
    bar.inc(1);

    for loadcase in &model.loadcases {
        eprintln!(
            "info: recovering stress for load case '{}'",
            loadcase.name
        );
        let bundle = engine.stress(&warping, &loadcase.forces)?;

        // later cases with the same name overwrite earlier ones
        let key = loadcase_key(&loadcase.name);
        images.insert(
            key.clone(),
            BASE64.encode(engine.render(DiagramKind::VonMises)?),
        );
        stress_results.insert(key, bundle.von_mises);
        bar.inc(1);
    }

    let mesh_encoded = engine.encode_mesh(&mesh)?;
    bar.finish();

    let properties = SectionProperties {
        area: geometric.area,
        avx: geometric.avx,
        avy: geometric.avy,
        xg: geometric.xg,
        yg: geometric.yg,
        rxx: geometric.rxx,
        ryy: geometric.ryy,
        phi: geometric.phi,
        ixx: geometric.ixx,
        iyy: geometric.iyy,
        ipp: warping.j,
        cw: warping.gamma,
        welx_top: geometric.welx_top,
        welx_bottom: geometric.welx_bottom,
        wely_top: geometric.wely_top,
        wely_bottom: geometric.wely_bottom,
        wplx: plastic.wplx,
        wply: plastic.wply,
        wt,
    };

    Ok(AnalysisResults {
        properties,
        mesh: mesh_encoded,
        images,
        stress_results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        datatypes::{
            Facet, GeometricProperties, LoadCase, MeshHandle, PlasticProperties, Point2D,
            SectionGeometry, WarpingProperties,
        },
        engine::CurveCodec,
    };
    use serde_json::Value;

    /// Engine double that records every call and hands back fixed payloads.
    /// Stress fields carry the call ordinal so overwrite behavior is visible.
    struct MockEngine {
        ops: Vec<String>,
        stress_calls: usize,
        fail_at: Option<&'static str>,
    }

    impl MockEngine {
        fn new() -> MockEngine {
            MockEngine {
                ops: Vec::new(),
                stress_calls: 0,
                fail_at: None,
            }
        }

        fn record(&mut self, op: &str) -> Result<(), SectionError> {
            self.ops.push(op.to_owned());
            if self.fail_at == Some(op) {
                return Err(SectionError::Analysis(format!("mock failure at {op}")));
            }
            Ok(())
        }
    }

    impl CurveCodec for MockEngine {
        fn decode_polyline(&mut self, _encoded: &Value) -> Result<Vec<Point2D>, SectionError> {
            unimplemented!("orchestrator never decodes curves")
        }

        fn encode_mesh(&mut self, _mesh: &MeshHandle) -> Result<String, SectionError> {
            self.record("encode_mesh")?;
            Ok("encoded-mesh".to_owned())
        }
    }

    impl SectionEngine for MockEngine {
        fn generate_mesh(
            &mut self,
            _geometry: &SectionGeometry,
            _mesh_size: f64,
        ) -> Result<MeshHandle, SectionError> {
            self.record("mesh")?;
            Ok(MeshHandle {
                nodes: 16,
                elements: 18,
            })
        }

        fn geometric_properties(
            &mut self,
            _mesh: &MeshHandle,
        ) -> Result<GeometricProperties, SectionError> {
            self.record("geometric")?;
            Ok(GeometricProperties {
                area: 100.0,
                avx: 83.0,
                avy: 83.0,
                xg: 5.0,
                yg: 5.0,
                rxx: 2.9,
                ryy: 2.9,
                phi: 0.0,
                ixx: 833.3,
                iyy: 833.3,
                welx_top: 166.7,
                welx_bottom: 166.7,
                wely_top: 166.7,
                wely_bottom: 166.7,
            })
        }

        fn warping_properties(
            &mut self,
            _geometric: &GeometricProperties,
        ) -> Result<WarpingProperties, SectionError> {
            self.record("warping")?;
            Ok(WarpingProperties {
                j: 1405.8,
                gamma: 0.05,
            })
        }

        fn plastic_properties(
            &mut self,
            _geometric: &GeometricProperties,
        ) -> Result<PlasticProperties, SectionError> {
            self.record("plastic")?;
            Ok(PlasticProperties {
                wplx: 250.0,
                wply: 250.0,
            })
        }

        fn stress(
            &mut self,
            _warping: &WarpingProperties,
            _forces: &SectionForces,
        ) -> Result<StressBundle, SectionError> {
            self.record("stress")?;
            self.stress_calls += 1;
            Ok(StressBundle {
                von_mises: vec![vec![self.stress_calls as f64]],
                torsion_shear: vec![vec![2.5, 4.0]],
            })
        }

        fn render(&mut self, kind: DiagramKind) -> Result<Vec<u8>, SectionError> {
            self.record(&format!("render:{kind:?}"))?;
            Ok(format!("png:{kind:?}").into_bytes())
        }
    }

    fn model(loadcases: Vec<LoadCase>) -> SectionModel {
        SectionModel {
            geometry: SectionGeometry {
                points: vec![
                    Point2D { x: 0.0, y: 0.0 },
                    Point2D { x: 10.0, y: 0.0 },
                    Point2D { x: 10.0, y: 10.0 },
                    Point2D { x: 0.0, y: 10.0 },
                ],
                facets: vec![Facet(0, 1), Facet(1, 2), Facet(2, 3), Facet(3, 0)],
                holes: vec![],
                control_points: vec![Point2D { x: 5.0, y: 5.0 }],
            },
            mesh_size: 1.0,
            loadcases,
        }
    }

    fn case(name: &str, n: f64) -> LoadCase {
        LoadCase {
            name: name.to_owned(),
            forces: SectionForces {
                n,
                vx: 0.0,
                vy: 0.0,
                mxx: 0.0,
                myy: 0.0,
                mzz: 0.0,
            },
        }
    }

    #[test]
    fn run_without_loadcases_produces_only_unconditional_outputs() {
        let mut engine = MockEngine::new();
        let results = run(&mut engine, &model(vec![])).unwrap();

        let image_keys: Vec<&str> = results.images.keys().map(String::as_str).collect();
        assert_eq!(image_keys, ["centroids", "unittorsion_vxy_stress"]);

        let stress_keys: Vec<&str> =
            results.stress_results.keys().map(String::as_str).collect();
        assert_eq!(stress_keys, ["unittorsion_vxy_stress"]);

        assert_eq!(
            results.stress_results["unittorsion_vxy_stress"],
            vec![vec![2.5, 4.0]]
        );
        assert_eq!(results.mesh, "encoded-mesh");
    }

    #[test]
    fn probe_calibrates_wt_from_first_group_peak() {
        let mut engine = MockEngine::new();
        let results = run(&mut engine, &model(vec![])).unwrap();

        // nominal 10.0 over the probe's peak stress 4.0
        assert_eq!(results.properties.wt, 2.5);
        assert_eq!(results.properties.area, 100.0);
        assert_eq!(results.properties.ipp, 1405.8);
        assert_eq!(results.properties.wplx, 250.0);
    }

    #[test]
    fn stage_order_is_mesh_properties_probe_then_cases() {
        let mut engine = MockEngine::new();
        run(&mut engine, &model(vec![case("LC1", 100.0)])).unwrap();

        assert_eq!(
            engine.ops,
            [
                "mesh",
                "geometric",
                "warping",
                "plastic",
                "render:Centroids",
                "stress",
                "render:TorsionShear",
                "stress",
                "render:VonMises",
                "encode_mesh",
            ]
        );
    }

    #[test]
    fn loadcase_outputs_use_stable_key_naming() {
        let mut engine = MockEngine::new();
        let results = run(
            &mut engine,
            &model(vec![case("LC1", 100.0), case("LC2", 0.0)]),
        )
        .unwrap();

        assert_eq!(results.stress_results.len(), 3);
        assert_eq!(results.images.len(), 4);
        assert!(results.stress_results.contains_key("lc_LC1_vm_stress"));
        assert!(results.stress_results.contains_key("lc_LC2_vm_stress"));
        assert!(results.images.contains_key("lc_LC1_vm_stress"));
        assert!(results.images.contains_key("lc_LC2_vm_stress"));

        // probe is stress call 1, LC1 call 2, LC2 call 3
        assert_eq!(results.stress_results["lc_LC1_vm_stress"], vec![vec![2.0]]);
        assert_eq!(results.stress_results["lc_LC2_vm_stress"], vec![vec![3.0]]);
    }

    #[test]
    fn duplicate_loadcase_names_apply_last_write_wins() {
        let mut engine = MockEngine::new();
        let results = run(
            &mut engine,
            &model(vec![case("LC1", 100.0), case("LC1", 50.0)]),
        )
        .unwrap();

        assert_eq!(results.stress_results.len(), 2);
        // second LC1 is stress call 3; its field replaced call 2's
        assert_eq!(results.stress_results["lc_LC1_vm_stress"], vec![vec![3.0]]);
    }

    #[test]
    fn images_are_base64_encoded_rasters() {
        let mut engine = MockEngine::new();
        let results = run(&mut engine, &model(vec![])).unwrap();

        assert_eq!(
            results.images["centroids"],
            BASE64.encode("png:Centroids".as_bytes())
        );
    }

    #[test]
    fn stage_failure_aborts_remaining_stages() {
        let mut engine = MockEngine::new();
        engine.fail_at = Some("warping");

        let err = run(&mut engine, &model(vec![case("LC1", 100.0)])).unwrap_err();

        assert!(matches!(err, SectionError::Analysis(_)));
        assert_eq!(engine.ops, ["mesh", "geometric", "warping"]);
    }

    #[test]
    fn probe_with_no_samples_is_an_analysis_error() {
        let empty = StressBundle {
            von_mises: vec![],
            torsion_shear: vec![],
        };

        assert!(matches!(
            torsion_resistance(&empty),
            Err(SectionError::Analysis(_))
        ));

        let zero_peak = StressBundle {
            von_mises: vec![],
            torsion_shear: vec![vec![0.0, 0.0]],
        };

        assert!(matches!(
            torsion_resistance(&zero_peak),
            Err(SectionError::Analysis(_))
        ));
    }
}
