use crate::{
    analysis::AnalysisResults,
    datatypes::{GeometryGroup, OutputDocument},
    error::SectionError,
};

/// Merges the pipeline's outputs into the four-group response document.
/// Pure aggregation; every stage output is already present by construction
/// of `AnalysisResults`.
pub fn assemble(results: AnalysisResults) -> OutputDocument {
    OutputDocument {
        properties: results.properties,
        geometry: GeometryGroup { mesh: results.mesh },
        images: results.images,
        stress_results: results.stress_results,
    }
}

pub fn to_json(document: &OutputDocument) -> Result<String, SectionError> {
    Ok(serde_json::to_string(document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::SectionProperties;
    use std::collections::BTreeMap;

    fn results() -> AnalysisResults {
        let mut images = BTreeMap::new();
        images.insert("centroids".to_owned(), "aW1n".to_owned());
        images.insert("unittorsion_vxy_stress".to_owned(), "aW1n".to_owned());

        let mut stress_results = BTreeMap::new();
        stress_results.insert(
            "unittorsion_vxy_stress".to_owned(),
            vec![vec![1.0, 2.0], vec![3.0]],
        );

        AnalysisResults {
            properties: SectionProperties {
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
                ipp: 1405.8,
                cw: 0.05,
                welx_top: 166.7,
                welx_bottom: 166.7,
                wely_top: 166.7,
                wely_bottom: 166.7,
                wplx: 250.0,
                wply: 250.0,
                wt: 2.5,
            },
            mesh: "encoded-mesh".to_owned(),
            images,
            stress_results,
        }
    }

    #[test]
    fn document_has_exactly_four_groups() {
        let document = assemble(results());
        let value: serde_json::Value =
            serde_json::from_str(&to_json(&document).unwrap()).unwrap();

        let groups = value.as_object().unwrap();
        assert_eq!(groups.len(), 4);
        for key in ["properties", "geometry", "images", "stress_results"] {
            assert!(groups.contains_key(key), "missing group {key}");
        }
    }

    #[test]
    fn properties_keep_legacy_key_spellings() {
        let document = assemble(results());
        let value: serde_json::Value =
            serde_json::from_str(&to_json(&document).unwrap()).unwrap();

        assert_eq!(value["properties"]["area"], 100.0);
        assert_eq!(value["properties"]["Avx"], 83.0);
        assert_eq!(value["properties"]["welx+"], 166.7);
        assert_eq!(value["properties"]["wely-"], 166.7);
        assert_eq!(value["properties"]["wt"], 2.5);
    }

    #[test]
    fn mesh_and_stress_fields_round_trip() {
        let document = assemble(results());
        let value: serde_json::Value =
            serde_json::from_str(&to_json(&document).unwrap()).unwrap();

        assert_eq!(value["geometry"]["mesh"], "encoded-mesh");
        assert_eq!(
            value["stress_results"]["unittorsion_vxy_stress"],
            serde_json::json!([[1.0, 2.0], [3.0]])
        );
        assert_eq!(value["images"]["centroids"], "aW1n");
    }
}
