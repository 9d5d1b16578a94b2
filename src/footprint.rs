//! Extent footprints of a map and its layers as a GeoJSON FeatureCollection.

use serde_json::{json, Value};
use tracing::debug;

use crate::api::models::BoundingBox;
use crate::api::{Layer, Map};

/// One feature for the map, then one per layer in the order given.
/// Assets without a bounding box keep a `null` geometry.
pub fn footprints(project_id: &str, map: &Map, layers: &[Layer]) -> Value {
    let mut features = Vec::with_capacity(layers.len() + 1);
    features.push(feature(
        map.bbox.as_ref(),
        json!({
            "Project Identifier": project_id,
            "Map Resource Identifier": map.id,
            "Resource Identifier": map.id,
            "Parent Resource Identifier": project_id,
            "Resource Type": "map",
            "Resource Name": map.name,
            "Data Source Type": "n/a",
        }),
    ));

    for layer in layers {
        if layer.bbox.is_none() {
            debug!(layer_id = %layer.id, "layer has no extent");
        }
        features.push(feature(
            layer.bbox.as_ref(),
            json!({
                "Project Identifier": project_id,
                "Map Resource Identifier": map.id,
                "Resource Identifier": layer.id,
                "Parent Resource Identifier": map.id,
                "Resource Type": "layer",
                "Resource Name": layer.name,
                "Data Source Type": layer.datasource_type.as_deref().unwrap_or("unknown"),
            }),
        ));
    }

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

fn feature(bbox: Option<&BoundingBox>, properties: Value) -> Value {
    let geometry = match bbox {
        Some(bbox) => json!({
            "type": "Polygon",
            "coordinates": [bbox.ring()],
        }),
        None => Value::Null,
    };
    json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_comes_first_and_missing_extents_are_null() {
        let map = Map {
            id: "0123-9".into(),
            name: "Parcels".into(),
            project_id: None,
            description: None,
            bbox: Some(BoundingBox([0.0, 1.0, 2.0, 3.0])),
            contents: Vec::new(),
        };
        let layers = vec![Layer {
            id: "0123-1".into(),
            name: "Roads".into(),
            project_id: None,
            bbox: None,
            datasource_type: None,
        }];

        let collection = footprints("0123", &map, &layers);
        let features = collection["features"].as_array().unwrap();

        assert_eq!(collection["type"], "FeatureCollection");
        assert_eq!(features.len(), 2);
        assert_eq!(
            features[0]["geometry"]["coordinates"],
            json!([[[0.0, 1.0], [2.0, 1.0], [2.0, 3.0], [0.0, 3.0], [0.0, 1.0]]])
        );
        assert_eq!(features[0]["properties"]["Resource Type"], "map");
        assert_eq!(features[0]["properties"]["Parent Resource Identifier"], "0123");
        assert!(features[1]["geometry"].is_null());
        assert_eq!(features[1]["properties"]["Parent Resource Identifier"], "0123-9");
        assert_eq!(features[1]["properties"]["Data Source Type"], "unknown");
    }
}
