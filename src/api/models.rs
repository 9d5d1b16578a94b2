//! Wire records for the asset API.
//!
//! Every record tolerates unknown fields and treats missing fields as
//! absent, since the server schema is versioned independently of us.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConnectorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectList {
    #[serde(default)]
    pub projects: Vec<Project>,
}

/// `[lower-left lon, lower-left lat, upper-right lon, upper-right lat]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox(pub [f64; 4]);

impl BoundingBox {
    pub fn from_slice(values: &[f64]) -> Option<Self> {
        match values {
            [lllon, lllat, urlon, urlat] => Some(Self([*lllon, *lllat, *urlon, *urlat])),
            _ => None,
        }
    }

    /// Closed ring, counter-clockwise from the lower-left corner.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        let [lllon, lllat, urlon, urlat] = self.0;
        [
            [lllon, lllat],
            [urlon, lllat],
            [urlon, urlat],
            [lllon, urlat],
            [lllon, lllat],
        ]
    }
}

fn lenient_bbox<'de, D>(deserializer: D) -> Result<Option<BoundingBox>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .and_then(|value| serde_json::from_value::<Vec<f64>>(value).ok())
        .as_deref()
        .and_then(BoundingBox::from_slice))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Map {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub contents: Vec<Item>,
}

/// One entry of a map's content tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Item {
    Layer(ItemRef),
    Folder(Folder),
    /// Unknown, missing or malformed `type`.
    Other,
}

impl<'de> Deserialize<'de> for Item {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        let kind = value.get("type").and_then(serde_json::Value::as_str);
        let item = match kind {
            Some("layer") => serde_json::from_value(value).map(Item::Layer).ok(),
            Some("folder") => serde_json::from_value(value).map(Item::Folder).ok(),
            _ => None,
        };
        Ok(item.unwrap_or(Item::Other))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub contents: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub project_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_bbox")]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub datasource_type: Option<String>,
}

impl Layer {
    /// Skeleton built from a tree reference when the full fetch fails.
    pub fn from_item(item: &ItemRef) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            project_id: None,
            bbox: None,
            datasource_type: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPage {
    #[serde(default)]
    pub maps: Vec<Map>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AssetCreated {
    #[serde(default)]
    pub id: Option<String>,
}

/// Maps fetched for a project, with an explicit record of what went wrong.
#[derive(Debug, Default)]
pub struct MapListing {
    pub maps: Vec<Map>,
    pub pages_fetched: usize,
    pub failure: Option<PageFailure>,
    pub truncated: bool,
}

impl MapListing {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && !self.truncated
    }
}

#[derive(Debug)]
pub struct PageFailure {
    /// Zero-based index of the page that failed.
    pub page: usize,
    pub error: ConnectorError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Tables,
    Rasters,
}

impl AssetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Tables => "tables",
            AssetKind::Rasters => "rasters",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetKind {
    type Err = ConnectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tables" => Ok(AssetKind::Tables),
            "rasters" => Ok(AssetKind::Rasters),
            other => Err(ConnectorError::Config(format!("unsupported data type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFile {
    pub filename: String,
}

/// Asset metadata sent when creating a new table or raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub files: Vec<UploadFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_access_list: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

impl UploadRequest {
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        filenames: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            description: description.into(),
            files: filenames
                .into_iter()
                .map(|filename| UploadFile { filename })
                .collect(),
            draft_access_list: None,
            tags: None,
            attribution: None,
        }
    }

    pub fn with_access_list(mut self, acl: Option<String>) -> Self {
        self.draft_access_list = acl.filter(|s| !s.trim().is_empty());
        self
    }

    /// Comma separated, as typed by the user.
    pub fn with_tags(mut self, tags: Option<&str>) -> Self {
        self.tags = tags
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|t| !t.is_empty());
        self
    }

    pub fn with_attribution(mut self, attribution: Option<String>) -> Self {
        self.attribution = attribution;
        self
    }

    /// Attribution only applies to rasters.
    pub fn for_kind(mut self, kind: AssetKind) -> Self {
        if kind == AssetKind::Tables {
            self.attribution = None;
        }
        self
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub filename: String,
    pub error: Option<ConnectorError>,
}

impl FileOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-file result of a multi-file upload. Nothing is rolled back.
#[derive(Debug)]
pub struct UploadReport {
    pub asset_id: String,
    pub files: Vec<FileOutcome>,
}

impl UploadReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| f.succeeded())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.files.iter().filter(|f| !f.succeeded())
    }

    pub fn is_complete(&self) -> bool {
        self.files.iter().all(FileOutcome::succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn map_tree_decodes_with_unknown_fields_and_types() {
        let raw = json!({
            "id": "0123-456",
            "name": "Parcels",
            "bbox": [-122.5, 37.5, -122.0, 38.0],
            "versions": ["published"],
            "contents": [
                {"type": "layer", "id": "0123-1", "name": "Roads", "visibility": "defaultOn"},
                {"type": "folder", "name": "Group", "contents": [
                    {"type": "layer", "id": "0123-2", "name": "Rivers"}
                ]},
                {"type": "mystery", "id": "x"}
            ]
        });
        let map: Map = serde_json::from_value(raw).unwrap();
        assert_eq!(map.bbox, Some(BoundingBox([-122.5, 37.5, -122.0, 38.0])));
        assert_eq!(map.contents.len(), 3);
        assert!(matches!(&map.contents[1], Item::Folder(f) if f.contents.len() == 1));
        assert_eq!(map.contents[2], Item::Other);
    }

    #[test]
    fn items_without_a_type_are_skipped_not_fatal() {
        let raw = json!({
            "id": "1-2",
            "contents": [
                {"id": "x", "name": "n"},
                {"type": 7, "id": "y"},
                {"type": "folder", "name": "g", "contents": [
                    {"name": "untyped"},
                    {"type": "layer", "id": "1-3", "name": "kept"}
                ]}
            ]
        });
        let map: Map = serde_json::from_value(raw).unwrap();
        assert_eq!(map.contents[0], Item::Other);
        assert_eq!(map.contents[1], Item::Other);
        match &map.contents[2] {
            Item::Folder(folder) => {
                assert_eq!(folder.contents[0], Item::Other);
                assert!(matches!(&folder.contents[1], Item::Layer(l) if l.id == "1-3"));
            }
            other => panic!("expected folder, got {other:?}"),
        }
    }

    #[test]
    fn malformed_bbox_reads_as_absent() {
        let layer: Layer =
            serde_json::from_value(json!({"id": "1-2", "bbox": [1.0, 2.0]})).unwrap();
        assert!(layer.bbox.is_none());
        assert!(layer.datasource_type.is_none());
        assert_eq!(layer.name, "");
    }

    #[test]
    fn upload_request_omits_unset_fields() {
        let request = UploadRequest::new("0123", "Roads", "", vec!["roads.shp".to_string()])
            .with_tags(Some("a, b,,"))
            .with_access_list(Some("  ".into()))
            .with_attribution(Some("Me".into()))
            .for_kind(AssetKind::Tables);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "projectId": "0123",
                "name": "Roads",
                "description": "",
                "files": [{"filename": "roads.shp"}],
                "tags": ["a", "b"]
            })
        );
    }

    #[test]
    fn asset_kind_rejects_unknown_strings() {
        assert_eq!("rasters".parse::<AssetKind>().unwrap(), AssetKind::Rasters);
        assert!(matches!("maps".parse::<AssetKind>(), Err(ConnectorError::Config(_))));
    }
}
