//! WMS capabilities probing and data source strings for desktop GIS clients.

use std::fmt;

use roxmltree::{Document, Node};
use tracing::{debug, warn};
use url::form_urlencoded;

use crate::api::Layer;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::HttpClient;
use crate::links::wms_layer_name;
use crate::storage::{SettingKey, SettingsStore};

const WEB_MERCATOR: [&str; 3] = ["EPSG:3857", "EPSG:3785", "EPSG:900913"];
const WGS84: &str = "EPSG:4326";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Image,
    Table,
    BaseLayer,
    Unknown,
}

impl DataType {
    /// Capabilities abstracts announce the kind of layer behind a name.
    pub fn from_abstract(text: &str) -> Self {
        match text.trim() {
            "Raster layer" => DataType::Image,
            "Vector layer" => DataType::Table,
            "Base layer" => DataType::BaseLayer,
            _ => DataType::Unknown,
        }
    }

    pub fn from_datasource_type(value: Option<&str>) -> Self {
        match value {
            Some("image") => DataType::Image,
            Some("table") => DataType::Table,
            _ => DataType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Image => "image",
            DataType::Table => "table",
            DataType::BaseLayer => "baselayer",
            DataType::Unknown => "unknown",
        }
    }
}

/// Projections the endpoint serves for a layer, preferred first.
pub fn crs_options(data_type: DataType) -> Vec<&'static str> {
    match data_type {
        DataType::Table | DataType::BaseLayer => WEB_MERCATOR.to_vec(),
        DataType::Image | DataType::Unknown => {
            std::iter::once(WGS84).chain(WEB_MERCATOR).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Parses the stored preference labels, `JPEG` or `PNG`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "JPEG" | "JPG" => Some(ImageFormat::Jpeg),
            "PNG" => Some(ImageFormat::Png),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Rasters load faster as JPEG; vectors need PNG for transparent no-data.
pub fn preferred_format(data_type: DataType, store: &dyn SettingsStore) -> ImageFormat {
    let (key, default) = match data_type {
        DataType::Image => (SettingKey::WmsRasterFormat, ImageFormat::Jpeg),
        _ => (SettingKey::WmsVectorFormat, ImageFormat::Png),
    };
    match store.read_text(key) {
        Ok(Some(label)) => ImageFormat::from_label(&label).unwrap_or(default),
        Ok(None) => default,
        Err(err) => {
            warn!(key = key.name(), error = %err, "could not read format preference");
            default
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WmsLayer {
    pub name: String,
    pub title: String,
    pub data_type: DataType,
}

/// Lists the typed layers a map's WMS endpoint advertises.
pub fn probe_capabilities(http: &HttpClient, wms_url: &str) -> ConnectorResult<Vec<WmsLayer>> {
    let mut url = url::Url::parse(wms_url)
        .map_err(|err| ConnectorError::Config(format!("invalid WMS URL: {err}")))?;
    url.query_pairs_mut()
        .append_pair("service", "WMS")
        .append_pair("version", "1.1.1")
        .append_pair("request", "GetCapabilities");

    let response = http.execute(http.get(url))?;
    let layers = parse_capabilities(&response.text())?;
    debug!(count = layers.len(), "parsed WMS capabilities");
    Ok(layers)
}

/// Named layers whose abstract identifies their kind; everything else is
/// dropped.
pub fn parse_capabilities(xml: &str) -> ConnectorResult<Vec<WmsLayer>> {
    let doc = Document::parse(xml)
        .map_err(|err| ConnectorError::protocol("WMS capabilities", err))?;

    let layers = doc
        .descendants()
        .filter(|node| node.tag_name().name() == "Layer")
        .filter_map(|node| {
            let name = child_text(node, "Name")?;
            let data_type = DataType::from_abstract(&child_text(node, "Abstract").unwrap_or_default());
            if data_type == DataType::Unknown {
                return None;
            }
            let title = child_text(node, "Title").unwrap_or_else(|| name.clone());
            Some(WmsLayer {
                name,
                title,
                data_type,
            })
        })
        .collect();
    Ok(layers)
}

/// Layers from the map tree, for when the capabilities probe is skipped.
pub fn layers_from_map(layers: &[Layer]) -> Vec<WmsLayer> {
    layers
        .iter()
        .map(|layer| WmsLayer {
            name: wms_layer_name(&layer.id),
            title: layer.name.clone(),
            data_type: DataType::from_datasource_type(layer.datasource_type.as_deref()),
        })
        .collect()
}

fn child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    node.children()
        .find(|child| child.tag_name().name() == tag)
        .and_then(|child| child.text())
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Data source string understood by QGIS's WMS provider.
#[derive(Debug, Clone, PartialEq)]
pub struct WmsLayerSource {
    pub url: String,
    pub layers: String,
    pub format: ImageFormat,
    pub crs: String,
    pub styles: String,
}

impl WmsLayerSource {
    pub fn new(url: String, layer: &WmsLayer, format: ImageFormat, crs: &str) -> Self {
        Self {
            url,
            layers: layer.name.clone(),
            format,
            crs: crs.to_string(),
            styles: String::new(),
        }
    }
}

impl fmt::Display for WmsLayerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .append_pair("url", &self.url)
            .append_pair("layers", &self.layers)
            .append_pair("format", self.format.mime_type())
            .append_pair("crs", &self.crs)
            .append_pair("styles", &self.styles)
            .finish();
        f.write_str(&encoded)
    }
}
