//! Web links into the hosted admin console, viewer and WMS endpoint.
//!
//! Asset ids look like `{projectId}-{sequence}`; the `-4` suffix selects the
//! published version of a map or layer.

use crate::config::ConnectorConfig;

const PUBLISHED_SUFFIX: &str = "-4";

pub struct LinkBuilder<'a> {
    web_root: &'a str,
}

impl<'a> LinkBuilder<'a> {
    pub fn new(config: &'a ConnectorConfig) -> Self {
        Self::with_root(&config.web_root)
    }

    pub fn with_root(web_root: &'a str) -> Self {
        Self {
            web_root: web_root.trim_end_matches('/'),
        }
    }

    pub fn admin_map_link(&self, map_id: &str) -> String {
        format!(
            "{}/admin/?pli=1#MapCreationPlace:cid={}&v=MAP_CREATION&aid={}",
            self.web_root,
            project_id_of(map_id),
            map_id
        )
    }

    pub fn admin_layer_link(&self, layer_id: &str) -> String {
        format!(
            "{}/admin/?pli=1#LayersPlace:cid={}&v=DETAIL_INFO&aid={}",
            self.web_root,
            project_id_of(layer_id),
            layer_id
        )
    }

    /// Repository page of a freshly uploaded table or raster.
    pub fn admin_asset_link(&self, asset_id: &str) -> String {
        format!(
            "{}/admin/#RepositoryPlace:cid={}&v=DETAIL_INFO&aid={}",
            self.web_root,
            project_id_of(asset_id),
            asset_id
        )
    }

    pub fn map_viewer_link(&self, map_id: &str, access_token: &str) -> String {
        format!(
            "{}/{}{}/mapview/?access_token={}",
            self.web_root,
            map_id,
            PUBLISHED_SUFFIX,
            urlencoding::encode(access_token)
        )
    }

    /// The access token is a path segment here, so the URL is a secret.
    pub fn wms_url(&self, map_id: &str, access_token: &str) -> String {
        format!(
            "{}/{}{}/wms/{}/",
            self.web_root,
            map_id,
            PUBLISHED_SUFFIX,
            urlencoding::encode(access_token)
        )
    }
}

pub fn wms_layer_name(layer_id: &str) -> String {
    format!("{layer_id}{PUBLISHED_SUFFIX}")
}

/// Text before the first `-`, or the whole id when there is none.
pub fn project_id_of(asset_id: &str) -> &str {
    asset_id.split('-').next().unwrap_or(asset_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = "https://mapsengine.google.com";

    #[test]
    fn admin_links_carry_project_and_asset() {
        let links = LinkBuilder::with_root(ROOT);
        assert_eq!(
            links.admin_map_link("0123-4567"),
            "https://mapsengine.google.com/admin/?pli=1#MapCreationPlace:cid=0123&v=MAP_CREATION&aid=0123-4567"
        );
        assert_eq!(
            links.admin_layer_link("0123-89"),
            "https://mapsengine.google.com/admin/?pli=1#LayersPlace:cid=0123&v=DETAIL_INFO&aid=0123-89"
        );
        assert_eq!(
            links.admin_asset_link("0123-55"),
            "https://mapsengine.google.com/admin/#RepositoryPlace:cid=0123&v=DETAIL_INFO&aid=0123-55"
        );
    }

    #[test]
    fn viewer_and_wms_use_published_version() {
        let links = LinkBuilder::with_root("https://mapsengine.google.com/");
        assert_eq!(
            links.map_viewer_link("0123-4567", "ya29.tok"),
            "https://mapsengine.google.com/0123-4567-4/mapview/?access_token=ya29.tok"
        );
        assert_eq!(
            links.wms_url("0123-4567", "ya29.tok"),
            "https://mapsengine.google.com/0123-4567-4/wms/ya29.tok/"
        );
        assert_eq!(wms_layer_name("0123-89"), "0123-89-4");
    }

    #[test]
    fn project_id_is_the_first_segment() {
        assert_eq!(project_id_of("0123-4567-89"), "0123");
        assert_eq!(project_id_of("standalone"), "standalone");
        assert_eq!(project_id_of(""), "");
    }
}
