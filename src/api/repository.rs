use std::fs;
use std::path::PathBuf;

use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use url::Url;

use super::models::*;
use crate::auth::Token;
use crate::config::ConnectorConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http::HttpClient;

/// A dataset file on disk and the name it is uploaded under.
#[derive(Debug, Clone)]
pub struct LocalFile {
    pub filename: String,
    pub path: PathBuf,
}

/// Reads and mutates remote assets. Every call carries a bearer token.
pub struct AssetRepository<'a> {
    config: &'a ConnectorConfig,
    http: &'a HttpClient,
}

impl<'a> AssetRepository<'a> {
    pub fn new(config: &'a ConnectorConfig, http: &'a HttpClient) -> Self {
        Self { config, http }
    }

    pub fn get_projects(&self, token: &Token) -> ConnectorResult<Vec<Project>> {
        let url = self.api_url(&self.config.api_base, &["projects"])?;
        let list: ProjectList = self.get_json(url, token)?;
        debug!(count = list.projects.len(), "fetched projects");
        Ok(list.projects)
    }

    /// Follows `nextPageToken` until a page omits it. A failed page ends the
    /// walk but keeps what earlier pages returned.
    pub fn get_maps_by_project_id(&self, project_id: &str, token: &Token) -> MapListing {
        let mut listing = MapListing::default();
        let mut page_token: Option<String> = None;

        loop {
            if listing.pages_fetched >= self.config.max_pages {
                warn!(project_id, pages = listing.pages_fetched, "page limit reached, listing truncated");
                listing.truncated = true;
                break;
            }

            let page = self.fetch_map_page(project_id, page_token.as_deref(), token);
            match page {
                Ok(page) => {
                    listing.pages_fetched += 1;
                    listing.maps.extend(page.maps);
                    match page.next_page_token.filter(|t| !t.is_empty()) {
                        Some(next) => page_token = Some(next),
                        None => break,
                    }
                }
                Err(error) => {
                    warn!(project_id, page = listing.pages_fetched, error = %error, "map page failed");
                    listing.failure = Some(PageFailure {
                        page: listing.pages_fetched,
                        error,
                    });
                    break;
                }
            }
        }

        listing
    }

    fn fetch_map_page(
        &self,
        project_id: &str,
        page_token: Option<&str>,
        token: &Token,
    ) -> ConnectorResult<MapPage> {
        let mut url = self.api_url(&self.config.api_base, &["maps"])?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("projectId", project_id);
            if let Some(page_token) = page_token {
                query.append_pair("pageToken", page_token);
            }
        }
        self.get_json(url, token)
    }

    pub fn get_map_by_id(&self, map_id: &str, token: &Token) -> ConnectorResult<Map> {
        let url = self.api_url(&self.config.api_base, &["maps", map_id])?;
        self.get_json(url, token)
    }

    pub fn get_layer_by_id(&self, layer_id: &str, token: &Token) -> ConnectorResult<Layer> {
        let url = self.api_url(&self.config.api_base, &["layers", layer_id])?;
        self.get_json(url, token)
    }

    /// Every layer under the map in document order, with full details where
    /// the per-layer fetch succeeds and the bare tree entry where it doesn't.
    pub fn resolve_layers_for_map(&self, map: &Map, token: &Token) -> ConnectorResult<Vec<Layer>> {
        let refs = flatten_layer_refs(
            &map.contents,
            self.config.max_folder_depth,
            self.config.max_tree_nodes,
        )?;

        let layers = refs
            .into_iter()
            .map(|item| match self.get_layer_by_id(&item.id, token) {
                Ok(layer) => layer,
                Err(err) => {
                    warn!(layer_id = %item.id, error = %err, "using layer summary from map tree");
                    Layer::from_item(item)
                }
            })
            .collect();
        Ok(layers)
    }

    pub fn post_create_asset(
        &self,
        kind: AssetKind,
        request: &UploadRequest,
        token: &Token,
    ) -> ConnectorResult<String> {
        let url = self.api_url(&self.config.api_base, &[kind.as_str(), "upload"])?;
        let response = self.http.execute(
            self.http
                .post(url)
                .bearer_auth(&token.access_token)
                .json(request),
        )?;
        let created: AssetCreated = response.json()?;
        created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ConnectorError::protocol("asset creation", "response has no id"))
    }

    pub fn post_upload_file(
        &self,
        asset_id: &str,
        kind: AssetKind,
        filename: &str,
        content: Vec<u8>,
        token: &Token,
    ) -> ConnectorResult<()> {
        let mut url = self.api_url(&self.config.upload_base, &[kind.as_str(), asset_id, "files"])?;
        url.query_pairs_mut().append_pair("filename", filename);

        let length = content.len();
        self.http.execute(
            self.http
                .post(url)
                .bearer_auth(&token.access_token)
                .header(CONTENT_TYPE, "application/octet-stream")
                .header(CONTENT_LENGTH, length)
                .body(content),
        )?;
        debug!(asset_id, filename, bytes = length, "uploaded file");
        Ok(())
    }

    /// Creates the asset, then uploads each file on its own. A failed file
    /// does not stop the others and nothing is rolled back.
    pub fn upload_asset(
        &self,
        kind: AssetKind,
        request: UploadRequest,
        files: &[LocalFile],
        token: &Token,
    ) -> ConnectorResult<UploadReport> {
        let request = request.for_kind(kind);
        let asset_id = self.post_create_asset(kind, &request, token)?;
        info!(%asset_id, files = files.len(), "asset created");

        let outcomes = files
            .iter()
            .map(|file| {
                let result = fs::read(&file.path)
                    .map_err(ConnectorError::from)
                    .and_then(|content| {
                        self.post_upload_file(&asset_id, kind, &file.filename, content, token)
                    });
                if let Err(err) = &result {
                    warn!(%asset_id, filename = %file.filename, error = %err, "file upload failed");
                }
                FileOutcome {
                    filename: file.filename.clone(),
                    error: result.err(),
                }
            })
            .collect();

        Ok(UploadReport {
            asset_id,
            files: outcomes,
        })
    }

    fn api_url(&self, base: &str, segments: &[&str]) -> ConnectorResult<Url> {
        let mut url = Url::parse(base)
            .map_err(|err| ConnectorError::Config(format!("invalid API base URL {base}: {err}")))?;
        url.path_segments_mut()
            .map_err(|_| ConnectorError::Config(format!("invalid API base URL {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, token: &Token) -> ConnectorResult<T> {
        self.http
            .execute(self.http.get(url).bearer_auth(&token.access_token))?
            .json()
    }
}

/// Layer references under `contents`, depth first, in document order.
pub fn flatten_layer_refs(
    contents: &[Item],
    max_depth: usize,
    max_nodes: usize,
) -> ConnectorResult<Vec<&ItemRef>> {
    let mut layers = Vec::new();
    let mut stack = vec![(contents.iter(), 0usize)];
    let mut visited = 0usize;

    while let Some((items, depth)) = stack.last_mut() {
        let depth = *depth;
        let item = match items.next() {
            Some(item) => item,
            None => {
                stack.pop();
                continue;
            }
        };

        visited += 1;
        if visited > max_nodes {
            return Err(ConnectorError::Limit(format!(
                "map tree has more than {max_nodes} items"
            )));
        }

        match item {
            Item::Layer(layer) => layers.push(layer),
            Item::Folder(folder) => {
                if depth + 1 > max_depth {
                    return Err(ConnectorError::Limit(format!(
                        "folder '{}' is nested deeper than {max_depth} levels",
                        folder.name
                    )));
                }
                stack.push((folder.contents.iter(), depth + 1));
            }
            Item::Other => {}
        }
    }

    Ok(layers)
}
