use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};

use gmeconn::api::{filter_maps, AssetKind, LocalFile, UploadRequest};
use gmeconn::auth::{LoopbackPrompt, ManualPrompt};
use gmeconn::footprint::footprints;
use gmeconn::links::project_id_of;
use gmeconn::storage::{FileSettingsStore, SettingKey, SettingValue, SettingsStore};
use gmeconn::wms::{self, ImageFormat, WmsLayerSource};
use gmeconn::{ConnectorConfig, HttpClient, Session};

/// Everything a command needs, built fresh for each invocation.
struct App {
    config: ConnectorConfig,
    http: HttpClient,
    store: FileSettingsStore,
}

impl App {
    fn load() -> Result<Self> {
        let config = ConnectorConfig::from_env();
        let http = HttpClient::new(&config)?;
        let store = FileSettingsStore::new().context("Could not open settings")?;
        Ok(Self {
            config,
            http,
            store,
        })
    }

    fn session(&self) -> Session<'_> {
        Session::new(&self.config, &self.http, &self.store)
    }
}

// -- Session ------------------------------------------------------------------

pub fn cmd_signin(manual: bool, no_browser: bool) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();

    let signed_in = if manual {
        let stdin = io::stdin();
        let mut prompt = ManualPrompt::new(stdin.lock());
        session.sign_in(&mut prompt)?
    } else {
        let mut prompt = LoopbackPrompt {
            port: ctx.config.loopback_port,
            timeout: Duration::from_secs(ctx.config.loopback_timeout_secs),
            open_browser: !no_browser,
        };
        session.sign_in(&mut prompt)?
    };

    if signed_in.reused_token {
        eprintln!("Already signed in.");
    } else if signed_in.user_name.is_empty() {
        eprintln!("Signed in.");
    } else {
        eprintln!("Signed in as {}.", signed_in.user_name);
    }
    eprintln!("{} project(s) available.", signed_in.projects.len());
    Ok(())
}

pub fn cmd_signout() -> Result<()> {
    let ctx = App::load()?;
    ctx.session().sign_out()?;
    eprintln!("Signed out.");
    Ok(())
}

pub fn cmd_status() -> Result<()> {
    let ctx = App::load()?;
    let store = &ctx.store;

    let has_client = store.read_text(SettingKey::ClientId)?.is_some()
        && store.read_text(SettingKey::ClientSecret)?.is_some();
    println!(
        "client credentials: {}",
        if has_client { "set" } else { "missing (gmeconn settings set-client)" }
    );

    match store.read_text(SettingKey::AccessToken)? {
        None => println!("session: signed out"),
        Some(_) => {
            let expiry = store
                .read_text(SettingKey::ExpiresAt)?
                .and_then(|raw| DateTime::parse_from_rfc3339(&raw).ok())
                .map(|dt| dt.with_timezone(&Utc));
            let refreshable = store.read_text(SettingKey::RefreshToken)?.is_some();
            match expiry {
                Some(at) if at > Utc::now() => println!("session: signed in (token valid until {at})"),
                Some(_) if refreshable => println!("session: signed in (token expired, will refresh)"),
                _ => println!("session: token expired, sign in again"),
            }
        }
    }

    let projects = store.read_projects()?;
    let default = store.read_text(SettingKey::DefaultProject)?;
    let last_used = store.read_text(SettingKey::LastUsedProject)?;
    println!("projects: {} cached", projects.len());
    print_projects(&projects, default.as_deref());
    if let Some(last) = last_used {
        println!("last used project: {last}");
    }
    println!("settings: {}", ctx.store.config_path().display());
    Ok(())
}

pub fn cmd_projects() -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;

    let projects: BTreeMap<String, String> = session
        .repository()
        .get_projects(&token)?
        .into_iter()
        .map(|p| (p.id, p.name))
        .collect();
    ctx.store.write_projects(projects.clone())?;

    if projects.is_empty() {
        eprintln!("No accessible projects.");
        return Ok(());
    }
    let default = ctx.store.read_text(SettingKey::DefaultProject)?;
    print_projects(&projects, default.as_deref());
    Ok(())
}

fn print_projects(projects: &BTreeMap<String, String>, default: Option<&str>) {
    for (id, name) in projects {
        let marker = if Some(id.as_str()) == default { " *" } else { "" };
        println!("  {}{} ({})", id, marker, name);
    }
}

// -- Browsing -----------------------------------------------------------------

pub fn cmd_maps(project: Option<&str>, search: Option<&str>) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    let project_id = session.resolve_project(project)?;
    session.remember_project(&project_id)?;

    let listing = session.repository().get_maps_by_project_id(&project_id, &token);
    for map in filter_maps(&listing.maps, search.unwrap_or_default()) {
        println!("{}\t{}", map.id, map.name);
    }

    if listing.truncated {
        eprintln!(
            "Listing stopped after {} pages; results are incomplete.",
            listing.pages_fetched
        );
    }
    if let Some(failure) = listing.failure {
        bail!(
            "page {} of the map listing failed after {} map(s): {}",
            failure.page + 1,
            listing.maps.len(),
            failure.error
        );
    }
    Ok(())
}

pub fn cmd_layers(map_id: &str) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    let repo = session.repository();

    let map = repo
        .get_map_by_id(map_id, &token)
        .with_context(|| format!("Could not fetch map {map_id}"))?;
    for layer in repo.resolve_layers_for_map(&map, &token)? {
        println!(
            "{}\t{}\t{}",
            layer.id,
            layer.name,
            layer.datasource_type.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

pub fn cmd_wms(map_id: &str, probe: bool) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    let wms_url = session.links().wms_url(map_id, &token.access_token);

    let layers = if probe {
        wms::probe_capabilities(&ctx.http, &wms_url)
            .with_context(|| format!("Could not read WMS capabilities for {map_id}"))?
    } else {
        let repo = session.repository();
        let map = repo.get_map_by_id(map_id, &token)?;
        wms::layers_from_map(&repo.resolve_layers_for_map(&map, &token)?)
    };

    if layers.is_empty() {
        eprintln!("No WMS layers for map {map_id}.");
        return Ok(());
    }

    for layer in &layers {
        let crs = wms::crs_options(layer.data_type);
        let format = wms::preferred_format(layer.data_type, &ctx.store);
        let source = WmsLayerSource::new(
            wms_url.clone(),
            layer,
            format,
            crs.first().copied().unwrap_or("EPSG:3857"),
        );
        println!(
            "{}\t{}\t{}\t{}\t{}",
            layer.name,
            layer.title,
            layer.data_type.as_str(),
            format.label(),
            crs.join(",")
        );
        println!("  {}", source);
    }
    Ok(())
}

// -- Links --------------------------------------------------------------------

pub fn cmd_link_admin(map_id: &str) -> Result<()> {
    let ctx = App::load()?;
    println!("{}", ctx.session().links().admin_map_link(map_id));
    Ok(())
}

pub fn cmd_link_layer(layer_id: &str) -> Result<()> {
    let ctx = App::load()?;
    println!("{}", ctx.session().links().admin_layer_link(layer_id));
    Ok(())
}

pub fn cmd_link_viewer(map_id: &str) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    println!("{}", session.links().map_viewer_link(map_id, &token.access_token));
    Ok(())
}

pub fn cmd_link_wms(map_id: &str) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    eprintln!("This URL contains your access token; share it only with trusted users.");
    println!("{}", session.links().wms_url(map_id, &token.access_token));
    Ok(())
}

pub fn cmd_footprints(map_id: &str, output: Option<&Path>) -> Result<()> {
    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    let repo = session.repository();

    let map = repo.get_map_by_id(map_id, &token)?;
    let layers = repo.resolve_layers_for_map(&map, &token)?;
    let collection = footprints(project_id_of(&map.id), &map, &layers);
    let json = serde_json::to_string_pretty(&collection)?;

    match output {
        Some(path) => {
            fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))?;
            eprintln!("Wrote {} feature(s) to {}.", layers.len() + 1, path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

// -- Upload -------------------------------------------------------------------

pub struct UploadArgs {
    pub kind: String,
    pub name: String,
    pub description: String,
    pub tags: Option<String>,
    pub acl: Option<String>,
    pub attribution: Option<String>,
    pub project: Option<String>,
    pub files: Vec<PathBuf>,
}

pub fn cmd_upload(args: UploadArgs) -> Result<()> {
    let kind: AssetKind = args.kind.parse()?;
    let files = args
        .files
        .iter()
        .map(|path| {
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .with_context(|| format!("Not a file path: {}", path.display()))?;
            Ok(LocalFile {
                filename,
                path: path.clone(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let ctx = App::load()?;
    let session = ctx.session();
    let token = session.require_token()?;
    let project_id = session.resolve_project(args.project.as_deref())?;
    session.remember_project(&project_id)?;

    let request = UploadRequest::new(
        project_id,
        args.name,
        args.description,
        files.iter().map(|f| f.filename.clone()),
    )
    .with_access_list(args.acl)
    .with_tags(args.tags.as_deref())
    .with_attribution(args.attribution);

    eprintln!("Uploading {} file(s) as new {}...", files.len(), kind);
    let report = session.repository().upload_asset(kind, request, &files, &token)?;

    for outcome in &report.files {
        match &outcome.error {
            None => eprintln!("  {} ok", outcome.filename),
            Some(err) => eprintln!("  {} failed: {}", outcome.filename, err),
        }
    }
    println!("{}", session.links().admin_asset_link(&report.asset_id));

    let failed = report.failed().count();
    if failed > 0 {
        bail!(
            "{} of {} file(s) failed to upload to asset {}",
            failed,
            report.files.len(),
            report.asset_id
        );
    }
    Ok(())
}

// -- Settings -----------------------------------------------------------------

pub fn cmd_settings_show() -> Result<()> {
    let store = FileSettingsStore::new()?;
    for key in SettingKey::ALL {
        let shown = match store.read(key)? {
            None => "(unset)".to_string(),
            Some(SettingValue::Map(map)) => format!("{} entries", map.len()),
            Some(SettingValue::Text(text)) if key.is_secret() => mask(&text),
            Some(SettingValue::Text(text)) => text,
        };
        println!("{} = {}", key.qualified(), shown);
    }
    Ok(())
}

pub fn cmd_settings_set_client(client_id: &str, client_secret: &str) -> Result<()> {
    let client_id = client_id.trim();
    let client_secret = client_secret.trim();
    if client_id.is_empty() || client_secret.is_empty() {
        bail!("Client id and secret must not be empty");
    }

    let ctx = App::load()?;
    let previous = ctx.store.read_text(SettingKey::ClientId)?;
    ctx.store.write_text(SettingKey::ClientId, client_id)?;
    ctx.store.write_text(SettingKey::ClientSecret, client_secret)?;

    // Tokens minted for another client are useless now.
    if previous.as_deref() != Some(client_id) {
        ctx.session().sign_out()?;
        eprintln!("Client changed; run `gmeconn signin` again.");
    } else {
        eprintln!("Client credentials saved.");
    }
    Ok(())
}

pub fn cmd_settings_default_project(project_id: &str) -> Result<()> {
    let store = FileSettingsStore::new()?;
    let projects = store.read_projects()?;
    if !projects.is_empty() && !projects.contains_key(project_id) {
        bail!("Project '{}' is not one of your cached projects", project_id);
    }
    store.write_text(SettingKey::DefaultProject, project_id)?;
    eprintln!("Default project set to '{}'.", project_id);
    Ok(())
}

pub fn cmd_settings_format(raster: Option<&str>, vector: Option<&str>) -> Result<()> {
    if raster.is_none() && vector.is_none() {
        bail!("Pass --raster and/or --vector");
    }
    let store = FileSettingsStore::new()?;
    for (key, label) in [
        (SettingKey::WmsRasterFormat, raster),
        (SettingKey::WmsVectorFormat, vector),
    ] {
        if let Some(label) = label {
            let format = ImageFormat::from_label(label)
                .with_context(|| format!("Unknown image format '{}' (use JPEG or PNG)", label))?;
            store.write_text(key, format.label())?;
            eprintln!("{} set to {}.", key.name(), format.label());
        }
    }
    Ok(())
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    if value.chars().count() <= 8 {
        "****".to_string()
    } else {
        format!("{visible}****")
    }
}
