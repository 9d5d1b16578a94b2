use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(name = "gmeconn", about = "Browse, link and upload Google Maps Engine assets")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in through the browser (or paste a code with --manual)
    Signin {
        /// Out-of-band flow: paste the result page title or code
        #[arg(long)]
        manual: bool,
        /// Print the consent URL instead of launching a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Revoke the token and forget the session
    Signout,

    /// Show sign-in state and cached projects
    Status,

    /// List accessible projects
    Projects,

    /// List maps in a project
    Maps {
        /// Project id (defaults to the configured or last used project)
        #[arg(short, long)]
        project: Option<String>,
        /// Exact id or part of the name, case-insensitive
        #[arg(short, long)]
        search: Option<String>,
    },

    /// List every layer of a map, folders flattened
    Layers {
        map_id: String,
    },

    /// Show WMS layer sources for a map
    Wms {
        map_id: String,
        /// Ask the WMS endpoint for its capabilities instead of walking the map
        #[arg(long)]
        probe: bool,
    },

    /// Print a web link for an asset
    Link {
        #[command(subcommand)]
        target: LinkTarget,
    },

    /// Write the extents of a map and its layers as GeoJSON
    Footprints {
        map_id: String,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Create a table or raster asset and upload its files
    Upload {
        /// tables or rasters
        #[arg(long)]
        kind: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma separated
        #[arg(long)]
        tags: Option<String>,
        /// Draft access list name
        #[arg(long)]
        acl: Option<String>,
        /// Rasters only
        #[arg(long)]
        attribution: Option<String>,
        #[arg(short, long)]
        project: Option<String>,
        #[arg(long = "file", required = true)]
        files: Vec<PathBuf>,
    },

    /// Inspect or change stored settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum LinkTarget {
    /// Admin console page for a map
    Admin { map_id: String },
    /// Public viewer for a map (embeds the access token)
    Viewer { map_id: String },
    /// WMS endpoint for a map (embeds the access token)
    Wms { map_id: String },
    /// Admin console page for a layer
    Layer { layer_id: String },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Print every stored setting, secrets masked
    Show,
    /// Store the OAuth2 client id and secret
    SetClient {
        #[arg(long)]
        id: String,
        #[arg(long)]
        secret: String,
    },
    /// Set the project used when --project is omitted
    DefaultProject { project_id: String },
    /// Set WMS image formats (JPEG or PNG)
    Format {
        #[arg(long)]
        raster: Option<String>,
        #[arg(long)]
        vector: Option<String>,
    },
}

fn main() {
    gmeconn::init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Signin { manual, no_browser } => cli::commands::cmd_signin(manual, no_browser),
        Commands::Signout => cli::commands::cmd_signout(),
        Commands::Status => cli::commands::cmd_status(),
        Commands::Projects => cli::commands::cmd_projects(),
        Commands::Maps { project, search } => {
            cli::commands::cmd_maps(project.as_deref(), search.as_deref())
        }
        Commands::Layers { map_id } => cli::commands::cmd_layers(&map_id),
        Commands::Wms { map_id, probe } => cli::commands::cmd_wms(&map_id, probe),
        Commands::Link { target } => match target {
            LinkTarget::Admin { map_id } => cli::commands::cmd_link_admin(&map_id),
            LinkTarget::Viewer { map_id } => cli::commands::cmd_link_viewer(&map_id),
            LinkTarget::Wms { map_id } => cli::commands::cmd_link_wms(&map_id),
            LinkTarget::Layer { layer_id } => cli::commands::cmd_link_layer(&layer_id),
        },
        Commands::Footprints { map_id, output } => {
            cli::commands::cmd_footprints(&map_id, output.as_deref())
        }
        Commands::Upload {
            kind,
            name,
            description,
            tags,
            acl,
            attribution,
            project,
            files,
        } => cli::commands::cmd_upload(cli::commands::UploadArgs {
            kind,
            name,
            description,
            tags,
            acl,
            attribution,
            project,
            files,
        }),
        Commands::Settings { action } => match action {
            SettingsAction::Show => cli::commands::cmd_settings_show(),
            SettingsAction::SetClient { id, secret } => {
                cli::commands::cmd_settings_set_client(&id, &secret)
            }
            SettingsAction::DefaultProject { project_id } => {
                cli::commands::cmd_settings_default_project(&project_id)
            }
            SettingsAction::Format { raster, vector } => {
                cli::commands::cmd_settings_format(raster.as_deref(), vector.as_deref())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
