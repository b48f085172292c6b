// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use clap::{Parser, Subcommand, ValueEnum};
use mf_cli::commands::{self, SchemaKind};
use mf_cli::format::{Formatter, OutputFormat};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "mediaforge", version, about = "Offline media-production pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plan and execute a movie from a blueprint and inputs document.
    Run {
        /// Movie identifier, used to namespace storage under the movie root.
        #[arg(long)]
        movie_id: String,

        /// Path to the blueprint YAML document.
        #[arg(long)]
        blueprint: PathBuf,

        /// Path to the inputs YAML document.
        #[arg(long)]
        inputs: PathBuf,

        /// Root directory movies are stored under. Overrides the settings
        /// file's `general.movie_root` when given.
        #[arg(long)]
        movie_root: Option<PathBuf>,

        /// Path to a settings file (JSON). Defaults to `mediaforge.json` in
        /// the current directory.
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Output format for the run report.
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },

    /// Parse and expand a blueprint document, reporting any structural
    /// error found.
    Validate {
        /// Path to the blueprint YAML document.
        #[arg()]
        file: PathBuf,
    },

    /// Print a JSON schema to stdout.
    Schema {
        /// Which schema to print.
        #[arg(value_enum)]
        kind: SchemaArg,
    },

    /// Inspect a manifest file.
    Inspect {
        /// Path to the manifest JSON file.
        #[arg()]
        file: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = FormatArg::Text)]
        format: FormatArg,
    },

    /// Diff two manifest files.
    Diff {
        /// Path to the first manifest JSON file.
        #[arg()]
        first: PathBuf,
        /// Path to the second manifest JSON file.
        #[arg()]
        second: PathBuf,
    },

    /// Load and validate a settings file.
    Config {
        /// Path to a settings file (JSON). Defaults to `mediaforge.json` in
        /// the current directory.
        #[arg(long)]
        settings: Option<PathBuf>,
    },
}

/// Schema kind argument for the `schema` subcommand.
#[derive(Debug, Clone, ValueEnum)]
enum SchemaArg {
    /// Expanded blueprint tree schema.
    Blueprint,
    /// Manifest schema.
    Manifest,
    /// Settings schema.
    Settings,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FormatArg {
    Json,
    JsonPretty,
    Text,
    Table,
    Compact,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::JsonPretty => OutputFormat::JsonPretty,
            FormatArg::Text => OutputFormat::Text,
            FormatArg::Table => OutputFormat::Table,
            FormatArg::Compact => OutputFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("mediaforge=debug,mf_runtime=debug")
    } else {
        EnvFilter::new("mediaforge=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Run {
            movie_id,
            blueprint,
            inputs,
            movie_root,
            settings,
            format,
        } => cmd_run(movie_id, blueprint, inputs, movie_root, settings, format.into()).await,
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Schema { kind } => cmd_schema(kind),
        Commands::Inspect { file, format } => cmd_inspect(&file, format.into()),
        Commands::Diff { first, second } => cmd_diff(&first, &second),
        Commands::Config { settings } => cmd_config(settings),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn default_settings_path() -> PathBuf {
    PathBuf::from("mediaforge.json")
}

async fn cmd_run(
    movie_id: String,
    blueprint: PathBuf,
    inputs: PathBuf,
    movie_root_override: Option<PathBuf>,
    settings_path: Option<PathBuf>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let settings_path = settings_path.unwrap_or_else(default_settings_path);
    let movie_root = match movie_root_override {
        Some(root) => root,
        None if settings_path.is_file() => {
            let settings = mf_cli::config::load_settings(&settings_path)?;
            PathBuf::from(settings.general.movie_root)
        }
        None => PathBuf::from("."),
    };

    let report = commands::run_movie(&movie_root, &movie_id, &blueprint, &inputs).await?;

    let formatter = Formatter::new(format);
    println!("{}", formatter.format_run_report(&report));

    if !report.all_succeeded() {
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
    Ok(())
}

fn cmd_validate(file: &std::path::Path) -> anyhow::Result<()> {
    commands::validate_blueprint_file(file)?;
    println!("valid");
    Ok(())
}

fn cmd_schema(kind: SchemaArg) -> anyhow::Result<()> {
    let sk = match kind {
        SchemaArg::Blueprint => SchemaKind::Blueprint,
        SchemaArg::Manifest => SchemaKind::Manifest,
        SchemaArg::Settings => SchemaKind::Settings,
    };
    let json = commands::schema_json(sk)?;
    println!("{json}");
    Ok(())
}

fn cmd_inspect(file: &std::path::Path, format: OutputFormat) -> anyhow::Result<()> {
    let manifest = commands::inspect_manifest_file(file)?;
    let formatter = Formatter::new(format);
    println!("{}", formatter.format_manifest(&manifest));
    Ok(())
}

fn cmd_diff(first: &std::path::Path, second: &std::path::Path) -> anyhow::Result<()> {
    let diff = commands::manifest_diff(first, second)?;
    println!("{diff}");
    Ok(())
}

fn cmd_config(settings_path: Option<PathBuf>) -> anyhow::Result<()> {
    let settings_path = settings_path.unwrap_or_else(default_settings_path);
    for diagnostic in mf_cli::config::check_settings(&settings_path)? {
        println!("{diagnostic}");
    }
    Ok(())
}
