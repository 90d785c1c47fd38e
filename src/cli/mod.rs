//! Command-line interface for record-export
//!
//! This module handles:
//! - Command-line argument parsing using clap
//! - Configuration loading and verbosity overrides
//! - Loading a fixture store and an export request from JSON files
//! - Running the validate, run and config subcommands

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, info};

use crate::config::{Config, LogLevel};
use crate::error::{ExportError, Result};
use crate::export::{
    EXPORT_COLLECTION_NAME, ExportOptions, ExportRequest, ExportService, ExportSpecification, GenerationOutcome,
    export_collection,
};
use crate::storage::LocalStorage;
use crate::store::{MemoryStore, Principal, RecordStore};
use crate::utils::fs::expand_home;
use crate::utils::format_bytes;
use crate::utils::time::format_duration;

/// Record Export - tabular exports from a record store
#[derive(Parser, Debug)]
#[command(
    name = "record-export",
    version,
    about = "Validated, access-scoped CSV and XLSX exports",
    long_about = "Validates export requests against a record store and generates CSV or XLSX
artifacts on behalf of the requesting owner, honoring collection list rules."
)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose mode (detailed logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Very verbose mode (trace logging)
    #[arg(long = "vv", global = true)]
    pub very_verbose: bool,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands for record-export
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate an export request without generating output
    Validate {
        /// JSON fixture holding collections, admins and records
        #[arg(long, value_name = "FIXTURE")]
        store: PathBuf,

        /// JSON export request
        #[arg(long, value_name = "REQUEST")]
        export: PathBuf,
    },

    /// Create an export and write its artifact to local storage
    Run {
        /// JSON fixture holding collections, admins and records
        #[arg(long, value_name = "FIXTURE")]
        store: PathBuf,

        /// JSON export request
        #[arg(long, value_name = "REQUEST")]
        export: PathBuf,

        /// Storage root for artifacts (defaults to the configured root)
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,

        /// Generate on a background task after the record is created
        #[arg(long)]
        background: bool,
    },

    /// Show the effective configuration
    Config {
        /// Print the default configuration file path only
        #[arg(long)]
        show_path: bool,
    },
}

/// CLI interface handler
pub struct CliInterface {
    /// Parsed command-line arguments
    args: CliArgs,

    /// Loaded configuration
    config: Config,
}

impl CliInterface {
    /// Create a new CLI interface from the process arguments
    ///
    /// # Returns
    /// * `Result<Self>` - New CLI interface or error
    pub fn new() -> Result<Self> {
        Self::from_args(CliArgs::parse())
    }

    /// Create a CLI interface from already parsed arguments
    pub fn from_args(args: CliArgs) -> Result<Self> {
        let config = Self::load_config(&args)?;
        Ok(Self { args, config })
    }

    /// Load configuration and apply verbosity flags
    fn load_config(args: &CliArgs) -> Result<Config> {
        let mut config = Config::load_from(args.config_file.as_deref())?;
        Self::apply_logging_args(&mut config, args);
        Ok(config)
    }

    /// Apply logging-related CLI arguments to configuration
    fn apply_logging_args(config: &mut Config, args: &CliArgs) {
        config.logging.level = if args.very_verbose {
            LogLevel::Trace
        } else if args.verbose {
            LogLevel::Debug
        } else if args.quiet {
            LogLevel::Error
        } else {
            config.logging.level
        };
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn args(&self) -> &CliArgs {
        &self.args
    }

    /// Run the selected subcommand and print its output
    pub async fn handle_command(&self) -> Result<()> {
        let output = self.execute().await?;
        if !output.is_empty() {
            println!("{}", output.trim_end());
        }
        Ok(())
    }

    /// Run the selected subcommand and return what it would print
    pub async fn execute(&self) -> Result<String> {
        match &self.args.command {
            Commands::Validate { store, export } => self.validate_export(store, export).await,
            Commands::Run {
                store,
                export,
                out_dir,
                background,
            } => {
                self.run_export(store, export, out_dir.as_deref(), *background)
                    .await
            }
            Commands::Config { show_path } => self.show_config(*show_path),
        }
    }

    /// Validate the request and describe the resulting specification
    async fn validate_export(&self, store_path: &Path, export_path: &Path) -> Result<String> {
        let store = load_store(store_path).await?;
        let request = load_request(export_path).await?;
        let record = request.to_record(&store.find_collection(EXPORT_COLLECTION_NAME).await?);

        let storage = Arc::new(LocalStorage::new(self.storage_root(None)));
        let service = ExportService::new(Arc::new(store), storage, ExportOptions::from(&self.config.export));
        let spec = service.validate_and_fill(&record).await?;

        Ok(describe_specification(&spec))
    }

    /// Create the export through the full host flow
    async fn run_export(
        &self,
        store_path: &Path,
        export_path: &Path,
        out_dir: Option<&Path>,
        background: bool,
    ) -> Result<String> {
        let store = load_store(store_path).await?;
        let request = load_request(export_path).await?;
        let record = request.to_record(&store.find_collection(EXPORT_COLLECTION_NAME).await?);

        let storage = Arc::new(LocalStorage::new(self.storage_root(out_dir)));
        let mut options = ExportOptions::from(&self.config.export);
        options.generate_in_background |= background;

        let service = ExportService::new(Arc::new(store), storage.clone(), options);
        let started = std::time::Instant::now();
        let created = service.create_export(record).await?;

        let key = match (created.artifact_key, created.generation) {
            (Some(key), _) => key,
            (None, Some(handle)) => match handle.wait().await {
                GenerationOutcome::Completed { key, rows } => {
                    debug!("Background generation wrote {} rows", rows);
                    key
                }
                GenerationOutcome::Failed(message) => return Err(ExportError::Generic(message)),
            },
            (None, None) => return Err(ExportError::Generic("no artifact was produced".to_string())),
        };

        let path = storage.path_for(&key)?;
        let size = tokio::fs::metadata(&path).await?.len();
        info!("Export {} written to {}", created.record.id(), path.display());

        let mut out = String::new();
        let _ = writeln!(out, "Export:   {}", created.record.id());
        let _ = writeln!(out, "Artifact: {}", path.display());
        let _ = writeln!(out, "Size:     {}", format_bytes(size));
        let _ = writeln!(out, "Elapsed:  {}", format_duration(started.elapsed()));
        Ok(out)
    }

    /// Render the effective configuration
    fn show_config(&self, show_path: bool) -> Result<String> {
        let path = self.config_path();
        if show_path {
            return Ok(path.display().to_string());
        }

        let mut out = String::new();
        let _ = writeln!(out, "# Configuration file: {}", path.display());
        out.push_str(&self.config.to_toml()?);
        Ok(out)
    }

    /// Configuration file path (from args or default)
    fn config_path(&self) -> PathBuf {
        self.args
            .config_file
            .clone()
            .unwrap_or_else(Config::default_path)
    }

    fn storage_root(&self, out_dir: Option<&Path>) -> PathBuf {
        match out_dir {
            Some(dir) => expand_home(&dir.to_string_lossy()),
            None => expand_home(&self.config.storage.root.to_string_lossy()),
        }
    }
}

/// Load a fixture store, registering the export collection when absent
async fn load_store(path: &Path) -> Result<MemoryStore> {
    let store = MemoryStore::load_fixture(path).await?;
    if store.find_collection(EXPORT_COLLECTION_NAME).await.is_err() {
        store.add_collection(export_collection()).await;
    }
    Ok(store)
}

async fn load_request(path: &Path) -> Result<ExportRequest> {
    let content = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&content)
        .map_err(|e| ExportError::Generic(format!("invalid export request {}: {e}", path.display())))
}

fn describe_specification(spec: &ExportSpecification) -> String {
    let principal = match &spec.principal {
        Principal::Anonymous => "anonymous".to_string(),
        Principal::Record(r) => format!("{}/{}", r.collection_name(), r.id()),
        Principal::Admin(a) => format!("admin {}", a.email),
    };

    let mut out = String::new();
    let _ = writeln!(out, "Collection: {}", spec.collection.name);
    let _ = writeln!(out, "Owner:      {}", principal);
    let _ = writeln!(out, "Format:     {}", spec.format);
    if !spec.filter.is_empty() {
        let _ = writeln!(out, "Filter:     {}", spec.filter);
    }
    if !spec.sort.is_empty() {
        let _ = writeln!(out, "Sort:       {}", spec.sort);
    }
    let _ = writeln!(out, "Columns:");
    for item in &spec.headers {
        let _ = write!(out, "  {} <- {}", item.header, item.field_name);
        if !item.timezone.is_empty() {
            let _ = write!(out, " ({})", item.timezone);
        }
        out.push('\n');
    }
    out
}
