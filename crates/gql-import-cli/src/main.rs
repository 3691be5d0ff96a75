//! # gql-import-cli
//!
//! Command-line front end for assembling GraphQL schemas.
//!
//! `build` follows the `# import` directives of a root schema and prints the
//! merged SDL; `graph` prints the resolved import graph as JSON.

use anyhow::Context;
use clap::{Parser, Subcommand};
use gql_import::model::definition_name;
use gql_import::{
    BuildOptions, DuplicatePolicy, HttpPlugin, ImportConfig, ImportLoader, build_document,
};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gql-import")]
#[command(about = "Assemble GraphQL schemas from import directives")]
#[command(version)]
struct Cli {
    /// Path to configuration file (YAML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory relative root paths are resolved against
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    /// Fetch http:// and https:// imports
    #[arg(long, global = true)]
    http: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve imports and print the merged schema
    Build {
        /// Root schema file or id
        root: String,

        /// Keep the first definition of duplicated fields instead of failing
        #[arg(long)]
        keep_first_duplicates: bool,

        /// Write the schema to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the resolved import graph as JSON
    Graph {
        /// Root schema file or id
        root: String,
    },
}

#[derive(Serialize)]
struct GraphNode<'a> {
    id: &'a str,
    imports: Vec<&'a str>,
    definitions: Vec<&'a str>,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_options(cli: &Cli) -> anyhow::Result<BuildOptions> {
    let mut options = match &cli.config {
        Some(path) => ImportConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration {}", path.display()))?
            .into_options(),
        None => BuildOptions::new(),
    };

    if let Some(dir) = &cli.base_dir {
        options = options.base_dir(dir);
    }

    if cli.http && !options.load_plugins.iter().any(|p| p.name() == "http") {
        options.load_plugins.insert(0, Arc::new(HttpPlugin::new()));
    }

    Ok(options)
}

/// Bare file names are treated as paths relative to the base directory
fn root_id(root: &str) -> String {
    let has_scheme = root
        .split_once("://")
        .is_some_and(|(scheme, _)| !scheme.is_empty());
    if has_scheme || root.starts_with('/') || root.starts_with("./") || root.starts_with("../") {
        root.to_string()
    } else {
        format!("./{root}")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut options = build_options(&cli)?;

    match &cli.command {
        Commands::Build {
            root,
            keep_first_duplicates,
            output,
        } => {
            if *keep_first_duplicates {
                options = options.duplicate_policy(DuplicatePolicy::KeepFirst);
            }

            tracing::info!("Building schema from {}", root);
            let document = build_document(&root_id(root), &options)
                .await
                .with_context(|| format!("Failed to build schema from {}", root))?;
            let sdl = document.to_string();

            match output {
                Some(path) => {
                    tokio::fs::write(path, &sdl)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    tracing::info!(
                        "Wrote {} definition(s) to {}",
                        document.definitions.len(),
                        path.display()
                    );
                }
                None => print!("{}", sdl),
            }
        }
        Commands::Graph { root } => {
            tracing::info!("Resolving import graph from {}", root);
            let resolution = ImportLoader::new(&options)?
                .resolve(&root_id(root))
                .await
                .with_context(|| format!("Failed to resolve imports from {}", root))?;

            let nodes: Vec<GraphNode> = resolution
                .iter()
                .map(|(id, doc)| GraphNode {
                    id,
                    imports: doc.imports.iter().map(|i| i.id.as_str()).collect(),
                    definitions: doc
                        .document
                        .iter()
                        .flat_map(|d| d.definitions.iter())
                        .filter_map(definition_name)
                        .collect(),
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&nodes)?);
        }
    }

    Ok(())
}
