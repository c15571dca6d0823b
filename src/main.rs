#![allow(clippy::multiple_crate_versions)]

use anyhow::Context;
use clap::{Parser, Subcommand};
use modelsync::config::schema::CONFIG_FILE_NAME;
use modelsync::config::Config;
use modelsync::engine::{AddMode, RemovalReport, TidyReport, TokenizerReport};
use modelsync::models::{Asset, Module};
use modelsync::Engine;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "modelsync")]
#[command(about = "Keep downloaded models in sync with the project manifest", long_about = None)]
struct Cli {
    /// Project directory holding modelsync.toml
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default modelsync.toml
    Init,
    /// Download missing models and clean up unknown ones
    Tidy,
    /// Manage models
    Model {
        #[command(subcommand)]
        command: ModelCommands,
    },
    /// Manage tokenizers of transformers models
    Tokenizer {
        #[command(subcommand)]
        command: TokenizerCommands,
    },
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Add a model to the manifest and download it
    Add {
        name: String,
        /// Library the model is loaded with, e.g. transformers
        #[arg(long, default_value = "")]
        module: String,
        /// Class used to load the model
        #[arg(long, default_value = "")]
        class: String,
        /// Extra loading option, as key=value
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
        /// Only fetch the configuration, download nothing
        #[arg(long)]
        only_config: bool,
        /// Replace files already present on disk
        #[arg(long)]
        overwrite: bool,
    },
    /// Remove models from disk and manifest
    Remove {
        names: Vec<String>,
        /// Remove every model
        #[arg(long, conflicts_with = "names")]
        all: bool,
    },
}

#[derive(Subcommand)]
enum TokenizerCommands {
    /// Download tokenizers for a model
    Add {
        model: Option<String>,
        tokenizers: Vec<String>,
        /// Tokenizer option, as key=value
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, String)>,
    },
    /// Remove tokenizers of a model
    Remove { model: String, tokenizers: Vec<String> },
    /// Download again tokenizers of a model
    Update { model: String, tokenizers: Vec<String> },
}

fn parse_option(value: &str) -> Result<(String, String), String> {
    value
        .split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("invalid option '{value}', expected key=value"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if matches!(cli.command, Commands::Init) {
        return init(&cli.project);
    }

    let config = Config::load(&cli.project).context("Failed to load configuration")?;
    let mut engine = Engine::from_config(&config, &cli.project)?;

    match cli.command {
        Commands::Init => {}
        Commands::Tidy => print_tidy(&engine.tidy().await?),
        Commands::Model { command } => match command {
            ModelCommands::Add {
                name,
                module,
                class,
                options,
                only_config,
                overwrite,
            } => {
                let mut asset = Asset::new(name, Module::from(module));
                asset.class = class;
                asset.options = options.into_iter().collect();
                let mode = if only_config {
                    AddMode::ConfigurationOnly
                } else {
                    AddMode::Download
                };
                let asset = engine.add_asset(asset, mode, overwrite).await?;
                println!("Added {} ({})", asset.name, asset.path.display());
            }
            ModelCommands::Remove { names, all } => {
                let report = if all {
                    engine.remove_all_assets()?
                } else {
                    engine.remove_assets(&names)?
                };
                print_removal(&report);
            }
        },
        Commands::Tokenizer { command } => {
            let report = match command {
                TokenizerCommands::Add {
                    model,
                    tokenizers,
                    options,
                } => {
                    let options: BTreeMap<String, String> = options.into_iter().collect();
                    engine
                        .add_tokenizers(model.as_deref(), &tokenizers, &options)
                        .await?
                }
                TokenizerCommands::Remove { model, tokenizers } => {
                    engine.remove_tokenizers(Some(&model), &tokenizers)?
                }
                TokenizerCommands::Update { model, tokenizers } => {
                    engine.update_tokenizers(Some(&model), &tokenizers).await?
                }
            };
            print_tokenizers(&report);
        }
    }

    Ok(())
}

fn init(project: &Path) -> anyhow::Result<()> {
    let path = project.join(CONFIG_FILE_NAME);
    if path.exists() {
        println!("{} already exists", path.display());
        return Ok(());
    }
    Config::default()
        .save(project)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}

fn print_list(label: &str, names: &[String]) {
    if !names.is_empty() {
        println!("{label}: {}", names.join(", "));
    }
}

fn print_tidy(report: &TidyReport) {
    if report.is_noop() {
        println!("Everything is in sync");
        return;
    }
    print_list("Downloaded", &report.materialized);
    print_list("Failed", &report.failed);
    print_list("Skipped", &report.skipped);
    print_list("Removed", &report.removed_orphans);
    print_list("Not in manifest, kept", &report.retained_orphans);
    print_list("Could not remove", &report.failed_removals);
}

fn print_removal(report: &RemovalReport) {
    print_list("Removed", &report.removed);
    print_list("Not configured", &report.not_found);
    print_list("Could not remove", &report.failed);
}

fn print_tokenizers(report: &TokenizerReport) {
    if report.processed.is_empty() {
        println!("No tokenizers changed for {}", report.asset);
    } else {
        println!("{}: {}", report.asset, report.processed.join(", "));
    }
    print_list("Ignored", &report.ignored);
}
