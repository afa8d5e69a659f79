//! Kubeform - Docker Compose to Kubernetes manifest translation
//!
//! This is the main CLI entry point for Kubeform.

use clap::{Parser, Subcommand};
use kubeform::compose::{ComposeFile, ComposeParser, GroupInfo, RegistryInfo};
use kubeform::error::{KubeformError, Result};
use kubeform::output::{self, OutputFormat};
use kubeform::translate_project;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Kubeform - compose services to Kubernetes manifests
#[derive(Parser)]
#[command(name = "kubeform")]
#[command(version)]
#[command(about = "Translate Docker Compose services into Kubernetes manifests", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate services into Deployment, Service and Ingress manifests
    Translate {
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// Directory to write manifests to (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Manifest encoding
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
        /// Private registry host, used as the image pull secret name
        #[arg(long, env = "KUBEFORM_REGISTRY")]
        registry: Option<String>,
        /// Deployment group name (defaults to the project name)
        #[arg(long)]
        group: Option<String>,
        /// Only translate these services
        #[arg(short, long)]
        service: Vec<String>,
        /// Do not substitute ${VAR} references from the environment
        #[arg(long)]
        no_interpolate: bool,
    },

    /// Validate compose file
    Config {
        /// Compose file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let working_dir = std::env::current_dir()?;

    match cli.command {
        Commands::Translate {
            file,
            output,
            format,
            registry,
            group,
            service,
            no_interpolate,
        } => {
            let compose_file = resolve_compose_file(file, &working_dir)?;
            let mut config = ComposeParser::parse_file(&compose_file)?;

            for warning in ComposeParser::validate(&config)? {
                tracing::warn!("{}", warning);
            }

            if !no_interpolate {
                let env = std::env::vars().collect();
                ComposeParser::interpolate(&mut config, &env);
            }

            if !service.is_empty() {
                config = select_services(config, &service)?;
            }

            let group = group.unwrap_or_else(|| project_name(&config, &working_dir));
            let group = GroupInfo::new(group);
            let registry = RegistryInfo {
                host: registry.filter(|h| !h.is_empty()),
            };

            let translated = translate_project(&config, &registry, &group)?;

            if translated.iter().any(|s| s.needs_ingress_controller) {
                tracing::info!(
                    "Virtual hosts were declared; \
                     the cluster needs an Ingress controller to route them"
                );
            }

            match output {
                Some(dir) => {
                    let written = output::write_manifests(&dir, &translated, format)?;
                    for path in written {
                        println!("{}", path.display());
                    }
                }
                None => println!("{}", output::render_all(&translated, format)?),
            }
        }

        Commands::Config { file } => {
            let compose_file = resolve_compose_file(file, &working_dir)?;
            let config = ComposeParser::parse_file(&compose_file)?;
            let warnings = ComposeParser::validate(&config)?;

            for warning in &warnings {
                println!("WARNING: {}", warning);
            }

            println!("{:<20} {:<40} {}", "SERVICE", "IMAGE", "UNSUPPORTED KEYS");
            for (name, directives) in &config.services {
                let image = directives
                    .get("image")
                    .and_then(|v| v.as_scalar())
                    .unwrap_or("-");
                let unsupported: Vec<&str> = directives
                    .keys()
                    .filter(|key| !kubeform::translator::is_supported_directive(key))
                    .collect();
                println!("{:<20} {:<40} {}", name, image, unsupported.join(","));
            }
        }
    }

    Ok(())
}

fn resolve_compose_file(file: Option<PathBuf>, working_dir: &Path) -> Result<PathBuf> {
    match file {
        Some(path) => Ok(path),
        None => ComposeParser::find_compose_file(working_dir).ok_or_else(|| {
            KubeformError::InvalidConfig(format!(
                "no compose file found in {}",
                working_dir.display()
            ))
        }),
    }
}

fn project_name(config: &ComposeFile, working_dir: &Path) -> String {
    config.name.clone().unwrap_or_else(|| {
        working_dir
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string()
    })
}

fn select_services(mut config: ComposeFile, wanted: &[String]) -> Result<ComposeFile> {
    if let Some(missing) = wanted.iter().find(|name| config.service(name).is_none()) {
        return Err(KubeformError::ServiceNotFound(missing.clone()));
    }
    config.services.retain(|(name, _)| wanted.contains(name));
    Ok(config)
}
