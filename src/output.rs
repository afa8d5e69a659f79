//! Manifest rendering and file output

use crate::error::Result;
use crate::translator::TranslatedService;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Text encoding for rendered manifests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

impl OutputFormat {
    /// File extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Render a single document
pub fn render<T: Serialize>(document: &T, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(document)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(document)?),
    }
}

/// Rendered documents of one service as `(kind, text)`, Deployment first
fn render_service(
    service: &TranslatedService,
    format: OutputFormat,
) -> Result<Vec<(&'static str, String)>> {
    let mut documents = vec![("deployment", render(&service.deployment, format)?)];
    if let Some(svc) = &service.service {
        documents.push(("service", render(svc, format)?));
    }
    if let Some(ingress) = &service.ingress {
        documents.push(("ingress", render(ingress, format)?));
    }
    Ok(documents)
}

/// Render every manifest into one stream (YAML documents are `---` separated)
pub fn render_all(services: &[TranslatedService], format: OutputFormat) -> Result<String> {
    let mut documents = Vec::new();
    for service in services {
        documents.extend(render_service(service, format)?.into_iter().map(|(_, text)| text));
    }

    Ok(match format {
        OutputFormat::Json => documents.join("\n"),
        OutputFormat::Yaml => documents
            .iter()
            .map(|doc| format!("---\n{}", doc))
            .collect::<String>(),
    })
}

/// Write each manifest to `<dir>/<service>-<kind>.<ext>`, returning the paths written
pub fn write_manifests(
    dir: &Path,
    services: &[TranslatedService],
    format: OutputFormat,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::new();
    for service in services {
        for (kind, text) in render_service(service, format)? {
            let path = dir.join(format!("{}-{}.{}", service.name, kind, format.extension()));
            std::fs::write(&path, text)?;
            tracing::debug!("Wrote {}", path.display());
            written.push(path);
        }
    }

    Ok(written)
}
