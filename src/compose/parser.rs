//! Docker Compose file parser

use super::config::{scalar_text, ServiceDirectives};
use crate::error::{KubeformError, Result};
use regex::{Captures, Regex};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Default compose file names
pub const DEFAULT_COMPOSE_FILES: &[&str] = &[
    "compose.yaml",
    "compose.yml",
    "docker-compose.yaml",
    "docker-compose.yml",
];

/// A parsed compose file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComposeFile {
    /// Compose file version
    pub version: Option<String>,
    /// Project name
    pub name: Option<String>,
    /// Services, in file order
    pub services: Vec<(String, ServiceDirectives)>,
}

impl ComposeFile {
    /// Look up a service by name
    pub fn service(&self, name: &str) -> Option<&ServiceDirectives> {
        self.services
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }

    /// Service names in file order
    pub fn service_names(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(|(n, _)| n.as_str())
    }
}

/// Compose file parser
pub struct ComposeParser;

impl ComposeParser {
    /// Find compose file in directory
    pub fn find_compose_file(dir: &Path) -> Option<PathBuf> {
        DEFAULT_COMPOSE_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Parse compose file from path
    pub fn parse_file(path: &Path) -> Result<ComposeFile> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            KubeformError::ComposeParse(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_str(&content)
    }

    /// Parse compose file from string
    pub fn parse_str(content: &str) -> Result<ComposeFile> {
        let mut document: Value = serde_yaml::from_str(content)
            .map_err(|e| KubeformError::ComposeParse(format!("Failed to parse YAML: {}", e)))?;

        // `<<: *anchor` inherits keys; the service's own keys win
        document.apply_merge().map_err(|e| {
            KubeformError::ComposeParse(format!("Failed to apply YAML merge keys: {}", e))
        })?;

        let Value::Mapping(mut root) = document else {
            return Err(KubeformError::ComposeParse(
                "top level of a compose file must be a mapping".to_string(),
            ));
        };

        let services = match root.remove("services") {
            Some(Value::Mapping(services)) => services,
            Some(Value::Null) | None => {
                return Err(KubeformError::ComposeParse(
                    "compose file has no 'services' section".to_string(),
                ))
            }
            Some(_) => {
                return Err(KubeformError::ComposeParse(
                    "'services' must be a mapping".to_string(),
                ))
            }
        };

        let mut file = ComposeFile {
            version: root.get("version").and_then(scalar_text),
            name: root.get("name").and_then(scalar_text),
            services: Vec::with_capacity(services.len()),
        };

        for (key, body) in services {
            let name = scalar_text(&key).ok_or_else(|| {
                KubeformError::ComposeParse(format!(
                    "service names must be strings, found {:?}",
                    key
                ))
            })?;
            let directives = ServiceDirectives::try_from(body).map_err(|e| match e {
                KubeformError::ComposeParse(msg) => {
                    KubeformError::ComposeParse(format!("service '{}': {}", name, msg))
                }
                other => other,
            })?;
            file.services.push((name, directives));
        }

        Ok(file)
    }

    /// Validate a compose file, returning warnings for things that translate lossily
    pub fn validate(file: &ComposeFile) -> Result<Vec<String>> {
        if file.services.is_empty() {
            return Err(KubeformError::ComposeParse(
                "compose file defines no services".to_string(),
            ));
        }

        let mut warnings = Vec::new();

        for (name, service) in &file.services {
            if name.is_empty() {
                return Err(KubeformError::ComposeParse(
                    "service names cannot be empty".to_string(),
                ));
            }

            if !service.contains("image") {
                if service.contains("build") {
                    warnings.push(format!(
                        "Service '{}' uses 'build' without 'image'; images are not built, \
                         push one and set 'image'",
                        name
                    ));
                } else {
                    warnings.push(format!(
                        "Service '{}' has no 'image'; its container will have no image",
                        name
                    ));
                }
            }
        }

        Ok(warnings)
    }

    /// Interpolate environment variables in every directive value
    pub fn interpolate(file: &mut ComposeFile, env: &HashMap<String, String>) {
        for (_, service) in file.services.iter_mut() {
            for value in service.values_mut() {
                value.rewrite_strings(&mut |s: &str| interpolate_string(s, env));
            }
        }
    }
}

fn interpolation_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"\$\$|\$\{([A-Za-z_][A-Za-z0-9_]*)(?:(:?)-([^}]*))?\}|\$([A-Za-z_][A-Za-z0-9_]*)",
        )
        .expect("interpolation pattern is valid")
    })
}

/// Interpolate environment variables in a string
fn interpolate_string(s: &str, env: &HashMap<String, String>) -> String {
    if !s.contains('$') {
        return s.to_string();
    }

    interpolation_pattern()
        .replace_all(s, |caps: &Captures| {
            if &caps[0] == "$$" {
                return "$".to_string();
            }

            if let Some(var) = caps.get(4) {
                return env.get(var.as_str()).cloned().unwrap_or_default();
            }

            let var = &caps[1];
            match (env.get(var), caps.get(3)) {
                // `${VAR:-default}` also replaces an empty value
                (Some(value), Some(default))
                    if value.is_empty() && caps.get(2).is_some_and(|m| !m.as_str().is_empty()) =>
                {
                    default.as_str().to_string()
                }
                (Some(value), _) => value.clone(),
                (None, Some(default)) => default.as_str().to_string(),
                (None, None) => String::new(),
            }
        })
        .into_owned()
}
