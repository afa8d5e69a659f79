//! Deployment manifest builder

use super::{service_name_labels, ObjectMeta, SERVICE_NAME_LABEL};
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// API version emitted for Deployments
pub const DEPLOYMENT_API_VERSION: &str = "extensions/v1beta1";

/// Deployment for a single compose service.
///
/// The spec is only reachable through the builder methods, so the selector
/// label and the single container cannot be edited around them:
///
/// ```compile_fail
/// use kubeform::manifest::DeploymentManifest;
///
/// let mut deployment = DeploymentManifest::new("web");
/// deployment.spec.template.metadata.labels.clear();
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentManifest {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    spec: DeploymentSpec,
}

/// Deployment spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeploymentSpec {
    /// Replica count
    pub replicas: u32,
    /// Pod template
    pub template: PodTemplate,
}

/// Pod template
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PodTemplate {
    pub metadata: TemplateMeta,
    pub spec: PodSpec,
}

/// Pod template metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TemplateMeta {
    /// Pod labels, including the service name selector label
    labels: BTreeMap<String, String>,
}

/// Pod spec holding exactly one container
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodSpec {
    #[serde(rename = "containers", serialize_with = "single_container")]
    container: Container,
    /// Pull secrets, in the order they were added
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

fn single_container<S>(container: &Container, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(std::iter::once(container))
}

impl TemplateMeta {
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }
}

impl PodSpec {
    /// The service's container
    pub fn container(&self) -> &Container {
        &self.container
    }
}

/// Container definition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Container {
    /// Container name (the service name)
    pub name: String,
    /// Image reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Container ports
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<ContainerPort>,
    /// Environment variables, in source order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerPort {
    pub container_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Reference to a secret by name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalObjectReference {
    pub name: String,
}

impl DeploymentManifest {
    /// Create an empty deployment for a service
    pub fn new(service_name: &str) -> Self {
        Self {
            api_version: DEPLOYMENT_API_VERSION,
            kind: "Deployment",
            metadata: ObjectMeta::named(service_name),
            spec: DeploymentSpec {
                replicas: 1,
                template: PodTemplate {
                    metadata: TemplateMeta {
                        labels: service_name_labels(service_name),
                    },
                    spec: PodSpec {
                        container: Container {
                            name: service_name.to_string(),
                            image: None,
                            ports: Vec::new(),
                            env: Vec::new(),
                        },
                        image_pull_secrets: Vec::new(),
                    },
                },
            },
        }
    }

    /// Deployment spec
    pub fn spec(&self) -> &DeploymentSpec {
        &self.spec
    }

    /// The service's container
    pub fn container(&self) -> &Container {
        &self.spec.template.spec.container
    }

    /// Pod labels
    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.spec.template.metadata.labels
    }

    /// Pull secret names, in order
    pub fn image_pull_secrets(&self) -> impl Iterator<Item = &str> {
        self.spec
            .template
            .spec
            .image_pull_secrets
            .iter()
            .map(|s| s.name.as_str())
    }

    /// Set the image of the container named `container_name`.
    ///
    /// Does nothing when either argument is empty or the name is not the
    /// service's container.
    pub fn set_image(&mut self, container_name: &str, image: &str) {
        if container_name.is_empty() || image.is_empty() {
            return;
        }
        let container = &mut self.spec.template.spec.container;
        if container.name == container_name {
            container.image = Some(image.to_string());
        }
    }

    /// Add a container port unless it is already declared
    pub fn add_container_port(&mut self, container_port: u16) {
        if container_port == 0 {
            return;
        }
        let ports = &mut self.spec.template.spec.container.ports;
        if ports.iter().all(|p| p.container_port != container_port) {
            ports.push(ContainerPort { container_port });
        }
    }

    /// Append an environment variable
    pub fn add_env(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.spec
            .template
            .spec
            .container
            .env
            .push(EnvVar::new(name, value));
    }

    /// Set a pod label. Returns `false` when the label was refused.
    pub fn add_label(&mut self, name: &str, value: impl Into<String>) -> bool {
        if name.is_empty() {
            return false;
        }
        if name == SERVICE_NAME_LABEL {
            tracing::warn!(
                "Label '{}' is reserved for the service selector, ignoring it",
                SERVICE_NAME_LABEL
            );
            return false;
        }
        self.spec
            .template
            .metadata
            .labels
            .insert(name.to_string(), value.into());
        true
    }

    /// Append an image pull secret
    pub fn add_image_pull_secret(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        self.spec
            .template
            .spec
            .image_pull_secrets
            .push(LocalObjectReference {
                name: name.to_string(),
            });
    }
}
