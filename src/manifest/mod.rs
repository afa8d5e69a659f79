//! Kubernetes manifest builders
//!
//! Each compose service becomes a Deployment, plus a Service when it declares
//! ports and an Ingress when it declares virtual hosts. The builders keep
//! their own invariants (one container per Deployment, unique Service ports,
//! one Ingress rule per host) so callers only ever add to them.

pub mod deployment;
pub mod ingress;
pub mod service;

pub use deployment::DeploymentManifest;
pub use ingress::IngressManifest;
pub use service::ServiceManifest;

use serde::Serialize;
use std::collections::BTreeMap;

/// Label joining a Deployment's pods to its Service
pub const SERVICE_NAME_LABEL: &str = "com.microsoft.acs.k8s.service_name";

/// Object metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectMeta {
    pub name: String,
}

impl ObjectMeta {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// The selector labels every manifest of a service shares
pub fn service_name_labels(service_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([(SERVICE_NAME_LABEL.to_string(), service_name.to_string())])
}
