//! Kubeform - Docker Compose to Kubernetes manifest translation
//!
//! Kubeform turns each service of a compose file into Kubernetes manifests:
//!
//! - A Deployment carrying the service's image, ports, environment and labels
//! - A Service when the service publishes or exposes ports
//! - An Ingress when the service declares virtual hosts
//!
//! Translation is per service and stateless; see [`ManifestTranslator`].

pub mod compose;
pub mod error;
pub mod manifest;
pub mod output;
pub mod translator;

pub use error::{KubeformError, Result};
pub use translator::{translate_project, ManifestTranslator, TranslatedService};
