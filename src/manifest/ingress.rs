//! Ingress manifest builder

use super::ObjectMeta;
use crate::error::{KubeformError, Result};
use serde::Serialize;

/// API version emitted for Ingresses
pub const INGRESS_API_VERSION: &str = "extensions/v1beta1";

/// Path used for every rule unless the caller supplies one
pub const DEFAULT_PATH: &str = "/";

/// Ingress routing virtual hosts to a compose service.
///
/// Rules only change through [`IngressManifest::add_rule_with_path`], which
/// keeps one rule per host:
///
/// ```compile_fail
/// use kubeform::manifest::IngressManifest;
///
/// let mut ingress = IngressManifest::new("web");
/// ingress.add_rule("www.example.com", 80, "web").unwrap();
/// let duplicate = ingress.rules()[0].clone();
/// ingress.spec.rules.push(duplicate);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressManifest {
    pub api_version: &'static str,
    pub kind: &'static str,
    pub metadata: ObjectMeta,
    spec: IngressSpec,
}

/// Ingress spec
#[derive(Debug, Clone, PartialEq, Serialize)]
struct IngressSpec {
    /// Rules in first-seen host order, one per host
    rules: Vec<IngressRule>,
}

/// Host rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngressRule {
    pub host: String,
    pub http: HttpRuleValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRuleValue {
    pub paths: Vec<HttpPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpPath {
    pub path: String,
    pub backend: IngressBackend,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngressBackend {
    pub service_name: String,
    pub service_port: u16,
}

impl IngressManifest {
    /// Create an ingress with no rules
    pub fn new(service_name: &str) -> Self {
        Self {
            api_version: INGRESS_API_VERSION,
            kind: "Ingress",
            metadata: ObjectMeta::named(service_name),
            spec: IngressSpec { rules: Vec::new() },
        }
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.spec.rules
    }

    pub fn is_empty(&self) -> bool {
        self.spec.rules.is_empty()
    }

    /// Route `host_name` to `service_name:service_port` on `/`
    pub fn add_rule(
        &mut self,
        host_name: &str,
        service_port: u16,
        service_name: &str,
    ) -> Result<()> {
        self.add_rule_with_path(host_name, service_port, service_name, DEFAULT_PATH)
    }

    /// Route `host_name` to `service_name:service_port`.
    ///
    /// The first route for a host creates its rule using `path` (empty means
    /// `/`). Later routes for the same host are appended to that rule on `/`;
    /// the supplied path only applies when the rule is created.
    pub fn add_rule_with_path(
        &mut self,
        host_name: &str,
        service_port: u16,
        service_name: &str,
        path: &str,
    ) -> Result<()> {
        if host_name.is_empty() || service_port == 0 || service_name.is_empty() {
            return Err(KubeformError::InvalidArgument(
                "host_name, service_port or service_name cannot be empty".to_string(),
            ));
        }

        let backend = IngressBackend {
            service_name: service_name.to_string(),
            service_port,
        };

        match self.spec.rules.iter_mut().find(|rule| rule.host == host_name) {
            Some(rule) => {
                tracing::debug!("Adding path to existing ingress rule for {}", host_name);
                rule.http.paths.push(HttpPath {
                    path: DEFAULT_PATH.to_string(),
                    backend,
                });
            }
            None => {
                let path = if path.is_empty() { DEFAULT_PATH } else { path };
                self.spec.rules.push(IngressRule {
                    host: host_name.to_string(),
                    http: HttpRuleValue {
                        paths: vec![HttpPath {
                            path: path.to_string(),
                            backend,
                        }],
                    },
                });
            }
        }

        Ok(())
    }
}
