//! Service manifest builder

use super::{service_name_labels, ObjectMeta};
use serde::Serialize;
use std::collections::BTreeMap;

/// Service fronting a compose service's pods.
///
/// Ports only change through [`ServiceManifest::merge_port`], which keeps
/// them unique:
///
/// ```compile_fail
/// use kubeform::manifest::ServiceManifest;
///
/// let mut service = ServiceManifest::new("web");
/// service.merge_port(80, 8080);
/// let duplicate = service.ports()[0].clone();
/// service.spec.ports.push(duplicate);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManifest {
    pub kind: &'static str,
    pub api_version: &'static str,
    pub metadata: ObjectMeta,
    spec: ServiceSpec,
    #[serde(skip)]
    emitted: bool,
}

/// Service spec
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceSpec {
    /// Pod selector
    pub selector: BTreeMap<String, String>,
    /// Ports, unique by (target, exposed)
    ports: Vec<ServicePort>,
}

/// One Service port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePort {
    pub name: String,
    pub protocol: &'static str,
    pub target_port: u16,
    pub port: u16,
}

impl ServiceManifest {
    /// Create an empty service for a compose service
    pub fn new(service_name: &str) -> Self {
        Self {
            kind: "Service",
            api_version: "v1",
            metadata: ObjectMeta::named(service_name),
            spec: ServiceSpec {
                selector: service_name_labels(service_name),
                ports: Vec::new(),
            },
            emitted: false,
        }
    }

    /// Whether any port was ever merged in
    pub fn is_emitted(&self) -> bool {
        self.emitted
    }

    pub fn ports(&self) -> &[ServicePort] {
        &self.spec.ports
    }

    /// Pod selector
    pub fn selector(&self) -> &BTreeMap<String, String> {
        &self.spec.selector
    }

    /// Merge a `(target, exposed)` port pair.
    ///
    /// Re-applying a pair that is already present is a no-op. A new pair whose
    /// exposed port collides with an existing name gets a numeric suffix
    /// (`port-80`, `port-80-1`, ...). Returns `true` when a port was added.
    pub fn merge_port(&mut self, target: u16, exposed: u16) -> bool {
        self.emitted = true;

        if self
            .spec
            .ports
            .iter()
            .any(|p| p.target_port == target && p.port == exposed)
        {
            tracing::debug!(
                "Service {} already exposes {} -> {}",
                self.metadata.name,
                exposed,
                target
            );
            return false;
        }

        let name = self.unique_port_name(exposed);
        self.spec.ports.push(ServicePort {
            name,
            protocol: "TCP",
            target_port: target,
            port: exposed,
        });
        true
    }

    fn unique_port_name(&self, exposed: u16) -> String {
        let base = format!("port-{}", exposed);
        let taken = |candidate: &str| self.spec.ports.iter().any(|p| p.name == candidate);

        if !taken(&base) {
            return base;
        }

        let mut suffix = 1u32;
        loop {
            let candidate = format!("{}-{}", base, suffix);
            if !taken(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_is_idempotent() {
        let mut service = ServiceManifest::new("web");

        assert!(service.merge_port(80, 8080));
        assert!(!service.merge_port(80, 8080));

        assert_eq!(service.ports().len(), 1);
        assert!(service.is_emitted());
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let mut service = ServiceManifest::new("web");
        service.merge_port(8080, 80);
        service.merge_port(9090, 80);
        service.merge_port(7070, 80);
        service.merge_port(9090, 80);

        let names: Vec<&str> = service.ports().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["port-80", "port-80-1", "port-80-2"]);
    }

    #[test]
    fn test_cloned_port_cannot_reenter() {
        let mut service = ServiceManifest::new("web");
        service.merge_port(80, 8080);

        let existing = service.ports()[0].clone();
        assert!(!service.merge_port(existing.target_port, existing.port));
        assert_eq!(service.ports(), &[existing]);
        assert_eq!(service.selector()[crate::manifest::SERVICE_NAME_LABEL], "web");
    }

    #[test]
    fn test_fresh_service_is_not_emitted() {
        let service = ServiceManifest::new("web");
        assert!(!service.is_emitted());
        assert!(service.ports().is_empty());
    }

    #[test]
    fn test_service_shape() {
        let mut service = ServiceManifest::new("api");
        service.merge_port(3000, 80);

        assert_eq!(
            serde_json::to_value(&service).unwrap(),
            json!({
                "kind": "Service",
                "apiVersion": "v1",
                "metadata": { "name": "api" },
                "spec": {
                    "selector": { "com.microsoft.acs.k8s.service_name": "api" },
                    "ports": [{
                        "name": "port-80",
                        "protocol": "TCP",
                        "targetPort": 3000,
                        "port": 80
                    }]
                }
            })
        );
    }
}
