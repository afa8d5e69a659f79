//! Compose service to Kubernetes manifest translation
//!
//! A [`ManifestTranslator`] owns the Deployment, Service and Ingress of one
//! compose service. Ingress rules are derived as soon as the translator is
//! built; the Deployment and Service are filled in by
//! [`ManifestTranslator::compile_deployment`], which walks the service's
//! directives and hands each one it understands to its handler in
//! [`DIRECTIVE_HANDLERS`]. Directives without a handler are skipped.

use crate::compose::ports::is_vhost_label;
use crate::compose::{
    ComposeFile, DirectiveValue, GroupInfo, PortDirectiveParser, RegistryInfo, ServiceDirectives,
};
use crate::error::{KubeformError, Result};
use crate::manifest::{DeploymentManifest, IngressManifest, ServiceManifest};

/// Handler applying one directive, identified by its name, to the manifests
pub type DirectiveHandler = fn(&mut ManifestTranslator, &ServiceDirectives, &str) -> Result<()>;

/// Directives the translator understands, and how
pub const DIRECTIVE_HANDLERS: &[(&str, DirectiveHandler)] = &[
    ("image", ManifestTranslator::parse_image),
    ("ports", ManifestTranslator::parse_ports),
    ("expose", ManifestTranslator::parse_expose),
    ("environment", ManifestTranslator::parse_environment),
    ("labels", ManifestTranslator::parse_labels),
];

/// Check whether a directive has a handler
pub fn is_supported_directive(name: &str) -> bool {
    DIRECTIVE_HANDLERS.iter().any(|(n, _)| *n == name)
}

/// Translates one compose service into Kubernetes manifests
#[derive(Debug, Clone)]
pub struct ManifestTranslator {
    group: GroupInfo,
    registry: RegistryInfo,
    service_name: String,
    directives: ServiceDirectives,
    deployment: DeploymentManifest,
    service: ServiceManifest,
    ingress: IngressManifest,
    needs_ingress_controller: bool,
    compiled: bool,
}

impl ManifestTranslator {
    /// Create a translator for a service and derive its Ingress rules
    pub fn new(
        group: GroupInfo,
        registry: RegistryInfo,
        service_name: impl Into<String>,
        directives: ServiceDirectives,
    ) -> Result<Self> {
        let service_name = service_name.into();
        if service_name.is_empty() {
            return Err(KubeformError::InvalidArgument(
                "service name cannot be empty".to_string(),
            ));
        }

        let mut translator = Self {
            deployment: DeploymentManifest::new(&service_name),
            service: ServiceManifest::new(&service_name),
            ingress: IngressManifest::new(&service_name),
            group,
            registry,
            service_name,
            directives,
            needs_ingress_controller: false,
            compiled: false,
        };
        translator.parse_vhosts()?;

        Ok(translator)
    }

    /// Turn every virtual host into an Ingress rule backed by this service
    fn parse_vhosts(&mut self) -> Result<()> {
        let vhosts = PortDirectiveParser::new(&self.directives).virtual_hosts();
        for (host_name, service_port) in vhosts {
            self.ingress
                .add_rule(&host_name, service_port, &self.service_name)?;
            self.needs_ingress_controller = true;
        }
        Ok(())
    }

    /// Populate the Deployment (and Service) from the service's directives.
    ///
    /// Runs once; later calls return the already compiled Deployment. On
    /// error the Deployment and Service are reset so nothing half-built
    /// leaks out.
    pub fn compile_deployment(&mut self) -> Result<&DeploymentManifest> {
        if !self.compiled {
            if let Some(host) = self.registry.host.as_deref() {
                self.deployment.add_image_pull_secret(host);
            }

            let directives = std::mem::take(&mut self.directives);
            let outcome = self.dispatch(&directives);
            self.directives = directives;

            if let Err(e) = outcome {
                self.deployment = DeploymentManifest::new(&self.service_name);
                self.service = ServiceManifest::new(&self.service_name);
                return Err(e);
            }
            self.compiled = true;
        }

        Ok(&self.deployment)
    }

    fn dispatch(&mut self, directives: &ServiceDirectives) -> Result<()> {
        for key in directives.keys() {
            match DIRECTIVE_HANDLERS.iter().find(|(name, _)| *name == key) {
                Some((_, handler)) => {
                    tracing::info!("Parsing key \"{}\" of service {}", key, self.service_name);
                    handler(self, directives, key)?;
                }
                None => {
                    tracing::debug!(
                        "Skipping unsupported key \"{}\" of service {}",
                        key,
                        self.service_name
                    )
                }
            }
        }
        Ok(())
    }

    fn parse_image(&mut self, directives: &ServiceDirectives, key: &str) -> Result<()> {
        match directives.get(key) {
            Some(DirectiveValue::Scalar(image)) => {
                self.deployment.set_image(&self.service_name, image);
                Ok(())
            }
            Some(value) if value.is_null() => Ok(()),
            Some(_) => Err(KubeformError::malformed(key, "an image reference string")),
            None => Ok(()),
        }
    }

    fn parse_ports(&mut self, directives: &ServiceDirectives, _key: &str) -> Result<()> {
        let pairs = PortDirectiveParser::new(directives).published_ports();
        for (container_port, exposed_port) in pairs {
            self.add_port(container_port, exposed_port);
        }
        Ok(())
    }

    fn parse_expose(&mut self, directives: &ServiceDirectives, _key: &str) -> Result<()> {
        let pairs = PortDirectiveParser::new(directives).exposed_ports();
        for (container_port, exposed_port) in pairs {
            self.add_port(container_port, exposed_port);
        }
        Ok(())
    }

    fn add_port(&mut self, container_port: u16, exposed_port: u16) {
        self.deployment.add_container_port(container_port);
        self.service.merge_port(container_port, exposed_port);
    }

    fn parse_environment(&mut self, directives: &ServiceDirectives, key: &str) -> Result<()> {
        match directives.get(key) {
            Some(DirectiveValue::List(items)) => {
                for item in items {
                    let (name, value) = item.split_once('=').unwrap_or((item.as_str(), ""));
                    self.deployment.add_env(name, value);
                }
            }
            Some(DirectiveValue::Map(entries)) => {
                for (name, value) in entries {
                    self.deployment
                        .add_env(name.as_str(), value.clone().unwrap_or_default());
                }
            }
            Some(value) if value.is_null() => {}
            Some(_) => {
                return Err(KubeformError::malformed(
                    key,
                    "a list of NAME=VALUE entries or a mapping",
                ))
            }
            None => {}
        }
        Ok(())
    }

    fn parse_labels(&mut self, directives: &ServiceDirectives, key: &str) -> Result<()> {
        let labels: Vec<(&str, &str)> = match directives.get(key) {
            Some(DirectiveValue::List(items)) => items
                .iter()
                .map(|item| item.split_once('=').unwrap_or((item.as_str(), "")))
                .collect(),
            Some(DirectiveValue::Map(entries)) => entries
                .iter()
                .map(|(name, value)| (name.as_str(), value.as_deref().unwrap_or_default()))
                .collect(),
            Some(value) if value.is_null() => Vec::new(),
            Some(_) => {
                return Err(KubeformError::malformed(
                    key,
                    "a list of NAME=VALUE entries or a mapping",
                ))
            }
            None => Vec::new(),
        };

        for (name, value) in labels {
            // already turned into Ingress rules
            if is_vhost_label(name) {
                continue;
            }
            self.deployment.add_label(name, value);
        }
        Ok(())
    }

    /// Compile (if needed) and serialize the Deployment
    pub fn deployment_manifest(&mut self) -> Result<String> {
        let deployment = self.compile_deployment()?;
        Ok(serde_json::to_string(deployment)?)
    }

    /// Serialized Service, or `None` when the service declares no ports
    pub fn service_manifest(&self) -> Result<Option<String>> {
        Ok(self.service().map(serde_json::to_string).transpose()?)
    }

    /// Serialized Ingress, or `None` when the service declares no virtual hosts
    pub fn ingress_manifest(&self) -> Result<Option<String>> {
        Ok(self.ingress().map(serde_json::to_string).transpose()?)
    }

    /// The Deployment as built so far
    pub fn deployment(&self) -> &DeploymentManifest {
        &self.deployment
    }

    /// The Service, once at least one port was merged
    pub fn service(&self) -> Option<&ServiceManifest> {
        self.service.is_emitted().then_some(&self.service)
    }

    /// The Ingress, if any virtual host was declared
    pub fn ingress(&self) -> Option<&IngressManifest> {
        (!self.ingress.is_empty()).then_some(&self.ingress)
    }

    /// Whether the cluster needs an Ingress controller for this service
    pub fn needs_ingress_controller(&self) -> bool {
        self.needs_ingress_controller
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn group(&self) -> &GroupInfo {
        &self.group
    }

    pub fn registry(&self) -> &RegistryInfo {
        &self.registry
    }

    /// Compile and hand over the finished manifests
    pub fn finish(mut self) -> Result<TranslatedService> {
        self.compile_deployment()?;
        let service = self.service.is_emitted().then_some(self.service);
        let ingress = (!self.ingress.is_empty()).then_some(self.ingress);

        Ok(TranslatedService {
            name: self.service_name,
            deployment: self.deployment,
            service,
            ingress,
            needs_ingress_controller: self.needs_ingress_controller,
        })
    }
}

/// The manifests produced for one compose service
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedService {
    /// Compose service name
    pub name: String,
    pub deployment: DeploymentManifest,
    pub service: Option<ServiceManifest>,
    pub ingress: Option<IngressManifest>,
    pub needs_ingress_controller: bool,
}

/// Translate every service of a compose file, in file order
pub fn translate_project(
    file: &ComposeFile,
    registry: &RegistryInfo,
    group: &GroupInfo,
) -> Result<Vec<TranslatedService>> {
    file.services
        .iter()
        .map(|(name, directives)| {
            tracing::debug!("Translating service {}", name);
            let translator = ManifestTranslator::new(
                group.clone(),
                registry.clone(),
                name.as_str(),
                directives.clone(),
            )?;
            translator.finish()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::ComposeParser;
    use crate::manifest::deployment::EnvVar;
    use crate::manifest::SERVICE_NAME_LABEL;
    use serde_json::{json, Value};

    fn translator(directives: ServiceDirectives) -> ManifestTranslator {
        ManifestTranslator::new(
            GroupInfo::new("group"),
            RegistryInfo::default(),
            "web",
            directives,
        )
        .unwrap()
    }

    fn directives(yaml: &str) -> ServiceDirectives {
        ServiceDirectives::try_from(serde_yaml::from_str::<serde_yaml::Value>(yaml).unwrap())
            .unwrap()
    }

    fn container(translator: &mut ManifestTranslator) -> Value {
        let json = translator.deployment_manifest().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        value["spec"]["template"]["spec"]["containers"][0].clone()
    }

    #[test]
    fn test_empty_service_name_is_rejected() {
        let result = ManifestTranslator::new(
            GroupInfo::default(),
            RegistryInfo::default(),
            "",
            ServiceDirectives::new(),
        );
        assert!(matches!(result, Err(KubeformError::InvalidArgument(_))));
    }

    #[test]
    fn test_full_translation() {
        let mut t = ManifestTranslator::new(
            GroupInfo::new("shop"),
            RegistryInfo::new("registry.example.com"),
            "web",
            directives(
                r#"
image: registry.example.com/web:1.0
ports: ["8080:80"]
expose: ["9090"]
environment:
  - MODE=production
labels:
  tier: frontend
  com.microsoft.acs.kubernetes.vhost: "www.example.com:8080"
"#,
            ),
        )
        .unwrap();

        let deployment: Value = serde_json::from_str(&t.deployment_manifest().unwrap()).unwrap();
        assert_eq!(
            deployment,
            json!({
                "apiVersion": "extensions/v1beta1",
                "kind": "Deployment",
                "metadata": { "name": "web" },
                "spec": {
                    "replicas": 1,
                    "template": {
                        "metadata": {
                            "labels": {
                                "com.microsoft.acs.k8s.service_name": "web",
                                "tier": "frontend"
                            }
                        },
                        "spec": {
                            "containers": [{
                                "name": "web",
                                "image": "registry.example.com/web:1.0",
                                "ports": [{ "containerPort": 80 }, { "containerPort": 9090 }],
                                "env": [{ "name": "MODE", "value": "production" }]
                            }],
                            "imagePullSecrets": [{ "name": "registry.example.com" }]
                        }
                    }
                }
            })
        );

        let service: Value = serde_json::from_str(&t.service_manifest().unwrap().unwrap()).unwrap();
        assert_eq!(
            service["spec"]["ports"],
            json!([
                { "name": "port-8080", "protocol": "TCP", "targetPort": 80, "port": 8080 },
                { "name": "port-9090", "protocol": "TCP", "targetPort": 9090, "port": 9090 }
            ])
        );

        let ingress: Value = serde_json::from_str(&t.ingress_manifest().unwrap().unwrap()).unwrap();
        assert_eq!(ingress["spec"]["rules"][0]["host"], "www.example.com");
        assert_eq!(
            ingress["spec"]["rules"][0]["http"]["paths"][0]["backend"],
            json!({ "serviceName": "web", "servicePort": 8080 })
        );
        assert!(t.needs_ingress_controller());
        assert_eq!(t.group().name, "shop");
    }

    #[test]
    fn test_ports_directive_is_idempotent() {
        let service = directives("ports: [\"8080:80\", \"8080:80\"]\n");
        let mut t = translator(service.clone());

        t.compile_deployment().unwrap();
        t.parse_ports(&service, "ports").unwrap();
        t.compile_deployment().unwrap();

        assert_eq!(t.service().unwrap().ports().len(), 1);
        assert_eq!(t.deployment().container().ports.len(), 1);
    }

    #[test]
    fn test_port_names_are_unique() {
        let mut t = translator(directives("ports: [\"80:8080\", \"80:9090\"]\n"));
        t.compile_deployment().unwrap();

        let names: Vec<&str> = t
            .service()
            .unwrap()
            .ports()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(names, vec!["port-80", "port-80-1"]);
    }

    #[test]
    fn test_ingress_host_union() {
        let t = translator(directives(
            r#"
labels:
  - 'com.microsoft.acs.kubernetes.vhosts=["a.example.com:80", "b.example.com:81"]'
  - com.microsoft.acs.kubernetes.vhost=a.example.com:82
"#,
        ));

        let ingress = t.ingress().unwrap();
        assert_eq!(ingress.rules().len(), 2);
        assert_eq!(ingress.rules()[0].host, "a.example.com");
        assert_eq!(ingress.rules()[0].http.paths.len(), 2);
        assert_eq!(ingress.rules()[1].host, "b.example.com");
        assert_eq!(ingress.rules()[1].http.paths.len(), 1);
    }

    #[test]
    fn test_environment_list_form() {
        let mut t = translator(directives("environment: [\"FOO=bar\", \"BAZ\", \"URL=a=b\"]\n"));

        assert_eq!(
            container(&mut t)["env"],
            json!([
                { "name": "FOO", "value": "bar" },
                { "name": "BAZ", "value": "" },
                { "name": "URL", "value": "a=b" }
            ])
        );
    }

    #[test]
    fn test_environment_mapping_form() {
        let mut t = translator(directives("environment:\n  FOO: bar\n  BAZ:\n  PORT: 8080\n"));

        assert_eq!(
            container(&mut t)["env"],
            json!([
                { "name": "FOO", "value": "bar" },
                { "name": "BAZ", "value": "" },
                { "name": "PORT", "value": "8080" }
            ])
        );
    }

    #[test]
    fn test_environment_keeps_duplicates() {
        let mut t = translator(directives("environment: [\"A=1\", \"A=2\"]\n"));
        assert_eq!(container(&mut t)["env"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_vhost_labels_are_not_copied() {
        let mut t = translator(directives(
            r#"
labels:
  - COM.MICROSOFT.ACS.KUBERNETES.VHOST.somehost=somehost.example.com
  - com.microsoft.acs.kubernetes.vhost=www.example.com
  - team=payments
  - canary
"#,
        ));
        t.compile_deployment().unwrap();

        let labels = t.deployment().labels();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels[SERVICE_NAME_LABEL], "web");
        assert_eq!(labels["team"], "payments");
        assert_eq!(labels["canary"], "");
        assert!(labels.keys().all(|k| !k.to_lowercase().contains("vhost")));
    }

    #[test]
    fn test_mapping_labels_without_value() {
        let mut t = translator(directives("labels:\n  canary:\n  tier: web\n"));
        t.compile_deployment().unwrap();

        let labels = t.deployment().labels();
        assert_eq!(labels["canary"], "");
        assert_eq!(labels["tier"], "web");
        assert_eq!(labels[SERVICE_NAME_LABEL], "web");
    }

    #[test]
    fn test_merged_anchor_directives_translate() {
        let file = ComposeParser::parse_str(
            r#"
x-common: &common
  environment: [MODE=prod]
  ports: ["8080:80"]
services:
  web:
    <<: *common
    image: nginx
"#,
        )
        .unwrap();

        let services =
            translate_project(&file, &RegistryInfo::default(), &GroupInfo::new("app")).unwrap();
        let web = &services[0];

        assert_eq!(web.deployment.container().env, vec![EnvVar::new("MODE", "prod")]);
        let service = web.service.as_ref().unwrap();
        assert_eq!(service.ports()[0].target_port, 80);
        assert_eq!(service.ports()[0].port, 8080);
    }

    #[test]
    fn test_absent_service_and_ingress() {
        let mut t = translator(directives("image: nginx\nlabels:\n  tier: web\n"));
        t.compile_deployment().unwrap();

        assert_eq!(t.service_manifest().unwrap(), None);
        assert_eq!(t.ingress_manifest().unwrap(), None);
        assert!(!t.needs_ingress_controller());
    }

    #[test]
    fn test_unknown_directive_is_a_noop() {
        let mut t = ManifestTranslator::new(
            GroupInfo::default(),
            RegistryInfo::new("registry.example.com"),
            "web",
            directives("healthcheck:\n  test: [\"CMD\", \"true\"]\n"),
        )
        .unwrap();

        let mut expected = DeploymentManifest::new("web");
        expected.add_image_pull_secret("registry.example.com");

        assert_eq!(t.compile_deployment().unwrap(), &expected);
        assert!(!is_supported_directive("healthcheck"));
    }

    #[test]
    fn test_compile_runs_once() {
        let mut t = ManifestTranslator::new(
            GroupInfo::default(),
            RegistryInfo::new("registry.example.com"),
            "web",
            directives("environment: [\"A=1\"]\n"),
        )
        .unwrap();

        t.compile_deployment().unwrap();
        t.compile_deployment().unwrap();

        assert_eq!(t.deployment().image_pull_secrets().count(), 1);
        assert_eq!(t.deployment().container().env.len(), 1);
    }

    #[test]
    fn test_malformed_directives_fail() {
        let mut t = translator(directives("environment: FOO=bar\n"));
        assert!(matches!(
            t.compile_deployment(),
            Err(KubeformError::MalformedDirective { .. })
        ));
        assert!(t.deployment().container().env.is_empty());

        let mut t = translator(directives("labels: just-a-string\n"));
        assert!(t.compile_deployment().is_err());

        let mut t = translator(directives("image: [a, b]\n"));
        assert!(t.compile_deployment().is_err());
    }

    #[test]
    fn test_empty_values_are_noops() {
        let mut t = translator(directives("image: \"\"\nenvironment:\nlabels:\n"));
        let deployment = t.compile_deployment().unwrap();

        assert_eq!(deployment, &DeploymentManifest::new("web"));
    }

    #[test]
    fn test_translate_project() {
        let file = ComposeParser::parse_str(
            r#"
services:
  web:
    image: nginx
    ports: ["80"]
    labels: ["com.microsoft.acs.kubernetes.vhost=www.example.com"]
  worker:
    image: worker
"#,
        )
        .unwrap();

        let services =
            translate_project(&file, &RegistryInfo::default(), &GroupInfo::new("app")).unwrap();

        assert_eq!(services.len(), 2);
        assert_eq!(services[0].name, "web");
        assert!(services[0].service.is_some());
        assert!(services[0].needs_ingress_controller);
        let ingress = services[0].ingress.as_ref().unwrap();
        assert_eq!(ingress.rules()[0].http.paths[0].backend.service_port, 80);
        assert_eq!(services[1].name, "worker");
        assert!(services[1].service.is_none());
        assert!(services[1].ingress.is_none());
    }
}
