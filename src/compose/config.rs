//! Compose service directive types

use crate::error::{KubeformError, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

/// Value of a single compose directive
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveValue {
    /// Plain scalar (`image: nginx`)
    Scalar(String),
    /// Sequence of scalars (`environment: ["A=1"]`)
    List(Vec<String>),
    /// Mapping of scalar keys to scalar or null values, in source order
    Map(Vec<(String, Option<String>)>),
    /// Any other shape, kept verbatim
    Nested(Value),
}

impl DirectiveValue {
    /// Create a scalar value
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Create a list value
    pub fn list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Create a mapping value
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.map(Into::into)))
                .collect(),
        )
    }

    /// Scalar text, if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Whether the directive was written without a value (`environment:`)
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Nested(Value::Null))
    }

    /// Short shape name used in diagnostics
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::Map(_) => "mapping",
            Self::Nested(_) => "nested value",
        }
    }

    /// Rewrite every string held by this value in place
    pub fn rewrite_strings<F>(&mut self, f: &mut F)
    where
        F: FnMut(&str) -> String,
    {
        match self {
            Self::Scalar(s) => *s = f(s),
            Self::List(items) => {
                for item in items.iter_mut() {
                    *item = f(item);
                }
            }
            Self::Map(entries) => {
                for value in entries.iter_mut().filter_map(|(_, v)| v.as_mut()) {
                    *value = f(value);
                }
            }
            Self::Nested(value) => rewrite_yaml_strings(value, f),
        }
    }
}

fn rewrite_yaml_strings<F>(value: &mut Value, f: &mut F)
where
    F: FnMut(&str) -> String,
{
    match value {
        Value::String(s) => *s = f(s),
        Value::Sequence(seq) => {
            for item in seq.iter_mut() {
                rewrite_yaml_strings(item, f);
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                rewrite_yaml_strings(item, f);
            }
        }
        Value::Tagged(tagged) => rewrite_yaml_strings(&mut tagged.value, f),
        _ => {}
    }
}

/// Textual form of a YAML scalar
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl From<Value> for DirectiveValue {
    fn from(value: Value) -> Self {
        if let Some(text) = scalar_text(&value) {
            return Self::Scalar(text);
        }

        let flat = match &value {
            Value::Sequence(seq) => seq
                .iter()
                .map(scalar_text)
                .collect::<Option<Vec<_>>>()
                .map(Self::List),
            Value::Mapping(map) => flat_entries(map).map(Self::Map),
            _ => None,
        };
        flat.unwrap_or(Self::Nested(value))
    }
}

/// Entries of a mapping whose keys and values are all scalars (or null values)
fn flat_entries(map: &Mapping) -> Option<Vec<(String, Option<String>)>> {
    map.iter()
        .map(|(k, v)| {
            let key = scalar_text(k)?;
            match v {
                Value::Null => Some((key, None)),
                other => scalar_text(other).map(|text| (key, Some(text))),
            }
        })
        .collect()
}

/// One service's directives, in the order they appear in the compose file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceDirectives {
    entries: Vec<(String, DirectiveValue)>,
}

impl ServiceDirectives {
    /// Create an empty directive set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a directive, replacing any existing value under the same name
    pub fn insert(&mut self, name: impl Into<String>, value: DirectiveValue) {
        let name = name.into();
        if let Some(slot) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.entries.push((name, value));
        }
    }

    /// Look up a directive by name
    pub fn get(&self, name: &str) -> Option<&DirectiveValue> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Check whether a directive is present
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Directive names in source order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Directives in source order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DirectiveValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Mutable access to every directive value
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut DirectiveValue> {
        self.entries.iter_mut().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>> FromIterator<(S, DirectiveValue)> for ServiceDirectives {
    fn from_iter<I: IntoIterator<Item = (S, DirectiveValue)>>(iter: I) -> Self {
        let mut directives = Self::new();
        for (name, value) in iter {
            directives.insert(name, value);
        }
        directives
    }
}

impl TryFrom<Value> for ServiceDirectives {
    type Error = KubeformError;

    fn try_from(mut value: Value) -> Result<Self> {
        value.apply_merge()?;

        match value {
            Value::Null => Ok(Self::new()),
            Value::Mapping(map) => {
                let mut directives = Self::new();
                for (key, value) in map {
                    let name = scalar_text(&key).ok_or_else(|| {
                        KubeformError::ComposeParse(format!(
                            "directive names must be strings, found {:?}",
                            key
                        ))
                    })?;
                    directives.insert(name, DirectiveValue::from(value));
                }
                Ok(directives)
            }
            other => Err(KubeformError::ComposeParse(format!(
                "service definition must be a mapping, found {:?}",
                other
            ))),
        }
    }
}

/// Private image registry the workload pulls from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryInfo {
    /// Registry host; also the name of the image pull secret
    #[serde(default)]
    pub host: Option<String>,
}

impl RegistryInfo {
    /// Create registry info for a host
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
        }
    }
}

/// Deployment group the service belongs to (passed through untouched)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    /// Group name
    pub name: String,
    /// Optional qualifier distinguishing deployments of the same group
    #[serde(default)]
    pub qualifier: Option<String>,
}

impl GroupInfo {
    /// Create group info with just a name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualifier: None,
        }
    }
}

/// Port entry in the `ports` directive
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortEntry {
    /// Short syntax: "8080:80"
    Short(String),
    /// Bare number: 80
    Number(u16),
    /// Long syntax
    Long(PortEntryLong),
}

/// Long port entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortEntryLong {
    /// Target port in container
    pub target: u16,
    /// Published port, number or range text
    #[serde(default)]
    pub published: Option<PublishedPort>,
    /// Host IP to bind to
    #[serde(default)]
    pub host_ip: Option<String>,
    /// Protocol (tcp/udp)
    #[serde(default)]
    pub protocol: Option<String>,
    /// Mode (host/ingress)
    #[serde(default)]
    pub mode: Option<String>,
}

/// Published side of a long port entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PublishedPort {
    Number(u16),
    Text(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_value_shapes() {
        let yaml: Value = serde_yaml::from_str(
            r#"
image: nginx
replicas: 3
environment:
  - FOO=bar
labels:
  a: b
  c:
deploy:
  resources:
    limits:
      cpus: "0.5"
"#,
        )
        .unwrap();

        let directives = ServiceDirectives::try_from(yaml).unwrap();
        assert_eq!(
            directives.keys().collect::<Vec<_>>(),
            vec!["image", "replicas", "environment", "labels", "deploy"]
        );
        assert_eq!(directives.get("image"), Some(&DirectiveValue::scalar("nginx")));
        assert_eq!(directives.get("replicas"), Some(&DirectiveValue::scalar("3")));
        assert_eq!(
            directives.get("environment"),
            Some(&DirectiveValue::list(["FOO=bar"]))
        );
        assert_eq!(
            directives.get("labels"),
            Some(&DirectiveValue::map([("a", Some("b")), ("c", None)]))
        );
        assert!(matches!(
            directives.get("deploy"),
            Some(DirectiveValue::Nested(_))
        ));
    }

    #[test]
    fn test_service_body_must_be_mapping() {
        let yaml: Value = serde_yaml::from_str("- just\n- a list\n").unwrap();
        assert!(ServiceDirectives::try_from(yaml).is_err());

        let empty = ServiceDirectives::try_from(Value::Null).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_merge_keys_in_service_body() {
        let yaml: Value = serde_yaml::from_str(
            r#"
<<:
  image: base
  expose: ["80"]
image: nginx
"#,
        )
        .unwrap();

        let directives = ServiceDirectives::try_from(yaml).unwrap();
        assert_eq!(directives.len(), 2);
        assert_eq!(directives.get("image"), Some(&DirectiveValue::scalar("nginx")));
        assert_eq!(directives.get("expose"), Some(&DirectiveValue::list(["80"])));
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut directives: ServiceDirectives = [
            ("image", DirectiveValue::scalar("a")),
            ("expose", DirectiveValue::list(["80"])),
        ]
        .into_iter()
        .collect();

        directives.insert("image", DirectiveValue::scalar("b"));
        assert_eq!(directives.len(), 2);
        assert_eq!(directives.keys().next(), Some("image"));
        assert_eq!(directives.get("image").and_then(|v| v.as_scalar()), Some("b"));
    }

    #[test]
    fn test_rewrite_strings_reaches_nested_values() {
        let mut value = DirectiveValue::from(
            serde_yaml::from_str::<Value>("- target: 80\n  host_ip: x\n").unwrap(),
        );
        value.rewrite_strings(&mut |s: &str| s.to_uppercase());

        let DirectiveValue::Nested(Value::Sequence(seq)) = value else {
            panic!("expected nested sequence");
        };
        assert_eq!(seq[0]["host_ip"], Value::String("X".to_string()));
    }
}
