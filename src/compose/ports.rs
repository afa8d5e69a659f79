//! Port and virtual host extraction from service directives
//!
//! Turns the `ports`, `expose` and vhost `labels` directives of one service
//! into `(container_port, exposed_port)` pairs and `(hostname, port)` routes.
//! Nothing here fails: entries that cannot be understood are logged and
//! skipped so the rest of the service still translates.

use super::config::{DirectiveValue, PortEntry, PublishedPort, ServiceDirectives};
use regex::Regex;
use serde_yaml::Value;
use std::ops::RangeInclusive;
use std::sync::OnceLock;

/// Label prefix marking virtual host declarations (compared case-insensitively)
pub const VHOST_LABEL_PREFIX: &str = "com.microsoft.acs.kubernetes.vhost";

/// Service port used for a virtual host when nothing else is known
pub const DEFAULT_VHOST_PORT: u16 = 80;

/// `(container_port, exposed_port)`
pub type PortPair = (u16, u16);

fn short_port_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            concat!(
                r"^(?:(?:(?P<ip>\[[0-9A-Fa-f:.]+\]|[^:\[\]]+):)?(?P<host>\d*(?:-\d+)?):)?",
                r"(?P<container>\d+(?:-\d+)?)(?:/(?P<proto>[A-Za-z]+))?$",
            ),
        )
        .expect("port pattern is valid")
    })
}

/// Extracts ports and virtual hosts from one service's directives
pub struct PortDirectiveParser<'a> {
    directives: &'a ServiceDirectives,
}

impl<'a> PortDirectiveParser<'a> {
    /// Bind a parser to a service's directives
    pub fn new(directives: &'a ServiceDirectives) -> Self {
        Self { directives }
    }

    /// Pairs from the `ports` directive; the host port becomes the exposed port
    pub fn published_ports(&self) -> Vec<PortPair> {
        let Some(value) = self.directives.get("ports") else {
            return Vec::new();
        };

        let entries: Vec<PortEntry> = match value {
            DirectiveValue::Scalar(s) => vec![PortEntry::Short(s.clone())],
            DirectiveValue::List(items) => items.iter().cloned().map(PortEntry::Short).collect(),
            DirectiveValue::Nested(Value::Sequence(items)) => items
                .iter()
                .filter_map(|item| match serde_yaml::from_value(item.clone()) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!("Skipping unreadable port entry {:?}: {}", item, e);
                        None
                    }
                })
                .collect(),
            DirectiveValue::Nested(other) => {
                tracing::warn!("Ignoring unreadable 'ports' directive: {:?}", other);
                return Vec::new();
            }
            DirectiveValue::Map(_) => {
                tracing::warn!("Ignoring 'ports' directive given as a mapping");
                return Vec::new();
            }
        };

        entries.iter().flat_map(port_entry_pairs).collect()
    }

    /// Pairs from the `expose` directive; container and exposed port are equal
    pub fn exposed_ports(&self) -> Vec<PortPair> {
        let items: Vec<&str> = match self.directives.get("expose") {
            None => return Vec::new(),
            Some(DirectiveValue::Scalar(s)) => vec![s.as_str()],
            Some(DirectiveValue::List(items)) => items.iter().map(String::as_str).collect(),
            Some(other) => {
                tracing::warn!("Ignoring 'expose' directive given as a {}", other.shape());
                return Vec::new();
            }
        };

        let mut pairs = Vec::new();
        for item in items {
            let spec = item.split('/').next().unwrap_or_default().trim();
            match parse_range(spec) {
                Some(range) => pairs.extend(range.map(|port| (port, port))),
                None => tracing::warn!("Skipping invalid expose entry '{}'", item),
            }
        }
        pairs
    }

    /// Every `(hostname, service_port)` route declared through vhost labels, in
    /// declaration order. A host may appear more than once.
    pub fn virtual_hosts(&self) -> Vec<(String, u16)> {
        let labels: Vec<(&str, &str)> = match self.directives.get("labels") {
            Some(DirectiveValue::List(items)) => items
                .iter()
                .map(|item| item.split_once('=').unwrap_or((item.as_str(), "")))
                .collect(),
            Some(DirectiveValue::Map(entries)) => entries
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_deref().unwrap_or_default()))
                .collect(),
            _ => return Vec::new(),
        };

        let mut default_port = None;
        let mut routes = Vec::new();

        for (name, value) in labels {
            if !is_vhost_label(name) {
                continue;
            }

            for spec in vhost_specs(name, value) {
                let (host, port) = match spec.rsplit_once(':') {
                    Some((host, port)) => match port.parse::<u16>() {
                        Ok(port) if port > 0 => (host.trim(), Some(port)),
                        _ => {
                            tracing::warn!("Skipping vhost '{}' with invalid port", spec);
                            continue;
                        }
                    },
                    None => (spec.trim(), None),
                };

                if host.is_empty() {
                    tracing::warn!("Skipping vhost label '{}' without a host name", name);
                    continue;
                }

                let port = port.unwrap_or_else(|| {
                    *default_port.get_or_insert_with(|| self.default_vhost_port())
                });
                routes.push((host.to_string(), port));
            }
        }

        routes
    }

    /// First exposed service port, falling back to [`DEFAULT_VHOST_PORT`]
    fn default_vhost_port(&self) -> u16 {
        let first_exposed = |pairs: Vec<PortPair>| pairs.first().map(|&(_, exposed)| exposed);

        first_exposed(self.published_ports())
            .or_else(|| first_exposed(self.exposed_ports()))
            .unwrap_or(DEFAULT_VHOST_PORT)
    }
}

/// Check whether a label name declares a virtual host
pub fn is_vhost_label(name: &str) -> bool {
    name.len() >= VHOST_LABEL_PREFIX.len()
        && name.is_char_boundary(VHOST_LABEL_PREFIX.len())
        && name[..VHOST_LABEL_PREFIX.len()].eq_ignore_ascii_case(VHOST_LABEL_PREFIX)
}

/// Host specs carried by one vhost label value
fn vhost_specs(name: &str, value: &str) -> Vec<String> {
    let value = value.trim();
    if !value.starts_with('[') {
        return vec![value.to_string()];
    }

    match serde_json::from_str::<Vec<String>>(value) {
        Ok(specs) => specs,
        Err(e) => {
            tracing::warn!("Skipping vhost label '{}': {}", name, e);
            Vec::new()
        }
    }
}

fn port_entry_pairs(entry: &PortEntry) -> Vec<PortPair> {
    match entry {
        PortEntry::Number(port) if *port > 0 => vec![(*port, *port)],
        PortEntry::Number(_) => {
            tracing::warn!("Skipping port entry 0");
            Vec::new()
        }
        PortEntry::Short(spec) => parse_short_port(spec).unwrap_or_else(|| {
            tracing::warn!("Skipping invalid port entry '{}'", spec);
            Vec::new()
        }),
        PortEntry::Long(long) => {
            if long.target == 0 {
                tracing::warn!("Skipping long port entry without a target");
                return Vec::new();
            }
            let published = match &long.published {
                None => None,
                Some(PublishedPort::Number(port)) => Some(*port..=*port),
                Some(PublishedPort::Text(text)) if text.is_empty() => None,
                Some(PublishedPort::Text(text)) => match parse_range(text) {
                    Some(range) => Some(range),
                    None => {
                        tracing::warn!("Skipping port entry with published '{}'", text);
                        return Vec::new();
                    }
                },
            };
            let exposed = published.map(|r| *r.start()).unwrap_or(long.target);
            vec![(long.target, exposed)]
        }
    }
}

/// Parse `[ip:][host[-end]:]container[-end][/protocol]`
fn parse_short_port(spec: &str) -> Option<Vec<PortPair>> {
    let caps = short_port_pattern().captures(spec.trim())?;

    if let Some(proto) = caps.name("proto") {
        if !proto.as_str().eq_ignore_ascii_case("tcp") {
            tracing::debug!(
                "Protocol '{}' of port '{}' is published as TCP",
                proto.as_str(),
                spec
            );
        }
    }

    let container: Vec<u16> = parse_range(caps.name("container")?.as_str())?.collect();
    let host: Option<Vec<u16>> = match caps.name("host").map(|m| m.as_str()) {
        None | Some("") => None,
        Some(host) => Some(parse_range(host)?.collect()),
    };

    match host {
        None => Some(container.into_iter().map(|port| (port, port)).collect()),
        Some(host) if host.len() == container.len() => {
            Some(container.into_iter().zip(host).collect())
        }
        // a single container port may be published on the first port of a host range
        Some(host) if container.len() == 1 => Some(vec![(container[0], host[0])]),
        Some(_) => None,
    }
}

/// Parse `port` or `start-end` into an inclusive range of non-zero ports
fn parse_range(spec: &str) -> Option<RangeInclusive<u16>> {
    let (start, end) = match spec.split_once('-') {
        Some((start, end)) => (start.trim().parse().ok()?, end.trim().parse().ok()?),
        None => {
            let port = spec.trim().parse().ok()?;
            (port, port)
        }
    };

    if start == 0 || end < start {
        return None;
    }
    Some(start..=end)
}
