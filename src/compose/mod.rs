//! Docker Compose input
//!
//! This module loads compose files and exposes each service's directives,
//! along with the port and virtual host extraction the translator relies on.

pub mod config;
pub mod parser;
pub mod ports;

pub use config::{DirectiveValue, GroupInfo, RegistryInfo, ServiceDirectives};
pub use parser::{ComposeFile, ComposeParser};
pub use ports::PortDirectiveParser;
