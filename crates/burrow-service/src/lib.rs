//! REST service adapter and registry (spec.md §4.1, §4.2).

pub mod config;
pub mod registry;
pub mod rest;

pub use config::{AuthMethod, ParamConfig, ParamLocation, ServiceConfig, ToolConfig};
pub use registry::ServiceRegistry;
pub use rest::RestService;
