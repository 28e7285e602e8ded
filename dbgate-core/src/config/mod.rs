//! Project configuration: per-project connection settings and the static
//! registry the resolver reads from.

mod project;
mod registry;

pub use project::{PoolSettings, ProjectConfig, ProjectEntry};
pub use registry::{CONFIG_ENV_VAR, ProjectRegistry};
