pub mod export;
pub mod project;

pub use export::{hex_dump, intel_hex, Report};
pub use project::{load_catalog, load_config, Project};
