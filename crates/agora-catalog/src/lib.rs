//! Agora — Scenario Catalog.
//!
//! A static, read-only table of scenario definitions loaded once at startup
//! from Markdown documents with YAML front matter. Nothing here mutates after
//! loading.

pub mod application;
pub mod domain;

pub use application::catalog::ScenarioCatalog;
pub use application::loader::CatalogError;
pub use domain::scenario::{ActionSpec, Scenario, Scene};
