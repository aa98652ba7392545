//! Catalog loading and lookup.

pub mod catalog;
pub mod loader;
