//! Engine entry points.

pub mod advancement;
pub mod intake;
pub mod lifecycle;
pub mod query_handlers;
pub mod resolver;
pub mod services;
