//! Engine domain: commands and pure round logic.

pub mod commands;
pub mod round;
