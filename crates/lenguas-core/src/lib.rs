//! Core types, config, errors, language catalog, and wire protocol for Lenguas.

pub mod config;
pub mod error;
pub mod languages;
pub mod protocol;
pub mod session;
