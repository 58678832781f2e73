//! Core modules for the RAAS integrity engine.
//!
//! The hierarchy-and-dependency engine lives here: codec, graph store,
//! validator, mutation engine, and the shared primitives they sit on.

pub mod broker;
pub mod codec;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod graph;
pub mod model;
pub mod output;
pub mod schemas;
pub mod store;
pub mod template;
pub mod validate;
