//! Scribe Core
//!
//! Core types and abstractions for the scribe report-generation engine.
//!
//! This crate contains:
//! - Domain types: jobs, execution records, pipeline specifications
//! - Stage result types: processor output, LLM enrichment, template context
//! - The engine-wide error taxonomy

pub mod domain;
pub mod error;

pub use error::{EngineError, Result};
