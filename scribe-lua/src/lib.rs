//! Scribe Lua Infrastructure
//!
//! This crate provides the restricted Lua environment that pipeline
//! processor scripts run in. It includes:
//! - Module trait for capability registration
//! - Sandbox construction with a minimal standard library
//! - Processor script loading and contract conversion
//!
//! Capability module implementations (cache, files, bundle, log) live with
//! the engine, which owns the resources they expose.

pub mod module;
pub mod processor;
pub mod sandbox;

pub use module::SandboxModule;
pub use processor::{ProcessorError, run_processor};
pub use sandbox::create_sandbox;
