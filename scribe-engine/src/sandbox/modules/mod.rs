//! Capability modules registered into the processor sandbox
//!
//! Each module owns the resource it exposes and implements
//! [`scribe_lua::SandboxModule`]; the script sees only the registered
//! global table.

pub mod bundle;
pub mod cache;
pub mod files;
pub mod log;

pub use bundle::BundleModule;
pub use cache::CacheModule;
pub use files::FilesModule;
pub use log::LogModule;
