//! Capability module trait
//!
//! Processor scripts get no ambient authority; every capability (cache,
//! scoped file access, bundle persistence, logging) is a module the engine
//! registers into the sandbox before the script runs.

use mlua::{Lua, Result as LuaResult};

/// A capability injected into the processor sandbox.
///
/// Implementations create a table of functions and set it as a global
/// named by `id()`. The module owns whatever resource it exposes; the
/// script only ever sees the table.
pub trait SandboxModule: Send + Sync {
    /// Global variable name the module is registered under.
    ///
    /// Must be a valid Lua identifier, unique across registered modules,
    /// lowercase by convention.
    fn id(&self) -> &'static str;

    /// Registers this module's functions into the Lua context.
    fn register(&self, lua: &Lua) -> LuaResult<()>;
}

/// Registers a set of modules into a sandbox, in order.
pub fn register_modules(lua: &Lua, modules: &[&dyn SandboxModule]) -> LuaResult<()> {
    for module in modules {
        module.register(lua)?;
    }
    Ok(())
}
