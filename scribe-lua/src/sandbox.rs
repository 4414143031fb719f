//! Lua sandbox creation
//!
//! Provides a restricted Lua environment that prevents access to dangerous
//! operations: no filesystem I/O, no network, no process execution, no
//! loading of external code. Every capability a processor script gets is
//! injected explicitly by the engine through a [`SandboxModule`].
//!
//! [`SandboxModule`]: crate::module::SandboxModule

use mlua::{Lua, LuaOptions, Result as LuaResult, StdLib};

/// Create a restricted Lua sandbox
///
/// The sandbox includes only basic Lua functionality (tables, strings,
/// math, coroutines) and does NOT include any I/O capability or the
/// ability to load external modules.
///
/// A fresh sandbox is created per execution; nothing evaluated in one run
/// is visible to the next.
pub fn create_sandbox() -> LuaResult<Lua> {
    // Only TABLE, STRING, MATH, COROUTINE.
    // Explicitly excluded: IO, OS, PACKAGE, DEBUG.
    let lua = Lua::new_with(
        StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::COROUTINE,
        LuaOptions::default(),
    )?;

    // Remove code-loading escape hatches
    lua.globals().set("require", mlua::Nil)?;
    lua.globals().set("dofile", mlua::Nil)?;
    lua.globals().set("loadfile", mlua::Nil)?;
    lua.globals().set("load", mlua::Nil)?;

    Ok(lua)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_basic_evaluation() {
        let lua = create_sandbox().unwrap();
        let result: i64 = lua.load("return 40 + 2").eval().unwrap();
        assert_eq!(result, 42);
    }

    #[test]
    fn test_sandbox_has_no_io_or_os() {
        let lua = create_sandbox().unwrap();
        let io_is_nil: bool = lua.load("return io == nil").eval().unwrap();
        let os_is_nil: bool = lua.load("return os == nil").eval().unwrap();
        assert!(io_is_nil);
        assert!(os_is_nil);
    }

    #[test]
    fn test_sandbox_cannot_load_code() {
        let lua = create_sandbox().unwrap();
        for global in ["require", "dofile", "loadfile", "load"] {
            let is_nil: bool = lua
                .load(format!("return {global} == nil"))
                .eval()
                .unwrap();
            assert!(is_nil, "{global} should be stripped from the sandbox");
        }
    }

    #[test]
    fn test_sandbox_keeps_string_and_math() {
        let lua = create_sandbox().unwrap();
        let upper: String = lua.load("return string.upper('ok')").eval().unwrap();
        assert_eq!(upper, "OK");
        let floor: i64 = lua.load("return math.floor(3.7)").eval().unwrap();
        assert_eq!(floor, 3);
    }
}
