//! Log module
//!
//! Gives processor scripts a structured logger. Entries land in the
//! engine's tracing output tagged with the owning execution id.

use mlua::prelude::*;
use scribe_lua::SandboxModule;
use uuid::Uuid;

pub struct LogModule {
    execution_id: Uuid,
}

impl LogModule {
    pub fn new(execution_id: Uuid) -> Self {
        Self { execution_id }
    }
}

impl SandboxModule for LogModule {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        let id = self.execution_id;
        table.set(
            "debug",
            lua.create_function(move |_, msg: String| {
                tracing::debug!(execution = %id, "{msg}");
                Ok(())
            })?,
        )?;

        let id = self.execution_id;
        table.set(
            "info",
            lua.create_function(move |_, msg: String| {
                tracing::info!(execution = %id, "{msg}");
                Ok(())
            })?,
        )?;

        let id = self.execution_id;
        table.set(
            "warn",
            lua.create_function(move |_, msg: String| {
                tracing::warn!(execution = %id, "{msg}");
                Ok(())
            })?,
        )?;

        let id = self.execution_id;
        table.set(
            "error",
            lua.create_function(move |_, msg: String| {
                tracing::error!(execution = %id, "{msg}");
                Ok(())
            })?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scribe_lua::create_sandbox;

    #[test]
    fn test_log_levels_are_callable() {
        let lua = create_sandbox().unwrap();
        LogModule::new(Uuid::new_v4()).register(&lua).unwrap();

        lua.load(
            r#"
            log.debug("d")
            log.info("i")
            log.warn("w")
            log.error("e")
            "#,
        )
        .exec()
        .unwrap();
    }
}
