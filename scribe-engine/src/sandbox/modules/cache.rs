//! Cache module
//!
//! Pipeline-scoped cache accessor. Keys are prefixed with the pipeline
//! path before they reach the shared store, so scripts under different
//! pipelines can never collide.

use crate::cache::ScopedCache;
use mlua::prelude::*;
use scribe_lua::SandboxModule;
use std::time::Duration;

pub struct CacheModule {
    cache: ScopedCache,
}

impl CacheModule {
    pub fn new(cache: ScopedCache) -> Self {
        Self { cache }
    }
}

impl SandboxModule for CacheModule {
    fn id(&self) -> &'static str {
        "cache"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        // cache.get(key) -> value | nil
        let cache = self.cache.clone();
        table.set(
            "get",
            lua.create_function(move |lua, key: String| match cache.get(&key) {
                Some(value) => lua.to_value(&value),
                None => Ok(LuaValue::Nil),
            })?,
        )?;

        // cache.set(key, value, ttl_secs?)
        let cache = self.cache.clone();
        table.set(
            "set",
            lua.create_function(
                move |lua, (key, value, ttl_secs): (String, LuaValue, Option<u64>)| {
                    let json: serde_json::Value = lua.from_value(value)?;
                    cache.set(&key, json, ttl_secs.map(Duration::from_secs));
                    Ok(())
                },
            )?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}
