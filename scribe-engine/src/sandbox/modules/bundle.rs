//! Bundle module
//!
//! Lets a processor script persist intermediate data as a durable bundle
//! artifact under the pipeline's `output/bundles/` directory. Paths are
//! addressed by execution id, so retries overwrite idempotently.

use mlua::prelude::*;
use scribe_lua::SandboxModule;
use std::path::PathBuf;
use uuid::Uuid;

pub struct BundleModule {
    bundles_dir: PathBuf,
    execution_id: Uuid,
}

impl BundleModule {
    pub fn new(bundles_dir: PathBuf, execution_id: Uuid) -> Self {
        Self {
            bundles_dir,
            execution_id,
        }
    }
}

impl SandboxModule for BundleModule {
    fn id(&self) -> &'static str {
        "bundle"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let table = lua.create_table()?;

        let bundles_dir = self.bundles_dir.clone();
        let execution_id = self.execution_id;
        table.set(
            "save",
            lua.create_function(
                move |lua, (data, filename): (LuaValue, Option<String>)| {
                    let filename = match filename {
                        Some(name) => {
                            if name.contains(['/', '\\']) || name.contains("..") {
                                return Err(LuaError::RuntimeError(format!(
                                    "invalid bundle filename \"{name}\""
                                )));
                            }
                            name
                        }
                        None => format!("{execution_id}.json"),
                    };

                    let json: serde_json::Value = lua.from_value(data)?;
                    let pretty = serde_json::to_string_pretty(&json)
                        .map_err(LuaError::external)?;

                    std::fs::create_dir_all(&bundles_dir).map_err(LuaError::external)?;
                    let path = bundles_dir.join(filename);
                    std::fs::write(&path, pretty).map_err(LuaError::external)?;

                    Ok(path.to_string_lossy().to_string())
                },
            )?,
        )?;

        lua.globals().set(self.id(), table)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::PipelineFixture;
    use scribe_lua::create_sandbox;
    use serde_json::json;

    #[test]
    fn test_save_writes_json_addressed_by_execution_id() {
        let fixture = PipelineFixture::demo();
        let execution_id = Uuid::new_v4();
        let bundles_dir = fixture.dir("demo").join("output").join("bundles");

        let lua = create_sandbox().unwrap();
        BundleModule::new(bundles_dir.clone(), execution_id)
            .register(&lua)
            .unwrap();

        let path: String = lua
            .load(r#"return bundle.save({ topic = "AI" })"#)
            .eval()
            .unwrap();
        assert!(path.ends_with(&format!("{execution_id}.json")));

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"topic": "AI"}));
    }

    #[test]
    fn test_save_accepts_an_explicit_filename() {
        let fixture = PipelineFixture::demo();
        let bundles_dir = fixture.dir("demo").join("output").join("bundles");

        let lua = create_sandbox().unwrap();
        BundleModule::new(bundles_dir.clone(), Uuid::new_v4())
            .register(&lua)
            .unwrap();

        let path: String = lua
            .load(r#"return bundle.save({ n = 1 }, "snapshot.json")"#)
            .eval()
            .unwrap();
        assert!(path.ends_with("snapshot.json"));
        assert!(bundles_dir.join("snapshot.json").exists());
    }

    #[test]
    fn test_filename_cannot_escape_the_bundles_dir() {
        let fixture = PipelineFixture::demo();
        let lua = create_sandbox().unwrap();
        BundleModule::new(
            fixture.dir("demo").join("output").join("bundles"),
            Uuid::new_v4(),
        )
        .register(&lua)
        .unwrap();

        let result = lua
            .load(r#"return bundle.save({}, "../escape.json")"#)
            .eval::<String>();
        assert!(result.is_err());
    }
}
