//! The embedded host runtime.
//!
//! The preprocessor core produces a metaprogram as text; running it is the
//! host language's job. This module wraps one embedded Lua state for the
//! whole run and provides everything the driver needs from it: per-file
//! metaprogram environments with the sink functions and helpers installed,
//! compile checks for construct classification and output validation, the
//! message-handler protocol, and the saveinfo timestamp.
//!
//! Environments are rebuilt fresh per file by shallow-copying the
//! interpreter globals, so mutations by one file's metaprogram never leak
//! into another.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use mlua::{Function, Lua, RegistryKey, Table, Value, Variadic};

use crate::errors::{ErrorKind, LuapreError};
use crate::serialize::serialize;
use crate::transpiler::ChunkChecker;

/// A per-file metaprogram environment plus its output buffer.
pub struct FileEnv {
    env: RegistryKey,
    buffer: Rc<RefCell<String>>,
}

impl FileEnv {
    /// Take the accumulated sink output, leaving the buffer empty.
    pub fn take_output(&self) -> String {
        self.buffer.borrow_mut().split_off(0)
    }
}

/// One embedded Lua state servicing a whole preprocessor run.
pub struct MetaRuntime {
    lua: Lua,
    handler: Option<RegistryKey>,
}

impl MetaRuntime {
    pub fn new() -> Self {
        Self {
            lua: Lua::new(),
            handler: None,
        }
    }

    // ------------------------------------------------------------------
    // Compile checks
    // ------------------------------------------------------------------

    /// Load `code` as a chunk named `name` without executing it; `Err`
    /// carries the host's own message. Used for output validation.
    pub fn compile_check(&self, code: &str, name: &str) -> Result<(), String> {
        self.lua
            .load(code)
            .set_name(format!("@{}", name))
            .into_function()
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    // ------------------------------------------------------------------
    // Environment construction and metaprogram execution
    // ------------------------------------------------------------------

    /// Build a fresh metaprogram environment: a shallow copy of the
    /// interpreter globals with the sinks and helpers installed on top.
    pub fn build_env(&self) -> Result<FileEnv, LuapreError> {
        self.try_build_env().map_err(|e| runtime_error(e.to_string()))
    }

    fn try_build_env(&self) -> Result<FileEnv, mlua::Error> {
        let env = self.lua.create_table()?;
        for pair in self.lua.globals().pairs::<Value, Value>() {
            let (key, value) = pair?;
            env.set(key, value)?;
        }
        env.set("_G", env.clone())?;

        let buffer = Rc::new(RefCell::new(String::new()));

        let sink = Rc::clone(&buffer);
        let output_lua = self
            .lua
            .create_function(move |_, texts: Variadic<mlua::String>| {
                let mut buf = sink.borrow_mut();
                for text in texts.iter() {
                    buf.push_str(&String::from_utf8_lossy(text.as_bytes()));
                }
                Ok(())
            })?;
        env.set("outputLua", output_lua)?;

        let sink = Rc::clone(&buffer);
        let output_value = self
            .lua
            .create_function(move |_, values: Variadic<Value>| {
                let mut buf = sink.borrow_mut();
                for value in values.iter() {
                    let text =
                        serialize(value).map_err(|e| mlua::Error::RuntimeError(e.to_string()))?;
                    buf.push_str(&text);
                }
                Ok(())
            })?;
        env.set("outputValue", output_value)?;

        let to_lua = self.lua.create_function(|_, value: Value| {
            serialize(&value).map_err(|e| mlua::Error::RuntimeError(e.to_string()))
        })?;
        env.set("toLua", to_lua)?;

        let file_exists = self
            .lua
            .create_function(|_, path: String| Ok(Path::new(&path).exists()))?;
        env.set("fileExists", file_exists)?;

        let get_file_contents = self.lua.create_function(|_, path: String| {
            match fs::read(&path) {
                Ok(bytes) => Ok((Some(String::from_utf8_lossy(&bytes).into_owned()), None)),
                Err(e) => Ok((None, Some(format!("Could not read '{}': {}", path, e)))),
            }
        })?;
        env.set("getFileContents", get_file_contents)?;

        // `run` executes another file inside this same environment, which
        // is how includes re-enter the pipeline.
        let env_key = Arc::new(self.lua.create_registry_value(env.clone())?);
        let run_env = Arc::clone(&env_key);
        let run = self
            .lua
            .create_function(move |lua, path: String| {
                let env: Table = lua.registry_value(&run_env)?;
                let source = fs::read_to_string(&path).map_err(|e| {
                    mlua::Error::RuntimeError(format!("Could not read '{}': {}", path, e))
                })?;
                let chunk = lua
                    .load(source.as_str())
                    .set_name(format!("@{}", path))
                    .set_environment(env)
                    .into_function()?;
                chunk.call::<_, mlua::MultiValue>(())
            })?;
        env.set("run", run)?;

        self.lua
            .load("function printf(s, ...) print(s:format(...)) end")
            .set_environment(env.clone())
            .exec()?;

        let env = self.lua.create_registry_value(env)?;
        Ok(FileEnv { env, buffer })
    }

    /// Execute a metaprogram inside `env`. `chunk_name` should be the path
    /// of the written metaprogram file so the host's error locations point
    /// into it. The error is the host's own message.
    pub fn execute(&self, env: &FileEnv, code: &str, chunk_name: &str) -> Result<(), String> {
        let table: Table = self
            .lua
            .registry_value(&env.env)
            .map_err(|e| e.to_string())?;
        self.lua
            .load(code)
            .set_name(format!("@{}", chunk_name))
            .set_environment(table)
            .exec()
            .map_err(|e| e.to_string())
    }

    // ------------------------------------------------------------------
    // Handler protocol
    // ------------------------------------------------------------------

    /// Load a message handler: the chunk must return a callable.
    pub fn load_handler(&mut self, path: &Path) -> Result<(), LuapreError> {
        let source = fs::read_to_string(path).map_err(|e| {
            io_error(path.to_path_buf(), e.to_string())
        })?;
        let value: Value = self
            .lua
            .load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .eval()
            .map_err(|e| handler_error(e.to_string()))?;
        let Value::Function(callback) = value else {
            return Err(handler_error(format!(
                "'{}' must return a function.",
                path.display()
            )));
        };
        let key = self
            .lua
            .create_registry_value(callback)
            .map_err(|e| handler_error(e.to_string()))?;
        self.handler = Some(key);
        Ok(())
    }

    fn handler_fn(&self) -> Result<Option<Function>, mlua::Error> {
        match &self.handler {
            None => Ok(None),
            Some(key) => Ok(Some(self.lua.registry_value(key)?)),
        }
    }

    /// `("init", paths)` - the handler may add or remove input paths.
    pub fn handler_init(&self, paths: &mut Vec<PathBuf>) -> Result<(), LuapreError> {
        let Some(callback) = self.handler_fn().map_err(|e| handler_error(e.to_string()))?
        else {
            return Ok(());
        };

        let run = || -> mlua::Result<Vec<String>> {
            let list = self.lua.create_table()?;
            for (i, path) in paths.iter().enumerate() {
                list.set(i + 1, path.display().to_string())?;
            }
            callback.call::<_, ()>(("init", list.clone()))?;
            list.sequence_values::<String>().collect()
        };

        let updated = run().map_err(|e| handler_error(e.to_string()))?;
        *paths = updated.into_iter().map(PathBuf::from).collect();
        Ok(())
    }

    /// `("beforemeta", path, env)` - the environment is open for mutation.
    pub fn handler_beforemeta(&self, path: &str, env: &FileEnv) -> Result<(), LuapreError> {
        let run = || -> mlua::Result<()> {
            let Some(callback) = self.handler_fn()? else {
                return Ok(());
            };
            let table: Table = self.lua.registry_value(&env.env)?;
            callback.call::<_, ()>(("beforemeta", path, table))
        };
        run().map_err(|e| handler_error(e.to_string()))
    }

    /// `("aftermeta", path, lua)` - a returned string replaces the output;
    /// any other non-nil return is an error.
    pub fn handler_aftermeta(&self, path: &str, output: String) -> Result<String, LuapreError> {
        let Some(callback) = self.handler_fn().map_err(|e| handler_error(e.to_string()))?
        else {
            return Ok(output);
        };

        let result: Value = callback
            .call(("aftermeta", path, output.as_str()))
            .map_err(|e| handler_error(e.to_string()))?;
        match result {
            Value::Nil => Ok(output),
            Value::String(s) => Ok(String::from_utf8_lossy(s.as_bytes().as_ref()).into_owned()),
            other => Err(handler_error(format!(
                "'aftermeta' returned a value of type '{}'; expected string or nil.",
                other.type_name()
            ))),
        }
    }

    /// `("filedone", path, outputPath)` - informational.
    pub fn handler_filedone(&self, path: &str, output_path: &str) -> Result<(), LuapreError> {
        let run = || -> mlua::Result<()> {
            let Some(callback) = self.handler_fn()? else {
                return Ok(());
            };
            callback.call::<_, ()>(("filedone", path, output_path))
        };
        run().map_err(|e| handler_error(e.to_string()))
    }

    // ------------------------------------------------------------------
    // Saveinfo
    // ------------------------------------------------------------------

    /// Serialized processing-info record: `return { date=…, files={…} }`.
    pub fn saveinfo_source(&self, files: &[(String, bool)]) -> Result<String, LuapreError> {
        let build = || -> mlua::Result<Value> {
            let info = self.lua.create_table()?;
            info.set("date", self.date_string())?;
            let list = self.lua.create_table()?;
            for (i, (path, has_pp)) in files.iter().enumerate() {
                let entry = self.lua.create_table()?;
                entry.set("path", path.as_str())?;
                entry.set("hasPreprocessorCode", *has_pp)?;
                list.set(i + 1, entry)?;
            }
            info.set("files", list)?;
            Ok(Value::Table(info))
        };

        let info = build().map_err(|e| runtime_error(e.to_string()))?;
        let serialized = serialize(&info).map_err(|e| {
            LuapreError::bare(
                ErrorKind::Serialize {
                    message: e.to_string(),
                },
                "serializer",
            )
        })?;
        Ok(format!("return {}\n", serialized))
    }

    /// Timestamp from the host's own clock formatting.
    pub fn date_string(&self) -> String {
        self.lua
            .load(r#"return os.date("%Y-%m-%d %H:%M:%S")"#)
            .eval::<String>()
            .unwrap_or_default()
    }
}

impl Default for MetaRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkChecker for MetaRuntime {
    fn chunk_compiles(&self, chunk: &str) -> bool {
        self.lua.load(chunk).into_function().is_ok()
    }
}

fn runtime_error(message: String) -> LuapreError {
    LuapreError::bare(ErrorKind::MetaExecution { message }, "runtime")
}

fn handler_error(message: String) -> LuapreError {
    LuapreError::bare(ErrorKind::InvalidHandler { message }, "cli")
}

fn io_error(path: PathBuf, message: String) -> LuapreError {
    LuapreError::bare(ErrorKind::Io { path, message }, "io")
}
