pub use crate::errors::{ErrorContext, ErrorKind, LuapreError, SourceContext};

pub mod cli;
pub mod engine;
pub mod errors;
pub mod runtime;
pub mod serialize;
pub mod syntax;
pub mod transpiler;
