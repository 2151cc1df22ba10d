//! The driver: runs the full pipeline over each input file.
//!
//! For every path: read, strip a shebang, lex, transpile, write the
//! metaprogram next to the input, execute it in a fresh environment,
//! delete the metaprogram (unless debugging), let the handler rewrite the
//! output, write the result, and verify it still compiles as host source.
//! Files are processed strictly in the order supplied; the first error
//! aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::output;
use crate::errors::{span_of_line, ErrorContext, ErrorKind, ErrorReporting, LuapreError, SourceContext};
use crate::runtime::MetaRuntime;
use crate::syntax::lex;
use crate::transpiler::{has_preprocessor_code, transpile, TranspileOptions};

/// Run-wide options, mirroring the CLI flags.
#[derive(Debug, Clone)]
pub struct Options {
    pub handler: Option<PathBuf>,
    pub linenumbers: bool,
    pub output_extension: String,
    pub save_info: Option<PathBuf>,
    pub silent: bool,
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            handler: None,
            linenumbers: false,
            output_extension: "lua".to_string(),
            save_info: None,
            silent: true,
            debug: false,
        }
    }
}

/// Per-file processing record, reported through `--saveinfo`.
#[derive(Debug, Clone)]
pub struct FileRecord {
    pub path: PathBuf,
    pub output_path: PathBuf,
    pub has_preprocessor_code: bool,
}

/// Preprocess every path in order. Returns the per-file records on full
/// success; the first failure aborts the run.
pub fn process_paths(paths: &[PathBuf], options: &Options) -> Result<Vec<FileRecord>, LuapreError> {
    let mut runtime = MetaRuntime::new();
    if let Some(handler_path) = &options.handler {
        runtime.load_handler(handler_path)?;
    }

    let mut paths = paths.to_vec();
    runtime.handler_init(&mut paths)?;

    if paths.is_empty() {
        return Err(LuapreError::bare(ErrorKind::NoInputPaths, "cli"));
    }
    for path in &paths {
        if has_extension(path, &options.output_extension) {
            return Err(LuapreError::bare(
                ErrorKind::OutputExtensionCollision {
                    path: path.clone(),
                    extension: options.output_extension.clone(),
                },
                "cli",
            ));
        }
    }

    let mut records = Vec::with_capacity(paths.len());
    for path in &paths {
        let record = process_file(path, options, &runtime)?;
        runtime.handler_filedone(
            &path.display().to_string(),
            &record.output_path.display().to_string(),
        )?;
        records.push(record);
    }

    if let Some(info_path) = &options.save_info {
        let files: Vec<(String, bool)> = records
            .iter()
            .map(|r| (r.path.display().to_string(), r.has_preprocessor_code))
            .collect();
        let info = runtime.saveinfo_source(&files)?;
        fs::write(info_path, info)
            .map_err(|e| io_error(info_path.clone(), e.to_string()))?;
    }

    output::success(options.silent, &format!("All done ({} file(s)).", records.len()));
    Ok(records)
}

fn process_file(
    path: &Path,
    options: &Options,
    runtime: &MetaRuntime,
) -> Result<FileRecord, LuapreError> {
    let name = path.display().to_string();
    output::status(options.silent, &format!("Processing '{}'...", name));

    let raw = fs::read(path).map_err(|e| io_error(path.to_path_buf(), e.to_string()))?;
    let (special_first_line, body) = split_shebang(&raw);

    // The shebang is carried as raw bytes; the lexed body must be UTF-8.
    let source = std::str::from_utf8(body).map_err(|e| {
        io_error(
            path.to_path_buf(),
            format!(
                "file is not valid UTF-8 (at byte {}); only UTF-8-encoded sources are supported",
                special_first_line.len() + e.valid_up_to()
            ),
        )
    })?;

    let tokens = lex(source, &name)?;
    let has_pp = has_preprocessor_code(&tokens);

    let source_ctx = SourceContext::from_file(&name, source);
    let transpile_options = TranspileOptions {
        add_line_numbers: options.linenumbers,
        debug: options.debug,
    };
    let metaprogram = transpile(&tokens, &source_ctx, &transpile_options, runtime)?;

    let meta_path = path.with_extension(format!("meta.{}", options.output_extension));
    let meta_name = meta_path.display().to_string();
    fs::write(&meta_path, &metaprogram)
        .map_err(|e| io_error(meta_path.clone(), e.to_string()))?;

    let env = runtime.build_env()?;
    runtime.handler_beforemeta(&name, &env)?;

    // On failure the metaprogram file stays on disk for inspection.
    runtime
        .execute(&env, &metaprogram, &meta_name)
        .map_err(|message| execution_error(&meta_name, &metaprogram, message))?;

    let output_text = env.take_output();

    if !options.debug {
        fs::remove_file(&meta_path)
            .map_err(|e| io_error(meta_path.clone(), e.to_string()))?;
    }

    let output_text = runtime.handler_aftermeta(&name, output_text)?;

    let output_path = path.with_extension(&options.output_extension);
    let output_name = output_path.display().to_string();
    let mut final_bytes = Vec::with_capacity(special_first_line.len() + output_text.len());
    final_bytes.extend_from_slice(special_first_line);
    final_bytes.extend_from_slice(output_text.as_bytes());
    fs::write(&output_path, final_bytes)
        .map_err(|e| io_error(output_path.clone(), e.to_string()))?;

    // The file is fully written before validation; a validation failure
    // leaves it in place.
    runtime
        .compile_check(&output_text, &output_name)
        .map_err(|message| validation_error(&output_name, &output_text, message))?;

    output::status(options.silent, &format!("Wrote '{}'.", output_name));

    Ok(FileRecord {
        path: path.to_path_buf(),
        output_path,
        has_preprocessor_code: has_pp,
    })
}

/// A `#` first line (shebang) is stripped before lexing and re-prepended
/// byte-verbatim at output time.
fn split_shebang(raw: &[u8]) -> (&[u8], &[u8]) {
    if raw.first() != Some(&b'#') {
        return (&[], raw);
    }
    match raw.iter().position(|&b| b == b'\n') {
        Some(at) => raw.split_at(at + 1),
        None => (raw, &[]),
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn io_error(path: PathBuf, message: String) -> LuapreError {
    LuapreError::bare(ErrorKind::Io { path, message }, "io")
}

/// Report a metaprogram runtime failure against the written `*.meta.*`
/// file, recovering the line from the host's `path:line:` message shape.
fn execution_error(meta_name: &str, metaprogram: &str, message: String) -> LuapreError {
    let ctx = ErrorContext::new(SourceContext::from_file(meta_name, metaprogram), "runtime");
    let span = extract_line(&message, meta_name)
        .map(|line| span_of_line(metaprogram, line))
        .unwrap_or_else(crate::errors::unspanned);
    ctx.report(ErrorKind::MetaExecution { message }, span)
}

/// Report invalid produced output against the final output file.
fn validation_error(output_name: &str, output_text: &str, message: String) -> LuapreError {
    let ctx = ErrorContext::new(SourceContext::from_file(output_name, output_text), "output");
    let span = extract_line(&message, output_name)
        .map(|line| span_of_line(output_text, line))
        .unwrap_or_else(crate::errors::unspanned);
    ctx.report(ErrorKind::InvalidOutput { message }, span)
}

/// Pull the 1-based line out of a host error message of the form
/// `...name:LINE:...`.
fn extract_line(message: &str, name: &str) -> Option<usize> {
    let at = message.find(name)?;
    let rest = &message[at + name.len()..];
    let rest = rest.strip_prefix(':')?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
