//! Luapre error handling - unified encapsulated API
//!
//! Every failure in the pipeline is represented by a single `LuapreError`
//! carrying its kind, the source it points into, and diagnostic metadata.
//! Components never exit the process; errors bubble up to the CLI, which
//! renders them through miette and exits.

use miette::{Diagnostic, SourceSpan};
use miette::{LabeledSpan, NamedSource};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

// ============================================================================
// SOURCE CONTEXT - Error reporting infrastructure
// ============================================================================

/// Source context for error reporting: the file (or pseudo-file) an error
/// points into, kept alongside its content so excerpts can be rendered.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub name: String,
    pub content: String,
}

impl SourceContext {
    /// Create a source context from real file content.
    pub fn from_file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// Create a fallback when real source is unavailable (I/O and usage
    /// errors have no source text to excerpt).
    pub fn fallback(context: &str) -> Self {
        Self {
            name: "luapre".to_string(),
            content: format!("-- {}", context),
        }
    }

    /// Convert to NamedSource for use with miette error reporting.
    pub fn to_named_source(&self) -> Arc<NamedSource<String>> {
        Arc::new(NamedSource::new(self.name.clone(), self.content.clone()))
    }
}

impl Default for SourceContext {
    fn default() -> Self {
        Self::fallback("no source")
    }
}

/// The single error type - essential data only.
#[derive(Debug)]
pub struct LuapreError {
    /// What went wrong (kind-specific data)
    pub kind: ErrorKind,
    /// Where it happened (source + span + pipeline phase)
    pub source_info: SourceInfo,
    /// How to help (auto-populated based on context)
    pub diagnostic_info: DiagnosticInfo,
}

/// All error kinds as a clean enum - no duplicate fields.
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorKind {
    // Lexical errors - token boundary failures
    MalformedNumber,
    UnterminatedString,
    UnfinishedLongString {
        level: usize,
    },
    UnfinishedLongComment {
        level: usize,
    },
    UnknownCharacter {
        ch: char,
    },

    // Structural errors - preprocessor construct failures
    UnbalancedMetaBlock,
    PreprocessorInsideMeta,
    UnexpectedPreprocessor,

    // Semantic errors - meta block body classification
    InvalidMetaExpression,

    // Execution errors - the metaprogram raised at runtime
    MetaExecution {
        message: String,
    },

    // Output validation - the produced file is not valid host source
    InvalidOutput {
        message: String,
    },

    // Serialization - value shape not representable as a literal
    Serialize {
        message: String,
    },

    // I/O
    Io {
        path: PathBuf,
        message: String,
    },

    // Usage
    NoInputPaths,
    OutputExtensionCollision {
        path: PathBuf,
        extension: String,
    },
    InvalidHandler {
        message: String,
    },
}

/// Context-specific source information.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub source: Arc<NamedSource<String>>,
    pub primary_span: SourceSpan,
    pub phase: String,
}

/// Diagnostic enhancement data.
#[derive(Debug, Clone)]
pub struct DiagnosticInfo {
    pub help: Option<String>,
    pub error_code: String,
}

/// Context-aware error creation - each pipeline phase carries a context that
/// knows how to stamp errors with its source and phase name.
pub trait ErrorReporting {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> LuapreError;

    fn malformed_number(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::MalformedNumber, span)
    }

    fn unterminated_string(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::UnterminatedString, span)
    }

    fn unknown_character(&self, ch: char, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::UnknownCharacter { ch }, span)
    }

    fn unbalanced_meta_block(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::UnbalancedMetaBlock, span)
    }

    fn preprocessor_inside_meta(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::PreprocessorInsideMeta, span)
    }

    fn unexpected_preprocessor(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::UnexpectedPreprocessor, span)
    }

    fn invalid_meta_expression(&self, span: SourceSpan) -> LuapreError {
        self.report(ErrorKind::InvalidMetaExpression, span)
    }
}

impl ErrorKind {
    /// Get the error category for test assertions.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedNumber
            | Self::UnterminatedString
            | Self::UnfinishedLongString { .. }
            | Self::UnfinishedLongComment { .. }
            | Self::UnknownCharacter { .. } => ErrorCategory::Lexical,

            Self::UnbalancedMetaBlock
            | Self::PreprocessorInsideMeta
            | Self::UnexpectedPreprocessor => ErrorCategory::Structural,

            Self::InvalidMetaExpression => ErrorCategory::Semantic,

            Self::MetaExecution { .. } => ErrorCategory::Execution,

            Self::InvalidOutput { .. } => ErrorCategory::OutputValidation,

            Self::Serialize { .. } => ErrorCategory::Serialization,

            Self::Io { .. } => ErrorCategory::Io,

            Self::NoInputPaths
            | Self::OutputExtensionCollision { .. }
            | Self::InvalidHandler { .. } => ErrorCategory::Usage,
        }
    }

    /// Get error code suffix for diagnostic codes.
    pub const fn code_suffix(&self) -> &'static str {
        match self {
            Self::MalformedNumber => "malformed_number",
            Self::UnterminatedString => "unterminated_string",
            Self::UnfinishedLongString { .. } => "unfinished_long_string",
            Self::UnfinishedLongComment { .. } => "unfinished_long_comment",
            Self::UnknownCharacter { .. } => "unknown_character",
            Self::UnbalancedMetaBlock => "unbalanced_meta_block",
            Self::PreprocessorInsideMeta => "preprocessor_inside_meta",
            Self::UnexpectedPreprocessor => "unexpected_preprocessor",
            Self::InvalidMetaExpression => "invalid_expression",
            Self::MetaExecution { .. } => "metaprogram_failure",
            Self::InvalidOutput { .. } => "invalid_output",
            Self::Serialize { .. } => "unserializable_value",
            Self::Io { .. } => "io_failure",
            Self::NoInputPaths => "no_input_paths",
            Self::OutputExtensionCollision { .. } => "output_extension_collision",
            Self::InvalidHandler { .. } => "invalid_handler",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Lexical,
    Structural,
    Semantic,
    Execution,
    OutputValidation,
    Serialization,
    Io,
    Usage,
}

impl std::error::Error for LuapreError {}

impl fmt::Display for LuapreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ErrorKind::MalformedNumber => {
                write!(f, "Malformed number.")
            }
            ErrorKind::UnterminatedString => {
                write!(f, "Unterminated string.")
            }
            ErrorKind::UnfinishedLongString { level } => {
                write!(f, "Unfinished long string (of level {}).", level)
            }
            ErrorKind::UnfinishedLongComment { level } => {
                write!(f, "Unfinished long comment (of level {}).", level)
            }
            ErrorKind::UnknownCharacter { ch } => {
                write!(f, "Unknown character '{}'.", ch)
            }
            ErrorKind::UnbalancedMetaBlock => {
                write!(f, "Missing end of meta block.")
            }
            ErrorKind::PreprocessorInsideMeta => {
                write!(f, "Preprocessor token inside metaprogram.")
            }
            ErrorKind::UnexpectedPreprocessor => {
                write!(f, "Unexpected preprocessor token.")
            }
            ErrorKind::InvalidMetaExpression => {
                write!(f, "Meta block variant does not contain a valid expression.")
            }
            ErrorKind::MetaExecution { message } => {
                write!(f, "Metaprogram execution failed: {}", message)
            }
            ErrorKind::InvalidOutput { message } => {
                write!(f, "Output is not valid Lua: {}", message)
            }
            ErrorKind::Serialize { message } => {
                write!(f, "{}", message)
            }
            ErrorKind::Io { path, message } => {
                write!(f, "I/O error for '{}': {}", path.display(), message)
            }
            ErrorKind::NoInputPaths => {
                write!(f, "No input paths supplied.")
            }
            ErrorKind::OutputExtensionCollision { path, extension } => {
                write!(
                    f,
                    "Input path '{}' ends in the output extension '.{}'.",
                    path.display(),
                    extension
                )
            }
            ErrorKind::InvalidHandler { message } => {
                write!(f, "Message handler error: {}", message)
            }
        }
    }
}

impl Diagnostic for LuapreError {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new(&self.diagnostic_info.error_code))
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diagnostic_info
            .help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let labels = vec![LabeledSpan::new_with_span(
            Some(self.primary_label()),
            self.source_info.primary_span,
        )];
        Some(Box::new(labels.into_iter()))
    }

    fn source_code(&self) -> Option<&dyn miette::SourceCode> {
        Some(&*self.source_info.source)
    }
}

impl LuapreError {
    /// Error with no meaningful source location (I/O, usage, runtime
    /// setup). Phase names the reporting agent for the diagnostic code.
    pub fn bare(kind: ErrorKind, phase: &str) -> Self {
        let error_code = format!("luapre::{}::{}", phase, kind.code_suffix());
        LuapreError {
            kind,
            source_info: SourceInfo {
                source: SourceContext::fallback(phase).to_named_source(),
                primary_span: unspanned(),
                phase: phase.to_string(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }

    fn primary_label(&self) -> String {
        match &self.kind {
            ErrorKind::MalformedNumber => "malformed number".into(),
            ErrorKind::UnterminatedString => "string starts here".into(),
            ErrorKind::UnfinishedLongString { .. } => "long string starts here".into(),
            ErrorKind::UnfinishedLongComment { .. } => "long comment starts here".into(),
            ErrorKind::UnknownCharacter { .. } => "unknown character".into(),
            ErrorKind::UnbalancedMetaBlock => "meta block starts here".into(),
            ErrorKind::PreprocessorInsideMeta => "preprocessor token".into(),
            ErrorKind::UnexpectedPreprocessor => "unexpected token".into(),
            ErrorKind::InvalidMetaExpression => "not a valid expression".into(),
            ErrorKind::MetaExecution { .. } => "raised here".into(),
            ErrorKind::InvalidOutput { .. } => "invalid output".into(),
            ErrorKind::Serialize { .. } => "unserializable value".into(),
            ErrorKind::Io { .. } => "i/o failure".into(),
            ErrorKind::NoInputPaths => "usage".into(),
            ErrorKind::OutputExtensionCollision { .. } => "usage".into(),
            ErrorKind::InvalidHandler { .. } => "handler".into(),
        }
    }
}

/// General-purpose error creation context used by the lexer, transpiler, and
/// driver for stamping errors with their phase and source.
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub source: SourceContext,
    pub phase: String,
}

impl ErrorContext {
    pub fn new(source: SourceContext, phase: impl Into<String>) -> Self {
        Self {
            source,
            phase: phase.into(),
        }
    }
}

impl ErrorReporting for ErrorContext {
    fn report(&self, kind: ErrorKind, span: SourceSpan) -> LuapreError {
        let error_code = format!("luapre::{}::{}", self.phase, kind.code_suffix());

        LuapreError {
            kind,
            source_info: SourceInfo {
                source: self.source.to_named_source(),
                primary_span: span,
                phase: self.phase.clone(),
            },
            diagnostic_info: DiagnosticInfo {
                help: None,
                error_code,
            },
        }
    }
}

/// Creates a placeholder span for errors not tied to a specific source code
/// location, such as I/O errors or usage failures.
pub fn unspanned() -> SourceSpan {
    SourceSpan::from(0..0)
}

/// Byte span of the given 1-based line within `text`, for pointing
/// execution and validation errors at a whole line.
pub fn span_of_line(text: &str, line: usize) -> SourceSpan {
    let mut start = 0usize;
    let mut current = 1usize;
    for (i, b) in text.bytes().enumerate() {
        if current == line {
            start = i;
            break;
        }
        if b == b'\n' {
            current += 1;
            start = i + 1;
        }
    }
    if current < line {
        return SourceSpan::from(text.len()..text.len());
    }
    let end = text[start..]
        .find('\n')
        .map(|n| start + n)
        .unwrap_or(text.len());
    SourceSpan::from(start..end)
}

// ============================================================================
// ERROR FORMATTING UTILITIES
// ============================================================================

impl LuapreError {
    /// Canonical rendering: `Error @ file:line:col: [Agent] message`,
    /// followed by a two-line excerpt with a caret under the offending
    /// column for lexical and structural errors. Errors with no source
    /// location render as `Error: [Agent] message`.
    pub fn render(&self) -> String {
        let agent = agent_name(&self.source_info.phase);
        let file = self.source_info.source.name();
        let content = self.source_info.source.inner();
        let span = self.source_info.primary_span;

        if span.len() == 0 && span.offset() == 0 {
            if file == "luapre" {
                return format!("Error: [{}] {}", agent, self);
            }
            return format!("Error @ {}: [{}] {}", file, agent, self);
        }

        let (line, col, line_text) = locate(content, span.offset());
        let mut out = format!("Error @ {}:{}:{}: [{}] {}", file, line, col, agent, self);

        if matches!(
            self.kind.category(),
            ErrorCategory::Lexical | ErrorCategory::Structural
        ) {
            out.push_str(&format!("\n> {}\n>{}^", line_text, " ".repeat(col)));
        }
        out
    }
}

/// Agent label for the error header, derived from the pipeline phase.
fn agent_name(phase: &str) -> String {
    match phase {
        "io" => "IO".to_string(),
        "cli" => "CLI".to_string(),
        other => {
            let mut chars = other.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        }
    }
}

/// 1-based line and byte column of `offset` within `content`, plus the text
/// of that line (without its terminator) for the excerpt.
fn locate(content: &str, offset: usize) -> (usize, usize, &str) {
    let offset = offset.min(content.len());
    let mut line = 1;
    let mut line_start = 0;
    for (i, b) in content.bytes().enumerate() {
        if i >= offset {
            break;
        }
        if b == b'\n' {
            line += 1;
            line_start = i + 1;
        }
    }
    let line_end = content[line_start..]
        .find('\n')
        .map(|n| line_start + n)
        .unwrap_or(content.len());
    let line_text = content[line_start..line_end].trim_end_matches('\r');
    (line, offset - line_start + 1, line_text)
}

/// Prints a LuapreError in the canonical format to stderr.
pub fn print_error(error: LuapreError) {
    eprintln!("{}", error.render());
}
