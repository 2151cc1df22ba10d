//! Metaprogram transpiler.
//!
//! Walks the token stream and emits a pure Lua metaprogram: verbatim source
//! becomes `outputLua("...")` calls, meta lines and meta blocks become plain
//! metaprogram code, and the two inline block forms become `outputValue(...)`
//! / `outputLua(...)` calls. Executing the metaprogram with the sink
//! functions in scope reproduces the preprocessed file.
//!
//! Construct classification needs to know whether `return(<body>)` compiles
//! in the host; that capability is injected through [`ChunkChecker`] so this
//! module stays free of the runtime and unit-testable.

use crate::errors::{ErrorContext, ErrorReporting, LuapreError, SourceContext};
use crate::serialize::quote_lua_string;
use crate::syntax::token::{Token, TokenKind};

/// Host compile check used to classify meta blocks.
pub trait ChunkChecker {
    /// Whether `chunk` loads as a host-language chunk (without running it).
    fn chunk_compiles(&self, chunk: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct TranspileOptions {
    /// Interleave `--[[@N]]` annotations on source line changes.
    pub add_line_numbers: bool,
    /// Readable metaprogram: one fragment per line, `\n` escapes instead of
    /// backslash-newline in emitted literals.
    pub debug: bool,
}

/// Transpile a token vector into metaprogram source.
///
/// An inline block `!(expr)` whose expression evaluates to nil still emits
/// `outputValue(expr)`, so `nil` is serialized into the output. That is
/// intentional: the block form asked for a value, and the value was nil.
pub fn transpile(
    tokens: &[Token],
    source: &SourceContext,
    options: &TranspileOptions,
    checker: &dyn ChunkChecker,
) -> Result<String, LuapreError> {
    Transpiler {
        tokens,
        options,
        checker,
        ctx: ErrorContext::new(source.clone(), "parser"),
        parts: Vec::new(),
        pending: Vec::new(),
        in_meta: false,
        start_of_line: true,
        last_emitted_line: 0,
    }
    .run()
}

/// True if any token is a preprocessor sigil; drives the per-file
/// `hasPreprocessorCode` report entry.
pub fn has_preprocessor_code(tokens: &[Token]) -> bool {
    tokens
        .iter()
        .any(|t| matches!(t.kind, TokenKind::PpEntry { .. }))
}

/// A chunk of verbatim source awaiting emission, with enough token context
/// for line annotations.
struct PendingPiece {
    repr: String,
    line: usize,
    annotatable: bool,
}

struct Transpiler<'a> {
    tokens: &'a [Token],
    options: &'a TranspileOptions,
    checker: &'a dyn ChunkChecker,
    ctx: ErrorContext,
    parts: Vec<String>,
    pending: Vec<PendingPiece>,
    in_meta: bool,
    start_of_line: bool,
    last_emitted_line: usize,
}

impl<'a> Transpiler<'a> {
    fn run(mut self) -> Result<String, LuapreError> {
        let tokens = self.tokens;
        let mut i = 0;
        while i < tokens.len() {
            let tok = &tokens[i];
            if self.in_meta {
                self.step_meta(tok)?;
                i += 1;
            } else if let TokenKind::PpEntry { double } = tok.kind {
                i = self.step_preprocessor(i, double)?;
            } else {
                self.step_plain(tok);
                i += 1;
            }
        }
        self.flush_pending();
        Ok(self.parts.concat())
    }

    /// Inside a single-line meta statement. A whitespace token with a line
    /// break (or a short comment) ends it; everything else is metaprogram
    /// text.
    fn step_meta(&mut self, tok: &Token) -> Result<(), LuapreError> {
        match &tok.kind {
            TokenKind::PpEntry { .. } => {
                return Err(self.ctx.preprocessor_inside_meta(tok.span()));
            }
            TokenKind::Whitespace if tok.representation.contains('\n') => {
                self.parts.push("\n".to_string());
                self.in_meta = false;
                self.start_of_line = true;

                // The part of the whitespace token after the line break
                // belongs to the next verbatim chunk; without this the
                // indentation of lines following a meta line would vanish.
                let newline_at = tok.representation.find('\n').unwrap_or(0);
                let rest = &tok.representation[newline_at + 1..];
                if !rest.is_empty() {
                    self.pending.push(PendingPiece {
                        repr: rest.to_string(),
                        line: tok.line + 1,
                        annotatable: false,
                    });
                }
            }
            TokenKind::Comment { long: false, .. } => {
                // The comment's own line terminator sits in the following
                // whitespace token, so add one here to keep the next
                // fragment out of the comment.
                self.parts.push(format!("{}\n", tok.representation));
                self.in_meta = false;
                self.start_of_line = true;
            }
            _ => {
                self.parts.push(tok.representation.clone());
            }
        }
        Ok(())
    }

    /// A `!` or `!!` sigil outside the metaprogram. `!(`/`!!(` starts a
    /// meta block anywhere; a lone `!` at the start of a line begins a meta
    /// line; everything else is an error.
    fn step_preprocessor(&mut self, i: usize, double: bool) -> Result<usize, LuapreError> {
        let tokens = self.tokens;
        let tok = &tokens[i];
        let followed_by_paren = tokens.get(i + 1).is_some_and(|t| t.is_punctuation("("));

        if followed_by_paren {
            self.flush_pending();
            let next = self.meta_block(i, double)?;
            self.start_of_line = false;
            return Ok(next);
        }

        if self.start_of_line && !double {
            self.flush_pending();
            self.in_meta = true;
            return Ok(i + 1);
        }

        Err(self.ctx.unexpected_preprocessor(tok.span()))
    }

    /// Consume `!( ... )` / `!!( ... )` tracking parenthesis depth, then
    /// classify: `!!` demands an expression and expands through
    /// `outputLua`; `!` is an inline value if the body is an expression,
    /// otherwise a statement block run for its side effects.
    fn meta_block(&mut self, i: usize, double: bool) -> Result<usize, LuapreError> {
        let tokens = self.tokens;
        let entry = &tokens[i];
        let mut depth = 1usize;
        let mut j = i + 2;
        let mut body = String::new();

        loop {
            let Some(tok) = tokens.get(j) else {
                return Err(self.ctx.unbalanced_meta_block(entry.span()));
            };
            if tok.is_punctuation("(") {
                depth += 1;
            } else if tok.is_punctuation(")") {
                depth -= 1;
                if depth == 0 {
                    j += 1;
                    break;
                }
            } else if matches!(tok.kind, TokenKind::PpEntry { .. }) {
                return Err(self.ctx.preprocessor_inside_meta(tok.span()));
            }
            body.push_str(&tok.representation);
            j += 1;
        }

        let as_expression = format!("return({})", body);
        if double {
            if !self.checker.chunk_compiles(&as_expression) {
                return Err(self.ctx.invalid_meta_expression(entry.span()));
            }
            self.parts.push(format!("outputLua({})\n", body));
        } else if self.checker.chunk_compiles(&as_expression) {
            self.parts.push(format!("outputValue({})\n", body));
        } else {
            self.parts.push(format!("{}\n", body));
        }

        Ok(j)
    }

    /// Ordinary token outside the metaprogram: queue it for the next
    /// verbatim chunk and track start-of-line state.
    fn step_plain(&mut self, tok: &Token) {
        match &tok.kind {
            TokenKind::Whitespace => {
                if tok.representation.contains('\n') {
                    self.start_of_line = true;
                }
                self.push_pending(tok, false);
            }
            TokenKind::Comment { long: false, .. } => {
                self.start_of_line = true;
                self.push_pending(tok, false);
            }
            TokenKind::Comment { long: true, .. } => {
                self.start_of_line = false;
                self.push_pending(tok, false);
            }
            _ => {
                self.start_of_line = false;
                self.push_pending(tok, true);
            }
        }
    }

    fn push_pending(&mut self, tok: &Token, annotatable: bool) {
        self.pending.push(PendingPiece {
            repr: tok.representation.clone(),
            line: tok.line,
            annotatable,
        });
    }

    /// Emit the queued verbatim chunk as a single `outputLua` call,
    /// interleaving `--[[@N]]` annotations on line changes when requested.
    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let mut lua = String::new();
        for piece in &self.pending {
            if self.options.add_line_numbers
                && piece.annotatable
                && piece.line != self.last_emitted_line
            {
                lua.push_str(&format!("--[[@{}]]", piece.line));
                self.last_emitted_line = piece.line;
            }
            lua.push_str(&piece.repr);
        }
        self.pending.clear();

        let literal = quote_lua_string(&lua, self.options.debug);
        if self.options.debug {
            self.parts.push(format!("outputLua({})\n", literal));
        } else {
            self.parts.push(format!("outputLua({})", literal));
        }
    }
}
