//! Hand-written scanner for the hybrid input.
//!
//! The scanner walks the source left to right and produces exactly one token
//! per dispatch step. Dispatch order resolves every ambiguity: names, then
//! numbers, then `--` comments, then short and long strings, whitespace,
//! punctuation, and finally the `!` / `!!` preprocessor sigils. Anything
//! else is a fatal "Unknown character".
//!
//! Tokens keep their exact source slice as `representation`; the decoded
//! value lives in the kind payload. There is no recovery mode.

use miette::SourceSpan;

use crate::errors::{ErrorContext, ErrorKind, ErrorReporting, LuapreError, SourceContext};
use crate::syntax::token::{is_keyword, Token, TokenKind};

/// Tokenize hybrid source into a token vector.
///
/// `name` is used only for diagnostics. Fails fatally on the first lexical
/// error; there is no partial token vector.
pub fn lex(source: &str, name: &str) -> Result<Vec<Token>, LuapreError> {
    let ctx = ErrorContext::new(SourceContext::from_file(name, source), "lexer");
    Lexer::new(source, ctx).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    ctx: ErrorContext,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str, ctx: ErrorContext) -> Self {
        Self {
            src: source,
            bytes: source.as_bytes(),
            pos: 0,
            line: 1,
            ctx,
        }
    }

    fn run(mut self) -> Result<Vec<Token>, LuapreError> {
        let mut tokens = Vec::new();

        while self.pos < self.bytes.len() {
            let start = self.pos;
            let line = self.line;
            let kind = self.scan_token()?;
            let representation = self.src[start..self.pos].to_string();
            self.line += representation.bytes().filter(|&b| b == b'\n').count();
            tokens.push(Token {
                kind,
                representation,
                line,
                position: start + 1,
            });
        }

        Ok(tokens)
    }

    fn scan_token(&mut self) -> Result<TokenKind, LuapreError> {
        let b = self.bytes[self.pos];

        if b.is_ascii_alphabetic() || b == b'_' {
            Ok(self.read_name())
        } else if b.is_ascii_digit() || (b == b'.' && self.peek_at(1).is_some_and(is_digit)) {
            self.read_number()
        } else if b == b'-' && self.peek_at(1) == Some(b'-') {
            self.read_comment()
        } else if b == b'"' || b == b'\'' {
            self.read_short_string()
        } else if b == b'[' && self.long_bracket_level().is_some() {
            self.read_long_string()
        } else if is_lua_space(b) {
            Ok(self.read_whitespace())
        } else if b == b'!' {
            Ok(self.read_pp_entry())
        } else {
            self.read_punctuation()
        }
    }

    // ------------------------------------------------------------------
    // Names and numbers
    // ------------------------------------------------------------------

    fn read_name(&mut self) -> TokenKind {
        let start = self.pos;
        self.pos += 1;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        {
            self.pos += 1;
        }
        let name = self.src[start..self.pos].to_string();
        if is_keyword(&name) {
            TokenKind::Keyword { name }
        } else {
            TokenKind::Identifier { name }
        }
    }

    /// Numeric patterns, tried in order; first match wins. The exponent
    /// forms accept only a leading `-` sign, and hex floats are not
    /// recognized (`0xFFp2` lexes as `0xFF` then `p2`).
    fn read_number(&mut self) -> Result<TokenKind, LuapreError> {
        let rest = &self.bytes[self.pos..];
        let len = match_float_exp(rest)
            .or_else(|| match_int_exp(rest))
            .or_else(|| match_hex(rest))
            .or_else(|| match_float(rest))
            .or_else(|| match_digits(rest));

        let Some(len) = len else {
            // Dispatch said "number" (a digit, or `.` then a digit) but no
            // pattern matched; only reachable for leading-dot forms.
            return Err(self.ctx.malformed_number(self.span_here(1)));
        };

        let text = &self.src[self.pos..self.pos + len];
        let value = if text.len() > 2 && (text.starts_with("0x") || text.starts_with("0X")) {
            let mut n = 0.0f64;
            for b in text.bytes().skip(2) {
                n = n * 16.0 + hex_digit_value(b) as f64;
            }
            n
        } else {
            text.parse::<f64>()
                .map_err(|_| self.ctx.malformed_number(self.span_here(len)))?
        };

        self.pos += len;
        Ok(TokenKind::Number { value })
    }

    // ------------------------------------------------------------------
    // Comments and strings
    // ------------------------------------------------------------------

    fn read_comment(&mut self) -> Result<TokenKind, LuapreError> {
        let start = self.pos;
        self.pos += 2; // --

        if let Some(level) = self.long_bracket_level() {
            let body = self.read_long_bracket(level).ok_or_else(|| {
                self.ctx.report(
                    ErrorKind::UnfinishedLongComment { level },
                    span_from(start, 2 + level + 2),
                )
            })?;
            return Ok(TokenKind::Comment { body, long: true });
        }

        // Short comment: to end of line. The `\r?\n` terminator is not part
        // of the representation.
        let content_start = self.pos;
        while self.peek().is_some_and(|b| b != b'\n') {
            self.pos += 1;
        }
        if self.pos < self.bytes.len()
            && self.pos > content_start
            && self.bytes[self.pos - 1] == b'\r'
        {
            self.pos -= 1;
        }
        let body = self.src[content_start..self.pos].to_string();
        Ok(TokenKind::Comment { body, long: false })
    }

    fn read_short_string(&mut self) -> Result<TokenKind, LuapreError> {
        let start = self.pos;
        let quote = self.bytes[self.pos];
        self.pos += 1;

        loop {
            match self.peek() {
                None => {
                    return Err(self.ctx.unterminated_string(span_from(start, 1)));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    break;
                }
                Some(b'\\') => {
                    // `\X` spans two bytes regardless of X.
                    if self.pos + 1 >= self.bytes.len() {
                        return Err(self.ctx.unterminated_string(span_from(start, 1)));
                    }
                    self.pos += 2;
                }
                Some(_) => {
                    self.pos += 1;
                }
            }
        }

        let inner = &self.src[start + 1..self.pos - 1];
        Ok(TokenKind::String {
            value: decode_short_string(inner),
            long: false,
        })
    }

    fn read_long_string(&mut self) -> Result<TokenKind, LuapreError> {
        let start = self.pos;
        let level = self.long_bracket_level().unwrap_or(0);
        let value = self.read_long_bracket(level).ok_or_else(|| {
            self.ctx.report(
                ErrorKind::UnfinishedLongString { level },
                span_from(start, level + 2),
            )
        })?;
        Ok(TokenKind::String { value, long: true })
    }

    /// If positioned on a `[=*[` opener, returns the equal-sign count.
    fn long_bracket_level(&self) -> Option<usize> {
        let b = &self.bytes[self.pos..];
        if b.first() != Some(&b'[') {
            return None;
        }
        let mut i = 1;
        while b.get(i) == Some(&b'=') {
            i += 1;
        }
        if b.get(i) == Some(&b'[') {
            Some(i - 1)
        } else {
            None
        }
    }

    /// Consume `[=*[ ... ]=*]` with a matching equal count, returning the
    /// decoded body. `None` when the closer is missing before EOF.
    fn read_long_bracket(&mut self, level: usize) -> Option<String> {
        self.pos += level + 2;
        let content_start = self.pos;

        let mut closer = Vec::with_capacity(level + 2);
        closer.push(b']');
        closer.extend(std::iter::repeat(b'=').take(level));
        closer.push(b']');

        let haystack = &self.bytes[content_start..];
        let at = find_subslice(haystack, &closer)?;
        let content = strip_leading_newline(&self.src[content_start..content_start + at]);
        let content = content.to_string();
        self.pos = content_start + at + closer.len();
        Some(content)
    }

    // ------------------------------------------------------------------
    // Whitespace, punctuation, sigils
    // ------------------------------------------------------------------

    fn read_whitespace(&mut self) -> TokenKind {
        while self.peek().is_some_and(is_lua_space) {
            self.pos += 1;
        }
        TokenKind::Whitespace
    }

    fn read_pp_entry(&mut self) -> TokenKind {
        self.pos += 1;
        let double = self.peek() == Some(b'!');
        if double {
            self.pos += 1;
        }
        TokenKind::PpEntry { double }
    }

    fn read_punctuation(&mut self) -> Result<TokenKind, LuapreError> {
        const MULTI: &[&str] = &["...", "..", "==", "~=", "<=", ">="];
        const SINGLE: &[u8] = b"+-*/%^#<>=(){}[];:,.";

        let rest = &self.bytes[self.pos..];
        for m in MULTI {
            if rest.starts_with(m.as_bytes()) {
                self.pos += m.len();
                return Ok(TokenKind::Punctuation);
            }
        }
        if SINGLE.contains(&rest[0]) {
            self.pos += 1;
            return Ok(TokenKind::Punctuation);
        }

        let ch = self.src[self.pos..].chars().next().unwrap_or('\u{FFFD}');
        Err(self
            .ctx
            .unknown_character(ch, span_from(self.pos, ch.len_utf8())))
    }

    // ------------------------------------------------------------------
    // Cursor helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn span_here(&self, len: usize) -> SourceSpan {
        span_from(self.pos, len)
    }
}

fn span_from(start: usize, len: usize) -> SourceSpan {
    SourceSpan::from(start..start + len)
}

fn is_lua_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0B | 0x0C)
}

fn is_digit(b: u8) -> bool {
    b.is_ascii_digit()
}

fn hex_digit_value(b: u8) -> u32 {
    (b as char).to_digit(16).unwrap_or(0)
}

// ----------------------------------------------------------------------
// Numeric pattern matchers; each returns the matched byte length.
// ----------------------------------------------------------------------

fn match_digits(b: &[u8]) -> Option<usize> {
    let n = b.iter().take_while(|b| b.is_ascii_digit()).count();
    (n > 0).then_some(n)
}

/// `digits "." digits`
fn match_float(b: &[u8]) -> Option<usize> {
    let int = match_digits(b)?;
    if b.get(int) != Some(&b'.') {
        return None;
    }
    let frac = match_digits(&b[int + 1..])?;
    Some(int + 1 + frac)
}

/// `[eE] "-"? digits` continuation at `b`.
fn match_exponent(b: &[u8]) -> Option<usize> {
    if !matches!(b.first(), Some(&b'e') | Some(&b'E')) {
        return None;
    }
    let sign = if b.get(1) == Some(&b'-') { 1 } else { 0 };
    let digits = match_digits(&b[1 + sign..])?;
    Some(1 + sign + digits)
}

/// `digits "." digits [eE] "-"? digits`
fn match_float_exp(b: &[u8]) -> Option<usize> {
    let mantissa = match_float(b)?;
    let exp = match_exponent(&b[mantissa..])?;
    Some(mantissa + exp)
}

/// `digits [eE] "-"? digits`
fn match_int_exp(b: &[u8]) -> Option<usize> {
    let int = match_digits(b)?;
    let exp = match_exponent(&b[int..])?;
    Some(int + exp)
}

/// `"0x" hexdigits`
fn match_hex(b: &[u8]) -> Option<usize> {
    if b.first() != Some(&b'0') || !matches!(b.get(1), Some(&b'x') | Some(&b'X')) {
        return None;
    }
    let digits = b[2..].iter().take_while(|b| b.is_ascii_hexdigit()).count();
    (digits > 0).then_some(2 + digits)
}

// ----------------------------------------------------------------------
// String decoding
// ----------------------------------------------------------------------

/// Decode the body of a short string: interpret the standard escapes,
/// `\ddd` byte escapes, and escaped line breaks. Unknown escapes decode to
/// the escaped character itself.
///
/// Decoded values are UTF-8 strings: a `\ddd` run whose bytes do not form
/// valid UTF-8 decodes to U+FFFD replacement characters rather than raw
/// bytes.
fn decode_short_string(inner: &str) -> String {
    let bytes = inner.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b);
            i += 1;
            continue;
        }
        let Some(&esc) = bytes.get(i + 1) else {
            break;
        };
        i += 2;
        match esc {
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'v' => out.push(0x0B),
            b'\n' => out.push(b'\n'),
            b'\r' => {
                out.push(b'\n');
                if bytes.get(i) == Some(&b'\n') {
                    i += 1;
                }
            }
            b'0'..=b'9' => {
                let mut value = (esc - b'0') as u32;
                let mut taken = 1;
                while taken < 3 && bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
                    value = value * 10 + (bytes[i] - b'0') as u32;
                    i += 1;
                    taken += 1;
                }
                out.push((value & 0xFF) as u8);
            }
            other => out.push(other),
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Long-bracket bodies drop a single leading line break, matching the
/// host's own long-string semantics.
fn strip_leading_newline(content: &str) -> &str {
    if let Some(rest) = content.strip_prefix("\r\n") {
        rest
    } else if let Some(rest) = content.strip_prefix("\n\r") {
        rest
    } else if let Some(rest) = content.strip_prefix('\n') {
        rest
    } else if let Some(rest) = content.strip_prefix('\r') {
        rest
    } else {
        content
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
