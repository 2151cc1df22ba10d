//! Rendering runtime values as host-language literal source text.
//!
//! `serialize` turns a value produced by metacode into Lua source that
//! evaluates back to a structurally equal value. The string quoter here is
//! shared with the transpiler's verbatim emitter so both sides agree on
//! escape conventions (notably the debug-mode newline collapse).

use mlua::Value;

/// Leaf error for unrepresentable values; wrapped into the unified error
/// type at the runtime boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    #[error("Table keys cannot be tables.")]
    TableKey,
    #[error("Cannot serialize value of type '{0}'.")]
    Unsupported(&'static str),
    #[error("{0}")]
    Lua(String),
}

/// Serialize a runtime value to Lua literal source.
///
/// Tables emit their array part first (consecutive integer indices from 1),
/// then the remaining entries sorted by `tostring(key)` ascending, which
/// makes the output deterministic. Strings always use the two-character
/// `\n` escape so a serialized value never injects a raw line break.
pub fn serialize(value: &Value) -> Result<String, SerializeError> {
    let mut out = String::new();
    write_value(&mut out, value)?;
    Ok(out)
}

fn write_value(out: &mut String, value: &Value) -> Result<(), SerializeError> {
    match value {
        Value::Nil => {
            out.push_str("nil");
            Ok(())
        }
        Value::Boolean(b) => {
            out.push_str(if *b { "true" } else { "false" });
            Ok(())
        }
        Value::Integer(i) => {
            out.push_str(&serialize_integer(*i));
            Ok(())
        }
        Value::Number(n) => {
            out.push_str(&serialize_number(*n));
            Ok(())
        }
        Value::String(s) => {
            let text = String::from_utf8_lossy(s.as_bytes().as_ref()).into_owned();
            out.push_str(&quote_lua_string(&text, true));
            Ok(())
        }
        Value::Table(table) => write_table(out, table),
        other => Err(SerializeError::Unsupported(other.type_name())),
    }
}

fn write_table(out: &mut String, table: &mlua::Table) -> Result<(), SerializeError> {
    out.push('{');
    let mut first = true;

    // Array part: consecutive integer indices starting at 1.
    let mut array_len: i64 = 0;
    loop {
        let item: Value = table
            .raw_get(array_len + 1)
            .map_err(|e| SerializeError::Lua(e.to_string()))?;
        if item == Value::Nil {
            break;
        }
        if !first {
            out.push(',');
        }
        first = false;
        write_value(out, &item)?;
        array_len += 1;
    }

    // Remaining entries, sorted by tostring(key) ascending.
    let mut entries: Vec<(String, Value, Value)> = Vec::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, item) = pair.map_err(|e| SerializeError::Lua(e.to_string()))?;
        if let Value::Integer(i) = key {
            if i >= 1 && i <= array_len {
                continue;
            }
        }
        if matches!(key, Value::Table(_)) {
            return Err(SerializeError::TableKey);
        }
        entries.push((key_sort_string(&key), key, item));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, key, item) in &entries {
        if !first {
            out.push(',');
        }
        first = false;
        write_key(out, key)?;
        out.push('=');
        write_value(out, item)?;
    }

    out.push('}');
    Ok(())
}

/// Keys that are valid bare identifiers use `k=v` form; everything else is
/// bracketed as `[expr]=v`.
fn write_key(out: &mut String, key: &Value) -> Result<(), SerializeError> {
    if let Value::String(s) = key {
        let text = String::from_utf8_lossy(s.as_bytes().as_ref()).into_owned();
        if is_bare_identifier(&text) {
            out.push_str(&text);
            return Ok(());
        }
    }
    out.push('[');
    write_value(out, key)?;
    out.push(']');
    Ok(())
}

/// `tostring(key)` equivalent used only for ordering hash-part entries.
fn key_sort_string(key: &Value) -> String {
    match key {
        Value::String(s) => String::from_utf8_lossy(s.as_bytes().as_ref()).into_owned(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => plain_number(*n),
        Value::Boolean(b) => b.to_string(),
        other => other.type_name().to_string(),
    }
}

fn is_bare_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ----------------------------------------------------------------------
// Numbers
// ----------------------------------------------------------------------

fn serialize_integer(i: i64) -> String {
    if i == 0 {
        return "0".to_string();
    }
    if i < 0 {
        // The leading space guards against `-` fusing with an adjacent
        // token into a comment.
        return format!(" {}", i);
    }
    i.to_string()
}

/// Render a float the way the output must read it back. Infinities and NaN
/// have no literal form; zero erases any `-0` sign; other negatives get the
/// same guarding space as integers.
fn serialize_number(n: f64) -> String {
    if n.is_nan() {
        return "0/0".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 {
            "math.huge".to_string()
        } else {
            " -math.huge".to_string()
        };
    }
    if n == 0.0 {
        return "0".to_string();
    }
    if n < 0.0 {
        return format!(" {}", plain_number(n));
    }
    plain_number(n)
}

fn plain_number(n: f64) -> String {
    let magnitude = n.abs();
    if n == n.trunc() && magnitude < 1e15 {
        return format!("{}", n as i64);
    }
    if magnitude >= 1e15 || magnitude < 1e-4 {
        return format!("{:e}", n);
    }
    format!("{}", n)
}

// ----------------------------------------------------------------------
// Strings
// ----------------------------------------------------------------------

/// Quote `text` as a double-quoted Lua string literal.
///
/// Line breaks become a backslash-newline pair, which Lua reads back as a
/// newline; with `debug` set they are collapsed to the two-character `\n`
/// escape so serialized strings stay on one line.
pub fn quote_lua_string(text: &str, debug: bool) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => {
                if debug {
                    out.push_str("\\n");
                } else {
                    out.push('\\');
                    out.push('\n');
                }
            }
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{7}' => out.push_str("\\a"),
            '\u{8}' => out.push_str("\\b"),
            '\u{C}' => out.push_str("\\f"),
            '\u{B}' => out.push_str("\\v"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\{:03}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
