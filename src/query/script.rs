//! Script construction for the remote sqlite3 CLI.
//!
//! A script is the parameter binding prelude (`.param clear`, `.param init`,
//! one `.param set` per parameter) followed by the caller's SQL verbatim.
//! Values go through [`encode_literal`], which has a fixed, per-kind output
//! format; nothing here relies on a generic string conversion of a value.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EngineError, Result};
use crate::types::Value;

/// Named query parameters. Names are given without the leading `:`.
pub type QueryParams = BTreeMap<String, Value>;

/// Literal used for positive infinity. SQLite reads an overflowing real as Inf.
const POSITIVE_INFINITY: &str = "9e999";
const NEGATIVE_INFINITY: &str = "-9e999";

/// Builds the full script sent to the remote engine's stdin.
///
/// Fails before producing any text if a parameter name or value cannot be
/// encoded, so nothing is ever sent for an invalid request.
pub fn build_script(sql: &str, params: &QueryParams) -> Result<String> {
    let mut lines = Vec::with_capacity(params.len() + 3);
    lines.push(".param clear".to_string());
    lines.push(".param init".to_string());

    let mut bound = BTreeSet::new();
    for (name, value) in params {
        if !bound.insert(param_key(name)) {
            return Err(EngineError::validation(format!(
                "Parameter ':{}' is given more than once",
                param_key(name)
            )));
        }
        lines.push(bind_statement(name, value)?);
    }

    lines.push(sql.to_string());
    Ok(lines.join("\n"))
}

/// Renders one `.param set :name "<literal>"` line.
pub fn bind_statement(name: &str, value: &Value) -> Result<String> {
    let name = validate_param_name(name)?;
    let literal = encode_literal(value)?;
    Ok(format!(".param set :{name} {}", quote_dot_argument(&literal)))
}

/// Encodes a value as an SQL literal.
///
/// | kind    | output                                             |
/// |---------|----------------------------------------------------|
/// | Null    | `NULL`                                             |
/// | Integer | decimal digits, `-` for negatives                  |
/// | Real    | shortest round-trip decimal, always with a `.`; `9e999` / `-9e999` for infinities; NaN is rejected |
/// | Text    | `'...'` with embedded `'` doubled                  |
/// | Blob    | `X'...'` with uppercase hex digits                 |
pub fn encode_literal(value: &Value) -> Result<String> {
    let literal = match value {
        Value::Null => "NULL".to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Real(f) => encode_real(*f)?,
        Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
        Value::Blob(bytes) => format!("X'{}'", hex::encode_upper(bytes)),
    };
    Ok(literal)
}

fn encode_real(f: f64) -> Result<String> {
    if f.is_nan() {
        return Err(EngineError::validation("NaN cannot be bound as a parameter"));
    }
    if f.is_infinite() {
        let literal = if f > 0.0 {
            POSITIVE_INFINITY
        } else {
            NEGATIVE_INFINITY
        };
        return Ok(literal.to_string());
    }

    // Display for f64 never uses exponent notation, so a missing '.' means
    // the value would be read back as an integer.
    let mut text = f.to_string();
    if !text.contains('.') {
        text.push_str(".0");
    }
    Ok(text)
}

/// Wraps text as a double-quoted dot-command argument.
///
/// The CLI resolves backslash escapes inside double quotes, and a dot-command
/// must stay on one line, so backslashes, quotes and line breaks are escaped.
pub fn quote_dot_argument(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Returns a parameter name without its leading `:`, if it has one.
pub fn param_key(name: &str) -> &str {
    name.strip_prefix(':').unwrap_or(name)
}

/// Checks a parameter name, accepting and dropping one leading `:`.
fn validate_param_name(name: &str) -> Result<&str> {
    let bare = param_key(name);
    let valid = !bare.is_empty()
        && bare
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(bare)
    } else {
        Err(EngineError::validation(format!(
            "Invalid parameter name: '{name}'"
        )))
    }
}
