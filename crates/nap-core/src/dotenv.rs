//! Minimal dotenv parsing for `nap app env import`.

use std::collections::BTreeMap;

use crate::error::{CoreError, CoreResult};

/// Parse `KEY=value` lines.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is allowed,
/// and values may be wrapped in single or double quotes. Double-quoted values
/// understand `\n`, `\"` and `\\`.
pub fn parse(input: &str) -> CoreResult<BTreeMap<String, String>> {
    let mut vars = BTreeMap::new();
    for (idx, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            return Err(CoreError::Validation(format!(
                "line {}: expected KEY=value",
                idx + 1
            )));
        };
        let key = key.trim();
        validate_key(key).map_err(|e| CoreError::Validation(format!("line {}: {e}", idx + 1)))?;
        vars.insert(key.to_string(), unquote(value.trim()));
    }
    Ok(vars)
}

/// Environment variable names: letters, digits, underscores, not starting
/// with a digit.
pub fn validate_key(key: &str) -> CoreResult<()> {
    let mut chars = key.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "invalid environment variable name '{key}'"
        )))
    }
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        let inner = &value[1..value.len() - 1];
        let mut out = String::with_capacity(inner.len());
        let mut chars = inner.chars();
        while let Some(c) = chars.next() {
            if c == '\\' {
                match chars.next() {
                    Some('n') => out.push('\n'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                }
            } else {
                out.push(c);
            }
        }
        return out;
    }
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value[1..value.len() - 1].to_string();
    }
    // Unquoted values end at an inline comment.
    match value.find(" #") {
        Some(pos) => value[..pos].trim_end().to_string(),
        None => value.to_string(),
    }
}

/// Render variables as sorted `KEY=value` lines, quoting where needed.
pub fn render(vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        let needs_quotes = value.is_empty()
            || value.contains(|c: char| c.is_whitespace() || c == '#' || c == '"' || c == '\'');
        if needs_quotes {
            let escaped = value
                .replace('\\', "\\\\")
                .replace('"', "\\\"")
                .replace('\n', "\\n");
            out.push_str(&format!("{key}=\"{escaped}\"\n"));
        } else {
            out.push_str(&format!("{key}={value}\n"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_common_forms() {
        let vars = parse(
            "# comment\n\
             PLAIN=value\n\
             export EXPORTED=yes\n\
             QUOTED=\"hello world\"\n\
             SINGLE='a # b'\n\
             TRAILING=x # note\n\
             EMPTY=\n\
             \n\
             URL=postgres://u:p@h:5432/db?sslmode=disable\n",
        )
        .unwrap();
        assert_eq!(vars["PLAIN"], "value");
        assert_eq!(vars["EXPORTED"], "yes");
        assert_eq!(vars["QUOTED"], "hello world");
        assert_eq!(vars["SINGLE"], "a # b");
        assert_eq!(vars["TRAILING"], "x");
        assert_eq!(vars["EMPTY"], "");
        assert_eq!(vars["URL"], "postgres://u:p@h:5432/db?sslmode=disable");
    }

    #[test]
    fn rejects_bad_lines() {
        assert!(parse("NOEQUALS\n").is_err());
        assert!(parse("1BAD=x\n").is_err());
    }

    #[test]
    fn render_then_parse_preserves_values() {
        let mut vars = BTreeMap::new();
        vars.insert("A".to_string(), "simple".to_string());
        vars.insert("B".to_string(), "two words".to_string());
        vars.insert("C".to_string(), "line\nbreak \"quoted\"".to_string());
        assert_eq!(parse(&render(&vars)).unwrap(), vars);
    }
}
