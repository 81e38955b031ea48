//! Canonical Nix expression rendering for [`Value`] trees.
//!
//! Output is byte-stable: mapping keys are emitted in insertion order, bodies are
//! indented by the current level, and only the outermost mapping closes without a
//! trailing semicolon.

use crate::value::Value;
use thiserror::Error;

/// Indentation level of the outermost mapping body.
pub const TOP_LEVEL: usize = 2;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("sequence element must be text, found {0}")]
    NonTextElement(&'static str),
}

/// Render a value as a standalone Nix expression.
pub fn to_nix(value: &Value) -> Result<String, EncodeError> {
    let mut out = String::new();
    write_value(value, TOP_LEVEL, &mut out)?;
    Ok(out)
}

/// Append `value` to `out`, indenting mapping bodies by `level` spaces.
pub fn write_value(value: &Value, level: usize, out: &mut String) -> Result<(), EncodeError> {
    match value {
        Value::Mapping(map) => {
            out.push_str("{\n");
            for (key, item) in map {
                push_indent(out, level);
                if is_identifier(key) {
                    out.push_str(key);
                } else {
                    write_quoted(key, out);
                }
                out.push_str(" = ");
                write_value(item, level + 2, out)?;
                // Nested mappings already close with "};".
                if matches!(item, Value::Mapping(_)) {
                    out.push('\n');
                } else {
                    out.push_str(";\n");
                }
            }
            push_indent(out, level.saturating_sub(2));
            out.push_str(if level <= TOP_LEVEL { "}" } else { "};" });
        }
        Value::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                let text = item
                    .as_text()
                    .ok_or_else(|| EncodeError::NonTextElement(item.kind()))?;
                if i > 0 {
                    out.push(' ');
                }
                write_quoted(text, out);
            }
            out.push(']');
        }
        Value::Text(s) | Value::Symbol(s) => write_quoted(s, out),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
    }
    Ok(())
}

/// Whether `key` can be written as a bare attribute name.
pub fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn push_indent(out: &mut String, width: usize) {
    out.extend(std::iter::repeat(' ').take(width));
}

fn write_quoted(s: &str, out: &mut String) {
    out.push('"');
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' if chars.peek() == Some(&'{') => out.push_str("\\$"),
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Mapping;

    fn map(pairs: Vec<(&str, Value)>) -> Value {
        Value::Mapping(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_owned(), v))
                .collect::<Mapping>(),
        )
    }

    #[test]
    fn empty_top_level_mapping() {
        assert_eq!(to_nix(&Value::Mapping(Mapping::new())).unwrap(), "{\n}");
    }

    #[test]
    fn empty_nested_mapping_gets_semicolon() {
        let v = map(vec![("a", Value::Mapping(Mapping::new()))]);
        assert_eq!(to_nix(&v).unwrap(), "{\n  a = {\n  };\n}");
    }

    #[test]
    fn nested_mapping_layout() {
        let v = map(vec![("a", map(vec![("b", "c".into())]))]);
        assert_eq!(to_nix(&v).unwrap(), "{\n  a = {\n    b = \"c\";\n  };\n}");
    }

    #[test]
    fn scalar_values_get_semicolons() {
        let v = map(vec![
            ("version", "13.0.1".into()),
            ("fetchSubmodules", false.into()),
            ("remotes", vec!["https://rubygems.org".to_owned()].into()),
        ]);
        assert_eq!(
            to_nix(&v).unwrap(),
            "{\n  version = \"13.0.1\";\n  fetchSubmodules = false;\n  remotes = [\"https://rubygems.org\"];\n}"
        );
    }

    #[test]
    fn non_identifier_keys_are_quoted() {
        let v = map(vec![
            ("net-ssh", true.into()),
            ("_private", true.into()),
            ("1password", true.into()),
            ("foo.bar", true.into()),
        ]);
        let out = to_nix(&v).unwrap();
        assert!(out.contains("  net-ssh = true;\n"));
        assert!(out.contains("  _private = true;\n"));
        assert!(out.contains("  \"1password\" = true;\n"));
        assert!(out.contains("  \"foo.bar\" = true;\n"));
    }

    #[test]
    fn sequence_elements_space_separated() {
        let v = Value::Sequence(vec!["a".into(), Value::Symbol("b".to_owned()), "c".into()]);
        assert_eq!(to_nix(&v).unwrap(), r#"["a" "b" "c"]"#);
        assert_eq!(to_nix(&Value::Sequence(Vec::new())).unwrap(), "[]");
    }

    #[test]
    fn sequence_with_non_text_element_fails() {
        let v = Value::Sequence(vec!["a".into(), Value::Bool(true)]);
        assert_eq!(to_nix(&v), Err(EncodeError::NonTextElement("boolean")));
    }

    #[test]
    fn text_escaping() {
        let v = Value::Text("say \"hi\"\\ ${x} $y\n".to_owned());
        assert_eq!(to_nix(&v).unwrap(), r#""say \"hi\"\\ \${x} $y\n""#);
    }

    #[test]
    fn identifier_pattern() {
        assert!(is_identifier("rails"));
        assert!(is_identifier("-dash"));
        assert!(is_identifier("a1_b-2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("9lives"));
        assert!(!is_identifier("has space"));
        assert!(!is_identifier("näive"));
    }

    #[test]
    fn output_is_deterministic() {
        let v = map(vec![
            ("b", map(vec![("x", "1".into())])),
            ("a", map(vec![("y", "2".into())])),
        ]);
        let first = to_nix(&v).unwrap();
        for _ in 0..10 {
            assert_eq!(to_nix(&v).unwrap(), first);
        }
        assert!(first.find("b =").unwrap() < first.find("a =").unwrap());
    }
}
