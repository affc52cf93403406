//! Lenient repair of tool-call argument JSON.
//!
//! Model output is occasionally malformed: unescaped newlines inside string
//! values, a missing closing quote or brace, or a trailing comma before `}`
//! or `]`. None of these are fatal — the dispatcher repairs what it can and
//! falls back to an empty object rather than ever raising (§4.4, §7).

use serde_json::Value;

/// Parse `raw` as a JSON object, repairing common malformations first.
/// Never fails: returns `{}` if nothing recoverable comes out.
pub fn parse_tool_arguments(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Object(Default::default());
    }

    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return v;
    }

    let repaired = repair(trimmed);
    serde_json::from_str::<Value>(&repaired).unwrap_or_else(|_| Value::Object(Default::default()))
}

fn repair(raw: &str) -> String {
    let mut s = escape_raw_control_chars(raw);
    s = strip_trailing_commas(&s);
    s = balance_delimiters(&s);
    s
}

/// JSON strings may not contain literal control characters. Model output
/// sometimes emits a literal newline/tab inside a string value instead of
/// `\n`/`\t`; escape them wholesale since this function only runs after the
/// strict parse has already failed.
fn escape_raw_control_chars(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => {}
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out
}

fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Append any closing quote/brace/bracket needed to balance a truncated
/// argument string. This is a best-effort heuristic, not a parser.
fn balance_delimiters(raw: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    let mut stack = Vec::new();
    for ch in raw.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = raw.to_string();
    if in_string {
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_json_unchanged() {
        let v = parse_tool_arguments(r#"{"path": "."}"#);
        assert_eq!(v["path"], "." );
    }

    #[test]
    fn empty_input_falls_back_to_empty_object() {
        let v = parse_tool_arguments("");
        assert_eq!(v, Value::Object(Default::default()));
    }

    #[test]
    fn strips_trailing_comma() {
        let v = parse_tool_arguments(r#"{"a": 1, "b": 2,}"#);
        assert_eq!(v["a"], 1);
        assert_eq!(v["b"], 2);
    }

    #[test]
    fn escapes_literal_newline_in_string() {
        let v = parse_tool_arguments("{\"content\": \"line one\nline two\"}");
        assert_eq!(v["content"], "line one\\nline two".replace("\\n", "\n"));
    }

    #[test]
    fn balances_missing_closing_brace() {
        let v = parse_tool_arguments(r#"{"path": "foo"#);
        assert_eq!(v["path"], "foo");
    }

    #[test]
    fn irrecoverable_garbage_falls_back_to_empty_object() {
        let v = parse_tool_arguments("not json at all {{{");
        assert_eq!(v, Value::Object(Default::default()));
    }
}
