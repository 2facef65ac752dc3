//! Pulling structured payloads out of free-form model text.

use serde_json::Value;

/// A balanced delimiter pair found in a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairMatch<'a> {
    /// Byte offset of the opening delimiter
    pub start: usize,
    /// Byte offset just past the closing delimiter
    pub end: usize,
    /// Text between the delimiters
    pub inner: &'a str,
    /// Text including the delimiters
    pub outer: &'a str,
}

/// Find the first balanced `(open, close)` pair in `text`.
///
/// Nested pairs are balanced. When both delimiters are the same string,
/// the first occurrence opens and the next one closes. Empty delimiters
/// never match.
pub fn find_first_pair<'a>(text: &'a str, (open, close): (&str, &str)) -> Option<PairMatch<'a>> {
    if open.is_empty() || close.is_empty() {
        return None;
    }

    let bytes = text.as_bytes();
    let same = open == close;
    let mut balance = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        let rest = &bytes[i..];
        if rest.starts_with(open.as_bytes()) && (!same || balance == 0) {
            if balance == 0 {
                start = i;
            }
            balance += 1;
            i += open.len();
        } else if rest.starts_with(close.as_bytes()) {
            if balance > 0 {
                balance -= 1;
                if balance == 0 {
                    let end = i + close.len();
                    return Some(PairMatch {
                        start,
                        end,
                        inner: &text[start + open.len()..i],
                        outer: &text[start..end],
                    });
                }
            }
            i += close.len();
        } else {
            i += 1;
        }
    }

    None
}

/// Parse JSON a model produced, tolerating the usual damage: trailing
/// commas, stray closing brackets, and unterminated strings, arrays or
/// objects.
pub fn parse_broken_json(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(text) {
        return Some(value);
    }
    serde_json::from_str(&repair_json(text)).ok()
}

fn repair_json(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
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
            '"' => {
                in_string = true;
                out.push(ch);
            }
            '{' => {
                closers.push('}');
                out.push(ch);
            }
            '[' => {
                closers.push(']');
                out.push(ch);
            }
            '}' | ']' => {
                // Unbalanced closers are dropped.
                if closers.last() == Some(&ch) {
                    closers.pop();
                    strip_trailing_comma(&mut out);
                    out.push(ch);
                }
            }
            _ => out.push(ch),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        strip_dangling(&mut out);
        out.push(closer);
    }
    out
}

fn strip_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}

/// Drop a trailing comma or a key left without its value.
fn strip_dangling(out: &mut String) {
    strip_trailing_comma(out);
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(':') {
        out.truncate(trimmed - 1);
        // The key itself is now dangling; remove it up to the previous
        // separator.
        if let Some(pos) = out.rfind(['{', ',']) {
            out.truncate(pos + 1);
            strip_trailing_comma(out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finds_simple_object() {
        let found = find_first_pair(r#"prefix {"a": 1} suffix"#, ("{", "}")).unwrap();
        assert_eq!(found.inner, r#""a": 1"#);
        assert_eq!(found.outer, r#"{"a": 1}"#);
        assert_eq!(found.start, 7);
        assert_eq!(found.end, 15);
    }

    #[test]
    fn unbalanced_has_no_match() {
        assert!(find_first_pair("only { opening", ("{", "}")).is_none());
    }

    #[test]
    fn nested_pairs_balance() {
        let found = find_first_pair(r#"x {"a": {"b": 2}} {"c": 3}"#, ("{", "}")).unwrap();
        assert_eq!(found.outer, r#"{"a": {"b": 2}}"#);
    }

    #[test]
    fn leading_closer_is_ignored() {
        let found = find_first_pair("} then {ok}", ("{", "}")).unwrap();
        assert_eq!(found.inner, "ok");
    }

    #[test]
    fn identical_delimiters() {
        let text = "intro ```json\n{}\n``` outro ```x```";
        let found = find_first_pair(text, ("```", "```")).unwrap();
        assert_eq!(found.inner, "json\n{}\n");
    }

    #[test]
    fn multibyte_text_is_safe() {
        let found = find_first_pair("žluťoučký {\"kůň\": 1}", ("{", "}")).unwrap();
        assert_eq!(found.outer, "{\"kůň\": 1}");
    }

    #[test]
    fn broken_json_trailing_commas() {
        assert_eq!(
            parse_broken_json(r#"{"a": [1, 2,], "b": "x",}"#),
            Some(json!({"a": [1, 2], "b": "x"}))
        );
    }

    #[test]
    fn broken_json_unterminated() {
        assert_eq!(
            parse_broken_json(r#"{"response": "partial answer"#),
            Some(json!({"response": "partial answer"}))
        );
        assert_eq!(
            parse_broken_json(r#"{"a": 1, "b":"#),
            Some(json!({"a": 1}))
        );
    }

    #[test]
    fn broken_json_stray_closer() {
        assert_eq!(parse_broken_json(r#"{"a": 1}}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn hopeless_input() {
        assert_eq!(parse_broken_json("not json at all"), None);
        assert_eq!(parse_broken_json("   "), None);
    }
}
