//! Cleanup and tolerant parsing of JSON emitted by models.
//!
//! Models wrap JSON in `<think>` blocks, markdown fences and prose, and
//! some answer with Python literals (`['a', 'b']`). The helpers here turn
//! such output into [`serde_json::Value`]s; they never fail loudly, a
//! hopeless input simply yields `None`.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

#[allow(clippy::expect_used)]
static THINK_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid regex"));

/// Strips reasoning blocks and code-fence markers from raw model output.
#[must_use]
pub fn clean_model_json(raw: &str) -> String {
    let without_think = THINK_BLOCK.replace_all(raw, "");
    without_think
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Parses a JSON array out of model output.
///
/// Tries, in order: the text between the first `[` and the last `]`, the
/// whole cleaned text, and a permissive Python-literal parse. Returns
/// `None` unless one of them yields an array.
#[must_use]
pub fn parse_array(raw: &str) -> Option<Vec<Value>> {
    let cleaned = clean_model_json(raw);

    let bracketed = match (cleaned.find('['), cleaned.rfind(']')) {
        (Some(start), Some(end)) if start < end => Some(&cleaned[start..=end]),
        _ => None,
    };

    let value = bracketed
        .and_then(|s| serde_json::from_str::<Value>(s).ok())
        .or_else(|| serde_json::from_str::<Value>(&cleaned).ok())
        .or_else(|| parse_literal(bracketed.unwrap_or(&cleaned)))?;

    match value {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Parses a JSON object out of model output.
///
/// Tries the raw text, the cleaned text, the text between the first `{`
/// and the last `}`, and finally a permissive Python-literal parse.
#[must_use]
pub fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    let value = serde_json::from_str::<Value>(raw.trim()).ok().or_else(|| {
        let cleaned = clean_model_json(raw);
        let braced = match (cleaned.find('{'), cleaned.rfind('}')) {
            (Some(start), Some(end)) if start < end => Some(&cleaned[start..=end]),
            _ => None,
        };
        serde_json::from_str::<Value>(&cleaned)
            .ok()
            .or_else(|| braced.and_then(|s| serde_json::from_str::<Value>(s).ok()))
            .or_else(|| parse_literal(braced.unwrap_or(&cleaned)))
    })?;

    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Parses a Python-style literal: single or double quoted strings,
/// `True`/`False`/`None`, numbers, lists, tuples and dicts.
///
/// The whole input must be one literal (surrounding whitespace allowed).
#[must_use]
pub fn parse_literal(input: &str) -> Option<Value> {
    let mut parser = LiteralParser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let value = parser.value()?;
    parser.skip_ws();
    (parser.pos == parser.chars.len()).then_some(value)
}

struct LiteralParser {
    chars: Vec<char>,
    pos: usize,
}

impl LiteralParser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn value(&mut self) -> Option<Value> {
        self.skip_ws();
        match self.peek()? {
            '[' => self.sequence('[', ']'),
            '(' => self.sequence('(', ')'),
            '{' => self.dict(),
            '\'' | '"' => self.string().map(Value::String),
            c if c == '-' || c == '+' || c.is_ascii_digit() => self.number(),
            _ => self.keyword(),
        }
    }

    fn sequence(&mut self, open: char, close: char) -> Option<Value> {
        self.eat(open).then_some(())?;
        let mut items = Vec::new();
        loop {
            if self.eat(close) {
                return Some(Value::Array(items));
            }
            items.push(self.value()?);
            if !self.eat(',') {
                return self.eat(close).then_some(Value::Array(items));
            }
        }
    }

    fn dict(&mut self) -> Option<Value> {
        self.eat('{').then_some(())?;
        let mut map = Map::new();
        loop {
            if self.eat('}') {
                return Some(Value::Object(map));
            }
            let key = match self.value()? {
                Value::String(s) => s,
                other => other.to_string(),
            };
            self.eat(':').then_some(())?;
            let value = self.value()?;
            map.insert(key, value);
            if !self.eat(',') {
                return self.eat('}').then_some(Value::Object(map));
            }
        }
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                c if c == quote => return Some(out),
                '\\' => match self.bump()? {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    other => out.push(other),
                },
                c => out.push(c),
            }
        }
    }

    fn number(&mut self) -> Option<Value> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E'))
        {
            self.pos += 1;
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if let Ok(n) = text.parse::<i64>() {
            return Some(Value::from(n));
        }
        text.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
    }

    fn keyword(&mut self) -> Option<Value> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphabetic()) {
            self.pos += 1;
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Some(Value::Bool(true)),
            "False" | "false" => Some(Value::Bool(false)),
            "None" | "null" => Some(Value::Null),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::json;
    use test_case::test_case;

    use super::*;

    #[test_case("<think>hmm [\"x\"]</think>[\"A\"]", "[\"A\"]" ; "think block")]
    #[test_case("```json\n[\"A\"]\n```", "[\"A\"]" ; "json fence")]
    #[test_case("  plain  ", "plain" ; "trims")]
    #[test_case("<think>\nmulti\nline\n</think>\n{}", "{}" ; "multiline think")]
    fn test_clean_model_json(raw: &str, expected: &str) {
        assert_eq!(clean_model_json(raw), expected);
    }

    #[test_case(r#"["A", "B"]"#, &["A", "B"] ; "plain json")]
    #[test_case("推荐科室如下：[\"A\"]，请参考", &["A"] ; "surrounding prose")]
    #[test_case("```json\n[\"B\"]\n```", &["B"] ; "fenced")]
    #[test_case("['A', 'C']", &["A", "C"] ; "python literal")]
    #[test_case("<think>[\"wrong\"]</think>\n[\"A\"]", &["A"] ; "ignores reasoning")]
    fn test_parse_array(raw: &str, expected: &[&str]) {
        let items = parse_array(raw).unwrap_or_default();
        let names: Vec<&str> = items.iter().filter_map(Value::as_str).collect();
        assert_eq!(names, expected);
    }

    #[test_case("no json here" ; "prose")]
    #[test_case(r#"{"roles": "A"}"# ; "object not array")]
    #[test_case("[unterminated" ; "unterminated")]
    fn test_parse_array_rejects(raw: &str) {
        assert!(parse_array(raw).is_none());
    }

    #[test]
    fn test_parse_object_fenced() {
        let raw = "```json\n{\"thought\": \"t\", \"tool\": null}\n```";
        let map = parse_object(raw).unwrap_or_default();
        assert_eq!(map.get("thought"), Some(&json!("t")));
        assert_eq!(map.get("tool"), Some(&Value::Null));
    }

    #[test]
    fn test_parse_object_with_prose() {
        let map = parse_object("好的。{\"final_answer\": \"ok\"} 以上").unwrap_or_default();
        assert_eq!(map.get("final_answer"), Some(&json!("ok")));
    }

    #[test]
    fn test_parse_object_rejects_array() {
        assert!(parse_object("[1, 2]").is_none());
    }

    #[test]
    fn test_parse_literal_nested() {
        let value = parse_literal("{'issues': [{'name': 'X', 'ok': True, 'n': -1.5}], 'x': None}");
        assert_eq!(
            value,
            Some(json!({"issues": [{"name": "X", "ok": true, "n": -1.5}], "x": null}))
        );
    }

    #[test]
    fn test_parse_literal_tuple_and_trailing_comma() {
        assert_eq!(parse_literal("('a', 'b',)"), Some(json!(["a", "b"])));
        assert_eq!(parse_literal("['it\\'s']"), Some(json!(["it's"])));
    }

    #[test]
    fn test_parse_literal_rejects_trailing_garbage() {
        assert!(parse_literal("['a'] extra").is_none());
        assert!(parse_literal("undefined").is_none());
    }

    proptest! {
        #[test]
        fn prop_clean_never_keeps_fences(body in "[a-z\\[\\]\", ]{0,40}") {
            let raw = format!("```json\n{body}\n```");
            prop_assert!(!clean_model_json(&raw).contains("```"));
        }

        #[test]
        fn prop_json_arrays_roundtrip(names in proptest::collection::vec("[a-zA-Z]{1,8}", 0..6)) {
            let raw = serde_json::to_string(&names).unwrap_or_default();
            let parsed = parse_array(&format!("结果：{raw}")).unwrap_or_default();
            let back: Vec<String> = parsed
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            prop_assert_eq!(back, names);
        }
    }
}
