//! Decoder for the classifier's free-text reply.
//!
//! Grammar: take the outermost `{ ... }` span, parse it leniently (raw
//! control characters inside strings, trailing commas, duplicate keys), and
//! if that fails collapse doubled braces (`{{`, `}}`) and try once more. The
//! parsed value must be `{"Tweets": [ {"index": .., "topic": [..],
//! "subtopic": [..], "sentiment": [..]}, .. ]}`.

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::records::{ClassificationResult, Sentiment};

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("no JSON object in response")]
    NoJsonObject,
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("response has no \"Tweets\" array")]
    MissingTweets,
    #[error("entry {position} is malformed: {reason}")]
    BadEntry { position: usize, reason: String },
}

/// Locate the span from the first `{` to the last `}`.
pub fn extract_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (end > start).then(|| &response[start..=end])
}

/// Undo template escaping that doubles every brace.
pub fn collapse_doubled_braces(json: &str) -> String {
    json.replace("{{", "{").replace("}}", "}")
}

/// Escape raw control characters inside string literals and drop commas
/// that directly precede `}` or `]`.
pub fn relax(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma = String::new();

    for c in json.chars() {
        if in_string {
            match c {
                _ if escaped => {
                    escaped = false;
                    out.push(c);
                }
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
                c => out.push(c),
            }
            continue;
        }

        match c {
            ',' => {
                out.push_str(&pending_comma);
                pending_comma = ",".to_string();
            }
            c if c.is_whitespace() && !pending_comma.is_empty() => pending_comma.push(c),
            '}' | ']' => {
                // A comma right before a closer is dropped; its trailing whitespace is kept.
                out.push_str(pending_comma.trim_start_matches(','));
                pending_comma.clear();
                out.push(c);
            }
            c => {
                out.push_str(&pending_comma);
                pending_comma.clear();
                if c == '"' {
                    in_string = true;
                }
                out.push(c);
            }
        }
    }
    out.push_str(&pending_comma);
    out
}

fn parse_value(span: &str) -> Result<Value, DecodeError> {
    serde_json::from_str::<Value>(&relax(span)).map_err(|e| DecodeError::InvalidJson(e.to_string()))
}

/// Decode a raw classifier reply into per-excerpt results.
pub fn decode_response(response: &str) -> Result<Vec<ClassificationResult>, DecodeError> {
    let span = extract_object(response).ok_or(DecodeError::NoJsonObject)?;
    let value = match parse_value(span) {
        Ok(value) => value,
        Err(first) => {
            let repaired = collapse_doubled_braces(span);
            if repaired == span {
                return Err(first);
            }
            parse_value(&repaired)?
        }
    };

    let tweets = value
        .as_object()
        .and_then(|obj| {
            obj.iter()
                .find(|(k, _)| k.eq_ignore_ascii_case("tweets"))
                .map(|(_, v)| v)
        })
        .and_then(Value::as_array)
        .ok_or(DecodeError::MissingTweets)?;

    tweets
        .iter()
        .enumerate()
        .map(|(position, entry)| decode_entry(position, entry))
        .collect()
}

fn decode_entry(position: usize, entry: &Value) -> Result<ClassificationResult, DecodeError> {
    let bad = |reason: &str| DecodeError::BadEntry {
        position,
        reason: reason.to_string(),
    };
    let obj = entry.as_object().ok_or_else(|| bad("not an object"))?;

    let id = match obj.get("index") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
    .ok_or_else(|| bad("missing or non-numeric index"))?;

    let sentiment = labels(obj.get("sentiment"))
        .into_iter()
        .filter_map(|label| {
            let parsed = Sentiment::parse(&label);
            if parsed.is_none() {
                warn!(index = id, label = %label, "dropping unknown sentiment label");
            }
            parsed
        })
        .collect();

    Ok(ClassificationResult {
        id,
        topic: labels(obj.get("topic")),
        subtopic: labels(obj.get("subtopic")),
        sentiment,
    })
}

/// Missing, null and non-string members read as no labels; a bare string
/// reads as a single label.
fn labels(value: Option<&Value>) -> BTreeSet<String> {
    let raw: Vec<&str> = match value {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(s)) => vec![s.as_str()],
        _ => Vec::new(),
    };
    raw.into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escaped_braces_inside_prose() {
        let input = r#"garbage {{"Tweets": [{"index":1,"text":"x","topic":["a"],"subtopic":["b"],"sentiment":["positive"]}]}} trailing"#;
        let results = decode_response(input).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].topic, BTreeSet::from(["a".to_string()]));
        assert_eq!(results[0].subtopic, BTreeSet::from(["b".to_string()]));
        assert_eq!(results[0].sentiment, BTreeSet::from([Sentiment::Positive]));
    }

    #[test]
    fn test_code_fenced_reply() {
        let input = "Here you go:\n```json\n{\"Tweets\": [{\"index\": 2, \"topic\": [], \"subtopic\": [], \"sentiment\": [\"neutral\"]}]}\n```";
        let results = decode_response(input).unwrap();
        assert_eq!(results[0].id, 2);
        assert!(results[0].topic.is_empty());
    }

    #[test]
    fn test_trailing_commas_tolerated() {
        let input = r#"{"Tweets": [{"index": 1, "topic": ["a",], "subtopic": ["b"], "sentiment": ["negative"],},]}"#;
        let results = decode_response(input).unwrap();
        assert_eq!(results[0].topic, BTreeSet::from(["a".to_string()]));
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let input = r#"{"Tweets": [{"index": 1, "topic": ["old"], "topic": ["new"], "subtopic": ["b"], "sentiment": []}]}"#;
        let results = decode_response(input).unwrap();
        assert_eq!(results[0].topic, BTreeSet::from(["new".to_string()]));
    }

    #[test]
    fn test_raw_newline_inside_string() {
        let input = "{\"Tweets\": [{\"index\": 1, \"text\": \"line one\nline two\", \"topic\": [\"a\"], \"subtopic\": [\"b\"], \"sentiment\": [\"both\"]}]}";
        let results = decode_response(input).unwrap();
        assert_eq!(results[0].sentiment, BTreeSet::from([Sentiment::Both]));
    }

    #[test]
    fn test_nested_closing_braces_survive() {
        let input = r#"{"Tweets": [{"index": 1, "topic": ["a"], "subtopic": ["b"], "sentiment": [], "meta": {"k": 1}}]}"#;
        assert_eq!(decode_response(input).unwrap().len(), 1);
    }

    #[test]
    fn test_string_index_and_unknown_sentiment() {
        let input = r#"{"Tweets": [{"index": "7", "topic": "a", "subtopic": null, "sentiment": ["Positive", "sarcastic"]}]}"#;
        let results = decode_response(input).unwrap();
        assert_eq!(results[0].id, 7);
        assert_eq!(results[0].topic, BTreeSet::from(["a".to_string()]));
        assert!(results[0].subtopic.is_empty());
        assert_eq!(results[0].sentiment, BTreeSet::from([Sentiment::Positive]));
    }

    #[test]
    fn test_no_object() {
        assert_eq!(
            decode_response("I could not classify these."),
            Err(DecodeError::NoJsonObject)
        );
        assert_eq!(decode_response("} backwards {"), Err(DecodeError::NoJsonObject));
    }

    #[test]
    fn test_unparseable_object() {
        assert!(matches!(
            decode_response("{ this is not json }"),
            Err(DecodeError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_missing_tweets_array() {
        assert_eq!(
            decode_response(r#"{"Tweets": "none"}"#),
            Err(DecodeError::MissingTweets)
        );
        assert_eq!(decode_response(r#"{"rows": []}"#), Err(DecodeError::MissingTweets));
    }

    #[test]
    fn test_entry_without_index() {
        let input = r#"{"Tweets": [{"topic": ["a"]}]}"#;
        assert!(matches!(
            decode_response(input),
            Err(DecodeError::BadEntry { position: 0, .. })
        ));
    }

    #[test]
    fn test_relax_keeps_commas_inside_strings() {
        assert_eq!(relax(r#"{"a": "x,}", }"#), r#"{"a": "x,}" }"#);
    }
}
