//! Shape detection for streamed completion chunks.
//!
//! Providers do not agree on where incremental text lives. OpenAI-style
//! chunks carry it at `choices[0].delta.content`, some proxies nest it one
//! level deeper at `delta.message.content`, and legacy completion chunks use a
//! flat `text` field. [`extract`] resolves all of these in one place with a
//! fixed precedence:
//!
//! 1. `delta.content`
//! 2. `delta.message.content`
//! 3. `text`
//!
//! A chunk with a `choices` array is resolved against its first choice;
//! anything else is resolved against the chunk itself.

use serde_json::Value;
use thiserror::Error;

/// One decoded `data:` payload from the provider stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Json(Value),
    /// Payload that was not valid JSON, kept verbatim for diagnostics.
    Malformed(String),
}

impl Fragment {
    /// Parse an SSE data payload. Never fails: bad JSON becomes
    /// [`Fragment::Malformed`] and is dealt with at extraction time.
    pub fn parse(data: &str) -> Self {
        match serde_json::from_str(data) {
            Ok(value) => Fragment::Json(value),
            Err(_) => Fragment::Malformed(data.to_string()),
        }
    }
}

impl From<Value> for Fragment {
    fn from(value: Value) -> Self {
        Fragment::Json(value)
    }
}

/// Text found in a fragment, tagged with the shape it was found at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentText {
    /// `delta.content`
    Delta(String),
    /// `delta.message.content`
    DeltaMessage(String),
    /// `text`
    Text(String),
}

impl FragmentText {
    pub fn as_str(&self) -> &str {
        match self {
            FragmentText::Delta(text)
            | FragmentText::DeltaMessage(text)
            | FragmentText::Text(text) => text,
        }
    }
}

/// A single fragment whose shape could not be read.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("fragment is not valid JSON: {0}")]
    NotJson(String),

    #[error("field '{field}' has type {found}, expected a string")]
    NotAString { field: &'static str, found: &'static str },
}

/// Resolve the text carried by `fragment`.
///
/// `Ok(None)` means the fragment matched none of the known shapes; it is
/// distinct from `Ok(Some(..))` carrying an empty string. JSON `null` counts as
/// absent.
pub fn extract(fragment: &Fragment) -> Result<Option<FragmentText>, ExtractError> {
    let value = match fragment {
        Fragment::Json(value) => value,
        Fragment::Malformed(raw) => return Err(ExtractError::NotJson(raw.clone())),
    };

    let choice = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .unwrap_or(value);

    if let Some(delta) = choice.get("delta") {
        if let Some(text) = string_field(delta.get("content"), "delta.content")? {
            return Ok(Some(FragmentText::Delta(text)));
        }
        let nested = delta.get("message").and_then(|message| message.get("content"));
        if let Some(text) = string_field(nested, "delta.message.content")? {
            return Ok(Some(FragmentText::DeltaMessage(text)));
        }
    }

    Ok(string_field(choice.get("text"), "text")?.map(FragmentText::Text))
}

fn string_field(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, ExtractError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(other) => Err(ExtractError::NotAString {
            field,
            found: json_type(other),
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract_json(value: Value) -> Result<Option<FragmentText>, ExtractError> {
        extract(&Fragment::from(value))
    }

    #[test]
    fn reads_each_known_shape() {
        assert_eq!(
            extract_json(json!({"delta": {"content": "a"}})).unwrap(),
            Some(FragmentText::Delta("a".into()))
        );
        assert_eq!(
            extract_json(json!({"delta": {"message": {"content": "b"}}})).unwrap(),
            Some(FragmentText::DeltaMessage("b".into()))
        );
        assert_eq!(
            extract_json(json!({"text": "c"})).unwrap(),
            Some(FragmentText::Text("c".into()))
        );
    }

    #[test]
    fn unwraps_first_choice() {
        let chunk = json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "delta": {"role": "assistant", "content": "Hi"}},
                {"index": 1, "delta": {"content": "ignored"}}
            ]
        });
        assert_eq!(
            extract_json(chunk).unwrap(),
            Some(FragmentText::Delta("Hi".into()))
        );
    }

    #[test]
    fn delta_takes_precedence_over_text() {
        let chunk = json!({"delta": {"content": "d"}, "text": "t"});
        assert_eq!(
            extract_json(chunk).unwrap(),
            Some(FragmentText::Delta("d".into()))
        );
    }

    #[test]
    fn empty_delta_falls_back_to_text() {
        let chunk = json!({"delta": {"role": "assistant"}, "text": "t"});
        assert_eq!(
            extract_json(chunk).unwrap(),
            Some(FragmentText::Text("t".into()))
        );
    }

    #[test]
    fn empty_string_is_not_absence() {
        assert_eq!(
            extract_json(json!({"delta": {"content": ""}})).unwrap(),
            Some(FragmentText::Delta(String::new()))
        );
    }

    #[test]
    fn null_and_missing_are_absent() {
        assert_eq!(extract_json(json!({"delta": {"content": null}})).unwrap(), None);
        assert_eq!(extract_json(json!({"bogus": "x"})).unwrap(), None);
        assert_eq!(extract_json(json!({"choices": []})).unwrap(), None);
        assert_eq!(
            extract_json(json!({"choices": [{"delta": {}, "finish_reason": "stop"}]})).unwrap(),
            None
        );
    }

    #[test]
    fn wrong_types_are_extraction_faults() {
        assert_eq!(
            extract_json(json!({"delta": {"content": 42}})),
            Err(ExtractError::NotAString {
                field: "delta.content",
                found: "number"
            })
        );
        assert!(matches!(
            extract(&Fragment::parse("{not json")),
            Err(ExtractError::NotJson(_))
        ));
    }
}
