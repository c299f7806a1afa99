//! Reading the answer text out of a gateway or relay JSON body.
//!
//! The RAG gateway sits behind an API-Gateway style integration, so the
//! answer can arrive in three shapes:
//!
//! ```text
//! {"answer": "..."}
//! {"body": {"answer": "..."}}
//! {"body": "{\"answer\": \"...\"}"}
//! ```
//!
//! The gateway itself names the field `retrieved_docs`; the relay renames it
//! to `answer`. Both names are accepted.

use serde_json::Value;
use thiserror::Error;

/// Text used when a well-formed reply carries no answer.
pub const NO_ANSWER: &str = "No answer available";

/// Field names that carry the answer, in lookup order.
pub const ANSWER_FIELDS: [&str; 2] = ["answer", "retrieved_docs"];

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("response is not a JSON object")]
    NotAnObject,
    #[error("nested body is not valid JSON: {0}")]
    BodyNotJson(#[source] serde_json::Error),
    #[error("field `{field}` has unsupported type {kind}")]
    UnexpectedType { field: &'static str, kind: &'static str },
}

/// Where the answer was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerSource {
    TopLevel,
    NestedObject,
    NestedString,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAnswer {
    pub text: Option<String>,
    pub source: AnswerSource,
}

/// Returns the answer text, or `None` when the reply is well formed but has
/// no answer field (or an explicit `null`).
pub fn extract_answer(value: &Value) -> Result<Option<String>, ExtractError> {
    inspect(value).map(|found| found.text)
}

/// Like [`extract_answer`] but also reports which shape matched.
pub fn inspect(value: &Value) -> Result<ExtractedAnswer, ExtractError> {
    let object = value.as_object().ok_or(ExtractError::NotAnObject)?;

    if let Some(text) = read_answer(object)? {
        return Ok(ExtractedAnswer {
            text: Some(text),
            source: AnswerSource::TopLevel,
        });
    }

    match object.get("body") {
        Some(Value::String(raw)) => {
            let nested: Value = serde_json::from_str(raw).map_err(ExtractError::BodyNotJson)?;
            let text = match nested.as_object() {
                Some(inner) => read_answer(inner)?,
                None => return Err(ExtractError::NotAnObject),
            };
            Ok(ExtractedAnswer {
                text,
                source: AnswerSource::NestedString,
            })
        }
        Some(Value::Object(inner)) => Ok(ExtractedAnswer {
            text: read_answer(inner)?,
            source: AnswerSource::NestedObject,
        }),
        _ => Ok(ExtractedAnswer {
            text: None,
            source: AnswerSource::TopLevel,
        }),
    }
}

fn read_answer(object: &serde_json::Map<String, Value>) -> Result<Option<String>, ExtractError> {
    for field in ANSWER_FIELDS {
        match object.get(field) {
            None | Some(Value::Null) => continue,
            Some(Value::String(text)) => return Ok(Some(text.clone())),
            Some(Value::Array(items)) => {
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                return Ok(Some(joined));
            }
            Some(other) => {
                return Err(ExtractError::UnexpectedType {
                    field,
                    kind: kind_of(other),
                })
            }
        }
    }
    Ok(None)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
