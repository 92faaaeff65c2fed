//! The dynamically-typed document value and shallow-merge algebra.
//!
//! A document is an arbitrary JSON value identified by its filesystem path.
//! The store never interprets document contents beyond what `merge` needs:
//! a shallow, top-level key merge that requires both sides to be objects.

use serde_json::Value;

/// A document's in-memory value. Arbitrary JSON; no schema is enforced.
pub type Document = Value;

/// Result of attempting a shallow merge.
#[derive(Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Merge applied; contains the merged document.
    Merged(Document),
    /// The current document is not an object.
    CurrentNotObject(&'static str),
    /// The partial value to merge in is not an object.
    PartialNotObject(&'static str),
}

/// Human-readable kind of a JSON value, for error messages.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Shallow-merge the top-level keys of `partial` into `current`.
///
/// Keys present in `partial` replace the corresponding keys of `current`
/// wholesale; nested objects are not merged recursively. Both values must be
/// JSON objects, otherwise the mismatching side's kind is reported.
pub fn shallow_merge(current: Document, partial: &Value) -> MergeOutcome {
    let Value::Object(incoming) = partial else {
        return MergeOutcome::PartialNotObject(json_kind(partial));
    };
    match current {
        Value::Object(mut base) => {
            for (key, value) in incoming {
                base.insert(key.clone(), value.clone());
            }
            MergeOutcome::Merged(Value::Object(base))
        }
        other => MergeOutcome::CurrentNotObject(json_kind(&other)),
    }
}
