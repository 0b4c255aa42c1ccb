//! Record merger: add missing default fields to every record of a collection.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::Error;

/// Field name → default value. Immutable per run; every record receives its
/// own deep copy, so no nested value is shared between records.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultFieldSet(
    /// Ordered defaults; insertion order is the order keys are appended.
    pub Map<String, Value>,
);

/// Result of one merge pass.
#[derive(Debug)]
pub struct Merged {
    /// Number of fields added across all records.
    pub added: usize,
    /// The collection document with defaults filled in.
    pub document: Value,
    /// Number of records in the collection.
    pub records: usize,
}

impl Merged {
    /// Whether any record gained a field.
    pub const fn changed(&self) -> bool {
        return self.added > 0;
    }
}

/// Fill every record under `document[key]` with the defaults it lacks.
/// Existing keys are never touched, whatever their value or type. A document
/// without `key` is an empty collection.
///
/// # Errors
///
/// Returns `Error::MalformedCollection` if the document is not an object, if
/// `key` holds something other than a list, or if a record is not an object.
pub fn merge(
    file: &Path,
    document: &Value,
    key: &str,
    defaults: &DefaultFieldSet,
) -> Result<Merged, Error> {
    let mut document = document.clone();
    let Some(records) = collection_mut(file, &mut document, key)? else {
        return Ok(Merged {
            added: 0,
            document,
            records: 0,
        });
    };
    let record_count = records.len();
    let mut added = 0_usize;

    for (index, record) in records.iter_mut().enumerate() {
        let Some(fields) = record.as_object_mut() else {
            return Err(Error::MalformedCollection {
                file: file.to_path_buf(),
                reason: format!("record {index} under `{key}` is not an object"),
            });
        };
        added = added.saturating_add(fill_missing(fields, defaults));
    }

    tracing::debug!(records = record_count, added, "merged default fields");
    return Ok(Merged {
        added,
        document,
        records: record_count,
    });
}

/// Count records lacking at least one default field, without modifying anything.
///
/// # Errors
///
/// Same shape errors as [`merge`].
pub fn count_incomplete(
    file: &Path,
    document: &Value,
    key: &str,
    defaults: &DefaultFieldSet,
) -> Result<usize, Error> {
    let mut incomplete = 0_usize;
    for (index, record) in records_of(file, document, key)?.iter().enumerate() {
        let Some(fields) = record.as_object() else {
            return Err(Error::MalformedCollection {
                file: file.to_path_buf(),
                reason: format!("record {index} under `{key}` is not an object"),
            });
        };
        if defaults.0.keys().any(|k| return !fields.contains_key(k)) {
            incomplete = incomplete.saturating_add(1);
        }
    }
    return Ok(incomplete);
}

/// Serialize as the data file is stored: 2-space pretty JSON plus newline.
/// The output is re-parsed and must equal `document` exactly.
///
/// # Errors
///
/// Returns `Error::SerializationError` if serialization fails or the
/// round-trip produces a different value.
pub fn serialize_checked(file: &Path, document: &Value) -> Result<String, Error> {
    let mut text = serde_json::to_string_pretty(document).map_err(|e| {
        return Error::SerializationError {
            file: file.to_path_buf(),
            reason: e.to_string(),
        };
    })?;
    text.push('\n');

    let reparsed: Value = serde_json::from_str(&text).map_err(|e| {
        return Error::SerializationError {
            file: file.to_path_buf(),
            reason: format!("output does not re-parse: {e}"),
        };
    })?;
    if &reparsed != document {
        return Err(Error::SerializationError {
            file: file.to_path_buf(),
            reason: "output re-parses to a different value".to_string(),
        });
    }
    return Ok(text);
}

/// Mutable access to the record list, `None` when the key is absent.
fn collection_mut<'a>(
    file: &Path,
    document: &'a mut Value,
    key: &str,
) -> Result<Option<&'a mut Vec<Value>>, Error> {
    let Some(top) = document.as_object_mut() else {
        return Err(not_an_object(file));
    };
    return match top.get_mut(key) {
        None => Ok(None),
        Some(v) => v.as_array_mut().map(Some).ok_or_else(|| return not_a_list(file, key)),
    };
}

/// Insert each absent default; return how many were added.
fn fill_missing(fields: &mut Map<String, Value>, defaults: &DefaultFieldSet) -> usize {
    let mut added = 0_usize;
    for (k, v) in &defaults.0 {
        if !fields.contains_key(k) {
            fields.insert(k.clone(), v.clone());
            added = added.saturating_add(1);
        }
    }
    return added;
}

fn not_a_list(file: &Path, key: &str) -> Error {
    return Error::MalformedCollection {
        file: file.to_path_buf(),
        reason: format!("`{key}` is not a list"),
    };
}

fn not_an_object(file: &Path) -> Error {
    return Error::MalformedCollection {
        file: file.to_path_buf(),
        reason: "top-level value is not an object".to_string(),
    };
}

/// Read-only view of the record list; absent key reads as empty.
fn records_of<'a>(file: &Path, document: &'a Value, key: &str) -> Result<&'a [Value], Error> {
    let Some(top) = document.as_object() else {
        return Err(not_an_object(file));
    };
    return match top.get(key) {
        None => Ok(&[]),
        Some(v) => v.as_array().map(Vec::as_slice).ok_or_else(|| return not_a_list(file, key)),
    };
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "test code")]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn defaults(v: Value) -> DefaultFieldSet {
        let Value::Object(map) = v else { panic!("defaults must be an object") };
        return DefaultFieldSet(map);
    }

    fn file() -> &'static Path {
        return Path::new("drugs.json");
    }

    #[test]
    fn adds_missing_field_then_is_a_no_op() {
        let doc: Value = serde_json::from_str(r#"{"drugs":[{"id":"a"}]}"#).unwrap();
        let d = defaults(json!({"half_life": ""}));

        let first = merge(file(), &doc, "drugs", &d).unwrap();
        assert!(first.changed());
        assert_eq!(
            serde_json::to_string(&first.document).unwrap(),
            r#"{"drugs":[{"id":"a","half_life":""}]}"#
        );

        let second = merge(file(), &first.document, "drugs", &d).unwrap();
        assert!(!second.changed());
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn existing_keys_are_never_overwritten() {
        let doc = json!({"drugs": [
            {"id": "a", "half_life": null, "cyp_enzymes": "CYP3A4"},
            {"id": "b"}
        ]});
        let d = defaults(json!({"half_life": "", "cyp_enzymes": [], "physchem": {"mw": ""}}));

        let merged = merge(file(), &doc, "drugs", &d).unwrap();
        assert_eq!(merged.added, 4);
        assert_eq!(merged.records, 2);
        assert_eq!(
            merged.document,
            json!({"drugs": [
                {"id": "a", "half_life": null, "cyp_enzymes": "CYP3A4", "physchem": {"mw": ""}},
                {"id": "b", "half_life": "", "cyp_enzymes": [], "physchem": {"mw": ""}}
            ]})
        );
    }

    #[test]
    fn key_order_is_existing_then_defaults() {
        let doc = json!({"drugs": [{"zeta": 1, "alpha": 2}]});
        let d = defaults(json!({"pk_admet": "", "bbb": ""}));
        let merged = merge(file(), &doc, "drugs", &d).unwrap();
        let keys: Vec<&String> = merged.document["drugs"][0].as_object().unwrap().keys().collect();
        assert_eq!(keys, ["zeta", "alpha", "pk_admet", "bbb"]);
    }

    #[test]
    fn nested_defaults_are_independent_copies() {
        let doc = json!({"drugs": [{"id": "a"}, {"id": "b"}]});
        let d = defaults(json!({"physchem": {"mw": ""}}));
        let mut merged = merge(file(), &doc, "drugs", &d).unwrap().document;
        merged["drugs"][0]["physchem"]["mw"] = json!("151.2");
        assert_eq!(merged["drugs"][1]["physchem"]["mw"], json!(""));
        assert_eq!(d.0["physchem"]["mw"], json!(""));
    }

    #[test]
    fn absent_collection_is_empty_and_unchanged() {
        let doc = json!({"meta": {"count": 0}});
        let merged = merge(file(), &doc, "drugs", &defaults(json!({"bbb": ""}))).unwrap();
        assert!(!merged.changed());
        assert_eq!(merged.records, 0);
    }

    #[test]
    fn shape_errors_are_malformed_collection() {
        let d = defaults(json!({"bbb": ""}));
        for doc in [json!([1, 2]), json!({"drugs": {"id": "a"}}), json!({"drugs": ["a"]})] {
            let err = merge(file(), &doc, "drugs", &d).unwrap_err();
            assert!(matches!(err, Error::MalformedCollection { .. }), "{doc}");
        }
    }

    #[test]
    fn counts_incomplete_records() {
        let doc = json!({"drugs": [{"bbb": "high"}, {"id": "b"}, {}]});
        let n = count_incomplete(file(), &doc, "drugs", &defaults(json!({"bbb": ""}))).unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn serialized_form_keeps_unicode_and_ends_with_newline() {
        let doc = json!({"drugs": [{"name": "Drug–Drug", "clinical_pearls": ["•"]}]});
        let text = serialize_checked(file(), &doc).unwrap();
        assert!(text.ends_with("}\n"));
        assert!(text.contains("Drug–Drug"));
        assert!(text.contains("\n  \"drugs\": ["));
    }

    #[test]
    fn full_precision_floats_survive_serialization() {
        for raw in ["5281517519135030e-33", "187.3", "1e-7", "0.1"] {
            let doc: Value = serde_json::from_str(&format!("{{\"drugs\":[{{\"mw\":{raw}}}]}}")).unwrap();
            let text = serialize_checked(file(), &doc).unwrap();
            let reparsed: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(reparsed["drugs"][0]["mw"], doc["drugs"][0]["mw"], "{raw}");
        }
    }
}
