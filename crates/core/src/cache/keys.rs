use std::borrow::Cow;

use serde_json::Value;

/// Serializes a JSON value with object keys sorted at every depth.
///
/// Two logically identical parameter objects always produce the same string,
/// regardless of the order their fields were inserted in.
///
/// # Examples
///
/// ```
/// use lingocache_core::cache::canonical_json;
/// use serde_json::json;
///
/// let a = json!({ "level": "A1", "deck": "verbs" });
/// let b = json!({ "deck": "verbs", "level": "A1" });
/// assert_eq!(canonical_json(&a), canonical_json(&b));
/// assert_eq!(canonical_json(&a), r#"{"deck":"verbs","level":"A1"}"#);
/// ```
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a string value yields the escaped, quoted form.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => out.push_str(&leaf.to_string()),
    }
}

/// Returns the params object used to key a single entity by ID.
pub fn id_params(id: &str) -> Value {
    serde_json::json!({ "id": id })
}

/// Escapes the key separator so a collection name always ends at the first bare `:`.
fn collection_segment(collection: &str) -> Cow<'_, str> {
    if collection.contains([':', '\\']) {
        Cow::Owned(collection.replace('\\', "\\\\").replace(':', "\\:"))
    } else {
        Cow::Borrowed(collection)
    }
}

/// Returns the cache key for a `(collection, params)` lookup.
pub fn entity_key(collection: &str, params: &Value) -> String {
    format!("{}:{}", collection_segment(collection), canonical_json(params))
}

/// Returns the cache key for a query result of `operation` over `collection`.
pub fn query_key(collection: &str, operation: &str, options: &Value) -> String {
    format!(
        "{}:{}:{}",
        collection_segment(collection),
        operation,
        canonical_json(options)
    )
}

/// Returns the prefix shared by every key of a collection.
///
/// A `:` inside the collection name is escaped, so `users` never prefixes the
/// keys of `users:archive`.
pub fn collection_prefix(collection: &str) -> String {
    format!("{}:", collection_segment(collection))
}

/// Returns the regular expression matching every query key of a collection.
///
/// # Examples
///
/// ```
/// use lingocache_core::cache::collection_pattern;
///
/// assert_eq!(collection_pattern("flashcards"), "^flashcards:");
/// assert_eq!(collection_pattern("user.decks"), r"^user\.decks:");
/// assert_eq!(collection_pattern("users:archive"), r"^users\\:archive:");
/// ```
pub fn collection_pattern(collection: &str) -> String {
    format!("^{}:", regex::escape(&collection_segment(collection)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_json_sorts_nested_objects() {
        let a = json!({ "where": { "b": 1, "a": [ { "z": true, "y": null } ] }, "limit": 10 });
        let b = json!({ "limit": 10, "where": { "a": [ { "y": null, "z": true } ], "b": 1 } });

        assert_eq!(canonical_json(&a), canonical_json(&b));
        assert_eq!(
            canonical_json(&a),
            r#"{"limit":10,"where":{"a":[{"y":null,"z":true}],"b":1}}"#
        );
    }

    #[test]
    fn test_canonical_json_preserves_array_order() {
        let a = json!(["b", "a"]);
        let b = json!(["a", "b"]);
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn test_canonical_json_escapes_strings() {
        let value = json!({ "quote\"key": "line\nbreak" });
        assert_eq!(canonical_json(&value), r#"{"quote\"key":"line\nbreak"}"#);
    }

    #[test]
    fn test_entity_key() {
        assert_eq!(
            entity_key("users", &id_params("abc")),
            r#"users:{"id":"abc"}"#
        );
    }

    #[test]
    fn test_query_key() {
        assert_eq!(
            query_key("flashcards", "findAll", &Value::Null),
            "flashcards:findAll:null"
        );
        assert_eq!(
            query_key("flashcards", "count", &json!({ "deck": "verbs" })),
            r#"flashcards:count:{"deck":"verbs"}"#
        );
    }

    #[test]
    fn test_keys_share_collection_prefix() {
        let prefix = collection_prefix("users");
        assert!(entity_key("users", &id_params("1")).starts_with(&prefix));
        assert!(query_key("users", "findMany", &Value::Null).starts_with(&prefix));
        assert!(!entity_key("users_archive", &id_params("1")).starts_with(&prefix));
    }

    #[test]
    fn test_collection_pattern_escapes_metacharacters() {
        assert_eq!(collection_pattern("a+b"), r"^a\+b:");
    }

    #[test]
    fn test_separator_in_collection_name_is_escaped() {
        assert_eq!(
            entity_key("users:archive", &id_params("1")),
            r#"users\:archive:{"id":"1"}"#
        );
        assert_eq!(collection_prefix(r"a\b"), r"a\\b:");

        let prefix = collection_prefix("users");
        assert!(!entity_key("users:archive", &id_params("1")).starts_with(&prefix));
        assert!(!query_key("users:archive", "findAll", &Value::Null).starts_with(&prefix));

        let pattern = regex::Regex::new(&collection_pattern("users")).unwrap();
        assert!(!pattern.is_match(&query_key("users:archive", "count", &Value::Null)));
        assert!(pattern.is_match(&query_key("users", "count", &Value::Null)));

        let archive = regex::Regex::new(&collection_pattern("users:archive")).unwrap();
        assert!(archive.is_match(&query_key("users:archive", "count", &Value::Null)));
        assert!(!archive.is_match(&query_key("users", "count", &Value::Null)));
    }
}
