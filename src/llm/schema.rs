//! JSON-schema preparation for structured completions
//!
//! Providers with a strict JSON-schema mode reject schemas whose object
//! nodes allow additional properties, so every object-typed node is
//! rewritten before sending. Responses sometimes arrive wrapped in markdown
//! code fences; those are stripped before parsing.

use serde_json::Value;

/// Recursively force `additionalProperties: false` on every object-typed
/// node of `schema`, including nested `properties`, array `items`,
/// combinators, and `$defs`/`definitions`.
pub fn enforce_strict_objects(schema: &mut Value) {
    let Some(obj) = schema.as_object_mut() else {
        return;
    };

    let is_object_node = obj.get("type").and_then(Value::as_str) == Some("object") || obj.contains_key("properties");
    if is_object_node {
        obj.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    if let Some(props) = obj.get_mut("properties").and_then(Value::as_object_mut) {
        for child in props.values_mut() {
            enforce_strict_objects(child);
        }
    }

    if let Some(items) = obj.get_mut("items") {
        match items {
            Value::Array(list) => {
                for child in list {
                    enforce_strict_objects(child);
                }
            }
            other => enforce_strict_objects(other),
        }
    }

    for key in ["anyOf", "oneOf", "allOf"] {
        if let Some(list) = obj.get_mut(key).and_then(Value::as_array_mut) {
            for child in list {
                enforce_strict_objects(child);
            }
        }
    }

    for key in ["$defs", "definitions"] {
        if let Some(defs) = obj.get_mut(key).and_then(Value::as_object_mut) {
            for child in defs.values_mut() {
                enforce_strict_objects(child);
            }
        }
    }
}

/// Strip a leading/trailing markdown code fence (```json ... ``` or
/// ``` ... ```) from an LLM response, if present.
pub fn strip_json_fences(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the language tag on the opening fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => return trimmed,
    };

    match rest.rfind("```") {
        Some(idx) => rest[..idx].trim(),
        None => rest.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_enforce_on_flat_object() {
        let mut schema = json!({
            "type": "object",
            "properties": { "name": { "type": "string" } }
        });
        enforce_strict_objects(&mut schema);
        assert_eq!(schema["additionalProperties"], json!(false));
    }

    #[test]
    fn test_enforce_on_deeply_nested_objects() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "day_plans": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "visits": {
                                "type": "array",
                                "items": {
                                    "type": "object",
                                    "properties": { "poi_id": { "type": "string" } }
                                }
                            }
                        }
                    }
                }
            }
        });
        enforce_strict_objects(&mut schema);

        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(schema["properties"]["day_plans"]["items"]["additionalProperties"], json!(false));
        assert_eq!(
            schema["properties"]["day_plans"]["items"]["properties"]["visits"]["items"]["additionalProperties"],
            json!(false)
        );
    }

    #[test]
    fn test_enforce_inside_combinators_and_defs() {
        let mut schema = json!({
            "anyOf": [
                { "type": "object", "properties": { "a": { "type": "integer" } } },
                { "type": "string" }
            ],
            "$defs": {
                "leg": { "type": "object", "properties": { "mode": { "type": "string" } } }
            }
        });
        enforce_strict_objects(&mut schema);

        assert_eq!(schema["anyOf"][0]["additionalProperties"], json!(false));
        assert!(schema["anyOf"][1].get("additionalProperties").is_none());
        assert_eq!(schema["$defs"]["leg"]["additionalProperties"], json!(false));
    }

    #[test]
    fn test_non_object_nodes_untouched() {
        let mut schema = json!({ "type": "array", "items": { "type": "number" } });
        enforce_strict_objects(&mut schema);
        assert!(schema.get("additionalProperties").is_none());
    }

    #[test]
    fn test_strip_fences_json_tag() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_bare() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_json_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_passthrough() {
        assert_eq!(strip_json_fences("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_json_fences("plain text"), "plain text");
    }
}
