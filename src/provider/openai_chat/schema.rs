use serde_json::{Map, Value};

/// Rewrites a JSON Schema so every object lists all of its properties in `required`.
///
/// Strict structured outputs reject schemas whose `required` is a subset of
/// `properties`. The rewrite applies to the root, to nested object-typed properties and
/// to object-typed array items, recursively. Everything else is left untouched.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use hibiki_llm::provider::openai_chat::make_all_properties_required;
///
/// let schema = json!({
///     "type": "object",
///     "properties": {"a": {"type": "string"}, "b": {"type": "integer"}},
///     "required": ["a"]
/// });
/// let rewritten = make_all_properties_required(&schema);
/// assert_eq!(rewritten["required"], json!(["a", "b"]));
/// ```
pub fn make_all_properties_required(schema: &Value) -> Value {
    let mut schema = schema.clone();
    if let Value::Object(root) = &mut schema {
        require_all(root);
    }
    schema
}

fn require_all(node: &mut Map<String, Value>) {
    let required = match node.get_mut("properties") {
        Some(Value::Object(properties)) => {
            for property in properties.values_mut() {
                let Value::Object(property) = property else {
                    continue;
                };
                if is_object_schema(property) {
                    require_all(property);
                }
                if let Some(Value::Object(items)) = property.get_mut("items") {
                    if is_object_schema(items) {
                        require_all(items);
                    }
                }
            }
            properties
                .keys()
                .map(|key| Value::String(key.clone()))
                .collect::<Vec<_>>()
        }
        _ => return,
    };
    node.insert("required".to_string(), Value::Array(required));
}

/// `"type": "object"` or a type union containing `"object"`.
fn is_object_schema(node: &Map<String, Value>) -> bool {
    match node.get("type") {
        Some(Value::String(kind)) => kind == "object",
        Some(Value::Array(kinds)) => kinds.iter().any(|kind| kind == "object"),
        _ => false,
    }
}
