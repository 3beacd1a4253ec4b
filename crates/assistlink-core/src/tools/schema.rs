//! Conversion of abstract tool parameter schemas to function-calling JSON Schema.
//!
//! Hosts describe tool parameters with [`ParameterSchema`]. Host-specific
//! selector shapes go through a pluggable [`SchemaSerializer`]; everything
//! else has a fixed JSON Schema rendering.

use serde_json::{json, Map, Value};

use super::ToolSpec;
use crate::provider::types::{FunctionDefinition, JsonSchemaFormat, ToolDefinition};

/// Abstract parameter schema as declared by a host tool.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterSchema {
    String,
    Integer,
    Number,
    Boolean,
    /// String restricted to a fixed set of values.
    Enum(Vec<String>),
    Array(Box<ParameterSchema>),
    Object(Vec<Field>),
    /// Object with arbitrary keys.
    AnyObject,
    /// Host selector configuration, rendered by a [`SchemaSerializer`].
    Selector(Value),
}

/// A named property of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub required: bool,
    pub description: Option<String>,
    pub schema: ParameterSchema,
}

impl Field {
    pub fn required(name: &str, schema: ParameterSchema) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: None,
            schema,
        }
    }

    pub fn optional(name: &str, schema: ParameterSchema) -> Self {
        Self {
            name: name.into(),
            required: false,
            description: None,
            schema,
        }
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Renders host selector configurations to JSON Schema.
pub trait SchemaSerializer: Send + Sync {
    fn serialize(&self, selector: &Value) -> Value;
}

/// Default selector rendering.
///
/// Selectors are single-key objects such as `{"entity": {"domain": "light"}}`
/// or `{"select": {"options": ["a", "b"]}}`. A bare string names a selector
/// with no configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectorSerializer;

impl SchemaSerializer for SelectorSerializer {
    fn serialize(&self, selector: &Value) -> Value {
        let (kind, config) = match selector {
            Value::String(kind) => (kind.as_str(), Value::Null),
            Value::Object(map) => match map.iter().next() {
                Some((kind, config)) => (kind.as_str(), config.clone()),
                None => return json!({"type": "string"}),
            },
            _ => return json!({"type": "string"}),
        };

        let single = match kind {
            "number" => {
                let mut schema = Map::new();
                schema.insert("type".into(), json!("number"));
                if let Some(min) = config.get("min") {
                    schema.insert("minimum".into(), min.clone());
                }
                if let Some(max) = config.get("max") {
                    schema.insert("maximum".into(), max.clone());
                }
                Value::Object(schema)
            }
            "boolean" => json!({"type": "boolean"}),
            "select" => {
                let options: Vec<Value> = config
                    .get("options")
                    .and_then(Value::as_array)
                    .map(|opts| {
                        opts.iter()
                            .filter_map(|o| match o {
                                Value::String(_) => Some(o.clone()),
                                Value::Object(_) => o.get("value").cloned(),
                                _ => None,
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                json!({"type": "string", "enum": options})
            }
            "object" => json!({"type": "object", "additionalProperties": true}),
            _ => json!({"type": "string"}),
        };

        let multiple = config
            .get("multiple")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if multiple {
            json!({"type": "array", "items": single})
        } else {
            single
        }
    }
}

/// Render `schema` to JSON Schema, delegating selectors to `serializer`.
pub fn convert(schema: &ParameterSchema, serializer: &dyn SchemaSerializer) -> Value {
    match schema {
        ParameterSchema::String => json!({"type": "string"}),
        ParameterSchema::Integer => json!({"type": "integer"}),
        ParameterSchema::Number => json!({"type": "number"}),
        ParameterSchema::Boolean => json!({"type": "boolean"}),
        ParameterSchema::Enum(values) => json!({"type": "string", "enum": values}),
        ParameterSchema::Array(items) => {
            json!({"type": "array", "items": convert(items, serializer)})
        }
        ParameterSchema::AnyObject => json!({"type": "object", "additionalProperties": true}),
        ParameterSchema::Selector(selector) => serializer.serialize(selector),
        ParameterSchema::Object(fields) => {
            let mut properties = Map::new();
            let mut required = Vec::new();
            for field in fields {
                let mut prop = convert(&field.schema, serializer);
                if let (Some(desc), Value::Object(map)) = (&field.description, &mut prop) {
                    map.insert("description".into(), json!(desc));
                }
                properties.insert(field.name.clone(), prop);
                if field.required {
                    required.push(json!(field.name));
                }
            }

            let mut object = Map::new();
            object.insert("type".into(), json!("object"));
            object.insert("properties".into(), Value::Object(properties));
            if !required.is_empty() {
                object.insert("required".into(), Value::Array(required));
            }
            Value::Object(object)
        }
    }
}

/// Format a host tool as a function-calling tool definition.
pub fn format_tool(tool: &ToolSpec, serializer: &dyn SchemaSerializer) -> ToolDefinition {
    ToolDefinition {
        def_type: "function".into(),
        function: FunctionDefinition {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: convert(&tool.parameters, serializer),
        },
    }
}

/// Format a structured-output schema as a strict named JSON Schema.
pub fn format_structured_output(
    name: &str,
    schema: &ParameterSchema,
    serializer: &dyn SchemaSerializer,
) -> JsonSchemaFormat {
    let mut schema = convert(schema, serializer);
    adjust_schema(&mut schema);
    JsonSchemaFormat {
        name: name.into(),
        strict: true,
        schema,
    }
}

/// Ensure every object node with `properties` declares a `required` array.
///
/// Recurses through properties and array items. Idempotent.
pub fn adjust_schema(schema: &mut Value) {
    let Some(node) = schema.as_object_mut() else {
        return;
    };

    match node.get("type").and_then(Value::as_str) {
        Some("object") => {
            if !node.contains_key("properties") {
                return;
            }
            node.entry("required").or_insert_with(|| json!([]));
            if let Some(Value::Object(props)) = node.get_mut("properties") {
                for prop in props.values_mut() {
                    adjust_schema(prop);
                }
            }
        }
        Some("array") => {
            if let Some(items) = node.get_mut("items") {
                adjust_schema(items);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light_tool() -> ToolSpec {
        ToolSpec {
            name: "HassLightSet".into(),
            description: Some("Sets the brightness or color of a light".into()),
            parameters: ParameterSchema::Object(vec![
                Field::required("name", ParameterSchema::String).describe("Light name"),
                Field::optional("brightness", ParameterSchema::Integer),
                Field::optional(
                    "domain",
                    ParameterSchema::Array(Box::new(ParameterSchema::Enum(vec![
                        "light".into(),
                        "switch".into(),
                    ]))),
                ),
            ]),
        }
    }

    #[test]
    fn test_format_tool() {
        let def = format_tool(&light_tool(), &SelectorSerializer);
        assert_eq!(def.def_type, "function");
        assert_eq!(def.function.name, "HassLightSet");
        let params = &def.function.parameters;
        assert_eq!(params["type"], "object");
        assert_eq!(params["required"], json!(["name"]));
        assert_eq!(params["properties"]["name"]["description"], "Light name");
        assert_eq!(params["properties"]["domain"]["items"]["enum"], json!(["light", "switch"]));
    }

    #[test]
    fn test_format_tool_is_deterministic() {
        let a = format_tool(&light_tool(), &SelectorSerializer);
        let b = format_tool(&light_tool(), &SelectorSerializer);
        assert_eq!(a, b);
    }

    #[test]
    fn test_tool_without_description() {
        let tool = ToolSpec {
            name: "GetLiveContext".into(),
            description: None,
            parameters: ParameterSchema::Object(vec![]),
        };
        let def = format_tool(&tool, &SelectorSerializer);
        let wire = serde_json::to_value(&def).unwrap();
        assert!(wire["function"].get("description").is_none());
        assert!(wire["function"]["parameters"].get("required").is_none());
    }

    #[test]
    fn test_selector_rendering() {
        let s = SelectorSerializer;
        assert_eq!(s.serialize(&json!({"entity": {"domain": "light"}})), json!({"type": "string"}));
        assert_eq!(
            s.serialize(&json!({"number": {"min": 0, "max": 100}})),
            json!({"type": "number", "minimum": 0, "maximum": 100})
        );
        assert_eq!(
            s.serialize(&json!({"select": {"options": ["a", {"value": "b", "label": "B"}]}})),
            json!({"type": "string", "enum": ["a", "b"]})
        );
        assert_eq!(
            s.serialize(&json!({"area": {"multiple": true}})),
            json!({"type": "array", "items": {"type": "string"}})
        );
        assert_eq!(s.serialize(&json!("boolean")), json!({"type": "boolean"}));
    }

    struct FixedSerializer;

    impl SchemaSerializer for FixedSerializer {
        fn serialize(&self, _selector: &Value) -> Value {
            json!({"type": "string", "format": "custom"})
        }
    }

    #[test]
    fn test_custom_serializer_is_used() {
        let tool = ToolSpec {
            name: "pick".into(),
            description: None,
            parameters: ParameterSchema::Object(vec![Field::required(
                "target",
                ParameterSchema::Selector(json!({"entity": {}})),
            )]),
        };
        let def = format_tool(&tool, &FixedSerializer);
        assert_eq!(def.function.parameters["properties"]["target"]["format"], "custom");
    }

    #[test]
    fn test_adjust_schema_adds_required_recursively() {
        let mut schema = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {"name": {"type": "string"}}
                    }
                },
                "meta": {"type": "object", "properties": {}}
            }
        });
        adjust_schema(&mut schema);
        assert_eq!(schema["required"], json!([]));
        assert_eq!(schema["properties"]["items"]["items"]["required"], json!([]));
        assert_eq!(schema["properties"]["meta"]["required"], json!([]));
    }

    #[test]
    fn test_adjust_schema_keeps_existing_required() {
        let mut schema = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"]
        });
        adjust_schema(&mut schema);
        assert_eq!(schema["required"], json!(["a"]));
    }

    #[test]
    fn test_adjust_schema_leaves_bare_object() {
        let mut schema = json!({"type": "object", "additionalProperties": true});
        let before = schema.clone();
        adjust_schema(&mut schema);
        assert_eq!(schema, before);
    }

    #[test]
    fn test_adjust_schema_is_idempotent() {
        let mut once = convert(&light_tool().parameters, &SelectorSerializer);
        adjust_schema(&mut once);
        let mut twice = once.clone();
        adjust_schema(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_structured_output_is_strict() {
        let schema = ParameterSchema::Object(vec![Field::optional(
            "summary",
            ParameterSchema::String,
        )]);
        let format = format_structured_output("weather", &schema, &SelectorSerializer);
        assert_eq!(format.name, "weather");
        assert!(format.strict);
        assert_eq!(format.schema["required"], json!([]));
    }
}
