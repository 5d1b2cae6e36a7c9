use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;

/// Types the model must answer with. Automatically implemented for any
/// `JsonSchema + DeserializeOwned` type; the derived schema becomes the
/// forced tool's `input_schema`, so a non-conforming response fails
/// deserialization instead of leaking through as best-effort field access.
pub trait StructuredOutput: JsonSchema + DeserializeOwned {
    fn input_schema() -> serde_json::Value {
        let schema = schema_for!(Self);
        let mut value = serde_json::to_value(schema).unwrap_or_default();
        if let serde_json::Value::Object(map) = &mut value {
            map.remove("$schema");
            map.remove("title");
        }
        value
    }
}

impl<T: JsonSchema + DeserializeOwned> StructuredOutput for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Sample {
        name: String,
        score: f32,
    }

    #[test]
    fn schema_is_an_object_with_properties() {
        let schema = Sample::input_schema();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["name"].is_object());
        assert!(schema["properties"]["score"].is_object());
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn conforming_payload_deserializes() {
        let value = serde_json::json!({ "name": "armbar", "score": 8.2 });
        let sample: Sample = serde_json::from_value(value).unwrap();
        assert_eq!(sample.name, "armbar");
        assert!((sample.score - 8.2).abs() < f32::EPSILON);
    }
}
