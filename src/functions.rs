use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// A function the model may be told about in a request.
///
/// `parameters` is a raw JSON schema object; this crate never interprets
/// it, it is forwarded to the provider as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

impl FunctionDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn to_tool(&self) -> Tool {
        Tool::from(self.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: ToolType,
    pub function: FunctionDefinition,
}

impl From<FunctionDefinition> for Tool {
    fn from(function: FunctionDefinition) -> Self {
        Self {
            kind: ToolType::Function,
            function,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolType {
    Function,
}

/// A function invocation found in a model response: name plus the parsed
/// argument object.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Value,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: Option<String>,
    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: None,
            function: FunctionCall::new(name, arguments),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

// On the wire the arguments travel as a JSON-encoded string, not a nested
// object, so the serde impls are written by hand.
impl Serialize for ToolCall {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let arguments = serde_json::to_string(&self.function.arguments)
            .map_err(|error| serde::ser::Error::custom(error.to_string()))?;

        let mut state = serializer.serialize_struct("ToolCall", 3)?;
        if let Some(id) = &self.id {
            state.serialize_field("id", id)?;
        }
        state.serialize_field("type", "function")?;
        state.serialize_field(
            "function",
            &WireFunctionCall {
                name: self.function.name.clone(),
                arguments,
            },
        )?;
        state.end()
    }
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

impl<'de> Deserialize<'de> for ToolCall {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct WireToolCall {
            id: Option<String>,
            #[serde(rename = "type")]
            kind: String,
            function: WireFunctionCall,
        }

        let raw = WireToolCall::deserialize(deserializer)?;
        if raw.kind != "function" {
            return Err(serde::de::Error::custom(format!(
                "unsupported tool call type '{}'",
                raw.kind
            )));
        }

        let arguments: Value = if raw.function.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&raw.function.arguments).map_err(|error| {
                serde::de::Error::custom(format!("failed to parse function arguments: {error}"))
            })?
        };

        Ok(Self {
            id: raw.id,
            function: FunctionCall {
                name: raw.function.name,
                arguments,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn tool_call_deserializes_from_wire_format() {
        let raw = r#"{
            "id": "call_1",
            "type": "function",
            "function": {"name": "get_weather", "arguments": "{\"location\": \"Paris\"}"}
        }"#;

        let call: ToolCall = serde_json::from_str(raw).expect("tool call");
        assert_eq!(call.id.as_deref(), Some("call_1"));
        assert_eq!(call.function.name, "get_weather");
        assert_eq!(call.function.arguments, json!({"location": "Paris"}));
    }

    #[test]
    fn tool_call_serializes_arguments_as_string() {
        let call = ToolCall::new("lookup", json!({"id": 7})).with_id("call_2");
        let value = serde_json::to_value(&call).expect("serialize");

        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "lookup");
        let arguments: Value =
            serde_json::from_str(value["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(arguments, json!({"id": 7}));
    }

    #[test]
    fn empty_argument_string_becomes_empty_object() {
        let raw = r#"{"type": "function", "function": {"name": "ping", "arguments": ""}}"#;
        let call: ToolCall = serde_json::from_str(raw).expect("tool call");
        assert_eq!(call.function.arguments, json!({}));
    }

    #[test]
    fn rejects_unknown_tool_call_type() {
        let raw = r#"{"type": "retrieval", "function": {"name": "x", "arguments": "{}"}}"#;
        assert!(serde_json::from_str::<ToolCall>(raw).is_err());
    }
}
