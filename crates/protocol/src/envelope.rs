use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::MessageType;

/// A single wire message.
///
/// The native host speaks flat JSON objects: requests carry `type` and
/// `id`, responses carry `id` (plus `error` on failure), and push events
/// carry only `type`. Every other key lives in [`Message::fields`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub msg_type: Option<MessageType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Message {
    /// Creates a message of the given type with no id and no fields.
    pub fn new(msg_type: impl Into<MessageType>) -> Self {
        Self {
            msg_type: Some(msg_type.into()),
            ..Self::default()
        }
    }

    /// Creates a message whose fields are taken from a serializable payload.
    ///
    /// The payload must serialize to a JSON object; its keys are merged
    /// into the top level of the message.
    pub fn with_payload<T: Serialize>(
        msg_type: impl Into<MessageType>,
        payload: &T,
    ) -> Result<Self, serde_json::Error> {
        let fields = match serde_json::to_value(payload)? {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(serde::ser::Error::custom(
                    "message payload must serialize to a JSON object",
                ));
            }
        };
        Ok(Self {
            msg_type: Some(msg_type.into()),
            fields,
            ..Self::default()
        })
    }

    /// Creates a response carrying the given correlation id.
    pub fn response(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Creates an error response for the given correlation id.
    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            error: Some(Value::String(message.into())),
            ..Self::default()
        }
    }

    /// Creates a response to this message, preserving its id.
    pub fn reply(&self) -> Self {
        Self {
            id: self.id.clone(),
            ..Self::default()
        }
    }

    /// Creates an error response to this message, preserving its id.
    pub fn reply_error(&self, message: impl Into<String>) -> Self {
        Self {
            id: self.id.clone(),
            error: Some(Value::String(message.into())),
            ..Self::default()
        }
    }

    /// Sets the correlation id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the message type.
    pub fn with_type(mut self, msg_type: impl Into<MessageType>) -> Self {
        self.msg_type = Some(msg_type.into());
        self
    }

    /// Adds a top-level field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Returns a top-level field, if present.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Returns `true` if the message carries the given type.
    pub fn is_type(&self, msg_type: &MessageType) -> bool {
        self.msg_type.as_ref() == Some(msg_type)
    }

    /// Returns the error text of a failed response.
    ///
    /// `null` counts as no error. Objects with a `message` key yield that
    /// key; any other value is rendered as JSON.
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => Some(match obj.get("message") {
                Some(Value::String(s)) => s.clone(),
                _ => Value::Object(obj.clone()).to_string(),
            }),
            other => Some(other.to_string()),
        }
    }

    /// Deserializes the whole message into a typed view.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(serde_json::to_value(self)?)
    }
}
