use crate::errors::{ServiceBusError, ServiceBusResult};
use crate::model::Payload;
use serde_json::Value;

/// JSON property carrying the record's type id.
pub const TYPE_PROPERTY: &str = "_type";

/// An encoded record ready to hand to a [`MessageSink`](crate::publisher::MessageSink).
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub message_id: String,
    pub type_id: String,
    pub body: Vec<u8>,
}

/// Converts records to and from JSON text message bodies.
///
/// Bodies look like `{"_type":"Employee","name":"exampleName","id":"10001"}`.
/// Decoding accepts bodies without `_type`, but a present `_type` must match
/// the requested record.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageConverter;

impl MessageConverter {
    pub fn to_message<T: Payload>(record: &T) -> ServiceBusResult<OutboundMessage> {
        let mut value = serde_json::to_value(record)
            .map_err(|e| ServiceBusError::SerializationFailed(e.to_string()))?;

        let Value::Object(fields) = &mut value else {
            return Err(ServiceBusError::SerializationFailed(format!(
                "{} does not serialize to a JSON object",
                T::TYPE_ID
            )));
        };
        fields.insert(
            TYPE_PROPERTY.to_string(),
            Value::String(T::TYPE_ID.to_string()),
        );

        let body = serde_json::to_vec(&value)
            .map_err(|e| ServiceBusError::SerializationFailed(e.to_string()))?;

        Ok(OutboundMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            type_id: T::TYPE_ID.to_string(),
            body,
        })
    }

    pub fn from_message<T: Payload>(body: &[u8]) -> ServiceBusResult<T> {
        let mut value: Value = serde_json::from_slice(body)
            .map_err(|e| ServiceBusError::DeserializationFailed(e.to_string()))?;

        if let Value::Object(fields) = &mut value {
            match fields.remove(TYPE_PROPERTY) {
                Some(Value::String(actual)) if actual != T::TYPE_ID => {
                    return Err(ServiceBusError::TypeMismatch {
                        expected: T::TYPE_ID.to_string(),
                        actual,
                    });
                }
                Some(Value::String(_)) | None => {}
                Some(other) => {
                    return Err(ServiceBusError::DeserializationFailed(format!(
                        "'{TYPE_PROPERTY}' must be a string, got {other}"
                    )));
                }
            }
        }

        serde_json::from_value(value)
            .map_err(|e| ServiceBusError::DeserializationFailed(format!("{}: {e}", T::TYPE_ID)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Email, Employee};
    use claims::{assert_err, assert_ok};

    #[test]
    fn test_body_carries_type_and_fields() {
        let message = assert_ok!(MessageConverter::to_message(&Employee::new(
            "exampleName",
            "10001"
        )));

        let value: Value = assert_ok!(serde_json::from_slice(&message.body));
        assert_eq!(value["_type"], "Employee");
        assert_eq!(value["name"], "exampleName");
        assert_eq!(value["id"], "10001");
        assert_eq!(message.type_id, "Employee");
        assert_ok!(uuid::Uuid::parse_str(&message.message_id));
    }

    #[test]
    fn test_message_ids_are_unique() {
        let email = Email::new("info@example.com", "Hello");
        let first = assert_ok!(MessageConverter::to_message(&email));
        let second = assert_ok!(MessageConverter::to_message(&email));
        assert_ne!(first.message_id, second.message_id);
        assert_eq!(first.body, second.body);
    }

    #[test]
    fn test_decodes_body_without_type_property() {
        let email: Email = assert_ok!(MessageConverter::from_message(
            br#"{"address":"a@b.c","subject":"Hi"}"#
        ));
        assert_eq!(email, Email::new("a@b.c", "Hi"));
    }

    #[test]
    fn test_rejects_other_record_type() {
        let message = assert_ok!(MessageConverter::to_message(&Email::new("a@b.c", "Hi")));
        let err = assert_err!(MessageConverter::from_message::<Employee>(&message.body));
        assert_eq!(
            err,
            ServiceBusError::TypeMismatch {
                expected: "Employee".into(),
                actual: "Email".into(),
            }
        );
    }

    #[test]
    fn test_rejects_invalid_bodies() {
        let bodies: [&[u8]; 3] = [
            b"not json",
            br#"{"name":"only-name"}"#,
            br#"{"_type":42,"name":"n","id":"i"}"#,
        ];
        for body in bodies {
            let err = assert_err!(MessageConverter::from_message::<Employee>(body));
            assert!(matches!(err, ServiceBusError::DeserializationFailed(_)));
        }
    }
}
