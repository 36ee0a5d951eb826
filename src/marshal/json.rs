//! JSON wire form of the common resource representation.
//!
//! Core-schema attributes appear as top-level keys; each extension schema
//! nests its attributes in a JSON object keyed by the schema URN.

use serde_json::{json, Map, Number, Value};

use crate::error::{ScimError, ScimResult};
use crate::model::attribute::{ScimAttribute, ScimAttributeValue};
use crate::model::object::ScimObject;
use crate::model::query::ListResponse;
use crate::model::value::SimpleValue;
use crate::schema::descriptor::{AttributeDescriptor, DataType};
use crate::schema::registry::ResourceDescriptor;
use std::sync::Arc;

pub struct JsonMarshaller;

impl JsonMarshaller {
    pub fn marshal_object(object: &ScimObject, resource: &ResourceDescriptor) -> Value {
        let mut root = Map::new();

        let mut schemas = object.schemas();
        if schemas.is_empty() {
            schemas.push(resource.schema.clone());
        }
        root.insert(
            "schemas".to_string(),
            Value::Array(schemas.iter().cloned().map(Value::String).collect()),
        );

        for attribute in object.attributes_for_schema(&resource.schema) {
            root.insert(
                attribute.descriptor().name().to_string(),
                attribute_to_json(attribute),
            );
        }

        for schema in &schemas {
            if schema.eq_ignore_ascii_case(&resource.schema) {
                continue;
            }
            let mut extension = Map::new();
            for attribute in object.attributes_for_schema(schema) {
                extension.insert(
                    attribute.descriptor().name().to_string(),
                    attribute_to_json(attribute),
                );
            }
            root.insert(schema.clone(), Value::Object(extension));
        }

        Value::Object(root)
    }

    pub fn marshal_list(list: &ListResponse, resource: &ResourceDescriptor) -> Value {
        json!({
            "totalResults": list.total_results,
            "startIndex": list.start_index,
            "Resources": list
                .resources
                .iter()
                .map(|object| Self::marshal_object(object, resource))
                .collect::<Vec<Value>>(),
        })
    }

    pub fn marshal_error(error: &ScimError) -> Value {
        json!({
            "Errors": [
                {
                    "code": error.status_code(),
                    "description": error.detail(),
                }
            ]
        })
    }

    pub fn unmarshal_object(
        value: &Value,
        resource: &ResourceDescriptor,
    ) -> ScimResult<ScimObject> {
        let root = value.as_object().ok_or_else(|| {
            ScimError::InvalidResource("Resource payload must be a JSON object".to_string())
        })?;

        let mut object = ScimObject::new();
        for (key, entry) in root {
            if key.eq_ignore_ascii_case("schemas") {
                continue;
            }
            // An extension object is keyed by its schema URN.
            if key.contains(':') {
                if let Some(extension) = entry.as_object() {
                    for (name, sub_entry) in extension {
                        if let Some(descriptor) = resource.attribute(key, name) {
                            object.add(json_to_attribute(descriptor, sub_entry)?);
                        }
                    }
                }
                continue;
            }
            if let Some(descriptor) = resource.attribute(&resource.schema, key) {
                object.add(json_to_attribute(descriptor, entry)?);
            }
            // Unknown keys are silently ignored.
        }
        Ok(object)
    }

    pub fn unmarshal_list(
        value: &Value,
        resource: &ResourceDescriptor,
    ) -> ScimResult<ListResponse> {
        let root = value.as_object().ok_or_else(|| {
            ScimError::InvalidResource("List payload must be a JSON object".to_string())
        })?;

        let resources = match root.get("Resources") {
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| Self::unmarshal_object(entry, resource))
                .collect::<ScimResult<Vec<ScimObject>>>()?,
            Some(_) => {
                return Err(ScimError::InvalidResource(
                    "'Resources' must be an array".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let total_results = match root.get("totalResults") {
            Some(value) => value.as_u64().ok_or_else(|| {
                ScimError::InvalidResource("'totalResults' must be a number".to_string())
            })? as usize,
            None => resources.len(),
        };
        let start_index = match root.get("startIndex") {
            Some(value) => value.as_u64().ok_or_else(|| {
                ScimError::InvalidResource("'startIndex' must be a number".to_string())
            })? as usize,
            None => 1,
        };

        Ok(ListResponse {
            total_results,
            start_index,
            resources,
        })
    }

    pub fn unmarshal_error(value: &Value) -> ScimResult<ScimError> {
        let entry = value
            .get("Errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .ok_or_else(|| {
                ScimError::InvalidResource("Error payload carries no Errors array".to_string())
            })?;
        let code = match entry.get("code") {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(500) as u16,
            Some(Value::String(s)) => s.parse().map_err(|_| {
                ScimError::InvalidResource(format!("'{}' is not a status code", s))
            })?,
            _ => {
                return Err(ScimError::InvalidResource(
                    "Error entry carries no code".to_string(),
                ))
            }
        };
        let description = entry
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        Ok(ScimError::from_status(code, description))
    }
}

fn attribute_to_json(attribute: &ScimAttribute) -> Value {
    if attribute.is_plural() {
        Value::Array(
            attribute
                .values()
                .iter()
                .map(value_to_json)
                .collect::<Vec<Value>>(),
        )
    } else {
        attribute
            .values()
            .first()
            .map(value_to_json)
            .unwrap_or(Value::Null)
    }
}

fn value_to_json(value: &ScimAttributeValue) -> Value {
    match value {
        ScimAttributeValue::Simple(simple) => simple_to_json(simple),
        ScimAttributeValue::Complex(sub_attributes) => {
            let mut object = Map::new();
            for sub in sub_attributes {
                if let Some(simple) = sub.simple_value() {
                    object.insert(sub.descriptor().name().to_string(), simple_to_json(simple));
                }
            }
            Value::Object(object)
        }
    }
}

fn simple_to_json(value: &SimpleValue) -> Value {
    match value {
        SimpleValue::Boolean(b) => Value::Bool(*b),
        SimpleValue::Integer(i) => Value::Number(Number::from(*i)),
        other => Value::String(other.as_wire_string()),
    }
}

fn json_to_attribute(
    descriptor: &Arc<AttributeDescriptor>,
    value: &Value,
) -> ScimResult<ScimAttribute> {
    if descriptor.is_multi_valued() {
        let entries = value.as_array().ok_or_else(|| {
            ScimError::InvalidResource(format!(
                "'{}' is plural and must be a JSON array",
                descriptor.name()
            ))
        })?;
        let mut elements = Vec::with_capacity(entries.len());
        for entry in entries {
            elements.push(json_to_element(descriptor, entry)?);
        }
        Ok(ScimAttribute::plural(descriptor.clone(), elements))
    } else if descriptor.data_type() == DataType::Complex {
        Ok(ScimAttribute::singular(
            descriptor.clone(),
            json_to_complex(descriptor, value)?,
        ))
    } else {
        Ok(ScimAttribute::singular(
            descriptor.clone(),
            ScimAttributeValue::Simple(json_to_simple(descriptor, value)?),
        ))
    }
}

fn json_to_element(
    descriptor: &Arc<AttributeDescriptor>,
    value: &Value,
) -> ScimResult<ScimAttributeValue> {
    match value {
        Value::Object(_) => json_to_complex(descriptor, value),
        // A bare value stands for an element carrying only `value`.
        other => {
            let value_descriptor = descriptor.sub_attribute("value").ok_or_else(|| {
                ScimError::InvalidResource(format!(
                    "'{}' elements have no 'value' sub-attribute",
                    descriptor.name()
                ))
            })?;
            let simple = json_to_simple(value_descriptor, other)?;
            Ok(ScimAttributeValue::Complex(vec![ScimAttribute::simple(
                value_descriptor.clone(),
                simple,
            )]))
        }
    }
}

fn json_to_complex(
    descriptor: &Arc<AttributeDescriptor>,
    value: &Value,
) -> ScimResult<ScimAttributeValue> {
    let entries = value.as_object().ok_or_else(|| {
        ScimError::InvalidResource(format!(
            "'{}' must be a JSON object",
            descriptor.name()
        ))
    })?;
    let mut sub_attributes = Vec::new();
    for (name, entry) in entries {
        if let Some(sub_descriptor) = descriptor.sub_attribute(name) {
            let simple = json_to_simple(sub_descriptor, entry)?;
            sub_attributes.push(ScimAttribute::simple(sub_descriptor.clone(), simple));
        }
    }
    Ok(ScimAttributeValue::Complex(sub_attributes))
}

fn json_to_simple(
    descriptor: &Arc<AttributeDescriptor>,
    value: &Value,
) -> ScimResult<SimpleValue> {
    match (descriptor.data_type(), value) {
        (DataType::Boolean, Value::Bool(b)) => Ok(SimpleValue::Boolean(*b)),
        (DataType::Integer, Value::Number(n)) => n.as_i64().map(SimpleValue::Integer).ok_or_else(
            || {
                ScimError::InvalidAttributeValue(format!(
                    "'{}' is not an integer value for '{}'",
                    n,
                    descriptor.name()
                ))
            },
        ),
        (_, Value::String(s)) => SimpleValue::parse(descriptor.data_type(), s),
        (data_type, other) => Err(ScimError::InvalidAttributeValue(format!(
            "'{}' expects a {} value, got {}",
            descriptor.name(),
            data_type.as_str(),
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_URN_CORE;

    fn user_resource() -> ResourceDescriptor {
        let id = Arc::new(
            AttributeDescriptor::singular_simple(
                "id",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                true,
                false,
                false,
            )
            .unwrap(),
        );
        let user_name = Arc::new(
            AttributeDescriptor::singular_simple(
                "userName",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                true,
                false,
            )
            .unwrap(),
        );
        let active = Arc::new(
            AttributeDescriptor::singular_simple(
                "active",
                DataType::Boolean,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let family = Arc::new(
            AttributeDescriptor::singular_simple(
                "familyName",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let name = Arc::new(
            AttributeDescriptor::singular_complex(
                "name",
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                vec![family],
            )
            .unwrap(),
        );
        let emails = Arc::new(
            AttributeDescriptor::plural_simple(
                "emails",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
                vec!["work".to_string(), "home".to_string()],
            )
            .unwrap(),
        );
        ResourceDescriptor {
            name: "User".to_string(),
            endpoint: "Users".to_string(),
            schema: SCHEMA_URN_CORE.to_string(),
            attributes: vec![id, user_name, active, name, emails],
        }
    }

    fn sample_object(resource: &ResourceDescriptor) -> ScimObject {
        let mut object = ScimObject::new();
        let id = resource.attribute_by_name("id").unwrap();
        object.add(ScimAttribute::simple(
            id.clone(),
            SimpleValue::String("bjensen".to_string()),
        ));
        let user_name = resource.attribute_by_name("userName").unwrap();
        object.add(ScimAttribute::simple(
            user_name.clone(),
            SimpleValue::String("bjensen".to_string()),
        ));
        let name = resource.attribute_by_name("name").unwrap();
        object.add(ScimAttribute::singular(
            name.clone(),
            ScimAttribute::complex_value(
                name,
                vec![("familyName", SimpleValue::String("Jensen".to_string()))],
            )
            .unwrap(),
        ));
        object
    }

    #[test]
    fn test_marshal_matches_wire_shape() {
        let resource = user_resource();
        let object = sample_object(&resource);
        let value = JsonMarshaller::marshal_object(&object, &resource);
        assert_eq!(
            value,
            json!({
                "schemas": ["urn:scim:schemas:core:1.0"],
                "id": "bjensen",
                "userName": "bjensen",
                "name": {"familyName": "Jensen"}
            })
        );
    }

    #[test]
    fn test_unmarshal_round_trip() {
        let resource = user_resource();
        let object = sample_object(&resource);
        let value = JsonMarshaller::marshal_object(&object, &resource);
        let parsed = JsonMarshaller::unmarshal_object(&value, &resource).unwrap();
        assert!(parsed.equals_ignoring_order(&object));
    }

    #[test]
    fn test_unknown_attributes_ignored() {
        let resource = user_resource();
        let value = json!({
            "schemas": ["urn:scim:schemas:core:1.0"],
            "userName": "alice",
            "nickName": "al"
        });
        let parsed = JsonMarshaller::unmarshal_object(&value, &resource).unwrap();
        assert!(parsed.get(SCHEMA_URN_CORE, "userName").is_some());
        assert_eq!(parsed.attributes().len(), 1);
    }

    #[test]
    fn test_plural_elements() {
        let resource = user_resource();
        let value = json!({
            "schemas": ["urn:scim:schemas:core:1.0"],
            "emails": [
                {"value": "a@x.com", "type": "work", "primary": true},
                {"value": "b@x.net", "type": "home"}
            ]
        });
        let parsed = JsonMarshaller::unmarshal_object(&value, &resource).unwrap();
        let emails = parsed.get(SCHEMA_URN_CORE, "emails").unwrap();
        assert_eq!(emails.values().len(), 2);
        assert_eq!(
            emails.values()[0]
                .sub_attribute("primary")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_bool()),
            Some(true)
        );

        let serialized = JsonMarshaller::marshal_object(&parsed, &resource);
        assert_eq!(serialized["emails"][0]["value"], json!("a@x.com"));
        assert_eq!(serialized["emails"][1]["type"], json!("home"));
    }

    #[test]
    fn test_typed_parsing_failures() {
        let resource = user_resource();
        let value = json!({"active": "maybe"});
        assert!(matches!(
            JsonMarshaller::unmarshal_object(&value, &resource),
            Err(ScimError::InvalidAttributeValue(_))
        ));

        let value = json!({"emails": "not-an-array"});
        assert!(matches!(
            JsonMarshaller::unmarshal_object(&value, &resource),
            Err(ScimError::InvalidResource(_))
        ));
    }

    #[test]
    fn test_boolean_accepts_string_form() {
        let resource = user_resource();
        let value = json!({"active": "True"});
        let parsed = JsonMarshaller::unmarshal_object(&value, &resource).unwrap();
        assert_eq!(
            parsed
                .get(SCHEMA_URN_CORE, "active")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_bool()),
            Some(true)
        );
    }

    #[test]
    fn test_list_envelope_round_trip() {
        let resource = user_resource();
        let list = ListResponse {
            total_results: 2,
            start_index: 1,
            resources: vec![sample_object(&resource)],
        };
        let value = JsonMarshaller::marshal_list(&list, &resource);
        assert_eq!(value["totalResults"], json!(2));

        let parsed = JsonMarshaller::unmarshal_list(&value, &resource).unwrap();
        assert_eq!(parsed.total_results, 2);
        assert_eq!(parsed.start_index, 1);
        assert_eq!(parsed.resources.len(), 1);
    }

    #[test]
    fn test_list_envelope_defaults() {
        let resource = user_resource();
        let value = json!({"Resources": [{"userName": "a"}]});
        let parsed = JsonMarshaller::unmarshal_list(&value, &resource).unwrap();
        assert_eq!(parsed.total_results, 1);
        assert_eq!(parsed.start_index, 1);
    }

    #[test]
    fn test_error_round_trip() {
        let error = ScimError::NotFound("User not found".to_string());
        let value = JsonMarshaller::marshal_error(&error);
        let parsed = JsonMarshaller::unmarshal_error(&value).unwrap();
        assert_eq!(parsed, error);
    }
}
