//! SCIM attributes and attribute values.

use std::sync::Arc;

use crate::error::{ScimError, ScimResult};
use crate::model::value::SimpleValue;
use crate::schema::descriptor::AttributeDescriptor;

/// One attribute value: either a simple value or a map of sub-attributes
/// (complex values and plural elements).
#[derive(Debug, Clone, PartialEq)]
pub enum ScimAttributeValue {
    Simple(SimpleValue),
    Complex(Vec<ScimAttribute>),
}

impl ScimAttributeValue {
    pub fn is_complex(&self) -> bool {
        matches!(self, ScimAttributeValue::Complex(_))
    }

    pub fn simple(&self) -> Option<&SimpleValue> {
        match self {
            ScimAttributeValue::Simple(v) => Some(v),
            ScimAttributeValue::Complex(_) => None,
        }
    }

    pub fn sub_attributes(&self) -> &[ScimAttribute] {
        match self {
            ScimAttributeValue::Simple(_) => &[],
            ScimAttributeValue::Complex(attrs) => attrs,
        }
    }

    /// Case-insensitive sub-attribute lookup.
    pub fn sub_attribute(&self, name: &str) -> Option<&ScimAttribute> {
        self.sub_attributes()
            .iter()
            .find(|a| a.descriptor().name().eq_ignore_ascii_case(name))
    }

    /// The element's `value` sub-attribute as a simple value, for plural
    /// elements.
    pub fn element_value(&self) -> Option<&SimpleValue> {
        self.sub_attribute("value")
            .and_then(|a| a.singular_value())
            .and_then(|v| v.simple())
    }
}

/// An attribute: a descriptor plus one value (singular) or an ordered
/// sequence of values (plural).
#[derive(Debug, Clone, PartialEq)]
pub struct ScimAttribute {
    descriptor: Arc<AttributeDescriptor>,
    values: Vec<ScimAttributeValue>,
}

impl ScimAttribute {
    pub fn singular(
        descriptor: Arc<AttributeDescriptor>,
        value: ScimAttributeValue,
    ) -> ScimAttribute {
        ScimAttribute {
            descriptor,
            values: vec![value],
        }
    }

    pub fn simple(descriptor: Arc<AttributeDescriptor>, value: SimpleValue) -> ScimAttribute {
        ScimAttribute::singular(descriptor, ScimAttributeValue::Simple(value))
    }

    pub fn plural(
        descriptor: Arc<AttributeDescriptor>,
        values: Vec<ScimAttributeValue>,
    ) -> ScimAttribute {
        ScimAttribute { descriptor, values }
    }

    /// Build a complex value from named sub-attribute values, resolving
    /// each name against the descriptor's sub-attributes.
    pub fn complex_value(
        descriptor: &Arc<AttributeDescriptor>,
        sub_values: Vec<(&str, SimpleValue)>,
    ) -> ScimResult<ScimAttributeValue> {
        let mut attrs = Vec::with_capacity(sub_values.len());
        for (name, value) in sub_values {
            let sub_descriptor = descriptor.sub_attribute(name).ok_or_else(|| {
                ScimError::InvalidResource(format!(
                    "'{}' has no sub-attribute '{}'",
                    descriptor.name(),
                    name
                ))
            })?;
            attrs.push(ScimAttribute::simple(sub_descriptor.clone(), value));
        }
        Ok(ScimAttributeValue::Complex(attrs))
    }

    pub fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    pub fn is_plural(&self) -> bool {
        self.descriptor.is_multi_valued()
    }

    pub fn values(&self) -> &[ScimAttributeValue] {
        &self.values
    }

    /// The single value of a singular attribute.
    pub fn singular_value(&self) -> Option<&ScimAttributeValue> {
        if self.descriptor.is_multi_valued() {
            None
        } else {
            self.values.first()
        }
    }

    /// The single simple value of a singular simple attribute.
    pub fn simple_value(&self) -> Option<&SimpleValue> {
        self.singular_value().and_then(|v| v.simple())
    }

    /// Equality that ignores the ordering of plural values and of
    /// sub-attributes within complex values.
    pub fn equals_ignoring_order(&self, other: &ScimAttribute) -> bool {
        if !self
            .descriptor
            .matches(other.descriptor.schema(), other.descriptor.name())
        {
            return false;
        }
        if self.values.len() != other.values.len() {
            return false;
        }
        if !self.is_plural() {
            return self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(a, b)| values_equivalent(a, b));
        }
        self.values
            .iter()
            .all(|a| other.values.iter().any(|b| values_equivalent(a, b)))
            && other
                .values
                .iter()
                .all(|b| self.values.iter().any(|a| values_equivalent(a, b)))
    }
}

fn values_equivalent(a: &ScimAttributeValue, b: &ScimAttributeValue) -> bool {
    match (a, b) {
        (ScimAttributeValue::Simple(x), ScimAttributeValue::Simple(y)) => x == y,
        (ScimAttributeValue::Complex(xs), ScimAttributeValue::Complex(ys)) => {
            xs.len() == ys.len()
                && xs.iter().all(|x| {
                    ys.iter()
                        .any(|y| {
                            x.descriptor()
                                .name()
                                .eq_ignore_ascii_case(y.descriptor().name())
                                && x.equals_ignoring_order(y)
                        })
                })
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::DataType;
    use crate::schema::SCHEMA_URN_CORE;

    fn emails_descriptor() -> Arc<AttributeDescriptor> {
        Arc::new(
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
        )
    }

    fn element(descriptor: &Arc<AttributeDescriptor>, value: &str, tag: &str) -> ScimAttributeValue {
        ScimAttribute::complex_value(
            descriptor,
            vec![
                ("value", SimpleValue::String(value.to_string())),
                ("type", SimpleValue::String(tag.to_string())),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_complex_value_rejects_unknown_sub_attribute() {
        let descriptor = emails_descriptor();
        let result = ScimAttribute::complex_value(
            &descriptor,
            vec![("bogus", SimpleValue::String("x".to_string()))],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_element_value_lookup() {
        let descriptor = emails_descriptor();
        let value = element(&descriptor, "bjensen@example.com", "work");
        assert_eq!(
            value.element_value(),
            Some(&SimpleValue::String("bjensen@example.com".to_string()))
        );
        assert_eq!(
            value
                .sub_attribute("TYPE")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str()),
            Some("work")
        );
    }

    #[test]
    fn test_plural_equality_ignores_order() {
        let descriptor = emails_descriptor();
        let a = ScimAttribute::plural(
            descriptor.clone(),
            vec![
                element(&descriptor, "a@x.com", "work"),
                element(&descriptor, "b@x.com", "home"),
            ],
        );
        let b = ScimAttribute::plural(
            descriptor.clone(),
            vec![
                element(&descriptor, "b@x.com", "home"),
                element(&descriptor, "a@x.com", "work"),
            ],
        );
        assert!(a.equals_ignoring_order(&b));
        assert_ne!(a, b);
    }
}
