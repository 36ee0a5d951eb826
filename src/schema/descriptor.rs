//! Immutable metadata describing SCIM attributes.

use std::sync::Arc;

use crate::error::{ScimError, ScimResult};

/// SCIM attribute data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    String,
    Boolean,
    Integer,
    DateTime,
    Binary,
    Complex,
}

impl DataType {
    pub fn parse(s: &str) -> Option<DataType> {
        match s.to_lowercase().as_str() {
            "string" => Some(DataType::String),
            "boolean" => Some(DataType::Boolean),
            "integer" => Some(DataType::Integer),
            "datetime" => Some(DataType::DateTime),
            "binary" => Some(DataType::Binary),
            "complex" => Some(DataType::Complex),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::DateTime => "dateTime",
            DataType::Binary => "binary",
            DataType::Complex => "complex",
        }
    }
}

/// Immutable descriptor for one SCIM attribute.
///
/// Built once at configuration load; shared via `Arc` afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    schema: String,
    name: String,
    data_type: DataType,
    multi_valued: bool,
    read_only: bool,
    required: bool,
    case_exact: bool,
    description: String,
    sub_attributes: Vec<Arc<AttributeDescriptor>>,
    plural_types: Vec<String>,
}

impl AttributeDescriptor {
    /// A singular attribute with a simple data type.
    pub fn singular_simple(
        name: &str,
        data_type: DataType,
        schema: &str,
        description: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
    ) -> ScimResult<AttributeDescriptor> {
        if data_type == DataType::Complex {
            return Err(ScimError::Configuration(format!(
                "Attribute '{}' declared simple but typed complex",
                name
            )));
        }
        Ok(AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type,
            multi_valued: false,
            read_only,
            required,
            case_exact,
            description: description.to_string(),
            sub_attributes: Vec::new(),
            plural_types: Vec::new(),
        })
    }

    /// A singular complex attribute with the given sub-attributes.
    pub fn singular_complex(
        name: &str,
        schema: &str,
        description: &str,
        read_only: bool,
        required: bool,
        sub_attributes: Vec<Arc<AttributeDescriptor>>,
    ) -> ScimResult<AttributeDescriptor> {
        validate_sub_attributes(name, &sub_attributes)?;
        Ok(AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type: DataType::Complex,
            multi_valued: false,
            read_only,
            required,
            case_exact: false,
            description: description.to_string(),
            sub_attributes,
            plural_types: Vec::new(),
        })
    }

    /// A plural attribute whose element `value` carries a simple data type.
    ///
    /// The element sub-attributes are synthesized: `value` of the given
    /// type plus the standard `type`, `primary`, `display` and `operation`
    /// tags every plural element may carry.
    pub fn plural_simple(
        name: &str,
        data_type: DataType,
        schema: &str,
        description: &str,
        read_only: bool,
        required: bool,
        case_exact: bool,
        plural_types: Vec<String>,
    ) -> ScimResult<AttributeDescriptor> {
        if data_type == DataType::Complex {
            return Err(ScimError::Configuration(format!(
                "Plural attribute '{}' declared simple but typed complex",
                name
            )));
        }
        let value = Arc::new(AttributeDescriptor::singular_simple(
            "value", data_type, schema, "", read_only, false, case_exact,
        )?);
        let sub_attributes = augment_plural_sub_attributes(vec![value], schema)?;
        Ok(AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type,
            multi_valued: true,
            read_only,
            required,
            case_exact,
            description: description.to_string(),
            sub_attributes,
            plural_types,
        })
    }

    /// A plural attribute with explicitly declared element sub-attributes.
    ///
    /// Standard element tags (`type`, `primary`, `display`, `operation`)
    /// not declared by the configuration are filled in.
    pub fn plural_complex(
        name: &str,
        schema: &str,
        description: &str,
        read_only: bool,
        required: bool,
        plural_types: Vec<String>,
        sub_attributes: Vec<Arc<AttributeDescriptor>>,
    ) -> ScimResult<AttributeDescriptor> {
        let sub_attributes = augment_plural_sub_attributes(sub_attributes, schema)?;
        validate_sub_attributes(name, &sub_attributes)?;
        Ok(AttributeDescriptor {
            schema: schema.to_string(),
            name: name.to_string(),
            data_type: DataType::Complex,
            multi_valued: true,
            read_only,
            required,
            case_exact: false,
            description: description.to_string(),
            sub_attributes,
            plural_types,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn is_multi_valued(&self) -> bool {
        self.multi_valued
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn is_case_exact(&self) -> bool {
        self.case_exact
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sub_attributes(&self) -> &[Arc<AttributeDescriptor>] {
        &self.sub_attributes
    }

    pub fn plural_types(&self) -> &[String] {
        &self.plural_types
    }

    /// Case-insensitive sub-attribute lookup.
    pub fn sub_attribute(&self, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.sub_attributes
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
    }

    /// Whether this descriptor describes the same `(schema, name)` key.
    pub fn matches(&self, schema: &str, name: &str) -> bool {
        self.schema.eq_ignore_ascii_case(schema) && self.name.eq_ignore_ascii_case(name)
    }

    /// Whether a plural type tag is recognized by this descriptor.
    pub fn has_plural_type(&self, tag: &str) -> bool {
        self.plural_types.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

fn validate_sub_attributes(
    name: &str,
    sub_attributes: &[Arc<AttributeDescriptor>],
) -> ScimResult<()> {
    for (i, sub) in sub_attributes.iter().enumerate() {
        if sub.data_type == DataType::Complex || sub.multi_valued {
            return Err(ScimError::Configuration(format!(
                "Sub-attribute '{}' of '{}' must be singular and simple",
                sub.name, name
            )));
        }
        if sub_attributes[..i]
            .iter()
            .any(|d| d.name.eq_ignore_ascii_case(&sub.name))
        {
            return Err(ScimError::Configuration(format!(
                "Duplicate sub-attribute '{}' of '{}'",
                sub.name, name
            )));
        }
    }
    Ok(())
}

/// Standard plural element tags filled in when the configuration leaves
/// them out, so elements can always carry `type`, `primary` and friends.
fn augment_plural_sub_attributes(
    mut sub_attributes: Vec<Arc<AttributeDescriptor>>,
    schema: &str,
) -> ScimResult<Vec<Arc<AttributeDescriptor>>> {
    let standard: [(&str, DataType); 4] = [
        ("type", DataType::String),
        ("primary", DataType::Boolean),
        ("display", DataType::String),
        ("operation", DataType::String),
    ];
    for (name, data_type) in standard {
        if !sub_attributes
            .iter()
            .any(|d| d.name().eq_ignore_ascii_case(name))
        {
            sub_attributes.push(Arc::new(AttributeDescriptor::singular_simple(
                name, data_type, schema, "", false, false, false,
            )?));
        }
    }
    Ok(sub_attributes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_URN_CORE;

    #[test]
    fn test_singular_simple_rejects_complex_type() {
        let result = AttributeDescriptor::singular_simple(
            "userName",
            DataType::Complex,
            SCHEMA_URN_CORE,
            "",
            false,
            true,
            false,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_sub_attribute_lookup_case_insensitive() {
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
        let name = AttributeDescriptor::singular_complex(
            "name",
            SCHEMA_URN_CORE,
            "Components of the user's name",
            false,
            false,
            vec![family],
        )
        .unwrap();

        assert!(name.sub_attribute("FAMILYNAME").is_some());
        assert!(name.sub_attribute("middleName").is_none());
    }

    #[test]
    fn test_duplicate_sub_attribute_rejected() {
        let a = Arc::new(
            AttributeDescriptor::singular_simple(
                "value",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let b = Arc::new(
            AttributeDescriptor::singular_simple(
                "VALUE",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let result = AttributeDescriptor::singular_complex(
            "thing",
            SCHEMA_URN_CORE,
            "",
            false,
            false,
            vec![a, b],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_plural_gets_standard_element_tags() {
        let emails = AttributeDescriptor::plural_simple(
            "emails",
            DataType::String,
            SCHEMA_URN_CORE,
            "Email addresses",
            false,
            false,
            false,
            vec!["work".to_string(), "home".to_string()],
        )
        .unwrap();

        assert!(emails.is_multi_valued());
        assert!(emails.sub_attribute("value").is_some());
        assert!(emails.sub_attribute("type").is_some());
        assert!(emails.sub_attribute("primary").is_some());
        assert!(emails.has_plural_type("WORK"));
        assert!(!emails.has_plural_type("other"));
    }

    #[test]
    fn test_matches_is_case_insensitive_on_both_parts() {
        let descriptor = AttributeDescriptor::singular_simple(
            "userName",
            DataType::String,
            SCHEMA_URN_CORE,
            "",
            false,
            true,
            false,
        )
        .unwrap();
        assert!(descriptor.matches("URN:SCIM:SCHEMAS:CORE:1.0", "username"));
        assert!(!descriptor.matches(SCHEMA_URN_CORE, "displayName"));
    }
}
