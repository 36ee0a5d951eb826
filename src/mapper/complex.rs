//! Mapper for a singular complex SCIM attribute whose sub-attributes each
//! bind to their own LDAP attribute type.

use std::sync::Arc;

use crate::error::{ScimError, ScimResult};
use crate::ldap::entry::{Attribute, Entry};
use crate::ldap::filter::LdapFilter;
use crate::mapper::{simple_ldap_filter, AttributeMapper};
use crate::model::attribute::{ScimAttribute, ScimAttributeValue};
use crate::model::object::ScimObject;
use crate::parser::filter_operator::FilterOp;
use crate::schema::descriptor::AttributeDescriptor;
use crate::transform::Transformation;

/// Binding of one sub-attribute to an LDAP attribute type.
pub struct SubAttributeMapping {
    pub sub_descriptor: Arc<AttributeDescriptor>,
    pub ldap_attribute: String,
    pub transformation: Arc<dyn Transformation>,
}

pub struct ComplexAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    mappings: Vec<SubAttributeMapping>,
}

impl ComplexAttributeMapper {
    pub fn new(
        descriptor: Arc<AttributeDescriptor>,
        mappings: Vec<SubAttributeMapping>,
    ) -> ScimResult<Self> {
        for mapping in &mappings {
            if descriptor
                .sub_attribute(mapping.sub_descriptor.name())
                .is_none()
            {
                return Err(ScimError::Configuration(format!(
                    "'{}' has no sub-attribute '{}' to map",
                    descriptor.name(),
                    mapping.sub_descriptor.name()
                )));
            }
        }
        Ok(Self {
            descriptor,
            mappings,
        })
    }

    fn mapping(&self, sub_attribute: &str) -> Option<&SubAttributeMapping> {
        self.mappings
            .iter()
            .find(|m| m.sub_descriptor.name().eq_ignore_ascii_case(sub_attribute))
    }
}

impl AttributeMapper for ComplexAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.ldap_attribute.clone()).collect()
    }

    fn to_ldap_filter(
        &self,
        sub_attribute: Option<&str>,
        op: FilterOp,
        value: Option<&str>,
    ) -> ScimResult<Option<LdapFilter>> {
        let mapping = match sub_attribute.and_then(|name| self.mapping(name)) {
            Some(mapping) => mapping,
            None => return Ok(None),
        };
        Ok(simple_ldap_filter(
            &mapping.ldap_attribute,
            mapping.transformation.as_ref(),
            op,
            value,
        ))
    }

    fn to_ldap_sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        sub_attribute
            .and_then(|name| self.mapping(name))
            .map(|m| m.ldap_attribute.clone())
    }

    fn to_ldap_attributes(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let value = match object
            .get(self.descriptor.schema(), self.descriptor.name())
            .and_then(|a| a.singular_value())
        {
            Some(value) => value,
            None => return Ok(()),
        };
        for mapping in &self.mappings {
            if let Some(simple) = value
                .sub_attribute(mapping.sub_descriptor.name())
                .and_then(|a| a.simple_value())
            {
                let ldap_value = mapping
                    .transformation
                    .to_ldap_value(&mapping.sub_descriptor, simple)?;
                entry.add_attribute(Attribute::new(
                    mapping.ldap_attribute.clone(),
                    vec![ldap_value],
                ));
            }
        }
        Ok(())
    }

    fn to_scim_attribute(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        let mut sub_attributes = Vec::new();
        for mapping in &self.mappings {
            let raw = match entry
                .attribute(&mapping.ldap_attribute)
                .and_then(|a| a.values.first())
            {
                Some(raw) => raw,
                None => continue,
            };
            let value = mapping
                .transformation
                .to_scim_value(&mapping.sub_descriptor, raw)?;
            sub_attributes.push(ScimAttribute::simple(mapping.sub_descriptor.clone(), value));
        }
        if sub_attributes.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::singular(
            self.descriptor.clone(),
            ScimAttributeValue::Complex(sub_attributes),
        )))
    }
}
