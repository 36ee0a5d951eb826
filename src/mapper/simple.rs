//! Mapper binding one singular simple SCIM attribute to one LDAP
//! attribute type.

use std::sync::Arc;

use crate::error::ScimResult;
use crate::ldap::entry::{Attribute, Entry};
use crate::ldap::filter::LdapFilter;
use crate::mapper::{simple_ldap_filter, AttributeMapper};
use crate::model::attribute::ScimAttribute;
use crate::model::object::ScimObject;
use crate::parser::filter_operator::FilterOp;
use crate::schema::descriptor::AttributeDescriptor;
use crate::transform::Transformation;

pub struct SimpleAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    ldap_attribute: String,
    transformation: Arc<dyn Transformation>,
}

impl SimpleAttributeMapper {
    pub fn new(
        descriptor: Arc<AttributeDescriptor>,
        ldap_attribute: impl Into<String>,
        transformation: Arc<dyn Transformation>,
    ) -> Self {
        Self {
            descriptor,
            ldap_attribute: ldap_attribute.into(),
            transformation,
        }
    }
}

impl AttributeMapper for SimpleAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        vec![self.ldap_attribute.clone()]
    }

    fn to_ldap_filter(
        &self,
        sub_attribute: Option<&str>,
        op: FilterOp,
        value: Option<&str>,
    ) -> ScimResult<Option<LdapFilter>> {
        if sub_attribute.is_some() {
            return Ok(None);
        }
        Ok(simple_ldap_filter(
            &self.ldap_attribute,
            self.transformation.as_ref(),
            op,
            value,
        ))
    }

    fn to_ldap_sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        if sub_attribute.is_some() {
            return None;
        }
        Some(self.ldap_attribute.clone())
    }

    fn to_ldap_attributes(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let attribute = object.get(self.descriptor.schema(), self.descriptor.name());
        if let Some(value) = attribute.and_then(|a| a.simple_value()) {
            let ldap_value = self.transformation.to_ldap_value(&self.descriptor, value)?;
            entry.add_attribute(Attribute::new(self.ldap_attribute.clone(), vec![ldap_value]));
        }
        Ok(())
    }

    fn to_scim_attribute(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        // A multi-valued LDAP attribute maps through its first value in
        // server order.
        let raw = match entry.attribute(&self.ldap_attribute).and_then(|a| a.values.first()) {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let value = self.transformation.to_scim_value(&self.descriptor, raw)?;
        Ok(Some(ScimAttribute::simple(self.descriptor.clone(), value)))
    }
}
