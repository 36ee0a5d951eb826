//! Mapper for plural SCIM attributes.
//!
//! Two backing shapes: a canonicalized set of LDAP attribute types (one
//! type per plural type tag, e.g. `mail` for work emails) or a single
//! multi-valued LDAP attribute whose every value becomes one element.

use std::sync::Arc;

use crate::error::ScimResult;
use crate::ldap::entry::{Attribute, Entry};
use crate::ldap::filter::LdapFilter;
use crate::mapper::{simple_ldap_filter, AttributeMapper};
use crate::model::attribute::{ScimAttribute, ScimAttributeValue};
use crate::model::object::ScimObject;
use crate::model::value::SimpleValue;
use crate::parser::filter_operator::FilterOp;
use crate::schema::descriptor::AttributeDescriptor;
use crate::transform::Transformation;

/// Binding of one element sub-attribute to an LDAP attribute type,
/// optionally restricted to one plural type tag.
pub struct PluralMapping {
    pub plural_type: Option<String>,
    pub sub_attribute: String,
    pub ldap_attribute: String,
    pub transformation: Arc<dyn Transformation>,
}

pub struct PluralAttributeMapper {
    descriptor: Arc<AttributeDescriptor>,
    mappings: Vec<PluralMapping>,
}

impl PluralAttributeMapper {
    pub fn new(descriptor: Arc<AttributeDescriptor>, mappings: Vec<PluralMapping>) -> Self {
        Self {
            descriptor,
            mappings,
        }
    }

    /// Mappings applying to one element, selected by its `type` tag.
    /// Elements without a tag, or with an unrecognized one, use the
    /// untagged mappings or fall back to the first declared tag.
    fn mappings_for_type(&self, tag: Option<&str>) -> Vec<&PluralMapping> {
        if let Some(tag) = tag {
            let tagged: Vec<&PluralMapping> = self
                .mappings
                .iter()
                .filter(|m| {
                    m.plural_type
                        .as_deref()
                        .map(|t| t.eq_ignore_ascii_case(tag))
                        .unwrap_or(false)
                })
                .collect();
            if !tagged.is_empty() {
                return tagged;
            }
        }
        let untagged: Vec<&PluralMapping> = self
            .mappings
            .iter()
            .filter(|m| m.plural_type.is_none())
            .collect();
        if !untagged.is_empty() {
            return untagged;
        }
        let first_tag = self.mappings.first().and_then(|m| m.plural_type.as_deref());
        self.mappings
            .iter()
            .filter(|m| m.plural_type.as_deref() == first_tag)
            .collect()
    }

    fn element(
        &self,
        value: SimpleValue,
        sub_attribute: &str,
        tag: Option<&str>,
    ) -> ScimResult<ScimAttributeValue> {
        let mut sub_values = vec![(sub_attribute, value)];
        if let Some(tag) = tag {
            sub_values.push(("type", SimpleValue::String(tag.to_string())));
        }
        ScimAttribute::complex_value(&self.descriptor, sub_values)
    }
}

impl AttributeMapper for PluralAttributeMapper {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for mapping in &self.mappings {
            if !types
                .iter()
                .any(|t| t.eq_ignore_ascii_case(&mapping.ldap_attribute))
            {
                types.push(mapping.ldap_attribute.clone());
            }
        }
        types
    }

    fn to_ldap_filter(
        &self,
        sub_attribute: Option<&str>,
        op: FilterOp,
        value: Option<&str>,
    ) -> ScimResult<Option<LdapFilter>> {
        // A path without a sub-attribute addresses the element value.
        let sub_attribute = sub_attribute.unwrap_or("value");
        let components: Vec<LdapFilter> = self
            .mappings
            .iter()
            .filter(|m| m.sub_attribute.eq_ignore_ascii_case(sub_attribute))
            .filter_map(|m| {
                simple_ldap_filter(&m.ldap_attribute, m.transformation.as_ref(), op, value)
            })
            .collect();
        if components.is_empty() {
            return Ok(None);
        }
        Ok(Some(LdapFilter::or(components)))
    }

    fn to_ldap_sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String> {
        let sub_attribute = sub_attribute.unwrap_or("value");
        self.mappings
            .iter()
            .find(|m| m.sub_attribute.eq_ignore_ascii_case(sub_attribute))
            .map(|m| m.ldap_attribute.clone())
    }

    fn to_ldap_attributes(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()> {
        let attribute = match object.get(self.descriptor.schema(), self.descriptor.name()) {
            Some(attribute) => attribute,
            None => return Ok(()),
        };
        for element in attribute.values() {
            let tag = element
                .sub_attribute("type")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str());
            for mapping in self.mappings_for_type(tag) {
                let simple = match element {
                    ScimAttributeValue::Complex(_) => element
                        .sub_attribute(&mapping.sub_attribute)
                        .and_then(|a| a.simple_value()),
                    // Tolerate bare values in place of full elements.
                    ScimAttributeValue::Simple(simple)
                        if mapping.sub_attribute.eq_ignore_ascii_case("value") =>
                    {
                        Some(simple)
                    }
                    ScimAttributeValue::Simple(_) => None,
                };
                if let Some(simple) = simple {
                    let sub_descriptor = self
                        .descriptor
                        .sub_attribute(&mapping.sub_attribute)
                        .unwrap_or(&self.descriptor)
                        .clone();
                    let ldap_value = mapping.transformation.to_ldap_value(&sub_descriptor, simple)?;
                    entry.add_attribute(Attribute::new(
                        mapping.ldap_attribute.clone(),
                        vec![ldap_value],
                    ));
                }
            }
        }
        Ok(())
    }

    fn to_scim_attribute(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>> {
        let mut elements = Vec::new();
        let mut seen_tags: Vec<Option<&str>> = Vec::new();
        for mapping in &self.mappings {
            let tag = mapping.plural_type.as_deref();
            if seen_tags.contains(&tag) {
                continue;
            }
            seen_tags.push(tag);

            let group: Vec<&PluralMapping> = self
                .mappings
                .iter()
                .filter(|m| m.plural_type.as_deref() == tag)
                .collect();

            let value_mapping = group
                .iter()
                .find(|m| m.sub_attribute.eq_ignore_ascii_case("value"));

            if group.len() == 1 && value_mapping.is_some() {
                // One LDAP type carries the element values; every LDAP
                // value becomes one element.
                let mapping = group[0];
                if let Some(ldap_attribute) = entry.attribute(&mapping.ldap_attribute) {
                    let sub_descriptor = self
                        .descriptor
                        .sub_attribute("value")
                        .unwrap_or(&self.descriptor)
                        .clone();
                    for raw in &ldap_attribute.values {
                        let value = mapping.transformation.to_scim_value(&sub_descriptor, raw)?;
                        elements.push(self.element(value, "value", tag)?);
                    }
                }
            } else {
                // Several sub-attributes per element; read the first value
                // of each mapped type.
                let mut sub_values = Vec::new();
                for mapping in &group {
                    if let Some(raw) = entry
                        .attribute(&mapping.ldap_attribute)
                        .and_then(|a| a.values.first())
                    {
                        let sub_descriptor = self
                            .descriptor
                            .sub_attribute(&mapping.sub_attribute)
                            .unwrap_or(&self.descriptor)
                            .clone();
                        let value = mapping.transformation.to_scim_value(&sub_descriptor, raw)?;
                        sub_values.push((mapping.sub_attribute.as_str(), value));
                    }
                }
                if !sub_values.is_empty() {
                    if let Some(tag) = tag {
                        sub_values.push(("type", SimpleValue::String(tag.to_string())));
                    }
                    elements.push(ScimAttribute::complex_value(&self.descriptor, sub_values)?);
                }
            }
        }

        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }
}
