pub mod complex;
pub mod derived;
pub mod dn_template;
pub mod plural;
pub mod resource_mapper;
pub mod simple;

pub use complex::{ComplexAttributeMapper, SubAttributeMapping};
pub use derived::{DerivedAttribute, DerivedAttributeRegistry};
pub use dn_template::DnTemplate;
pub use plural::{PluralAttributeMapper, PluralMapping};
pub use resource_mapper::{ConflictPolicy, FixedAttribute, ResourceMapper, TranslatedFilter};
pub use simple::SimpleAttributeMapper;

use std::sync::Arc;

use crate::error::ScimResult;
use crate::ldap::entry::Entry;
use crate::ldap::filter::LdapFilter;
use crate::model::attribute::ScimAttribute;
use crate::model::object::ScimObject;
use crate::parser::filter_operator::FilterOp;
use crate::schema::descriptor::AttributeDescriptor;
use crate::transform::Transformation;

/// One SCIM↔LDAP attribute mapping strategy.
///
/// A mapper owns a fixed set of LDAP attribute types and translates in
/// both directions plus the filter and sort forms.
pub trait AttributeMapper: Send + Sync {
    fn descriptor(&self) -> &Arc<AttributeDescriptor>;

    /// The LDAP attribute types this mapper reads and writes.
    fn ldap_attribute_types(&self) -> Vec<String>;

    /// Translate a filter leaf addressing this attribute. `None` means the
    /// leaf cannot be expressed against the directory and the query must
    /// be post-filtered.
    fn to_ldap_filter(
        &self,
        sub_attribute: Option<&str>,
        op: FilterOp,
        value: Option<&str>,
    ) -> ScimResult<Option<LdapFilter>>;

    /// The LDAP attribute to sort by for this attribute path, if any.
    fn to_ldap_sort_attribute(&self, sub_attribute: Option<&str>) -> Option<String>;

    /// Write the attribute's LDAP representation into a staged entry when
    /// the SCIM attribute is present on the object.
    fn to_ldap_attributes(&self, object: &ScimObject, entry: &mut Entry) -> ScimResult<()>;

    /// Read the attribute from an LDAP entry, absent when the entry does
    /// not carry the mapped types.
    fn to_scim_attribute(&self, entry: &Entry) -> ScimResult<Option<ScimAttribute>>;
}

/// The SCIM-operator to LDAP-filter table shared by every mapper variant.
///
/// SCIM's strict GT/LT have no LDAP counterpart; they widen to GE/LE and
/// the query pipeline re-filters matching entries in memory.
pub(crate) fn simple_ldap_filter(
    ldap_attribute: &str,
    transformation: &dyn Transformation,
    op: FilterOp,
    value: Option<&str>,
) -> Option<LdapFilter> {
    let filter_value = value.map(|v| transformation.to_ldap_filter_value(v));
    match (op, filter_value) {
        (FilterOp::Present, _) => Some(LdapFilter::presence(ldap_attribute)),
        (FilterOp::Equal, Some(v)) => Some(LdapFilter::equality(ldap_attribute, v)),
        (FilterOp::Contains, Some(v)) => Some(LdapFilter::contains(ldap_attribute, v)),
        (FilterOp::StartsWith, Some(v)) => Some(LdapFilter::starts_with(ldap_attribute, v)),
        (FilterOp::GreaterThan | FilterOp::GreaterOrEqual, Some(v)) => {
            Some(LdapFilter::GreaterOrEqual(ldap_attribute.to_string(), v))
        }
        (FilterOp::LessThan | FilterOp::LessOrEqual, Some(v)) => {
            Some(LdapFilter::LessOrEqual(ldap_attribute.to_string(), v))
        }
        (_, None) => None,
    }
}
