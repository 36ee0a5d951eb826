//! Per-resource SCIM↔LDAP translation.

use std::sync::Arc;

use crate::context::RequestContext;
use crate::error::{ScimError, ScimResult};
use crate::ldap::client::DirectoryClient;
use crate::ldap::entry::{Attribute, Entry, Modification, SearchScope, SortKey};
use crate::ldap::filter::LdapFilter;
use crate::mapper::derived::DerivedAttribute;
use crate::mapper::dn_template::DnTemplate;
use crate::mapper::AttributeMapper;
use crate::model::attribute::ScimAttribute;
use crate::model::object::ScimObject;
use crate::model::query::{QueryAttributes, SortParameters};
use crate::model::value::SimpleValue;
use crate::parser::filter_operator::ScimFilter;
use crate::schema::descriptor::{AttributeDescriptor, DataType};

/// What to do when a fixed attribute collides with mapper-produced values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Append the fixed values to whatever the mappers produced.
    Merge,
    /// Discard mapper values in favor of the fixed ones.
    Overwrite,
    /// Keep mapper values when present, else use the fixed ones.
    Preserve,
}

impl ConflictPolicy {
    pub fn parse(s: &str) -> Option<ConflictPolicy> {
        match s.to_lowercase().as_str() {
            "merge" => Some(ConflictPolicy::Merge),
            "overwrite" => Some(ConflictPolicy::Overwrite),
            "preserve" => Some(ConflictPolicy::Preserve),
            _ => None,
        }
    }
}

/// An attribute stamped onto every created entry.
#[derive(Debug, Clone)]
pub struct FixedAttribute {
    pub ldap_attribute: String,
    pub values: Vec<String>,
    pub on_conflict: ConflictPolicy,
}

/// Result of translating a SCIM filter for the directory.
#[derive(Debug, Clone)]
pub struct TranslatedFilter {
    pub filter: LdapFilter,
    /// False when some subtree could not be expressed and results must be
    /// post-filtered in memory against the original SCIM filter.
    pub fully_translated: bool,
}

/// Translates one configured resource type between SCIM objects and LDAP
/// entries. Immutable and shared across request handlers.
pub struct ResourceMapper {
    resource_name: String,
    endpoint: String,
    schema: String,
    search_base_dn: String,
    search_scope: SearchScope,
    search_filter: LdapFilter,
    dn_template: Option<DnTemplate>,
    fixed_attributes: Vec<FixedAttribute>,
    id_attribute: String,
    id_descriptor: Arc<AttributeDescriptor>,
    mappers: Vec<Arc<dyn AttributeMapper>>,
    derived: Vec<Arc<dyn DerivedAttribute>>,
}

impl ResourceMapper {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        resource_name: String,
        endpoint: String,
        schema: String,
        search_base_dn: String,
        search_scope: SearchScope,
        search_filter: LdapFilter,
        dn_template: Option<DnTemplate>,
        fixed_attributes: Vec<FixedAttribute>,
        id_attribute: String,
        mappers: Vec<Arc<dyn AttributeMapper>>,
        derived: Vec<Arc<dyn DerivedAttribute>>,
    ) -> ScimResult<ResourceMapper> {
        let id_descriptor = Arc::new(AttributeDescriptor::singular_simple(
            "id",
            DataType::String,
            &schema,
            "Unique identifier for the resource",
            true,
            false,
            false,
        )?);
        Ok(ResourceMapper {
            resource_name,
            endpoint,
            schema,
            search_base_dn,
            search_scope,
            search_filter,
            dn_template,
            fixed_attributes,
            id_attribute,
            id_descriptor,
            mappers,
            derived,
        })
    }

    pub fn resource_name(&self) -> &str {
        &self.resource_name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn search_base_dn(&self) -> &str {
        &self.search_base_dn
    }

    pub fn search_scope(&self) -> SearchScope {
        self.search_scope
    }

    pub fn search_filter(&self) -> &LdapFilter {
        &self.search_filter
    }

    pub fn id_attribute(&self) -> &str {
        &self.id_attribute
    }

    pub fn id_descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.id_descriptor
    }

    pub fn supports_create(&self) -> bool {
        self.dn_template.is_some()
    }

    fn find_mapper(&self, schema: &str, name: &str) -> Option<&Arc<dyn AttributeMapper>> {
        self.mappers
            .iter()
            .find(|m| m.descriptor().matches(schema, name))
    }

    fn find_derived(&self, schema: &str, name: &str) -> Option<&Arc<dyn DerivedAttribute>> {
        self.derived
            .iter()
            .find(|d| d.descriptor().matches(schema, name))
    }

    /// LDAP attribute types needed to serve the requested attributes, plus
    /// the entry's objectClass and naming attribute.
    pub fn to_ldap_attribute_types(&self, query_attrs: &QueryAttributes) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        let mut push = |candidate: String| {
            if !types.iter().any(|t| t.eq_ignore_ascii_case(&candidate)) {
                types.push(candidate);
            }
        };
        push("objectClass".to_string());
        push(self.id_attribute.clone());
        for mapper in &self.mappers {
            if query_attrs.is_attribute_requested(mapper.descriptor()) {
                for attr_type in mapper.ldap_attribute_types() {
                    push(attr_type);
                }
            }
        }
        for derived in &self.derived {
            if query_attrs.is_attribute_requested(derived.descriptor()) {
                for attr_type in derived.ldap_attribute_types() {
                    push(attr_type.clone());
                }
            }
        }
        types
    }

    /// LDAP attribute types owned by the plain mappers; the set a modify
    /// operation is allowed to touch.
    fn mapper_attribute_types(&self) -> Vec<String> {
        let mut types: Vec<String> = Vec::new();
        for mapper in &self.mappers {
            for attr_type in mapper.ldap_attribute_types() {
                if !types.iter().any(|t| t.eq_ignore_ascii_case(&attr_type)) {
                    types.push(attr_type);
                }
            }
        }
        types
    }

    /// Check the object only carries attributes this resource knows, and
    /// that every required attribute is present.
    fn validate(&self, scim: &ScimObject) -> ScimResult<()> {
        for attribute in scim.attributes() {
            let descriptor = attribute.descriptor();
            let known = descriptor.name().eq_ignore_ascii_case("id")
                || self
                    .find_mapper(descriptor.schema(), descriptor.name())
                    .is_some()
                || self
                    .find_derived(descriptor.schema(), descriptor.name())
                    .is_some();
            if !known {
                return Err(ScimError::InvalidResource(format!(
                    "'{}' is not an attribute of {}",
                    descriptor.name(),
                    self.resource_name
                )));
            }
        }
        for mapper in &self.mappers {
            let descriptor = mapper.descriptor();
            if descriptor.is_required()
                && scim.get(descriptor.schema(), descriptor.name()).is_none()
            {
                return Err(ScimError::InvalidResource(format!(
                    "Missing required attribute '{}'",
                    descriptor.name()
                )));
            }
        }
        Ok(())
    }

    /// Stage the mapper-produced LDAP attributes for an object.
    fn to_ldap_attributes(&self, scim: &ScimObject) -> ScimResult<Entry> {
        let mut staged = Entry::new("");
        for mapper in &self.mappers {
            mapper.to_ldap_attributes(scim, &mut staged)?;
        }
        Ok(staged)
    }

    /// Build the complete LDAP entry for a create operation.
    pub fn to_ldap_entry(&self, scim: &ScimObject) -> ScimResult<Entry> {
        let dn_template = self.dn_template.as_ref().ok_or_else(|| {
            ScimError::Forbidden(format!(
                "Resource {} is not configured for create",
                self.resource_name
            ))
        })?;

        self.validate(scim)?;
        let mut entry = self.to_ldap_attributes(scim)?;

        for fixed in &self.fixed_attributes {
            let mut apply = true;
            if entry.has_attribute(&fixed.ldap_attribute) {
                match fixed.on_conflict {
                    ConflictPolicy::Merge => {}
                    ConflictPolicy::Overwrite => entry.remove_attribute(&fixed.ldap_attribute),
                    ConflictPolicy::Preserve => apply = false,
                }
            }
            if apply {
                entry.add_attribute(Attribute::new(
                    fixed.ldap_attribute.clone(),
                    fixed.values.iter().map(|v| v.as_bytes().to_vec()).collect(),
                ));
            }
        }

        entry.dn = dn_template.construct(&entry)?;
        Ok(entry)
    }

    /// Minimal modifications turning the current entry into the target
    /// object, restricted to mapper-owned attribute types.
    pub fn to_ldap_modifications(
        &self,
        current: &Entry,
        scim: &ScimObject,
    ) -> ScimResult<Vec<Modification>> {
        self.validate(scim)?;
        let target = self.to_ldap_attributes(scim)?;
        Ok(current.diff(&target, &self.mapper_attribute_types()))
    }

    /// Translate a SCIM filter into the LDAP filter for the search.
    ///
    /// The translated component is ANDed with the configured search
    /// filter. A leaf whose path does not resolve to a mapper yields no
    /// component; an OR with any untranslatable child widens to the search
    /// filter alone so no matching entry is lost.
    pub fn to_ldap_filter(&self, filter: Option<&ScimFilter>) -> ScimResult<TranslatedFilter> {
        let mut fully_translated = true;
        let component = match filter {
            Some(filter) => self.translate_component(filter, &mut fully_translated)?,
            None => None,
        };
        let filter = match component {
            Some(component) => {
                LdapFilter::And(vec![component, self.search_filter.clone()])
            }
            None => self.search_filter.clone(),
        };
        Ok(TranslatedFilter {
            filter,
            fully_translated,
        })
    }

    fn translate_component(
        &self,
        filter: &ScimFilter,
        fully_translated: &mut bool,
    ) -> ScimResult<Option<LdapFilter>> {
        match filter {
            ScimFilter::And(children) => {
                let mut components = Vec::with_capacity(children.len());
                for child in children {
                    if let Some(component) = self.translate_component(child, fully_translated)? {
                        components.push(component);
                    }
                }
                // Dropping an AND child only widens the candidate set; the
                // post-filter narrows it back.
                if components.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(LdapFilter::and(components)))
                }
            }
            ScimFilter::Or(children) => {
                let mut components = Vec::with_capacity(children.len());
                for child in children {
                    match self.translate_component(child, fully_translated)? {
                        Some(component) => components.push(component),
                        // An OR missing a child would lose matches, so the
                        // whole subtree widens to "anything".
                        None => return Ok(None),
                    }
                }
                Ok(Some(LdapFilter::or(components)))
            }
            ScimFilter::Compare { path, op, value } => {
                let schema = path.schema_or(&self.schema);
                let mapper = match self.find_mapper(schema, &path.name) {
                    Some(mapper) => mapper,
                    None => {
                        *fully_translated = false;
                        return Ok(None);
                    }
                };
                let component =
                    mapper.to_ldap_filter(path.sub_attribute.as_deref(), *op, value.as_deref())?;
                if component.is_none() {
                    *fully_translated = false;
                }
                Ok(component)
            }
        }
    }

    /// Server-side sort key for the sort parameters.
    pub fn to_sort_control(&self, sort: &SortParameters) -> ScimResult<SortKey> {
        let schema = sort.path.schema_or(&self.schema);
        let attribute = self
            .find_mapper(schema, &sort.path.name)
            .and_then(|m| m.to_ldap_sort_attribute(sort.path.sub_attribute.as_deref()))
            .ok_or_else(|| {
                ScimError::InvalidSort(format!("Cannot sort by attribute '{}'", sort.path.name))
            })?;
        Ok(SortKey {
            attribute,
            reverse: !sort.ascending,
        })
    }

    /// Map an LDAP entry to a SCIM object. Returns `None` when the entry
    /// is hidden by the configured search filter.
    pub async fn to_scim_object(
        &self,
        entry: &Entry,
        query_attrs: &QueryAttributes,
        client: &dyn DirectoryClient,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimObject>> {
        if !self.search_filter.matches_entry(entry) {
            return Ok(None);
        }

        let mut object = ScimObject::new();

        if let Some(id) = entry.first_value_str(&self.id_attribute) {
            object.add(ScimAttribute::simple(
                self.id_descriptor.clone(),
                SimpleValue::String(id),
            ));
        }

        for mapper in &self.mappers {
            if query_attrs.is_attribute_requested(mapper.descriptor()) {
                if let Some(attribute) = mapper.to_scim_attribute(entry)? {
                    if let Some(attribute) = trim_sub_attributes(attribute, query_attrs) {
                        object.add(attribute);
                    }
                }
            }
        }

        for derived in &self.derived {
            if query_attrs.is_attribute_requested(derived.descriptor()) {
                if ctx.is_cancelled() {
                    return Err(ScimError::Cancelled);
                }
                if let Some(attribute) = derived
                    .derive(entry, client, &self.search_base_dn, ctx)
                    .await?
                {
                    object.add(attribute);
                }
            }
        }

        Ok(Some(object))
    }
}

/// Restrict a singular complex attribute to its requested sub-attributes.
/// An attribute left with no sub-attributes is dropped entirely.
fn trim_sub_attributes(
    attribute: ScimAttribute,
    query_attrs: &QueryAttributes,
) -> Option<ScimAttribute> {
    if query_attrs.is_all()
        || attribute.is_plural()
        || attribute.descriptor().data_type() != DataType::Complex
    {
        return Some(attribute);
    }
    let descriptor = attribute.descriptor().clone();
    let retained: Vec<ScimAttribute> = attribute
        .singular_value()
        .map(|value| {
            value
                .sub_attributes()
                .iter()
                .filter(|sub| {
                    query_attrs
                        .is_sub_attribute_requested(&descriptor, sub.descriptor().name())
                })
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    if retained.is_empty() {
        return None;
    }
    Some(ScimAttribute::singular(
        descriptor,
        crate::model::attribute::ScimAttributeValue::Complex(retained),
    ))
}
