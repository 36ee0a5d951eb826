//! Derived attributes: SCIM attributes computed from the entry or from
//! secondary directory lookups rather than a direct mapping.
//!
//! Implementations are registered by short name at startup; configuration
//! references the name and unknown names fail the load.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{Clock, RequestContext};
use crate::error::{ScimError, ScimResult};
use crate::ldap::client::{DirectoryClient, SearchRequest};
use crate::ldap::entry::{Entry, SearchScope};
use crate::ldap::filter::LdapFilter;
use crate::model::attribute::ScimAttribute;
use crate::model::value::SimpleValue;
use crate::schema::descriptor::AttributeDescriptor;
use crate::transform::parse_generalized_time;

/// A computed SCIM attribute.
#[async_trait]
pub trait DerivedAttribute: Send + Sync {
    fn descriptor(&self) -> &Arc<AttributeDescriptor>;

    /// LDAP attribute types the computation consumes from the primary
    /// entry, so the resource mapper can request them on the search.
    fn ldap_attribute_types(&self) -> &[String];

    /// Compute the attribute, absent when there is nothing to report.
    async fn derive(
        &self,
        entry: &Entry,
        client: &dyn DirectoryClient,
        search_base_dn: &str,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>>;
}

/// The core `meta` attribute from the directory's operational timestamps,
/// falling back to the clock when the directory hides them.
pub struct EntryMetaDerivedAttribute {
    descriptor: Arc<AttributeDescriptor>,
    clock: Arc<dyn Clock>,
    consumed: Vec<String>,
}

impl EntryMetaDerivedAttribute {
    pub fn new(descriptor: Arc<AttributeDescriptor>, clock: Arc<dyn Clock>) -> Self {
        Self {
            descriptor,
            clock,
            consumed: vec!["createTimestamp".to_string(), "modifyTimestamp".to_string()],
        }
    }

    fn timestamp(&self, entry: &Entry, ldap_attribute: &str) -> SimpleValue {
        let parsed = entry
            .first_value_str(ldap_attribute)
            .and_then(|raw| parse_generalized_time(&raw).ok());
        SimpleValue::DateTime(parsed.unwrap_or_else(|| self.clock.now()))
    }
}

#[async_trait]
impl DerivedAttribute for EntryMetaDerivedAttribute {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> &[String] {
        &self.consumed
    }

    async fn derive(
        &self,
        entry: &Entry,
        _client: &dyn DirectoryClient,
        _search_base_dn: &str,
        _ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let mut sub_values = Vec::new();
        if self.descriptor.sub_attribute("created").is_some() {
            sub_values.push(("created", self.timestamp(entry, "createTimestamp")));
        }
        if self.descriptor.sub_attribute("lastModified").is_some() {
            sub_values.push(("lastModified", self.timestamp(entry, "modifyTimestamp")));
        }
        if sub_values.is_empty() {
            return Ok(None);
        }
        let value = ScimAttribute::complex_value(&self.descriptor, sub_values)?;
        Ok(Some(ScimAttribute::singular(self.descriptor.clone(), value)))
    }
}

/// Group membership read off the entry's `member`/`uniqueMember` values.
/// Each member DN becomes one plural element.
pub struct MembersDerivedAttribute {
    descriptor: Arc<AttributeDescriptor>,
    consumed: Vec<String>,
}

impl MembersDerivedAttribute {
    pub fn new(descriptor: Arc<AttributeDescriptor>) -> Self {
        Self {
            descriptor,
            consumed: vec!["member".to_string(), "uniqueMember".to_string()],
        }
    }
}

#[async_trait]
impl DerivedAttribute for MembersDerivedAttribute {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> &[String] {
        &self.consumed
    }

    async fn derive(
        &self,
        entry: &Entry,
        _client: &dyn DirectoryClient,
        _search_base_dn: &str,
        _ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let mut elements = Vec::new();
        for ldap_attribute in &self.consumed {
            if let Some(attribute) = entry.attribute(ldap_attribute) {
                for dn in attribute.value_strings() {
                    elements.push(ScimAttribute::complex_value(
                        &self.descriptor,
                        vec![("value", SimpleValue::String(dn))],
                    )?);
                }
            }
        }
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }
}

/// The groups an entry belongs to, computed by a secondary search for
/// group entries whose membership attributes contain the entry DN.
pub struct GroupsDerivedAttribute {
    descriptor: Arc<AttributeDescriptor>,
    consumed: Vec<String>,
}

impl GroupsDerivedAttribute {
    pub fn new(descriptor: Arc<AttributeDescriptor>) -> Self {
        Self {
            descriptor,
            consumed: Vec::new(),
        }
    }
}

#[async_trait]
impl DerivedAttribute for GroupsDerivedAttribute {
    fn descriptor(&self) -> &Arc<AttributeDescriptor> {
        &self.descriptor
    }

    fn ldap_attribute_types(&self) -> &[String] {
        &self.consumed
    }

    async fn derive(
        &self,
        entry: &Entry,
        client: &dyn DirectoryClient,
        search_base_dn: &str,
        ctx: &RequestContext,
    ) -> ScimResult<Option<ScimAttribute>> {
        let request = SearchRequest {
            base_dn: search_base_dn.to_string(),
            scope: SearchScope::Subtree,
            filter: LdapFilter::Or(vec![
                LdapFilter::equality("member", entry.dn.clone()),
                LdapFilter::equality("uniqueMember", entry.dn.clone()),
            ]),
            attributes: vec!["cn".to_string()],
            sort: None,
        };
        let groups = client.search(&request, ctx).await.map_err(ScimError::from)?;

        let mut elements = Vec::new();
        for group in groups {
            let mut sub_values = vec![("value", SimpleValue::String(group.dn.clone()))];
            if let Some(cn) = group.first_value_str("cn") {
                sub_values.push(("display", SimpleValue::String(cn)));
            }
            elements.push(ScimAttribute::complex_value(&self.descriptor, sub_values)?);
        }
        if elements.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScimAttribute::plural(self.descriptor.clone(), elements)))
    }
}

type DerivedFactory =
    Box<dyn Fn(Arc<AttributeDescriptor>) -> ScimResult<Arc<dyn DerivedAttribute>> + Send + Sync>;

/// Named derived-attribute implementations available to the configuration.
pub struct DerivedAttributeRegistry {
    entries: HashMap<String, DerivedFactory>,
}

impl DerivedAttributeRegistry {
    /// Registry with the built-in derivations.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> DerivedAttributeRegistry {
        let mut registry = DerivedAttributeRegistry {
            entries: HashMap::new(),
        };
        registry.register("entryMeta", {
            move |descriptor| {
                Ok(Arc::new(EntryMetaDerivedAttribute::new(descriptor, clock.clone()))
                    as Arc<dyn DerivedAttribute>)
            }
        });
        registry.register("groupMembers", |descriptor| {
            Ok(Arc::new(MembersDerivedAttribute::new(descriptor)) as Arc<dyn DerivedAttribute>)
        });
        registry.register("memberOfGroups", |descriptor| {
            Ok(Arc::new(GroupsDerivedAttribute::new(descriptor)) as Arc<dyn DerivedAttribute>)
        });
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(Arc<AttributeDescriptor>) -> ScimResult<Arc<dyn DerivedAttribute>>
            + Send
            + Sync
            + 'static,
    {
        self.entries.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn create(
        &self,
        name: &str,
        descriptor: Arc<AttributeDescriptor>,
    ) -> ScimResult<Arc<dyn DerivedAttribute>> {
        let factory = self.entries.get(&name.to_lowercase()).ok_or_else(|| {
            ScimError::Configuration(format!("unknown derived attribute '{}'", name))
        })?;
        factory(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedClock;
    use crate::ldap::entry::Modification;
    use crate::schema::descriptor::DataType;
    use crate::schema::SCHEMA_URN_CORE;
    use chrono::{TimeZone, Utc};

    /// Returns a canned set of group entries for every search.
    struct CannedGroups(Vec<Entry>);

    #[async_trait]
    impl DirectoryClient for CannedGroups {
        async fn search(
            &self,
            request: &SearchRequest,
            _ctx: &RequestContext,
        ) -> Result<Vec<Entry>, crate::ldap::client::DirectoryError> {
            Ok(self
                .0
                .iter()
                .filter(|e| request.filter.matches_entry(e))
                .cloned()
                .collect())
        }

        async fn read(
            &self,
            _dn: &str,
            _attributes: &[String],
            _ctx: &RequestContext,
        ) -> Result<Option<Entry>, crate::ldap::client::DirectoryError> {
            Ok(None)
        }

        async fn add(
            &self,
            _entry: &Entry,
            _ctx: &RequestContext,
        ) -> Result<(), crate::ldap::client::DirectoryError> {
            Ok(())
        }

        async fn modify(
            &self,
            _dn: &str,
            _modifications: &[Modification],
            _ctx: &RequestContext,
        ) -> Result<(), crate::ldap::client::DirectoryError> {
            Ok(())
        }

        async fn delete(
            &self,
            _dn: &str,
            _ctx: &RequestContext,
        ) -> Result<(), crate::ldap::client::DirectoryError> {
            Ok(())
        }
    }

    fn meta_descriptor() -> Arc<AttributeDescriptor> {
        let created = Arc::new(
            AttributeDescriptor::singular_simple(
                "created",
                DataType::DateTime,
                SCHEMA_URN_CORE,
                "",
                true,
                false,
                false,
            )
            .unwrap(),
        );
        let last_modified = Arc::new(
            AttributeDescriptor::singular_simple(
                "lastModified",
                DataType::DateTime,
                SCHEMA_URN_CORE,
                "",
                true,
                false,
                false,
            )
            .unwrap(),
        );
        Arc::new(
            AttributeDescriptor::singular_complex(
                "meta",
                SCHEMA_URN_CORE,
                "",
                true,
                false,
                vec![created, last_modified],
            )
            .unwrap(),
        )
    }

    fn groups_descriptor(name: &str) -> Arc<AttributeDescriptor> {
        Arc::new(
            AttributeDescriptor::plural_complex(
                name,
                SCHEMA_URN_CORE,
                "",
                true,
                false,
                vec![],
                vec![Arc::new(
                    AttributeDescriptor::singular_simple(
                        "value",
                        DataType::String,
                        SCHEMA_URN_CORE,
                        "",
                        true,
                        false,
                        false,
                    )
                    .unwrap(),
                )],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_entry_meta_falls_back_to_clock() {
        let pinned = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let derived =
            EntryMetaDerivedAttribute::new(meta_descriptor(), Arc::new(FixedClock(pinned)));
        let client = CannedGroups(Vec::new());
        let ctx = RequestContext::new();

        let mut entry = Entry::new("uid=x,dc=example,dc=com");
        entry.add_str_value("createTimestamp", "20110513044234Z");

        let attribute = derived
            .derive(&entry, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        let value = attribute.singular_value().unwrap();
        assert_eq!(
            value
                .sub_attribute("created")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_datetime()),
            Some(Utc.with_ymd_and_hms(2011, 5, 13, 4, 42, 34).unwrap())
        );
        assert_eq!(
            value
                .sub_attribute("lastModified")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_datetime()),
            Some(pinned)
        );
    }

    #[tokio::test]
    async fn test_members_reads_entry_values() {
        let derived = MembersDerivedAttribute::new(groups_descriptor("members"));
        let client = CannedGroups(Vec::new());
        let ctx = RequestContext::new();

        let mut entry = Entry::new("cn=admins,ou=Groups,dc=example,dc=com");
        entry.add_str_value("member", "uid=a,dc=example,dc=com");
        entry.add_str_value("uniqueMember", "uid=b,dc=example,dc=com");

        let attribute = derived
            .derive(&entry, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attribute.values().len(), 2);

        let empty = Entry::new("cn=empty,ou=Groups,dc=example,dc=com");
        assert!(derived
            .derive(&empty, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_groups_searches_for_membership() {
        let member_dn = "uid=bjensen,ou=People,dc=example,dc=com";
        let mut group = Entry::new("cn=staff,ou=Groups,dc=example,dc=com");
        group.add_str_value("cn", "staff");
        group.add_str_value("member", member_dn);

        let derived = GroupsDerivedAttribute::new(groups_descriptor("groups"));
        let client = CannedGroups(vec![group]);
        let ctx = RequestContext::new();

        let entry = Entry::new(member_dn);
        let attribute = derived
            .derive(&entry, &client, "dc=example,dc=com", &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(attribute.values().len(), 1);
        assert_eq!(
            attribute.values()[0].element_value().and_then(|v| v.as_str()),
            Some("cn=staff,ou=Groups,dc=example,dc=com")
        );
        assert_eq!(
            attribute.values()[0]
                .sub_attribute("display")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str()),
            Some("staff")
        );
    }

    #[test]
    fn test_registry_rejects_unknown_names() {
        let registry = DerivedAttributeRegistry::with_defaults(Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )));
        assert!(registry.create("groupmembers", groups_descriptor("members")).is_ok());
        assert!(matches!(
            registry.create("com.example.Members", groups_descriptor("members")),
            Err(ScimError::Configuration(_))
        ));
    }
}
