//! Shared test fixtures: an in-memory directory double and the standard
//! mapping configuration the integration tests run against.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use scim_ldap_gateway::config::{self, GatewayConfig};
use scim_ldap_gateway::context::{Clock, RequestContext};
use scim_ldap_gateway::ldap::{
    Attribute, DirectoryClient, DirectoryError, Entry, Modification, ModificationType,
    SearchRequest, SearchScope,
};
use scim_ldap_gateway::mapper::DerivedAttributeRegistry;
use scim_ldap_gateway::transform::TransformationRegistry;
use scim_ldap_gateway::LdapResourceService;

pub const MAPPING_YAML: &str = r#"
maxResults: 100
resources:
  - name: User
    schema: urn:scim:schemas:core:1.0
    endpoint: Users
    ldapSearch:
      baseDN: ou=People,dc=example,dc=com
      scope: sub
      filter: (objectClass=inetOrgPerson)
    ldapAdd:
      dnTemplate: uid={uid},ou=People,dc=example,dc=com
      fixedAttributes:
        - ldapAttribute: objectClass
          fixedValues: [top, person, organizationalPerson, inetOrgPerson]
          onConflict: merge
    attributes:
      - name: userName
        required: true
        simple:
          dataType: string
          mapping:
            ldapAttribute: uid
      - name: displayName
        simple:
          dataType: string
          mapping:
            ldapAttribute: cn
      - name: name
        complex:
          subAttributes:
            - name: familyName
              dataType: string
            - name: givenName
              dataType: string
          mappings:
            - subAttribute: familyName
              ldapAttribute: sn
            - subAttribute: givenName
              ldapAttribute: givenName
      - name: emails
        complexPlural:
          pluralTypes: [work]
          subAttributes:
            - name: value
              dataType: string
          mappings:
            - pluralType: work
              subAttribute: value
              ldapAttribute: mail
      - name: meta
        readOnly: true
        complex:
          subAttributes:
            - name: created
              dataType: dateTime
            - name: lastModified
              dataType: dateTime
        derivation:
          name: entryMeta
  - name: Group
    schema: urn:scim:schemas:core:1.0
    endpoint: Groups
    ldapSearch:
      baseDN: ou=Groups,dc=example,dc=com
      scope: one
      filter: (objectClass=groupOfNames)
    ldapAdd:
      dnTemplate: cn={cn},ou=Groups,dc=example,dc=com
      fixedAttributes:
        - ldapAttribute: objectClass
          fixedValues: [top, groupOfNames]
    attributes:
      - name: displayName
        required: true
        simple:
          dataType: string
          mapping:
            ldapAttribute: cn
      - name: members
        readOnly: true
        complexPlural:
          subAttributes:
            - name: value
              dataType: string
        derivation:
          name: groupMembers
"#;

/// Clock pinned so derived timestamps are predictable.
pub struct TestClock;

impl Clock for TestClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2024, 1, 1, 0, 0, 0).unwrap()
    }
}

pub fn load_config() -> GatewayConfig {
    let transforms = TransformationRegistry::with_defaults();
    let derivations = DerivedAttributeRegistry::with_defaults(Arc::new(TestClock));
    config::load_from_str(MAPPING_YAML, &transforms, &derivations).expect("test config loads")
}

/// In-memory stand-in for the LDAP backend.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: Mutex<Vec<Entry>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<Entry>) -> Self {
        Self {
            entries: Mutex::new(entries),
        }
    }

    pub fn entry(&self, dn: &str) -> Option<Entry> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.dn.eq_ignore_ascii_case(dn))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn in_scope(entry_dn: &str, base_dn: &str, scope: SearchScope) -> bool {
        let entry_dn = entry_dn.to_lowercase();
        let base_dn = base_dn.to_lowercase();
        if entry_dn == base_dn {
            return scope == SearchScope::Subtree;
        }
        let suffix = format!(",{}", base_dn);
        if !entry_dn.ends_with(&suffix) {
            return false;
        }
        match scope {
            SearchScope::Subtree => true,
            SearchScope::OneLevel => {
                let rdn = &entry_dn[..entry_dn.len() - suffix.len()];
                !rdn.contains(',')
            }
        }
    }
}

#[async_trait]
impl DirectoryClient for InMemoryDirectory {
    async fn search(
        &self,
        request: &SearchRequest,
        ctx: &RequestContext,
    ) -> Result<Vec<Entry>, DirectoryError> {
        if ctx.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let entries = self.entries.lock().unwrap();
        let mut matched: Vec<Entry> = entries
            .iter()
            .filter(|e| Self::in_scope(&e.dn, &request.base_dn, request.scope))
            .filter(|e| request.filter.matches_entry(e))
            .cloned()
            .collect();
        if let Some(sort) = &request.sort {
            matched.sort_by_key(|e| {
                e.first_value_str(&sort.attribute)
                    .map(|v| v.to_lowercase())
                    .unwrap_or_default()
            });
            if sort.reverse {
                matched.reverse();
            }
        }
        Ok(matched)
    }

    async fn read(
        &self,
        dn: &str,
        _attributes: &[String],
        ctx: &RequestContext,
    ) -> Result<Option<Entry>, DirectoryError> {
        if ctx.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        Ok(self.entry(dn))
    }

    async fn add(&self, entry: &Entry, ctx: &RequestContext) -> Result<(), DirectoryError> {
        if ctx.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.dn.eq_ignore_ascii_case(&entry.dn)) {
            return Err(DirectoryError::directory(68, "entry already exists"));
        }
        entries.push(entry.clone());
        Ok(())
    }

    async fn modify(
        &self,
        dn: &str,
        modifications: &[Modification],
        ctx: &RequestContext,
    ) -> Result<(), DirectoryError> {
        if ctx.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let mut entries = self.entries.lock().unwrap();
        let entry = entries
            .iter_mut()
            .find(|e| e.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| DirectoryError::directory(32, "no such object"))?;
        for modification in modifications {
            let name = &modification.attribute.name;
            match modification.mod_type {
                ModificationType::Add => {
                    entry.add_attribute(modification.attribute.clone());
                }
                ModificationType::Delete => {
                    entry.remove_attribute(name);
                }
                ModificationType::Replace => {
                    entry.remove_attribute(name);
                    entry.add_attribute(modification.attribute.clone());
                }
            }
        }
        Ok(())
    }

    async fn delete(&self, dn: &str, ctx: &RequestContext) -> Result<(), DirectoryError> {
        if ctx.is_cancelled() {
            return Err(DirectoryError::Cancelled);
        }
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| !e.dn.eq_ignore_ascii_case(dn));
        if entries.len() == before {
            return Err(DirectoryError::directory(32, "no such object"));
        }
        Ok(())
    }

    fn supports_concurrent_use(&self) -> bool {
        true
    }
}

/// A person entry in the teacher directory's shape.
pub fn person_entry(uid: &str, sn: &str, given: &str, mail: Option<&str>) -> Entry {
    let mut entry = Entry::new(format!("uid={},ou=People,dc=example,dc=com", uid));
    entry.add_attribute(Attribute::from_str_values(
        "objectClass",
        &["top", "person", "organizationalPerson", "inetOrgPerson"],
    ));
    entry.add_str_value("uid", uid);
    entry.add_str_value("sn", sn);
    entry.add_str_value("givenName", given);
    entry.add_str_value("cn", &format!("{} {}", given, sn));
    if let Some(mail) = mail {
        entry.add_str_value("mail", mail);
    }
    entry
}

pub fn group_entry(cn: &str, member_dns: &[&str]) -> Entry {
    let mut entry = Entry::new(format!("cn={},ou=Groups,dc=example,dc=com", cn));
    entry.add_attribute(Attribute::from_str_values("objectClass", &["top", "groupOfNames"]));
    entry.add_str_value("cn", cn);
    for dn in member_dns {
        entry.add_str_value("member", dn);
    }
    entry
}

pub fn service_with(entries: Vec<Entry>) -> (LdapResourceService, Arc<InMemoryDirectory>) {
    let directory = Arc::new(InMemoryDirectory::with_entries(entries));
    let service = LdapResourceService::new(load_config(), directory.clone());
    (service, directory)
}
