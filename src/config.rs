//! Declarative mapping configuration.
//!
//! The document is YAML with `${VAR}` / `${VAR:-default}` environment
//! expansion applied before parse. Loading produces the immutable schema
//! registry and resource mappers shared by every request handler.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::error::{ScimError, ScimResult};
use crate::ldap::entry::SearchScope;
use crate::ldap::filter::LdapFilter;
use crate::mapper::complex::{ComplexAttributeMapper, SubAttributeMapping};
use crate::mapper::derived::{DerivedAttribute, DerivedAttributeRegistry};
use crate::mapper::dn_template::DnTemplate;
use crate::mapper::plural::{PluralAttributeMapper, PluralMapping};
use crate::mapper::resource_mapper::{ConflictPolicy, FixedAttribute, ResourceMapper};
use crate::mapper::simple::SimpleAttributeMapper;
use crate::mapper::AttributeMapper;
use crate::schema::descriptor::{AttributeDescriptor, DataType};
use crate::schema::registry::{ResourceDescriptor, SchemaRegistry};
use crate::transform::TransformationRegistry;

fn default_max_results() -> usize {
    200
}

fn default_scope() -> String {
    "sub".to_string()
}

fn default_on_conflict() -> String {
    "merge".to_string()
}

#[derive(Debug, Deserialize)]
pub struct MappingConfig {
    pub resources: Vec<ResourceConfig>,
    #[serde(default = "default_max_results", rename = "maxResults")]
    pub max_results: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceConfig {
    pub name: String,
    pub schema: String,
    pub endpoint: String,
    #[serde(default)]
    pub id_attribute: Option<String>,
    pub ldap_search: LdapSearchConfig,
    #[serde(default)]
    pub ldap_add: Option<LdapAddConfig>,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
}

#[derive(Debug, Deserialize)]
pub struct LdapSearchConfig {
    #[serde(rename = "baseDN")]
    pub base_dn: String,
    #[serde(default = "default_scope")]
    pub scope: String,
    pub filter: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapAddConfig {
    pub dn_template: String,
    #[serde(default)]
    pub fixed_attributes: Vec<FixedAttributeConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedAttributeConfig {
    pub ldap_attribute: String,
    #[serde(default)]
    pub fixed_value: Option<String>,
    #[serde(default)]
    pub fixed_values: Vec<String>,
    #[serde(default = "default_on_conflict")]
    pub on_conflict: String,
}

impl FixedAttributeConfig {
    fn values(&self) -> Vec<String> {
        let mut values = self.fixed_values.clone();
        if let Some(single) = &self.fixed_value {
            values.insert(0, single.clone());
        }
        values
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub simple: Option<SimpleConfig>,
    #[serde(default)]
    pub complex: Option<ComplexConfig>,
    #[serde(default)]
    pub simple_plural: Option<SimplePluralConfig>,
    #[serde(default)]
    pub complex_plural: Option<ComplexPluralConfig>,
    #[serde(default)]
    pub derivation: Option<DerivationConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimpleConfig {
    pub data_type: String,
    #[serde(default)]
    pub case_exact: bool,
    #[serde(default)]
    pub mapping: Option<MappingRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingRef {
    pub ldap_attribute: String,
    #[serde(default)]
    pub transform: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexConfig {
    pub sub_attributes: Vec<SubAttributeConfig>,
    #[serde(default)]
    pub mappings: Vec<SubMappingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAttributeConfig {
    pub name: String,
    pub data_type: String,
    #[serde(default)]
    pub case_exact: bool,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubMappingConfig {
    pub sub_attribute: String,
    pub ldap_attribute: String,
    #[serde(default)]
    pub transform: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimplePluralConfig {
    pub data_type: String,
    #[serde(default)]
    pub case_exact: bool,
    #[serde(default)]
    pub plural_types: Vec<String>,
    pub mapping: MappingRef,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexPluralConfig {
    #[serde(default)]
    pub plural_types: Vec<String>,
    pub sub_attributes: Vec<SubAttributeConfig>,
    #[serde(default)]
    pub mappings: Vec<PluralMappingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluralMappingConfig {
    #[serde(default)]
    pub plural_type: Option<String>,
    #[serde(default = "default_value_sub_attribute")]
    pub sub_attribute: String,
    pub ldap_attribute: String,
    #[serde(default)]
    pub transform: Option<String>,
}

fn default_value_sub_attribute() -> String {
    "value".to_string()
}

#[derive(Debug, Deserialize)]
pub struct DerivationConfig {
    pub name: String,
}

/// Everything a gateway instance needs, built once at startup.
pub struct GatewayConfig {
    pub registry: SchemaRegistry,
    pub mappers: Vec<Arc<ResourceMapper>>,
    pub max_results: usize,
}

impl GatewayConfig {
    pub fn mapper(&self, endpoint: &str) -> Option<&Arc<ResourceMapper>> {
        self.mappers
            .iter()
            .find(|m| m.endpoint().eq_ignore_ascii_case(endpoint))
    }
}

/// Load a mapping document from a file.
pub fn load_from_file<P: AsRef<Path>>(
    path: P,
    transforms: &TransformationRegistry,
    derivations: &DerivedAttributeRegistry,
) -> ScimResult<GatewayConfig> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ScimError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }
    let content = fs::read_to_string(path).map_err(|e| {
        ScimError::Configuration(format!("Failed to read {}: {}", path.display(), e))
    })?;
    load_from_str(&content, transforms, derivations)
}

/// Load a mapping document from YAML text.
pub fn load_from_str(
    content: &str,
    transforms: &TransformationRegistry,
    derivations: &DerivedAttributeRegistry,
) -> ScimResult<GatewayConfig> {
    let expanded = expand_env_vars(content)?;
    let config: MappingConfig = serde_yaml::from_str(&expanded)
        .map_err(|e| ScimError::Configuration(format!("Failed to parse configuration: {}", e)))?;
    build(config, transforms, derivations)
}

fn build(
    config: MappingConfig,
    transforms: &TransformationRegistry,
    derivations: &DerivedAttributeRegistry,
) -> ScimResult<GatewayConfig> {
    if config.resources.is_empty() {
        return Err(ScimError::Configuration(
            "Configuration must contain at least one resource".to_string(),
        ));
    }

    let mut mappers = Vec::with_capacity(config.resources.len());
    let mut resources = Vec::with_capacity(config.resources.len());

    for resource in &config.resources {
        if mappers
            .iter()
            .any(|m: &Arc<ResourceMapper>| m.endpoint().eq_ignore_ascii_case(&resource.endpoint))
        {
            return Err(ScimError::Configuration(format!(
                "Duplicate endpoint '{}'",
                resource.endpoint
            )));
        }

        let mut attribute_mappers: Vec<Arc<dyn AttributeMapper>> = Vec::new();
        let mut derived_attributes: Vec<Arc<dyn DerivedAttribute>> = Vec::new();
        let mut descriptors: Vec<Arc<AttributeDescriptor>> = Vec::new();

        for attribute in &resource.attributes {
            let schema = attribute.schema.as_deref().unwrap_or(&resource.schema);
            let (descriptor, mapper) =
                build_attribute(resource, attribute, schema, transforms)?;
            if let Some(mapper) = mapper {
                attribute_mappers.push(mapper);
            }
            if let Some(derivation) = &attribute.derivation {
                derived_attributes
                    .push(derivations.create(&derivation.name, descriptor.clone())?);
            }
            descriptors.push(descriptor);
        }

        let scope = SearchScope::parse(&resource.ldap_search.scope).ok_or_else(|| {
            ScimError::Configuration(format!(
                "Unknown search scope '{}' for resource {}",
                resource.ldap_search.scope, resource.name
            ))
        })?;
        let search_filter = LdapFilter::parse(&resource.ldap_search.filter)?;

        let dn_template = resource
            .ldap_add
            .as_ref()
            .map(|add| DnTemplate::parse(&add.dn_template))
            .transpose()?;

        let fixed_attributes = resource
            .ldap_add
            .as_ref()
            .map(|add| {
                add.fixed_attributes
                    .iter()
                    .map(|fixed| {
                        let values = fixed.values();
                        if values.is_empty() {
                            return Err(ScimError::Configuration(format!(
                                "Fixed attribute '{}' has no values",
                                fixed.ldap_attribute
                            )));
                        }
                        let on_conflict =
                            ConflictPolicy::parse(&fixed.on_conflict).ok_or_else(|| {
                                ScimError::Configuration(format!(
                                    "Unknown conflict policy '{}'",
                                    fixed.on_conflict
                                ))
                            })?;
                        Ok(FixedAttribute {
                            ldap_attribute: fixed.ldap_attribute.clone(),
                            values,
                            on_conflict,
                        })
                    })
                    .collect::<ScimResult<Vec<FixedAttribute>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let id_attribute = resource
            .id_attribute
            .clone()
            .or_else(|| {
                dn_template
                    .as_ref()
                    .and_then(|t| t.first_placeholder().map(str::to_string))
            })
            .ok_or_else(|| {
                ScimError::Configuration(format!(
                    "Resource {} needs an idAttribute or a DN template to derive one from",
                    resource.name
                ))
            })?;

        let mapper = Arc::new(ResourceMapper::new(
            resource.name.clone(),
            resource.endpoint.clone(),
            resource.schema.clone(),
            resource.ldap_search.base_dn.trim().to_string(),
            scope,
            search_filter,
            dn_template,
            fixed_attributes,
            id_attribute,
            attribute_mappers,
            derived_attributes,
        )?);

        let mut resource_attributes = vec![mapper.id_descriptor().clone()];
        resource_attributes.extend(descriptors);
        resources.push(Arc::new(ResourceDescriptor {
            name: resource.name.clone(),
            endpoint: resource.endpoint.clone(),
            schema: resource.schema.clone(),
            attributes: resource_attributes,
        }));
        mappers.push(mapper);
    }

    Ok(GatewayConfig {
        registry: SchemaRegistry::new(resources),
        mappers,
        max_results: config.max_results,
    })
}

/// Build the descriptor and, when the shape carries mappings, the
/// attribute mapper for one attribute definition.
fn build_attribute(
    resource: &ResourceConfig,
    attribute: &AttributeConfig,
    schema: &str,
    transforms: &TransformationRegistry,
) -> ScimResult<(Arc<AttributeDescriptor>, Option<Arc<dyn AttributeMapper>>)> {
    let shapes = [
        attribute.simple.is_some(),
        attribute.complex.is_some(),
        attribute.simple_plural.is_some(),
        attribute.complex_plural.is_some(),
    ];
    if shapes.iter().filter(|present| **present).count() != 1 {
        return Err(ScimError::Configuration(format!(
            "Attribute '{}' of resource {} must declare exactly one of simple, complex, simplePlural or complexPlural",
            attribute.name, resource.name
        )));
    }
    let description = attribute.description.as_deref().unwrap_or("");

    if let Some(simple) = &attribute.simple {
        let data_type = parse_data_type(&simple.data_type, &attribute.name)?;
        let descriptor = Arc::new(AttributeDescriptor::singular_simple(
            &attribute.name,
            data_type,
            schema,
            description,
            attribute.read_only,
            attribute.required,
            simple.case_exact,
        )?);
        let mapper = match &simple.mapping {
            Some(mapping) => Some(Arc::new(SimpleAttributeMapper::new(
                descriptor.clone(),
                mapping.ldap_attribute.clone(),
                transforms.resolve(mapping.transform.as_deref())?,
            )) as Arc<dyn AttributeMapper>),
            None => None,
        };
        if mapper.is_none() && attribute.derivation.is_none() {
            return Err(ScimError::Configuration(format!(
                "Attribute '{}' has neither a mapping nor a derivation",
                attribute.name
            )));
        }
        return Ok((descriptor, mapper));
    }

    if let Some(complex) = &attribute.complex {
        let sub_descriptors = build_sub_descriptors(&complex.sub_attributes, schema)?;
        let descriptor = Arc::new(AttributeDescriptor::singular_complex(
            &attribute.name,
            schema,
            description,
            attribute.read_only,
            attribute.required,
            sub_descriptors,
        )?);
        let mapper = if complex.mappings.is_empty() {
            None
        } else {
            let mappings = complex
                .mappings
                .iter()
                .map(|m| {
                    let sub_descriptor =
                        descriptor.sub_attribute(&m.sub_attribute).ok_or_else(|| {
                            ScimError::Configuration(format!(
                                "Mapping for unknown sub-attribute '{}' of '{}'",
                                m.sub_attribute, attribute.name
                            ))
                        })?;
                    Ok(SubAttributeMapping {
                        sub_descriptor: sub_descriptor.clone(),
                        ldap_attribute: m.ldap_attribute.clone(),
                        transformation: transforms.resolve(m.transform.as_deref())?,
                    })
                })
                .collect::<ScimResult<Vec<SubAttributeMapping>>>()?;
            Some(Arc::new(ComplexAttributeMapper::new(descriptor.clone(), mappings)?)
                as Arc<dyn AttributeMapper>)
        };
        if mapper.is_none() && attribute.derivation.is_none() {
            return Err(ScimError::Configuration(format!(
                "Attribute '{}' has neither mappings nor a derivation",
                attribute.name
            )));
        }
        return Ok((descriptor, mapper));
    }

    if let Some(plural) = &attribute.simple_plural {
        let data_type = parse_data_type(&plural.data_type, &attribute.name)?;
        let descriptor = Arc::new(AttributeDescriptor::plural_simple(
            &attribute.name,
            data_type,
            schema,
            description,
            attribute.read_only,
            attribute.required,
            plural.case_exact,
            plural.plural_types.clone(),
        )?);
        let mapper = Arc::new(PluralAttributeMapper::new(
            descriptor.clone(),
            vec![PluralMapping {
                plural_type: None,
                sub_attribute: "value".to_string(),
                ldap_attribute: plural.mapping.ldap_attribute.clone(),
                transformation: transforms.resolve(plural.mapping.transform.as_deref())?,
            }],
        )) as Arc<dyn AttributeMapper>;
        return Ok((descriptor, Some(mapper)));
    }

    let plural = match &attribute.complex_plural {
        Some(plural) => plural,
        None => {
            return Err(ScimError::Configuration(format!(
                "Attribute '{}' declares no shape",
                attribute.name
            )))
        }
    };
    let sub_descriptors = build_sub_descriptors(&plural.sub_attributes, schema)?;
    let descriptor = Arc::new(AttributeDescriptor::plural_complex(
        &attribute.name,
        schema,
        description,
        attribute.read_only,
        attribute.required,
        plural.plural_types.clone(),
        sub_descriptors,
    )?);
    for mapping in &plural.mappings {
        if let Some(tag) = &mapping.plural_type {
            if !descriptor.has_plural_type(tag) {
                return Err(ScimError::Configuration(format!(
                    "Mapping for unknown plural type '{}' of '{}'",
                    tag, attribute.name
                )));
            }
        }
        if descriptor.sub_attribute(&mapping.sub_attribute).is_none() {
            return Err(ScimError::Configuration(format!(
                "Mapping for unknown sub-attribute '{}' of '{}'",
                mapping.sub_attribute, attribute.name
            )));
        }
    }
    let mappings = plural
        .mappings
        .iter()
        .map(|m| {
            Ok(PluralMapping {
                plural_type: m.plural_type.clone(),
                sub_attribute: m.sub_attribute.clone(),
                ldap_attribute: m.ldap_attribute.clone(),
                transformation: transforms.resolve(m.transform.as_deref())?,
            })
        })
        .collect::<ScimResult<Vec<PluralMapping>>>()?;
    let mapper = if mappings.is_empty() {
        None
    } else {
        Some(Arc::new(PluralAttributeMapper::new(descriptor.clone(), mappings))
            as Arc<dyn AttributeMapper>)
    };
    if mapper.is_none() && attribute.derivation.is_none() {
        return Err(ScimError::Configuration(format!(
            "Attribute '{}' has neither mappings nor a derivation",
            attribute.name
        )));
    }
    Ok((descriptor, mapper))
}

fn build_sub_descriptors(
    sub_attributes: &[SubAttributeConfig],
    schema: &str,
) -> ScimResult<Vec<Arc<AttributeDescriptor>>> {
    sub_attributes
        .iter()
        .map(|sub| {
            let data_type = parse_data_type(&sub.data_type, &sub.name)?;
            Ok(Arc::new(AttributeDescriptor::singular_simple(
                &sub.name,
                data_type,
                schema,
                sub.description.as_deref().unwrap_or(""),
                sub.read_only,
                sub.required,
                sub.case_exact,
            )?))
        })
        .collect()
}

fn parse_data_type(raw: &str, attribute: &str) -> ScimResult<DataType> {
    DataType::parse(raw).ok_or_else(|| {
        ScimError::Configuration(format!(
            "Unknown data type '{}' for attribute '{}'",
            raw, attribute
        ))
    })
}

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> ScimResult<String> {
    let chars: Vec<char> = content.chars().collect();
    let mut expanded = String::with_capacity(content.len());
    let mut i = 0;

    while i < chars.len() {
        if i + 1 < chars.len() && chars[i] == '$' && chars[i + 1] == '{' {
            let mut j = i + 2;
            while j < chars.len() && chars[j] != '}' {
                j += 1;
            }
            if j < chars.len() {
                let expression: String = chars[i + 2..j].iter().collect();
                let (name, default_value) = match expression.find(":-") {
                    Some(position) => (
                        expression[..position].to_string(),
                        Some(expression[position + 2..].to_string()),
                    ),
                    None => (expression, None),
                };
                let value = match std::env::var(&name) {
                    Ok(value) => value,
                    Err(_) => default_value.ok_or_else(|| {
                        ScimError::Configuration(format!(
                            "Environment variable {} not set and no default provided",
                            name
                        ))
                    })?,
                };
                expanded.push_str(&value);
                i = j + 1;
            } else {
                expanded.push(chars[i]);
                i += 1;
            }
        } else {
            expanded.push(chars[i]);
            i += 1;
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SystemClock;

    fn registries() -> (TransformationRegistry, DerivedAttributeRegistry) {
        (
            TransformationRegistry::with_defaults(),
            DerivedAttributeRegistry::with_defaults(Arc::new(SystemClock)),
        )
    }

    const MINIMAL: &str = r#"
resources:
  - name: User
    schema: urn:scim:schemas:core:1.0
    endpoint: Users
    ldapSearch:
      baseDN: ou=People,dc=example,dc=com
      filter: (objectClass=inetOrgPerson)
    ldapAdd:
      dnTemplate: uid={uid},ou=People,dc=example,dc=com
      fixedAttributes:
        - ldapAttribute: objectClass
          fixedValues: [top, person, inetOrgPerson]
    attributes:
      - name: userName
        required: true
        simple:
          dataType: string
          mapping:
            ldapAttribute: uid
"#;

    #[test]
    fn test_minimal_config_loads() {
        let (transforms, derivations) = registries();
        let config = load_from_str(MINIMAL, &transforms, &derivations).unwrap();

        assert_eq!(config.max_results, 200);
        let mapper = config.mapper("users").unwrap();
        assert_eq!(mapper.resource_name(), "User");
        assert_eq!(mapper.id_attribute(), "uid");
        assert_eq!(mapper.search_base_dn(), "ou=People,dc=example,dc=com");
        assert!(mapper.supports_create());

        let resource = config.registry.resource("Users").unwrap();
        assert!(resource.attribute_by_name("id").is_some());
        assert!(resource.attribute_by_name("userName").is_some());
    }

    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("MAPPING_BASE_DN", "dc=acme,dc=com");
        let expanded =
            expand_env_vars("baseDN: ${MAPPING_BASE_DN}\nother: ${MISSING:-fallback}").unwrap();
        assert!(expanded.contains("dc=acme,dc=com"));
        assert!(expanded.contains("fallback"));
        std::env::remove_var("MAPPING_BASE_DN");

        assert!(expand_env_vars("x: ${NO_SUCH_VARIABLE_SET}").is_err());
    }

    #[test]
    fn test_unknown_transformation_fails_load() {
        let (transforms, derivations) = registries();
        let yaml = MINIMAL.replace(
            "ldapAttribute: uid",
            "ldapAttribute: uid\n            transform: com.example.Custom",
        );
        let result = load_from_str(&yaml, &transforms, &derivations);
        assert!(matches!(result, Err(ScimError::Configuration(_))));
    }

    #[test]
    fn test_unknown_derivation_fails_load() {
        let (transforms, derivations) = registries();
        let yaml = MINIMAL.replace(
            "      - name: userName",
            "      - name: meta\n        readOnly: true\n        derivation:\n          name: bogus\n        complex:\n          subAttributes:\n            - name: created\n              dataType: dateTime\n      - name: userName",
        );
        let result = load_from_str(&yaml, &transforms, &derivations);
        assert!(matches!(result, Err(ScimError::Configuration(_))));
    }

    #[test]
    fn test_attribute_must_declare_one_shape() {
        let (transforms, derivations) = registries();
        let yaml = MINIMAL.replace(
            "        simple:\n          dataType: string\n          mapping:\n            ldapAttribute: uid\n",
            "",
        );
        let result = load_from_str(&yaml, &transforms, &derivations);
        assert!(matches!(result, Err(ScimError::Configuration(_))));
    }

    #[test]
    fn test_empty_resources_rejected() {
        let (transforms, derivations) = registries();
        let result = load_from_str("resources: []", &transforms, &derivations);
        assert!(matches!(result, Err(ScimError::Configuration(_))));
    }

    #[test]
    fn test_duplicate_endpoint_rejected() {
        let (transforms, derivations) = registries();
        let yaml = format!("{}{}", MINIMAL, MINIMAL.replacen("resources:\n", "", 1));
        let result = load_from_str(&yaml, &transforms, &derivations);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_search_filter_rejected() {
        let (transforms, derivations) = registries();
        let yaml = MINIMAL.replace("(objectClass=inetOrgPerson)", "(objectClass=unbalanced");
        let result = load_from_str(&yaml, &transforms, &derivations);
        assert!(matches!(result, Err(ScimError::Configuration(_))));
    }
}
