//! Catalog of resource and attribute descriptors, built once from the
//! mapping configuration.

use std::sync::Arc;

use crate::schema::descriptor::AttributeDescriptor;

/// One SCIM resource type: a schema URN plus its top-level attributes.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    pub name: String,
    pub endpoint: String,
    pub schema: String,
    pub attributes: Vec<Arc<AttributeDescriptor>>,
}

impl ResourceDescriptor {
    /// Case-insensitive top-level attribute lookup by `(schema, name)`.
    pub fn attribute(&self, schema: &str, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attributes.iter().find(|d| d.matches(schema, name))
    }

    /// Locate an attribute by name alone, preferring the resource's own
    /// schema. Used by the codecs when a wire form does not carry the URN.
    pub fn attribute_by_name(&self, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.attributes
            .iter()
            .find(|d| d.schema().eq_ignore_ascii_case(&self.schema) && d.name().eq_ignore_ascii_case(name))
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|d| d.name().eq_ignore_ascii_case(name))
            })
    }

    /// Schema URNs contributing attributes to this resource, the resource's
    /// own schema first.
    pub fn schemas(&self) -> Vec<String> {
        let mut schemas = vec![self.schema.clone()];
        for descriptor in &self.attributes {
            if !schemas
                .iter()
                .any(|s| s.eq_ignore_ascii_case(descriptor.schema()))
            {
                schemas.push(descriptor.schema().to_string());
            }
        }
        schemas
    }
}

/// All configured resource types.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    resources: Vec<Arc<ResourceDescriptor>>,
}

impl SchemaRegistry {
    pub fn new(resources: Vec<Arc<ResourceDescriptor>>) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &[Arc<ResourceDescriptor>] {
        &self.resources
    }

    pub fn resource(&self, endpoint: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.resources
            .iter()
            .find(|r| r.endpoint.eq_ignore_ascii_case(endpoint))
    }

    pub fn resource_by_name(&self, name: &str) -> Option<&Arc<ResourceDescriptor>> {
        self.resources
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Find a top-level descriptor by `(schema, name)` across resources.
    pub fn descriptor(&self, schema: &str, name: &str) -> Option<&Arc<AttributeDescriptor>> {
        self.resources
            .iter()
            .find_map(|r| r.attribute(schema, name))
    }

    /// Case-insensitive sub-descriptor lookup under a parent.
    pub fn sub_descriptor<'a>(
        &self,
        parent: &'a AttributeDescriptor,
        name: &str,
    ) -> Option<&'a Arc<AttributeDescriptor>> {
        parent.sub_attribute(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::DataType;
    use crate::schema::SCHEMA_URN_CORE;

    const ENTERPRISE_URN: &str = "urn:scim:schemas:extension:enterprise:1.0";

    fn sample_registry() -> SchemaRegistry {
        let user_name = Arc::new(
            AttributeDescriptor::singular_simple(
                "userName",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                true,
                false,
            )
            .unwrap(),
        );
        let employee_number = Arc::new(
            AttributeDescriptor::singular_simple(
                "employeeNumber",
                DataType::String,
                ENTERPRISE_URN,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        SchemaRegistry::new(vec![Arc::new(ResourceDescriptor {
            name: "User".to_string(),
            endpoint: "Users".to_string(),
            schema: SCHEMA_URN_CORE.to_string(),
            attributes: vec![user_name, employee_number],
        })])
    }

    #[test]
    fn test_resource_lookup_by_endpoint() {
        let registry = sample_registry();
        assert!(registry.resource("users").is_some());
        assert!(registry.resource("Groups").is_none());
    }

    #[test]
    fn test_descriptor_lookup() {
        let registry = sample_registry();
        assert!(registry.descriptor(SCHEMA_URN_CORE, "USERNAME").is_some());
        assert!(registry.descriptor(SCHEMA_URN_CORE, "missing").is_none());
        assert!(registry
            .descriptor(ENTERPRISE_URN, "employeeNumber")
            .is_some());
    }

    #[test]
    fn test_schemas_lists_extensions_after_core() {
        let registry = sample_registry();
        let resource = registry.resource("Users").unwrap();
        assert_eq!(
            resource.schemas(),
            vec![SCHEMA_URN_CORE.to_string(), ENTERPRISE_URN.to_string()]
        );
    }
}
