//! The schema-keyed attribute container shared by the mapper and the
//! codecs.

use crate::model::attribute::ScimAttribute;

/// A SCIM resource in memory: attributes keyed by `(schema URN, name)`,
/// both parts case-insensitive. Insertion order is preserved so marshalled
/// output is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScimObject {
    attributes: Vec<ScimAttribute>,
}

impl ScimObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute, replacing any existing attribute under the same
    /// `(schema, name)` key.
    pub fn add(&mut self, attribute: ScimAttribute) {
        let descriptor = attribute.descriptor();
        if let Some(position) = self.attributes.iter().position(|a| {
            a.descriptor()
                .matches(descriptor.schema(), descriptor.name())
        }) {
            self.attributes[position] = attribute;
        } else {
            self.attributes.push(attribute);
        }
    }

    pub fn get(&self, schema: &str, name: &str) -> Option<&ScimAttribute> {
        self.attributes
            .iter()
            .find(|a| a.descriptor().matches(schema, name))
    }

    pub fn remove(&mut self, schema: &str, name: &str) -> Option<ScimAttribute> {
        let position = self
            .attributes
            .iter()
            .position(|a| a.descriptor().matches(schema, name))?;
        Some(self.attributes.remove(position))
    }

    pub fn attributes(&self) -> &[ScimAttribute] {
        &self.attributes
    }

    pub fn attributes_for_schema<'a>(
        &'a self,
        schema: &'a str,
    ) -> impl Iterator<Item = &'a ScimAttribute> {
        self.attributes
            .iter()
            .filter(move |a| a.descriptor().schema().eq_ignore_ascii_case(schema))
    }

    /// Every schema URN present, in first-seen order.
    pub fn schemas(&self) -> Vec<String> {
        let mut schemas: Vec<String> = Vec::new();
        for attribute in &self.attributes {
            let schema = attribute.descriptor().schema();
            if !schemas.iter().any(|s| s.eq_ignore_ascii_case(schema)) {
                schemas.push(schema.to_string());
            }
        }
        schemas
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Structural equality that ignores the ordering of plural values and
    /// of the attributes themselves.
    pub fn equals_ignoring_order(&self, other: &ScimObject) -> bool {
        self.attributes.len() == other.attributes.len()
            && self.attributes.iter().all(|a| {
                other
                    .get(a.descriptor().schema(), a.descriptor().name())
                    .map(|b| a.equals_ignoring_order(b))
                    .unwrap_or(false)
            })
    }
}
