//! In-memory evaluation of SCIM filters against a resource.
//!
//! Used to post-filter query results when the LDAP translation was
//! partial, and to re-check entries after GT/LT widening.

use crate::error::{ScimError, ScimResult};
use crate::model::attribute::{ScimAttribute, ScimAttributeValue};
use crate::model::object::ScimObject;
use crate::model::value::{parse_datetime, SimpleValue};
use crate::parser::filter_operator::{FilterOp, ScimFilter};
use crate::schema::descriptor::AttributeDescriptor;

/// Evaluates filters against `ScimObject`s, resolving unqualified paths
/// against a default schema URN.
pub struct FilterEvaluator {
    default_schema: String,
}

impl FilterEvaluator {
    pub fn new(default_schema: &str) -> Self {
        Self {
            default_schema: default_schema.to_string(),
        }
    }

    pub fn evaluate(&self, filter: &ScimFilter, object: &ScimObject) -> ScimResult<bool> {
        match filter {
            ScimFilter::And(children) => {
                for child in children {
                    if !self.evaluate(child, object)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            ScimFilter::Or(children) => {
                for child in children {
                    if self.evaluate(child, object)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            ScimFilter::Compare { path, op, value } => {
                let schema = path.schema_or(&self.default_schema);
                let attribute = match object.get(schema, &path.name) {
                    Some(attribute) => attribute,
                    None => return Ok(false),
                };
                let candidates = candidate_values(attribute, path.sub_attribute.as_deref());
                match op {
                    FilterOp::Present => Ok(!candidates.is_empty()),
                    _ => {
                        let literal = value.as_deref().ok_or_else(|| {
                            ScimError::InvalidFilter(format!(
                                "operator on '{}' requires a value",
                                path.name
                            ))
                        })?;
                        for (descriptor, candidate) in candidates {
                            if compare(descriptor, candidate, *op, literal)? {
                                return Ok(true);
                            }
                        }
                        Ok(false)
                    }
                }
            }
        }
    }
}

/// Collect the simple values a leaf addresses, paired with the descriptor
/// that carries their case rule. For plural attributes a leaf matches if
/// any element matches; a missing sub-path on a plural addresses the
/// element `value`.
fn candidate_values<'a>(
    attribute: &'a ScimAttribute,
    sub_name: Option<&str>,
) -> Vec<(&'a AttributeDescriptor, &'a SimpleValue)> {
    let mut candidates = Vec::new();
    let sub_name = match sub_name {
        Some(name) => Some(name),
        None if attribute.is_plural() => Some("value"),
        None => None,
    };

    for value in attribute.values() {
        match (value, sub_name) {
            (ScimAttributeValue::Simple(simple), None) => {
                candidates.push((attribute.descriptor().as_ref(), simple));
            }
            (ScimAttributeValue::Simple(simple), Some(name)) => {
                // Plural of simple elements: the element itself is the value.
                if name.eq_ignore_ascii_case("value") && attribute.is_plural() {
                    candidates.push((attribute.descriptor().as_ref(), simple));
                }
            }
            (ScimAttributeValue::Complex(_), Some(name)) => {
                if let Some(sub) = value.sub_attribute(name) {
                    if let Some(simple) = sub.simple_value() {
                        candidates.push((sub.descriptor().as_ref(), simple));
                    }
                }
            }
            (ScimAttributeValue::Complex(_), None) => {}
        }
    }
    candidates
}

fn compare(
    descriptor: &AttributeDescriptor,
    value: &SimpleValue,
    op: FilterOp,
    literal: &str,
) -> ScimResult<bool> {
    match op {
        FilterOp::Equal | FilterOp::Contains | FilterOp::StartsWith => {
            let (lhs, rhs) = fold_case(descriptor, &value.as_wire_string(), literal);
            Ok(match op {
                FilterOp::Equal => lhs == rhs,
                FilterOp::Contains => lhs.contains(&rhs),
                FilterOp::StartsWith => lhs.starts_with(&rhs),
                _ => unreachable!(),
            })
        }
        FilterOp::GreaterThan | FilterOp::GreaterOrEqual | FilterOp::LessThan | FilterOp::LessOrEqual => {
            let ordering = match value {
                SimpleValue::DateTime(dt) => {
                    let bound = parse_datetime(literal)
                        .map_err(|_| invalid_ordering_literal(descriptor, literal))?;
                    dt.cmp(&bound)
                }
                SimpleValue::Integer(i) => {
                    let bound: i64 = literal
                        .trim()
                        .parse()
                        .map_err(|_| invalid_ordering_literal(descriptor, literal))?;
                    i.cmp(&bound)
                }
                SimpleValue::String(s) => {
                    let (lhs, rhs) = fold_case(descriptor, s, literal);
                    lhs.cmp(&rhs)
                }
                // Ordering is undefined for booleans and binary data.
                SimpleValue::Boolean(_) | SimpleValue::Binary(_) => return Ok(false),
            };
            Ok(match op {
                FilterOp::GreaterThan => ordering.is_gt(),
                FilterOp::GreaterOrEqual => ordering.is_ge(),
                FilterOp::LessThan => ordering.is_lt(),
                FilterOp::LessOrEqual => ordering.is_le(),
                _ => unreachable!(),
            })
        }
        FilterOp::Present => Ok(true),
    }
}

fn fold_case(descriptor: &AttributeDescriptor, lhs: &str, rhs: &str) -> (String, String) {
    if descriptor.is_case_exact() {
        (lhs.to_string(), rhs.to_string())
    } else {
        (lhs.to_lowercase(), rhs.to_lowercase())
    }
}

fn invalid_ordering_literal(descriptor: &AttributeDescriptor, literal: &str) -> ScimError {
    ScimError::InvalidFilter(format!(
        "'{}' is not comparable against {} attribute '{}'",
        literal,
        descriptor.data_type().as_str(),
        descriptor.name()
    ))
}
