//! Typed conversions between LDAP octet strings and SCIM values.
//!
//! Each mapped attribute names a transformation from a closed registry;
//! unknown names fail configuration load.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

use crate::error::{ScimError, ScimResult};
use crate::model::value::{parse_datetime, SimpleValue};
use crate::schema::descriptor::{AttributeDescriptor, DataType};

/// A bidirectional value conversion between SCIM and LDAP.
pub trait Transformation: Send + Sync {
    /// Encode a SCIM value as an LDAP attribute value.
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>>;

    /// Decode an LDAP attribute value as a SCIM value of the descriptor's
    /// data type.
    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        bytes: &[u8],
    ) -> ScimResult<SimpleValue>;

    /// Rewrite a raw SCIM filter literal into the directory's syntax.
    /// Must be total; literals that do not parse pass through unchanged.
    fn to_ldap_filter_value(&self, literal: &str) -> String;
}

/// Wire-string passthrough keyed on the descriptor's data type.
pub struct DefaultTransformation;

impl Transformation for DefaultTransformation {
    fn to_ldap_value(
        &self,
        _descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        Ok(match value {
            SimpleValue::Binary(bytes) => bytes.clone(),
            other => other.as_wire_string().into_bytes(),
        })
    }

    fn to_scim_value(
        &self,
        descriptor: &AttributeDescriptor,
        bytes: &[u8],
    ) -> ScimResult<SimpleValue> {
        if descriptor.data_type() == DataType::Binary {
            return Ok(SimpleValue::Binary(bytes.to_vec()));
        }
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ScimError::InvalidAttributeValue(format!(
                "LDAP value for '{}' is not valid UTF-8",
                descriptor.name()
            ))
        })?;
        SimpleValue::parse(descriptor.data_type(), text)
    }

    fn to_ldap_filter_value(&self, literal: &str) -> String {
        literal.to_string()
    }
}

/// ISO-8601 UTC datetimes to LDAP generalized time, `YYYYMMDDhhmmss.sssZ`.
pub struct GeneralizedTimeTransformation;

const GENERALIZED_TIME_FORMAT: &str = "%Y%m%d%H%M%S%.3fZ";

fn format_generalized_time(dt: DateTime<Utc>) -> String {
    dt.format(GENERALIZED_TIME_FORMAT).to_string()
}

/// Parses generalized time with or without a fractional seconds part.
pub fn parse_generalized_time(raw: &str) -> ScimResult<DateTime<Utc>> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_suffix('Z').ok_or_else(|| {
        ScimError::InvalidAttributeValue(format!("'{}' is not generalized time", raw))
    })?;
    let parsed = NaiveDateTime::parse_from_str(stripped, "%Y%m%d%H%M%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(stripped, "%Y%m%d%H%M%S"))
        .map_err(|_| {
            ScimError::InvalidAttributeValue(format!("'{}' is not generalized time", raw))
        })?;
    Ok(Utc.from_utc_datetime(&parsed))
}

impl Transformation for GeneralizedTimeTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::DateTime(dt) => Ok(format_generalized_time(*dt).into_bytes()),
            SimpleValue::String(s) => {
                let dt = parse_datetime(s)?;
                Ok(format_generalized_time(dt).into_bytes())
            }
            other => Err(ScimError::InvalidAttributeValue(format!(
                "'{}' expects a dateTime, got {}",
                descriptor.name(),
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        _descriptor: &AttributeDescriptor,
        bytes: &[u8],
    ) -> ScimResult<SimpleValue> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ScimError::InvalidAttributeValue("generalized time is not UTF-8".to_string())
        })?;
        parse_generalized_time(text).map(SimpleValue::DateTime)
    }

    fn to_ldap_filter_value(&self, literal: &str) -> String {
        match parse_datetime(literal) {
            Ok(dt) => format_generalized_time(dt),
            Err(_) => literal.to_string(),
        }
    }
}

/// SCIM multi-line addresses to the directory's `$`-separated postal
/// address syntax, escaping `\` and `$` per RFC 4517.
pub struct PostalAddressTransformation;

impl Transformation for PostalAddressTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::String(s) => {
                let lines: Vec<String> = s
                    .split('\n')
                    .map(|line| line.replace('\\', "\\5C").replace('$', "\\24"))
                    .collect();
                Ok(lines.join("$").into_bytes())
            }
            other => Err(ScimError::InvalidAttributeValue(format!(
                "'{}' expects a string, got {}",
                descriptor.name(),
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        _descriptor: &AttributeDescriptor,
        bytes: &[u8],
    ) -> ScimResult<SimpleValue> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ScimError::InvalidAttributeValue("postal address is not UTF-8".to_string())
        })?;
        let lines: Vec<String> = text
            .split('$')
            .map(|line| line.replace("\\24", "$").replace("\\5C", "\\").replace("\\5c", "\\"))
            .collect();
        Ok(SimpleValue::String(lines.join("\n")))
    }

    fn to_ldap_filter_value(&self, literal: &str) -> String {
        literal.replace('\\', "\\5C").replace('$', "\\24").replace('\n', "$")
    }
}

/// Telephone numbers pass through unchanged; the directory's
/// telephoneNumberMatch rule already ignores formatting characters.
pub struct TelephoneNumberTransformation;

impl Transformation for TelephoneNumberTransformation {
    fn to_ldap_value(
        &self,
        descriptor: &AttributeDescriptor,
        value: &SimpleValue,
    ) -> ScimResult<Vec<u8>> {
        match value {
            SimpleValue::String(s) => Ok(s.clone().into_bytes()),
            other => Err(ScimError::InvalidAttributeValue(format!(
                "'{}' expects a string, got {}",
                descriptor.name(),
                other.data_type().as_str()
            ))),
        }
    }

    fn to_scim_value(
        &self,
        _descriptor: &AttributeDescriptor,
        bytes: &[u8],
    ) -> ScimResult<SimpleValue> {
        let text = std::str::from_utf8(bytes).map_err(|_| {
            ScimError::InvalidAttributeValue("telephone number is not UTF-8".to_string())
        })?;
        Ok(SimpleValue::String(text.to_string()))
    }

    fn to_ldap_filter_value(&self, literal: &str) -> String {
        literal.to_string()
    }
}

/// Named transformations available to the configuration.
pub struct TransformationRegistry {
    entries: HashMap<String, Arc<dyn Transformation>>,
}

impl TransformationRegistry {
    /// Registry with the built-in transformations.
    pub fn with_defaults() -> TransformationRegistry {
        let mut registry = TransformationRegistry {
            entries: HashMap::new(),
        };
        registry.register("default", Arc::new(DefaultTransformation));
        registry.register("generalizedTime", Arc::new(GeneralizedTimeTransformation));
        registry.register("postalAddress", Arc::new(PostalAddressTransformation));
        registry.register("telephoneNumber", Arc::new(TelephoneNumberTransformation));
        registry
    }

    pub fn register(&mut self, name: &str, transformation: Arc<dyn Transformation>) {
        self.entries.insert(name.to_lowercase(), transformation);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Transformation>> {
        self.entries.get(&name.to_lowercase()).cloned()
    }

    /// Resolve an optional configured name, defaulting to `default`.
    pub fn resolve(&self, name: Option<&str>) -> ScimResult<Arc<dyn Transformation>> {
        let name = name.unwrap_or("default");
        self.get(name).ok_or_else(|| {
            ScimError::Configuration(format!("unknown transformation '{}'", name))
        })
    }
}
