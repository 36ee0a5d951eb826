//! XML wire form of the common resource representation.
//!
//! The root element's local name is the resource name and its namespace
//! the schema URN; extension-schema attributes carry their own namespace.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::name::ResolveResult;
use quick_xml::{NsReader, Writer};

use crate::error::{ScimError, ScimResult};
use crate::model::attribute::{ScimAttribute, ScimAttributeValue};
use crate::model::object::ScimObject;
use crate::model::query::ListResponse;
use crate::model::value::SimpleValue;
use crate::schema::descriptor::{AttributeDescriptor, DataType};
use crate::schema::registry::ResourceDescriptor;
use std::sync::Arc;

/// Fixed serialization order for plural element sub-attributes, for
/// deterministic output.
const ELEMENT_TAG_ORDER: [&str; 5] = ["value", "type", "primary", "display", "operation"];

pub struct XmlMarshaller;

impl XmlMarshaller {
    pub fn marshal_object(
        object: &ScimObject,
        resource: &ResourceDescriptor,
    ) -> ScimResult<String> {
        let mut writer = Writer::new(Vec::new());
        write_object(&mut writer, object, resource)?;
        into_string(writer)
    }

    pub fn marshal_list(list: &ListResponse, resource: &ResourceDescriptor) -> ScimResult<String> {
        let mut writer = Writer::new(Vec::new());

        let mut response = BytesStart::new("Response");
        response.push_attribute(("xmlns", resource.schema.as_str()));
        write_event(&mut writer, Event::Start(response))?;

        write_text_element(&mut writer, "totalResults", &list.total_results.to_string())?;
        write_text_element(&mut writer, "startIndex", &list.start_index.to_string())?;

        write_event(&mut writer, Event::Start(BytesStart::new("Resources")))?;
        for object in &list.resources {
            write_object(&mut writer, object, resource)?;
        }
        write_event(&mut writer, Event::End(BytesEnd::new("Resources")))?;

        write_event(&mut writer, Event::End(BytesEnd::new("Response")))?;
        into_string(writer)
    }

    pub fn marshal_error(error: &ScimError) -> ScimResult<String> {
        let mut writer = Writer::new(Vec::new());
        write_event(&mut writer, Event::Start(BytesStart::new("Error")))?;
        write_text_element(&mut writer, "code", &error.status_code().to_string())?;
        write_text_element(&mut writer, "description", error.detail())?;
        write_event(&mut writer, Event::End(BytesEnd::new("Error")))?;
        into_string(writer)
    }

    pub fn unmarshal_object(xml: &str, resource: &ResourceDescriptor) -> ScimResult<ScimObject> {
        let tree = parse_tree(xml)?;
        interpret_object(&tree, resource)
    }

    pub fn unmarshal_list(xml: &str, resource: &ResourceDescriptor) -> ScimResult<ListResponse> {
        let tree = parse_tree(xml)?;

        let mut total_results = None;
        let mut start_index = None;
        let mut resources = Vec::new();

        for child in &tree.children {
            if child.local.eq_ignore_ascii_case("totalResults") {
                total_results = Some(parse_count(&child.text, "totalResults")?);
            } else if child.local.eq_ignore_ascii_case("startIndex") {
                start_index = Some(parse_count(&child.text, "startIndex")?);
            } else if child.local.eq_ignore_ascii_case("Resources") {
                for entry in &child.children {
                    resources.push(interpret_object(entry, resource)?);
                }
            }
        }

        Ok(ListResponse {
            total_results: total_results.unwrap_or(resources.len()),
            start_index: start_index.unwrap_or(1),
            resources,
        })
    }

    pub fn unmarshal_error(xml: &str) -> ScimResult<ScimError> {
        let tree = parse_tree(xml)?;
        if !tree.local.eq_ignore_ascii_case("Error") {
            return Err(ScimError::InvalidResource(format!(
                "Expected an Error document, got <{}>",
                tree.local
            )));
        }
        let code = tree
            .child("code")
            .map(|node| {
                node.text.trim().parse::<u16>().map_err(|_| {
                    ScimError::InvalidResource(format!("'{}' is not a status code", node.text))
                })
            })
            .transpose()?
            .ok_or_else(|| {
                ScimError::InvalidResource("Error document carries no code".to_string())
            })?;
        let description = tree
            .child("description")
            .map(|node| node.text.clone())
            .unwrap_or_default();
        Ok(ScimError::from_status(code, description))
    }
}

fn write_object(
    writer: &mut Writer<Vec<u8>>,
    object: &ScimObject,
    resource: &ResourceDescriptor,
) -> ScimResult<()> {
    let mut root = BytesStart::new(resource.name.as_str());
    root.push_attribute(("xmlns", resource.schema.as_str()));
    write_event(writer, Event::Start(root))?;

    for attribute in object.attributes() {
        let descriptor = attribute.descriptor();
        let extension = !descriptor
            .schema()
            .eq_ignore_ascii_case(&resource.schema);
        write_attribute(writer, attribute, extension)?;
    }

    write_event(writer, Event::End(BytesEnd::new(resource.name.as_str())))?;
    Ok(())
}

fn write_attribute(
    writer: &mut Writer<Vec<u8>>,
    attribute: &ScimAttribute,
    extension: bool,
) -> ScimResult<()> {
    let descriptor = attribute.descriptor();
    let name = descriptor.name();

    let mut start = BytesStart::new(name);
    if extension {
        start.push_attribute(("xmlns", descriptor.schema()));
    }
    write_event(writer, Event::Start(start))?;

    if attribute.is_plural() {
        let element_name = singular_element_name(name);
        for element in attribute.values() {
            write_event(writer, Event::Start(BytesStart::new(element_name.as_str())))?;
            write_element_body(writer, descriptor, element)?;
            write_event(writer, Event::End(BytesEnd::new(element_name.as_str())))?;
        }
    } else if let Some(value) = attribute.values().first() {
        match value {
            ScimAttributeValue::Simple(simple) => {
                write_event(writer, Event::Text(BytesText::new(&simple.as_wire_string())))?;
            }
            ScimAttributeValue::Complex(sub_attributes) => {
                for sub in sub_attributes {
                    write_sub_attribute(writer, sub)?;
                }
            }
        }
    }

    write_event(writer, Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Plural element sub-attributes serialize in the fixed tag order, then
/// any remaining sub-attributes in element order.
fn write_element_body(
    writer: &mut Writer<Vec<u8>>,
    _descriptor: &Arc<AttributeDescriptor>,
    element: &ScimAttributeValue,
) -> ScimResult<()> {
    match element {
        ScimAttributeValue::Simple(simple) => {
            write_text_element(writer, "value", &simple.as_wire_string())
        }
        ScimAttributeValue::Complex(sub_attributes) => {
            for tag in ELEMENT_TAG_ORDER {
                if let Some(sub) = element.sub_attribute(tag) {
                    write_sub_attribute(writer, sub)?;
                }
            }
            for sub in sub_attributes {
                if !ELEMENT_TAG_ORDER
                    .iter()
                    .any(|tag| tag.eq_ignore_ascii_case(sub.descriptor().name()))
                {
                    write_sub_attribute(writer, sub)?;
                }
            }
            Ok(())
        }
    }
}

fn write_sub_attribute(writer: &mut Writer<Vec<u8>>, sub: &ScimAttribute) -> ScimResult<()> {
    if let Some(simple) = sub.simple_value() {
        write_text_element(writer, sub.descriptor().name(), &simple.as_wire_string())?;
    }
    Ok(())
}

fn write_text_element(writer: &mut Writer<Vec<u8>>, name: &str, text: &str) -> ScimResult<()> {
    write_event(writer, Event::Start(BytesStart::new(name)))?;
    write_event(writer, Event::Text(BytesText::new(text)))?;
    write_event(writer, Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn write_event(writer: &mut Writer<Vec<u8>>, event: Event) -> ScimResult<()> {
    writer
        .write_event(event)
        .map_err(|e| ScimError::ServerError(format!("XML serialization failed: {}", e)))
}

fn into_string(writer: Writer<Vec<u8>>) -> ScimResult<String> {
    String::from_utf8(writer.into_inner())
        .map_err(|e| ScimError::ServerError(format!("XML output is not UTF-8: {}", e)))
}

/// Wrapper children are named by the singular form of the plural name;
/// the parser accepts any child name, so this only shapes output.
fn singular_element_name(name: &str) -> String {
    let lower = name.to_lowercase();
    if lower.ends_with("ses") {
        name[..name.len() - 2].to_string()
    } else if lower.ends_with('s') && name.len() > 1 {
        name[..name.len() - 1].to_string()
    } else {
        name.to_string()
    }
}

/// A lightweight DOM used by the pull parser.
#[derive(Debug, Default)]
struct XmlNode {
    ns: Option<String>,
    local: String,
    text: String,
    children: Vec<XmlNode>,
}

impl XmlNode {
    fn child(&self, local: &str) -> Option<&XmlNode> {
        self.children
            .iter()
            .find(|c| c.local.eq_ignore_ascii_case(local))
    }
}

fn parse_tree(xml: &str) -> ScimResult<XmlNode> {
    let mut reader = NsReader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlNode> = Vec::new();
    let mut root: Option<XmlNode> = None;

    loop {
        match reader.read_resolved_event() {
            Ok((ns, Event::Start(start))) => {
                stack.push(XmlNode {
                    ns: resolved_namespace(&ns),
                    local: local_name(start.local_name().as_ref())?,
                    text: String::new(),
                    children: Vec::new(),
                });
            }
            Ok((ns, Event::Empty(start))) => {
                let node = XmlNode {
                    ns: resolved_namespace(&ns),
                    local: local_name(start.local_name().as_ref())?,
                    text: String::new(),
                    children: Vec::new(),
                };
                attach(&mut stack, &mut root, node)?;
            }
            Ok((_, Event::Text(text))) => {
                let content = text.unescape().map_err(|e| {
                    ScimError::InvalidResource(format!("Bad XML text content: {}", e))
                })?;
                if let Some(open) = stack.last_mut() {
                    open.text.push_str(&content);
                }
            }
            Ok((_, Event::End(_))) => {
                let node = stack.pop().ok_or_else(|| {
                    ScimError::InvalidResource("Unbalanced XML end tag".to_string())
                })?;
                attach(&mut stack, &mut root, node)?;
            }
            Ok((_, Event::Eof)) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ScimError::InvalidResource(format!(
                    "XML parse error: {}",
                    e
                )))
            }
        }
    }

    if !stack.is_empty() {
        return Err(ScimError::InvalidResource(
            "Truncated XML document".to_string(),
        ));
    }
    root.ok_or_else(|| ScimError::InvalidResource("Empty XML document".to_string()))
}

fn attach(
    stack: &mut [XmlNode],
    root: &mut Option<XmlNode>,
    node: XmlNode,
) -> ScimResult<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(node);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(node);
            Ok(())
        }
        None => Err(ScimError::InvalidResource(
            "Multiple XML root elements".to_string(),
        )),
    }
}

fn resolved_namespace(result: &ResolveResult) -> Option<String> {
    match result {
        ResolveResult::Bound(ns) => {
            Some(String::from_utf8_lossy(ns.as_ref()).into_owned())
        }
        _ => None,
    }
}

fn local_name(bytes: &[u8]) -> ScimResult<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| ScimError::InvalidResource("Non-UTF-8 XML element name".to_string()))
}

/// Attributes are located by `(namespace URI or resource schema, local
/// name)`; unknown elements are silently ignored.
fn interpret_object(tree: &XmlNode, resource: &ResourceDescriptor) -> ScimResult<ScimObject> {
    let mut object = ScimObject::new();
    for child in &tree.children {
        let schema = child.ns.as_deref().unwrap_or(&resource.schema);
        let descriptor = match resource.attribute(schema, &child.local) {
            Some(descriptor) => descriptor,
            None => continue,
        };
        object.add(interpret_attribute(descriptor, child)?);
    }
    Ok(object)
}

fn interpret_attribute(
    descriptor: &Arc<AttributeDescriptor>,
    node: &XmlNode,
) -> ScimResult<ScimAttribute> {
    if descriptor.is_multi_valued() {
        let mut elements = Vec::with_capacity(node.children.len());
        for element in &node.children {
            elements.push(interpret_complex(descriptor, element)?);
        }
        Ok(ScimAttribute::plural(descriptor.clone(), elements))
    } else if descriptor.data_type() == DataType::Complex {
        let value = interpret_complex(descriptor, node)?;
        Ok(ScimAttribute::singular(descriptor.clone(), value))
    } else {
        let value = SimpleValue::parse(descriptor.data_type(), &node.text)?;
        Ok(ScimAttribute::simple(descriptor.clone(), value))
    }
}

fn interpret_complex(
    descriptor: &Arc<AttributeDescriptor>,
    node: &XmlNode,
) -> ScimResult<ScimAttributeValue> {
    let mut sub_attributes = Vec::new();
    for child in &node.children {
        if let Some(sub_descriptor) = descriptor.sub_attribute(&child.local) {
            let value = SimpleValue::parse(sub_descriptor.data_type(), &child.text)?;
            sub_attributes.push(ScimAttribute::simple(sub_descriptor.clone(), value));
        }
    }
    Ok(ScimAttributeValue::Complex(sub_attributes))
}

fn parse_count(text: &str, element: &str) -> ScimResult<usize> {
    text.trim().parse::<usize>().map_err(|_| {
        ScimError::InvalidResource(format!("'{}' is not a valid {}", text, element))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SCHEMA_URN_CORE;

    const ENTERPRISE_URN: &str = "urn:scim:schemas:extension:enterprise:1.0";

    fn user_resource() -> ResourceDescriptor {
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
        let family = Arc::new(
            AttributeDescriptor::singular_simple(
                "familyName",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let name = Arc::new(
            AttributeDescriptor::singular_complex(
                "name",
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                vec![family],
            )
            .unwrap(),
        );
        let emails = Arc::new(
            AttributeDescriptor::plural_simple(
                "emails",
                DataType::String,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
                vec!["work".to_string()],
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
        ResourceDescriptor {
            name: "User".to_string(),
            endpoint: "Users".to_string(),
            schema: SCHEMA_URN_CORE.to_string(),
            attributes: vec![user_name, name, emails, employee_number],
        }
    }

    #[test]
    fn test_unmarshal_post_payload() {
        let resource = user_resource();
        let xml = "<User xmlns=\"urn:scim:schemas:core:1.0\"><userName>alice</userName><name><familyName>Doe</familyName></name></User>";
        let object = XmlMarshaller::unmarshal_object(xml, &resource).unwrap();

        assert_eq!(
            object
                .get(SCHEMA_URN_CORE, "userName")
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str()),
            Some("alice")
        );
        let name = object.get(SCHEMA_URN_CORE, "name").unwrap();
        assert_eq!(
            name.singular_value()
                .and_then(|v| v.sub_attribute("familyName"))
                .and_then(|a| a.simple_value())
                .and_then(|v| v.as_str()),
            Some("Doe")
        );
    }

    #[test]
    fn test_marshal_round_trip() {
        let resource = user_resource();
        let mut object = ScimObject::new();
        let user_name = resource.attribute_by_name("userName").unwrap();
        object.add(ScimAttribute::simple(
            user_name.clone(),
            SimpleValue::String("bjensen".to_string()),
        ));
        let emails = resource.attribute_by_name("emails").unwrap();
        let element = ScimAttribute::complex_value(
            emails,
            vec![
                ("type", SimpleValue::String("work".to_string())),
                ("value", SimpleValue::String("b@x.com".to_string())),
            ],
        )
        .unwrap();
        object.add(ScimAttribute::plural(emails.clone(), vec![element]));

        let xml = XmlMarshaller::marshal_object(&object, &resource).unwrap();
        // Element tags serialize in the fixed order regardless of input.
        assert!(xml.contains("<email><value>b@x.com</value><type>work</type></email>"));

        let parsed = XmlMarshaller::unmarshal_object(&xml, &resource).unwrap();
        assert!(parsed.equals_ignoring_order(&object));
    }

    #[test]
    fn test_extension_attribute_carries_own_namespace() {
        let resource = user_resource();
        let mut object = ScimObject::new();
        let employee_number = resource.attribute_by_name("employeeNumber").unwrap();
        object.add(ScimAttribute::simple(
            employee_number.clone(),
            SimpleValue::String("42".to_string()),
        ));

        let xml = XmlMarshaller::marshal_object(&object, &resource).unwrap();
        assert!(xml.contains(
            "<employeeNumber xmlns=\"urn:scim:schemas:extension:enterprise:1.0\">42</employeeNumber>"
        ));

        let parsed = XmlMarshaller::unmarshal_object(&xml, &resource).unwrap();
        assert!(parsed.get(ENTERPRISE_URN, "employeeNumber").is_some());
    }

    #[test]
    fn test_unknown_elements_ignored() {
        let resource = user_resource();
        let xml = "<User xmlns=\"urn:scim:schemas:core:1.0\"><userName>a</userName><nickName>x</nickName></User>";
        let object = XmlMarshaller::unmarshal_object(xml, &resource).unwrap();
        assert_eq!(object.attributes().len(), 1);
    }

    #[test]
    fn test_error_round_trip_is_exact() {
        let xml = "<Error><code>404</code><description>User not found</description></Error>";
        let parsed = XmlMarshaller::unmarshal_error(xml).unwrap();
        assert_eq!(parsed, ScimError::NotFound("User not found".to_string()));

        let serialized = XmlMarshaller::marshal_error(&parsed).unwrap();
        assert_eq!(serialized, xml);
    }

    #[test]
    fn test_list_round_trip() {
        let resource = user_resource();
        let mut object = ScimObject::new();
        let user_name = resource.attribute_by_name("userName").unwrap();
        object.add(ScimAttribute::simple(
            user_name.clone(),
            SimpleValue::String("bjensen".to_string()),
        ));
        let list = ListResponse {
            total_results: 10,
            start_index: 3,
            resources: vec![object],
        };

        let xml = XmlMarshaller::marshal_list(&list, &resource).unwrap();
        let parsed = XmlMarshaller::unmarshal_list(&xml, &resource).unwrap();
        assert_eq!(parsed.total_results, 10);
        assert_eq!(parsed.start_index, 3);
        assert_eq!(parsed.resources.len(), 1);
    }

    #[test]
    fn test_list_defaults_when_counts_absent() {
        let resource = user_resource();
        let xml = "<Response xmlns=\"urn:scim:schemas:core:1.0\"><Resources><User><userName>a</userName></User></Response>";
        // Truncated document is rejected, not defaulted.
        assert!(XmlMarshaller::unmarshal_list(xml, &resource).is_err());

        let xml = "<Response xmlns=\"urn:scim:schemas:core:1.0\"><Resources><User><userName>a</userName></User></Resources></Response>";
        let parsed = XmlMarshaller::unmarshal_list(xml, &resource).unwrap();
        assert_eq!(parsed.total_results, 1);
        assert_eq!(parsed.start_index, 1);
    }

    #[test]
    fn test_malformed_value_raises_invalid_attribute_value() {
        let family = Arc::new(
            AttributeDescriptor::singular_simple(
                "age",
                DataType::Integer,
                SCHEMA_URN_CORE,
                "",
                false,
                false,
                false,
            )
            .unwrap(),
        );
        let resource = ResourceDescriptor {
            name: "User".to_string(),
            endpoint: "Users".to_string(),
            schema: SCHEMA_URN_CORE.to_string(),
            attributes: vec![family],
        };
        let xml = "<User xmlns=\"urn:scim:schemas:core:1.0\"><age>abc</age></User>";
        assert!(matches!(
            XmlMarshaller::unmarshal_object(xml, &resource),
            Err(ScimError::InvalidAttributeValue(_))
        ));
    }

    #[test]
    fn test_singular_element_names() {
        assert_eq!(singular_element_name("emails"), "email");
        assert_eq!(singular_element_name("addresses"), "address");
        assert_eq!(singular_element_name("members"), "member");
        assert_eq!(singular_element_name("data"), "data");
    }
}
