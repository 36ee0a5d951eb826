//! DN templates: literal text interleaved with `{attr}` placeholders
//! that substitute the first value of a staged LDAP attribute.

use crate::error::{ScimError, ScimResult};
use crate::ldap::entry::Entry;

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

#[derive(Debug, Clone)]
pub struct DnTemplate {
    template: String,
    segments: Vec<Segment>,
}

impl DnTemplate {
    pub fn parse(template: &str) -> ScimResult<DnTemplate> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.trim().chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(ScimError::Configuration(format!(
                                    "Unterminated placeholder in DN template '{}'",
                                    template
                                )))
                            }
                        }
                    }
                    if name.trim().is_empty() {
                        return Err(ScimError::Configuration(format!(
                            "Empty placeholder in DN template '{}'",
                            template
                        )));
                    }
                    segments.push(Segment::Placeholder(name.trim().to_string()));
                }
                '}' => {
                    return Err(ScimError::Configuration(format!(
                        "Unbalanced '}}' in DN template '{}'",
                        template
                    )))
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(DnTemplate {
            template: template.trim().to_string(),
            segments,
        })
    }

    /// LDAP attribute types the placeholders reference.
    pub fn attributes(&self) -> Vec<String> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Placeholder(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// The attribute named by the first placeholder, conventionally the
    /// entry's naming attribute.
    pub fn first_placeholder(&self) -> Option<&str> {
        self.segments.iter().find_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Expand the template against a staged entry.
    pub fn construct(&self, entry: &Entry) -> ScimResult<String> {
        let mut dn = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => dn.push_str(text),
                Segment::Placeholder(name) => {
                    let value = entry.first_value_str(name).ok_or_else(|| {
                        ScimError::InvalidResource(format!(
                            "DN template '{}' references '{}' which has no value",
                            self.template, name
                        ))
                    })?;
                    dn.push_str(&value);
                }
            }
        }
        Ok(dn)
    }
}
