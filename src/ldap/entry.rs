//! In-memory model of LDAP entries, attributes and modifications.
//!
//! Attribute values are opaque byte strings; the directory decides their
//! syntax. UTF-8 accessors are provided for the common case.

/// A named LDAP attribute with one or more raw values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    pub fn new(name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn from_str_value(name: impl Into<String>, value: &str) -> Self {
        Self::new(name, vec![value.as_bytes().to_vec()])
    }

    pub fn from_str_values(name: impl Into<String>, values: &[&str]) -> Self {
        Self::new(name, values.iter().map(|v| v.as_bytes().to_vec()).collect())
    }

    /// First value decoded as UTF-8, if any.
    pub fn first_value_str(&self) -> Option<String> {
        self.values
            .first()
            .map(|v| String::from_utf8_lossy(v).into_owned())
    }

    pub fn value_strings(&self) -> Vec<String> {
        self.values
            .iter()
            .map(|v| String::from_utf8_lossy(v).into_owned())
            .collect()
    }
}

/// An LDAP entry: a DN plus a bag of attributes.
///
/// Attribute names are matched case-insensitively, as the directory does.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entry {
    pub dn: String,
    attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute(name).is_some()
    }

    /// First value of the named attribute decoded as UTF-8.
    pub fn first_value_str(&self, name: &str) -> Option<String> {
        self.attribute(name).and_then(|a| a.first_value_str())
    }

    /// Add values, merging into an existing attribute of the same name.
    pub fn add_attribute(&mut self, attribute: Attribute) {
        match self
            .attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(&attribute.name))
        {
            Some(existing) => existing.values.extend(attribute.values),
            None => self.attributes.push(attribute),
        }
    }

    pub fn add_str_value(&mut self, name: &str, value: &str) {
        self.add_attribute(Attribute::from_str_value(name, value));
    }

    pub fn remove_attribute(&mut self, name: &str) {
        self.attributes
            .retain(|a| !a.name.eq_ignore_ascii_case(name));
    }

    /// Minimal modification list turning `self` into `target`, restricted to
    /// the given attribute types. Attributes outside the set are untouched.
    pub fn diff(&self, target: &Entry, attribute_types: &[String]) -> Vec<Modification> {
        let mut modifications = Vec::new();
        for attr_type in attribute_types {
            let current = self.attribute(attr_type);
            let desired = target.attribute(attr_type);
            match (current, desired) {
                (None, None) => {}
                (Some(_), None) => {
                    modifications.push(Modification {
                        mod_type: ModificationType::Delete,
                        attribute: Attribute::new(attr_type.clone(), Vec::new()),
                    });
                }
                (None, Some(d)) => {
                    modifications.push(Modification {
                        mod_type: ModificationType::Add,
                        attribute: Attribute::new(attr_type.clone(), d.values.clone()),
                    });
                }
                (Some(c), Some(d)) => {
                    if !same_value_set(&c.values, &d.values) {
                        modifications.push(Modification {
                            mod_type: ModificationType::Replace,
                            attribute: Attribute::new(attr_type.clone(), d.values.clone()),
                        });
                    }
                }
            }
        }
        modifications
    }
}

fn same_value_set(a: &[Vec<u8>], b: &[Vec<u8>]) -> bool {
    a.len() == b.len() && a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModificationType {
    Add,
    Delete,
    Replace,
}

/// A single LDAP modify operation component.
#[derive(Debug, Clone, PartialEq)]
pub struct Modification {
    pub mod_type: ModificationType,
    pub attribute: Attribute,
}

/// Search scope below the base DN.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Subtree,
    OneLevel,
}

impl SearchScope {
    pub fn parse(s: &str) -> Option<SearchScope> {
        match s.to_lowercase().as_str() {
            "sub" | "subtree" => Some(SearchScope::Subtree),
            "one" | "onelevel" => Some(SearchScope::OneLevel),
            _ => None,
        }
    }
}

/// Server-side sort request key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub attribute: String,
    pub reverse: bool,
}
