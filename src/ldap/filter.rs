//! LDAP search filter model with RFC 4515 string rendering, a parser for
//! configuration filter strings, and in-memory entry matching.

use std::fmt;

use crate::error::{ScimError, ScimResult};
use crate::ldap::entry::Entry;

#[derive(Debug, Clone, PartialEq)]
pub enum LdapFilter {
    And(Vec<LdapFilter>),
    Or(Vec<LdapFilter>),
    Not(Box<LdapFilter>),
    Equality(String, String),
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        final_: Option<String>,
    },
    Presence(String),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
}

impl LdapFilter {
    pub fn equality(attribute: impl Into<String>, value: impl Into<String>) -> LdapFilter {
        LdapFilter::Equality(attribute.into(), value.into())
    }

    pub fn presence(attribute: impl Into<String>) -> LdapFilter {
        LdapFilter::Presence(attribute.into())
    }

    /// `(attr=*value*)`
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> LdapFilter {
        LdapFilter::Substring {
            attribute: attribute.into(),
            initial: None,
            any: vec![value.into()],
            final_: None,
        }
    }

    /// `(attr=value*)`
    pub fn starts_with(attribute: impl Into<String>, value: impl Into<String>) -> LdapFilter {
        LdapFilter::Substring {
            attribute: attribute.into(),
            initial: Some(value.into()),
            any: Vec::new(),
            final_: None,
        }
    }

    /// AND of the given components, collapsing the single-component case.
    pub fn and(mut components: Vec<LdapFilter>) -> LdapFilter {
        if components.len() == 1 {
            components.remove(0)
        } else {
            LdapFilter::And(components)
        }
    }

    pub fn or(mut components: Vec<LdapFilter>) -> LdapFilter {
        if components.len() == 1 {
            components.remove(0)
        } else {
            LdapFilter::Or(components)
        }
    }

    /// Parse an RFC 4515 filter string, as found in mapping configuration.
    pub fn parse(input: &str) -> ScimResult<LdapFilter> {
        let mut parser = FilterParser {
            chars: input.trim().chars().collect(),
            pos: 0,
        };
        let filter = parser.parse_filter()?;
        if parser.pos != parser.chars.len() {
            return Err(ScimError::Configuration(format!(
                "Trailing characters in LDAP filter: {}",
                input
            )));
        }
        Ok(filter)
    }

    /// Evaluate the filter against an in-memory entry.
    ///
    /// Comparisons use case-insensitive string matching, which is the
    /// behavior of the directory's caseIgnoreMatch rule and is what the
    /// search-filter guard needs (objectClass values in particular).
    pub fn matches_entry(&self, entry: &Entry) -> bool {
        match self {
            LdapFilter::And(components) => components.iter().all(|f| f.matches_entry(entry)),
            LdapFilter::Or(components) => components.iter().any(|f| f.matches_entry(entry)),
            LdapFilter::Not(inner) => !inner.matches_entry(entry),
            LdapFilter::Equality(attr, value) => entry
                .attribute(attr)
                .map(|a| {
                    a.value_strings()
                        .iter()
                        .any(|v| v.eq_ignore_ascii_case(value))
                })
                .unwrap_or(false),
            LdapFilter::Substring {
                attribute,
                initial,
                any,
                final_,
            } => entry
                .attribute(attribute)
                .map(|a| {
                    a.value_strings()
                        .iter()
                        .any(|v| substring_matches(v, initial, any, final_))
                })
                .unwrap_or(false),
            LdapFilter::Presence(attr) => entry
                .attribute(attr)
                .map(|a| !a.values.is_empty())
                .unwrap_or(false),
            LdapFilter::GreaterOrEqual(attr, value) => entry
                .attribute(attr)
                .map(|a| {
                    a.value_strings()
                        .iter()
                        .any(|v| v.to_lowercase() >= value.to_lowercase())
                })
                .unwrap_or(false),
            LdapFilter::LessOrEqual(attr, value) => entry
                .attribute(attr)
                .map(|a| {
                    a.value_strings()
                        .iter()
                        .any(|v| v.to_lowercase() <= value.to_lowercase())
                })
                .unwrap_or(false),
        }
    }
}

fn substring_matches(
    value: &str,
    initial: &Option<String>,
    any: &[String],
    final_: &Option<String>,
) -> bool {
    let haystack = value.to_lowercase();
    let mut position = 0usize;

    if let Some(prefix) = initial {
        let prefix = prefix.to_lowercase();
        if !haystack.starts_with(&prefix) {
            return false;
        }
        position = prefix.len();
    }

    for component in any {
        let needle = component.to_lowercase();
        match haystack[position..].find(&needle) {
            Some(offset) => position += offset + needle.len(),
            None => return false,
        }
    }

    if let Some(suffix) = final_ {
        let suffix = suffix.to_lowercase();
        if haystack.len() < position + suffix.len() {
            return false;
        }
        return haystack.ends_with(&suffix);
    }

    true
}

/// Escape a filter assertion value per RFC 4515.
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'*' => escaped.push_str("\\2a"),
            b'(' => escaped.push_str("\\28"),
            b')' => escaped.push_str("\\29"),
            b'\\' => escaped.push_str("\\5c"),
            0 => escaped.push_str("\\00"),
            _ => escaped.push(byte as char),
        }
    }
    escaped
}

impl fmt::Display for LdapFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LdapFilter::And(components) => {
                write!(f, "(&")?;
                for component in components {
                    write!(f, "{}", component)?;
                }
                write!(f, ")")
            }
            LdapFilter::Or(components) => {
                write!(f, "(|")?;
                for component in components {
                    write!(f, "{}", component)?;
                }
                write!(f, ")")
            }
            LdapFilter::Not(inner) => write!(f, "(!{})", inner),
            LdapFilter::Equality(attr, value) => {
                write!(f, "({}={})", attr, escape_filter_value(value))
            }
            LdapFilter::Substring {
                attribute,
                initial,
                any,
                final_,
            } => {
                write!(f, "({}=", attribute)?;
                if let Some(prefix) = initial {
                    write!(f, "{}", escape_filter_value(prefix))?;
                }
                for component in any {
                    write!(f, "*{}", escape_filter_value(component))?;
                }
                write!(f, "*")?;
                if let Some(suffix) = final_ {
                    write!(f, "{}", escape_filter_value(suffix))?;
                }
                write!(f, ")")
            }
            LdapFilter::Presence(attr) => write!(f, "({}=*)", attr),
            LdapFilter::GreaterOrEqual(attr, value) => {
                write!(f, "({}>={})", attr, escape_filter_value(value))
            }
            LdapFilter::LessOrEqual(attr, value) => {
                write!(f, "({}<={})", attr, escape_filter_value(value))
            }
        }
    }
}

struct FilterParser {
    chars: Vec<char>,
    pos: usize,
}

impl FilterParser {
    fn parse_filter(&mut self) -> ScimResult<LdapFilter> {
        self.expect('(')?;
        let filter = match self.peek() {
            Some('&') => {
                self.pos += 1;
                LdapFilter::And(self.parse_components()?)
            }
            Some('|') => {
                self.pos += 1;
                LdapFilter::Or(self.parse_components()?)
            }
            Some('!') => {
                self.pos += 1;
                LdapFilter::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_comparison()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(')')?;
        Ok(filter)
    }

    fn parse_components(&mut self) -> ScimResult<Vec<LdapFilter>> {
        let mut components = Vec::new();
        while self.peek() == Some('(') {
            components.push(self.parse_filter()?);
        }
        if components.is_empty() {
            return Err(self.error("empty AND/OR component list"));
        }
        Ok(components)
    }

    fn parse_comparison(&mut self) -> ScimResult<LdapFilter> {
        let mut attribute = String::new();
        while let Some(c) = self.peek() {
            if c == '=' || c == '>' || c == '<' || c == ')' {
                break;
            }
            attribute.push(c);
            self.pos += 1;
        }
        if attribute.is_empty() {
            return Err(self.error("missing attribute type"));
        }

        let op = self.peek().ok_or_else(|| self.error("truncated filter"))?;
        let filter = match op {
            '>' | '<' => {
                self.pos += 1;
                self.expect('=')?;
                let value = self.parse_value()?;
                if op == '>' {
                    LdapFilter::GreaterOrEqual(attribute, value)
                } else {
                    LdapFilter::LessOrEqual(attribute, value)
                }
            }
            '=' => {
                self.pos += 1;
                let raw = self.parse_raw_value()?;
                if raw == "*" {
                    LdapFilter::Presence(attribute)
                } else if raw.contains('*') {
                    let mut parts = raw.split('*');
                    let initial = parts.next().filter(|s| !s.is_empty()).map(unescape);
                    let mut middle: Vec<String> = parts.map(|s| s.to_string()).collect();
                    let final_ = middle.pop().filter(|s| !s.is_empty()).map(|s| unescape(&s));
                    let any = middle
                        .into_iter()
                        .filter(|s| !s.is_empty())
                        .map(|s| unescape(&s))
                        .collect();
                    LdapFilter::Substring {
                        attribute,
                        initial,
                        any,
                        final_,
                    }
                } else {
                    LdapFilter::Equality(attribute, unescape(&raw))
                }
            }
            _ => return Err(self.error("expected comparison operator")),
        };
        Ok(filter)
    }

    fn parse_value(&mut self) -> ScimResult<String> {
        Ok(unescape(&self.parse_raw_value()?))
    }

    fn parse_raw_value(&mut self) -> ScimResult<String> {
        let mut value = String::new();
        while let Some(c) = self.peek() {
            if c == ')' {
                break;
            }
            value.push(c);
            self.pos += 1;
        }
        Ok(value)
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn expect(&mut self, expected: char) -> ScimResult<()> {
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn error(&self, message: &str) -> ScimError {
        ScimError::Configuration(format!(
            "Invalid LDAP filter at offset {}: {}",
            self.pos, message
        ))
    }
}

fn unescape(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 <= bytes.len() {
            if let Ok(byte) = u8::from_str_radix(&value[i + 1..i + 3], 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
