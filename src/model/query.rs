//! Query-side parameter types: attribute selection, sorting and paging.

use crate::model::object::ScimObject;
use crate::schema::descriptor::AttributeDescriptor;

/// A parsed attribute path: `[schema ":"] name ["." subName]`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePath {
    pub schema: Option<String>,
    pub name: String,
    pub sub_attribute: Option<String>,
}

impl AttributePath {
    /// Parse a path. The schema URN, when present, runs up to the last
    /// colon; the attribute name never contains one.
    pub fn parse(path: &str) -> AttributePath {
        let trimmed = path.trim();
        let (schema, rest) = match trimmed.rfind(':') {
            Some(position) => (
                Some(trimmed[..position].to_string()),
                &trimmed[position + 1..],
            ),
            None => (None, trimmed),
        };
        let (name, sub_attribute) = match rest.find('.') {
            Some(position) => (
                rest[..position].to_string(),
                Some(rest[position + 1..].to_string()),
            ),
            None => (rest.to_string(), None),
        };
        AttributePath {
            schema,
            name,
            sub_attribute,
        }
    }

    /// The schema to resolve against, defaulting when the path has none.
    pub fn schema_or<'a>(&'a self, default_schema: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(default_schema)
    }
}

/// The set of attributes a request asked for. Empty means "all".
#[derive(Debug, Clone, Default)]
pub struct QueryAttributes {
    paths: Vec<AttributePath>,
    default_schema: String,
}

impl QueryAttributes {
    /// All attributes.
    pub fn all() -> QueryAttributes {
        QueryAttributes::default()
    }

    /// Parse a comma-separated `attributes` parameter. Paths without a
    /// schema prefix resolve against `default_schema`.
    pub fn parse(attributes: Option<&str>, default_schema: &str) -> QueryAttributes {
        let paths = attributes
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(AttributePath::parse)
                    .collect()
            })
            .unwrap_or_default();
        QueryAttributes {
            paths,
            default_schema: default_schema.to_string(),
        }
    }

    pub fn is_all(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether the descriptor's attribute was requested. The core `id`
    /// attribute is always returned regardless of the selection.
    pub fn is_attribute_requested(&self, descriptor: &AttributeDescriptor) -> bool {
        if self.paths.is_empty() || descriptor.name().eq_ignore_ascii_case("id") {
            return true;
        }
        self.paths.iter().any(|path| {
            path.schema_or(&self.default_schema)
                .eq_ignore_ascii_case(descriptor.schema())
                && path.name.eq_ignore_ascii_case(descriptor.name())
        })
    }

    /// Whether a specific sub-attribute was requested. A path naming just
    /// the parent selects all of its sub-attributes.
    pub fn is_sub_attribute_requested(
        &self,
        descriptor: &AttributeDescriptor,
        sub_name: &str,
    ) -> bool {
        if self.paths.is_empty() {
            return true;
        }
        self.paths.iter().any(|path| {
            path.schema_or(&self.default_schema)
                .eq_ignore_ascii_case(descriptor.schema())
                && path.name.eq_ignore_ascii_case(descriptor.name())
                && path
                    .sub_attribute
                    .as_deref()
                    .map(|s| s.eq_ignore_ascii_case(sub_name))
                    .unwrap_or(true)
        })
    }
}

/// Sort specification: a path and a direction.
#[derive(Debug, Clone, PartialEq)]
pub struct SortParameters {
    pub path: AttributePath,
    pub ascending: bool,
}

impl SortParameters {
    /// Parse SCIM `sortBy` and `sortOrder` parameters. Anything other than
    /// `descending` sorts ascending.
    pub fn from_params(sort_by: Option<&str>, sort_order: Option<&str>) -> Option<SortParameters> {
        sort_by.map(|path| SortParameters {
            path: AttributePath::parse(path),
            ascending: !matches!(
                sort_order.map(str::to_lowercase).as_deref(),
                Some("descending") | Some("desc")
            ),
        })
    }
}

/// Paging window: 1-based start index and a non-negative count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageParameters {
    pub start_index: usize,
    pub count: Option<usize>,
}

impl PageParameters {
    pub fn new(start_index: usize, count: Option<usize>) -> PageParameters {
        PageParameters {
            start_index: start_index.max(1),
            count,
        }
    }
}

impl Default for PageParameters {
    fn default() -> Self {
        PageParameters {
            start_index: 1,
            count: None,
        }
    }
}

/// The result envelope of a query operation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListResponse {
    pub total_results: usize,
    pub start_index: usize,
    pub resources: Vec<ScimObject>,
}
