use crate::model::query::AttributePath;

/// SCIM filter leaf operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    Contains,
    StartsWith,
    Present,
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<FilterOp> {
        match s.to_lowercase().as_str() {
            "eq" => Some(FilterOp::Equal),
            "co" => Some(FilterOp::Contains),
            "sw" => Some(FilterOp::StartsWith),
            "pr" => Some(FilterOp::Present),
            "gt" => Some(FilterOp::GreaterThan),
            "ge" => Some(FilterOp::GreaterOrEqual),
            "lt" => Some(FilterOp::LessThan),
            "le" => Some(FilterOp::LessOrEqual),
            _ => None,
        }
    }

    pub fn takes_value(&self) -> bool {
        !matches!(self, FilterOp::Present)
    }
}

/// A parsed SCIM filter expression.
///
/// Leaf values are kept as raw literals; they are typed against the target
/// attribute's descriptor at evaluation or translation time.
#[derive(Debug, Clone, PartialEq)]
pub enum ScimFilter {
    And(Vec<ScimFilter>),
    Or(Vec<ScimFilter>),
    Compare {
        path: AttributePath,
        op: FilterOp,
        value: Option<String>,
    },
}

impl ScimFilter {
    pub fn compare(path: AttributePath, op: FilterOp, value: Option<String>) -> ScimFilter {
        ScimFilter::Compare { path, op, value }
    }

    /// Whether the tree contains a strict GT/LT comparison. The LDAP
    /// translation widens those to GE/LE, so matching entries must be
    /// re-checked in memory.
    pub fn contains_strict_inequality(&self) -> bool {
        match self {
            ScimFilter::And(children) | ScimFilter::Or(children) => children
                .iter()
                .any(ScimFilter::contains_strict_inequality),
            ScimFilter::Compare { op, .. } => {
                matches!(op, FilterOp::GreaterThan | FilterOp::LessThan)
            }
        }
    }
}
