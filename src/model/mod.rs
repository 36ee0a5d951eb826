pub mod attribute;
pub mod object;
pub mod query;
pub mod value;

pub use attribute::{ScimAttribute, ScimAttributeValue};
pub use object::ScimObject;
pub use query::{AttributePath, ListResponse, PageParameters, QueryAttributes, SortParameters};
pub use value::SimpleValue;
