pub mod descriptor;
pub mod registry;

pub use descriptor::{AttributeDescriptor, DataType};
pub use registry::{ResourceDescriptor, SchemaRegistry};

/// Core SCIM 1.0 schema URN.
pub const SCHEMA_URN_CORE: &str = "urn:scim:schemas:core:1.0";
