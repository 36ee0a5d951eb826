//! A SCIM resource mapping engine over an LDAP directory backend.
//!
//! The crate translates SCIM resources, filters, sorting and paging into
//! LDAP operations according to a declarative mapping configuration, and
//! serializes resources to JSON or XML wire forms. The HTTP transport and
//! the LDAP connection live outside; they meet this crate at the
//! [`service::ResourceService`] and [`ldap::DirectoryClient`] traits.

pub mod config;
pub mod context;
pub mod error;
pub mod ldap;
pub mod mapper;
pub mod marshal;
pub mod model;
pub mod parser;
pub mod schema;
pub mod service;
pub mod transform;

pub use context::{Clock, RequestContext, SystemClock};
pub use error::{ScimError, ScimResult};
pub use model::{ListResponse, PageParameters, QueryAttributes, ScimObject, SortParameters};
pub use service::{LdapResourceService, ResourceService};
