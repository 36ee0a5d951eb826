pub mod client;
pub mod entry;
pub mod filter;

pub use client::{DirectoryClient, DirectoryError, SearchRequest};
pub use entry::{Attribute, Entry, Modification, ModificationType, SearchScope, SortKey};
pub use filter::LdapFilter;
