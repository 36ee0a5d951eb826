//! Directory client seam.
//!
//! The transport-level LDAP connection lives outside the core. The core
//! only depends on this trait, which mirrors the handful of operations the
//! mapping engine needs.

use async_trait::async_trait;
use std::fmt;

use crate::context::RequestContext;
use crate::ldap::entry::{Entry, Modification, SearchScope, SortKey};
use crate::ldap::filter::LdapFilter;

/// Parameters for a directory search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: LdapFilter,
    pub attributes: Vec<String>,
    pub sort: Option<SortKey>,
}

/// Failure raised by a directory client.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryError {
    /// An LDAP result code and diagnostic message from the directory.
    Directory { result_code: u32, message: String },
    /// The connection could not be established or was lost.
    ConnectionFailure(String),
    /// The in-flight operation was aborted through the request context.
    Cancelled,
}

impl DirectoryError {
    pub fn directory(result_code: u32, message: impl Into<String>) -> Self {
        DirectoryError::Directory {
            result_code,
            message: message.into(),
        }
    }
}

impl fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DirectoryError::Directory {
                result_code,
                message,
            } => write!(f, "directory error (result code {}): {}", result_code, message),
            DirectoryError::ConnectionFailure(message) => {
                write!(f, "directory connection failure: {}", message)
            }
            DirectoryError::Cancelled => write!(f, "directory operation cancelled"),
        }
    }
}

impl std::error::Error for DirectoryError {}

/// Backend directory operations consumed by the mapping core.
///
/// Implementations are expected to honor the request context's cancellation
/// token by aborting the in-flight operation and returning
/// [`DirectoryError::Cancelled`].
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    async fn search(
        &self,
        request: &SearchRequest,
        ctx: &RequestContext,
    ) -> Result<Vec<Entry>, DirectoryError>;

    async fn read(
        &self,
        dn: &str,
        attributes: &[String],
        ctx: &RequestContext,
    ) -> Result<Option<Entry>, DirectoryError>;

    async fn add(&self, entry: &Entry, ctx: &RequestContext) -> Result<(), DirectoryError>;

    async fn modify(
        &self,
        dn: &str,
        modifications: &[Modification],
        ctx: &RequestContext,
    ) -> Result<(), DirectoryError>;

    async fn delete(&self, dn: &str, ctx: &RequestContext) -> Result<(), DirectoryError>;

    /// Whether secondary lookups may be issued against this client while a
    /// primary operation's results are still being processed.
    fn supports_concurrent_use(&self) -> bool {
        false
    }
}
