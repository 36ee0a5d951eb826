//! The exposed resource service: SCIM CRUD and query operations executed
//! against the directory through the configured resource mappers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GatewayConfig;
use crate::context::RequestContext;
use crate::error::{ScimError, ScimResult};
use crate::ldap::client::{DirectoryClient, SearchRequest};
use crate::ldap::entry::Entry;
use crate::ldap::filter::LdapFilter;
use crate::mapper::resource_mapper::ResourceMapper;
use crate::model::object::ScimObject;
use crate::model::query::{ListResponse, PageParameters, QueryAttributes, SortParameters};
use crate::parser::filter_evaluator::FilterEvaluator;
use crate::parser::filter_parser::parse_filter;

/// SCIM resource operations exposed to the transport.
#[async_trait]
pub trait ResourceService: Send + Sync {
    async fn create(
        &self,
        endpoint: &str,
        scim: ScimObject,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject>;

    async fn get(
        &self,
        endpoint: &str,
        id: &str,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject>;

    async fn query(
        &self,
        endpoint: &str,
        filter: Option<&str>,
        sort: Option<&SortParameters>,
        page: Option<&PageParameters>,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ListResponse>;

    async fn replace(
        &self,
        endpoint: &str,
        id: &str,
        scim: ScimObject,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject>;

    async fn delete(&self, endpoint: &str, id: &str, ctx: &RequestContext) -> ScimResult<()>;
}

/// `ResourceService` over a `DirectoryClient`, one mapper per endpoint.
pub struct LdapResourceService {
    config: GatewayConfig,
    client: Arc<dyn DirectoryClient>,
}

impl LdapResourceService {
    pub fn new(config: GatewayConfig, client: Arc<dyn DirectoryClient>) -> Self {
        Self { config, client }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    fn mapper(&self, endpoint: &str) -> ScimResult<&Arc<ResourceMapper>> {
        self.config
            .mapper(endpoint)
            .ok_or_else(|| ScimError::NotFound(format!("Unknown endpoint '{}'", endpoint)))
    }

    fn check_cancelled(&self, ctx: &RequestContext) -> ScimResult<()> {
        if ctx.is_cancelled() {
            return Err(ScimError::Cancelled);
        }
        Ok(())
    }

    /// Locate the single entry carrying the given resource id, visible
    /// under the resource's search filter.
    async fn resolve_entry(
        &self,
        mapper: &ResourceMapper,
        id: &str,
        attributes: Vec<String>,
        ctx: &RequestContext,
    ) -> ScimResult<Entry> {
        let request = SearchRequest {
            base_dn: mapper.search_base_dn().to_string(),
            scope: mapper.search_scope(),
            filter: LdapFilter::And(vec![
                LdapFilter::equality(mapper.id_attribute(), id),
                mapper.search_filter().clone(),
            ]),
            attributes,
            sort: None,
        };
        let mut entries = self.client.search(&request, ctx).await?;
        match entries.len() {
            0 => Err(ScimError::NotFound(format!(
                "{} '{}' does not exist",
                mapper.resource_name(),
                id
            ))),
            1 => Ok(entries.remove(0)),
            count => Err(ScimError::ServerError(format!(
                "{} entries share the id '{}'",
                count, id
            ))),
        }
    }

    async fn fetch(
        &self,
        mapper: &ResourceMapper,
        id: &str,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        let attributes = mapper.to_ldap_attribute_types(query_attrs);
        let entry = self.resolve_entry(mapper, id, attributes, ctx).await?;
        mapper
            .to_scim_object(&entry, query_attrs, self.client.as_ref(), ctx)
            .await?
            .ok_or_else(|| {
                ScimError::NotFound(format!(
                    "{} '{}' does not exist",
                    mapper.resource_name(),
                    id
                ))
            })
    }
}

#[async_trait]
impl ResourceService for LdapResourceService {
    async fn create(
        &self,
        endpoint: &str,
        scim: ScimObject,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        self.check_cancelled(ctx)?;
        let mapper = self.mapper(endpoint)?.clone();

        let entry = mapper.to_ldap_entry(&scim)?;
        tracing::debug!(endpoint, dn = %entry.dn, "creating directory entry");
        self.client.add(&entry, ctx).await?;

        let id = entry.first_value_str(mapper.id_attribute()).ok_or_else(|| {
            ScimError::ServerError(format!(
                "Created entry '{}' carries no '{}' value",
                entry.dn,
                mapper.id_attribute()
            ))
        })?;
        self.fetch(&mapper, &id, query_attrs, ctx).await
    }

    async fn get(
        &self,
        endpoint: &str,
        id: &str,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        self.check_cancelled(ctx)?;
        let mapper = self.mapper(endpoint)?.clone();
        self.fetch(&mapper, id, query_attrs, ctx).await
    }

    async fn query(
        &self,
        endpoint: &str,
        filter: Option<&str>,
        sort: Option<&SortParameters>,
        page: Option<&PageParameters>,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ListResponse> {
        self.check_cancelled(ctx)?;
        let mapper = self.mapper(endpoint)?.clone();

        let scim_filter = filter.map(parse_filter).transpose()?;
        let translated = mapper.to_ldap_filter(scim_filter.as_ref())?;
        let sort_key = sort.map(|s| mapper.to_sort_control(s)).transpose()?;

        // The translation widens GT/LT to GE/LE; a partial translation
        // widens further. Either way the original filter is re-applied in
        // memory, over objects carrying every attribute.
        let post_filter = scim_filter
            .as_ref()
            .filter(|f| !translated.fully_translated || f.contains_strict_inequality());
        let needs_post_filter = post_filter.is_some();
        let fetch_attrs = if needs_post_filter {
            QueryAttributes::all()
        } else {
            query_attrs.clone()
        };

        let request = SearchRequest {
            base_dn: mapper.search_base_dn().to_string(),
            scope: mapper.search_scope(),
            filter: translated.filter.clone(),
            attributes: mapper.to_ldap_attribute_types(&fetch_attrs),
            sort: sort_key,
        };
        tracing::debug!(
            endpoint,
            filter = %request.filter,
            fully_translated = translated.fully_translated,
            "searching directory"
        );
        let entries = self.client.search(&request, ctx).await?;

        let evaluator = FilterEvaluator::new(mapper.schema());
        let mut matched = Vec::new();
        for entry in &entries {
            let full = match mapper
                .to_scim_object(entry, &fetch_attrs, self.client.as_ref(), ctx)
                .await?
            {
                Some(object) => object,
                None => continue,
            };
            if let Some(post_filter) = post_filter {
                if !evaluator.evaluate(post_filter, &full)? {
                    continue;
                }
                // Rebuild with just the requested attributes.
                if !query_attrs.is_all() {
                    if let Some(trimmed) = mapper
                        .to_scim_object(entry, query_attrs, self.client.as_ref(), ctx)
                        .await?
                    {
                        matched.push(trimmed);
                        continue;
                    }
                }
            }
            matched.push(full);
        }

        let total_results = matched.len();
        let page = page.copied().unwrap_or_default();
        let count = page
            .count
            .unwrap_or(self.config.max_results)
            .min(self.config.max_results);
        let resources: Vec<ScimObject> = matched
            .into_iter()
            .skip(page.start_index.saturating_sub(1))
            .take(count)
            .collect();

        Ok(ListResponse {
            total_results,
            start_index: page.start_index,
            resources,
        })
    }

    async fn replace(
        &self,
        endpoint: &str,
        id: &str,
        scim: ScimObject,
        query_attrs: &QueryAttributes,
        ctx: &RequestContext,
    ) -> ScimResult<ScimObject> {
        self.check_cancelled(ctx)?;
        let mapper = self.mapper(endpoint)?.clone();

        let attributes = mapper.to_ldap_attribute_types(&QueryAttributes::all());
        let current = self.resolve_entry(&mapper, id, attributes, ctx).await?;

        let modifications = mapper.to_ldap_modifications(&current, &scim)?;
        if modifications.is_empty() {
            tracing::debug!(endpoint, id, "replace is a no-op");
        } else {
            tracing::debug!(
                endpoint,
                id,
                modifications = modifications.len(),
                "modifying directory entry"
            );
            self.client.modify(&current.dn, &modifications, ctx).await?;
        }
        self.fetch(&mapper, id, query_attrs, ctx).await
    }

    async fn delete(&self, endpoint: &str, id: &str, ctx: &RequestContext) -> ScimResult<()> {
        self.check_cancelled(ctx)?;
        let mapper = self.mapper(endpoint)?.clone();

        let id_only = QueryAttributes::parse(Some("id"), mapper.schema());
        let attributes = mapper.to_ldap_attribute_types(&id_only);
        let entry = self.resolve_entry(&mapper, id, attributes, ctx).await?;

        tracing::debug!(endpoint, id, dn = %entry.dn, "deleting directory entry");
        self.client.delete(&entry.dn, ctx).await?;
        Ok(())
    }
}
