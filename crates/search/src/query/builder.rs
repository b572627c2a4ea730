//! Boolean query composition and authorization filtering.
//!
//! The built query has this shape:
//!
//! ```json
//! { "bool": {
//!     "must":     [ <text clause>, <collaboration term> | <policy wrapper> ],
//!     "must_not": [ <collaboration exists> ],
//!     "filter":   [ <spatial clause>, <ACL terms> ] } }
//! ```
//!
//! Authorization is either an external compiled policy or an ACL terms
//! filter, never both.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Map, Value, json};

use crate::error::GatewayResult;
use crate::parser::build_text_query;
use crate::tenant::RequestContext;

/// Document field holding the viewer and owner groups.
pub const ACL_FIELD: &str = "x-acl";

/// Document field holding the owner groups.
pub const OWNERS_FIELD: &str = "acl.owners";

/// Document field tagging records that belong to a collaboration.
pub const COLLABORATION_FIELD: &str = "x-collaboration";

/// Supplies the compiled search policy when an external policy engine is used.
#[async_trait]
pub trait PolicyService: Send + Sync {
    /// Returns the compiled policy, an engine query in JSON text form.
    async fn compiled_policy(&self, ctx: &RequestContext) -> GatewayResult<String>;
}

/// Composes the bool query for a request.
#[derive(Clone, Default)]
pub struct QueryBuilder {
    collaboration_enabled: bool,
    policy: Option<Arc<dyn PolicyService>>,
}

impl std::fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("collaboration_enabled", &self.collaboration_enabled)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

impl QueryBuilder {
    /// Creates a builder applying ACL filtering only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables collaboration scoping.
    pub fn with_collaboration(mut self, enabled: bool) -> Self {
        self.collaboration_enabled = enabled;
        self
    }

    /// Replaces ACL filtering with an external policy.
    pub fn with_policy(mut self, policy: Arc<dyn PolicyService>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Builds the bool query.
    ///
    /// `spatial` is the already-compiled spatial clause, if any.
    pub async fn build(
        &self,
        text: Option<&str>,
        spatial: Option<Value>,
        ctx: &RequestContext,
        as_owner: bool,
    ) -> GatewayResult<Value> {
        let mut clauses = BoolClauses::default();

        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            clauses.must.push(build_text_query(text)?);
        }

        if let Some(spatial) = spatial {
            clauses.filter.push(spatial);
        }

        if self.collaboration_enabled {
            match ctx.collaboration() {
                Some(id) => clauses
                    .must
                    .push(json!({ "term": { COLLABORATION_FIELD: { "value": id } } })),
                None => clauses
                    .must_not
                    .push(json!({ "exists": { "field": COLLABORATION_FIELD } })),
            }
        }

        match &self.policy {
            Some(policy) => {
                let compiled = policy.compiled_policy(ctx).await?;
                clauses
                    .must
                    .push(json!({ "wrapper": { "query": BASE64.encode(compiled.as_bytes()) } }));
            }
            None => {
                if let Some(acl) = authorization_filter(ctx, as_owner) {
                    clauses.filter.push(acl);
                }
            }
        }

        Ok(clauses.into_query())
    }
}

/// Returns the ACL filter for the caller, or `None` for full-access callers.
///
/// A caller without full access and without groups gets a filter matching
/// no documents.
pub fn authorization_filter(ctx: &RequestContext, as_owner: bool) -> Option<Value> {
    if ctx.has_full_data_access() {
        return None;
    }
    let groups = ctx.data_groups();
    if groups.is_empty() {
        return Some(json!({ "match_none": {} }));
    }
    let field = if as_owner { OWNERS_FIELD } else { ACL_FIELD };
    Some(json!({ "terms": { field: groups } }))
}

#[derive(Default)]
struct BoolClauses {
    must: Vec<Value>,
    must_not: Vec<Value>,
    filter: Vec<Value>,
}

impl BoolClauses {
    fn into_query(self) -> Value {
        let mut bool_query = Map::new();
        for (occurrence, clauses) in [
            ("must", self.must),
            ("must_not", self.must_not),
            ("filter", self.filter),
        ] {
            if !clauses.is_empty() {
                bool_query.insert(occurrence.to_string(), Value::Array(clauses));
            }
        }
        json!({ "bool": bool_query })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPolicy(&'static str);

    #[async_trait]
    impl PolicyService for FixedPolicy {
        async fn compiled_policy(&self, _ctx: &RequestContext) -> GatewayResult<String> {
            Ok(self.0.to_string())
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("alice", "opendes")
            .unwrap()
            .with_data_groups(vec!["g1".into(), "g2".into()])
    }

    #[tokio::test]
    async fn test_text_and_acl() {
        let query = QueryBuilder::new()
            .build(Some("Name:x"), None, &ctx(), false)
            .await
            .unwrap();
        assert_eq!(
            query["bool"]["must"][0]["bool"]["must"][0]["query_string"]["query"],
            "Name:x"
        );
        assert_eq!(query["bool"]["filter"][0], json!({ "terms": { "x-acl": ["g1", "g2"] } }));
    }

    #[tokio::test]
    async fn test_empty_text_contributes_nothing() {
        let query = QueryBuilder::new()
            .build(Some("   "), None, &ctx().with_full_data_access(true), false)
            .await
            .unwrap();
        assert_eq!(query, json!({ "bool": {} }));
    }

    #[tokio::test]
    async fn test_owner_filter() {
        let query = QueryBuilder::new().build(None, None, &ctx(), true).await.unwrap();
        assert_eq!(query["bool"]["filter"][0]["terms"]["acl.owners"], json!(["g1", "g2"]));
    }

    #[test]
    fn test_no_groups_matches_nothing() {
        let ctx = RequestContext::new("bob", "opendes").unwrap();
        assert_eq!(authorization_filter(&ctx, false), Some(json!({ "match_none": {} })));
        assert_eq!(authorization_filter(&ctx.with_full_data_access(true), false), None);
    }

    #[tokio::test]
    async fn test_collaboration_scoping() {
        let builder = QueryBuilder::new().with_collaboration(true);

        let scoped = builder
            .build(None, None, &ctx().with_collaboration("c-1"), false)
            .await
            .unwrap();
        assert_eq!(
            scoped["bool"]["must"][0],
            json!({ "term": { "x-collaboration": { "value": "c-1" } } })
        );

        let unscoped = builder.build(None, None, &ctx(), false).await.unwrap();
        assert_eq!(
            unscoped["bool"]["must_not"][0],
            json!({ "exists": { "field": "x-collaboration" } })
        );
    }

    #[tokio::test]
    async fn test_policy_replaces_acl() {
        let builder = QueryBuilder::new().with_policy(Arc::new(FixedPolicy(r#"{"match_all":{}}"#)));
        let query = builder.build(None, None, &ctx(), false).await.unwrap();
        assert_eq!(
            query["bool"]["must"][0]["wrapper"]["query"],
            BASE64.encode(r#"{"match_all":{}}"#)
        );
        assert!(query["bool"].get("filter").is_none());
    }

    #[tokio::test]
    async fn test_spatial_goes_to_filter() {
        let spatial = json!({ "geo_distance": {} });
        let query = QueryBuilder::new()
            .build(None, Some(spatial.clone()), &ctx().with_full_data_access(true), false)
            .await
            .unwrap();
        assert_eq!(query["bool"]["filter"][0], spatial);
    }
}
