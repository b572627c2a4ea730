//! Elasticsearch implementation of [`SearchEngine`].
//!
//! One client is built per cluster URL and reused across requests.

use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::indices::IndicesGetFieldMappingParts;
use elasticsearch::{Elasticsearch, OpenPointInTimeParts, ScrollParts, SearchParts};
use parking_lot::RwLock;
use serde_json::{Value, json};
use tracing::debug;

use super::{EngineFailure, SearchEngine, SearchRequest, keep_alive_param};
use crate::tenant::{ClusterAuth, ClusterSettings};

/// Elasticsearch-backed search engine.
pub struct ElasticsearchEngine {
    clients: RwLock<HashMap<String, Elasticsearch>>,
    max_response_bytes: usize,
}

impl Debug for ElasticsearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchEngine")
            .field("clusters", &self.clients.read().len())
            .field("max_response_bytes", &self.max_response_bytes)
            .finish()
    }
}

impl ElasticsearchEngine {
    /// Creates an engine rejecting responses over `max_response_size_mb`.
    pub fn new(max_response_size_mb: u64) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            max_response_bytes: (max_response_size_mb as usize).saturating_mul(1024 * 1024),
        }
    }

    fn client(&self, cluster: &ClusterSettings) -> Result<Elasticsearch, EngineFailure> {
        let url = cluster.url();
        if let Some(client) = self.clients.read().get(&url) {
            return Ok(client.clone());
        }

        let client = build_client(cluster)?;
        self.clients.write().insert(url, client.clone());
        Ok(client)
    }

    /// Reads a response body, enforcing status and size limits.
    ///
    /// A declared `Content-Length` over the limit is rejected before the body
    /// is buffered.
    async fn read_json(&self, response: Response) -> Result<Value, EngineFailure> {
        let status = response.status_code();
        if status.is_success()
            && let Some(declared) = response.content_length()
        {
            check_size(declared, self.max_response_bytes)?;
        }

        let text = response.text().await.map_err(transport_failure)?;
        if !status.is_success() {
            return Err(EngineFailure::from_text(status.as_u16(), &text));
        }
        check_size(text.len() as u64, self.max_response_bytes)?;

        serde_json::from_str(&text)
            .map_err(|e| EngineFailure::transport(format!("Failed to parse response: {}", e)))
    }
}

fn check_size(len: u64, max_bytes: usize) -> Result<(), EngineFailure> {
    if len > max_bytes as u64 {
        return Err(EngineFailure::response_too_large(format!(
            "entity content is too long [{}] for the configured buffer limit [{}]",
            len, max_bytes
        )));
    }
    Ok(())
}

/// Builds a client from cluster settings.
fn build_client(cluster: &ClusterSettings) -> Result<Elasticsearch, EngineFailure> {
    let parsed_url: elasticsearch::http::Url = cluster
        .url()
        .parse()
        .map_err(|e| EngineFailure::transport(format!("Invalid URL: {}", e)))?;

    let conn_pool = SingleNodeConnectionPool::new(parsed_url);

    let mut builder = TransportBuilder::new(conn_pool)
        .timeout(Duration::from_millis(cluster.request_timeout_ms));

    if cluster.disable_certificate_validation {
        builder = builder.cert_validation(CertificateValidation::None);
    }

    if let Some(ref auth) = cluster.auth {
        builder = match auth {
            ClusterAuth::Basic { username, password } => {
                builder.auth(Credentials::Basic(username.clone(), password.clone()))
            }
            ClusterAuth::Bearer { token } => builder.auth(Credentials::Bearer(token.clone())),
        };
    }

    let transport = builder
        .build()
        .map_err(|e| EngineFailure::transport(format!("Failed to build transport: {}", e)))?;

    Ok(Elasticsearch::new(transport))
}

fn transport_failure(err: elasticsearch::Error) -> EngineFailure {
    if err.is_timeout() {
        EngineFailure::timeout(err.to_string())
    } else {
        EngineFailure::transport(err.to_string())
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchEngine {
    async fn search(
        &self,
        cluster: &ClusterSettings,
        request: SearchRequest,
    ) -> Result<Value, EngineFailure> {
        let client = self.client(cluster)?;
        let keep_alive = request.scroll.map(keep_alive_param);

        let indices: Vec<&str> = request.index.as_deref().into_iter().collect();
        let parts = if indices.is_empty() {
            SearchParts::None
        } else {
            SearchParts::Index(&indices)
        };

        let mut call = client.search(parts).body(request.body);
        if let Some(keep_alive) = keep_alive.as_deref() {
            call = call.scroll(keep_alive);
        }

        debug!(index = ?request.index, scroll = ?keep_alive, "Sending search request");
        let response = call.send().await.map_err(transport_failure)?;
        self.read_json(response).await
    }

    async fn scroll(
        &self,
        cluster: &ClusterSettings,
        scroll_id: &str,
        keep_alive: Duration,
    ) -> Result<Value, EngineFailure> {
        let client = self.client(cluster)?;
        let response = client
            .scroll(ScrollParts::None)
            .body(json!({
                "scroll": keep_alive_param(keep_alive),
                "scroll_id": scroll_id,
            }))
            .send()
            .await
            .map_err(transport_failure)?;
        self.read_json(response).await
    }

    async fn open_point_in_time(
        &self,
        cluster: &ClusterSettings,
        index: &str,
        keep_alive: Duration,
    ) -> Result<String, EngineFailure> {
        let client = self.client(cluster)?;
        let keep_alive = keep_alive_param(keep_alive);
        let response = client
            .open_point_in_time(OpenPointInTimeParts::Index(&[index]))
            .keep_alive(&keep_alive)
            .ignore_unavailable(true)
            .send()
            .await
            .map_err(transport_failure)?;

        let body = self.read_json(response).await?;
        body["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| EngineFailure::transport("Point-in-time response carries no id"))
    }

    async fn close_point_in_time(
        &self,
        cluster: &ClusterSettings,
        pit_id: &str,
    ) -> Result<(), EngineFailure> {
        let client = self.client(cluster)?;
        let response = client
            .close_point_in_time()
            .body(json!({ "id": pit_id }))
            .send()
            .await
            .map_err(transport_failure)?;
        self.read_json(response).await.map(|_| ())
    }

    async fn field_types(
        &self,
        cluster: &ClusterSettings,
        index: &str,
        field: &str,
    ) -> Result<HashSet<String>, EngineFailure> {
        let client = self.client(cluster)?;
        let response = client
            .indices()
            .get_field_mapping(IndicesGetFieldMappingParts::IndexFields(&[index], &[field]))
            .send()
            .await
            .map_err(transport_failure)?;

        let body = self.read_json(response).await?;
        Ok(mapped_types(&body, field))
    }
}

/// Collects `type` values of `field` from a field-mapping response.
///
/// The response is keyed `index -> mappings -> field -> mapping -> leaf`.
fn mapped_types(body: &Value, field: &str) -> HashSet<String> {
    body.as_object()
        .into_iter()
        .flat_map(|indices| indices.values())
        .filter_map(|index| index["mappings"][field]["mapping"].as_object())
        .flat_map(|mapping| mapping.values())
        .filter_map(|leaf| leaf["type"].as_str().map(str::to_string))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::FailureKind;

    #[test]
    fn test_mapped_types() {
        let body = json!({
            "well-1": { "mappings": { "data.Location": { "full_name": "data.Location",
                "mapping": { "Location": { "type": "geo_shape" } } } } },
            "well-2": { "mappings": { "data.Location": { "full_name": "data.Location",
                "mapping": { "Location": { "type": "geo_point" } } } } },
            "well-3": { "mappings": {} }
        });
        let types = mapped_types(&body, "data.Location");
        assert_eq!(types.len(), 2);
        assert!(types.contains("geo_shape"));
        assert!(types.contains("geo_point"));
    }

    #[test]
    fn test_size_limit() {
        let max = 1024 * 1024;
        assert!(check_size(0, max).is_ok());
        assert!(check_size(max as u64, max).is_ok());

        let err = check_size(max as u64 + 1, max).unwrap_err();
        assert_eq!(err.kind, FailureKind::ResponseTooLarge);
        assert!(err.message.contains("[1048577]"));
        assert!(err.message.contains("[1048576]"));
    }

    #[test]
    fn test_client_is_cached_per_cluster() {
        let engine = ElasticsearchEngine::new(100);
        let cluster = ClusterSettings::new("localhost").with_https(false);
        engine.client(&cluster).unwrap();
        engine.client(&cluster).unwrap();
        assert_eq!(engine.clients.read().len(), 1);
    }
}
