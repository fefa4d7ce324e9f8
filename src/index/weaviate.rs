//! Weaviate REST/GraphQL client
//!
//! One class per document kind. Objects carry the relational id in a
//! dedicated property and are addressed by a UUIDv5 derived from it, so
//! re-syncing a document overwrites the previous object.

use super::{IndexDocument, IndexError, IndexHit, ScopeFilters, VectorStore};
use crate::store::DocumentKind;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

pub const PRD_CLASS: &str = "PRDDocument";
pub const TEST_CASE_CLASS: &str = "TestCase";

/// Filterable properties per class, in schema order
const PRD_PROPERTIES: &[(&str, &str, bool)] = &[
    ("prd_id", "text", false),
    ("project_id", "text", false),
    ("app_version_id", "text", false),
    ("module_id", "text", false),
    ("title", "text", true),
    ("content", "text", true),
    ("status", "text", false),
    ("created_at", "date", false),
];

const TEST_CASE_PROPERTIES: &[(&str, &str, bool)] = &[
    ("test_case_id", "text", false),
    ("project_id", "text", false),
    ("app_version_id", "text", false),
    ("module_id", "text", false),
    ("prd_id", "text", false),
    ("title", "text", true),
    ("priority", "text", false),
    ("type", "text", false),
    ("status", "text", false),
    ("created_at", "date", false),
];

fn class_name(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Prd => PRD_CLASS,
        DocumentKind::TestCase => TEST_CASE_CLASS,
    }
}

fn id_property(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Prd => "prd_id",
        DocumentKind::TestCase => "test_case_id",
    }
}

/// Stable object id for a relational document id
pub fn object_id(kind: DocumentKind, id: &str) -> Uuid {
    let name = format!("{}:{}", class_name(kind), id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
}

/// `VectorStore` backed by a Weaviate instance
pub struct WeaviateClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WeaviateClient {
    /// Create a client for a Weaviate instance
    ///
    /// # Arguments
    /// * `base_url` - Instance root, e.g. `http://localhost:8080` (trailing `/` is trimmed)
    /// * `api_key` - Bearer token, or `None` for anonymous access
    /// * `timeout` - Per-request timeout
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, IndexError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IndexError::Request(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, IndexError> {
        builder
            .send()
            .await
            .map_err(|e| IndexError::Request(e.to_string()))
    }

    async fn graphql(&self, query: String) -> Result<Value, IndexError> {
        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/graphql")
                    .json(&json!({ "query": query })),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Request(format!(
                "GraphQL returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IndexError::InvalidResponse(e.to_string()))?;

        if let Some(message) = body
            .get("errors")
            .and_then(Value::as_array)
            .and_then(|errors| errors.first())
            .and_then(|error| error.get("message"))
            .and_then(Value::as_str)
        {
            return Err(IndexError::Request(format!("GraphQL error: {}", message)));
        }

        Ok(body)
    }

    async fn ensure_class(
        &self,
        class: &str,
        properties: &[(&str, &str, bool)],
    ) -> Result<(), IndexError> {
        let response = self
            .send(self.request(reqwest::Method::GET, &format!("/v1/schema/{}", class)))
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!("Weaviate class {} already exists", class);
                return Ok(());
            }
            StatusCode::NOT_FOUND => {}
            status => {
                return Err(IndexError::Schema(format!(
                    "checking class {} returned status {}",
                    class,
                    status.as_u16()
                )));
            }
        }

        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/schema")
                    .json(&class_definition(class, properties)),
            )
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Schema(format!(
                "creating class {} returned status {}: {}",
                class, status, body
            )));
        }

        tracing::info!("Created Weaviate class {}", class);
        Ok(())
    }
}

fn class_definition(class: &str, properties: &[(&str, &str, bool)]) -> Value {
    let properties: Vec<Value> = properties
        .iter()
        .map(|(name, data_type, searchable)| {
            let mut property = json!({
                "name": name,
                "dataType": [data_type],
                "indexFilterable": *name != "content",
                "indexSearchable": searchable,
            });
            if *searchable {
                property["tokenization"] = json!("word");
            }
            property
        })
        .collect();

    json!({
        "class": class,
        "vectorizer": "none",
        "vectorIndexConfig": { "distance": "cosine" },
        "invertedIndexConfig": { "bm25": { "k1": 1.2, "b": 0.75 } },
        "properties": properties,
    })
}

/// GraphQL string literal (JSON escaping is a valid subset)
fn gql_string(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

fn gql_vector(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| format!("{}", v)).collect();
    format!("[{}]", parts.join(","))
}

/// `where` argument for the given filters, or an empty string
fn gql_where(filters: &ScopeFilters) -> String {
    let operands: Vec<String> = filters
        .iter()
        .map(|(field, value)| {
            format!(
                "{{path: [{}], operator: Equal, valueText: {}}}",
                gql_string(field),
                gql_string(value)
            )
        })
        .collect();

    match operands.len() {
        0 => String::new(),
        1 => format!(", where: {}", operands[0]),
        _ => format!(", where: {{operator: And, operands: [{}]}}", operands.join(", ")),
    }
}

fn near_vector_query(
    kind: DocumentKind,
    vector: &[f32],
    limit: usize,
    certainty: f32,
    filters: &ScopeFilters,
) -> String {
    format!(
        concat!(
            "{{ Get {{ {class}(nearVector: {{vector: {vector}, certainty: {certainty}}}, ",
            "limit: {limit}{filter}) {{ {id} _additional {{ certainty }} }} }} }}",
        ),
        class = class_name(kind),
        vector = gql_vector(vector),
        certainty = certainty,
        limit = limit,
        filter = gql_where(filters),
        id = id_property(kind),
    )
}

fn hybrid_query(
    kind: DocumentKind,
    text: &str,
    vector: &[f32],
    limit: usize,
    alpha: f32,
    filters: &ScopeFilters,
) -> String {
    format!(
        concat!(
            "{{ Get {{ {class}(hybrid: {{query: {query}, vector: {vector}, alpha: {alpha}}}, ",
            "limit: {limit}{filter}) {{ {id} _additional {{ score }} }} }} }}",
        ),
        class = class_name(kind),
        query = gql_string(text),
        vector = gql_vector(vector),
        alpha = alpha,
        limit = limit,
        filter = gql_where(filters),
        id = id_property(kind),
    )
}

/// Score values arrive as numbers or numeric strings depending on the mode
fn parse_score(value: Option<&Value>) -> f32 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0) as f32,
        Some(Value::String(s)) => s.trim().parse::<f32>().unwrap_or_else(|_| {
            tracing::warn!("Unparseable Weaviate score {:?}", s);
            0.0
        }),
        _ => 0.0,
    }
}

fn parse_hits(body: &Value, kind: DocumentKind, score_field: &str) -> Vec<IndexHit> {
    let items = body
        .pointer(&format!("/data/Get/{}", class_name(kind)))
        .and_then(Value::as_array);

    let Some(items) = items else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| {
            let id = item.get(id_property(kind))?.as_str()?;
            if id.is_empty() {
                return None;
            }
            let score = parse_score(item.pointer(&format!("/_additional/{}", score_field)));
            Some(IndexHit::new(id, score))
        })
        .collect()
}

#[async_trait]
impl VectorStore for WeaviateClient {
    async fn search_by_vector(
        &self,
        kind: DocumentKind,
        vector: &[f32],
        limit: usize,
        threshold: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let body = self
            .graphql(near_vector_query(kind, vector, limit, threshold, filters))
            .await?;
        Ok(parse_hits(&body, kind, "certainty"))
    }

    async fn hybrid_search(
        &self,
        kind: DocumentKind,
        text: &str,
        vector: &[f32],
        limit: usize,
        alpha: f32,
        filters: &ScopeFilters,
    ) -> Result<Vec<IndexHit>, IndexError> {
        let body = self
            .graphql(hybrid_query(kind, text, vector, limit, alpha, filters))
            .await?;
        Ok(parse_hits(&body, kind, "score"))
    }

    async fn upsert(&self, document: &IndexDocument, vector: &[f32]) -> Result<(), IndexError> {
        let mut properties = serde_json::Map::new();
        properties.insert(
            id_property(document.kind).to_string(),
            Value::String(document.id.clone()),
        );
        for (field, value) in &document.fields {
            properties.insert(field.clone(), Value::String(value.clone()));
        }
        if document.kind == DocumentKind::Prd {
            properties.insert("content".to_string(), Value::String(document.body.clone()));
        }

        let object = json!({
            "class": class_name(document.kind),
            "id": object_id(document.kind, &document.id).to_string(),
            "properties": properties,
            "vector": vector,
        });

        let response = self
            .send(
                self.request(reqwest::Method::POST, "/v1/batch/objects")
                    .json(&json!({ "objects": [object] })),
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IndexError::Request(format!(
                "batch upsert returned status {}: {}",
                status.as_u16(),
                body
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| IndexError::InvalidResponse(e.to_string()))?;

        let error = body
            .as_array()
            .and_then(|objects| objects.first())
            .and_then(|object| object.pointer("/result/errors/error/0/message"))
            .and_then(Value::as_str);
        if let Some(message) = error {
            return Err(IndexError::Request(format!(
                "upsert of {} {} rejected: {}",
                document.kind, document.id, message
            )));
        }

        Ok(())
    }

    async fn delete(&self, kind: DocumentKind, id: &str) -> Result<(), IndexError> {
        let path = format!("/v1/objects/{}/{}", class_name(kind), object_id(kind, id));
        let response = self
            .send(self.request(reqwest::Method::DELETE, &path))
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(IndexError::Request(format!(
                "delete of {} {} returned status {}",
                kind,
                id,
                status.as_u16()
            ))),
        }
    }

    async fn ensure_schema(&self) -> Result<(), IndexError> {
        self.ensure_class(PRD_CLASS, PRD_PROPERTIES).await?;
        self.ensure_class(TEST_CASE_CLASS, TEST_CASE_PROPERTIES)
            .await
    }
}
