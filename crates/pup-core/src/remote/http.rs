//! HTTP client for the hosted document API.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::Value;

use super::{BatchOp, BatchOpKind, BatchReceipt, RemoteError, RemoteResult, RemoteStore};
use crate::config::RemoteConfig;
use crate::models::{Collection, Record};
use crate::util::compact_text;

/// Client for the Puppy Planner document API.
#[derive(Debug, Clone)]
pub struct HttpRemoteStore {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpRemoteStore {
    /// Create a new client from a validated remote configuration.
    pub fn new(config: RemoteConfig) -> RemoteResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    fn collection_url(&self, collection: Collection) -> String {
        format!("{}/v1/{collection}", self.config.endpoint)
    }

    fn doc_url(&self, collection: Collection, doc_id: &str) -> String {
        format!("{}/v1/{collection}/{doc_id}", self.config.endpoint)
    }

    fn headers(&self) -> RemoteResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.config.auth_token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RemoteError::InvalidRequest("invalid auth token format".into()))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    fn request(&self, method: Method, url: &str) -> RemoteResult<reqwest::RequestBuilder> {
        Ok(self.client.request(method, url).headers(self.headers()?))
    }

    /// Parse a JSON response body, converting error statuses into
    /// [`RemoteError::Api`] with the service's message when present.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> RemoteResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(RemoteError::api(
                status.as_u16(),
                parse_api_error(status, &body),
            ));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Consume a response where only the status matters.
    async fn expect_success(response: reqwest::Response) -> RemoteResult<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::api(
            status.as_u16(),
            parse_api_error(status, &body),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    results: Vec<BatchResultEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchResultEntry {
    op_uid: String,
    local_id: String,
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        compact_text(trimmed)
    }
}

fn query_value_param(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn wire_batch_op(op: &BatchOp) -> Value {
    match &op.kind {
        BatchOpKind::Create { local_id, record } => serde_json::json!({
            "op": "create",
            "opUid": op.op_uid,
            "localId": local_id,
            "data": record,
        }),
        BatchOpKind::Patch { doc_id, patch } => serde_json::json!({
            "op": "patch",
            "opUid": op.op_uid,
            "id": doc_id,
            "data": patch,
        }),
        BatchOpKind::Delete { doc_id } => serde_json::json!({
            "op": "delete",
            "opUid": op.op_uid,
            "id": doc_id,
        }),
        BatchOpKind::Increment { doc_id, field, by } => serde_json::json!({
            "op": "increment",
            "opUid": op.op_uid,
            "id": doc_id,
            "field": field,
            "by": by,
        }),
        BatchOpKind::ArrayUnion {
            doc_id,
            field,
            values,
        } => serde_json::json!({
            "op": "arrayUnion",
            "opUid": op.op_uid,
            "id": doc_id,
            "field": field,
            "values": values,
        }),
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn create(&self, collection: Collection, record: &Record) -> RemoteResult<String> {
        let response = self
            .request(Method::POST, &self.collection_url(collection))?
            .json(record)
            .send()
            .await?;

        let created: CreateResponse = Self::parse_response(response).await?;
        Ok(created.id)
    }

    async fn get(&self, collection: Collection, doc_id: &str) -> RemoteResult<Option<Record>> {
        let response = self
            .request(Method::GET, &self.doc_url(collection, doc_id))?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let record: Record = Self::parse_response(response).await?;
        Ok(Some(record))
    }

    async fn update(
        &self,
        collection: Collection,
        doc_id: &str,
        patch: &Record,
    ) -> RemoteResult<()> {
        let response = self
            .request(Method::PATCH, &self.doc_url(collection, doc_id))?
            .json(patch)
            .send()
            .await?;

        Self::expect_success(response).await
    }

    async fn delete(&self, collection: Collection, doc_id: &str) -> RemoteResult<()> {
        let response = self
            .request(Method::DELETE, &self.doc_url(collection, doc_id))?
            .send()
            .await?;

        // delete is idempotent; an already-gone document is success
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response).await
    }

    async fn query_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &Value,
    ) -> RemoteResult<Vec<Record>> {
        let value_param = query_value_param(value);
        let response = self
            .request(Method::GET, &self.collection_url(collection))?
            .query(&[("field", field), ("value", value_param.as_str())])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    async fn commit_batch(
        &self,
        collection: Collection,
        ops: Vec<BatchOp>,
    ) -> RemoteResult<Vec<BatchReceipt>> {
        let operations: Vec<Value> = ops.iter().map(wire_batch_op).collect();
        let url = format!("{}:batchWrite", self.collection_url(collection));
        let response = self
            .request(Method::POST, &url)?
            .json(&serde_json::json!({ "operations": operations }))
            .send()
            .await?;

        let batch: BatchResponse = Self::parse_response(response).await?;
        Ok(batch
            .results
            .into_iter()
            .map(|entry| BatchReceipt {
                op_uid: entry.op_uid,
                local_id: entry.local_id,
                server_id: entry.id,
            })
            .collect())
    }

    async fn ping(&self) -> RemoteResult<()> {
        let response = self
            .request(Method::GET, &format!("{}/v1/ping", self.config.endpoint))?
            .send()
            .await?;
        Self::expect_success(response).await
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_api_error_prefers_service_message() {
        let message = parse_api_error(
            StatusCode::FORBIDDEN,
            r#"{"error": "nope", "message": "permission denied"}"#,
        );
        assert_eq!(message, "permission denied");
    }

    #[test]
    fn parse_api_error_falls_back_to_body_then_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn query_value_param_keeps_strings_raw() {
        assert_eq!(query_value_param(&json!("u1")), "u1");
        assert_eq!(query_value_param(&json!(42)), "42");
    }

    #[test]
    fn wire_batch_op_shapes() {
        let mut record = Record::new();
        record.set_id("local-1");
        let op = BatchOp {
            op_uid: "uid-1".to_string(),
            kind: BatchOpKind::Create {
                local_id: "local-1".to_string(),
                record,
            },
        };

        let wire = wire_batch_op(&op);
        assert_eq!(wire["op"], "create");
        assert_eq!(wire["opUid"], "uid-1");
        assert_eq!(wire["localId"], "local-1");
        assert_eq!(wire["data"]["id"], "local-1");
    }
}
