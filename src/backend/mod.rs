//! Backend seam: registers swap-block files and lists open orders.
//!
//! `SwapBackend` is the trait the orchestrators talk to; `BackendClient`
//! is the GraphQL implementation and `InMemoryBackend` the test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::orders::models::OpenAtomicOrder;

#[async_trait]
pub trait SwapBackend: Send + Sync {
    /// Open orders for `owner` whose validity ends before `expires_before`
    async fn list_open_atomic_orders_full_chain(
        &self,
        owner: &str,
        expires_before: DateTime<Utc>,
    ) -> AppResult<Vec<OpenAtomicOrder>>;

    /// Upload a blocks file (one `hex|validFrom` line per block) and
    /// return its URL
    async fn upload_blocks_file(
        &self,
        blocks: &[String],
        start: DateTime<Utc>,
        minutes_apart: u64,
    ) -> AppResult<String>;

    /// Register an uploaded blocks file against an order
    async fn bulk_create_atomic_swap_block(
        &self,
        atomic_order_id: &str,
        file_url: &str,
        block_count: u64,
        from_time: DateTime<Utc>,
        skip_validation: bool,
    ) -> AppResult<()>;
}

pub struct BackendClient {
    http: reqwest::Client,
    api_url: String,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
}

impl BackendClient {
    pub fn new(api_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> AppResult<T> {
        let response: GraphQlResponse<T> = self
            .http
            .post(format!("{}/graphql", self.api_url))
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Backend(e.to_string()))?
            .json()
            .await?;

        if let Some(errors) = response.errors {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(AppError::Backend(messages.join("; ")));
        }
        response
            .data
            .ok_or_else(|| AppError::Backend("empty GraphQL response".to_string()))
    }

    /// Signed upload URL for an object of the given mime type
    pub async fn create_signed_upload(&self, mime_type: &str) -> AppResult<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            create_signed_upload: String,
        }

        let query = r#"
            mutation CreateSignedUpload($mimeType: String!) {
                createSignedUpload(mimeType: $mimeType)
            }
        "#;
        let data: Data = self
            .execute(query, json!({ "mimeType": mime_type }))
            .await?;
        Ok(data.create_signed_upload)
    }
}

#[async_trait]
impl SwapBackend for BackendClient {
    async fn list_open_atomic_orders_full_chain(
        &self,
        owner: &str,
        expires_before: DateTime<Utc>,
    ) -> AppResult<Vec<OpenAtomicOrder>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            list_open_atomic_orders_full_chain: Vec<OpenAtomicOrder>,
        }

        let query = r#"
            query ListOpenAtomicOrdersFullChain($ownerAddress: String!, $expiresAfter: String!) {
                listOpenAtomicOrdersFullChain(ownerAddress: $ownerAddress, expiresAfter: $expiresAfter) {
                    id
                    escrowAddress
                    firstTokenAddress
                    secondTokenAddress
                    buyAmount
                    sellAmount
                    validUntil
                    unsignedBytes
                }
            }
        "#;
        let data: Data = self
            .execute(
                query,
                json!({
                    "ownerAddress": owner,
                    "expiresAfter": expires_before.to_rfc3339(),
                }),
            )
            .await?;
        Ok(data.list_open_atomic_orders_full_chain)
    }

    async fn bulk_create_atomic_swap_block(
        &self,
        atomic_order_id: &str,
        file_url: &str,
        block_count: u64,
        from_time: DateTime<Utc>,
        skip_validation: bool,
    ) -> AppResult<()> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Data {
            #[allow(dead_code)]
            bulk_create_atomic_swap_block: Value,
        }

        let query = r#"
            mutation BulkCreateAtomicSwapBlock(
                $atomicOrderId: ID!, $fileUrl: String!, $blockCount: Int!,
                $fromTime: String!, $skipValidation: Boolean!
            ) {
                bulkCreateAtomicSwapBlock(
                    atomicOrderId: $atomicOrderId, fileUrl: $fileUrl, blockCount: $blockCount,
                    fromTime: $fromTime, skipValidation: $skipValidation
                )
            }
        "#;
        let _: Data = self
            .execute(
                query,
                json!({
                    "atomicOrderId": atomic_order_id,
                    "fileUrl": file_url,
                    "blockCount": block_count,
                    "fromTime": from_time.to_rfc3339(),
                    "skipValidation": skip_validation,
                }),
            )
            .await?;
        Ok(())
    }

    /// Upload through a signed-URL exchange; the returned URL is stripped
    /// of its signing query string
    async fn upload_blocks_file(
        &self,
        blocks: &[String],
        start: DateTime<Utc>,
        minutes_apart: u64,
    ) -> AppResult<String> {
        let signed_url = self.create_signed_upload("text/plain").await?;

        let content = blocks
            .iter()
            .enumerate()
            .map(|(i, block_hex)| {
                let valid_from = start + chrono::Duration::minutes((i as u64 * minutes_apart) as i64);
                blocks_file_line(block_hex, valid_from)
            })
            .collect::<Vec<_>>()
            .join("\n");

        debug!(blocks = blocks.len(), bytes = content.len(), "uploading blocks file");

        let response = self
            .http
            .put(&signed_url)
            .header("Content-Type", "text/plain")
            .body(content)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Backend(format!(
                "Failed to upload blocks file: {}",
                response.status()
            )));
        }

        Ok(signed_url
            .split('?')
            .next()
            .unwrap_or(&signed_url)
            .to_string())
    }
}

/// Format one `hex|validFrom` line; exposed for tests of the file format
pub fn blocks_file_line(block_hex: &str, valid_from: DateTime<Utc>) -> String {
    format!("{}|{}", block_hex, valid_from.to_rfc3339())
}

/// One recorded blocks-file upload
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub blocks: Vec<String>,
    pub start: DateTime<Utc>,
    pub minutes_apart: u64,
    pub file_url: String,
}

/// One recorded registration call
#[derive(Debug, Clone)]
pub struct RecordedRegistration {
    pub atomic_order_id: String,
    pub file_url: String,
    pub block_count: u64,
    pub from_time: DateTime<Utc>,
    pub skip_validation: bool,
}

#[derive(Default)]
struct BackendState {
    open_orders: Vec<OpenAtomicOrder>,
    list_calls: usize,
    uploads: Vec<RecordedUpload>,
    registrations: Vec<RecordedRegistration>,
}

/// Backend used by tests and local development: serves scripted open
/// orders and records uploads and registrations.
#[derive(Default)]
pub struct InMemoryBackend {
    state: parking_lot::Mutex<BackendState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_open_order(&self, order: OpenAtomicOrder) {
        self.state.lock().open_orders.push(order);
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().list_calls
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.lock().uploads.clone()
    }

    pub fn registrations(&self) -> Vec<RecordedRegistration> {
        self.state.lock().registrations.clone()
    }
}

#[async_trait]
impl SwapBackend for InMemoryBackend {
    async fn list_open_atomic_orders_full_chain(
        &self,
        _owner: &str,
        expires_before: DateTime<Utc>,
    ) -> AppResult<Vec<OpenAtomicOrder>> {
        let mut state = self.state.lock();
        state.list_calls += 1;
        Ok(state
            .open_orders
            .iter()
            .filter(|order| order.valid_until < expires_before)
            .cloned()
            .collect())
    }

    async fn upload_blocks_file(
        &self,
        blocks: &[String],
        start: DateTime<Utc>,
        minutes_apart: u64,
    ) -> AppResult<String> {
        let mut state = self.state.lock();
        let file_url = format!("https://files.local/blocks-{}", state.uploads.len());
        state.uploads.push(RecordedUpload {
            blocks: blocks.to_vec(),
            start,
            minutes_apart,
            file_url: file_url.clone(),
        });
        Ok(file_url)
    }

    async fn bulk_create_atomic_swap_block(
        &self,
        atomic_order_id: &str,
        file_url: &str,
        block_count: u64,
        from_time: DateTime<Utc>,
        skip_validation: bool,
    ) -> AppResult<()> {
        self.state.lock().registrations.push(RecordedRegistration {
            atomic_order_id: atomic_order_id.to_string(),
            file_url: file_url.to_string(),
            block_count,
            from_time,
            skip_validation,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_blocks_file_line_format() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let line = blocks_file_line("deadbeef", at);
        assert_eq!(line, "deadbeef|2026-01-02T03:04:05+00:00");
    }
}
