//! REST transport over reqwest.

use futures_util::stream;
use reqwest::{Body, Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;
use val_path::ModuleFilePath;
use val_patch::{FileUploadRequest, FileUploadResponse, PatchId};
use val_schema::SchemaSet;

use crate::config::SyncConfig;
use crate::error::TransportError;
use crate::transport::{PatchSubmission, Progress, SourcesResponse, SubmitResponse, Transport};

pub struct HttpTransport {
    client: Client,
    base: String,
    chunk_size: usize,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl HttpTransport {
    pub fn new(config: &SyncConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self::with_client(config, client))
    }

    pub fn with_client(config: &SyncConfig, client: Client) -> Self {
        Self {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
            chunk_size: config.upload_chunk_size.max(1),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn check(response: Response, patch_id: Option<PatchId>) -> Result<Response, TransportError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        if status.is_client_error() {
            Err(TransportError::Rejected { message, patch_id })
        } else {
            Err(TransportError::Status {
                code: status.as_u16(),
                message,
            })
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TransportError> {
        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

fn network(e: reqwest::Error) -> TransportError {
    TransportError::Network(e.to_string())
}

impl Transport for HttpTransport {
    async fn fetch_schemas(&self) -> Result<SchemaSet, TransportError> {
        let response = self.client.get(self.url("/schema")).send().await.map_err(network)?;
        Self::decode(Self::check(response, None).await?).await
    }

    async fn fetch_sources(&self, modules: &[ModuleFilePath]) -> Result<SourcesResponse, TransportError> {
        let response = self
            .client
            .put(self.url("/sources"))
            .json(&json!({ "modules": modules }))
            .send()
            .await
            .map_err(network)?;
        Self::decode(Self::check(response, None).await?).await
    }

    async fn submit_patches(&self, patches: &[PatchSubmission]) -> Result<SubmitResponse, TransportError> {
        let single = match patches {
            [only] => Some(only.patch_id),
            _ => None,
        };
        let response = self
            .client
            .post(self.url("/patches"))
            .json(&json!({ "patches": patches }))
            .send()
            .await
            .map_err(network)?;
        Self::decode(Self::check(response, single).await?).await
    }

    async fn delete_patches(&self, ids: &[PatchId]) -> Result<(), TransportError> {
        let query: Vec<(&str, String)> = ids.iter().map(|id| ("id", id.to_string())).collect();
        let response = self
            .client
            .delete(self.url("/patches"))
            .query(&query)
            .send()
            .await
            .map_err(network)?;
        Self::check(response, None).await.map(|_| ())
    }

    async fn upload_file(
        &self,
        patch_id: PatchId,
        request: &FileUploadRequest,
        progress: Progress,
    ) -> Result<FileUploadResponse, TransportError> {
        let body = serde_json::to_vec(request).map_err(|e| TransportError::Decode(e.to_string()))?;
        let total = body.len() as u64;
        let chunks: Vec<Vec<u8>> = body.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        debug!(patch_id = %patch_id, bytes = total, chunks = chunks.len(), "uploading file");

        let mut sent = 0u64;
        let body = stream::iter(chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            progress(sent, total);
            Ok::<_, std::io::Error>(chunk)
        }));
        let response = self
            .client
            .post(self.url(&format!("/upload/patches/{patch_id}")))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(Body::wrap_stream(body))
            .send()
            .await
            .map_err(network)?;
        Self::decode(Self::check(response, Some(patch_id)).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &'static str) -> Response {
        Response::from(http::Response::builder().status(status).body(body).unwrap())
    }

    #[tokio::test]
    async fn success_passes_through() {
        let checked = HttpTransport::check(response(200, "{}"), None).await.unwrap();
        assert!(checked.status().is_success());
    }

    #[tokio::test]
    async fn client_errors_are_rejections() {
        let id = PatchId::new();
        let err = HttpTransport::check(response(409, r#"{"message":"conflict on posts"}"#), Some(id))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                message: "conflict on posts".into(),
                patch_id: Some(id)
            }
        );
    }

    #[tokio::test]
    async fn server_errors_keep_status_and_raw_body() {
        let err = HttpTransport::check(response(503, "maintenance"), None).await.unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                code: 503,
                message: "maintenance".into()
            }
        );
        assert!(!err.is_network());
    }

    #[test]
    fn trims_trailing_slash() {
        let config = SyncConfig {
            api_base: "http://localhost:3000/api/val/".into(),
            ..SyncConfig::default()
        };
        let transport = HttpTransport::with_client(&config, Client::new());
        assert_eq!(transport.url("/schema"), "http://localhost:3000/api/val/schema");
    }
}
