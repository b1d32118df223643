/// 画像ストレージゲートウェイへのクライアント。
///
/// 「バイト列を渡すとURLが返る」契約のみに依存する。バッチは入力順を
/// 保ち、個別の失敗は黙って落とし、得られたURLは初出順で重複排除する。
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::util::text::unique_nonempty_trimmed;

const ALLOWED_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

#[derive(Debug, Clone)]
pub(crate) struct MediaClientConfig {
    pub(crate) base_url: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) service_token: Option<String>,
    pub(crate) max_upload_bytes: usize,
}

#[derive(Debug, Error)]
pub(crate) enum MediaError {
    #[error("unsupported content type: {0} (jpg/png/webp/gif only)")]
    UnsupportedType(String),
    #[error("file too large: {actual} bytes (max {max})")]
    TooLarge { actual: usize, max: usize },
    #[error(transparent)]
    Gateway(#[from] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    url: String,
}

#[derive(Debug, Clone)]
pub(crate) struct MediaStoreClient {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
    max_upload_bytes: usize,
}

impl MediaStoreClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub(crate) fn new(config: MediaClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build media store client")?;

        let base_url = Url::parse(&config.base_url).context("invalid media store base URL")?;

        Ok(Self {
            client,
            base_url,
            service_token: config.service_token,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    /// 1ファイルをアップロードしてURLを得る。
    ///
    /// # Errors
    /// MIMEが許可リスト外、サイズ超過、またはゲートウェイ障害の場合。
    pub(crate) async fn upload_image(
        &self,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, MediaError> {
        if !ALLOWED_TYPES.contains(&content_type) {
            return Err(MediaError::UnsupportedType(content_type.to_string()));
        }
        if bytes.len() > self.max_upload_bytes {
            return Err(MediaError::TooLarge {
                actual: bytes.len(),
                max: self.max_upload_bytes,
            });
        }

        let url = self
            .base_url
            .join("v1/images")
            .context("failed to build media upload URL")?;

        let mut request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(bytes);
        if let Some(token) = &self.service_token {
            request = request.header("X-Service-Token", token);
        }

        let response: UploadResponse = request
            .send()
            .await
            .context("media upload request failed")?
            .error_for_status()
            .context("media store returned error status")?
            .json()
            .await
            .context("failed to deserialize media store response")?;

        Ok(response.url)
    }

    /// 複数ファイルを入力順にアップロードする。個別の失敗はログだけ残して
    /// 落とし、成功分のURLを初出順・重複排除で返す。
    pub(crate) async fn upload_batch(&self, files: Vec<(Vec<u8>, String)>) -> Vec<String> {
        let mut urls = Vec::new();
        for (index, (bytes, content_type)) in files.into_iter().enumerate() {
            match self.upload_image(bytes, &content_type).await {
                Ok(url) => urls.push(url),
                Err(error) => {
                    warn!(index, %error, "dropping failed image upload from batch");
                }
            }
        }
        unique_nonempty_trimmed(&urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> MediaStoreClient {
        MediaStoreClient::new(MediaClientConfig {
            base_url: server.uri(),
            connect_timeout: Duration::from_millis(3000),
            total_timeout: Duration::from_secs(30),
            service_token: None,
            max_upload_bytes: 64,
        })
        .expect("client builds")
    }

    #[tokio::test]
    async fn upload_returns_gateway_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "https://cdn.example.com/abc.jpg"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let url = client
            .upload_image(vec![0xFF, 0xD8], "image/jpeg")
            .await
            .expect("upload");
        assert_eq!(url, "https://cdn.example.com/abc.jpg");
    }

    #[tokio::test]
    async fn upload_rejects_disallowed_mime_type() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let error = client
            .upload_image(vec![1, 2, 3], "application/pdf")
            .await
            .expect_err("should reject");
        assert!(matches!(error, MediaError::UnsupportedType(_)));
    }

    #[tokio::test]
    async fn upload_rejects_oversized_file() {
        let server = MockServer::start().await;
        let client = client_for(&server);
        let error = client
            .upload_image(vec![0; 65], "image/png")
            .await
            .expect_err("should reject");
        assert!(matches!(error, MediaError::TooLarge { .. }));
    }

    #[tokio::test]
    async fn batch_drops_failures_and_deduplicates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/images"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "url": "https://cdn.example.com/same.jpg"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let urls = client
            .upload_batch(vec![
                (vec![1], "image/jpeg".to_string()),
                (vec![2], "text/plain".to_string()),
                (vec![3], "image/png".to_string()),
            ])
            .await;

        // 不許可MIMEの1件は落ち、同一URLは1つに畳まれる。
        assert_eq!(urls, vec!["https://cdn.example.com/same.jpg".to_string()]);
    }
}
