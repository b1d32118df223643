/// 感情分析サービスへのクライアント。
///
/// レスポンスは整ったJSONのこともあれば、markdownフェンスや説明文に
/// 埋め込まれたJSONのこともある。抽出と契約検証に失敗した場合は
/// 中立のフォールバックレポートへ畳み込む（トランスポート障害は別で、
/// 呼び出し側にエラーとして返る）。
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::warn;

use crate::schema::emotion::validate_report;
use crate::store::models::EmotionReport;
use crate::util::json::extract_first_object;

#[derive(Debug, Clone)]
pub(crate) struct EmotionClientConfig {
    pub(crate) base_url: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) service_token: Option<String>,
}

/// パイプラインが依存する分析器の抽象。テストではスタブに差し替える。
#[async_trait]
pub(crate) trait EmotionAnalyzer: Send + Sync {
    async fn analyze(&self, content: &str) -> Result<EmotionReport>;

    async fn health_check(&self) -> Result<()>;
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    content: &'a str,
}

#[derive(Debug, Clone)]
pub(crate) struct HttpEmotionClient {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

impl HttpEmotionClient {
    /// # Errors
    /// URLのパースまたはHTTPクライアントの構築に失敗した場合はエラーを返す。
    pub(crate) fn new(config: EmotionClientConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.total_timeout)
            .build()
            .context("failed to build emotion service client")?;

        let base_url =
            Url::parse(&config.base_url).context("invalid emotion service base URL")?;

        Ok(Self {
            client,
            base_url,
            service_token: config.service_token,
        })
    }
}

#[async_trait]
impl EmotionAnalyzer for HttpEmotionClient {
    async fn analyze(&self, content: &str) -> Result<EmotionReport> {
        let url = self
            .base_url
            .join("v1/analyze")
            .context("failed to build emotion analyze URL")?;

        let mut request = self.client.post(url).json(&AnalyzeRequest { content });
        if let Some(token) = &self.service_token {
            request = request.header("X-Service-Token", token);
        }

        let body = request
            .send()
            .await
            .context("emotion analyze request failed")?
            .error_for_status()
            .context("emotion service returned error status")?
            .text()
            .await
            .context("failed to read emotion service response body")?;

        Ok(parse_report(&body))
    }

    async fn health_check(&self) -> Result<()> {
        let url = self
            .base_url
            .join("health")
            .context("failed to build emotion health URL")?;

        self.client
            .get(url)
            .send()
            .await
            .context("emotion health request failed")?
            .error_for_status()
            .context("emotion health endpoint returned error status")?;

        Ok(())
    }
}

/// 本文から最初のJSONオブジェクトを抽出し、契約検証のうえ構造化する。
/// どの段階で失敗しても中立のフォールバックに落ちる。
pub(crate) fn parse_report(body: &str) -> EmotionReport {
    let Some(object) = extract_first_object(body) else {
        warn!("emotion response contained no JSON object, using neutral fallback");
        return EmotionReport::neutral_fallback("parse failed");
    };

    let validation = validate_report(&object);
    if !validation.valid {
        warn!(errors = ?validation.errors, "emotion response failed contract validation");
        return EmotionReport::neutral_fallback("parse failed");
    }

    match serde_json::from_value::<EmotionReport>(object) {
        Ok(report) => report,
        Err(error) => {
            warn!(%error, "emotion response did not deserialize, using neutral fallback");
            EmotionReport::neutral_fallback("parse failed")
        }
    }
}
