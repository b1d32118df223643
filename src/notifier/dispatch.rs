/// 通知ディスパッチャ。
///
/// 配送はターゲット毎に独立で、個別タスクに分離して実行する。
/// 1ユーザーのアダプタ障害（パニックを含む）は捕捉してログに残し、
/// 残りの配送を止めない。ドライランではトランスポートを呼ばず
/// ログだけ出す。アダプタが成功を報告したユーザーの一覧を返す。
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::observability::metrics::Metrics;
use crate::store::models::{Channel, NotificationTarget, NotificationUser};

const NOTIFICATION_TITLE: &str = "오늘의 감정 알림";

/// チャネル毎のトランスポート抽象。
#[async_trait]
pub(crate) trait ChannelTransport: Send + Sync {
    fn channel(&self) -> Channel;

    async fn deliver(&self, user: &NotificationUser, message: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub(crate) struct GatewayConfig {
    pub(crate) base_url: String,
    pub(crate) connect_timeout: Duration,
    pub(crate) total_timeout: Duration,
    pub(crate) service_token: Option<String>,
}

fn gateway_client(config: &GatewayConfig) -> Result<(Client, Url)> {
    let client = Client::builder()
        .connect_timeout(config.connect_timeout)
        .timeout(config.total_timeout)
        .build()
        .context("failed to build gateway client")?;
    let base_url = Url::parse(&config.base_url).context("invalid gateway base URL")?;
    Ok((client, base_url))
}

async fn post_gateway(
    client: &Client,
    url: Url,
    token: Option<&str>,
    payload: &impl Serialize,
) -> Result<()> {
    let mut request = client.post(url).json(payload);
    if let Some(token) = token {
        request = request.header("X-Service-Token", token);
    }
    request
        .send()
        .await
        .context("gateway request failed")?
        .error_for_status()
        .context("gateway returned error status")?;
    Ok(())
}

/// FCM系のプッシュゲートウェイ。
pub(crate) struct PushGatewayTransport {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

impl PushGatewayTransport {
    pub(crate) fn new(config: &GatewayConfig) -> Result<Self> {
        let (client, base_url) = gateway_client(config)?;
        Ok(Self {
            client,
            base_url,
            service_token: config.service_token.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    to: &'a str,
    title: &'a str,
    body: &'a str,
}

#[async_trait]
impl ChannelTransport for PushGatewayTransport {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn deliver(&self, user: &NotificationUser, message: &str) -> Result<()> {
        let token = user
            .push_token
            .as_deref()
            .context("user has no push token")?;
        let url = self
            .base_url
            .join("v1/push/send")
            .context("failed to build push URL")?;
        post_gateway(
            &self.client,
            url,
            self.service_token.as_deref(),
            &PushPayload {
                to: token,
                title: NOTIFICATION_TITLE,
                body: message,
            },
        )
        .await
    }
}

/// SMSゲートウェイ。
pub(crate) struct SmsGatewayTransport {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

impl SmsGatewayTransport {
    pub(crate) fn new(config: &GatewayConfig) -> Result<Self> {
        let (client, base_url) = gateway_client(config)?;
        Ok(Self {
            client,
            base_url,
            service_token: config.service_token.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    body: &'a str,
}

#[async_trait]
impl ChannelTransport for SmsGatewayTransport {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn deliver(&self, user: &NotificationUser, message: &str) -> Result<()> {
        let to = user
            .phone_number
            .as_deref()
            .context("user has no phone number")?;
        let url = self
            .base_url
            .join("v1/sms/messages")
            .context("failed to build SMS URL")?;
        post_gateway(
            &self.client,
            url,
            self.service_token.as_deref(),
            &SmsPayload { to, body: message },
        )
        .await
    }
}

/// メールリレー。
pub(crate) struct MailGatewayTransport {
    client: Client,
    base_url: Url,
    service_token: Option<String>,
}

impl MailGatewayTransport {
    pub(crate) fn new(config: &GatewayConfig) -> Result<Self> {
        let (client, base_url) = gateway_client(config)?;
        Ok(Self {
            client,
            base_url,
            service_token: config.service_token.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct MailPayload<'a> {
    to: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[async_trait]
impl ChannelTransport for MailGatewayTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn deliver(&self, user: &NotificationUser, message: &str) -> Result<()> {
        let to = user.email.as_deref().context("user has no email address")?;
        let url = self
            .base_url
            .join("v1/mail/send")
            .context("failed to build mail URL")?;
        post_gateway(
            &self.client,
            url,
            self.service_token.as_deref(),
            &MailPayload {
                to,
                subject: NOTIFICATION_TITLE,
                body: message,
            },
        )
        .await
    }
}

pub(crate) struct NotificationDispatcher {
    transports: HashMap<Channel, Arc<dyn ChannelTransport>>,
    dry_run: bool,
    metrics: Arc<Metrics>,
}

impl NotificationDispatcher {
    pub(crate) fn new(
        transports: Vec<Arc<dyn ChannelTransport>>,
        dry_run: bool,
        metrics: Arc<Metrics>,
    ) -> Self {
        let transports = transports
            .into_iter()
            .map(|transport| (transport.channel(), transport))
            .collect();
        Self {
            transports,
            dry_run,
            metrics,
        }
    }

    /// ターゲット群を並行に配送し、アダプタが成功を報告したユーザーID
    /// を返す。配送毎に`tokio::spawn`で隔離するため、一件のパニックも
    /// 他の配送を巻き込まない。
    pub(crate) async fn dispatch(&self, targets: Vec<NotificationTarget>) -> Vec<i64> {
        let mut handles = Vec::with_capacity(targets.len());
        for target in targets {
            let transport = self.transports.get(&target.user.channel).cloned();
            let dry_run = self.dry_run;
            let user_id = target.user.id;
            let channel = target.user.channel;
            let handle = tokio::spawn(async move { deliver_one(transport, dry_run, &target).await });
            handles.push((user_id, channel, handle));
        }

        let outcomes = futures::future::join_all(
            handles
                .into_iter()
                .map(|(user_id, channel, handle)| async move { (user_id, channel, handle.await) }),
        )
        .await;

        let mut sent = Vec::new();
        for (user_id, channel, outcome) in outcomes {
            match outcome {
                Ok(Ok(())) => {
                    self.metrics.notifications_sent.inc();
                    sent.push(user_id);
                }
                Ok(Err(error)) => {
                    self.metrics.notifications_failed.inc();
                    warn!(user_id, channel = channel.as_str(), %error, "notification delivery failed");
                }
                Err(join_error) => {
                    self.metrics.notifications_failed.inc();
                    error!(user_id, channel = channel.as_str(), %join_error, "notification delivery task aborted");
                }
            }
        }
        sent
    }
}

async fn deliver_one(
    transport: Option<Arc<dyn ChannelTransport>>,
    dry_run: bool,
    target: &NotificationTarget,
) -> Result<()> {
    if dry_run {
        info!(
            user_id = target.user.id,
            nickname = %target.user.nickname,
            channel = target.user.channel.as_str(),
            message = %target.message,
            "dry-run: suppressing notification delivery"
        );
        return Ok(());
    }

    let transport = transport.with_context(|| {
        format!(
            "no transport configured for channel {}",
            target.user.channel.as_str()
        )
    })?;
    transport.deliver(&target.user, &target.message).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use prometheus::Registry;

    use super::*;

    struct RecordingTransport {
        channel: Channel,
        delivered: Mutex<Vec<i64>>,
    }

    impl RecordingTransport {
        fn new(channel: Channel) -> Arc<Self> {
            Arc::new(Self {
                channel,
                delivered: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ChannelTransport for RecordingTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn deliver(&self, user: &NotificationUser, _message: &str) -> Result<()> {
            self.delivered.lock().expect("delivered").push(user.id);
            Ok(())
        }
    }

    struct FailingTransport {
        channel: Channel,
    }

    #[async_trait]
    impl ChannelTransport for FailingTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn deliver(&self, _user: &NotificationUser, _message: &str) -> Result<()> {
            anyhow::bail!("gateway rejected the message")
        }
    }

    struct PanickingTransport {
        channel: Channel,
    }

    #[async_trait]
    impl ChannelTransport for PanickingTransport {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn deliver(&self, _user: &NotificationUser, _message: &str) -> Result<()> {
            panic!("adapter bug")
        }
    }

    fn target(id: i64, channel: Channel) -> NotificationTarget {
        NotificationTarget {
            user: NotificationUser {
                id,
                nickname: format!("user-{id}"),
                channel,
                push_token: Some("token".to_string()),
                email: Some("user@example.com".to_string()),
                phone_number: Some("010-0000-0000".to_string()),
            },
            message: "오늘도 수고했어요".to_string(),
        }
    }

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new(&Registry::new()).expect("metrics"))
    }

    #[tokio::test]
    async fn delivers_through_matching_channel_adapter() {
        let push = RecordingTransport::new(Channel::Push);
        let mail = RecordingTransport::new(Channel::Email);
        let transports: Vec<Arc<dyn ChannelTransport>> = vec![push.clone(), mail.clone()];
        let dispatcher = NotificationDispatcher::new(transports, false, metrics());

        let sent = dispatcher
            .dispatch(vec![target(1, Channel::Push), target(2, Channel::Email)])
            .await;

        let mut sorted = sent.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2]);
        assert_eq!(*push.delivered.lock().expect("push"), vec![1]);
        assert_eq!(*mail.delivered.lock().expect("mail"), vec![2]);
    }

    #[tokio::test]
    async fn one_failing_delivery_does_not_abort_the_batch() {
        let push = RecordingTransport::new(Channel::Push);
        let sms: Arc<dyn ChannelTransport> = Arc::new(FailingTransport {
            channel: Channel::Sms,
        });
        let transports: Vec<Arc<dyn ChannelTransport>> = vec![push.clone(), sms];
        let dispatcher = NotificationDispatcher::new(transports, false, metrics());

        let sent = dispatcher
            .dispatch(vec![target(1, Channel::Sms), target(2, Channel::Push)])
            .await;

        assert_eq!(sent, vec![2]);
        assert_eq!(*push.delivered.lock().expect("push"), vec![2]);
    }

    #[tokio::test]
    async fn a_panicking_adapter_is_isolated_per_target() {
        let push = RecordingTransport::new(Channel::Push);
        let mail: Arc<dyn ChannelTransport> = Arc::new(PanickingTransport {
            channel: Channel::Email,
        });
        let transports: Vec<Arc<dyn ChannelTransport>> = vec![push.clone(), mail];
        let dispatcher = NotificationDispatcher::new(transports, false, metrics());

        let sent = dispatcher
            .dispatch(vec![target(1, Channel::Email), target(2, Channel::Push)])
            .await;

        assert_eq!(sent, vec![2]);
    }

    #[tokio::test]
    async fn missing_transport_counts_as_per_target_failure() {
        let dispatcher = NotificationDispatcher::new(Vec::new(), false, metrics());

        let sent = dispatcher.dispatch(vec![target(1, Channel::Push)]).await;
        assert!(sent.is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_success_without_calling_transports() {
        let push = RecordingTransport::new(Channel::Push);
        let transports: Vec<Arc<dyn ChannelTransport>> = vec![push.clone()];
        let dispatcher = NotificationDispatcher::new(transports, true, metrics());

        let sent = dispatcher.dispatch(vec![target(1, Channel::Push)]).await;

        assert_eq!(sent, vec![1]);
        assert!(push.delivered.lock().expect("push").is_empty());
    }
}
