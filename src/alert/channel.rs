use crate::alert::model::{Alert, AlertLevel, ChannelKind, DispatchReport};
use crate::config::AlertConfig;
use async_trait::async_trait;
use base64::Engine;
use futures::future::join_all;
use log::{info, warn};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum ChannelError {
    #[error("http error: {0}")]
    Http(String),
    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("unauthorized")]
    Unauthorized,
}

#[async_trait]
pub trait AlertChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;
    async fn send(&self, alert: &Alert) -> Result<(), ChannelError>;
}

pub(crate) fn build_alert_http_client(cfg: &AlertConfig) -> Result<reqwest::Client, ChannelError> {
    let mut builder =
        reqwest::Client::builder().timeout(Duration::from_secs(cfg.http_timeout_secs.max(1)));

    if let Some(raw) = &cfg.proxy {
        let t = raw.trim();
        if !t.is_empty() {
            let url = if t.contains("://") {
                t.to_string()
            } else {
                format!("socks5h://{}", t)
            };
            let proxy = reqwest::Proxy::all(&url).map_err(|e| ChannelError::Http(e.to_string()))?;
            builder = builder.proxy(proxy);
        }
    }

    builder.build().map_err(|e| ChannelError::Http(e.to_string()))
}

async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
) -> Result<(), ChannelError> {
    let resp = request
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ChannelError::Http(e.to_string()))?;

    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(ChannelError::Unauthorized),
        s if s.is_success() => return Ok(()),
        _ => {}
    }
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Err(ChannelError::Rejected { status, body })
}

fn subject(alert: &Alert) -> String {
    format!("[{}] {}", alert.level.as_str(), alert.title)
}

/// Mail relay that accepts a JSON message over HTTP with basic auth.
#[derive(Clone)]
pub struct EmailChannel {
    client: reqwest::Client,
    url: String,
    auth: Option<String>,
    from: String,
    to: Vec<String>,
}

impl EmailChannel {
    pub fn new(
        client: reqwest::Client,
        url: String,
        user: Option<&str>,
        password: Option<&str>,
        from: Option<String>,
        to: Vec<String>,
    ) -> Self {
        let auth = user.map(|u| {
            base64::engine::general_purpose::STANDARD
                .encode(format!("{}:{}", u, password.unwrap_or_default()))
        });
        Self {
            client,
            url,
            auth,
            from: from.unwrap_or_else(|| "batchops@localhost".to_string()),
            to,
        }
    }
}

#[async_trait]
impl AlertChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let body = serde_json::json!({
            "from": self.from,
            "to": self.to,
            "subject": subject(alert),
            "text": format!("{}\n\nalert #{} type={} execution={}",
                alert.message,
                alert.id,
                alert.alert_type,
                alert.execution_id.as_deref().unwrap_or("-")),
        });
        let mut request = self.client.post(&self.url);
        if let Some(auth) = &self.auth {
            request = request.header("Authorization", format!("Basic {}", auth));
        }
        post_json(request, &body).await
    }
}

/// Chat incoming webhook (`{"text": ...}`).
#[derive(Clone)]
pub struct ChatChannel {
    client: reqwest::Client,
    url: String,
}

impl ChatChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlertChannel for ChatChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let mut text = format!("*{}*\n{}", subject(alert), alert.message);
        if let Some(code) = &alert.error_code {
            text.push_str(&format!("\ncode: {}", code));
        }
        let body = serde_json::json!({ "text": text });
        post_json(self.client.post(&self.url), &body).await
    }
}

/// Generic webhook receiving the whole alert as JSON.
#[derive(Clone)]
pub struct WebhookChannel {
    client: reqwest::Client,
    url: String,
}

impl WebhookChannel {
    pub fn new(client: reqwest::Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl AlertChannel for WebhookChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Webhook
    }

    async fn send(&self, alert: &Alert) -> Result<(), ChannelError> {
        let body = serde_json::to_value(alert).map_err(|e| ChannelError::Http(e.to_string()))?;
        post_json(self.client.post(&self.url), &body).await
    }
}

/// The configured channels and the selection rule over them.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
}

impl AlertDispatcher {
    pub fn new(channels: Vec<Arc<dyn AlertChannel>>) -> Self {
        Self { channels }
    }

    pub fn from_config(cfg: &AlertConfig) -> Result<Self, ChannelError> {
        let client = build_alert_http_client(cfg)?;
        let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
        if let Some(url) = &cfg.email_url {
            channels.push(Arc::new(EmailChannel::new(
                client.clone(),
                url.clone(),
                cfg.email_user.as_deref(),
                cfg.email_password.as_deref(),
                cfg.email_from.clone(),
                cfg.email_to.clone(),
            )));
        }
        if let Some(url) = &cfg.chat_webhook {
            channels.push(Arc::new(ChatChannel::new(client.clone(), url.clone())));
        }
        if let Some(url) = &cfg.webhook_url {
            channels.push(Arc::new(WebhookChannel::new(client, url.clone())));
        }
        info!(
            "alert channels configured: [{}]",
            channels
                .iter()
                .map(|c| c.kind().as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(Self { channels })
    }

    pub fn configured(&self) -> Vec<ChannelKind> {
        self.channels.iter().map(|c| c.kind()).collect()
    }

    /// Requested (or severity default) channels, restricted to those configured.
    pub fn select(&self, level: AlertLevel, requested: Option<&[ChannelKind]>) -> Vec<ChannelKind> {
        let wanted = match requested {
            Some(r) => r.to_vec(),
            None => ChannelKind::defaults_for(level),
        };
        let configured = self.configured();
        let mut selected = Vec::new();
        for kind in wanted {
            if configured.contains(&kind) && !selected.contains(&kind) {
                selected.push(kind);
            }
        }
        selected
    }

    /// Sends to each channel in `alert.channels_sent` concurrently. Failures
    /// are collected, never propagated.
    pub async fn dispatch(&self, alert: &Alert) -> DispatchReport {
        let targets: Vec<Arc<dyn AlertChannel>> = self
            .channels
            .iter()
            .filter(|c| alert.channels_sent.contains(&c.kind()))
            .cloned()
            .collect();
        let results = join_all(targets.iter().map(|c| async move {
            let kind = c.kind();
            (kind, c.send(alert).await)
        }))
        .await;

        let mut report = DispatchReport {
            alert_id: alert.id,
            ..Default::default()
        };
        for (kind, result) in results {
            match result {
                Ok(()) => report.delivered.push(kind),
                Err(e) => {
                    warn!(
                        "✗ alert #{} delivery via {} failed: {}",
                        alert.id,
                        kind.as_str(),
                        e
                    );
                    report.failed.push((kind, e.to_string()));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullChannel(ChannelKind);

    #[async_trait]
    impl AlertChannel for NullChannel {
        fn kind(&self) -> ChannelKind {
            self.0
        }

        async fn send(&self, _alert: &Alert) -> Result<(), ChannelError> {
            Ok(())
        }
    }

    fn dispatcher(kinds: &[ChannelKind]) -> AlertDispatcher {
        AlertDispatcher::new(
            kinds
                .iter()
                .map(|k| Arc::new(NullChannel(*k)) as Arc<dyn AlertChannel>)
                .collect(),
        )
    }

    #[test]
    fn unconfigured_channels_are_dropped_from_selection() {
        let d = dispatcher(&[ChannelKind::Email, ChannelKind::Chat]);
        assert_eq!(
            d.select(AlertLevel::Critical, None),
            vec![ChannelKind::Email, ChannelKind::Chat]
        );
        assert_eq!(d.select(AlertLevel::Info, None), vec![ChannelKind::Email]);
        assert_eq!(
            d.select(AlertLevel::Info, Some(&[ChannelKind::Webhook, ChannelKind::Chat])),
            vec![ChannelKind::Chat]
        );
        assert!(AlertDispatcher::default().select(AlertLevel::Error, None).is_empty());
    }

    #[test]
    fn proxy_without_scheme_defaults_to_socks() {
        let cfg = AlertConfig {
            proxy: Some("127.0.0.1:1080".to_string()),
            http_timeout_secs: 5,
            ..Default::default()
        };
        assert!(build_alert_http_client(&cfg).is_ok());
    }
}
