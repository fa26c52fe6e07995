use std::path::PathBuf;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://batchops.db?mode=rwc";

/// Outbound alert endpoints. A channel without its URL is simply not
/// configured and is skipped at dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertConfig {
    pub email_url: Option<String>,
    pub email_user: Option<String>,
    pub email_password: Option<String>,
    pub email_from: Option<String>,
    pub email_to: Vec<String>,
    pub chat_webhook: Option<String>,
    pub webhook_url: Option<String>,
    pub proxy: Option<String>,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub jobs_file: Option<PathBuf>,
    pub operator_id: String,
    pub operator_role: String,
    pub idempotency_retention_secs: i64,
    pub alerts: AlertConfig,
}

impl AppConfig {
    /// Loads `.env` when present, then reads the process environment.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(get: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| {
            get(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            database_url: text("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            db_max_connections: text("DB_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            jobs_file: text("BATCHOPS_JOBS_FILE").map(PathBuf::from),
            operator_id: text("BATCHOPS_OPERATOR_ID").unwrap_or_else(|| "ops".to_string()),
            operator_role: text("BATCHOPS_OPERATOR_ROLE").unwrap_or_else(|| "OPERATOR".to_string()),
            idempotency_retention_secs: text("IDEMPOTENCY_RETENTION_SECS")
                .and_then(|v| v.parse().ok())
                .filter(|v: &i64| *v > 0)
                .unwrap_or(86_400),
            alerts: AlertConfig {
                email_url: text("ALERT_EMAIL_URL"),
                email_user: text("ALERT_EMAIL_USER"),
                email_password: text("ALERT_EMAIL_PASSWORD"),
                email_from: text("ALERT_EMAIL_FROM"),
                email_to: text("ALERT_EMAIL_TO")
                    .map(|s| split_list(&s))
                    .unwrap_or_default(),
                chat_webhook: text("ALERT_CHAT_WEBHOOK"),
                webhook_url: text("ALERT_WEBHOOK_URL"),
                proxy: text("ALERT_PROXY"),
                http_timeout_secs: text("ALERT_HTTP_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(10),
            },
        }
    }
}

fn split_list(s: &str) -> Vec<String> {
    s.split(|c| c == ',' || c == ';')
        .map(|x| x.trim().to_string())
        .filter(|x| !x.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = config(&[]);
        assert_eq!(cfg.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(cfg.db_max_connections, 10);
        assert_eq!(cfg.operator_id, "ops");
        assert_eq!(cfg.idempotency_retention_secs, 86_400);
        assert_eq!(cfg.alerts.http_timeout_secs, 10);
        assert!(cfg.alerts.email_url.is_none());
    }

    #[test]
    fn recipients_split_on_comma_and_semicolon() {
        let cfg = config(&[
            ("ALERT_EMAIL_TO", "a@x.io; b@x.io,, c@x.io"),
            ("IDEMPOTENCY_RETENTION_SECS", "-5"),
            ("ALERT_CHAT_WEBHOOK", "   "),
        ]);
        assert_eq!(cfg.alerts.email_to, vec!["a@x.io", "b@x.io", "c@x.io"]);
        assert_eq!(cfg.idempotency_retention_secs, 86_400);
        assert!(cfg.alerts.chat_webhook.is_none());
    }
}
